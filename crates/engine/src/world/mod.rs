use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fmt;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::app::InputSnapshot;
use crate::geom::{Delta, Orientation, Pos, Rect};
use crate::level::{EntityId, Level, Spawnable, Tile, WarpZone, START_CHECKPOINT, TILE_SIZE};

mod entity;
mod trace;
mod visibility;

pub use entity::{Contents, Entity, EntityFactory, EntityImpl, EntityRegistry, SpawnError};
pub use trace::{TraceOptions, TraceResult};

/// Smallest entity edge; box traces sample leading edges at this spacing.
pub const MIN_ENTITY_SIZE: i32 = 8;

/// Player persistent-state key naming the checkpoint to respawn at.
pub const LAST_CHECKPOINT_KEY: &str = "last_checkpoint";

/// Player persistent-state key prefix recording the flip a checkpoint was reached with.
pub const CHECKPOINT_SEEN_PREFIX: &str = "checkpoint_seen.";

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WorldConfig {
    pub screen_width: i32,
    pub screen_height: i32,
    /// Spacing in pixels between visibility rays along the screen border.
    pub sweep_step: i32,
    /// Rings of tiles kept loaded around the visible set.
    pub expand_tiles: i32,
    pub scroll_per_frame: f32,
    /// Minimum distance in pixels between the player center and the screen edge.
    pub scroll_min_distance: i32,
}

impl Default for WorldConfig {
    fn default() -> Self {
        Self {
            screen_width: 640,
            screen_height: 360,
            sweep_step: 4,
            expand_tiles: 1,
            scroll_per_frame: 0.05,
            scroll_min_distance: 32,
        }
    }
}

/// A level tile materialized at a world position.
#[derive(Debug, Clone, PartialEq)]
pub struct WorldTile {
    pub level_pos: Pos,
    /// Maps world deltas to level deltas at this tile.
    pub transform: Orientation,
    /// Orientation to draw `image` with.
    pub orientation: Orientation,
    pub contents: Contents,
    pub image: Option<String>,
}

impl WorldTile {
    fn new(level_pos: Pos, tile: &Tile, transform: Orientation) -> Self {
        let orientation = transform.inverse().concat(tile.orientation);
        let (image, orientation) = match tile.image_by_orientation.get(&orientation) {
            Some(variant) => (Some(variant.clone()), Orientation::identity()),
            None => (tile.image.clone(), orientation),
        };
        let mut contents = Contents::empty();
        if tile.solid {
            contents |= Contents::SOLID;
        }
        if tile.opaque {
            contents |= Contents::OPAQUE;
        }
        Self {
            level_pos,
            transform,
            orientation,
            contents,
            image,
        }
    }
}

/// Requests from entities to the outside world, drained once per frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorldEvent {
    PlaySound { sound: String },
    SwitchMusic { music: String },
    CheckpointReached { name: String },
    CenterPrint { text: String },
    QuitRequested,
}

#[derive(Debug, Error)]
pub enum WorldError {
    #[error("failed to spawn entity {id} of type '{entity_type}': {source}")]
    Spawn {
        id: EntityId,
        entity_type: String,
        #[source]
        source: SpawnError,
    },
    #[error("checkpoint '{name}' does not exist")]
    MissingCheckpoint { name: String },
    #[error("no level tile under the player spawn point at {pos}")]
    PlayerTileMissing { pos: Pos },
}

/// The materialized covering of the level around the player, plus live entities.
pub struct World {
    level: Level,
    registry: EntityRegistry,
    config: WorldConfig,
    tiles: HashMap<Pos, WorldTile>,
    entities: BTreeMap<EntityId, Entity>,
    tile_entities: HashMap<Pos, BTreeSet<EntityId>>,
    warp_states: HashMap<String, bool>,
    player: EntityId,
    scroll_pos: Pos,
    scroll_delta: Delta,
    scroll_target: Option<Pos>,
    visible_polygon: Vec<Pos>,
    visibility_eye: Pos,
    input: InputSnapshot,
    events: Vec<WorldEvent>,
    frame: u64,
}

impl fmt::Debug for World {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("World")
            .field("player", &self.player)
            .field("frame", &self.frame)
            .field("tiles", &self.tiles.len())
            .field("entities", &self.entities.len())
            .finish_non_exhaustive()
    }
}

impl World {
    /// Builds the world and spawns the player at its last recorded checkpoint.
    pub fn new(
        level: Level,
        registry: EntityRegistry,
        config: WorldConfig,
    ) -> Result<Self, WorldError> {
        let player = level.player();
        let mut checkpoint = level
            .persistent_state(player)
            .and_then(|state| state.get(LAST_CHECKPOINT_KEY))
            .cloned()
            .unwrap_or_default();
        if level.checkpoint(&checkpoint).is_none() {
            warn!(
                checkpoint = checkpoint.as_str(),
                "saved_checkpoint_missing_using_start"
            );
            checkpoint = START_CHECKPOINT.to_string();
        }

        let mut world = Self {
            level,
            registry,
            config,
            tiles: HashMap::new(),
            entities: BTreeMap::new(),
            tile_entities: HashMap::new(),
            warp_states: HashMap::new(),
            player,
            scroll_pos: Pos::default(),
            scroll_delta: Delta::default(),
            scroll_target: None,
            visible_polygon: Vec::new(),
            visibility_eye: Pos::default(),
            input: InputSnapshot::default(),
            events: Vec::new(),
            frame: 0,
        };
        world.respawn_player(&checkpoint)?;
        Ok(world)
    }

    /// Throws away the covering and every entity, then rebuilds the world
    /// around the named checkpoint. Warp zones return to their initial state.
    pub fn respawn_player(&mut self, checkpoint: &str) -> Result<(), WorldError> {
        let target = self
            .level
            .checkpoint(checkpoint)
            .cloned()
            .ok_or_else(|| WorldError::MissingCheckpoint {
                name: checkpoint.to_string(),
            })?;
        let Some(player_def) = self.level.spawnable(self.player).cloned() else {
            return Err(WorldError::MissingCheckpoint {
                name: START_CHECKPOINT.to_string(),
            });
        };

        let ids: Vec<EntityId> = self.entities.keys().copied().collect();
        for id in ids {
            self.despawn_entity(id);
        }
        self.tiles.clear();
        self.tile_entities.clear();
        self.warp_states.clear();
        self.scroll_target = None;

        let flipped = self
            .level
            .persistent_state(self.player)
            .and_then(|state| state.get(&format!("{CHECKPOINT_SEEN_PREFIX}{checkpoint}")))
            .is_some_and(|seen| seen == "FlipX");
        let transform = if flipped {
            Orientation::flip_x()
        } else {
            Orientation::identity()
        };

        let anchor = target.rect.center().div_floor(TILE_SIZE);
        let Some(level_tile) = self.level.tile(anchor) else {
            return Err(WorldError::PlayerTileMissing { pos: anchor });
        };
        let anchor_tile = WorldTile::new(anchor, &level_tile.tile, transform);
        self.tiles.insert(anchor, anchor_tile);

        // The player keeps its own size but is centered on the checkpoint.
        let center2 = target.rect.center2();
        let size = player_def.rect.size;
        let origin = Pos::new(center2.x - size.dx + 1, center2.y - size.dy + 1).div_floor(2);
        let mut placed = player_def;
        placed.rect = Rect::new(origin, size);
        self.spawn_from(&placed, anchor)?;

        if let Some(player) = self.entities.get(&self.player) {
            self.scroll_pos = player.rect.center();
        }
        self.scroll_delta = Delta::default();
        self.update_visibility()?;
        info!(
            checkpoint,
            flipped,
            tiles = self.tiles.len(),
            entities = self.entities.len(),
            "player_respawned"
        );
        Ok(())
    }

    /// Advances the world by one fixed tick.
    pub fn tick(&mut self, input: &InputSnapshot) -> Result<(), WorldError> {
        self.input = *input;
        self.frame += 1;

        let ids: Vec<EntityId> = self.entities.keys().copied().collect();
        for id in ids {
            self.with_behavior(id, |behavior, world| behavior.update(world, id));
        }

        self.update_scroll();
        self.update_visibility()
    }

    fn update_scroll(&mut self) {
        let before = self.scroll_pos;
        let Some(player) = self.entities.get(&self.player) else {
            self.scroll_delta = Delta::default();
            return;
        };
        let focus = player.rect.center();
        let target = self.scroll_target.unwrap_or(focus);
        let factor = self.config.scroll_per_frame;
        let d = target.delta(self.scroll_pos);
        self.scroll_pos += Delta::new(
            (d.dx as f32 * factor).round() as i32,
            (d.dy as f32 * factor).round() as i32,
        );

        let max_dx = (self.config.screen_width / 2 - self.config.scroll_min_distance).max(0);
        let max_dy = (self.config.screen_height / 2 - self.config.scroll_min_distance).max(0);
        self.scroll_pos.x = self.scroll_pos.x.clamp(focus.x - max_dx, focus.x + max_dx);
        self.scroll_pos.y = self.scroll_pos.y.clamp(focus.y - max_dy, focus.y + max_dy);
        self.scroll_delta = self.scroll_pos.delta(before);
    }

    /// Takes the entity's behavior out for the duration of `f`. Entities
    /// whose behavior is already out (running further up the stack) are skipped.
    fn with_behavior(&mut self, id: EntityId, f: impl FnOnce(&mut dyn EntityImpl, &mut World)) {
        let Some(mut behavior) = self
            .entities
            .get_mut(&id)
            .and_then(|entity| entity.behavior.take())
        else {
            return;
        };
        f(behavior.as_mut(), self);
        // A respawn during `f` leaves a fresh behavior under the same id.
        match self.entities.get_mut(&id) {
            Some(entity) if entity.behavior.is_none() => entity.behavior = Some(behavior),
            _ => behavior.despawn(self, id),
        }
    }

    /// Notifies both sides that `a` and `b` touched.
    pub fn touch(&mut self, a: EntityId, b: EntityId) {
        self.with_behavior(a, |behavior, world| behavior.touch(world, a, b));
        self.with_behavior(b, |behavior, world| behavior.touch(world, b, a));
    }

    /// Places `spawnable` relative to the world tile at `world_pos` and runs
    /// its spawn hook. Does nothing when the entity is already live.
    fn spawn_from(&mut self, spawnable: &Spawnable, world_pos: Pos) -> Result<(), WorldError> {
        if self.entities.contains_key(&spawnable.id) {
            return Ok(());
        }
        let Some(tile) = self.tiles.get(&world_pos) else {
            return Ok(());
        };
        let transform = tile.transform;
        let inverse = transform.inverse();
        let level_center2 = tile_center2(tile.level_pos);
        let world_center2 =
            tile_center2(world_pos) + inverse.apply(spawnable.rect.center2().delta(level_center2));
        let size = inverse.apply(spawnable.rect.size).abs();
        let origin = Pos::new(
            world_center2.x - size.dx + 1,
            world_center2.y - size.dy + 1,
        )
        .div_floor(2);
        let rect = Rect::new(origin, size);
        let orientation = inverse.concat(spawnable.orientation);

        let spawn_error = |source| WorldError::Spawn {
            id: spawnable.id,
            entity_type: spawnable.entity_type.clone(),
            source,
        };
        let mut behavior = self
            .registry
            .create(&spawnable.entity_type)
            .map_err(spawn_error)?;

        let id = spawnable.id;
        let entity = Entity::new(id, &spawnable.entity_type, rect, orientation, transform);
        self.index_entity(id, rect);
        self.entities.insert(id, entity);

        if let Err(source) = behavior.spawn(self, id, spawnable) {
            if let Some(entity) = self.entities.remove(&id) {
                self.unindex_entity(id, entity.rect);
            }
            return Err(spawn_error(source));
        }
        match self.entities.get_mut(&id) {
            Some(entity) => entity.behavior = Some(behavior),
            None => behavior.despawn(self, id),
        }
        debug!(id = %id, entity_type = spawnable.entity_type.as_str(), "entity_spawned");
        Ok(())
    }

    /// Removes the entity and runs its despawn hook. Its level definition
    /// stays, so it spawns again once its tile is visible.
    pub fn despawn_entity(&mut self, id: EntityId) {
        let Some(mut entity) = self.entities.remove(&id) else {
            return;
        };
        self.unindex_entity(id, entity.rect);
        if let Some(mut behavior) = entity.behavior.take() {
            behavior.despawn(self, id);
        }
        debug!(id = %id, entity_type = entity.entity_type.as_str(), "entity_despawned");
    }

    fn index_entity(&mut self, id: EntityId, rect: Rect) {
        let (start, end) = rect.tile_span(TILE_SIZE);
        for y in start.y..=end.y {
            for x in start.x..=end.x {
                self.tile_entities
                    .entry(Pos::new(x, y))
                    .or_default()
                    .insert(id);
            }
        }
    }

    fn unindex_entity(&mut self, id: EntityId, rect: Rect) {
        let (start, end) = rect.tile_span(TILE_SIZE);
        for y in start.y..=end.y {
            for x in start.x..=end.x {
                let pos = Pos::new(x, y);
                if let Some(ids) = self.tile_entities.get_mut(&pos) {
                    ids.remove(&id);
                    if ids.is_empty() {
                        self.tile_entities.remove(&pos);
                    }
                }
            }
        }
    }

    /// Loads the tile reached by stepping `step` (any king move) from the
    /// loaded tile at `from`, following enabled warps. Returns the world
    /// position of the loaded or already present tile, or `None` when the
    /// step leaves the level.
    pub fn load_tile(&mut self, from: Pos, step: Delta) -> Option<Pos> {
        if step.dx != 0 && step.dy != 0 {
            let horizontal = Delta::new(step.dx, 0);
            let vertical = Delta::new(0, step.dy);
            if let Some(pos) = self
                .load_tile(from, horizontal)
                .and_then(|mid| self.load_tile(mid, vertical))
            {
                return Some(pos);
            }
            return self
                .load_tile(from, vertical)
                .and_then(|mid| self.load_tile(mid, horizontal));
        }

        let target = from + step;
        if self.tiles.contains_key(&target) {
            return Some(target);
        }
        let neighbor = self.tiles.get(&from)?;
        let (level_pos, transform) = {
            let level_step = neighbor.transform.apply(step);
            let (pos, warp) = self.level.resolve_warp_with(
                neighbor.level_pos,
                level_step,
                |warp| self.warp_enabled(warp),
            );
            (pos, warp.concat(neighbor.transform))
        };
        let level_tile = self.level.tile(level_pos)?;
        let tile = WorldTile::new(level_pos, &level_tile.tile, transform);
        self.tiles.insert(target, tile);
        Some(target)
    }

    fn warp_enabled(&self, warp: &WarpZone) -> bool {
        self.warp_states
            .get(&warp.name)
            .copied()
            .unwrap_or(warp.initial_state)
    }

    /// Whether warps named `name` currently apply. Unknown names report `true`.
    pub fn warp_zone_enabled(&self, name: &str) -> bool {
        self.warp_states
            .get(name)
            .copied()
            .or_else(|| self.level.warp_initial_state(name))
            .unwrap_or(true)
    }

    /// Toggles a warp pair until the next respawn. Already loaded tiles keep
    /// their mapping until they leave the visible set.
    pub fn set_warp_zone_state(&mut self, name: &str, enabled: bool) {
        info!(warp_zone = name, enabled, "warp_zone_state_changed");
        self.warp_states.insert(name.to_string(), enabled);
    }

    pub fn set_entity_rect(&mut self, id: EntityId, rect: Rect) {
        let Some(old) = self.entities.get(&id).map(|entity| entity.rect) else {
            return;
        };
        if old == rect {
            return;
        }
        self.unindex_entity(id, old);
        self.index_entity(id, rect);
        if let Some(entity) = self.entities.get_mut(&id) {
            entity.rect = rect;
        }
    }

    pub fn set_entity_contents(&mut self, id: EntityId, contents: Contents) {
        if let Some(entity) = self.entities.get_mut(&id) {
            entity.contents = contents;
        }
    }

    /// Level tile and world-to-level transform under a world pixel, if loaded.
    pub fn level_frame_at(&self, pos: Pos) -> Option<(Pos, Orientation)> {
        self.tiles
            .get(&pos.div_floor(TILE_SIZE))
            .map(|tile| (tile.level_pos, tile.transform))
    }

    pub fn level(&self) -> &Level {
        &self.level
    }

    pub fn level_mut(&mut self) -> &mut Level {
        &mut self.level
    }

    pub fn config(&self) -> &WorldConfig {
        &self.config
    }

    pub fn input(&self) -> &InputSnapshot {
        &self.input
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }

    pub fn player(&self) -> EntityId {
        self.player
    }

    pub fn entity(&self, id: EntityId) -> Option<&Entity> {
        self.entities.get(&id)
    }

    pub fn entity_mut(&mut self, id: EntityId) -> Option<&mut Entity> {
        self.entities.get_mut(&id)
    }

    /// Live entities in id order.
    pub fn entities(&self) -> impl Iterator<Item = &Entity> {
        self.entities.values()
    }

    pub fn entity_count(&self) -> usize {
        self.entities.len()
    }

    pub fn tile(&self, pos: Pos) -> Option<&WorldTile> {
        self.tiles.get(&pos)
    }

    pub fn tiles(&self) -> impl Iterator<Item = (Pos, &WorldTile)> {
        self.tiles.iter().map(|(pos, tile)| (*pos, tile))
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.len()
    }

    pub fn scroll_pos(&self) -> Pos {
        self.scroll_pos
    }

    /// How far the view moved during the last tick.
    pub fn scroll_delta(&self) -> Delta {
        self.scroll_delta
    }

    /// Overrides the scroll focus; `None` follows the player.
    pub fn set_scroll_target(&mut self, target: Option<Pos>) {
        self.scroll_target = target;
    }

    /// Ray end points of the last visibility sweep, in screen border order.
    pub fn visible_polygon(&self) -> &[Pos] {
        &self.visible_polygon
    }

    pub fn visibility_eye(&self) -> Pos {
        self.visibility_eye
    }

    pub fn emit(&mut self, event: WorldEvent) {
        self.events.push(event);
    }

    pub fn drain_events(&mut self) -> Vec<WorldEvent> {
        std::mem::take(&mut self.events)
    }

    pub(crate) fn behavior(&self, id: EntityId) -> Option<&dyn EntityImpl> {
        self.entities
            .get(&id)
            .and_then(|entity| entity.behavior.as_deref())
    }
}

/// Tile center in doubled pixel coordinates.
fn tile_center2(tile: Pos) -> Pos {
    Pos::new(
        2 * TILE_SIZE * tile.x + TILE_SIZE - 1,
        2 * TILE_SIZE * tile.y + TILE_SIZE - 1,
    )
}


#[cfg(test)]
mod tests {
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    use super::test_support::*;
    use super::*;
    use crate::level::test_levels::{warp_room, WARP_ROOM};

    fn warp_world() -> World {
        let (registry, _) = probe_registry(&["Player", "Sprite", "Checkpoint"]);
        World::new(warp_room(), registry, WorldConfig::default()).expect("world")
    }

    /// Player behavior that respawns the world from inside its first update.
    struct Respawner {
        generation: usize,
        spawned: Rc<Cell<usize>>,
        log: Rc<RefCell<Vec<String>>>,
    }

    impl EntityImpl for Respawner {
        fn spawn(
            &mut self,
            _world: &mut World,
            _id: EntityId,
            _spawnable: &Spawnable,
        ) -> Result<(), SpawnError> {
            self.spawned.set(self.spawned.get() + 1);
            self.generation = self.spawned.get();
            Ok(())
        }

        fn update(&mut self, world: &mut World, _id: EntityId) {
            self.log.borrow_mut().push(format!("update {}", self.generation));
            if self.generation == 1 {
                world.respawn_player("hall").expect("respawn");
            }
        }

        fn touch(&mut self, _world: &mut World, _id: EntityId, _other: EntityId) {}

        fn despawn(&mut self, _world: &mut World, _id: EntityId) {
            self.log.borrow_mut().push(format!("despawn {}", self.generation));
        }
    }

    #[test]
    fn respawn_inside_update_keeps_the_new_behavior() {
        let (mut registry, _) = probe_registry(&["Sprite", "Checkpoint"]);
        let spawned = Rc::new(Cell::new(0));
        let log = Rc::new(RefCell::new(Vec::new()));
        {
            let (spawned, log) = (Rc::clone(&spawned), Rc::clone(&log));
            registry.register("Player", move || {
                Box::new(Respawner {
                    generation: 0,
                    spawned: Rc::clone(&spawned),
                    log: Rc::clone(&log),
                })
            });
        }
        let mut world = World::new(warp_room(), registry, WorldConfig::default()).expect("world");

        world.tick(&InputSnapshot::empty()).expect("first tick");
        world.tick(&InputSnapshot::empty()).expect("second tick");

        assert_eq!(spawned.get(), 2);
        assert_eq!(
            *log.borrow(),
            vec![
                "update 1".to_string(),
                "despawn 1".to_string(),
                "update 2".to_string(),
            ]
        );
    }

    #[test]
    fn new_world_spawns_player_at_level_start() {
        let world = warp_world();
        let player = world.entity(world.player()).expect("player live");
        assert_eq!(player.rect(), Rect::new(Pos::new(34, 82), Delta::new(12, 12)));
        assert_eq!(player.orientation, Orientation::identity());
        assert_eq!(world.scroll_pos(), player.rect().center());
    }

    #[test]
    fn east_through_warp_emerges_beside_partner_moving_west() {
        let world = warp_world();

        let portal = world.tile(Pos::new(5, 5)).expect("portal tile loaded");
        assert_eq!(portal.level_pos, Pos::new(9, 5));
        assert_eq!(portal.transform.apply(Delta::east()), Delta::west());

        let beyond = world.tile(Pos::new(6, 5)).expect("tile past portal");
        assert_eq!(beyond.level_pos, Pos::new(8, 5));

        let above = world.tile(Pos::new(5, 4)).expect("tile above portal");
        assert_eq!(above.level_pos, Pos::new(5, 4));
        assert_eq!(above.transform, Orientation::identity());

        assert_eq!(
            world.level_frame_at(Pos::new(5 * 16 + 3, 5 * 16 + 3)),
            Some((Pos::new(9, 5), Orientation::turn_around()))
        );
    }

    #[test]
    fn box_moving_east_crosses_warp_without_stopping() {
        let mut world = warp_world();
        let rect = Rect::new(Pos::new(66, 84), Delta::new(8, 8));
        let result = world.trace_box(rect, Pos::new(98, 84), &TraceOptions::default());

        assert!(!result.hit_fog_of_war);
        assert_eq!(result.hit_tile, None);
        assert_eq!(result.end_pos, Pos::new(98, 84));
        let (level_pos, transform) = world.level_frame_at(result.end_pos).expect("loaded");
        assert_eq!(level_pos, Pos::new(8, 5));
        assert_eq!(transform.apply(Delta::east()), Delta::west());
    }

    #[test]
    fn respawn_at_checkpoint_honors_recorded_flip() {
        let mut level = warp_room();
        let player = level.player();
        let state = level.persistent_state_mut(player);
        state.insert(LAST_CHECKPOINT_KEY.to_string(), "hall".to_string());
        state.insert(format!("{CHECKPOINT_SEEN_PREFIX}hall"), "FlipX".to_string());
        let (registry, _) = probe_registry(&["Player", "Sprite", "Checkpoint"]);

        let world = World::new(level, registry, WorldConfig::default()).expect("world");

        let anchor = world.tile(Pos::new(2, 2)).expect("anchor");
        assert_eq!(anchor.level_pos, Pos::new(2, 2));
        assert_eq!(anchor.transform, Orientation::flip_x());
        let player = world.entity(player).expect("player");
        assert_eq!(player.orientation, Orientation::flip_x());
        assert_eq!(player.rect().center(), Pos::new(39, 39));
    }

    #[test]
    fn respawn_at_unknown_checkpoint_fails() {
        let mut world = warp_world();
        let err = world.respawn_player("nowhere").expect_err("missing");
        assert!(matches!(err, WorldError::MissingCheckpoint { ref name } if name == "nowhere"));
    }

    #[test]
    fn respawn_resets_warp_states() {
        let mut world = warp_world();
        world.set_warp_zone_state("A", false);
        assert!(!world.warp_zone_enabled("A"));

        world.respawn_player(START_CHECKPOINT).expect("respawn");
        assert!(world.warp_zone_enabled("A"));
    }

    #[test]
    fn warp_starting_disabled_reports_disabled_until_enabled() {
        let (registry, _) = probe_registry(&["Player", "Sprite", "Checkpoint"]);
        let source = WARP_ROOM.replace(
            r#"name="A" x="80" y="80" width="16" height="16"/>"#,
            r#"name="A" x="80" y="80" width="16" height="16">
      <property name="initial_state" value="false"/>
    </object>"#,
        );
        let level = Level::parse("disabled_warp", &source).expect("level");
        let mut world = World::new(level, registry, WorldConfig::default()).expect("world");

        assert!(!world.warp_zone_enabled("A"));
        assert!(world.warp_zone_enabled("never_defined"));
        world.set_warp_zone_state("A", true);
        assert!(world.warp_zone_enabled("A"));
    }

    #[test]
    fn unknown_entity_type_fails_world_creation() {
        let level = grid_level(
            &["#####", "#...#", "#####"],
            r#"<object id="1" type="Player" x="20" y="20" width="8" height="8"/>
<object id="2" type="Gizmo" x="36" y="20" width="8" height="8"/>"#,
        );
        let (registry, _) = probe_registry(&["Player"]);

        let err = World::new(level, registry, WorldConfig::default())
            .err()
            .expect("spawn failure");
        assert!(matches!(
            err,
            WorldError::Spawn { id: EntityId(2), source: SpawnError::UnknownType(_), .. }
        ));
    }

    #[test]
    fn touch_reaches_both_participants() {
        let level = grid_level(
            &["#####", "#...#", "#####"],
            r#"<object id="1" type="Player" x="20" y="20" width="8" height="8"/>
<object id="2" type="Probe" x="36" y="20" width="8" height="8"/>"#,
        );
        let (registry, log) = probe_registry(&["Player", "Probe"]);
        let mut world = World::new(level, registry, WorldConfig::default()).expect("world");
        log.borrow_mut().clear();

        world.touch(EntityId(1), EntityId(2));

        assert_eq!(*log.borrow(), vec!["touch 1 2", "touch 2 1"]);
    }

    #[test]
    fn moving_an_entity_reindexes_its_tiles() {
        let mut world = warp_world();
        let id = world.player();
        world.set_entity_rect(id, Rect::new(Pos::new(100, 40), Delta::new(12, 12)));

        assert!(!world
            .tile_entities
            .get(&Pos::new(2, 5))
            .is_some_and(|ids| ids.contains(&id)));
        assert!(world.tile_entities[&Pos::new(6, 2)].contains(&id));
        assert!(world.tile_entities[&Pos::new(6, 3)].contains(&id));
    }

    #[test]
    fn events_drain_in_emission_order() {
        let mut world = warp_world();
        world.emit(WorldEvent::PlaySound {
            sound: "bump".to_string(),
        });
        world.emit(WorldEvent::QuitRequested);

        assert_eq!(
            world.drain_events(),
            vec![
                WorldEvent::PlaySound {
                    sound: "bump".to_string()
                },
                WorldEvent::QuitRequested
            ]
        );
        assert!(world.drain_events().is_empty());
    }

    #[test]
    fn scroll_stays_within_margin_of_player() {
        let mut world = warp_world();
        world.set_scroll_target(Some(Pos::new(5000, 0)));
        for _ in 0..50 {
            world.tick(&InputSnapshot::default()).expect("tick");
        }
        let focus = world.entity(world.player()).expect("player").rect().center();
        assert_eq!(world.scroll_pos().x, focus.x + 320 - 32);
    }
}
