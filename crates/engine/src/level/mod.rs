use std::collections::BTreeMap;
use std::fmt;
use std::io;
use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::geom::{Delta, Orientation, Pos, Rect};

mod loader;
mod save;
mod warp;

pub use save::{SaveError, SaveGame, SaveGameData};

/// Edge length of a tile in pixels.
pub const TILE_SIZE: i32 = 16;

/// Player checkpoint name; respawning here puts the player at its level start.
pub const START_CHECKPOINT: &str = "";

#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct EntityId(pub u64);

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-entity key/value state that survives despawning and is written to saves.
pub type PersistentState = BTreeMap<String, String>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLocation {
    pub line: usize,
    pub column: usize,
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "line {}, column {}", self.line, self.column)
    }
}

#[derive(Debug, Error)]
pub enum LevelError {
    #[error("failed to read level file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("malformed level XML in {source_name} at {location}: {message}")]
    Xml {
        source_name: String,
        message: String,
        location: SourceLocation,
    },
    #[error("invalid level {source_name} at {location}: {message}")]
    Invalid {
        source_name: String,
        message: String,
        location: SourceLocation,
    },
    #[error("unpaired warp zone '{name}': got {count} instances, want 2")]
    UnpairedWarp { name: String, count: usize },
    #[error("warp zone '{name}' at {at} has no exact inverse: {reason}")]
    InvalidWarpGeometry {
        name: String,
        at: Pos,
        reason: String,
    },
    #[error("{what} outside map bounds at tile {pos}")]
    OutOfBounds { what: String, pos: Pos },
    #[error("level {source_name} has no Player object")]
    MissingPlayer { source_name: String },
}

/// Static tile definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Tile {
    pub solid: bool,
    pub opaque: bool,
    pub level_pos: Pos,
    pub image: Option<String>,
    pub image_by_orientation: BTreeMap<Orientation, String>,
    /// Flip state the level editor placed the tile with.
    pub orientation: Orientation,
}

/// Directed warp edge stored on the tile it leads into.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WarpZone {
    pub name: String,
    pub initial_state: bool,
    /// Level tile a mover must come from for the warp to apply.
    pub prev_tile: Pos,
    /// Level tile the mover arrives in instead.
    pub to_tile: Pos,
    pub transform: Orientation,
}

#[derive(Debug, Clone)]
pub struct LevelTile {
    pub tile: Tile,
    pub warp_zones: Vec<WarpZone>,
    pub spawnables: Vec<EntityId>,
}

/// Static entity definition.
#[derive(Debug, Clone, PartialEq)]
pub struct Spawnable {
    pub id: EntityId,
    pub entity_type: String,
    /// Rectangle in level pixel coordinates.
    pub rect: Rect,
    pub orientation: Orientation,
    pub properties: BTreeMap<String, String>,
}

impl Spawnable {
    pub fn property(&self, key: &str) -> Option<&str> {
        self.properties.get(key).map(String::as_str)
    }

    pub fn flag(&self, key: &str) -> bool {
        self.property(key) == Some("true")
    }
}

#[derive(Debug, Clone)]
pub struct Level {
    width: i32,
    height: i32,
    tiles: Vec<Option<LevelTile>>,
    spawnables: BTreeMap<EntityId, Spawnable>,
    persistent: BTreeMap<EntityId, PersistentState>,
    player: EntityId,
    checkpoints: BTreeMap<String, EntityId>,
    /// Starting state per warp name; a pair whose legs disagree starts off.
    warp_initial_states: BTreeMap<String, bool>,
    save_game_version: u32,
    hash: String,
}

impl Level {
    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn contains(&self, pos: Pos) -> bool {
        pos.x >= 0 && pos.y >= 0 && pos.x < self.width && pos.y < self.height
    }

    fn index(&self, pos: Pos) -> Option<usize> {
        self.contains(pos)
            .then(|| (pos.y as usize) * (self.width as usize) + pos.x as usize)
    }

    pub fn tile(&self, pos: Pos) -> Option<&LevelTile> {
        self.index(pos).and_then(|i| self.tiles[i].as_ref())
    }

    fn tile_mut(&mut self, pos: Pos) -> Option<&mut LevelTile> {
        let i = self.index(pos)?;
        self.tiles[i].as_mut()
    }

    pub fn warp_zones_at(&self, pos: Pos) -> &[WarpZone] {
        self.tile(pos)
            .map(|tile| tile.warp_zones.as_slice())
            .unwrap_or(&[])
    }

    pub fn warp_initial_state(&self, name: &str) -> Option<bool> {
        self.warp_initial_states.get(name).copied()
    }

    /// Level tile reached by stepping `direction` from `pos`, plus the
    /// transform picked up on the way. Only warps in their initial state apply.
    pub fn resolve_warp(&self, pos: Pos, direction: Delta) -> (Pos, Orientation) {
        self.resolve_warp_with(pos, direction, |warp| warp.initial_state)
    }

    pub fn resolve_warp_with(
        &self,
        pos: Pos,
        direction: Delta,
        is_enabled: impl Fn(&WarpZone) -> bool,
    ) -> (Pos, Orientation) {
        let next = pos + direction;
        self.warp_zones_at(next)
            .iter()
            .find(|warp| warp.prev_tile == pos && is_enabled(warp))
            .map(|warp| (warp.to_tile, warp.transform))
            .unwrap_or((next, Orientation::identity()))
    }

    pub fn spawnable(&self, id: EntityId) -> Option<&Spawnable> {
        self.spawnables.get(&id)
    }

    pub fn spawnables(&self) -> impl Iterator<Item = &Spawnable> {
        self.spawnables.values()
    }

    pub fn player(&self) -> EntityId {
        self.player
    }

    pub fn checkpoint(&self, name: &str) -> Option<&Spawnable> {
        self.checkpoints
            .get(name)
            .and_then(|id| self.spawnables.get(id))
    }

    pub fn checkpoint_names(&self) -> impl Iterator<Item = &str> {
        self.checkpoints.keys().map(String::as_str)
    }

    pub fn persistent_state(&self, id: EntityId) -> Option<&PersistentState> {
        self.persistent.get(&id)
    }

    pub fn persistent_state_mut(&mut self, id: EntityId) -> &mut PersistentState {
        self.persistent.entry(id).or_default()
    }

    pub fn save_game_version(&self) -> u32 {
        self.save_game_version
    }

    /// SHA-256 of the level source, lower-case hex.
    pub fn hash(&self) -> &str {
        &self.hash
    }

    pub fn tile_count(&self) -> usize {
        self.tiles.iter().filter(|tile| tile.is_some()).count()
    }

    pub(crate) fn for_each_tile(&self, mut f: impl FnMut(Pos, &LevelTile)) {
        for (i, tile) in self.tiles.iter().enumerate() {
            if let Some(tile) = tile {
                let i = i as i32;
                f(Pos::new(i % self.width, i / self.width), tile);
            }
        }
    }
}
