use std::collections::HashSet;

use tracing::trace;

use crate::geom::{Delta, Pos, Rect};
use crate::level::{EntityId, TILE_SIZE};

use super::{Contents, TraceOptions, World, WorldError};

const NEIGHBORS: [Delta; 8] = [
    Delta::new(-1, -1),
    Delta::new(0, -1),
    Delta::new(1, -1),
    Delta::new(-1, 0),
    Delta::new(1, 0),
    Delta::new(-1, 1),
    Delta::new(0, 1),
    Delta::new(1, 1),
];

impl World {
    /// Rebuilds the loaded set from this frame's sight lines: sweep, expand,
    /// unload, despawn, then spawn.
    pub(super) fn update_visibility(&mut self) -> Result<(), WorldError> {
        let Some(player) = self.entities.get(&self.player) else {
            return Ok(());
        };
        let eye = player.rect.center();
        let screen = Rect::new(
            self.scroll_pos
                - Delta::new(self.config.screen_width / 2, self.config.screen_height / 2),
            Delta::new(self.config.screen_width, self.config.screen_height),
        );
        let options = TraceOptions {
            contents: Contents::OPAQUE,
            load_tiles: true,
            ignore_entity: Some(self.player),
            ..TraceOptions::default()
        };

        let mut marked = HashSet::new();
        marked.insert(eye.div_floor(TILE_SIZE));
        let mut seen_entities = HashSet::new();
        let targets = screen_border_points(screen, self.config.sweep_step);
        let mut polygon = Vec::with_capacity(targets.len());
        for target in targets {
            let sight = self.trace_line(eye, target.delta(eye), &options);
            marked.extend(sight.path.iter().copied());
            if let Some(id) = sight.hit_entity {
                seen_entities.insert(id);
            }
            polygon.push(sight.end_pos);
        }
        marked.retain(|pos| self.tiles.contains_key(pos));

        self.expand_marked(&mut marked);
        self.tiles.retain(|pos, _| marked.contains(pos));

        let stale: Vec<EntityId> = self
            .entities
            .values()
            .filter(|entity| {
                entity.id != self.player
                    && !seen_entities.contains(&entity.id)
                    && !self.overlaps_loaded_tile(entity.rect)
            })
            .map(|entity| entity.id)
            .collect();
        for id in stale {
            self.despawn_entity(id);
        }

        self.visible_polygon = polygon;
        self.visibility_eye = eye;
        trace!(
            tiles = self.tiles.len(),
            entities = self.entities.len(),
            "visibility_updated"
        );
        self.spawn_visible()
    }

    /// Adds `expand_tiles` rings of king-move neighbors around the marked set,
    /// loading them as needed.
    fn expand_marked(&mut self, marked: &mut HashSet<Pos>) {
        let mut frontier: Vec<Pos> = marked.iter().copied().collect();
        for _ in 0..self.config.expand_tiles {
            frontier.sort();
            let mut next = Vec::new();
            for pos in &frontier {
                for step in NEIGHBORS {
                    if let Some(loaded) = self.load_tile(*pos, step) {
                        if marked.insert(loaded) {
                            next.push(loaded);
                        }
                    }
                }
            }
            frontier = next;
        }
    }

    fn overlaps_loaded_tile(&self, rect: Rect) -> bool {
        let (start, end) = rect.tile_span(TILE_SIZE);
        (start.y..=end.y)
            .any(|y| (start.x..=end.x).any(|x| self.tiles.contains_key(&Pos::new(x, y))))
    }

    /// Spawns every entity linked to a loaded tile that is not live yet.
    fn spawn_visible(&mut self) -> Result<(), WorldError> {
        let mut positions: Vec<Pos> = self.tiles.keys().copied().collect();
        positions.sort();
        for world_pos in positions {
            let Some(level_pos) = self.tiles.get(&world_pos).map(|tile| tile.level_pos) else {
                continue;
            };
            let ids = self
                .level
                .tile(level_pos)
                .map(|tile| tile.spawnables.clone())
                .unwrap_or_default();
            for id in ids {
                if id == self.player || self.entities.contains_key(&id) {
                    continue;
                }
                let Some(spawnable) = self.level.spawnable(id).cloned() else {
                    continue;
                };
                self.spawn_from(&spawnable, world_pos)?;
            }
        }
        Ok(())
    }
}

/// Points along the border of `rect`, clockwise from its origin, every `step` pixels.
fn screen_border_points(rect: Rect, step: i32) -> Vec<Pos> {
    let Rect { origin, size } = rect;
    let (w, h) = (size.dx, size.dy);
    let perimeter = 2 * (w + h);
    let step = step.max(1);
    (0..perimeter)
        .step_by(step as usize)
        .map(|t| {
            if t < w {
                origin + Delta::new(t, 0)
            } else if t < w + h {
                origin + Delta::new(w, t - w)
            } else if t < 2 * w + h {
                origin + Delta::new(w - (t - w - h), h)
            } else {
                origin + Delta::new(0, h - (t - 2 * w - h))
            }
        })
        .collect()
}
