use crate::geom::{Delta, Pos, Rect};
use crate::level::{EntityId, TILE_SIZE};

use super::{Contents, World, MIN_ENTITY_SIZE};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TraceOptions {
    /// Contents that stop the trace.
    pub contents: Contents,
    pub no_tiles: bool,
    pub no_entities: bool,
    /// Materialize unloaded tiles on the way instead of stopping at them.
    pub load_tiles: bool,
    /// Pass through unloaded tiles without loading them.
    pub ignore_fog: bool,
    pub ignore_entity: Option<EntityId>,
}

impl Default for TraceOptions {
    fn default() -> Self {
        Self {
            contents: Contents::SOLID,
            no_tiles: false,
            no_entities: false,
            load_tiles: false,
            ignore_fog: false,
            ignore_entity: None,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceResult {
    /// Last position the trace reached without being blocked.
    pub end_pos: Pos,
    /// World tiles entered, in order, starting with the origin tile.
    pub path: Vec<Pos>,
    pub hit_tile: Option<Pos>,
    pub hit_entity: Option<EntityId>,
    pub hit_fog_of_war: bool,
}

impl TraceResult {
    pub fn is_blocked(&self) -> bool {
        self.hit_tile.is_some() || self.hit_entity.is_some() || self.hit_fog_of_war
    }
}

impl World {
    /// Walks a point from `from` by `delta`, one pixel at a time, through the
    /// loaded covering.
    pub fn trace_line(&mut self, from: Pos, delta: Delta, options: &TraceOptions) -> TraceResult {
        let mut tile_pos = from.div_floor(TILE_SIZE);
        let mut result = TraceResult {
            end_pos: from,
            path: vec![tile_pos],
            ..TraceResult::default()
        };
        if !self.tiles.contains_key(&tile_pos) && !options.ignore_fog {
            result.hit_fog_of_war = true;
            return result;
        }

        let steps = delta.norm0();
        for i in 1..=steps {
            let pos = from + delta.mul_frac(i, steps);
            let next_tile = pos.div_floor(TILE_SIZE);
            if next_tile != tile_pos {
                let crossing = next_tile.delta(tile_pos);
                for step in [Delta::new(crossing.dx, 0), Delta::new(0, crossing.dy)] {
                    if step.is_zero() {
                        continue;
                    }
                    if !self.enter_tile(tile_pos, step, options, &mut result) {
                        return result;
                    }
                    tile_pos = tile_pos + step;
                }
            }
            if !options.no_entities {
                if let Some(id) = self.entity_blocking_at(pos, from, tile_pos, options) {
                    result.hit_entity = Some(id);
                    return result;
                }
            }
            result.end_pos = pos;
        }
        result
    }

    /// Steps the trace into the neighbor tile. Returns `false` when the
    /// trace has to stop there.
    fn enter_tile(
        &mut self,
        from: Pos,
        step: Delta,
        options: &TraceOptions,
        result: &mut TraceResult,
    ) -> bool {
        let target = from + step;
        if !self.tiles.contains_key(&target) {
            if options.load_tiles {
                if self.load_tile(from, step).is_none() {
                    result.hit_fog_of_war = true;
                    return false;
                }
            } else if options.ignore_fog {
                result.path.push(target);
                return true;
            } else {
                result.hit_fog_of_war = true;
                return false;
            }
        }
        result.path.push(target);
        let blocks = !options.no_tiles
            && self
                .tiles
                .get(&target)
                .is_some_and(|tile| tile.contents.intersects(options.contents));
        if blocks {
            result.hit_tile = Some(target);
            return false;
        }
        true
    }

    /// Lowest-id entity at `pos` that blocks the trace. Entities already
    /// overlapping the start point never block.
    fn entity_blocking_at(
        &self,
        pos: Pos,
        start: Pos,
        tile_pos: Pos,
        options: &TraceOptions,
    ) -> Option<EntityId> {
        let ids = self.tile_entities.get(&tile_pos)?;
        ids.iter().copied().find(|id| {
            if options.ignore_entity == Some(*id) {
                return false;
            }
            self.entities.get(id).is_some_and(|entity| {
                entity.contents.intersects(options.contents)
                    && entity.rect.contains(pos)
                    && !entity.rect.contains(start)
            })
        })
    }

    /// Sweeps `rect` so that its origin moves towards `to`. The box stops at
    /// the shortest of the leading-edge line traces; at equal distance a
    /// trace that hit an entity wins, then the lower entity id.
    pub fn trace_box(&mut self, rect: Rect, to: Pos, options: &TraceOptions) -> TraceResult {
        let delta = to.delta(rect.origin);
        let size = rect.size;
        let x_edge = if delta.dx < 0 { 0 } else { size.dx - 1 };
        let y_edge = if delta.dy < 0 { 0 } else { size.dy - 1 };

        let mut offsets = Vec::new();
        push_edge_samples(
            &mut offsets,
            Delta::new(x_edge, 0),
            Delta::new(x_edge, size.dy - 1),
        );
        push_edge_samples(
            &mut offsets,
            Delta::new(0, y_edge),
            Delta::new(size.dx - 1, y_edge),
        );
        offsets.sort();
        offsets.dedup();

        let mut best: Option<((i32, u64), TraceResult)> = None;
        for offset in offsets {
            let mut trace = self.trace_line(rect.origin + offset, delta, options);
            trace.end_pos = trace.end_pos - offset;
            let mut score = 2 * trace.end_pos.delta(rect.origin).norm1();
            if trace.hit_entity.is_none() {
                score += 1;
            }
            let key = (score, trace.hit_entity.map_or(u64::MAX, |id| id.0));
            if best.as_ref().map_or(true, |(best_key, _)| key < *best_key) {
                best = Some((key, trace));
            }
        }
        best.map(|(_, trace)| trace).unwrap_or_else(|| TraceResult {
            end_pos: rect.origin,
            path: vec![rect.origin.div_floor(TILE_SIZE)],
            ..TraceResult::default()
        })
    }
}

/// Sample points along an edge every `MIN_ENTITY_SIZE` pixels, both ends included.
fn push_edge_samples(out: &mut Vec<Delta>, start: Delta, end: Delta) {
    let edge = end - start;
    let length = edge.norm1();
    out.push(start);
    let mut i = MIN_ENTITY_SIZE;
    while i < length {
        out.push(start + edge.mul(i).div_floor(length));
        i += MIN_ENTITY_SIZE;
    }
    out.push(end);
}
