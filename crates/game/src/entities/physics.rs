use engine::{Contents, Delta, EntityId, TraceOptions, TraceResult, World};

/// Sub-pixel units per pixel for velocities and accumulated movement.
pub(crate) const SUBPIXEL_SCALE: i32 = 65536;
pub(crate) const GAME_TPS: i32 = 60;

/// Converts a speed in px/s to sub-pixels per tick.
pub(crate) fn px_per_second(speed: f64) -> i32 {
    (speed * SUBPIXEL_SCALE as f64 / GAME_TPS as f64).round() as i32
}

/// Sub-pixel box mover shared by physics-driven entities.
#[derive(Debug, Clone, Default)]
pub(crate) struct Physics {
    pub(crate) velocity: Delta,
    pub(crate) subpixel: Delta,
    pub(crate) on_ground: bool,
    /// Entity contents that block this mover.
    pub(crate) contents: Contents,
}

impl Physics {
    pub(crate) fn new(contents: Contents) -> Self {
        Self {
            contents,
            ..Self::default()
        }
    }

    /// Moves the entity by its velocity, X first, then Y. A blocked axis
    /// keeps its fractional progress and loses its velocity. Blocking
    /// entities get touched. Returns the blocked traces.
    pub(crate) fn step(&mut self, world: &mut World, id: EntityId) -> Vec<TraceResult> {
        let mut hits = Vec::new();
        let Some(mut rect) = world.entity(id).map(|entity| entity.rect()) else {
            return hits;
        };
        let options = TraceOptions {
            contents: self.contents,
            ignore_entity: Some(id),
            ..TraceOptions::default()
        };

        self.subpixel += self.velocity;
        let movement = self.subpixel.div_floor(SUBPIXEL_SCALE);

        if movement.dx != 0 {
            let dest = rect.origin + Delta::new(movement.dx, 0);
            let trace = world.trace_box(rect, dest, &options);
            if trace.end_pos == dest {
                self.subpixel.dx -= movement.dx * SUBPIXEL_SCALE;
            } else {
                self.subpixel.dx = self.subpixel.dx.clamp(0, SUBPIXEL_SCALE - 1);
                self.velocity.dx = 0;
            }
            rect.origin = trace.end_pos;
            world.set_entity_rect(id, rect);
            if trace.end_pos != dest {
                hits.push(trace);
            }
        }

        if movement.dy != 0 {
            let dest = rect.origin + Delta::new(0, movement.dy);
            let trace = world.trace_box(rect, dest, &options);
            if trace.end_pos == dest {
                self.subpixel.dy -= movement.dy * SUBPIXEL_SCALE;
            } else {
                self.subpixel.dy = self.subpixel.dy.clamp(0, SUBPIXEL_SCALE - 1);
                self.velocity.dy = 0;
                if movement.dy > 0 {
                    self.on_ground = true;
                }
            }
            rect.origin = trace.end_pos;
            world.set_entity_rect(id, rect);
            if trace.end_pos != dest {
                hits.push(trace);
            }
        } else if self.on_ground {
            let below = rect.origin + Delta::south();
            let trace = world.trace_box(rect, below, &options);
            if trace.end_pos != rect.origin {
                self.on_ground = false;
            }
        }

        for hit in &hits {
            if let Some(other) = hit.hit_entity {
                world.touch(id, other);
            }
        }
        hits
    }
}
