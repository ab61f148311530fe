use engine::{Contents, Delta, EntityId, EntityImpl, Spawnable, SpawnError, World};

use super::physics::{px_per_second, Physics};
use super::sprite::configure_sprite;
use super::{invalid_property, parse_property};

/// Sprite drifting at a constant velocity until something blocks it.
#[derive(Debug, Default)]
pub(crate) struct MovingSprite {
    physics: Physics,
    base_alpha: f32,
    /// Zero means the sprite never fades out.
    fade_frames: u32,
    /// Frames left while fading out, counting down to despawn.
    fade_frame: Option<u32>,
}

impl MovingSprite {
    fn start_fade(&mut self) {
        if self.fade_frames > 0 && self.fade_frame.is_none() {
            self.fade_frame = Some(self.fade_frames);
        }
    }
}

fn parse_velocity(spawnable: &Spawnable) -> Result<Delta, SpawnError> {
    let Some(raw) = spawnable.property("velocity") else {
        return Ok(Delta::default());
    };
    let parts: Vec<&str> = raw.split_whitespace().collect();
    let [dx, dy] = parts.as_slice() else {
        return Err(invalid_property("velocity", raw, "expected \"dx dy\""));
    };
    let parse = |part: &str| {
        part.parse::<f64>()
            .map_err(|error| invalid_property("velocity", raw, error.to_string()))
    };
    Ok(Delta::new(px_per_second(parse(dx)?), px_per_second(parse(dy)?)))
}

impl EntityImpl for MovingSprite {
    fn spawn(
        &mut self,
        world: &mut World,
        id: EntityId,
        spawnable: &Spawnable,
    ) -> Result<(), SpawnError> {
        configure_sprite(world, id, spawnable)?;
        let velocity = parse_velocity(spawnable)?;
        let fade_frames = parse_property::<u32>(spawnable, "despawn_fade_frames")?.unwrap_or(0);

        let Some(entity) = world.entity(id) else {
            return Ok(());
        };
        // Velocities are authored in level space.
        let world_velocity = entity.transform.inverse().apply(velocity);
        self.base_alpha = entity.alpha;
        self.physics = Physics::new(Contents::OBJECT_SOLID);
        self.physics.velocity = world_velocity;
        self.fade_frames = fade_frames;
        self.fade_frame = None;
        Ok(())
    }

    fn update(&mut self, world: &mut World, id: EntityId) {
        let player = world.player();
        let hits = self.physics.step(world, id);
        if hits
            .iter()
            .any(|hit| {
                hit.hit_tile.is_some() || hit.hit_entity.is_some_and(|other| other != player)
            })
        {
            self.start_fade();
        }

        let Some(remaining) = self.fade_frame else {
            return;
        };
        let remaining = remaining.saturating_sub(1);
        if remaining == 0 {
            world.despawn_entity(id);
            return;
        }
        self.fade_frame = Some(remaining);
        if let Some(entity) = world.entity_mut(id) {
            entity.alpha = self.base_alpha * remaining as f32 / self.fade_frames as f32;
        }
    }

    fn touch(&mut self, _world: &mut World, _id: EntityId, _other: EntityId) {}
}

#[cfg(test)]
mod tests {
    use engine::{InputSnapshot, Pos};

    use super::*;
    use crate::entities::test_support::{grid_level, run_ticks, world_for};

    const CORRIDOR: [&str; 5] = [
        "##########",
        "#........#",
        "#........#",
        "#........#",
        "##########",
    ];

    fn corridor_world(extra: &str) -> World {
        world_for(grid_level(
            &CORRIDOR,
            &format!(
                r#"<object id="1" type="Player" x="20" y="36" width="12" height="12"/>
<object id="2" type="MovingSprite" x="60" y="20" width="8" height="8">
  <property name="image" value="bullet.png"/>
  <property name="velocity" value="120 0"/>
{extra}
</object>"#
            ),
        ))
    }

    #[test]
    fn velocity_is_parsed_in_pixels_per_second() {
        let mut world = corridor_world("");
        let start = world.entity(EntityId(2)).expect("sprite").rect().origin;
        run_ticks(&mut world, InputSnapshot::empty(), 10);

        // 120 px/s is two pixels per tick.
        assert_eq!(
            world.entity(EntityId(2)).expect("sprite").rect().origin,
            start + Delta::new(20, 0)
        );
    }

    #[test]
    fn sprite_without_fade_stops_at_wall() {
        let mut world = corridor_world("");
        run_ticks(&mut world, InputSnapshot::empty(), 120);

        // Right wall column starts at x = 144.
        assert_eq!(
            world.entity(EntityId(2)).expect("sprite").rect().origin,
            Pos::new(136, 20)
        );
    }

    #[test]
    fn fading_sprite_despawns_and_respawns_at_home() {
        let mut world = corridor_world(r#"<property name="despawn_fade_frames" value="4"/>"#);
        let home = world.entity(EntityId(2)).expect("sprite").rect().origin;

        // 76 px to the wall at two per tick; the 39th tick is blocked.
        run_ticks(&mut world, InputSnapshot::empty(), 39);
        let fading = world.entity(EntityId(2)).expect("fading");
        assert_eq!(fading.rect().origin, Pos::new(136, 20));
        assert_eq!(fading.alpha, 0.75);

        run_ticks(&mut world, InputSnapshot::empty(), 3);
        // Its home tile is still loaded, so the definition spawns afresh.
        let fresh = world.entity(EntityId(2)).expect("respawned");
        assert_eq!(fresh.rect().origin, home);
        assert_eq!(fresh.alpha, 1.0);
    }

    #[test]
    fn malformed_velocity_is_rejected() {
        let spawnable = Spawnable {
            id: EntityId(2),
            entity_type: "MovingSprite".to_string(),
            rect: Default::default(),
            orientation: Default::default(),
            properties: [("velocity".to_string(), "fast".to_string())]
                .into_iter()
                .collect(),
        };
        assert!(matches!(
            parse_velocity(&spawnable),
            Err(SpawnError::InvalidProperty { .. })
        ));
    }
}
