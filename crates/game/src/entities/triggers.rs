use engine::{EntityId, EntityImpl, Spawnable, SpawnError, World, WorldEvent};

use super::{invalid_property, player_overlaps, required_property};

/// Tracks whether the player overlaps a trigger, firing on entry only.
#[derive(Debug, Default)]
struct Touching(bool);

impl Touching {
    fn entered(&mut self, world: &World, id: EntityId) -> bool {
        let now = player_overlaps(world, id);
        let entered = now && !self.0;
        self.0 = now;
        entered
    }
}

#[derive(Debug, Default)]
pub(crate) struct SwitchMusic {
    music: String,
    touching: Touching,
}

impl EntityImpl for SwitchMusic {
    fn spawn(
        &mut self,
        _world: &mut World,
        _id: EntityId,
        spawnable: &Spawnable,
    ) -> Result<(), SpawnError> {
        self.music = spawnable.property("music").unwrap_or_default().to_string();
        self.touching = Touching::default();
        Ok(())
    }

    fn update(&mut self, world: &mut World, id: EntityId) {
        if self.touching.entered(world, id) {
            world.emit(WorldEvent::SwitchMusic {
                music: self.music.clone(),
            });
        }
    }

    fn touch(&mut self, _world: &mut World, _id: EntityId, _other: EntityId) {}
}

#[derive(Debug, Default)]
pub(crate) struct SetWarpZoneState {
    warp_zone: String,
    state: bool,
    touching: Touching,
}

impl EntityImpl for SetWarpZoneState {
    fn spawn(
        &mut self,
        _world: &mut World,
        _id: EntityId,
        spawnable: &Spawnable,
    ) -> Result<(), SpawnError> {
        self.warp_zone = required_property(spawnable, "warp_zone")?.to_string();
        let state = required_property(spawnable, "state")?;
        self.state = state
            .parse::<bool>()
            .map_err(|error| invalid_property("state", state, error.to_string()))?;
        self.touching = Touching::default();
        Ok(())
    }

    fn update(&mut self, world: &mut World, id: EntityId) {
        if self.touching.entered(world, id) {
            world.set_warp_zone_state(&self.warp_zone, self.state);
        }
    }

    fn touch(&mut self, _world: &mut World, _id: EntityId, _other: EntityId) {}
}

#[cfg(test)]
mod tests {
    use engine::{InputAction, InputSnapshot, WorldConfig, WorldError};

    use super::*;
    use crate::entities::build_registry;
    use crate::entities::test_support::{grid_level, run_ticks, world_for};

    const HALL: [&str; 6] = [
        "############",
        "#..........#",
        "#..........#",
        "#..........#",
        "#..........#",
        "############",
    ];

    const PLAYER: &str = r#"<object id="1" type="Player" x="20" y="40" width="12" height="30"/>"#;

    #[test]
    fn switch_music_fires_once_per_entry() {
        let mut world = world_for(grid_level(
            &HALL,
            &format!(
                r#"{PLAYER}
<object id="2" type="SwitchMusic" x="16" y="16" width="32" height="64">
  <property name="music" value="caves"/>
</object>"#
            ),
        ));
        run_ticks(&mut world, InputSnapshot::empty(), 30);
        assert_eq!(
            world.drain_events(),
            vec![WorldEvent::SwitchMusic {
                music: "caves".to_string()
            }]
        );

        // Walk out of the trigger and back in.
        let right = InputSnapshot::empty().with_held(InputAction::Right, true);
        run_ticks(&mut world, right, 40);
        assert!(world.drain_events().is_empty());
        let left = InputSnapshot::empty().with_held(InputAction::Left, true);
        run_ticks(&mut world, left, 80);
        assert_eq!(
            world.drain_events(),
            vec![WorldEvent::SwitchMusic {
                music: "caves".to_string()
            }]
        );
    }

    #[test]
    fn set_warp_zone_state_toggles_on_entry() {
        let mut world = world_for(grid_level(
            &HALL,
            &format!(
                r#"{PLAYER}
<object id="2" type="SetWarpZoneState" x="16" y="16" width="32" height="64">
  <property name="warp_zone" value="bridge"/>
  <property name="state" value="false"/>
</object>"#
            ),
        ));
        assert!(world.warp_zone_enabled("bridge"));
        run_ticks(&mut world, InputSnapshot::empty(), 2);
        assert!(!world.warp_zone_enabled("bridge"));
    }

    #[test]
    fn set_warp_zone_state_requires_its_properties() {
        let level = grid_level(
            &HALL,
            &format!(
                r#"{PLAYER}
<object id="2" type="SetWarpZoneState" x="16" y="16" width="32" height="64">
  <property name="state" value="maybe"/>
</object>"#
            ),
        );
        let error = World::new(level, build_registry(), WorldConfig::default())
            .expect_err("missing warp_zone");
        assert!(matches!(
            error,
            WorldError::Spawn {
                source: SpawnError::MissingProperty(_),
                ..
            }
        ));
    }
}
