use engine::world::{CHECKPOINT_SEEN_PREFIX, LAST_CHECKPOINT_KEY};
use engine::{EntityId, EntityImpl, Orientation, Spawnable, SpawnError, World, WorldEvent};
use tracing::info;

use super::{invalid_property, player_overlaps, required_property};

/// Records the player's progress when they pass through upright, or
/// mirrored along X.
#[derive(Debug, Default)]
pub(crate) struct Checkpoint {
    /// Orientation this entity must have, the inverse of the authored
    /// player orientation.
    required_orientation: Orientation,
    name: String,
    text: String,
}

impl Checkpoint {
    /// How the checkpoint is currently seen, as stored in the player state.
    fn seen_as(&self, orientation: Orientation) -> Option<&'static str> {
        if orientation == self.required_orientation {
            Some("Identity")
        } else if orientation == Orientation::flip_x().concat(self.required_orientation) {
            Some("FlipX")
        } else {
            None
        }
    }
}

impl EntityImpl for Checkpoint {
    fn spawn(
        &mut self,
        _world: &mut World,
        _id: EntityId,
        spawnable: &Spawnable,
    ) -> Result<(), SpawnError> {
        let required = required_property(spawnable, "required_orientation")?;
        self.required_orientation = required
            .parse::<Orientation>()
            .map_err(|error| invalid_property("required_orientation", required, error.to_string()))?
            .inverse();
        self.name = spawnable.property("name").unwrap_or_default().to_string();
        self.text = spawnable.property("text").unwrap_or_default().to_string();
        Ok(())
    }

    fn update(&mut self, world: &mut World, id: EntityId) {
        let Some(orientation) = world.entity(id).map(|entity| entity.orientation) else {
            return;
        };
        let Some(seen_as) = self.seen_as(orientation) else {
            return;
        };
        if !player_overlaps(world, id) {
            return;
        }

        let seen_key = format!("{CHECKPOINT_SEEN_PREFIX}{}", self.name);
        let player = world.player();
        let state = world.level_mut().persistent_state_mut(player);
        let last = state.get(LAST_CHECKPOINT_KEY).map(String::as_str);
        let already = last == Some(self.name.as_str())
            && state.get(&seen_key).map(String::as_str) == Some(seen_as);
        if already {
            return;
        }
        state.insert(seen_key, seen_as.to_string());
        state.insert(LAST_CHECKPOINT_KEY.to_string(), self.name.clone());

        info!(checkpoint = self.name.as_str(), seen_as, "checkpoint_reached");
        world.emit(WorldEvent::CheckpointReached {
            name: self.name.clone(),
        });
        if !self.text.is_empty() {
            world.emit(WorldEvent::CenterPrint {
                text: self.text.clone(),
            });
        }
    }

    fn touch(&mut self, _world: &mut World, _id: EntityId, _other: EntityId) {}
}
