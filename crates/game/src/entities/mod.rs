use std::str::FromStr;

use engine::{EntityId, EntityRegistry, Spawnable, SpawnError, World};

mod checkpoint;
mod moving_sprite;
mod physics;
mod player;
mod question_block;
mod sprite;
mod triggers;

pub(crate) use checkpoint::Checkpoint;
pub(crate) use moving_sprite::MovingSprite;
pub(crate) use player::Player;
pub(crate) use question_block::QuestionBlock;
pub(crate) use sprite::Sprite;
pub(crate) use triggers::{SetWarpZoneState, SwitchMusic};

/// Registers every behavior the levels may reference.
pub(crate) fn build_registry() -> EntityRegistry {
    let mut registry = EntityRegistry::new();
    registry
        .register("Player", || Box::<Player>::default())
        .register("Sprite", || Box::<Sprite>::default())
        .register("MovingSprite", || Box::<MovingSprite>::default())
        .register("QuestionBlock", || Box::<QuestionBlock>::default())
        .register("Checkpoint", || Box::<Checkpoint>::default())
        .register("SwitchMusic", || Box::<SwitchMusic>::default())
        .register("SetWarpZoneState", || Box::<SetWarpZoneState>::default());
    registry
}

fn required_property<'a>(spawnable: &'a Spawnable, key: &str) -> Result<&'a str, SpawnError> {
    spawnable
        .property(key)
        .ok_or_else(|| SpawnError::MissingProperty(key.to_string()))
}

/// Parses an optional property; an empty value counts as absent.
fn parse_property<T>(spawnable: &Spawnable, key: &str) -> Result<Option<T>, SpawnError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match spawnable.property(key) {
        None | Some("") => Ok(None),
        Some(value) => value
            .parse::<T>()
            .map(Some)
            .map_err(|error| invalid_property(key, value, error.to_string())),
    }
}

fn invalid_property(key: &str, value: &str, reason: impl Into<String>) -> SpawnError {
    SpawnError::InvalidProperty {
        key: key.to_string(),
        value: value.to_string(),
        reason: reason.into(),
    }
}

/// Whether the player overlaps `id` right now.
fn player_overlaps(world: &World, id: EntityId) -> bool {
    let (Some(player), Some(entity)) = (world.entity(world.player()), world.entity(id)) else {
        return false;
    };
    player.rect().intersects(&entity.rect())
}


#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use engine::{Delta, Orientation, Pos, Rect};

    use super::*;

    fn spawnable_with(properties: &[(&str, &str)]) -> Spawnable {
        Spawnable {
            id: EntityId(9),
            entity_type: "Sprite".to_string(),
            rect: Rect::new(Pos::new(0, 0), Delta::new(16, 16)),
            orientation: Orientation::identity(),
            properties: properties
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect::<BTreeMap<_, _>>(),
        }
    }

    #[test]
    fn registry_knows_every_level_type() {
        let registry = build_registry();
        let types: Vec<&str> = registry.entity_types().collect();
        for expected in [
            "Checkpoint",
            "MovingSprite",
            "Player",
            "QuestionBlock",
            "SetWarpZoneState",
            "Sprite",
            "SwitchMusic",
        ] {
            assert!(types.contains(&expected), "missing {expected}");
        }
        assert!(registry.create("Teleporter").is_err());
    }

    #[test]
    fn parse_property_reports_key_and_value() {
        let spawnable = spawnable_with(&[("alpha", "lots"), ("z_index", "")]);

        let error = parse_property::<f32>(&spawnable, "alpha").expect_err("bad float");
        match error {
            SpawnError::InvalidProperty { key, value, .. } => {
                assert_eq!(key, "alpha");
                assert_eq!(value, "lots");
            }
            other => panic!("unexpected error {other:?}"),
        }
        assert_eq!(parse_property::<i32>(&spawnable, "z_index").expect("empty"), None);
        assert_eq!(parse_property::<i32>(&spawnable, "missing").expect("absent"), None);
        assert_eq!(
            required_property(&spawnable, "image"),
            Err(SpawnError::MissingProperty("image".to_string()))
        );
    }
}
