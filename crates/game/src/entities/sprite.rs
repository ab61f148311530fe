use engine::{Contents, EntityId, EntityImpl, Orientation, Spawnable, SpawnError, World};

use super::{invalid_property, parse_property, required_property};

const MIN_SPRITE_Z: i32 = -10;
const MAX_SPRITE_Z: i32 = 10;

/// Static image, optionally solid or light blocking.
#[derive(Debug, Default)]
pub(crate) struct Sprite;

impl EntityImpl for Sprite {
    fn spawn(
        &mut self,
        world: &mut World,
        id: EntityId,
        spawnable: &Spawnable,
    ) -> Result<(), SpawnError> {
        configure_sprite(world, id, spawnable)
    }

    fn update(&mut self, _world: &mut World, _id: EntityId) {}

    fn touch(&mut self, _world: &mut World, _id: EntityId, _other: EntityId) {}
}

/// Applies the shared sprite properties to the entity record.
pub(crate) fn configure_sprite(
    world: &mut World,
    id: EntityId,
    spawnable: &Spawnable,
) -> Result<(), SpawnError> {
    let image = required_property(spawnable, "image")?.to_string();

    let mut contents = Contents::empty();
    if spawnable.flag("solid") {
        contents |= Contents::SOLID;
    }
    if spawnable.flag("opaque") {
        contents |= Contents::OPAQUE;
    }
    if let Some(player_solid) = parse_property::<bool>(spawnable, "player_solid")? {
        contents.set(Contents::PLAYER_SOLID, player_solid);
    }
    if let Some(object_solid) = parse_property::<bool>(spawnable, "object_solid")? {
        contents.set(Contents::OBJECT_SOLID, object_solid);
    }

    let alpha = parse_property::<f32>(spawnable, "alpha")?.unwrap_or(1.0);
    let z_index = parse_property::<i32>(spawnable, "z_index")?.unwrap_or(0);
    if !(MIN_SPRITE_Z..=MAX_SPRITE_Z).contains(&z_index) {
        return Err(invalid_property(
            "z_index",
            &z_index.to_string(),
            format!("must be within {MIN_SPRITE_Z}..={MAX_SPRITE_Z}"),
        ));
    }

    let Some(entity) = world.entity(id) else {
        return Ok(());
    };
    let transform = entity.transform;
    let orientation = if spawnable.flag("no_transform") {
        spawnable.orientation
    } else if transform.determinant() < 0 {
        // Seen through a mirror; undo the flip along the requested axis.
        match spawnable.property("no_flip") {
            Some("x") => transform
                .inverse()
                .concat(Orientation::flip_x())
                .concat(spawnable.orientation),
            Some("y") => transform
                .inverse()
                .concat(Orientation::flip_y())
                .concat(spawnable.orientation),
            _ => entity.orientation,
        }
    } else {
        entity.orientation
    };

    world.set_entity_contents(id, contents);
    if let Some(entity) = world.entity_mut(id) {
        entity.image = Some(image);
        entity.alpha = alpha.clamp(0.0, 1.0);
        entity.z_index = z_index;
        entity.orientation = orientation;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use engine::{WorldConfig, WorldError};

    use super::*;
    use crate::entities::build_registry;
    use crate::entities::test_support::{grid_level, world_for};

    const ROOM: [&str; 5] = ["######", "#....#", "#....#", "#....#", "######"];
    const PLAYER: &str = r#"<object id="1" type="Player" x="20" y="20" width="12" height="12"/>"#;

    fn sprite_world(properties: &str) -> Result<World, WorldError> {
        let objects = format!(
            r#"{PLAYER}
<object id="2" type="Sprite" x="40" y="40" width="16" height="16">
{properties}
</object>"#
        );
        World::new(
            grid_level(&ROOM, &objects),
            build_registry(),
            WorldConfig::default(),
        )
    }

    #[test]
    fn sprite_reads_image_and_contents() {
        let world = sprite_world(
            r#"<property name="image" value="crate.png"/>
<property name="solid" value="true"/>
<property name="opaque" value="true"/>
<property name="player_solid" value="false"/>
<property name="alpha" value="0.5"/>
<property name="z_index" value="-3"/>"#,
        )
        .expect("world");
        let sprite = world.entity(EntityId(2)).expect("sprite");

        assert_eq!(sprite.image.as_deref(), Some("crate.png"));
        assert_eq!(sprite.contents, Contents::OBJECT_SOLID | Contents::OPAQUE);
        assert_eq!(sprite.alpha, 0.5);
        assert_eq!(sprite.z_index, -3);
        assert_eq!(sprite.orientation, Orientation::identity());
    }

    #[test]
    fn sprite_without_image_fails_to_spawn() {
        let error = sprite_world("").expect_err("missing image");
        match error {
            WorldError::Spawn { id, source, .. } => {
                assert_eq!(id, EntityId(2));
                assert_eq!(source, SpawnError::MissingProperty("image".to_string()));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn sprite_rejects_out_of_range_z_index() {
        let error = sprite_world(
            r#"<property name="image" value="crate.png"/>
<property name="z_index" value="40"/>"#,
        )
        .expect_err("z out of range");
        assert!(matches!(
            error,
            WorldError::Spawn {
                source: SpawnError::InvalidProperty { .. },
                ..
            }
        ));
    }

    #[test]
    fn sprite_is_not_solid_by_default() {
        let world = world_for(grid_level(
            &ROOM,
            &format!(
                r#"{PLAYER}
<object id="2" type="Sprite" x="40" y="40" width="16" height="16">
  <property name="image" value="crate.png"/>
</object>"#
            ),
        ));
        let sprite = world.entity(EntityId(2)).expect("sprite");
        assert_eq!(sprite.contents, Contents::empty());
        assert_eq!(sprite.alpha, 1.0);
    }
}
