use std::collections::BTreeMap;
use std::fmt;

use bitflags::bitflags;
use thiserror::Error;

use crate::geom::{Orientation, Rect};
use crate::level::{EntityId, Spawnable};
use crate::render::Canvas;

use super::World;

bitflags! {
    /// Collision categories an entity or tile participates in.
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct Contents: u8 {
        const PLAYER_SOLID = 1 << 0;
        const OBJECT_SOLID = 1 << 1;
        const OPAQUE       = 1 << 2;
        const SOLID        = Self::PLAYER_SOLID.bits() | Self::OBJECT_SOLID.bits();
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SpawnError {
    #[error("unknown entity type '{0}'")]
    UnknownType(String),
    #[error("missing property '{0}'")]
    MissingProperty(String),
    #[error("invalid property {key}='{value}': {reason}")]
    InvalidProperty {
        key: String,
        value: String,
        reason: String,
    },
}

/// Behavior plug-in driven by the [`World`].
///
/// The world takes the behavior out of its entity for the duration of each
/// call, so a behavior may freely borrow the world mutably, including its own
/// entity record via [`World::entity_mut`].
pub trait EntityImpl {
    /// Initializes the freshly placed entity from its level definition.
    fn spawn(
        &mut self,
        world: &mut World,
        id: EntityId,
        spawnable: &Spawnable,
    ) -> Result<(), SpawnError>;

    fn update(&mut self, world: &mut World, id: EntityId);

    /// Called once for each participant when two entities meet. Calls for
    /// the two sides may come in either order.
    fn touch(&mut self, world: &mut World, id: EntityId, other: EntityId);

    fn despawn(&mut self, _world: &mut World, _id: EntityId) {}

    fn draw_overlay(&self, _world: &World, _id: EntityId, _canvas: &mut Canvas<'_>) {}
}

/// Live actor. The rectangle is only changed through the world so the tile
/// index stays in sync.
pub struct Entity {
    pub id: EntityId,
    pub entity_type: String,
    pub(super) rect: Rect,
    /// Orientation the sprite is drawn with, in world space.
    pub orientation: Orientation,
    /// World-to-level transform of the tile the entity was spawned from.
    pub transform: Orientation,
    pub contents: Contents,
    pub z_index: i32,
    pub alpha: f32,
    pub image: Option<String>,
    pub fallback_rgba: [u8; 4],
    pub(super) behavior: Option<Box<dyn EntityImpl>>,
}

impl Entity {
    pub(super) fn new(
        id: EntityId,
        entity_type: &str,
        rect: Rect,
        orientation: Orientation,
        transform: Orientation,
    ) -> Self {
        Self {
            id,
            entity_type: entity_type.to_string(),
            rect,
            orientation,
            transform,
            contents: Contents::empty(),
            z_index: 0,
            alpha: 1.0,
            image: None,
            fallback_rgba: [0, 0, 0, 0],
            behavior: None,
        }
    }

    pub fn rect(&self) -> Rect {
        self.rect
    }
}

impl fmt::Debug for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Entity")
            .field("id", &self.id)
            .field("entity_type", &self.entity_type)
            .field("rect", &self.rect)
            .field("orientation", &self.orientation)
            .field("contents", &self.contents)
            .field("z_index", &self.z_index)
            .finish_non_exhaustive()
    }
}

pub type EntityFactory = Box<dyn Fn() -> Box<dyn EntityImpl>>;

/// Maps level type tags to behavior constructors.
#[derive(Default)]
pub struct EntityRegistry {
    factories: BTreeMap<String, EntityFactory>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &mut self,
        entity_type: &str,
        factory: impl Fn() -> Box<dyn EntityImpl> + 'static,
    ) -> &mut Self {
        self.factories
            .insert(entity_type.to_string(), Box::new(factory));
        self
    }

    pub fn contains(&self, entity_type: &str) -> bool {
        self.factories.contains_key(entity_type)
    }

    pub fn entity_types(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    pub fn create(&self, entity_type: &str) -> Result<Box<dyn EntityImpl>, SpawnError> {
        self.factories
            .get(entity_type)
            .map(|factory| factory())
            .ok_or_else(|| SpawnError::UnknownType(entity_type.to_string()))
    }
}

impl fmt::Debug for EntityRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.factories.keys()).finish()
    }
}
