use engine::{Contents, Delta, EntityId, EntityImpl, Orientation, Spawnable, SpawnError, World};
use tracing::debug;

const USED_KEY: &str = "used";
const QUESTION_IMAGE: &str = "questionblock.png";
const USED_IMAGE: &str = "exclamationblock.png";

const USE_FRAMES_PER_PIXEL: u32 = 2;
const USE_PIXELS: u32 = 4;
const USE_ANIM_FRAMES: u32 = 2 * USE_FRAMES_PER_PIXEL * USE_PIXELS;

/// Block that turns into a used block when bumped from below. Kaizo blocks
/// are invisible and only solid while the player is below them.
#[derive(Debug, Default)]
pub(crate) struct QuestionBlock {
    kaizo: bool,
    used: bool,
    use_anim_frame: u32,
}

fn is_above(world: &World, block: EntityId, other: EntityId) -> bool {
    let (Some(block), Some(other)) = (world.entity(block), world.entity(other)) else {
        return false;
    };
    block.rect().opposite_corner().y < other.rect().origin.y
}

impl EntityImpl for QuestionBlock {
    fn spawn(
        &mut self,
        world: &mut World,
        id: EntityId,
        spawnable: &Spawnable,
    ) -> Result<(), SpawnError> {
        self.kaizo = spawnable.flag("kaizo");
        self.used = world
            .level()
            .persistent_state(id)
            .and_then(|state| state.get(USED_KEY))
            .is_some_and(|used| used == "true");
        self.use_anim_frame = if self.used { USE_ANIM_FRAMES } else { 0 };

        // Never opaque; the shadows it would cast are distracting.
        world.set_entity_contents(id, Contents::SOLID);
        let image = if self.used {
            Some(USED_IMAGE)
        } else if !self.kaizo {
            Some(QUESTION_IMAGE)
        } else {
            None
        };
        if let Some(entity) = world.entity_mut(id) {
            entity.orientation = Orientation::identity();
            entity.image = image.map(str::to_string);
        }
        Ok(())
    }

    fn update(&mut self, world: &mut World, id: EntityId) {
        if self.used {
            if self.use_anim_frame >= USE_ANIM_FRAMES {
                return;
            }
            self.use_anim_frame += 1;
            if self.use_anim_frame % USE_FRAMES_PER_PIXEL != 0 {
                return;
            }
            let step = if self.use_anim_frame <= USE_FRAMES_PER_PIXEL * USE_PIXELS {
                Delta::north()
            } else {
                Delta::south()
            };
            if let Some(mut rect) = world.entity(id).map(|entity| entity.rect()) {
                rect.origin += step;
                world.set_entity_rect(id, rect);
            }
            return;
        }
        if self.kaizo {
            let solid = is_above(world, id, world.player());
            let contents = if solid {
                Contents::SOLID
            } else {
                Contents::empty()
            };
            world.set_entity_contents(id, contents);
        }
    }

    fn touch(&mut self, world: &mut World, id: EntityId, other: EntityId) {
        if self.used || !is_above(world, id, other) {
            return;
        }
        self.used = true;
        world
            .level_mut()
            .persistent_state_mut(id)
            .insert(USED_KEY.to_string(), "true".to_string());
        world.set_entity_contents(id, Contents::SOLID);
        if let Some(entity) = world.entity_mut(id) {
            entity.image = Some(USED_IMAGE.to_string());
        }
        debug!(id = %id, kaizo = self.kaizo, "question_block_used");
    }
}
