use engine::{
    Contents, EntityId, EntityImpl, InputAction, Spawnable, SpawnError, World, WorldEvent,
};

use super::physics::{Physics, GAME_TPS, SUBPIXEL_SCALE};

// Tuned for a 30 px tall player: a one second, 72 px high jump.
const MAX_GROUND_SPEED: i32 = 160 * SUBPIXEL_SCALE / GAME_TPS;
const GROUND_ACCEL: i32 = 960 * SUBPIXEL_SCALE / GAME_TPS / GAME_TPS;
const GROUND_FRICTION: i32 = 640 * SUBPIXEL_SCALE / GAME_TPS / GAME_TPS;
const MAX_AIR_SPEED: i32 = 80 * SUBPIXEL_SCALE / GAME_TPS;
const AIR_ACCEL: i32 = 160 * SUBPIXEL_SCALE / GAME_TPS / GAME_TPS;
const JUMP_VELOCITY: i32 = 288 * SUBPIXEL_SCALE / GAME_TPS;
const GRAVITY: i32 = 576 * SUBPIXEL_SCALE / GAME_TPS / GAME_TPS;
/// Applied while rising without jump held, so a tap still clears 19 px.
const JUMP_EXTRA_GRAVITY: i32 = 72 * GRAVITY / 19 - GRAVITY;

const PLAYER_IMAGE: &str = "player.png";
const PLAYER_FALLBACK_RGBA: [u8; 4] = [236, 200, 96, 255];

/// Moves `vel` towards `max * dir` by `accel`, never slowing it down.
fn accelerate(vel: &mut i32, accel: i32, max: i32, dir: i32) {
    let mut new_vel = *vel + dir * accel;
    if new_vel * dir > max {
        new_vel = max * dir;
    }
    if new_vel * dir > *vel * dir {
        *vel = new_vel;
    }
}

fn friction(vel: &mut i32, amount: i32) {
    accelerate(vel, amount, 0, 1);
    accelerate(vel, amount, 0, -1);
}

#[derive(Debug, Default)]
pub(crate) struct Player {
    physics: Physics,
    jumping: bool,
}

impl EntityImpl for Player {
    fn spawn(
        &mut self,
        world: &mut World,
        id: EntityId,
        _spawnable: &Spawnable,
    ) -> Result<(), SpawnError> {
        self.physics = Physics::new(Contents::PLAYER_SOLID);
        self.jumping = false;
        world.set_entity_contents(id, Contents::OBJECT_SOLID);
        if let Some(entity) = world.entity_mut(id) {
            entity.image = Some(PLAYER_IMAGE.to_string());
            entity.fallback_rgba = PLAYER_FALLBACK_RGBA;
            entity.z_index = 1;
        }
        Ok(())
    }

    fn update(&mut self, world: &mut World, id: EntityId) {
        let input = *world.input();
        if input.just_pressed(InputAction::Exit) {
            world.emit(WorldEvent::QuitRequested);
        }

        let velocity = &mut self.physics.velocity;
        if input.is_down(InputAction::Jump) {
            if !self.jumping && self.physics.on_ground {
                velocity.dy -= JUMP_VELOCITY;
                self.physics.on_ground = false;
                self.jumping = true;
                world.emit(WorldEvent::PlaySound {
                    sound: "jump".to_string(),
                });
            }
        } else {
            self.jumping = false;
        }

        let (accel, max_speed) = if self.physics.on_ground {
            friction(&mut velocity.dx, GROUND_FRICTION);
            (GROUND_ACCEL, MAX_GROUND_SPEED)
        } else {
            if velocity.dy < 0 && !self.jumping {
                velocity.dy += JUMP_EXTRA_GRAVITY;
            }
            (AIR_ACCEL, MAX_AIR_SPEED)
        };
        if input.is_down(InputAction::Left) {
            accelerate(&mut velocity.dx, accel, max_speed, -1);
        }
        if input.is_down(InputAction::Right) {
            accelerate(&mut velocity.dx, accel, max_speed, 1);
        }
        velocity.dy += GRAVITY;

        self.physics.step(world, id);
    }

    fn touch(&mut self, _world: &mut World, _id: EntityId, _other: EntityId) {
        // The other side reacts in its own touch.
    }
}
