use std::path::PathBuf;

use engine::{
    Canvas, FogCompositor, FogConfig, InputSnapshot, Pos, Scene, SceneCommand, SceneRenderer,
    SceneStats, World, WorldEvent,
};
use tracing::{debug, error, info, warn};

use super::save_store::write_save;

/// One play-through of a level: simulation, presentation and saving.
pub(crate) struct GameSession {
    world: World,
    renderer: SceneRenderer,
    fog_config: FogConfig,
    fog: Option<FogCompositor>,
    fog_size: (u32, u32),
    scene_buffer: Vec<u8>,
    save_path: PathBuf,
}

impl GameSession {
    pub(crate) fn new(world: World, images_dir: PathBuf, save_path: PathBuf) -> Self {
        Self {
            world,
            renderer: SceneRenderer::new(images_dir),
            fog_config: FogConfig::default(),
            fog: None,
            fog_size: (0, 0),
            scene_buffer: Vec::new(),
            save_path,
        }
    }

    fn save(&self) {
        let save = match self.world.level().save_game() {
            Ok(save) => save,
            Err(err) => {
                warn!(error = %err, "save_encode_failed");
                return;
            }
        };
        match write_save(&self.save_path, &save) {
            Ok(()) => info!(path = %self.save_path.display(), "game_saved"),
            Err(err) => warn!(error = %err, "save_write_failed"),
        }
    }

    fn handle_events(&mut self) -> SceneCommand {
        let mut command = SceneCommand::None;
        for event in self.world.drain_events() {
            match event {
                WorldEvent::CheckpointReached { name } => {
                    info!(checkpoint = name.as_str(), "checkpoint_saved");
                    self.save();
                }
                WorldEvent::QuitRequested => command = SceneCommand::Quit,
                WorldEvent::CenterPrint { text } => info!(text = text.as_str(), "center_print"),
                WorldEvent::PlaySound { sound } => debug!(sound = sound.as_str(), "play_sound"),
                WorldEvent::SwitchMusic { music } => {
                    info!(music = music.as_str(), "switch_music")
                }
            }
        }
        command
    }

    /// (Re)creates the fog state when the frame size changes.
    fn ensure_fog(&mut self, width: u32, height: u32) {
        if self.fog.is_some() && self.fog_size == (width, height) {
            return;
        }
        self.fog_size = (width, height);
        self.scene_buffer = vec![0; width as usize * height as usize * 4];
        self.fog = Some(FogCompositor::new(
            width as usize,
            height as usize,
            self.fog_config,
        ));
    }
}

/// Moves world pixels into the screen space of a canvas whose top-left
/// shows `origin`.
fn to_screen(points: &[Pos], origin: Pos) -> Vec<Pos> {
    points.iter().map(|p| *p - origin.as_delta()).collect()
}

impl Scene for GameSession {
    fn update(&mut self, input: &InputSnapshot) -> SceneCommand {
        if let Err(err) = self.world.tick(input) {
            error!(error = %err, "world_tick_failed");
            return SceneCommand::Quit;
        }
        self.handle_events()
    }

    fn render(&mut self, frame: &mut [u8], width: u32, height: u32) {
        self.ensure_fog(width, height);
        let mut scene_buffer = std::mem::take(&mut self.scene_buffer);
        let origin = {
            let mut canvas = Canvas::new(&mut scene_buffer, width, height);
            self.renderer.render(&self.world, &mut canvas);
            SceneRenderer::screen_origin(&self.world, &canvas)
        };

        let polygon = to_screen(self.world.visible_polygon(), origin);
        let eye = self.world.visibility_eye() - origin.as_delta();
        let scroll_delta = self.world.scroll_delta();
        if let Some(fog) = self.fog.as_mut() {
            fog.composite(&scene_buffer, &polygon, eye, scroll_delta, frame);
        }
        self.scene_buffer = scene_buffer;
    }

    fn stats(&self) -> SceneStats {
        SceneStats {
            loaded_tiles: self.world.tile_count(),
            live_entities: self.world.entity_count(),
        }
    }

    fn shutdown(&mut self) {
        info!(frame = self.world.frame(), "session_shutdown");
    }
}
