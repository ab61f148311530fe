mod input;
mod loop_runner;
mod metrics;

pub use input::{InputAction, InputSnapshot};
pub use loop_runner::{run_app, run_app_with_metrics, AppError, LoopConfig, SLOW_FRAME_ENV_VAR};
pub use metrics::{LoopMetricsSnapshot, MetricsHandle};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SceneCommand {
    None,
    Quit,
}

/// Size gauges a scene reports for the loop metrics.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SceneStats {
    pub loaded_tiles: usize,
    pub live_entities: usize,
}

/// Game state driven by the fixed-tick loop.
pub trait Scene {
    fn update(&mut self, input: &InputSnapshot) -> SceneCommand;
    /// Draws into an RGBA8 frame of `width * height` pixels.
    fn render(&mut self, frame: &mut [u8], width: u32, height: u32);
    fn stats(&self) -> SceneStats {
        SceneStats::default()
    }
    fn shutdown(&mut self) {}
}
