use std::env;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use pixels::{Error as PixelsError, Pixels, SurfaceTexture};
use thiserror::Error;
use tracing::{info, warn};
use winit::dpi::LogicalSize;
use winit::error::{EventLoopError, OsError};
use winit::event::{ElementState, Event, KeyEvent, WindowEvent};
use winit::event_loop::{ControlFlow, EventLoop};
use winit::keyboard::{KeyCode, PhysicalKey};
use winit::window::WindowBuilder;

use super::input::ActionStates;
use super::metrics::MetricsAccumulator;
use super::{
    InputAction, InputSnapshot, LoopMetricsSnapshot, MetricsHandle, Scene, SceneCommand, SceneStats,
};

pub const SLOW_FRAME_ENV_VAR: &str = "WARPGAME_SLOW_FRAME_MS";

#[derive(Debug, Clone)]
pub struct LoopConfig {
    pub window_title: String,
    pub window_width: u32,
    pub window_height: u32,
    /// Size of the frame buffer handed to [`Scene::render`]. Scaled to the
    /// window by the surface.
    pub render_width: u32,
    pub render_height: u32,
    pub target_tps: u32,
    pub max_frame_delta: Duration,
    pub max_ticks_per_frame: u32,
    pub metrics_log_interval: Duration,
    pub simulated_slow_frame_ms: u64,
    pub max_render_fps: Option<u32>,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            window_title: "Warpgame".to_string(),
            window_width: 1280,
            window_height: 720,
            render_width: 640,
            render_height: 360,
            target_tps: 60,
            max_frame_delta: Duration::from_millis(250),
            max_ticks_per_frame: 5,
            metrics_log_interval: Duration::from_secs(1),
            simulated_slow_frame_ms: 0,
            max_render_fps: None,
        }
    }
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("failed to create event loop: {0}")]
    CreateEventLoop(#[source] EventLoopError),
    #[error("failed to create application window: {0}")]
    CreateWindow(#[source] OsError),
    #[error("failed to initialize renderer: {0}")]
    CreateRenderer(#[source] PixelsError),
    #[error("event loop failed: {0}")]
    EventLoopRun(#[source] EventLoopError),
}

pub fn run_app(config: LoopConfig, scene: Box<dyn Scene>) -> Result<(), AppError> {
    run_app_with_metrics(config, scene, MetricsHandle::default())
}

pub fn run_app_with_metrics(
    config: LoopConfig,
    mut scene: Box<dyn Scene>,
    metrics_handle: MetricsHandle,
) -> Result<(), AppError> {
    let event_loop = EventLoop::new().map_err(AppError::CreateEventLoop)?;
    let render_width = config.render_width.max(1);
    let render_height = config.render_height.max(1);
    let window = Arc::new(
        WindowBuilder::new()
            .with_title(config.window_title.clone())
            .with_inner_size(LogicalSize::new(
                config.window_width as f64,
                config.window_height as f64,
            ))
            .with_min_inner_size(LogicalSize::new(render_width as f64, render_height as f64))
            .build(&event_loop)
            .map_err(AppError::CreateWindow)?,
    );
    let surface_size = window.inner_size();
    let mut pixels = Pixels::new(
        render_width,
        render_height,
        SurfaceTexture::new(surface_size.width, surface_size.height, Arc::clone(&window)),
    )
    .map_err(AppError::CreateRenderer)?;

    event_loop.set_control_flow(ControlFlow::Poll);

    let pacing = FramePacing::from_config(&config);
    let slow_frame_delay = resolve_slow_frame_delay(config.simulated_slow_frame_ms);
    info!(
        target_tps = pacing.target_tps,
        render_width,
        render_height,
        max_frame_delta_ms = pacing.max_frame_delta.as_millis() as u64,
        max_ticks_per_frame = pacing.max_ticks_per_frame,
        slow_frame_delay_ms = slow_frame_delay.as_millis() as u64,
        render_fps_cap = %format_render_cap(pacing.render_fps_cap),
        "loop_config"
    );

    let mut driver = FrameDriver::new(pacing, Instant::now());
    let mut input = InputCollector::default();
    let mut last_present = Instant::now();
    let window_for_loop = Arc::clone(&window);

    event_loop
        .run(move |event, window_target| match event {
            Event::WindowEvent { window_id, event } if window_id == window_for_loop.id() => {
                match event {
                    WindowEvent::CloseRequested => {
                        info!(reason = "window_close", "shutdown_requested");
                        window_target.exit();
                    }
                    WindowEvent::Resized(size) if size.width > 0 && size.height > 0 => {
                        if let Err(error) = pixels.resize_surface(size.width, size.height) {
                            warn!(error = %error, "renderer_resize_failed");
                            window_target.exit();
                        }
                    }
                    WindowEvent::Focused(false) => input.release_all(),
                    WindowEvent::KeyboardInput { event, .. } => {
                        input.handle_keyboard_input(&event);
                    }
                    WindowEvent::RedrawRequested => {
                        if slow_frame_delay > Duration::ZERO {
                            // Debug perturbation only; not the FPS cap.
                            thread::sleep(slow_frame_delay);
                        }

                        let now = Instant::now();
                        if driver.advance(now, scene.as_mut(), &mut input) == SceneCommand::Quit {
                            info!(reason = "scene_quit", "shutdown_requested");
                            window_target.exit();
                            return;
                        }

                        let cap_sleep = compute_cap_sleep(
                            Instant::now().saturating_duration_since(last_present),
                            driver.pacing.render_frame_target(),
                        );
                        if cap_sleep > Duration::ZERO {
                            thread::sleep(cap_sleep);
                        }

                        scene.render(pixels.frame_mut(), render_width, render_height);
                        if let Err(error) = pixels.render() {
                            warn!(error = %error, "renderer_draw_failed");
                            window_target.exit();
                        }
                        last_present = Instant::now();

                        if let Some(snapshot) = driver.finish_frame(now, scene.stats()) {
                            metrics_handle.publish(snapshot);
                            info!(
                                fps = snapshot.fps,
                                tps = snapshot.tps,
                                frame_time_ms = snapshot.frame_time_ms,
                                max_frame_time_ms = snapshot.max_frame_time_ms,
                                sim_clamps = snapshot.sim_clamps,
                                loaded_tiles = snapshot.loaded_tiles,
                                live_entities = snapshot.live_entities,
                                "loop_metrics"
                            );
                        }
                    }
                    _ => {}
                }
            }
            Event::AboutToWait => window_for_loop.request_redraw(),
            Event::LoopExiting => {
                scene.shutdown();
                info!("shutdown");
            }
            _ => {}
        })
        .map_err(AppError::EventLoopRun)
}

/// Sanitized timing parameters of the fixed-tick loop.
#[derive(Debug, Clone, Copy, PartialEq)]
struct FramePacing {
    target_tps: u32,
    fixed_dt: Duration,
    max_frame_delta: Duration,
    max_ticks_per_frame: u32,
    metrics_interval: Duration,
    render_fps_cap: Option<u32>,
}

impl FramePacing {
    fn from_config(config: &LoopConfig) -> Self {
        let target_tps = config.target_tps.max(1);
        Self {
            target_tps,
            fixed_dt: Duration::from_secs_f64(1.0 / target_tps as f64),
            max_frame_delta: non_zero_or(config.max_frame_delta, Duration::from_millis(250)),
            max_ticks_per_frame: config.max_ticks_per_frame.max(1),
            metrics_interval: non_zero_or(config.metrics_log_interval, Duration::from_secs(1)),
            render_fps_cap: config.max_render_fps.filter(|fps| *fps > 0),
        }
    }

    fn render_frame_target(&self) -> Option<Duration> {
        self.render_fps_cap
            .map(|fps| Duration::from_secs_f64(1.0 / fps as f64))
    }
}

/// Turns wall-clock frames into fixed ticks. Kept apart from the window so
/// the pacing can be driven directly.
struct FrameDriver {
    pacing: FramePacing,
    backlog: Duration,
    last_frame: Instant,
    frame_dt: Duration,
    metrics: MetricsAccumulator,
}

impl FrameDriver {
    fn new(pacing: FramePacing, now: Instant) -> Self {
        Self {
            pacing,
            backlog: Duration::ZERO,
            last_frame: now,
            frame_dt: Duration::ZERO,
            metrics: MetricsAccumulator::new(pacing.metrics_interval, now),
        }
    }

    /// Runs every tick that is due at `now`. Stops early when the scene
    /// asks to quit.
    fn advance(
        &mut self,
        now: Instant,
        scene: &mut dyn Scene,
        input: &mut InputCollector,
    ) -> SceneCommand {
        self.frame_dt = now.saturating_duration_since(self.last_frame);
        self.last_frame = now;
        self.backlog = self
            .backlog
            .saturating_add(self.frame_dt.min(self.pacing.max_frame_delta));

        let plan = plan_sim_steps(
            self.backlog,
            self.pacing.fixed_dt,
            self.pacing.max_ticks_per_frame,
        );
        self.backlog = plan.remaining_accumulator;
        for _ in 0..plan.ticks_to_run {
            let command = scene.update(&input.snapshot_for_tick());
            self.metrics.record_tick();
            if command == SceneCommand::Quit {
                return SceneCommand::Quit;
            }
        }

        if plan.dropped_backlog > Duration::ZERO {
            self.metrics.record_sim_clamp();
            warn!(
                dropped_backlog_ms = plan.dropped_backlog.as_millis() as u64,
                max_ticks_per_frame = self.pacing.max_ticks_per_frame,
                "sim_clamp_triggered"
            );
        }
        SceneCommand::None
    }

    fn finish_frame(
        &mut self,
        now: Instant,
        stats: SceneStats,
    ) -> Option<LoopMetricsSnapshot> {
        self.metrics.record_frame(self.frame_dt, stats);
        self.metrics.maybe_snapshot(now)
    }
}

/// Collects key transitions between ticks.
#[derive(Debug, Default)]
struct InputCollector {
    held: ActionStates,
    pressed: ActionStates,
}

impl InputCollector {
    fn handle_keyboard_input(&mut self, key_event: &KeyEvent) {
        if key_event.repeat {
            return;
        }
        if let Some(action) = action_for_key(key_event.physical_key) {
            self.set_action(action, key_event.state == ElementState::Pressed);
        }
    }

    fn set_action(&mut self, action: InputAction, is_pressed: bool) {
        if is_pressed && !self.held.is_down(action) {
            self.pressed.set(action, true);
        }
        self.held.set(action, is_pressed);
    }

    fn release_all(&mut self) {
        self.held.clear();
    }

    /// A press seen since the last tick counts as held for that tick even
    /// if the key already went up, so short taps are never lost.
    fn snapshot_for_tick(&mut self) -> InputSnapshot {
        let snapshot = InputAction::ALL
            .into_iter()
            .fold(InputSnapshot::empty(), |snapshot, action| {
                let snapshot = snapshot.with_held(action, self.held.is_down(action));
                if self.pressed.is_down(action) {
                    snapshot.with_pressed(action)
                } else {
                    snapshot
                }
            });
        self.pressed.clear();
        snapshot
    }
}

fn action_for_key(key: PhysicalKey) -> Option<InputAction> {
    let PhysicalKey::Code(code) = key else {
        return None;
    };
    match code {
        KeyCode::ArrowLeft | KeyCode::KeyA => Some(InputAction::Left),
        KeyCode::ArrowRight | KeyCode::KeyD => Some(InputAction::Right),
        KeyCode::ArrowUp | KeyCode::KeyW => Some(InputAction::Up),
        KeyCode::ArrowDown | KeyCode::KeyS => Some(InputAction::Down),
        KeyCode::Space | KeyCode::ControlLeft | KeyCode::ControlRight => Some(InputAction::Jump),
        KeyCode::KeyE | KeyCode::ShiftLeft | KeyCode::ShiftRight | KeyCode::Enter => {
            Some(InputAction::Action)
        }
        KeyCode::Escape | KeyCode::Backspace => Some(InputAction::Exit),
        _ => None,
    }
}

#[derive(Debug, Clone, Copy)]
struct StepPlan {
    ticks_to_run: u32,
    remaining_accumulator: Duration,
    dropped_backlog: Duration,
}

fn plan_sim_steps(accumulator: Duration, fixed_dt: Duration, max_ticks: u32) -> StepPlan {
    let due = (accumulator.as_nanos() / fixed_dt.as_nanos().max(1)).min(u32::MAX as u128) as u32;
    let ticks_to_run = due.min(max_ticks);
    let remaining = accumulator.saturating_sub(fixed_dt * ticks_to_run);
    if remaining >= fixed_dt {
        // Too far behind; drop the backlog instead of spiralling.
        StepPlan {
            ticks_to_run,
            remaining_accumulator: Duration::ZERO,
            dropped_backlog: remaining,
        }
    } else {
        StepPlan {
            ticks_to_run,
            remaining_accumulator: remaining,
            dropped_backlog: Duration::ZERO,
        }
    }
}

fn non_zero_or(value: Duration, fallback: Duration) -> Duration {
    if value.is_zero() {
        fallback
    } else {
        value
    }
}

fn compute_cap_sleep(elapsed: Duration, target: Option<Duration>) -> Duration {
    target.map_or(Duration::ZERO, |target| target.saturating_sub(elapsed))
}

fn format_render_cap(cap: Option<u32>) -> String {
    cap.map_or_else(|| "off".to_string(), |fps| fps.to_string())
}

fn resolve_slow_frame_delay(config_slow_frame_ms: u64) -> Duration {
    let fallback = Duration::from_millis(config_slow_frame_ms);
    match env::var(SLOW_FRAME_ENV_VAR) {
        Ok(value) => value.trim().parse::<u64>().map(Duration::from_millis).unwrap_or_else(|_| {
            warn!(
                env_var = SLOW_FRAME_ENV_VAR,
                value = value.as_str(),
                "slow_frame_env_invalid_using_config"
            );
            fallback
        }),
        Err(env::VarError::NotPresent) => fallback,
        Err(err) => {
            warn!(
                env_var = SLOW_FRAME_ENV_VAR,
                error = %err,
                "slow_frame_env_unreadable_using_config"
            );
            fallback
        }
    }
}
