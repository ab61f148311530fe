pub mod app;
pub mod atomic_io;
pub mod geom;
mod image_refs;
pub mod level;
mod paths;
pub mod render;
pub mod world;

pub use app::{
    run_app, run_app_with_metrics, AppError, InputAction, InputSnapshot, LoopConfig,
    LoopMetricsSnapshot, MetricsHandle, Scene, SceneCommand, SceneStats, SLOW_FRAME_ENV_VAR,
};
pub use geom::{Delta, Orientation, Pos, Rect};
pub use level::{EntityId, Level, LevelError, SaveError, SaveGame, Spawnable, TILE_SIZE};
pub use paths::{AppPaths, StartupError, ROOT_ENV_VAR};
pub use render::{Canvas, FogCompositor, FogConfig, SceneRenderer};
pub use world::{
    Contents, EntityImpl, EntityRegistry, SpawnError, TraceOptions, TraceResult, World,
    WorldConfig, WorldError, WorldEvent,
};
