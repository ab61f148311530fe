use std::env;
use std::path::Path;

use engine::{
    AppError, AppPaths, Level, LevelError, LoopConfig, Scene, StartupError, World, WorldConfig,
    WorldError,
};
use thiserror::Error;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use super::save_store::{read_save, save_path_for, SaveStoreError};
use super::session::GameSession;
use crate::entities::build_registry;

const LEVEL_ENV_VAR: &str = "WARPGAME_LEVEL";
const DEFAULT_LEVEL: &str = "demo";
const LEVEL_FILE_EXTENSION: &str = "xml";

#[derive(Debug, Error)]
pub(crate) enum BootstrapError {
    #[error(transparent)]
    Startup(#[from] StartupError),
    #[error("invalid level name '{name}' in {var}: must be a plain file stem")]
    InvalidLevelName { name: String, var: &'static str },
    #[error(transparent)]
    Level(#[from] LevelError),
    #[error(transparent)]
    SaveStore(#[from] SaveStoreError),
    #[error(transparent)]
    World(#[from] WorldError),
    #[error(transparent)]
    Loop(#[from] AppError),
}

pub(crate) struct AppWiring {
    pub(crate) config: LoopConfig,
    pub(crate) scene: Box<dyn Scene>,
}

pub(crate) fn build_app() -> Result<AppWiring, BootstrapError> {
    init_tracing();
    info!("=== Warpgame Startup ===");

    let paths = AppPaths::resolve()?;
    let level_name = level_name_from_env()?;
    let config = LoopConfig::default();
    let world_config = WorldConfig {
        screen_width: config.render_width as i32,
        screen_height: config.render_height as i32,
        ..WorldConfig::default()
    };
    let world = load_world(&paths, &level_name, world_config)?;
    let session = GameSession::new(
        world,
        paths.images_dir.clone(),
        save_path_for(&paths.save_dir, &level_name),
    );

    Ok(AppWiring {
        config,
        scene: Box::new(session),
    })
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_thread_names(true)
        .compact()
        .init();
}

fn level_name_from_env() -> Result<String, BootstrapError> {
    let raw = env::var(LEVEL_ENV_VAR).unwrap_or_default();
    parse_level_name(&raw)
}

/// Level names select a file under the levels directory, never a path.
fn parse_level_name(raw: &str) -> Result<String, BootstrapError> {
    let name = raw.trim();
    if name.is_empty() {
        return Ok(DEFAULT_LEVEL.to_string());
    }
    if name.contains(['/', '\\']) || name.contains("..") {
        return Err(BootstrapError::InvalidLevelName {
            name: name.to_string(),
            var: LEVEL_ENV_VAR,
        });
    }
    Ok(name.to_string())
}

/// Loads the level, applies its save when one is usable, and builds the world.
pub(crate) fn load_world(
    paths: &AppPaths,
    level_name: &str,
    config: WorldConfig,
) -> Result<World, BootstrapError> {
    let level_path = paths
        .levels_dir
        .join(level_name)
        .with_extension(LEVEL_FILE_EXTENSION);
    let mut level = Level::load(&level_path)?;
    apply_save(&mut level, &save_path_for(&paths.save_dir, level_name))?;
    Ok(World::new(level, build_registry(), config)?)
}

/// A rejected save is logged and the level starts fresh; the next checkpoint
/// overwrites it.
fn apply_save(level: &mut Level, save_path: &Path) -> Result<(), BootstrapError> {
    let Some(save) = read_save(save_path)? else {
        info!(path = %save_path.display(), "no_save_found");
        return Ok(());
    };
    if let Err(err) = level.load_game(&save) {
        warn!(error = %err, path = %save_path.display(), "save_rejected_starting_fresh");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use std::fs;

    use engine::EntityId;
    use tempfile::TempDir;

    use super::*;
    use crate::app::save_store::write_save;

    const LEVEL: &str = r#"<level width="6" height="5" save_game_version="1">
  <tileset>
    <tile id="1"/>
    <tile id="2">
      <property name="solid" value="false"/>
      <property name="opaque" value="false"/>
    </tile>
  </tileset>
  <layer>
1,1,1,1,1,1
1,2,2,2,2,1
1,2,2,2,2,1
1,2,2,2,2,1
1,1,1,1,1,1
  </layer>
  <objects>
    <object id="1" type="Player" x="20" y="20" width="12" height="30"/>
    <object id="2" type="Checkpoint" name="east" x="56" y="16" width="16" height="48">
      <property name="required_orientation" value="ES"/>
    </object>
  </objects>
</level>"#;

    fn temp_paths(temp: &TempDir) -> AppPaths {
        let paths = AppPaths::under(temp.path().to_path_buf());
        fs::create_dir_all(&paths.levels_dir).expect("levels dir");
        fs::write(paths.levels_dir.join("hall.xml"), LEVEL).expect("level file");
        paths
    }

    fn player_x(world: &World) -> i32 {
        world.entity(world.player()).expect("player").rect().origin.x
    }

    #[test]
    fn level_name_defaults_and_rejects_paths() {
        assert_eq!(parse_level_name("").expect("default"), DEFAULT_LEVEL);
        assert_eq!(parse_level_name(" hall ").expect("trimmed"), "hall");
        assert!(matches!(
            parse_level_name("../secrets"),
            Err(BootstrapError::InvalidLevelName { .. })
        ));
        assert!(matches!(
            parse_level_name("levels/hall"),
            Err(BootstrapError::InvalidLevelName { .. })
        ));
    }

    #[test]
    fn world_starts_at_saved_checkpoint() {
        let temp = TempDir::new().expect("temp");
        let paths = temp_paths(&temp);

        let fresh = load_world(&paths, "hall", WorldConfig::default()).expect("fresh world");
        assert_eq!(player_x(&fresh), 20);

        let mut level = Level::load(&paths.levels_dir.join("hall.xml")).expect("level");
        level
            .persistent_state_mut(EntityId(1))
            .insert("last_checkpoint".to_string(), "east".to_string());
        let save = level.save_game().expect("save");
        write_save(&save_path_for(&paths.save_dir, "hall"), &save).expect("write");

        let resumed = load_world(&paths, "hall", WorldConfig::default()).expect("resumed");
        // Centered on the 16 px wide checkpoint at x = 56.
        assert_eq!(player_x(&resumed), 58);
    }

    #[test]
    fn tampered_save_starts_fresh() {
        let temp = TempDir::new().expect("temp");
        let paths = temp_paths(&temp);

        let mut level = Level::load(&paths.levels_dir.join("hall.xml")).expect("level");
        level
            .persistent_state_mut(EntityId(1))
            .insert("last_checkpoint".to_string(), "east".to_string());
        let mut save = level.save_game().expect("save");
        save.hash = "0".repeat(64);
        write_save(&save_path_for(&paths.save_dir, "hall"), &save).expect("write");

        let world = load_world(&paths, "hall", WorldConfig::default()).expect("world");
        assert_eq!(player_x(&world), 20);
    }

    #[test]
    fn shipped_demo_level_builds() {
        let root = Path::new(env!("CARGO_MANIFEST_DIR")).join("../..");
        let paths = AppPaths::under(root);
        let level = Level::load(&paths.levels_dir.join("demo.xml")).expect("demo level");
        let world = World::new(level, build_registry(), WorldConfig::default()).expect("world");
        assert!(world.entity(world.player()).is_some());
    }

    #[test]
    fn missing_level_is_reported() {
        let temp = TempDir::new().expect("temp");
        let paths = temp_paths(&temp);
        assert!(matches!(
            load_world(&paths, "nowhere", WorldConfig::default()),
            Err(BootstrapError::Level(_))
        ));
    }
}
