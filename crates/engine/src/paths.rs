use std::env;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing::info;

pub const ROOT_ENV_VAR: &str = "WARPGAME_ROOT";

/// Where levels, images and saves live. Everything hangs off one root
/// directory holding the workspace `Cargo.toml`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppPaths {
    pub root: PathBuf,
    pub assets_dir: PathBuf,
    pub levels_dir: PathBuf,
    pub images_dir: PathBuf,
    pub save_dir: PathBuf,
}

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("WARPGAME_ROOT is not valid unicode: {0}")]
    RootEnvNotUnicode(#[source] env::VarError),
    #[error("WARPGAME_ROOT={} has no Cargo.toml with assets/ or crates/ beside it", .0.display())]
    RootEnvNotAGameDir(PathBuf),
    #[error("cannot locate the running executable: {0}")]
    Executable(#[source] io::Error),
    #[error(
        "no game directory above {}; run from the workspace or set WARPGAME_ROOT",
        .0.display()
    )]
    RootNotFound(PathBuf),
    #[error("cannot create save directory {}: {source}", .path.display())]
    SaveDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl AppPaths {
    pub fn under(root: PathBuf) -> Self {
        let assets_dir = root.join("assets");
        Self {
            levels_dir: assets_dir.join("levels"),
            images_dir: assets_dir.join("images"),
            save_dir: root.join("saves"),
            assets_dir,
            root,
        }
    }

    /// Finds the game root from the environment or the executable location
    /// and makes sure the save directory exists.
    pub fn resolve() -> Result<Self, StartupError> {
        let (root, source) = match env::var(ROOT_ENV_VAR) {
            Ok(value) => {
                let root = canonical(Path::new(&value));
                if !looks_like_game_dir(&root) {
                    return Err(StartupError::RootEnvNotAGameDir(root));
                }
                (root, "env")
            }
            Err(env::VarError::NotPresent) => {
                let exe = env::current_exe().map_err(StartupError::Executable)?;
                let start = exe.parent().unwrap_or(exe.as_path());
                let root = search_upward(start)
                    .ok_or_else(|| StartupError::RootNotFound(canonical(start)))?;
                (root, "executable")
            }
            Err(err) => return Err(StartupError::RootEnvNotUnicode(err)),
        };

        let paths = Self::under(root);
        fs::create_dir_all(&paths.save_dir).map_err(|source| StartupError::SaveDir {
            path: paths.save_dir.clone(),
            source,
        })?;
        info!(root = %paths.root.display(), source, "game_root_resolved");
        Ok(paths)
    }
}

fn search_upward(start: &Path) -> Option<PathBuf> {
    start
        .ancestors()
        .find(|dir| looks_like_game_dir(dir))
        .map(canonical)
}

fn looks_like_game_dir(dir: &Path) -> bool {
    dir.join("Cargo.toml").is_file()
        && ["assets", "crates"].iter().any(|sub| dir.join(sub).is_dir())
}

fn canonical(path: &Path) -> PathBuf {
    fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
}
