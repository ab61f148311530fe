use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use engine::atomic_io::write_atomic;
use engine::SaveGame;
use thiserror::Error;

const SAVE_FILE_SUFFIX: &str = ".save.json";

#[derive(Debug, Error)]
pub(crate) enum SaveStoreError {
    #[error("failed to read save '{path}': {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
    #[error("failed to parse save '{path}'{}: {source}", field_suffix(.field))]
    Parse {
        path: PathBuf,
        field: String,
        #[source]
        source: serde_json::Error,
    },
    #[error("failed to encode save json: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("failed to write save '{path}': {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

fn field_suffix(field: &str) -> String {
    if field.is_empty() || field == "." {
        String::new()
    } else {
        format!(" at {field}")
    }
}

pub(crate) fn save_path_for(save_dir: &Path, level_name: &str) -> PathBuf {
    save_dir.join(format!("{level_name}{SAVE_FILE_SUFFIX}"))
}

/// Reads the save at `path`; a missing file means there is no save yet.
pub(crate) fn read_save(path: &Path) -> Result<Option<SaveGame>, SaveStoreError> {
    let raw = match fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(source) => {
            return Err(SaveStoreError::Read {
                path: path.to_path_buf(),
                source,
            })
        }
    };
    parse_save(path, &raw).map(Some)
}

fn parse_save(path: &Path, raw: &str) -> Result<SaveGame, SaveStoreError> {
    let mut deserializer = serde_json::Deserializer::from_str(raw);
    serde_path_to_error::deserialize::<_, SaveGame>(&mut deserializer).map_err(|error| {
        let field = error.path().to_string();
        SaveStoreError::Parse {
            path: path.to_path_buf(),
            field,
            source: error.into_inner(),
        }
    })
}

pub(crate) fn write_save(path: &Path, save: &SaveGame) -> Result<(), SaveStoreError> {
    let json = serde_json::to_string_pretty(save).map_err(SaveStoreError::Encode)?;
    write_atomic(path, json).map_err(|source| SaveStoreError::Write {
        path: path.to_path_buf(),
        source,
    })
}
