use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::process;

/// Replaces the file at `path` with `contents` in one step. The data goes
/// to a hidden sibling first and is flushed to disk before the rename, so a
/// crash leaves either the old file or the new one.
pub fn write_atomic(path: &Path, contents: impl AsRef<[u8]>) -> io::Result<()> {
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;

    let staging = staging_path(dir, path);
    let result = stage(&staging, contents.as_ref()).and_then(|()| commit(&staging, path));
    if result.is_err() {
        let _ = fs::remove_file(&staging);
    }
    result
}

fn stage(staging: &Path, contents: &[u8]) -> io::Result<()> {
    let mut file = File::create(staging)?;
    file.write_all(contents)?;
    file.sync_all()
}

#[cfg(not(windows))]
fn commit(staging: &Path, path: &Path) -> io::Result<()> {
    fs::rename(staging, path)
}

#[cfg(windows)]
fn commit(staging: &Path, path: &Path) -> io::Result<()> {
    // Windows refuses to rename onto an existing file.
    match fs::remove_file(path) {
        Err(error) if error.kind() != io::ErrorKind::NotFound => return Err(error),
        _ => {}
    }
    fs::rename(staging, path)
}

/// `.<name>.<pid>.tmp` next to the target; the pid keeps two running games
/// from sharing a staging file.
fn staging_path(dir: &Path, path: &Path) -> PathBuf {
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_default();
    dir.join(format!(".{name}.{}.tmp", process::id()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn second_write_wins_and_staging_is_gone() {
        let temp = TempDir::new().expect("temp");
        let path = temp.path().join("saves").join("demo.save.json");

        write_atomic(&path, "first").expect("first write");
        write_atomic(&path, b"second").expect("second write");

        assert_eq!(fs::read_to_string(&path).expect("read"), "second");
        let leftovers: Vec<_> = fs::read_dir(path.parent().expect("dir"))
            .expect("list")
            .map(|entry| entry.expect("entry").file_name())
            .collect();
        assert_eq!(leftovers.len(), 1);
    }

    #[test]
    fn staging_file_is_hidden_sibling() {
        let staging = staging_path(Path::new("/saves"), Path::new("/saves/demo.save.json"));
        let name = staging
            .file_name()
            .and_then(|name| name.to_str())
            .expect("utf8 name");
        assert_eq!(staging.parent(), Some(Path::new("/saves")));
        assert!(name.starts_with(".demo.save.json."));
        assert!(name.ends_with(".tmp"));
    }

    #[test]
    fn failed_write_keeps_previous_contents() {
        let temp = TempDir::new().expect("temp");
        let path = temp.path().join("demo.save.json");
        write_atomic(&path, "kept").expect("write");

        // A directory in the way makes the rename fail.
        let blocked = temp.path().join("blocked");
        fs::create_dir_all(blocked.join("inner")).expect("dir");
        assert!(write_atomic(&blocked, "lost").is_err());

        assert_eq!(fs::read_to_string(&path).expect("read"), "kept");
        assert!(blocked.is_dir());
    }
}
