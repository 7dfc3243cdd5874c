// Per-tier checkpoint file: the end time (ms) of the last persisted window, as decimal text.

use std::io;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct CheckpointStore {
    path: PathBuf,
}

impl CheckpointStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Last durable checkpoint. Absent, empty and unparseable files all read as `None`.
    pub fn read(&self) -> Option<i64> {
        let text = match std::fs::read_to_string(&self.path) {
            Ok(text) => text,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "no checkpoint file");
                return None;
            }
            Err(e) => {
                warn!(path = %self.path.display(), error = %e, "checkpoint unreadable");
                return None;
            }
        };
        let trimmed = text.trim();
        if trimmed.is_empty() {
            warn!(path = %self.path.display(), "checkpoint file is empty");
            return None;
        }
        match trimmed.parse::<i64>() {
            Ok(v) => Some(v),
            Err(e) => {
                warn!(path = %self.path.display(), content = %trimmed, error = %e, "checkpoint unparseable");
                None
            }
        }
    }

    /// Replace the checkpoint atomically: temp file in the same directory, then rename.
    pub fn write(&self, checkpoint: i64) -> io::Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            std::fs::create_dir_all(parent)?;
        }
        let mut tmp = self.path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        std::fs::write(&tmp, checkpoint.to_string())?;
        std::fs::rename(&tmp, &self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn missing_file_reads_none() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path().join("absent"));
        assert_eq!(store.read(), None);
    }

    #[test]
    fn write_creates_parent_and_reads_back() {
        let dir = TempDir::new().unwrap();
        let store = CheckpointStore::new(dir.path().join("nested/dir/ckpt"));
        store.write(1_700_000_000_000).unwrap();
        assert_eq!(store.read(), Some(1_700_000_000_000));
        store.write(42).unwrap();
        assert_eq!(store.read(), Some(42));
    }

    #[test]
    fn empty_and_garbage_read_none() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("ckpt");
        let store = CheckpointStore::new(&path);
        std::fs::write(&path, "").unwrap();
        assert_eq!(store.read(), None);
        std::fs::write(&path, "not-a-number").unwrap();
        assert_eq!(store.read(), None);
        std::fs::write(&path, " 123\n").unwrap();
        assert_eq!(store.read(), Some(123));
    }
}
