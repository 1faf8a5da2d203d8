//! File-backed key-value store: `<dir>/<key>.json`.

use std::path::{Path, PathBuf};
use tracing::debug;

use super::KeyValueStore;
use crate::types::ToteError;

/// Default directory for stored data.
pub const DEFAULT_DATA_DIR: &str = ".tote";

#[derive(Debug, Clone)]
pub struct FileStore {
    dir: PathBuf,
}

impl FileStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path of the file holding `key`.
    pub fn path_for(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{key}.json"))
    }
}

impl Default for FileStore {
    fn default() -> Self {
        Self::new(DEFAULT_DATA_DIR)
    }
}

impl KeyValueStore for FileStore {
    fn get(&self, key: &str) -> Result<Option<String>, ToteError> {
        let path = self.path_for(key);
        if !path.exists() {
            return Ok(None);
        }
        std::fs::read_to_string(&path)
            .map(Some)
            .map_err(|e| ToteError::Storage(format!("Failed to read {}: {e}", path.display())))
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), ToteError> {
        std::fs::create_dir_all(&self.dir).map_err(|e| {
            ToteError::Storage(format!("Failed to create {}: {e}", self.dir.display()))
        })?;

        let path = self.path_for(key);
        std::fs::write(&path, value)
            .map_err(|e| ToteError::Storage(format!("Failed to write {}: {e}", path.display())))?;

        debug!(path = %path.display(), bytes = value.len(), "Store entry written");
        Ok(())
    }
}
