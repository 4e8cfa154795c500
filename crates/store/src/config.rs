//! Storage configuration.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::error::Result;
use crate::{InMemoryProfileStore, ProfileStore, SqliteProfileStore};

/// Default SQLite database file, relative to the working directory.
pub const DEFAULT_DATABASE_PATH: &str = "./profiles.db";

/// Where the profile store keeps its data.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoreConfig {
    /// Database file path. `None` keeps everything in memory.
    pub path: Option<PathBuf>,
}

impl StoreConfig {
    /// Store profiles in the database file at `path`.
    #[must_use]
    pub fn at(path: impl AsRef<Path>) -> Self {
        Self {
            path: Some(path.as_ref().to_path_buf()),
        }
    }

    /// Keep profiles in memory only.
    #[must_use]
    pub const fn in_memory() -> Self {
        Self { path: None }
    }

    /// Open the store this configuration describes.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Database` if the database file cannot be opened
    /// or migrated.
    pub fn open(&self) -> Result<Arc<dyn ProfileStore>> {
        match &self.path {
            Some(path) => Ok(Arc::new(SqliteProfileStore::open(path)?)),
            None => Ok(Arc::new(InMemoryProfileStore::new())),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self::at(DEFAULT_DATABASE_PATH)
    }
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;

    #[test]
    fn test_default_uses_local_database_file() {
        let config = StoreConfig::default();
        assert_eq!(config.path, Some(PathBuf::from("./profiles.db")));
    }

    #[test]
    fn test_open_file_backed_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = StoreConfig::at(dir.path().join("profiles.db"));
        assert!(config.open().is_ok());
        assert!(dir.path().join("profiles.db").exists());
    }

    #[test]
    fn test_in_memory_has_no_path() {
        assert!(StoreConfig::in_memory().path.is_none());
    }
}
