//! Persisted record of the last version the watcher acted on.
//!
//! The file backend keeps the bare version string as the whole file
//! contents. The in-memory backend exists for tests and dry runs.

use async_trait::async_trait;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::StoreError;

/// The last version this watcher deployed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRecord(String);

impl VersionRecord {
    /// Surrounding whitespace is dropped so a trailing newline added by an
    /// editor never makes two equal versions compare different.
    pub fn new(version: impl AsRef<str>) -> Self {
        Self(version.as_ref().trim().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for VersionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Load/save seam for the version record.
#[async_trait]
pub trait VersionStore: Send + Sync {
    /// `Ok(None)` means nothing has been deployed yet.
    async fn load(&self) -> Result<Option<VersionRecord>, StoreError>;

    async fn save(&self, record: &VersionRecord) -> Result<(), StoreError>;
}

/// Plain-text file holding the version string.
pub struct FileStore {
    path: PathBuf,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Sibling file the next record is written to before it replaces `path`.
    fn staging_path(&self) -> PathBuf {
        let mut name = self.path.file_name().unwrap_or_default().to_os_string();
        name.push(".tmp");
        self.path.with_file_name(name)
    }
}

#[async_trait]
impl VersionStore for FileStore {
    async fn load(&self) -> Result<Option<VersionRecord>, StoreError> {
        match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => {
                let record = VersionRecord::new(content);
                Ok((!record.is_empty()).then_some(record))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::info!(path = %self.path.display(), "No version file yet, treating as first run");
                Ok(None)
            }
            Err(error) => Err(StoreError::Read {
                path: self.path.clone(),
                error,
            }),
        }
    }

    /// Writes a sibling file and renames it over `path`, so a crash mid-write
    /// never leaves an empty record behind.
    async fn save(&self, record: &VersionRecord) -> Result<(), StoreError> {
        let staging = self.staging_path();
        tokio::fs::write(&staging, record.as_str())
            .await
            .map_err(|error| StoreError::Write {
                path: staging.clone(),
                error,
            })?;
        tokio::fs::rename(&staging, &self.path)
            .await
            .map_err(|error| StoreError::Write {
                path: self.path.clone(),
                error,
            })
    }
}

/// Version record held in process memory.
#[derive(Default)]
pub struct MemoryStore {
    current: Mutex<Option<VersionRecord>>,
    saves: Mutex<usize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_version(version: &str) -> Self {
        Self {
            current: Mutex::new(Some(VersionRecord::new(version))),
            saves: Mutex::new(0),
        }
    }

    /// Number of successful `save` calls.
    pub fn save_count(&self) -> usize {
        *self.saves.lock().unwrap()
    }

    pub fn current(&self) -> Option<VersionRecord> {
        self.current.lock().unwrap().clone()
    }
}

#[async_trait]
impl VersionStore for MemoryStore {
    async fn load(&self) -> Result<Option<VersionRecord>, StoreError> {
        Ok(self.current())
    }

    async fn save(&self, record: &VersionRecord) -> Result<(), StoreError> {
        *self.current.lock().unwrap() = Some(record.clone());
        *self.saves.lock().unwrap() += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn file_round_trip_is_exact() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("latest_version.txt"));

        store.save(&VersionRecord::new("3.4.5")).await.unwrap();
        assert_eq!(
            std::fs::read_to_string(store.path()).unwrap(),
            "3.4.5",
            "no newline should be written"
        );
        assert_eq!(store.load().await.unwrap(), Some(VersionRecord::new("3.4.5")));
    }

    #[tokio::test]
    async fn trailing_newline_does_not_affect_equality() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latest_version.txt");
        std::fs::write(&path, "3.4.5\n").unwrap();

        let loaded = FileStore::new(&path).load().await.unwrap().unwrap();
        assert_eq!(loaded.as_str(), "3.4.5");
        assert_eq!(loaded, VersionRecord::new("3.4.5"));
    }

    #[tokio::test]
    async fn missing_file_is_first_run() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("absent.txt"));
        assert_eq!(store.load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn empty_file_is_first_run() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latest_version.txt");
        std::fs::write(&path, "  \n").unwrap();
        assert_eq!(FileStore::new(&path).load().await.unwrap(), None);
    }

    #[tokio::test]
    async fn unreadable_path_is_an_error() {
        // A directory can't be read as a file.
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path());
        assert!(matches!(store.load().await, Err(StoreError::Read { .. })));
    }

    #[tokio::test]
    async fn save_overwrites() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("v.txt"));
        store.save(&VersionRecord::new("1.0.0")).await.unwrap();
        store.save(&VersionRecord::new("1.10.0")).await.unwrap();
        assert_eq!(std::fs::read_to_string(store.path()).unwrap(), "1.10.0");
    }

    #[tokio::test]
    async fn save_replaces_file_and_leaves_no_staging_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("latest_version.txt");
        let store = FileStore::new(&path);
        // Leftover from an interrupted save.
        std::fs::write(dir.path().join("latest_version.txt.tmp"), "garbage").unwrap();
        std::fs::write(&path, "1.0.0").unwrap();

        store.save(&VersionRecord::new("1.1.0")).await.unwrap();

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "1.1.0");
        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name())
            .collect();
        assert_eq!(names, vec![std::ffi::OsString::from("latest_version.txt")]);
    }

    #[tokio::test]
    async fn save_into_missing_directory_is_a_write_error() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileStore::new(dir.path().join("nope").join("v.txt"));
        let err = store.save(&VersionRecord::new("1.0.0")).await.unwrap_err();
        assert!(matches!(err, StoreError::Write { .. }));
    }

    #[tokio::test]
    async fn memory_store_counts_saves() {
        let store = MemoryStore::with_version("1.0.0");
        store.save(&VersionRecord::new("1.1.0")).await.unwrap();
        assert_eq!(store.save_count(), 1);
        assert_eq!(store.load().await.unwrap().unwrap().as_str(), "1.1.0");
    }
}
