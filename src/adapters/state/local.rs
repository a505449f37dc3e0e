use crate::domain::model::SyncState;
use crate::domain::ports::StateBackend;
use crate::utils::error::{Result, SyncError};
use async_trait::async_trait;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

/// Sync state kept as `{dir}/{sync_id}.json`, for runs outside AWS.
#[derive(Debug, Clone)]
pub struct LocalStateStore {
    base_path: PathBuf,
}

impl LocalStateStore {
    pub fn new(base_path: impl Into<PathBuf>) -> Self {
        Self {
            base_path: base_path.into(),
        }
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    fn state_file(&self, sync_id: &str) -> Result<PathBuf> {
        if sync_id.is_empty() || sync_id.contains(['/', '\\']) || sync_id.starts_with('.') {
            return Err(SyncError::StateStoreError {
                message: format!("Sync id '{}' cannot be used as a file name", sync_id),
            });
        }
        Ok(self.base_path.join(format!("{}.json", sync_id)))
    }
}

#[async_trait]
impl StateBackend for LocalStateStore {
    async fn load(&self, sync_id: &str) -> Result<Option<SyncState>> {
        let path = self.state_file(sync_id)?;
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let state = serde_json::from_slice(&data).map_err(|e| SyncError::StateStoreError {
            message: format!("Corrupt state file {}: {}", path.display(), e),
        })?;
        Ok(Some(state))
    }

    async fn save(&self, state: &SyncState) -> Result<()> {
        let path = self.state_file(&state.sync_id)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let data = serde_json::to_vec_pretty(state)?;
        fs::write(&path, data)?;
        tracing::debug!("Wrote sync state to {}", path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::model::SyncCounts;
    use chrono::{TimeZone, Utc};
    use tempfile::TempDir;

    fn sample_state(sync_id: &str) -> SyncState {
        let ts = Utc.with_ymd_and_hms(2024, 1, 15, 10, 30, 0).unwrap();
        SyncState::new(
            sync_id,
            ts,
            SyncCounts {
                processed: 5,
                successful: 4,
                failed: 1,
            },
        )
    }

    #[test]
    fn test_missing_file_is_none() {
        let dir = TempDir::new().unwrap();
        let store = LocalStateStore::new(dir.path());

        let loaded = tokio_test::block_on(store.load("default")).unwrap();
        assert!(loaded.is_none());
    }

    #[test]
    fn test_save_creates_directory_and_overwrites() {
        let dir = TempDir::new().unwrap();
        let store = LocalStateStore::new(dir.path().join("nested/state"));

        tokio_test::block_on(store.save(&sample_state("default"))).unwrap();
        let mut second = sample_state("default");
        second.records_processed = 9;
        tokio_test::block_on(store.save(&second)).unwrap();

        let loaded = tokio_test::block_on(store.load("default")).unwrap().unwrap();
        assert_eq!(loaded, second);
        assert_eq!(loaded.last_sync_date, "2024-01-15");
        assert_eq!(fs::read_dir(store.base_path()).unwrap().count(), 1);
    }

    #[test]
    fn test_sync_ids_are_separate() {
        let dir = TempDir::new().unwrap();
        let store = LocalStateStore::new(dir.path());

        tokio_test::block_on(store.save(&sample_state("nightly"))).unwrap();

        assert!(tokio_test::block_on(store.load("hourly")).unwrap().is_none());
        assert!(tokio_test::block_on(store.load("nightly")).unwrap().is_some());
    }

    #[test]
    fn test_corrupt_file_is_state_error() {
        let dir = TempDir::new().unwrap();
        fs::write(dir.path().join("default.json"), b"{not json").unwrap();
        let store = LocalStateStore::new(dir.path());

        assert!(matches!(
            tokio_test::block_on(store.load("default")).unwrap_err(),
            SyncError::StateStoreError { .. }
        ));
    }

    #[test]
    fn test_path_like_sync_id_rejected() {
        let store = LocalStateStore::new("unused");
        assert!(store.state_file("../escape").is_err());
        assert!(store.state_file("").is_err());
    }
}
