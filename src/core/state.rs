use crate::domain::model::{SyncCounts, SyncState};
use crate::domain::ports::StateBackend;
use chrono::{DateTime, Utc};

/// Watermark bookkeeping over a [`StateBackend`]. Storage failures never
/// escape: a failed read means "no previous sync", a failed write is
/// reported as `false`.
pub struct SyncStateManager<B: StateBackend> {
    backend: B,
    sync_id: String,
}

impl<B: StateBackend> SyncStateManager<B> {
    pub fn new(backend: B, sync_id: impl Into<String>) -> Self {
        Self {
            backend,
            sync_id: sync_id.into(),
        }
    }

    pub fn sync_id(&self) -> &str {
        &self.sync_id
    }

    pub async fn get_last_sync(&self) -> Option<DateTime<Utc>> {
        match self.backend.load(&self.sync_id).await {
            Ok(Some(state)) => {
                tracing::info!(
                    "Last sync for {}: {}",
                    self.sync_id,
                    state.last_sync_timestamp.to_rfc3339()
                );
                Some(state.last_sync_timestamp)
            }
            Ok(None) => {
                tracing::info!("No previous sync found for {}", self.sync_id);
                None
            }
            Err(e) => {
                tracing::warn!(
                    "Could not read sync state for {}, falling back to full sync: {}",
                    self.sync_id,
                    e
                );
                None
            }
        }
    }

    /// Overwrites the stored record. Returns whether the write landed.
    pub async fn update_sync(&self, timestamp: DateTime<Utc>, counts: SyncCounts) -> bool {
        let state = SyncState::new(&self.sync_id, timestamp, counts);
        match self.backend.save(&state).await {
            Ok(()) => {
                tracing::info!(
                    "Updated sync state for {}: {}",
                    self.sync_id,
                    timestamp.to_rfc3339()
                );
                true
            }
            Err(e) => {
                tracing::error!("Failed to update sync state for {}: {}", self.sync_id, e);
                false
            }
        }
    }

    /// Full stored record, if one can be read.
    pub async fn get_sync_stats(&self) -> Option<SyncState> {
        match self.backend.load(&self.sync_id).await {
            Ok(state) => state,
            Err(e) => {
                tracing::warn!("Could not read sync stats for {}: {}", self.sync_id, e);
                None
            }
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::utils::error::{Result, SyncError};
    use async_trait::async_trait;
    use chrono::TimeZone;
    use std::collections::HashMap;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    /// In-memory backend; `fail` makes every call return an error.
    #[derive(Clone, Default)]
    pub(crate) struct MemoryBackend {
        pub states: Arc<Mutex<HashMap<String, SyncState>>>,
        pub fail: bool,
    }

    #[async_trait]
    impl StateBackend for MemoryBackend {
        async fn load(&self, sync_id: &str) -> Result<Option<SyncState>> {
            if self.fail {
                return Err(SyncError::StateStoreError {
                    message: "table unavailable".to_string(),
                });
            }
            Ok(self.states.lock().await.get(sync_id).cloned())
        }

        async fn save(&self, state: &SyncState) -> Result<()> {
            if self.fail {
                return Err(SyncError::StateStoreError {
                    message: "table unavailable".to_string(),
                });
            }
            self.states
                .lock()
                .await
                .insert(state.sync_id.clone(), state.clone());
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_update_then_read_back() {
        let manager = SyncStateManager::new(MemoryBackend::default(), "default");
        assert_eq!(manager.get_last_sync().await, None);

        let ts = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
        let counts = SyncCounts {
            processed: 3,
            successful: 2,
            failed: 1,
        };
        assert!(manager.update_sync(ts, counts).await);

        assert_eq!(manager.get_last_sync().await, Some(ts));
        let stats = manager.get_sync_stats().await.unwrap();
        assert_eq!(stats.records_failed, 1);
        assert_eq!(stats.last_sync_date, "2024-01-10");
    }

    #[tokio::test]
    async fn test_update_overwrites_single_record() {
        let backend = MemoryBackend::default();
        let manager = SyncStateManager::new(backend.clone(), "default");

        let first = Utc.with_ymd_and_hms(2024, 1, 10, 0, 0, 0).unwrap();
        let second = Utc.with_ymd_and_hms(2024, 1, 11, 0, 0, 0).unwrap();
        manager.update_sync(first, SyncCounts::default()).await;
        manager.update_sync(second, SyncCounts::default()).await;

        assert_eq!(backend.states.lock().await.len(), 1);
        assert_eq!(manager.get_last_sync().await, Some(second));
    }

    #[tokio::test]
    async fn test_backend_failures_degrade() {
        let backend = MemoryBackend {
            fail: true,
            ..MemoryBackend::default()
        };
        let manager = SyncStateManager::new(backend, "default");

        assert_eq!(manager.get_last_sync().await, None);
        assert!(manager.get_sync_stats().await.is_none());
        assert!(!manager.update_sync(Utc::now(), SyncCounts::default()).await);
    }
}
