use crate::domain::model::{ClaimRecord, PayorLookup, SyncState, TransformedClaim, UpsertSummary};
use crate::utils::error::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Where claims come from.
#[async_trait]
pub trait ClaimSource: Send + Sync {
    /// Claims changed at or after `since`; every claim when `since` is `None`.
    async fn fetch_claims(&self, since: Option<DateTime<Utc>>) -> Result<Vec<ClaimRecord>>;
}

/// Where transformed claims go.
#[async_trait]
pub trait ClaimTarget: Send + Sync {
    async fn payor_lookup(&self) -> Result<PayorLookup>;

    /// Per-record failures are reported in the summary, not as `Err`.
    async fn upsert_claims(&self, claims: &[TransformedClaim]) -> Result<UpsertSummary>;
}

/// Raw persistence for sync state, one record per sync id.
#[async_trait]
pub trait StateBackend: Send + Sync {
    async fn load(&self, sync_id: &str) -> Result<Option<SyncState>>;
    async fn save(&self, state: &SyncState) -> Result<()>;
}
