use crate::core::state::SyncStateManager;
use crate::core::transform::ClaimTransformer;
use crate::domain::model::{PayorLookup, RecordError, UpsertSummary};
use crate::domain::ports::{ClaimSource, ClaimTarget, StateBackend};
use crate::utils::error::{Result, SyncError};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};

/// Error descriptors returned to the caller are capped at this many.
pub const MAX_RESPONSE_ERRORS: usize = 10;

pub const STATUS_OK: u16 = 200;
pub const STATUS_PARTIAL: u16 = 207;
pub const STATUS_FAILED: u16 = 500;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
pub struct SyncRequest {
    #[serde(default)]
    pub full_sync: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncStatistics {
    pub claims_fetched: usize,
    pub claims_transformed: usize,
    pub records_processed: usize,
    pub records_successful: usize,
    pub records_failed: usize,
    pub success_rate: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResponseBody {
    pub message: String,
    pub timestamp: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub records_processed: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<SyncStatistics>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<RecordError>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SyncResponse {
    #[serde(rename = "statusCode")]
    pub status_code: u16,
    pub body: ResponseBody,
}

impl SyncResponse {
    fn nothing_to_do(message: &str) -> Self {
        Self {
            status_code: STATUS_OK,
            body: ResponseBody {
                message: message.to_string(),
                timestamp: now_rfc3339(),
                records_processed: Some(0),
                statistics: None,
                errors: Vec::new(),
                error: None,
            },
        }
    }

    fn completed(fetched: usize, transformed: usize, summary: UpsertSummary) -> Self {
        let status_code = if summary.failed == 0 {
            STATUS_OK
        } else {
            STATUS_PARTIAL
        };
        let statistics = SyncStatistics {
            claims_fetched: fetched,
            claims_transformed: transformed,
            records_processed: summary.total,
            records_successful: summary.successful,
            records_failed: summary.failed,
            success_rate: format!("{:.2}%", summary.success_rate()),
        };

        let mut errors = summary.errors;
        errors.truncate(MAX_RESPONSE_ERRORS);

        Self {
            status_code,
            body: ResponseBody {
                message: "Sync completed".to_string(),
                timestamp: now_rfc3339(),
                records_processed: None,
                statistics: Some(statistics),
                errors,
                error: None,
            },
        }
    }

    fn failed(error: &SyncError) -> Self {
        Self {
            status_code: STATUS_FAILED,
            body: ResponseBody {
                message: "Sync failed".to_string(),
                timestamp: now_rfc3339(),
                records_processed: None,
                statistics: None,
                errors: Vec::new(),
                error: Some(error.to_string()),
            },
        }
    }

    /// A run that never reached the engine, e.g. invalid configuration.
    pub fn from_error(error: &SyncError) -> Self {
        Self::failed(error)
    }
}

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// One sync run: watermark → fetch → payor lookup → transform → upsert →
/// watermark update. Strictly sequential.
pub struct SyncEngine<S, T, B>
where
    S: ClaimSource,
    T: ClaimTarget,
    B: StateBackend,
{
    source: S,
    target: T,
    state: SyncStateManager<B>,
    external_id_field: String,
}

impl<S, T, B> SyncEngine<S, T, B>
where
    S: ClaimSource,
    T: ClaimTarget,
    B: StateBackend,
{
    pub fn new(
        source: S,
        target: T,
        state: SyncStateManager<B>,
        external_id_field: impl Into<String>,
    ) -> Self {
        Self {
            source,
            target,
            state,
            external_id_field: external_id_field.into(),
        }
    }

    pub fn state(&self) -> &SyncStateManager<B> {
        &self.state
    }

    /// Never fails; fatal errors become a 500 response.
    pub async fn run(&self, request: SyncRequest) -> SyncResponse {
        let started = Utc::now();
        tracing::info!(
            "🚀 Starting claims sync (full_sync: {}, sync_id: {})",
            request.full_sync,
            self.state.sync_id()
        );

        match self.execute(request, started).await {
            Ok(response) => {
                tracing::info!(
                    "✅ Sync finished with status {}: {}",
                    response.status_code,
                    response.body.message
                );
                response
            }
            Err(e) => {
                tracing::error!(
                    "❌ Sync failed: {} (Severity: {:?})",
                    e,
                    e.severity()
                );
                tracing::error!("💡 Recovery suggestion: {}", e.recovery_suggestion());
                SyncResponse::failed(&e)
            }
        }
    }

    async fn execute(&self, request: SyncRequest, started: DateTime<Utc>) -> Result<SyncResponse> {
        let since = if request.full_sync {
            tracing::info!("Full sync requested, ignoring stored watermark");
            None
        } else {
            self.state.get_last_sync().await
        };

        tracing::info!("📥 Fetching claims from CollaborateMD");
        let claims = self.source.fetch_claims(since).await?;
        if claims.is_empty() {
            tracing::info!("No claims to process");
            return Ok(SyncResponse::nothing_to_do("No claims to process"));
        }

        let payors = match self.target.payor_lookup().await {
            Ok(payors) if payors.is_empty() => {
                tracing::warn!("No payors found, claims will carry no payor reference");
                payors
            }
            Ok(payors) => payors,
            Err(e) => {
                tracing::warn!("Payor lookup failed, continuing without payor references: {}", e);
                PayorLookup::default()
            }
        };

        let transformer = ClaimTransformer::new(payors, self.external_id_field.as_str());
        let transformed = transformer.transform_claims(&claims);
        if transformed.is_empty() {
            tracing::warn!("No claims successfully transformed");
            return Ok(SyncResponse::nothing_to_do("No claims successfully transformed"));
        }

        tracing::info!("📤 Upserting {} claims to Salesforce", transformed.len());
        let summary = self.target.upsert_claims(&transformed).await?;

        if !self.state.update_sync(started, summary.counts()).await {
            tracing::warn!("Sync state not updated; the next run will cover this window again");
        }

        Ok(SyncResponse::completed(
            claims.len(),
            transformed.len(),
            summary,
        ))
    }
}
