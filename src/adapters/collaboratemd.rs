use crate::config::SyncConfig;
use crate::core::retry::{secs_to_duration, Attempt, RetryPolicy};
use crate::domain::model::ClaimRecord;
use crate::domain::ports::ClaimSource;
use crate::utils::error::{Result, SyncError};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use chrono::{DateTime, Utc};
use reqwest::header::{ACCEPT, AUTHORIZATION, CONTENT_TYPE};
use reqwest::{Client, StatusCode};
use serde::Deserialize;
use serde_json::Value;
use std::io::{Cursor, Read};
use std::time::Duration;
use zip::ZipArchive;

const STATUS_SUCCESS: &str = "SUCCESS";
const STATUS_RUNNING: &str = "REPORT RUNNING";
const STATUS_TIMED_OUT: &str = "REPORT TIMED OUT";

/// Date-bearing fields checked against the watermark, highest priority first.
pub const WATERMARK_FIELDS: [&str; 3] = ["updatedAt", "ClaimDateEntered", "createdAt"];

#[derive(Debug, Deserialize)]
struct ReportResponse {
    #[serde(rename = "Status", default)]
    status: String,
    #[serde(rename = "StatusMessage", default)]
    status_message: Option<String>,
    #[serde(rename = "Identifier", default)]
    identifier: Option<Value>,
    #[serde(rename = "Data", default)]
    data: Option<String>,
}

impl ReportResponse {
    fn identifier(&self) -> Option<String> {
        match self.identifier.as_ref()? {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    fn failure(&self) -> SyncError {
        SyncError::ReportStatusError {
            status: self.status.clone(),
            message: self
                .status_message
                .clone()
                .unwrap_or_else(|| "Unknown error".to_string()),
        }
    }
}

/// Runs the configured CollaborateMD claims report and downloads its result.
pub struct CollaborateMdClient {
    client: Client,
    base_url: String,
    customer: String,
    report_seq: String,
    filter_seq: String,
    auth_header: String,
    trigger_retry: RetryPolicy,
    poll_retry: RetryPolicy,
    poll_delay: Duration,
}

impl CollaborateMdClient {
    pub fn new(config: &SyncConfig) -> Result<Self> {
        let cmd = &config.collaboratemd;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()?;

        let credentials = format!("{}:{}", cmd.username, cmd.password.expose());
        let trigger_retry = RetryPolicy::from_config(&config.retry);
        let poll_retry = RetryPolicy::new(
            cmd.poll_max_retries,
            secs_to_duration(cmd.poll_initial_delay_secs),
            config.retry.backoff_factor,
        )
        .with_max_delay(trigger_retry.max_delay);

        Ok(Self {
            client,
            base_url: cmd.base_url.trim_end_matches('/').to_string(),
            customer: cmd.customer.clone(),
            report_seq: cmd.report_seq.clone(),
            filter_seq: cmd.filter_seq.clone(),
            auth_header: format!("Basic {}", STANDARD.encode(credentials)),
            trigger_retry,
            poll_retry,
            poll_delay: secs_to_duration(cmd.poll_delay_secs),
        })
    }

    fn run_url(&self) -> String {
        format!(
            "{}/v1/customer/{}/reports/{}/filter/{}/run",
            self.base_url, self.customer, self.report_seq, self.filter_seq
        )
    }

    fn results_url(&self, request_seq: &str) -> String {
        format!(
            "{}/v1/customer/{}/reports/results/{}",
            self.base_url, self.customer, request_seq
        )
    }

    async fn post_report(&self, url: &str) -> Attempt<ReportResponse> {
        let response = match self
            .client
            .post(url)
            .header(AUTHORIZATION, &self.auth_header)
            .header(ACCEPT, "application/json")
            .header(CONTENT_TYPE, "application/json")
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return Attempt::Pending(format!("request failed: {}", e)),
        };

        let status = response.status();
        if status.is_server_error() || status == StatusCode::TOO_MANY_REQUESTS {
            return Attempt::Pending(format!("HTTP {}", status));
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Attempt::Failed(SyncError::ApiError {
                status: status.as_u16(),
                body,
            });
        }

        match response.json::<ReportResponse>().await {
            Ok(body) => Attempt::Done(body),
            Err(e) => Attempt::Failed(e.into()),
        }
    }

    /// Returns the request identifier to poll with.
    async fn trigger_once(&self) -> Attempt<String> {
        let url = self.run_url();
        tracing::info!("Triggering report run: {}", url);

        let body = match self.post_report(&url).await {
            Attempt::Done(body) => body,
            Attempt::Pending(reason) => return Attempt::Pending(reason),
            Attempt::Failed(e) => return Attempt::Failed(e),
        };

        match body.status.as_str() {
            STATUS_SUCCESS => match body.identifier() {
                Some(id) => {
                    tracing::info!("Report run initiated successfully. Request ID: {}", id);
                    Attempt::Done(id)
                }
                None => Attempt::Failed(SyncError::ReportStatusError {
                    status: body.status.clone(),
                    message: "No request identifier returned from report run".to_string(),
                }),
            },
            STATUS_RUNNING => match body.identifier() {
                Some(id) => {
                    tracing::warn!("Previous report still running, polling request {}", id);
                    Attempt::Done(id)
                }
                None => Attempt::Failed(SyncError::ReportStatusError {
                    status: body.status.clone(),
                    message: "Previous report still running and no identifier was returned"
                        .to_string(),
                }),
            },
            _ => Attempt::Failed(body.failure()),
        }
    }

    async fn poll_once(&self, request_seq: &str) -> Attempt<Vec<ClaimRecord>> {
        tracing::info!("Fetching report results for request: {}", request_seq);

        let body = match self.post_report(&self.results_url(request_seq)).await {
            Attempt::Done(body) => body,
            Attempt::Pending(reason) => return Attempt::Pending(reason),
            Attempt::Failed(e) => return Attempt::Failed(e),
        };

        match body.status.as_str() {
            STATUS_SUCCESS => {}
            STATUS_RUNNING => return Attempt::Pending("Report still running".to_string()),
            STATUS_TIMED_OUT => return Attempt::Failed(SyncError::ReportTimedOut),
            _ => return Attempt::Failed(body.failure()),
        }

        let encoded: String = body
            .data
            .as_deref()
            .unwrap_or_default()
            .split_whitespace()
            .collect();
        if encoded.is_empty() {
            tracing::warn!("No data returned from report");
            return Attempt::Done(Vec::new());
        }

        let archive = match STANDARD.decode(encoded) {
            Ok(bytes) => bytes,
            Err(e) => return Attempt::Failed(e.into()),
        };
        tracing::info!("Retrieved {} bytes of zipped data", archive.len());

        match extract_claims_from_zip(&archive) {
            Ok(claims) => {
                tracing::info!("Successfully extracted {} claim records", claims.len());
                Attempt::Done(claims)
            }
            Err(e) => Attempt::Failed(e),
        }
    }

    pub async fn run_report(&self) -> Result<String> {
        self.trigger_retry
            .run("run_report", move || self.trigger_once())
            .await
    }

    pub async fn get_report_results(&self, request_seq: &str) -> Result<Vec<ClaimRecord>> {
        self.poll_retry
            .run("get_report_results", move || self.poll_once(request_seq))
            .await
    }
}

#[async_trait]
impl ClaimSource for CollaborateMdClient {
    async fn fetch_claims(&self, since: Option<DateTime<Utc>>) -> Result<Vec<ClaimRecord>> {
        tracing::info!("Starting CollaborateMD claims fetch");
        match since {
            Some(ts) => tracing::info!("Fetching claims modified since: {}", ts),
            None => tracing::info!("Fetching all claims (full sync)"),
        }

        let request_seq = self.run_report().await?;

        // Give the report a head start before the first poll.
        tokio::time::sleep(self.poll_delay).await;

        let mut claims = self.get_report_results(&request_seq).await?;
        if let Some(ts) = since {
            claims = filter_by_timestamp(claims, ts);
        }

        tracing::info!("📊 Fetched {} claims from CollaborateMD", claims.len());
        Ok(claims)
    }
}

/// Collects claim rows from every `.json` entry of a report archive. Other
/// entries (the report can also carry CSV) are skipped.
pub fn extract_claims_from_zip(bytes: &[u8]) -> Result<Vec<ClaimRecord>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))?;
    let names: Vec<String> = archive.file_names().map(str::to_string).collect();
    tracing::info!("Files in zip: {:?}", names);

    let mut claims = Vec::new();
    for index in 0..archive.len() {
        let mut entry = archive.by_index(index)?;
        let name = entry.name().to_string();
        let lower = name.to_ascii_lowercase();

        if entry.is_dir() {
            continue;
        }
        if lower.ends_with(".json") {
            let mut content = String::new();
            entry.read_to_string(&mut content)?;
            let value: Value = serde_json::from_str(&content)?;
            append_report_json(&mut claims, value);
            tracing::info!("Processed {}: {} total claims so far", name, claims.len());
        } else if lower.ends_with(".csv") {
            tracing::info!("Found CSV file: {}, skipping", name);
        } else {
            tracing::info!("Skipping non-JSON file: {}", name);
        }
    }

    Ok(claims)
}

fn append_report_json(claims: &mut Vec<ClaimRecord>, value: Value) {
    match value {
        Value::Array(items) => claims.extend(items.into_iter().map(ClaimRecord::from_value)),
        Value::Object(mut object) => match object.remove("data") {
            Some(Value::Array(items)) => {
                claims.extend(items.into_iter().map(ClaimRecord::from_value))
            }
            Some(data) => claims.push(ClaimRecord::from_value(data)),
            None => claims.push(ClaimRecord::new(object)),
        },
        other => tracing::warn!("Ignoring JSON document that is not a list or object: {}", other),
    }
}

/// Keeps claims where any [`WATERMARK_FIELDS`] value, tried in order, is at
/// or after `since`. Claims whose dates are all older or unparsable are
/// dropped; the filter is a heuristic over whatever dates the report exposes.
pub fn filter_by_timestamp(claims: Vec<ClaimRecord>, since: DateTime<Utc>) -> Vec<ClaimRecord> {
    let before = claims.len();
    let filtered: Vec<ClaimRecord> = claims
        .into_iter()
        .filter(|claim| is_modified_since(claim, since))
        .collect();

    tracing::info!(
        "Filtered {} of {} claims modified since {}",
        filtered.len(),
        before,
        since
    );
    filtered
}

fn is_modified_since(claim: &ClaimRecord, since: DateTime<Utc>) -> bool {
    for field in WATERMARK_FIELDS {
        if !claim.has_value(field) {
            continue;
        }
        match claim.get_timestamp(field) {
            Some(ts) if ts >= since => return true,
            Some(_) => {}
            None => tracing::warn!("Could not parse date field {}: {:?}", field, claim.get(field)),
        }
    }

    tracing::debug!(
        "Dropping claim {:?}: no date field at or after the watermark",
        claim.get_string("ClaimID")
    );
    false
}
