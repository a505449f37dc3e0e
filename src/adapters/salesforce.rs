use crate::config::{SalesforceConfig, SyncConfig};
use crate::core::retry::{Attempt, RetryPolicy};
use crate::domain::model::{PayorLookup, RecordError, TransformedClaim, UpsertSummary};
use crate::domain::ports::ClaimTarget;
use crate::utils::error::{Result, SyncError};
use async_trait::async_trait;
use regex::Regex;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Client, Response, StatusCode, Url};
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tokio::sync::RwLock;

/// Upper bound on error descriptors kept in an [`UpsertSummary`].
pub const MAX_TRACKED_ERRORS: usize = 100;

#[derive(Debug, Clone, PartialEq)]
pub struct Session {
    pub access_token: String,
    pub instance_url: String,
}

#[derive(Debug, Clone)]
enum AuthState {
    Unauthenticated,
    Authenticated(Session),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Updated,
    Created,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    instance_url: String,
}

#[derive(Debug, Deserialize)]
struct OAuthError {
    error: String,
    #[serde(default)]
    error_description: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ApiErrorItem {
    #[serde(default)]
    message: String,
    #[serde(default)]
    error_code: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct QueryResponse {
    #[serde(default)]
    records: Vec<Value>,
    #[serde(default = "default_done")]
    done: bool,
    next_records_url: Option<String>,
}

fn default_done() -> bool {
    true
}

/// Salesforce REST client for the claims object. Authenticates lazily and
/// reuses the session for every later call on the same instance.
pub struct SalesforceClient {
    client: Client,
    config: SalesforceConfig,
    retry: RetryPolicy,
    auth: RwLock<AuthState>,
}

impl SalesforceClient {
    pub fn new(config: &SyncConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(Duration::from_secs(config.http_timeout_secs))
            .build()?;

        Ok(Self {
            client,
            config: config.salesforce.clone(),
            retry: RetryPolicy::from_config(&config.retry),
            auth: RwLock::new(AuthState::Unauthenticated),
        })
    }

    pub async fn is_authenticated(&self) -> bool {
        matches!(*self.auth.read().await, AuthState::Authenticated(_))
    }

    /// Logs in on first use; later calls return the cached session.
    pub async fn ensure_authenticated(&self) -> Result<Session> {
        if let AuthState::Authenticated(session) = &*self.auth.read().await {
            return Ok(session.clone());
        }

        let mut state = self.auth.write().await;
        if let AuthState::Authenticated(session) = &*state {
            return Ok(session.clone());
        }

        tracing::info!("Authenticating with Salesforce");
        let session = self
            .retry
            .run("salesforce_authenticate", move || self.login_once())
            .await
            .inspect_err(|e| tracing::error!("Salesforce authentication failed: {}", e))?;

        tracing::info!("✅ Successfully authenticated with Salesforce");
        *state = AuthState::Authenticated(session.clone());
        Ok(session)
    }

    async fn login_once(&self) -> Attempt<Session> {
        match self.config.client_credentials() {
            Some((client_id, client_secret)) => {
                self.client_credentials_login(client_id, client_secret).await
            }
            None => self.soap_login().await,
        }
    }

    async fn client_credentials_login(&self, client_id: &str, client_secret: &str) -> Attempt<Session> {
        let url = format!(
            "{}/services/oauth2/token",
            self.config.instance_url.trim_end_matches('/')
        );
        let request = self.client.post(&url).form(&[
            ("grant_type", "client_credentials"),
            ("client_id", client_id),
            ("client_secret", client_secret),
        ]);

        let response = match request.send().await {
            Ok(response) => response,
            Err(e) => return Attempt::Pending(format!("token request failed: {}", e)),
        };
        let status = response.status();
        if status.is_server_error() {
            return Attempt::Pending(format!("token endpoint returned HTTP {}", status));
        }

        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return Attempt::Pending(format!("token response unreadable: {}", e)),
        };
        if !status.is_success() {
            let message = match serde_json::from_str::<OAuthError>(&body) {
                Ok(err) => match err.error_description {
                    Some(description) => format!("{}: {}", err.error, description),
                    None => err.error,
                },
                Err(_) => format!("HTTP {}: {}", status, body),
            };
            return Attempt::Failed(SyncError::AuthError { message });
        }

        match serde_json::from_str::<TokenResponse>(&body) {
            Ok(token) => Attempt::Done(Session {
                access_token: token.access_token,
                instance_url: token.instance_url.trim_end_matches('/').to_string(),
            }),
            Err(e) => Attempt::Failed(e.into()),
        }
    }

    async fn soap_login(&self) -> Attempt<Session> {
        let url = format!(
            "{}/services/Soap/u/{}",
            self.config.login_url.trim_end_matches('/'),
            self.config.api_version
        );
        let password = format!(
            "{}{}",
            self.config.password.expose(),
            self.config.security_token.expose()
        );
        let envelope = format!(
            r#"<?xml version="1.0" encoding="utf-8" ?>
<env:Envelope xmlns:xsd="http://www.w3.org/2001/XMLSchema" xmlns:xsi="http://www.w3.org/2001/XMLSchema-instance" xmlns:env="http://schemas.xmlsoap.org/soap/envelope/" xmlns:urn="urn:partner.soap.sforce.com">
  <env:Body>
    <urn:login>
      <urn:username>{}</urn:username>
      <urn:password>{}</urn:password>
    </urn:login>
  </env:Body>
</env:Envelope>"#,
            xml_escape(&self.config.username),
            xml_escape(&password)
        );

        let response = match self
            .client
            .post(&url)
            .header(CONTENT_TYPE, "text/xml; charset=UTF-8")
            .header("SOAPAction", "login")
            .body(envelope)
            .send()
            .await
        {
            Ok(response) => response,
            Err(e) => return Attempt::Pending(format!("login request failed: {}", e)),
        };

        let status = response.status();
        let body = match response.text().await {
            Ok(body) => body,
            Err(e) => return Attempt::Pending(format!("login response unreadable: {}", e)),
        };

        // Rejected credentials come back as a SOAP fault with HTTP 500.
        if let Some(fault) = xml_tag(&body, "faultstring") {
            return Attempt::Failed(SyncError::AuthError { message: fault });
        }
        if status.is_server_error() {
            return Attempt::Pending(format!("login endpoint returned HTTP {}", status));
        }
        if !status.is_success() {
            return Attempt::Failed(SyncError::AuthError {
                message: format!("HTTP {}: {}", status, body),
            });
        }

        let session_id = xml_tag(&body, "sessionId");
        let server_url = xml_tag(&body, "serverUrl").and_then(|u| Url::parse(&u).ok());
        match (session_id, server_url) {
            (Some(access_token), Some(server_url)) => Attempt::Done(Session {
                access_token,
                instance_url: server_url.origin().ascii_serialization(),
            }),
            _ => Attempt::Failed(SyncError::AuthError {
                message: "login response did not contain a session".to_string(),
            }),
        }
    }

    fn data_url(&self, session: &Session, segments: &[&str]) -> Result<Url> {
        let base = format!(
            "{}/services/data/v{}",
            session.instance_url, self.config.api_version
        );
        let mut url = Url::parse(&base).map_err(|e| SyncError::ProcessingError {
            message: format!("Invalid Salesforce URL '{}': {}", base, e),
        })?;
        url.path_segments_mut()
            .map_err(|_| SyncError::ProcessingError {
                message: format!("Salesforce URL cannot carry a path: {}", base),
            })?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    /// PATCH by external id; falls back to create when the record is unknown.
    pub async fn upsert_one(
        &self,
        session: &Session,
        external_id: &str,
        claim: &TransformedClaim,
    ) -> Result<UpsertOutcome> {
        let object = self.config.claim_object.as_str();
        let field = self.config.external_id_field.as_str();

        let url = self.data_url(session, &["sobjects", object, field, external_id])?;
        let response = self
            .client
            .patch(url)
            .bearer_auth(&session.access_token)
            .json(&claim.without(field))
            .send()
            .await?;

        let status = response.status();
        if status.is_success() {
            return Ok(if status == StatusCode::CREATED {
                UpsertOutcome::Created
            } else {
                UpsertOutcome::Updated
            });
        }

        let error = api_error(response).await;
        if !is_not_found(status, &error) {
            return Err(error);
        }

        tracing::debug!("Claim {} not found, creating it", external_id);
        let url = self.data_url(session, &["sobjects", object])?;
        let response = self
            .client
            .post(url)
            .bearer_auth(&session.access_token)
            .json(&claim.fields)
            .send()
            .await?;

        if response.status().is_success() {
            Ok(UpsertOutcome::Created)
        } else {
            Err(api_error(response).await)
        }
    }

    async fn upsert_chunk(&self, session: &Session, chunk: &[TransformedClaim]) -> Result<UpsertSummary> {
        let field = self.config.external_id_field.as_str();
        let mut summary = UpsertSummary {
            total: chunk.len(),
            ..UpsertSummary::default()
        };

        let mut created = 0;
        for claim in chunk {
            let Some(external_id) = claim.get_str(field).filter(|id| !id.is_empty()) else {
                tracing::warn!("Claim missing {}, skipping", field);
                summary.failed += 1;
                summary.errors.push(RecordError::Record {
                    claim_id: None,
                    error: format!("Missing {}", field),
                });
                continue;
            };

            match self.upsert_one(session, external_id, claim).await {
                Ok(outcome) => {
                    summary.successful += 1;
                    if outcome == UpsertOutcome::Created {
                        created += 1;
                    }
                }
                Err(e) if e.is_connectivity() => return Err(e),
                Err(e) => {
                    tracing::error!("Failed to upsert claim {}: {}", external_id, e);
                    summary.failed += 1;
                    summary.errors.push(RecordError::Record {
                        claim_id: Some(external_id.to_string()),
                        error: e.to_string(),
                    });
                }
            }
        }

        tracing::debug!(
            "Chunk done: {} updated, {} created, {} failed",
            summary.successful - created,
            created,
            summary.failed
        );
        Ok(summary)
    }

    /// Follows `nextRecordsUrl` until the query is exhausted.
    pub async fn query_all(&self, session: &Session, soql: &str) -> Result<Vec<Value>> {
        let mut url = self.data_url(session, &["query"])?;
        url.query_pairs_mut().append_pair("q", soql);

        let mut records = Vec::new();
        loop {
            let response = self
                .client
                .get(url.clone())
                .bearer_auth(&session.access_token)
                .send()
                .await?;
            if !response.status().is_success() {
                return Err(api_error(response).await);
            }

            let page: QueryResponse = response.json().await?;
            records.extend(page.records);

            match page.next_records_url {
                Some(next) if !page.done => {
                    url = Url::parse(&format!("{}{}", session.instance_url, next)).map_err(|e| {
                        SyncError::ProcessingError {
                            message: format!("Invalid nextRecordsUrl '{}': {}", next, e),
                        }
                    })?;
                }
                _ => break,
            }
        }

        Ok(records)
    }
}

#[async_trait]
impl ClaimTarget for SalesforceClient {
    async fn payor_lookup(&self) -> Result<PayorLookup> {
        let session = self.ensure_authenticated().await?;
        let soql = format!("SELECT Id, Name FROM {}", self.config.payor_object);

        let records = self.query_all(&session, &soql).await?;
        let rows = records.into_iter().filter_map(|record| {
            let name = record.get("Name")?.as_str()?.to_string();
            let id = record.get("Id")?.as_str()?.to_string();
            Some((name, id))
        });
        let lookup = PayorLookup::from_rows(rows);

        tracing::info!("Retrieved {} claim payor mappings", lookup.len());
        Ok(lookup)
    }

    async fn upsert_claims(&self, claims: &[TransformedClaim]) -> Result<UpsertSummary> {
        if claims.is_empty() {
            tracing::warn!("No claims to upsert");
            return Ok(UpsertSummary::default());
        }

        tracing::info!("Upserting {} claims to Salesforce", claims.len());
        let session = self.ensure_authenticated().await?;

        let batch_size = self.config.batch_size.max(1);
        let chunk_count = claims.len().div_ceil(batch_size);
        tracing::info!(
            "Split into {} batches of max {} records",
            chunk_count,
            batch_size
        );

        let mut total = UpsertSummary {
            total: claims.len(),
            ..UpsertSummary::default()
        };

        for (index, chunk) in claims.chunks(batch_size).enumerate() {
            let batch = index + 1;
            tracing::info!(
                "Processing batch {}/{} ({} records)",
                batch,
                chunk_count,
                chunk.len()
            );

            match self.upsert_chunk(&session, chunk).await {
                Ok(result) => {
                    tracing::info!(
                        "Batch {} complete: {} successful, {} failed",
                        batch,
                        result.successful,
                        result.failed
                    );
                    total.successful += result.successful;
                    total.failed += result.failed;
                    total.errors.extend(result.errors);
                }
                Err(e) => {
                    tracing::error!("Batch {} failed completely: {}", batch, e);
                    total.failed += chunk.len();
                    total.errors.push(RecordError::Chunk {
                        batch,
                        error: e.to_string(),
                        records: chunk.len(),
                    });
                }
            }
        }
        total.errors.truncate(MAX_TRACKED_ERRORS);

        tracing::info!(
            "Upsert complete: {}/{} successful, {} failed",
            total.successful,
            total.total,
            total.failed
        );
        Ok(total)
    }
}

async fn api_error(response: Response) -> SyncError {
    let status = response.status().as_u16();
    let body = response.text().await.unwrap_or_default();

    let body = match serde_json::from_str::<Vec<ApiErrorItem>>(&body) {
        Ok(items) if !items.is_empty() => items
            .iter()
            .map(|item| format!("{}: {}", item.error_code, item.message))
            .collect::<Vec<_>>()
            .join("; "),
        _ => body,
    };
    SyncError::ApiError { status, body }
}

fn is_not_found(status: StatusCode, error: &SyncError) -> bool {
    if status == StatusCode::NOT_FOUND {
        return true;
    }
    matches!(error, SyncError::ApiError { body, .. } if body.contains("NOT_FOUND"))
}

fn xml_tag(body: &str, tag: &str) -> Option<String> {
    let pattern = format!(r"<(?:[\w-]+:)?{tag}>([^<]*)</(?:[\w-]+:)?{tag}>");
    let re = Regex::new(&pattern).ok()?;
    re.captures(body).map(|caps| xml_unescape(&caps[1]))
}

fn xml_escape(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
        .replace('\'', "&apos;")
}

fn xml_unescape(value: &str) -> String {
    value
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
