#[cfg(feature = "cli")]
pub mod cli;
pub mod toml_config;

use crate::utils::error::{Result, SyncError};
use crate::utils::validation::{
    validate_between, validate_non_empty_string, validate_range, validate_required, validate_url,
    Validate,
};
use serde::Deserialize;
use std::fmt;
use std::str::FromStr;

/// Credential text that never shows up in `Debug` output.
#[derive(Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(transparent)]
pub struct Secret(String);

impl Secret {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Secret {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            f.write_str("Secret(<empty>)")
        } else {
            f.write_str("Secret(***)")
        }
    }
}

impl From<&str> for Secret {
    fn from(value: &str) -> Self {
        Self::new(value)
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CollaborateMdConfig {
    pub base_url: String,
    pub username: String,
    pub password: Secret,
    pub customer: String,
    pub report_seq: String,
    pub filter_seq: String,
    /// Wait between triggering the report and the first results poll.
    pub poll_delay_secs: f64,
    pub poll_max_retries: u32,
    pub poll_initial_delay_secs: f64,
}

impl Default for CollaborateMdConfig {
    fn default() -> Self {
        Self {
            base_url: "https://webapi.collaboratemd.com".to_string(),
            username: String::new(),
            password: Secret::default(),
            customer: String::new(),
            report_seq: String::new(),
            filter_seq: String::new(),
            poll_delay_secs: 5.0,
            poll_max_retries: 10,
            poll_initial_delay_secs: 5.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SalesforceConfig {
    pub instance_url: String,
    pub login_url: String,
    pub username: String,
    pub password: Secret,
    pub security_token: Secret,
    pub client_id: Option<String>,
    pub client_secret: Option<Secret>,
    pub api_version: String,
    pub claim_object: String,
    pub external_id_field: String,
    pub payor_object: String,
    pub batch_size: usize,
}

impl SalesforceConfig {
    /// Both halves of the client-credential pair are set.
    pub fn client_credentials(&self) -> Option<(&str, &str)> {
        match (&self.client_id, &self.client_secret) {
            (Some(id), Some(secret)) if !id.trim().is_empty() && !secret.is_empty() => {
                Some((id.as_str(), secret.expose()))
            }
            _ => None,
        }
    }
}

impl Default for SalesforceConfig {
    fn default() -> Self {
        Self {
            instance_url: String::new(),
            login_url: "https://login.salesforce.com".to_string(),
            username: String::new(),
            password: Secret::default(),
            security_token: Secret::default(),
            client_id: None,
            client_secret: None,
            api_version: "59.0".to_string(),
            claim_object: "Claims__c".to_string(),
            external_id_field: "Claim_Number__c".to_string(),
            payor_object: "Claim_Payor__c".to_string(),
            batch_size: 200,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub backoff_factor: f64,
    pub initial_delay_secs: f64,
    pub max_delay_secs: Option<f64>,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            backoff_factor: 2.0,
            initial_delay_secs: 1.0,
            max_delay_secs: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct StateConfig {
    pub table_name: String,
    pub region: String,
    pub sync_id: String,
    pub local_dir: String,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            table_name: "collaboratemd-sync-state".to_string(),
            region: "us-east-1".to_string(),
            sync_id: "default".to_string(),
            local_dir: ".sync-state".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    pub log_level: String,
    pub http_timeout_secs: u64,
    pub collaboratemd: CollaborateMdConfig,
    pub salesforce: SalesforceConfig,
    pub retry: RetryConfig,
    pub state: StateConfig,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            http_timeout_secs: 120,
            collaboratemd: CollaborateMdConfig::default(),
            salesforce: SalesforceConfig::default(),
            retry: RetryConfig::default(),
            state: StateConfig::default(),
        }
    }
}

impl SyncConfig {
    /// Reads the process environment and validates the result.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds a validated config from any `NAME -> value` source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());
        let mut config = Self::default();

        let cmd = &mut config.collaboratemd;
        if let Some(v) = get("COLLABORATE_MD_BASE_URL") {
            cmd.base_url = v;
        }
        cmd.username = get("COLLABORATE_MD_USERNAME").unwrap_or_default();
        cmd.password = Secret::new(get("COLLABORATE_MD_PASSWORD").unwrap_or_default());
        cmd.customer = get("COLLABORATE_MD_CUSTOMER").unwrap_or_default();
        cmd.report_seq = get("COLLABORATE_MD_REPORT_SEQ").unwrap_or_default();
        cmd.filter_seq = get("COLLABORATE_MD_FILTER_SEQ").unwrap_or_default();
        cmd.poll_delay_secs = parse_or("REPORT_POLL_DELAY", get("REPORT_POLL_DELAY"), cmd.poll_delay_secs)?;
        cmd.poll_max_retries = parse_or(
            "REPORT_POLL_MAX_RETRIES",
            get("REPORT_POLL_MAX_RETRIES"),
            cmd.poll_max_retries,
        )?;
        cmd.poll_initial_delay_secs = parse_or(
            "REPORT_POLL_INITIAL_DELAY",
            get("REPORT_POLL_INITIAL_DELAY"),
            cmd.poll_initial_delay_secs,
        )?;

        let sf = &mut config.salesforce;
        sf.instance_url = get("SALESFORCE_INSTANCE_URL").unwrap_or_default();
        if let Some(v) = get("SALESFORCE_LOGIN_URL") {
            sf.login_url = v;
        }
        sf.username = get("SALESFORCE_USERNAME").unwrap_or_default();
        sf.password = Secret::new(get("SALESFORCE_PASSWORD").unwrap_or_default());
        sf.security_token = Secret::new(get("SALESFORCE_SECURITY_TOKEN").unwrap_or_default());
        sf.client_id = get("SALESFORCE_CONSUMER_KEY");
        sf.client_secret = get("SALESFORCE_CONSUMER_SECRET").map(Secret::new);
        if let Some(v) = get("SALESFORCE_API_VERSION") {
            sf.api_version = v;
        }
        if let Some(v) = get("SALESFORCE_CLAIM_OBJECT") {
            sf.claim_object = v;
        }
        if let Some(v) = get("SALESFORCE_EXTERNAL_ID_FIELD") {
            sf.external_id_field = v;
        }
        if let Some(v) = get("SALESFORCE_PAYOR_OBJECT") {
            sf.payor_object = v;
        }
        sf.batch_size = parse_or("BATCH_SIZE", get("BATCH_SIZE"), sf.batch_size)?;

        let retry = &mut config.retry;
        retry.max_retries = parse_or("MAX_RETRIES", get("MAX_RETRIES"), retry.max_retries)?;
        retry.backoff_factor = parse_or(
            "RETRY_BACKOFF_FACTOR",
            get("RETRY_BACKOFF_FACTOR"),
            retry.backoff_factor,
        )?;
        retry.initial_delay_secs = parse_or(
            "INITIAL_RETRY_DELAY",
            get("INITIAL_RETRY_DELAY"),
            retry.initial_delay_secs,
        )?;
        if let Some(v) = get("MAX_RETRY_DELAY") {
            retry.max_delay_secs = Some(parse_value("MAX_RETRY_DELAY", &v)?);
        }

        let state = &mut config.state;
        if let Some(v) = get("DYNAMODB_TABLE_NAME") {
            state.table_name = v;
        }
        if let Some(v) = get("AWS_REGION") {
            state.region = v;
        }
        if let Some(v) = get("SYNC_ID") {
            state.sync_id = v;
        }
        if let Some(v) = get("STATE_DIR") {
            state.local_dir = v;
        }

        config.http_timeout_secs =
            parse_or("HTTP_TIMEOUT", get("HTTP_TIMEOUT"), config.http_timeout_secs)?;
        if let Some(v) = get("LOG_LEVEL") {
            config.log_level = v;
        }

        config.validate()?;
        Ok(config)
    }
}

fn parse_value<T: FromStr>(field: &str, raw: &str) -> Result<T>
where
    T::Err: fmt::Display,
{
    raw.trim()
        .parse()
        .map_err(|e: T::Err| SyncError::InvalidConfigValueError {
            field: field.to_string(),
            value: raw.to_string(),
            reason: e.to_string(),
        })
}

fn parse_or<T: FromStr>(field: &str, raw: Option<String>, default: T) -> Result<T>
where
    T::Err: fmt::Display,
{
    match raw {
        Some(raw) => parse_value(field, &raw),
        None => Ok(default),
    }
}

/// Ceiling for every configured delay, in seconds.
const MAX_DELAY_SECS: f64 = 3600.0;
const MAX_BACKOFF_FACTOR: f64 = 10.0;

const LOG_LEVELS: [&str; 5] = ["trace", "debug", "info", "warn", "error"];

impl Validate for SyncConfig {
    fn validate(&self) -> Result<()> {
        let cmd = &self.collaboratemd;
        validate_url("collaboratemd.base_url", &cmd.base_url)?;
        validate_required("collaboratemd.username", &cmd.username)?;
        validate_required("collaboratemd.password", cmd.password.expose())?;
        validate_required("collaboratemd.customer", &cmd.customer)?;
        validate_required("collaboratemd.report_seq", &cmd.report_seq)?;
        validate_required("collaboratemd.filter_seq", &cmd.filter_seq)?;
        validate_between(
            "collaboratemd.poll_delay_secs",
            cmd.poll_delay_secs,
            0.0,
            MAX_DELAY_SECS,
        )?;
        validate_between(
            "collaboratemd.poll_initial_delay_secs",
            cmd.poll_initial_delay_secs,
            0.0,
            MAX_DELAY_SECS,
        )?;
        validate_range("collaboratemd.poll_max_retries", cmd.poll_max_retries, 0, 100)?;

        let sf = &self.salesforce;
        validate_required("salesforce.instance_url", &sf.instance_url)?;
        validate_url("salesforce.instance_url", &sf.instance_url)?;
        validate_url("salesforce.login_url", &sf.login_url)?;
        match (&sf.client_id, &sf.client_secret) {
            (Some(_), None) => {
                return Err(SyncError::MissingConfigError {
                    field: "salesforce.client_secret".to_string(),
                })
            }
            (None, Some(_)) => {
                return Err(SyncError::MissingConfigError {
                    field: "salesforce.client_id".to_string(),
                })
            }
            _ => {}
        }
        if sf.client_credentials().is_none() {
            validate_required("salesforce.username", &sf.username)?;
            validate_required("salesforce.password", sf.password.expose())?;
            validate_required("salesforce.security_token", sf.security_token.expose())?;
        }
        validate_non_empty_string("salesforce.api_version", &sf.api_version)?;
        validate_non_empty_string("salesforce.claim_object", &sf.claim_object)?;
        validate_non_empty_string("salesforce.external_id_field", &sf.external_id_field)?;
        validate_non_empty_string("salesforce.payor_object", &sf.payor_object)?;
        validate_range("salesforce.batch_size", sf.batch_size, 1, 2000)?;

        let retry = &self.retry;
        validate_range("retry.max_retries", retry.max_retries, 0, 20)?;
        validate_between(
            "retry.backoff_factor",
            retry.backoff_factor,
            1.0,
            MAX_BACKOFF_FACTOR,
        )?;
        validate_between(
            "retry.initial_delay_secs",
            retry.initial_delay_secs,
            0.0,
            MAX_DELAY_SECS,
        )?;
        if let Some(max_delay) = retry.max_delay_secs {
            validate_between("retry.max_delay_secs", max_delay, 0.0, MAX_DELAY_SECS)?;
        }

        validate_non_empty_string("state.table_name", &self.state.table_name)?;
        validate_non_empty_string("state.region", &self.state.region)?;
        validate_non_empty_string("state.sync_id", &self.state.sync_id)?;

        validate_range("http_timeout_secs", self.http_timeout_secs, 1, 900)?;
        if !LOG_LEVELS.contains(&self.log_level.to_lowercase().as_str()) {
            return Err(SyncError::InvalidConfigValueError {
                field: "log_level".to_string(),
                value: self.log_level.clone(),
                reason: format!("Valid levels: {}", LOG_LEVELS.join(", ")),
            });
        }

        tracing::debug!("✅ Configuration validation passed");
        Ok(())
    }
}
