use thiserror::Error;

#[derive(Error, Debug)]
pub enum SyncError {
    #[error("Zip operation failed: {0}")]
    ZipError(#[from] zip::result::ZipError),

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Base64 decoding failed: {0}")]
    DecodeError(#[from] base64::DecodeError),

    #[error("Configuration error: {message}")]
    ConfigError { message: String },

    #[error("Missing required configuration: {field}")]
    MissingConfigError { field: String },

    #[error("Invalid value '{value}' for {field}: {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Report request failed: {status} - {message}")]
    ReportStatusError { status: String, message: String },

    #[error("Report execution timed out. Consider narrowing the filter criteria.")]
    ReportTimedOut,

    #[error("API returned HTTP {status}: {body}")]
    ApiError { status: u16, body: String },

    #[error("Authentication failed: {message}")]
    AuthError { message: String },

    #[error("{operation} failed after {attempts} attempts: {last_error}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        last_error: String,
    },

    #[error("State store error: {message}")]
    StateStoreError { message: String },

    #[error("Data processing error: {message}")]
    ProcessingError { message: String },
}

pub type Result<T> = std::result::Result<T, SyncError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl SyncError {
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            SyncError::ConfigError { .. }
            | SyncError::MissingConfigError { .. }
            | SyncError::InvalidConfigValueError { .. }
            | SyncError::AuthError { .. } => ErrorSeverity::Critical,
            SyncError::HttpError(_)
            | SyncError::RetriesExhausted { .. }
            | SyncError::ReportTimedOut => ErrorSeverity::Medium,
            SyncError::StateStoreError { .. } => ErrorSeverity::Low,
            _ => ErrorSeverity::High,
        }
    }

    /// Transport-level failure: nothing reached the remote side, or the
    /// connection dropped before a response arrived.
    pub fn is_connectivity(&self) -> bool {
        match self {
            SyncError::HttpError(e) => e.is_connect() || e.is_timeout() || e.is_request(),
            _ => false,
        }
    }

    pub fn user_friendly_message(&self) -> String {
        match self {
            SyncError::MissingConfigError { field } => {
                format!("Required setting '{}' is not configured", field)
            }
            SyncError::InvalidConfigValueError { field, reason, .. } => {
                format!("Setting '{}' is invalid: {}", field, reason)
            }
            SyncError::AuthError { .. } => "Could not sign in to Salesforce".to_string(),
            SyncError::ReportTimedOut => "The CollaborateMD report timed out".to_string(),
            SyncError::RetriesExhausted { operation, .. } => {
                format!("{} did not succeed after retrying", operation)
            }
            other => other.to_string(),
        }
    }

    pub fn recovery_suggestion(&self) -> &'static str {
        match self.severity() {
            ErrorSeverity::Critical => "Check credentials and configuration values",
            ErrorSeverity::Medium => "Retry later; the remote system may be busy",
            ErrorSeverity::High => "Inspect the logs for the failing request",
            ErrorSeverity::Low => "No action required",
        }
    }
}
