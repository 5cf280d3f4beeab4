use thiserror::Error;

#[derive(Error, Debug)]
pub enum RfidError {
    #[error("Invalid plate '{value}': must be 7-8 printable ASCII characters")]
    InvalidPlate { value: String },

    #[error("Invalid record id '{value}': must contain decimal digits only")]
    InvalidRecordId { value: String },

    #[error("Invalid tag payload: {reason}")]
    InvalidPayload { reason: String },

    #[error("Reader is not connected")]
    ReaderNotConnected,

    #[error("Reader operation '{operation}' failed (rc={code})")]
    Hardware { operation: String, code: i32 },

    #[error("Tag already carries data (plate: {plate}, record id: {record_id}); remove it first")]
    TagNotEmpty { plate: String, record_id: String },

    #[error("Registry already has a tag for this plate (tag number: {tag_number})")]
    RegistryHasTag { tag_number: String },

    #[error("Tag is empty, nothing to remove")]
    NothingToRemove,

    #[error("Tag is unreachable")]
    TagUnreachable,

    #[error("Registry rejected the request: {message}")]
    RegistryRejected { message: String },

    #[error("Authentication failed: {message}")]
    AuthFailed { message: String },

    #[error("No tag found within {timeout_ms} ms")]
    ScanTimeout { timeout_ms: u64 },

    #[error("Registry updated but tag write failed: {message}")]
    PartialFailure { message: String },

    #[error("API error ({status}): {message}")]
    Api {
        status: u16,
        message: String,
        raw_body: Option<String>,
    },

    #[error("HTTP request failed: {0}")]
    HttpError(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("Configuration error in '{field}': {message}")]
    ConfigValidationError { field: String, message: String },

    #[error("Invalid value '{value}' for '{field}': {reason}")]
    InvalidConfigValueError {
        field: String,
        value: String,
        reason: String,
    },

    #[error("Missing required configuration field '{field}'")]
    MissingConfigError { field: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorCategory {
    Validation,
    Hardware,
    Conflict,
    Timeout,
    Transport,
    Inconsistency,
}

impl RfidError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidPlate { .. }
            | Self::InvalidRecordId { .. }
            | Self::InvalidPayload { .. }
            | Self::ConfigValidationError { .. }
            | Self::InvalidConfigValueError { .. }
            | Self::MissingConfigError { .. } => ErrorCategory::Validation,

            Self::ReaderNotConnected | Self::Hardware { .. } => ErrorCategory::Hardware,

            Self::TagNotEmpty { .. }
            | Self::RegistryHasTag { .. }
            | Self::NothingToRemove
            | Self::TagUnreachable
            | Self::RegistryRejected { .. } => ErrorCategory::Conflict,

            Self::ScanTimeout { .. } => ErrorCategory::Timeout,

            Self::Api { .. }
            | Self::AuthFailed { .. }
            | Self::HttpError(_)
            | Self::IoError(_)
            | Self::SerializationError(_) => ErrorCategory::Transport,

            Self::PartialFailure { .. } => ErrorCategory::Inconsistency,
        }
    }

    /// Only timeouts are safe to repeat as-is; auth expiry is retried inside the gateway.
    pub fn is_retryable(&self) -> bool {
        matches!(self.category(), ErrorCategory::Timeout)
    }

    pub fn status_code(&self) -> Option<u16> {
        match self {
            Self::Api { status, .. } => Some(*status),
            Self::HttpError(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    /// 給操作人員看的訊息
    pub fn user_message(&self) -> String {
        match self {
            Self::Api { message, .. }
            | Self::AuthFailed { message }
            | Self::RegistryRejected { message } => message.clone(),
            Self::TagUnreachable => "Tag is unreachable. Hold it closer to the reader.".to_string(),
            Self::ScanTimeout { .. } => "No tag found.".to_string(),
            Self::PartialFailure { message } => format!(
                "{} Registry and tag now disagree; reconcile manually.",
                message
            ),
            other => other.to_string(),
        }
    }

    pub fn exit_code(&self) -> i32 {
        match self.category() {
            ErrorCategory::Validation => 1,
            ErrorCategory::Conflict => 2,
            ErrorCategory::Timeout => 3,
            ErrorCategory::Hardware => 4,
            ErrorCategory::Transport => 5,
            ErrorCategory::Inconsistency => 6,
        }
    }
}

pub type Result<T> = std::result::Result<T, RfidError>;
