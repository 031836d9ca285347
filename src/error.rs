use std::time::Duration;
use thiserror::Error;

/// The five failure kinds a caller is expected to branch on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    NetworkFailure,
    Timeout,
    Unauthenticated,
    MalformedResponse,
    ValidationFailure,
}

#[derive(Error, Debug)]
pub enum ReportError {
    #[error("Network failure: {0}")]
    NetworkFailure(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Not authenticated: {0}")]
    Unauthenticated(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Validation failed for '{field}': {details}")]
    ValidationFailure { field: String, details: String },

    #[error("Totals mismatch in {scope} for '{field}': expected {expected}, found {actual}")]
    TotalsMismatch {
        scope: String,
        field: String,
        expected: f64,
        actual: f64,
    },

    #[error("Invalid report structure: {0}")]
    InvalidStructure(String),

    #[error("Server returned status {status}: {body}")]
    ServerError { status: u16, body: String },

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),
}

impl ReportError {
    pub fn validation(field: impl Into<String>, details: impl Into<String>) -> Self {
        Self::ValidationFailure {
            field: field.into(),
            details: details.into(),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NetworkFailure(_) | Self::ServerError { .. } | Self::IoError(_) => {
                ErrorKind::NetworkFailure
            }
            Self::Timeout(_) => ErrorKind::Timeout,
            Self::Unauthenticated(_) => ErrorKind::Unauthenticated,
            Self::MalformedResponse(_) | Self::SerializationError(_) => {
                ErrorKind::MalformedResponse
            }
            Self::ValidationFailure { .. }
            | Self::TotalsMismatch { .. }
            | Self::InvalidStructure(_) => ErrorKind::ValidationFailure,
        }
    }
}

#[cfg(feature = "client")]
impl From<reqwest::Error> for ReportError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            // reqwest does not report the configured duration back
            Self::Timeout(Duration::ZERO)
        } else if err.is_decode() {
            Self::MalformedResponse(err.to_string())
        } else {
            Self::NetworkFailure(err.to_string())
        }
    }
}

pub type Result<T> = std::result::Result<T, ReportError>;
