mod parser;
mod transport;

use thiserror::Error;

pub use parser::{parse_bq_error, ErrorContext};
pub use transport::{ErrorEntry, TransportError};

#[derive(Error, Debug)]
pub enum GbqError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Strict mode error: {0}")]
    StrictMode(String),

    #[error("Access denied: {0}")]
    AccessDenied(String),

    #[error("Invalid private key format: {0}")]
    InvalidPrivateKeyFormat(String),

    #[error("{message}")]
    Generic {
        reason: Option<String>,
        status: Option<u16>,
        message: String,
    },

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Query timeout: {timeout_ms} ms (elapsed {elapsed_ms} ms)")]
    QueryTimeout { timeout_ms: u64, elapsed_ms: u64 },

    #[error("Invalid page token: {0}")]
    InvalidPageToken(String),

    #[error("Invalid schema: {0}")]
    InvalidSchema(String),

    #[error("Table creation error: {0}")]
    TableCreation(String),

    #[error("Dataset creation error: {0}")]
    DatasetCreation(String),

    #[error("Streaming insert error: {0}")]
    StreamingInsert(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Decode error: {0}")]
    Decode(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),
}

pub type Result<T> = std::result::Result<T, GbqError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    Configuration,
    AccessDenied,
    Generic,
    NotFound,
    QueryTimeout,
    InvalidPageToken,
    InvalidSchema,
    TableCreation,
    DatasetCreation,
    StreamingInsert,
    Connection,
    Decode,
    Io,
}

/// Reasons BigQuery documents as safe to retry.
const TRANSIENT_REASONS: &[&str] = &["backendError", "internalError", "rateLimitExceeded"];

impl GbqError {
    pub fn generic(reason: impl Into<String>, message: impl Into<String>) -> Self {
        let reason = reason.into();
        let message = message.into();
        GbqError::Generic {
            message: format!("Reason: {}, Message: {}", reason, message),
            reason: Some(reason),
            status: None,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            GbqError::Configuration(_) | GbqError::StrictMode(_) => ErrorKind::Configuration,
            GbqError::AccessDenied(_) | GbqError::InvalidPrivateKeyFormat(_) => ErrorKind::AccessDenied,
            GbqError::Generic { .. } => ErrorKind::Generic,
            GbqError::NotFound(_) => ErrorKind::NotFound,
            GbqError::QueryTimeout { .. } => ErrorKind::QueryTimeout,
            GbqError::InvalidPageToken(_) => ErrorKind::InvalidPageToken,
            GbqError::InvalidSchema(_) => ErrorKind::InvalidSchema,
            GbqError::TableCreation(_) => ErrorKind::TableCreation,
            GbqError::DatasetCreation(_) => ErrorKind::DatasetCreation,
            GbqError::StreamingInsert(_) => ErrorKind::StreamingInsert,
            GbqError::Connection(_) => ErrorKind::Connection,
            GbqError::Decode(_) | GbqError::Json(_) | GbqError::Yaml(_) | GbqError::Arrow(_) => {
                ErrorKind::Decode
            }
            GbqError::Io(_) => ErrorKind::Io,
        }
    }

    /// Whether repeating the same call may succeed without caller intervention.
    pub fn is_transient(&self) -> bool {
        match self {
            GbqError::Connection(_) => true,
            GbqError::Generic { reason, status, .. } => {
                let transient_reason = reason
                    .as_deref()
                    .map(|r| TRANSIENT_REASONS.contains(&r))
                    .unwrap_or(false);
                let server_error = matches!(status, Some(500..=599));
                transient_reason || server_error
            }
            _ => false,
        }
    }
}
