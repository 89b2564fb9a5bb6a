use std::fmt;

use serde::{Deserialize, Serialize};

/// One `(reason, message)` entry of a structured API error payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ErrorEntry {
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<String>,
}

impl ErrorEntry {
    pub fn new(reason: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            reason: reason.into(),
            message: message.into(),
            location: None,
        }
    }
}

/// Failure reported by a [`crate::transport::Transport`] call.
#[derive(Debug, Clone)]
pub enum TransportError {
    /// Credentials could not be refreshed or were rejected before the request.
    Auth { reason: String },

    /// The service answered with an error status and payload.
    Response {
        status: u16,
        message: String,
        errors: Vec<ErrorEntry>,
        raw: String,
    },

    Connection { reason: String },

    Decode { message: String },
}

impl TransportError {
    pub fn response(status: u16, message: impl Into<String>, errors: Vec<ErrorEntry>) -> Self {
        let message = message.into();
        TransportError::Response {
            status,
            raw: message.clone(),
            message,
            errors,
        }
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        let message = message.into();
        Self::response(404, message.clone(), vec![ErrorEntry::new("notFound", message)])
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            TransportError::Response { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }
}

impl fmt::Display for TransportError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransportError::Auth { reason } => write!(f, "Authentication failed: {reason}"),
            TransportError::Response { status, message, .. } => {
                write!(f, "HTTP {status}: {message}")
            }
            TransportError::Connection { reason } => write!(f, "Connection failed: {reason}"),
            TransportError::Decode { message } => write!(f, "Could not decode response: {message}"),
        }
    }
}

impl std::error::Error for TransportError {}
