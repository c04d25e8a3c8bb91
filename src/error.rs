//! Client errors.
//!
//! ERROR HANDLING
//! ==============
//! Every fallible client operation returns [`ClientError`]. Callers that
//! surface failures to a person use [`ClientError::user_message`]; callers
//! that decide whether to try again use [`ErrorCode::retryable`]. Nothing in
//! this crate retries on its own.

use canvas::registry::{RegistryError, WidgetId};

use crate::config::ConfigError;

/// Generic text shown when the server gave no error body.
pub const FALLBACK_ERROR_TEXT: &str = "Request failed";

/// Stable machine-readable code plus a retry hint.
pub trait ErrorCode: std::fmt::Display {
    fn error_code(&self) -> &'static str;

    fn retryable(&self) -> bool {
        false
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    /// Transport failure: connect, TLS, reset, body read.
    #[error("network error: {0}")]
    Network(String),

    /// The server answered with a non-success status.
    #[error("http status {status}")]
    Http { status: u16, body: String },

    /// A response or stream frame could not be understood.
    #[error("protocol error: {0}")]
    Protocol(#[from] events::CodecError),

    /// A stop request outlived its grace period.
    #[error("timed out after {0} ms")]
    Timeout(u64),

    #[error("duplicate widget id {0}")]
    DuplicateId(WidgetId),

    #[error("persistence failed: {0}")]
    Persist(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("config error: {0}")]
    Config(#[from] ConfigError),
}

impl From<RegistryError> for ClientError {
    fn from(e: RegistryError) -> Self {
        match e {
            RegistryError::DuplicateId(id) => Self::DuplicateId(id),
        }
    }
}

impl ClientError {
    /// Text suitable for an error message bubble.
    ///
    /// The server's own text when it sent one, else [`FALLBACK_ERROR_TEXT`].
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Http { body, .. } if !body.trim().is_empty() => body.trim().to_owned(),
            _ => FALLBACK_ERROR_TEXT.to_owned(),
        }
    }
}

impl ErrorCode for ClientError {
    fn error_code(&self) -> &'static str {
        match self {
            Self::Network(_) => "E_NETWORK",
            Self::Http { .. } => "E_HTTP",
            Self::Protocol(_) => "E_PROTOCOL",
            Self::Timeout(_) => "E_TIMEOUT",
            Self::DuplicateId(_) => "E_DUPLICATE_ID",
            Self::Persist(_) => "E_PERSIST",
            Self::Json(_) => "E_JSON",
            Self::Config(_) => "E_CONFIG",
        }
    }

    fn retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::Timeout(_) | Self::Http { status: 429 | 500..=599, .. })
    }
}

#[cfg(test)]
#[path = "error_test.rs"]
mod error_test;
