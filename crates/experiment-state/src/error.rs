//! Error types for experiment-state

use thiserror::Error;

/// A draft is missing one or more required fields.
///
/// Raised before any network traffic; the message names every missing field.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Missing required fields: {}", .missing.join(", "))]
pub struct ValidationError {
    pub missing: Vec<String>,
}

/// Failures reported by a `RemoteClient`.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RemoteError {
    /// Connection, timeout or other transport failure
    #[error("{0}")]
    Transport(String),

    /// Backend answered with a non-2xx status
    #[error("API Error: {status} {reason}")]
    Status { status: u16, reason: String },

    /// Response body was not valid JSON
    #[error("Invalid JSON response: {0}")]
    Decode(String),

    /// HTTP client could not be constructed
    #[error("HTTP client setup failed: {0}")]
    Client(String),
}

impl From<reqwest::Error> for RemoteError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            RemoteError::Decode(err.to_string())
        } else if err.is_builder() {
            RemoteError::Client(err.to_string())
        } else {
            RemoteError::Transport(err.to_string())
        }
    }
}

/// Errors surfaced by `ExperimentStore` operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum StoreError {
    /// Local validation rejected the draft
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// The remote call failed
    #[error(transparent)]
    Remote(#[from] RemoteError),

    /// The remote call succeeded but the payload had the wrong shape
    #[error("{0}")]
    Shape(String),
}

impl From<serde_json::Error> for StoreError {
    fn from(err: serde_json::Error) -> Self {
        StoreError::Shape(format!("Invalid data format received from API: {err}"))
    }
}
