//! Error types for spyglass-core.

use thiserror::Error;

/// Result type alias using spyglass-core's Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while validating a project.
///
/// Connection- and selector-class errors are fatal for the invocation.
/// Timeout- and extraction-class errors are caught at the explore boundary
/// and recorded against that explore.
#[derive(Error, Debug)]
pub enum Error {
    /// Transport or HTTP failure from the modeling API
    #[error("API connection error: {message}")]
    ApiConnection {
        message: String,
        status: Option<u16>,
    },

    /// Malformed selector pattern
    #[error("invalid selector {pattern:?}: {reason}")]
    InvalidSelector { pattern: String, reason: String },

    /// A query task never reached a terminal state within the deadline
    #[error("query task {task_id} timed out after {elapsed_ms}ms")]
    QueryTimeout { task_id: String, elapsed_ms: u64 },

    /// The remote error payload had an unrecognized shape
    #[error("unable to extract error details from API response: {0}")]
    ErrorExtraction(String),

    /// The invocation was cancelled before this operation completed
    #[error("operation cancelled")]
    Cancelled,

    /// No data tests matched the current selectors
    #[error("no data tests found matching the given selectors")]
    NoDataTests,

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Internal error
    #[error("internal error: {0}")]
    Internal(String),
}

impl Error {
    /// Create a connection-class error without an HTTP status.
    pub fn api_connection(message: impl Into<String>) -> Self {
        Self::ApiConnection {
            message: message.into(),
            status: None,
        }
    }

    /// Create a connection-class error from an HTTP status and detail.
    pub fn api_status(status: u16, message: impl Into<String>) -> Self {
        Self::ApiConnection {
            message: message.into(),
            status: Some(status),
        }
    }

    /// Create a selector-class error.
    pub fn invalid_selector(pattern: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidSelector {
            pattern: pattern.into(),
            reason: reason.into(),
        }
    }

    /// Create a timeout-class error.
    pub fn query_timeout(task_id: impl Into<String>, elapsed_ms: u64) -> Self {
        Self::QueryTimeout {
            task_id: task_id.into(),
            elapsed_ms,
        }
    }

    /// Create an extraction-class error.
    pub fn extraction(message: impl Into<String>) -> Self {
        Self::ErrorExtraction(message.into())
    }

    /// True for errors that abort the whole invocation rather than a
    /// single explore.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Self::ApiConnection { .. }
                | Self::InvalidSelector { .. }
                | Self::NoDataTests
                | Self::Cancelled
        )
    }
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Self::ApiConnection {
            status: err.status().map(|s| s.as_u16()),
            message: err.to_string(),
        }
    }
}
