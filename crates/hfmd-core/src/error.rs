//! Error types for hfmd core

use thiserror::Error;

/// Errors that can occur in hfmd core
#[derive(Debug, Error)]
pub enum HfmdError {
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Connection error while reading body: {0}")]
    Body(std::io::Error),

    #[error("Server did not report a Content-Length for {0}")]
    MissingContentLength(String),

    #[error("Received {received} bytes but the server declared {expected}")]
    LengthMismatch { expected: u64, received: u64 },

    #[error("Resumed from byte {expected} but the server sent range {received}")]
    UnexpectedRange { expected: u64, received: String },

    #[error("Server error: {status} for {url}")]
    Status { status: u16, url: String },

    #[error("Refusing unsafe destination path: {0}")]
    UnsafePath(String),

    #[error("Another selected file already targets {0}")]
    DuplicatePath(String),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Transfer was cancelled")]
    Cancelled,
}

impl HfmdError {
    /// Errors that leave nothing to retry on this host (bad input, bad config)
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            HfmdError::UnsafePath(_)
                | HfmdError::DuplicatePath(_)
                | HfmdError::InvalidUrl(_)
                | HfmdError::Config(_)
        ) || matches!(self, HfmdError::Status { status, .. } if (400..500).contains(status) && *status != 429)
    }
}

impl From<serde_json::Error> for HfmdError {
    fn from(error: serde_json::Error) -> Self {
        HfmdError::Serialization(error.to_string())
    }
}

impl From<url::ParseError> for HfmdError {
    fn from(error: url::ParseError) -> Self {
        HfmdError::InvalidUrl(error.to_string())
    }
}
