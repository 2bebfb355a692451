//! Error types for ratebook

use thiserror::Error;

/// Main error type for ratebook operations
///
/// "No rate found" is deliberately absent: the resolver reports missing
/// rates as [`crate::resolver::Resolution::NotFound`], a normal return
/// value callers must branch on, never an error.
#[derive(Error, Debug)]
pub enum RateError {
    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Unknown currency: {0}")]
    UnknownCurrency(String),

    #[error("Storage error: {0}")]
    Storage(String),

    #[error("Upstream feed error: {0}")]
    UpstreamFeed(String),

    #[error("Parse error: {0}")]
    Parse(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),
}

impl From<rusqlite::Error> for RateError {
    fn from(e: rusqlite::Error) -> Self {
        RateError::Storage(e.to_string())
    }
}

impl From<csv::Error> for RateError {
    fn from(e: csv::Error) -> Self {
        RateError::Parse(e.to_string())
    }
}

/// Result type alias for ratebook operations
pub type Result<T> = std::result::Result<T, RateError>;
