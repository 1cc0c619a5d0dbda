//! Data provider error types
//!
//! Errors raised by a backend while validating or executing a compiled query,
//! and while loading datasets into the in-memory provider.

use thiserror::Error;

/// Errors that can occur in a data provider
#[derive(Error, Debug)]
pub enum ProviderError {
    /// The queried datatype is not known to the backend
    #[error("Unknown datatype: {0}")]
    UnknownDatatype(String),

    /// A criteria or retrieval path does not exist for the datatype
    #[error("Unknown path: {0}")]
    UnknownPath(String),

    /// An operator or operand the backend cannot evaluate
    #[error("Invalid criteria: {0}")]
    InvalidCriteria(String),

    /// A result row could not be post-processed
    #[error("Malformed row: {0}")]
    MalformedRow(String),

    /// Dataset content is not usable
    #[error("Dataset error: {0}")]
    Dataset(String),

    /// I/O operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON dataset could not be decoded
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV dataset could not be decoded
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),
}

/// Result type alias for provider operations
pub type ProviderResult<T> = Result<T, ProviderError>;
