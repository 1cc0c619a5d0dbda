//! Query error types
//!
//! Defines all error conditions that can occur while parsing, compiling,
//! planning and executing a search.

use crate::provider::ProviderError;
use thiserror::Error;

/// Errors that can occur during query operations
#[derive(Error, Debug)]
pub enum QueryError {
    /// Malformed query text; carries the fragment that could not be parsed
    #[error("Syntax error near '{0}'")]
    Syntax(String),

    /// Well-formed request the search cannot honour
    #[error("Validation error: {0}")]
    Validation(String),

    /// Field name unknown to the searched datatype
    #[error("Unknown path: {0}")]
    UnknownPath(String),

    /// Backend failure, propagated as is
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
}

/// Result type for query operations
pub type QueryResult<T> = Result<T, QueryError>;
