//! Error types for the calproxy core.

use thiserror::Error;

/// Errors surfaced by the core engine.
#[derive(Error, Debug)]
pub enum CalProxyError {
    #[error("Upstream feed is not an iCalendar document: {0}")]
    UpstreamInvalid(String),

    #[error("State store error: {0}")]
    Store(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Result type alias for calproxy operations.
pub type CalProxyResult<T> = Result<T, CalProxyError>;
