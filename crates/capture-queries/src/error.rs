//! Error types for capture-queries

use thiserror::Error;

/// Result type alias for capture operations
pub type CaptureResult<T> = Result<T, CaptureError>;

/// Error types for query capture
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Invalid session or explain configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Driver error from Postgres
    #[error("Database error: {0}")]
    Database(#[from] tokio_postgres::Error),

    /// Backend failure that did not come from the driver
    #[error("Execution error: {0}")]
    Execution(String),

    /// An intercepted statement failed and produced no result
    #[error("Statement produced no result: {sql}")]
    NoResult { sql: String },

    /// Row decode error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// More queries were captured than the session allows
    #[error("{count} not less than or equal to {limit} queries")]
    QueryLimitExceeded { count: usize, limit: usize },

    /// The session already reached its terminal state
    #[error("Capture session is closed")]
    SessionClosed,

    /// The session is already measuring
    #[error("Capture session is already active")]
    AlreadyActive,
}

impl CaptureError {
    /// Create a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create an execution error
    pub fn execution(message: impl Into<String>) -> Self {
        Self::Execution(message.into())
    }

    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Check if this is a configuration error
    pub fn is_config(&self) -> bool {
        matches!(self, Self::Config(_))
    }

    /// Check if this is a query-count assertion failure
    pub fn is_limit_exceeded(&self) -> bool {
        matches!(self, Self::QueryLimitExceeded { .. })
    }

    /// Check if this error stands in for a swallowed execution failure
    pub fn is_no_result(&self) -> bool {
        matches!(self, Self::NoResult { .. })
    }
}
