//! Error types for data operations

use thiserror::Error;

/// Data source and configuration errors
///
/// Quality-gate exclusions are not errors; they are adjustment records.
#[derive(Debug, Error)]
pub enum DataError {
    /// Backend call failed
    #[error("Data source error: {0}")]
    Source(String),

    /// No data for the requested identifier
    #[error("No {kind} data available for {identifier}")]
    NotFound { identifier: String, kind: String },

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),
}

/// Result type alias for data operations
pub type Result<T> = std::result::Result<T, DataError>;

/// Convert DataError to diligence_core::Error
impl From<DataError> for diligence_core::Error {
    fn from(err: DataError) -> Self {
        match err {
            DataError::Config(msg) => diligence_core::Error::Configuration(msg),
            other => diligence_core::Error::ExternalCall(other.to_string()),
        }
    }
}
