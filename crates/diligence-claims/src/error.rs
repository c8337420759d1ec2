//! Error types for the claim pipeline

use thiserror::Error;

/// Result type alias for claim operations
pub type Result<T> = std::result::Result<T, ClaimError>;

/// Errors raised outside the per-claim boundary
///
/// Individual claim failures never surface here; they end up in the ledger
/// as low-confidence fates.
#[derive(Debug, Error)]
pub enum ClaimError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid keyword pattern: {0}")]
    Pattern(#[from] regex::Error),

    #[error("Record store I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("No consolidated record stored for run '{0}'")]
    RecordNotFound(String),
}

impl From<ClaimError> for diligence_core::Error {
    fn from(err: ClaimError) -> Self {
        match err {
            ClaimError::Config(msg) => diligence_core::Error::Configuration(msg),
            ClaimError::Pattern(e) => diligence_core::Error::Configuration(e.to_string()),
            ClaimError::Json(e) => diligence_core::Error::Serialization(e),
            other => diligence_core::Error::Processing(other.to_string()),
        }
    }
}
