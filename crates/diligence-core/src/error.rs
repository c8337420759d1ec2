//! Error types for diligence-core

use std::any::Any;
use std::time::Duration;
use thiserror::Error;

/// Result type alias for diligence-core
pub type Result<T> = std::result::Result<T, Error>;

/// Error taxonomy shared by agents, the executor, and the orchestrator
///
/// Quality-gate rejections and numeric conflicts are deliberately absent:
/// they are recorded as data, not raised.
#[derive(Error, Debug)]
pub enum Error {
    /// A required slot is absent and could not be derived
    #[error("Missing prerequisite `{slot}` for agent {agent}")]
    MissingPrerequisite { agent: String, slot: String },

    /// A unit of work exceeded its time budget
    #[error("{operation} timed out after {after:?}")]
    Timeout { operation: String, after: Duration },

    /// An LLM, evidence, or data backend call failed
    #[error("External call failed: {0}")]
    ExternalCall(String),

    /// Unusable configuration discovered before execution
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Attempted to overwrite a slot written earlier in the run
    #[error("Slot `{0}` is already written")]
    SlotOccupied(String),

    /// Serialization of state or output failed
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Agent processing failed
    #[error("Processing failed: {0}")]
    Processing(String),
}

impl Error {
    /// Build a timeout error for the named operation
    pub fn timeout(operation: impl Into<String>, after: Duration) -> Self {
        Self::Timeout {
            operation: operation.into(),
            after,
        }
    }

    /// Turn a caught panic payload into a processing error
    pub fn from_panic(operation: &str, payload: &(dyn Any + Send)) -> Self {
        let message = payload
            .downcast_ref::<&str>()
            .map(|s| (*s).to_string())
            .or_else(|| payload.downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "non-string panic payload".to_string());
        Self::Processing(format!("{operation} panicked: {message}"))
    }

    /// Whether a retry may succeed
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::ExternalCall(_))
    }

    /// Whether this error is a timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::MissingPrerequisite {
            agent: "legal".to_string(),
            slot: "deal_value".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Missing prerequisite `deal_value` for agent legal"
        );

        let err = Error::timeout("market", Duration::from_millis(250));
        assert_eq!(err.to_string(), "market timed out after 250ms");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(Error::timeout("x", Duration::from_secs(1)).is_retryable());
        assert!(Error::ExternalCall("503".to_string()).is_retryable());
        assert!(!Error::Configuration("bad".to_string()).is_retryable());
        assert!(!Error::SlotOccupied("target".to_string()).is_retryable());
    }

    #[test]
    fn test_panic_payload_message() {
        let err = Error::from_panic("market", &"index out of bounds");
        assert_eq!(err.to_string(), "Processing failed: market panicked: index out of bounds");
        assert!(!err.is_retryable());

        let owned: Box<dyn Any + Send> = Box::new(String::from("boom"));
        let err = Error::from_panic("unit[1]", owned.as_ref());
        assert!(err.to_string().ends_with("unit[1] panicked: boom"));

        let err = Error::from_panic("unit[2]", &42_u8);
        assert!(err.to_string().contains("non-string panic payload"));
    }
}
