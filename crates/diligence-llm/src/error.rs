//! Error types for LLM operations

use thiserror::Error;

/// Result type for LLM operations
pub type Result<T> = std::result::Result<T, LLMError>;

/// Errors that can occur during LLM operations
#[derive(Error, Debug)]
pub enum LLMError {
    /// API request failed
    #[error("API request failed: {0}")]
    RequestFailed(String),

    #[error("Invalid API key or authentication failed")]
    AuthenticationFailed,

    #[error("Rate limit exceeded: {0}")]
    RateLimitExceeded(String),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Serialization error: {0}")]
    SerializationError(#[from] serde_json::Error),

    /// Response arrived but had no usable content
    #[error("Unexpected response format: {0}")]
    UnexpectedResponse(String),

    #[error("Provider error: {0}")]
    ProviderError(String),

    #[error("Configuration error: {0}")]
    ConfigurationError(String),
}

impl LLMError {
    /// Transient failures worth another attempt
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            LLMError::RequestFailed(_) | LLMError::RateLimitExceeded(_) | LLMError::ProviderError(_)
        )
    }
}

impl From<LLMError> for diligence_core::Error {
    fn from(err: LLMError) -> Self {
        match err {
            LLMError::ConfigurationError(msg) => diligence_core::Error::Configuration(msg),
            LLMError::AuthenticationFailed => {
                diligence_core::Error::Configuration(err.to_string())
            }
            other => diligence_core::Error::ExternalCall(other.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_conversion_to_core() {
        let core: diligence_core::Error = LLMError::RateLimitExceeded("slow down".into()).into();
        assert!(core.is_retryable());

        let core: diligence_core::Error = LLMError::AuthenticationFailed.into();
        assert!(matches!(core, diligence_core::Error::Configuration(_)));
        assert!(!core.is_retryable());
    }

    #[test]
    fn test_retryable() {
        assert!(LLMError::RequestFailed("reset".into()).is_retryable());
        assert!(!LLMError::InvalidRequest("bad".into()).is_retryable());
    }
}
