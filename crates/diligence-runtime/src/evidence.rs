//! Evidence backend boundary

use async_trait::async_trait;
use diligence_core::Result;
use diligence_llm::{CompletionRequest, LLMProvider, Message};
use std::sync::Arc;
use tracing::debug;

/// An external source that answers verification prompts with text
///
/// Callers supply their own timeout; implementations must not assume any
/// particular latency.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait EvidenceSource: Send + Sync {
    async fn query(&self, prompt: &str) -> Result<String>;

    /// Identifier mixed into verification cache keys
    fn name(&self) -> &str;
}

const DEFAULT_SYSTEM_PROMPT: &str = "You are a due-diligence fact checker. Judge each numbered claim \
against public filings and reputable sources. Reply with JSON only.";

/// [`EvidenceSource`] backed by an LLM provider
pub struct LlmEvidenceSource {
    provider: Arc<dyn LLMProvider>,
    model: String,
    system: String,
    max_tokens: usize,
    name: String,
}

impl LlmEvidenceSource {
    pub fn new(provider: Arc<dyn LLMProvider>, model: impl Into<String>) -> Self {
        let model = model.into();
        let name = format!("{}:{model}", provider.name());
        Self {
            provider,
            model,
            system: DEFAULT_SYSTEM_PROMPT.to_string(),
            max_tokens: 2048,
            name,
        }
    }

    pub fn with_system(mut self, system: impl Into<String>) -> Self {
        self.system = system.into();
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: usize) -> Self {
        self.max_tokens = max_tokens;
        self
    }
}

#[async_trait]
impl EvidenceSource for LlmEvidenceSource {
    async fn query(&self, prompt: &str) -> Result<String> {
        let request = CompletionRequest::builder(&self.model)
            .system(&self.system)
            .add_message(Message::user(prompt))
            .max_tokens(self.max_tokens)
            .temperature(0.0)
            .build();

        let response = self.provider.complete(request).await?;
        debug!(
            source = %self.name,
            input_tokens = response.usage.input_tokens,
            output_tokens = response.usage.output_tokens,
            "evidence query answered"
        );
        Ok(response.into_text()?)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use diligence_llm::{CompletionResponse, LLMError};
    use std::sync::Mutex;

    struct RecordingProvider {
        reply: std::result::Result<String, String>,
        seen: Mutex<Vec<CompletionRequest>>,
    }

    #[async_trait]
    impl LLMProvider for RecordingProvider {
        async fn complete(
            &self,
            request: CompletionRequest,
        ) -> diligence_llm::Result<CompletionResponse> {
            self.seen.lock().unwrap().push(request);
            match &self.reply {
                Ok(text) => Ok(CompletionResponse::text(text.clone())),
                Err(msg) => Err(LLMError::RequestFailed(msg.clone())),
            }
        }

        fn name(&self) -> &str {
            "recording"
        }
    }

    #[tokio::test]
    async fn test_query_builds_deterministic_request() {
        let provider = Arc::new(RecordingProvider {
            reply: Ok("[]".to_string()),
            seen: Mutex::new(Vec::new()),
        });
        let source = LlmEvidenceSource::new(provider.clone(), "checker-1").with_max_tokens(512);

        assert_eq!(source.name(), "recording:checker-1");
        assert_eq!(source.query("claim list").await.unwrap(), "[]");

        let seen = provider.seen.lock().unwrap();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].temperature, Some(0.0));
        assert_eq!(seen[0].max_tokens, 512);
        assert_eq!(seen[0].messages[0].text(), "claim list");
    }

    #[tokio::test]
    async fn test_provider_failure_is_retryable() {
        let provider = Arc::new(RecordingProvider {
            reply: Err("503".to_string()),
            seen: Mutex::new(Vec::new()),
        });
        let source = LlmEvidenceSource::new(provider, "checker-1");

        let err = source.query("claim list").await.unwrap_err();
        assert!(err.is_retryable());
    }

    #[tokio::test]
    async fn test_mock_source() {
        let mut mock = MockEvidenceSource::new();
        mock.expect_query()
            .times(1)
            .returning(|prompt| Ok(format!("echo: {prompt}")));
        mock.expect_name().return_const("mock".to_string());

        assert_eq!(mock.query("x").await.unwrap(), "echo: x");
        assert_eq!(mock.name(), "mock");
    }
}
