//! LLM provider boundary for diligence-rs
//!
//! Provider-agnostic request/response types and the [`LLMProvider`] trait.
//! Concrete backends live outside this workspace; the claim pipeline reaches
//! them through the evidence adapter in `diligence-runtime`.

pub mod completion;
pub mod error;
pub mod messages;
pub mod provider;

pub use completion::{
    CompletionRequest, CompletionRequestBuilder, CompletionResponse, StopReason, TokenUsage,
};
pub use error::{LLMError, Result};
pub use messages::{Message, Role};
pub use provider::LLMProvider;

#[cfg(test)]
pub use provider::MockLLMProvider;
