//! Runtime primitives shared by the orchestrator and the claim pipeline
//!
//! - [`Agent`] / [`AgentContext`]: the agent trait and the executor, caches
//!   and calculator every invocation receives
//! - [`BoundedExecutor`]: fan-out/fan-in under a concurrency cap, with a
//!   timeout and bounded retry around every unit and no fail-fast
//! - [`TtlCache`] / [`CacheLayer`]: content-addressed caches with TTL expiry,
//!   hit/miss counters and atomic get-or-compute per key
//! - [`RetryPolicy`]: exponential backoff
//! - [`EvidenceSource`]: the `query(prompt) -> text` boundary, with an adapter
//!   over any [`diligence_llm::LLMProvider`]
//! - [`CachedCalculator`]: the calculator memoised in the calculation cache

pub mod agent;
pub mod cache;
pub mod calc_cache;
pub mod evidence;
pub mod executor;
pub mod retry;

pub use agent::{Agent, AgentContext};
pub use cache::{CacheConfig, CacheLayer, CacheStats, Fingerprint, TtlCache};
pub use calc_cache::CachedCalculator;
pub use evidence::{EvidenceSource, LlmEvidenceSource};
pub use executor::{BatchReport, BoundedExecutor, ExecutorConfig, UnitOutcome};
pub use retry::RetryPolicy;
