//! Agent trait and the shared execution context handed to every invocation

use crate::cache::CacheLayer;
use crate::calc_cache::CachedCalculator;
use crate::executor::BoundedExecutor;
use async_trait::async_trait;
use diligence_calc::Calculator;
use diligence_core::{AgentOutput, Result, RunState};

/// Core trait that all pipeline agents must implement
///
/// Agents read the shared [`RunState`] but never write to it; the
/// orchestrator records the returned output between invocations. An agent
/// may be invoked again after a failure, so `execute` must be safe to repeat.
#[async_trait]
pub trait Agent: Send + Sync {
    /// Produce this agent's partial result from the current run state
    ///
    /// External calls should fan out through `ctx.executor()` so they share
    /// the run's concurrency cap and rate limit.
    async fn execute(&self, state: &RunState, ctx: &AgentContext) -> Result<AgentOutput>;

    /// Get the agent's name
    fn name(&self) -> &str;
}

/// Executor, caches and calculator shared by every agent of a run
///
/// Clones share the same semaphore and cache storage.
#[derive(Clone)]
pub struct AgentContext {
    executor: BoundedExecutor,
    caches: CacheLayer,
    calculator: CachedCalculator,
}

impl AgentContext {
    pub fn new(executor: BoundedExecutor, caches: CacheLayer, calculator: Calculator) -> Self {
        let calculator = CachedCalculator::new(calculator, caches.calculation.clone());
        Self {
            executor,
            caches,
            calculator,
        }
    }

    pub fn executor(&self) -> &BoundedExecutor {
        &self.executor
    }

    pub fn caches(&self) -> &CacheLayer {
        &self.caches
    }

    /// Calculator memoised in the shared calculation cache
    pub fn calculator(&self) -> &CachedCalculator {
        &self.calculator
    }
}

impl std::fmt::Debug for AgentContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AgentContext")
            .field("executor", &self.executor)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::ExecutorConfig;
    use crate::retry::RetryPolicy;
    use diligence_core::{GeneralOutput, MarketOutput};
    use std::time::Duration;

    struct EchoAgent;

    #[async_trait]
    impl Agent for EchoAgent {
        async fn execute(&self, state: &RunState, _ctx: &AgentContext) -> Result<AgentOutput> {
            Ok(AgentOutput::General(GeneralOutput {
                summary: Some(format!("run {}", state.run_id())),
                ..Default::default()
            }))
        }

        fn name(&self) -> &str {
            "echo"
        }
    }

    /// Sizes a market by querying several regions through the shared executor
    struct RegionalMarketAgent {
        regions: Vec<(&'static str, f64)>,
    }

    #[async_trait]
    impl Agent for RegionalMarketAgent {
        async fn execute(&self, _state: &RunState, ctx: &AgentContext) -> Result<AgentOutput> {
            let units: Vec<_> = self
                .regions
                .iter()
                .map(|&(region, size)| {
                    move || async move {
                        if region == "apac" {
                            Err(diligence_core::Error::ExternalCall("apac feed down".into()))
                        } else {
                            Ok(size)
                        }
                    }
                })
                .collect();
            let report = ctx.executor().run_all("market-regions", units).await;
            let total: f64 = report
                .outcomes()
                .iter()
                .filter_map(|o| o.result.as_ref().ok())
                .sum();
            Ok(AgentOutput::Market(MarketOutput {
                market_size: Some(total),
                ..Default::default()
            }))
        }

        fn name(&self) -> &str {
            "market"
        }
    }

    fn context() -> AgentContext {
        let executor = BoundedExecutor::new(ExecutorConfig {
            max_concurrency: 2,
            unit_timeout: Duration::from_secs(1),
            retry: RetryPolicy::no_retry(),
            rate_limit_per_second: None,
        })
        .unwrap();
        AgentContext::new(executor, CacheLayer::default(), Calculator::default())
    }

    #[tokio::test]
    async fn test_agent_reads_state() {
        let state = RunState::new("run-1").unwrap();
        let output = tokio_test::assert_ok!(EchoAgent.execute(&state, &context()).await);
        match output {
            AgentOutput::General(general) => {
                assert_eq!(general.summary.as_deref(), Some("run run-1"));
            }
            other => panic!("unexpected output: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_agent_fans_out_through_executor() {
        let agent = RegionalMarketAgent {
            regions: vec![("emea", 1_200.0), ("apac", 900.0), ("americas", 2_000.0)],
        };
        let state = RunState::new("run-fan-out").unwrap();
        let output = agent.execute(&state, &context()).await.unwrap();
        match output {
            AgentOutput::Market(market) => assert_eq!(market.market_size, Some(3_200.0)),
            other => panic!("unexpected output: {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_context_calculator_uses_shared_cache() {
        let ctx = context();
        let first = ctx.calculator().cagr(80.0, 100.0, 2.0).await.unwrap();
        let second = ctx.clone().calculator().cagr(80.0, 100.0, 2.0).await.unwrap();
        assert_eq!(first.result, second.result);
        assert_eq!(ctx.caches().calculation.stats().await.hits, 1);
    }
}
