//! Orchestrator
//!
//! Drives one run: agents execute one after another in dependency order,
//! each behind a prerequisite check and a time budget. A panicking agent is
//! recorded as failed like any other error. Once every agent is terminal the
//! claim pipeline runs exactly once over the final state.

use crate::config::DiligenceConfig;
use crate::derive::{DerivationRule, default_rules};
use crate::descriptor::{AgentDescriptor, execution_order};
use crate::report::{RunNotice, RunReport};
use diligence_calc::Calculator;
use diligence_claims::{AgentSummary, ClaimPipeline, RecordStore, SynthesisInput};
use diligence_core::{AgentStatus, Error, Result, RunState, keys};
use diligence_data::{DataKind, FinancialDataSource, QualityGate};
use diligence_runtime::{AgentContext, BoundedExecutor, CacheLayer, EvidenceSource};
use futures::FutureExt;
use std::panic::AssertUnwindSafe;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::sync::mpsc::UnboundedSender;
use tokio::time::timeout;
use tracing::{debug, info, warn};

/// Outcome of the prerequisite check for one agent
enum Readiness {
    Ready,
    Missing { slot: String, reason: String },
}

/// Where raw statements are fetched from before agents run
#[derive(Clone)]
struct FinancialsFeed {
    source: Arc<dyn FinancialDataSource>,
    identifier: String,
    kind: DataKind,
}

/// Runs registered agents and synthesizes their results
pub struct Orchestrator {
    config: DiligenceConfig,
    agents: Vec<AgentDescriptor>,
    rules: Vec<DerivationRule>,
    pipeline: ClaimPipeline,
    context: AgentContext,
    store: Option<RecordStore>,
    notices: Option<UnboundedSender<RunNotice>>,
    financials: Option<FinancialsFeed>,
}

impl Orchestrator {
    pub fn builder() -> OrchestratorBuilder {
        OrchestratorBuilder::default()
    }

    pub fn config(&self) -> &DiligenceConfig {
        &self.config
    }

    /// Agents in the order they will execute
    pub fn agents(&self) -> &[AgentDescriptor] {
        &self.agents
    }

    /// Caches shared by every run of this orchestrator
    pub fn caches(&self) -> &CacheLayer {
        self.context.caches()
    }

    /// Executor, caches and calculator handed to every agent
    pub fn context(&self) -> &AgentContext {
        &self.context
    }

    /// Execute every agent, then build and persist the consolidated record
    ///
    /// Never fails: agent errors, timeouts and missing inputs are recorded
    /// in the report and the record is produced regardless.
    pub async fn run(&self, mut state: RunState) -> RunReport {
        let run_id = state.run_id().to_string();
        info!(run_id = %run_id, agents = self.agents.len(), "run started");
        self.load_financials(&mut state).await;

        let mut notices = Vec::new();
        let mut statuses = Vec::with_capacity(self.agents.len());
        for descriptor in &self.agents {
            let summary = self.run_agent(descriptor, &mut state, &mut notices).await;
            statuses.push(summary);
        }

        let record = self
            .pipeline
            .run(SynthesisInput::new(&state, &statuses))
            .await;

        let persisted = self.persist(&record).await;

        let completed = statuses
            .iter()
            .filter(|s| s.status == AgentStatus::Completed)
            .count();
        info!(
            run_id = %run_id,
            completed,
            total = statuses.len(),
            missing_sections = record.missing_sections().len(),
            low_confidence_sections = record.low_confidence_sections().len(),
            "run finished"
        );

        RunReport {
            run_id,
            statuses,
            notices,
            state,
            record,
            persisted,
        }
    }

    async fn run_agent(
        &self,
        descriptor: &AgentDescriptor,
        state: &mut RunState,
        notices: &mut Vec<RunNotice>,
    ) -> AgentSummary {
        let name = descriptor.name();
        debug!(agent = name, status = ?AgentStatus::Pending, "checking prerequisites");

        if let Readiness::Missing { slot, reason } = self.prepare(descriptor, state, notices) {
            self.notify(
                notices,
                RunNotice::AgentSkipped {
                    agent: name.to_string(),
                    slot,
                    reason: reason.clone(),
                },
            );
            return AgentSummary {
                name: name.to_string(),
                section: descriptor.section(),
                status: AgentStatus::Skipped,
                error: Some(reason),
            };
        }

        let budget = descriptor.budget_or(self.config.default_time_budget);
        debug!(agent = name, status = ?AgentStatus::Running, ?budget, "invoking agent");

        let agent = descriptor.agent();
        let current: &RunState = state;
        let context = &self.context;
        let (result, attempts) = self
            .config
            .agent_retry
            .execute_counted(name, || async move {
                let attempt = AssertUnwindSafe(async { agent.execute(current, context).await })
                    .catch_unwind();
                match timeout(budget, attempt).await {
                    Ok(Ok(result)) => result,
                    Ok(Err(payload)) => Err(Error::from_panic(name, payload.as_ref())),
                    Err(_) => Err(Error::timeout(name, budget)),
                }
            })
            .await;

        let outcome = result.and_then(|output| state.record_output(name, output));
        match outcome {
            Ok(slot) => {
                info!(agent = name, slot = %slot, attempts, "agent completed");
                AgentSummary::completed(name, descriptor.section())
            }
            Err(e) => {
                let timed_out = e.is_timeout();
                self.notify(
                    notices,
                    RunNotice::AgentFailed {
                        agent: name.to_string(),
                        error: e.to_string(),
                        timed_out,
                    },
                );
                AgentSummary {
                    name: name.to_string(),
                    section: descriptor.section(),
                    status: AgentStatus::Failed,
                    error: Some(e.to_string()),
                }
            }
        }
    }

    /// Check required slots, deriving the missing ones where a rule can
    fn prepare(
        &self,
        descriptor: &AgentDescriptor,
        state: &mut RunState,
        notices: &mut Vec<RunNotice>,
    ) -> Readiness {
        for slot in descriptor.required_slots() {
            if state.contains(slot) {
                continue;
            }

            let derived = self
                .rules
                .iter()
                .filter(|rule| &rule.target == slot)
                .find_map(|rule| rule.derive(state).map(|value| (rule, value)));

            let Some((rule, value)) = derived else {
                let error = Error::MissingPrerequisite {
                    agent: descriptor.name().to_string(),
                    slot: slot.clone(),
                };
                return Readiness::Missing {
                    slot: slot.clone(),
                    reason: format!("{error}; no derivation rule could supply it"),
                };
            };

            if let Err(e) = state.write_derived(
                slot.clone(),
                value.clone(),
                rule.name.clone(),
                rule.sources.clone(),
            ) {
                return Readiness::Missing {
                    slot: slot.clone(),
                    reason: format!("derived value for `{slot}` could not be written: {e}"),
                };
            }
            self.notify(
                notices,
                RunNotice::DefaultSubstituted {
                    agent: descriptor.name().to_string(),
                    slot: slot.clone(),
                    rule: rule.name.clone(),
                    value,
                },
            );
        }
        Readiness::Ready
    }

    /// Fetch raw statements into the run unless the caller supplied them
    async fn load_financials(&self, state: &mut RunState) {
        let Some(feed) = &self.financials else {
            return;
        };
        if state.contains(keys::FINANCIALS) {
            debug!("financial statements supplied by caller, feed not queried");
            return;
        }

        let periods = match feed.source.fetch(&feed.identifier, feed.kind).await {
            Ok(periods) => periods,
            Err(e) => {
                warn!(
                    source = feed.source.name(),
                    identifier = %feed.identifier,
                    error = %e,
                    "financial statements unavailable"
                );
                return;
            }
        };
        let count = periods.len();
        let written = serde_json::to_value(periods)
            .map_err(Error::from)
            .and_then(|value| state.insert_input(keys::FINANCIALS, value));
        match written {
            Ok(()) => info!(
                source = feed.source.name(),
                identifier = %feed.identifier,
                kind = %feed.kind,
                periods = count,
                "financial statements loaded"
            ),
            Err(e) => warn!(error = %e, "financial statements could not be stored"),
        }
    }

    fn notify(&self, notices: &mut Vec<RunNotice>, notice: RunNotice) {
        match &notice {
            RunNotice::DefaultSubstituted { .. } => info!(notice = %notice, "default substituted"),
            RunNotice::AgentSkipped { .. } => warn!(notice = %notice, "agent skipped"),
            RunNotice::AgentFailed { timed_out, .. } => {
                warn!(notice = %notice, timed_out, "agent failed")
            }
        }
        if let Some(sender) = &self.notices {
            // A dropped receiver only means nobody is listening
            let _ = sender.send(notice.clone());
        }
        notices.push(notice);
    }

    async fn persist(&self, record: &diligence_claims::ConsolidatedRecord) -> Option<PathBuf> {
        let store = self.store.as_ref()?;
        match store.persist(record).await {
            Ok(outcome) => Some(outcome.path().to_path_buf()),
            Err(e) => {
                warn!(run_id = %record.run_id, error = %e, "failed to persist consolidated record");
                None
            }
        }
    }
}

/// Builder for [`Orchestrator`]
#[derive(Default)]
pub struct OrchestratorBuilder {
    config: Option<DiligenceConfig>,
    agents: Vec<AgentDescriptor>,
    rules: Option<Vec<DerivationRule>>,
    evidence: Option<Arc<dyn EvidenceSource>>,
    store: Option<RecordStore>,
    notices: Option<UnboundedSender<RunNotice>>,
    financials: Option<FinancialsFeed>,
}

impl OrchestratorBuilder {
    pub fn config(mut self, config: DiligenceConfig) -> Self {
        self.config = Some(config);
        self
    }

    /// Register an agent; registration order breaks ordering ties
    pub fn agent(mut self, descriptor: AgentDescriptor) -> Self {
        self.agents.push(descriptor);
        self
    }

    /// Add a derivation rule on top of the defaults
    pub fn rule(mut self, rule: DerivationRule) -> Self {
        self.rules.get_or_insert_with(default_rules).push(rule);
        self
    }

    /// Replace the derivation rules entirely
    pub fn rules(mut self, rules: Vec<DerivationRule>) -> Self {
        self.rules = Some(rules);
        self
    }

    /// Backend used to verify claims (required)
    pub fn evidence(mut self, source: Arc<dyn EvidenceSource>) -> Self {
        self.evidence = Some(source);
        self
    }

    /// Persist records here instead of the configured `record_dir`
    pub fn store(mut self, store: RecordStore) -> Self {
        self.store = Some(store);
        self
    }

    /// Forward every notice to a channel as it happens
    pub fn notices(mut self, sender: UnboundedSender<RunNotice>) -> Self {
        self.notices = Some(sender);
        self
    }

    /// Fetch raw statements for `identifier` at the start of every run
    pub fn financials(
        mut self,
        source: Arc<dyn FinancialDataSource>,
        identifier: impl Into<String>,
        kind: DataKind,
    ) -> Self {
        self.financials = Some(FinancialsFeed {
            source,
            identifier: identifier.into(),
            kind,
        });
        self
    }

    /// Validate the configuration and agent graph before anything runs
    pub fn build(self) -> Result<Orchestrator> {
        let config = self.config.unwrap_or_default();
        config.validate()?;

        let evidence = self.evidence.ok_or_else(|| {
            Error::Configuration("an evidence source is required to verify claims".to_string())
        })?;
        let rules = self.rules.unwrap_or_else(default_rules);
        let agents = execution_order(self.agents, &rules)?;

        let executor = BoundedExecutor::new(config.executor.clone())?;
        let caches = CacheLayer::new(&config.cache);
        let calculator = Calculator::new(config.calculator.clone())?;
        let gate = QualityGate::new(config.quality.clone())?;
        let context = AgentContext::new(executor.clone(), caches.clone(), calculator.clone());
        let pipeline = ClaimPipeline::new(
            config.claims.clone(),
            evidence,
            executor,
            &caches,
            calculator,
            gate,
        )?;

        let store = self
            .store
            .or_else(|| config.record_dir.clone().map(RecordStore::new));

        debug!(
            order = ?agents.iter().map(AgentDescriptor::name).collect::<Vec<_>>(),
            rules = rules.len(),
            "orchestrator built"
        );

        Ok(Orchestrator {
            config,
            agents,
            rules,
            pipeline,
            context,
            store,
            notices: self.notices,
            financials: self.financials,
        })
    }
}
