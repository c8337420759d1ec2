//! Orchestration of a diligence run
//!
//! Agents are registered with an [`AgentDescriptor`] that names the slots
//! they need. The [`Orchestrator`] sorts them by those dependencies, checks
//! each one's prerequisites before invoking it, derives missing inputs from
//! earlier results through [`DerivationRule`]s and hands the final state to
//! the claim pipeline. Every agent receives the same
//! [`AgentContext`](diligence_runtime::AgentContext), so its external calls
//! share the executor and caches the claim pipeline uses.
//!
//! # Example
//!
//! ```no_run
//! use diligence_core::{RunState, SectionKind, keys};
//! use diligence_workflow::{AgentDescriptor, DiligenceConfig, Orchestrator};
//! # use std::sync::Arc;
//! # async fn example(
//! #     financial: Arc<dyn diligence_runtime::Agent>,
//! #     legal: Arc<dyn diligence_runtime::Agent>,
//! #     evidence: Arc<dyn diligence_runtime::EvidenceSource>,
//! # ) -> diligence_core::Result<()> {
//! let orchestrator = Orchestrator::builder()
//!     .config(DiligenceConfig::from_env())
//!     .evidence(evidence)
//!     .agent(AgentDescriptor::new(SectionKind::Financial, financial))
//!     .agent(AgentDescriptor::new(SectionKind::Legal, legal).requires(keys::DEAL_VALUE))
//!     .build()?;
//!
//! let report = orchestrator.run(RunState::new("run-1")?).await;
//! for notice in &report.notices {
//!     println!("{notice}");
//! }
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod derive;
pub mod descriptor;
pub mod orchestrator;
pub mod report;

pub use config::{DiligenceConfig, DiligenceConfigBuilder};
pub use derive::{DerivationRule, deal_value_from, default_rules};
pub use descriptor::{AgentDescriptor, DEFAULT_TIME_BUDGET, execution_order};
pub use orchestrator::{Orchestrator, OrchestratorBuilder};
pub use report::{RunNotice, RunReport};
