//! Run notices and the final run report

use diligence_claims::{AgentSummary, ConsolidatedRecord};
use diligence_core::{AgentStatus, RunState};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;

/// Event the caller is told about while a run progresses
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RunNotice {
    /// A missing prerequisite was filled by a derivation rule
    DefaultSubstituted {
        agent: String,
        slot: String,
        rule: String,
        value: serde_json::Value,
    },
    AgentSkipped {
        agent: String,
        slot: String,
        reason: String,
    },
    AgentFailed {
        agent: String,
        error: String,
        timed_out: bool,
    },
}

impl fmt::Display for RunNotice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunNotice::DefaultSubstituted {
                agent,
                slot,
                rule,
                value,
            } => write!(f, "{agent}: `{slot}` auto-derived as {value} by {rule}"),
            RunNotice::AgentSkipped { agent, reason, .. } => write!(f, "{agent} skipped: {reason}"),
            RunNotice::AgentFailed { agent, error, .. } => write!(f, "{agent} failed: {error}"),
        }
    }
}

/// Everything a run produced
#[derive(Debug, Clone)]
pub struct RunReport {
    pub run_id: String,
    /// Agent outcomes in execution order
    pub statuses: Vec<AgentSummary>,
    pub notices: Vec<RunNotice>,
    pub state: RunState,
    pub record: ConsolidatedRecord,
    /// Where the record was persisted, when a store is configured
    pub persisted: Option<PathBuf>,
}

impl RunReport {
    pub fn status_of(&self, agent: &str) -> Option<AgentStatus> {
        self.statuses
            .iter()
            .find(|s| s.name == agent)
            .map(|s| s.status)
    }

    pub fn count(&self, status: AgentStatus) -> usize {
        self.statuses.iter().filter(|s| s.status == status).count()
    }

    /// Whether every agent completed
    pub fn is_clean(&self) -> bool {
        self.count(AgentStatus::Completed) == self.statuses.len()
    }
}
