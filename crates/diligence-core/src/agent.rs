//! Agent lifecycle and result envelope
//!
//! The `Agent` trait itself lives in `diligence-runtime`, next to the
//! execution context it receives.

use crate::AgentOutput;
use serde::{Deserialize, Serialize};

/// Lifecycle of an agent within one run
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    Pending,
    Running,
    Completed,
    Skipped,
    Failed,
}

impl AgentStatus {
    /// Completed, skipped, and failed are terminal
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed | Self::Skipped | Self::Failed)
    }
}

/// Envelope around one agent invocation: `{status, data, error?}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentResult {
    pub status: AgentStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<AgentOutput>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AgentResult {
    pub fn completed(data: AgentOutput) -> Self {
        Self {
            status: AgentStatus::Completed,
            data: Some(data),
            error: None,
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            status: AgentStatus::Skipped,
            data: None,
            error: Some(reason.into()),
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            status: AgentStatus::Failed,
            data: None,
            error: Some(error.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_terminal_states() {
        assert!(!AgentStatus::Pending.is_terminal());
        assert!(!AgentStatus::Running.is_terminal());
        assert!(AgentStatus::Completed.is_terminal());
        assert!(AgentStatus::Skipped.is_terminal());
        assert!(AgentStatus::Failed.is_terminal());
    }

    #[test]
    fn test_result_envelope_serialization() {
        let result = AgentResult::skipped("missing deal_value");
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["status"], "skipped");
        assert_eq!(json["error"], "missing deal_value");
        assert!(json.get("data").is_none());
    }
}
