//! Shared run state
//!
//! The `RunState` is a slot store keyed by name. It is owned by the
//! orchestrator and passed by reference to each agent; only the orchestrator
//! writes to it, and only between agent invocations.
//!
//! A slot, once written, is never overwritten. Corrections are appended as
//! new annotated slots so readers can always tell a user-supplied or
//! agent-computed original from an auto-derived value.

use crate::{AgentOutput, Error, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Well-known slot keys
pub mod keys {
    /// Identity of the company under review
    pub const TARGET: &str = "target";
    /// Negotiated deal terms
    pub const DEAL_TERMS: &str = "deal_terms";
    /// Headline deal value
    pub const DEAL_VALUE: &str = "deal_value";
    /// Caller-supplied per-period statements, a JSON array
    pub const FINANCIALS: &str = "financial_statements";
    /// Prefix of per-agent result slots
    pub const AGENT_PREFIX: &str = "agent:";
    /// Separator between a slot key and its correction suffix
    pub const DERIVED_SEPARATOR: &str = "@derived.";

    /// Slot key holding the named agent's result
    pub fn agent_result(agent: &str) -> String {
        format!("{AGENT_PREFIX}{agent}")
    }
}

/// Where a slot's value came from
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Provenance {
    /// Provided by the caller before the run
    UserSupplied,
    /// Computed by the named agent
    Agent { name: String },
    /// Computed by the orchestrator from other slots
    AutoDerived { rule: String, sources: Vec<String> },
}

impl Provenance {
    pub fn is_derived(&self) -> bool {
        matches!(self, Provenance::AutoDerived { .. })
    }
}

/// Value held by a slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum SlotValue {
    /// Free-form input or derived value
    Value(serde_json::Value),
    /// An agent's typed result
    Output(AgentOutput),
}

impl SlotValue {
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            SlotValue::Value(value) => Some(value),
            SlotValue::Output(_) => None,
        }
    }

    pub fn as_output(&self) -> Option<&AgentOutput> {
        match self {
            SlotValue::Output(output) => Some(output),
            SlotValue::Value(_) => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        self.as_json().and_then(serde_json::Value::as_f64)
    }
}

/// One written slot
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Slot {
    pub value: SlotValue,
    pub provenance: Provenance,
    pub written_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub note: Option<String>,
}

/// Shared, append-only state of one run
///
/// # Example
///
/// ```
/// use diligence_core::{RunState, keys};
///
/// let mut state = RunState::new("run-42").unwrap();
/// state.insert_input(keys::TARGET, serde_json::json!("Acme Corp")).unwrap();
///
/// assert!(state.contains(keys::TARGET));
/// assert!(state.insert_input(keys::TARGET, serde_json::json!("Other")).is_err());
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunState {
    run_id: String,
    slots: BTreeMap<String, Slot>,
}

impl RunState {
    /// Create an empty state for the given run identifier
    ///
    /// The identifier keys the persisted record, so it must be non-empty and
    /// limited to ASCII alphanumerics, `-`, `_` and `.`.
    pub fn new(run_id: impl Into<String>) -> Result<Self> {
        let run_id = run_id.into();
        let usable = !run_id.is_empty()
            && !run_id.starts_with('.')
            && run_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !usable {
            return Err(Error::Configuration(format!(
                "unusable run identifier: {run_id:?}"
            )));
        }

        Ok(Self {
            run_id,
            slots: BTreeMap::new(),
        })
    }

    /// Create an empty state under a fresh `run-<uuid>` identifier
    pub fn generate() -> Self {
        Self {
            run_id: format!("run-{}", uuid::Uuid::new_v4()),
            slots: BTreeMap::new(),
        }
    }

    pub fn run_id(&self) -> &str {
        &self.run_id
    }

    // =========== Writes ===========

    /// Record a user-supplied input
    pub fn insert_input(&mut self, key: impl Into<String>, value: serde_json::Value) -> Result<()> {
        self.write(key.into(), SlotValue::Value(value), Provenance::UserSupplied, None)
    }

    /// Builder form of [`insert_input`](Self::insert_input)
    pub fn with_input(mut self, key: impl Into<String>, value: serde_json::Value) -> Result<Self> {
        self.insert_input(key, value)?;
        Ok(self)
    }

    /// Record an agent's result under its result slot
    pub fn record_output(&mut self, agent: &str, output: AgentOutput) -> Result<String> {
        let key = keys::agent_result(agent);
        self.write(
            key.clone(),
            SlotValue::Output(output),
            Provenance::Agent {
                name: agent.to_string(),
            },
            None,
        )?;
        Ok(key)
    }

    /// Fill a missing slot with a value computed from other slots
    pub fn write_derived(
        &mut self,
        key: impl Into<String>,
        value: serde_json::Value,
        rule: impl Into<String>,
        sources: Vec<String>,
    ) -> Result<()> {
        let rule = rule.into();
        let note = format!("auto-derived by {rule}");
        self.write(
            key.into(),
            SlotValue::Value(value),
            Provenance::AutoDerived { rule, sources },
            Some(note),
        )
    }

    /// Append a correction for an existing slot without touching the original
    ///
    /// Returns the key of the new annotated slot.
    pub fn append_correction(
        &mut self,
        key: &str,
        value: serde_json::Value,
        note: impl Into<String>,
    ) -> Result<String> {
        if !self.slots.contains_key(key) {
            return Err(Error::Processing(format!(
                "cannot correct unwritten slot `{key}`"
            )));
        }

        let next = self.corrections_of(key).len() + 1;
        let corrected_key = format!("{key}{}{next}", keys::DERIVED_SEPARATOR);
        self.write(
            corrected_key.clone(),
            SlotValue::Value(value),
            Provenance::AutoDerived {
                rule: "correction".to_string(),
                sources: vec![key.to_string()],
            },
            Some(note.into()),
        )?;
        Ok(corrected_key)
    }

    fn write(
        &mut self,
        key: String,
        value: SlotValue,
        provenance: Provenance,
        note: Option<String>,
    ) -> Result<()> {
        if self.slots.contains_key(&key) {
            return Err(Error::SlotOccupied(key));
        }

        tracing::debug!(slot = %key, provenance = ?provenance, "slot written");
        self.slots.insert(
            key,
            Slot {
                value,
                provenance,
                written_at: Utc::now(),
                note,
            },
        );
        Ok(())
    }

    // =========== Reads ===========

    /// Get the original slot
    pub fn get(&self, key: &str) -> Option<&Slot> {
        self.slots.get(key)
    }

    /// Get the latest correction of a slot, or the original when uncorrected
    pub fn resolve(&self, key: &str) -> Option<&Slot> {
        self.corrections_of(key)
            .last()
            .map(|(_, slot)| *slot)
            .or_else(|| self.slots.get(key))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.slots.contains_key(key)
    }

    /// Numeric value of a slot, following corrections
    pub fn value_f64(&self, key: &str) -> Option<f64> {
        self.resolve(key).and_then(|slot| slot.value.as_f64())
    }

    /// The named agent's recorded output
    pub fn agent_output(&self, agent: &str) -> Option<&AgentOutput> {
        self.slots
            .get(&keys::agent_result(agent))
            .and_then(|slot| slot.value.as_output())
    }

    /// All recorded agent outputs, ordered by agent name
    pub fn outputs(&self) -> impl Iterator<Item = (&str, &AgentOutput)> {
        self.slots.iter().filter_map(|(key, slot)| {
            let agent = key.strip_prefix(keys::AGENT_PREFIX)?;
            slot.value.as_output().map(|output| (agent, output))
        })
    }

    pub fn slots(&self) -> impl Iterator<Item = (&str, &Slot)> {
        self.slots.iter().map(|(key, slot)| (key.as_str(), slot))
    }

    pub fn len(&self) -> usize {
        self.slots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    fn corrections_of(&self, key: &str) -> Vec<(&String, &Slot)> {
        let prefix = format!("{key}{}", keys::DERIVED_SEPARATOR);
        let mut corrections: Vec<(u32, (&String, &Slot))> = self
            .slots
            .iter()
            .filter_map(|(k, slot)| {
                let n = k.strip_prefix(&prefix)?.parse::<u32>().ok()?;
                Some((n, (k, slot)))
            })
            .collect();
        corrections.sort_by_key(|(n, _)| *n);
        corrections.into_iter().map(|(_, entry)| entry).collect()
    }
}
