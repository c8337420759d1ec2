//! Agent descriptors and execution ordering

use crate::derive::DerivationRule;
use diligence_core::{Error, Result, SectionKind, keys};
use diligence_runtime::Agent;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Time budget of an agent that does not declare one
pub const DEFAULT_TIME_BUDGET: Duration = Duration::from_secs(120);

/// Static metadata of one agent
///
/// The orchestrator reads `requires` before invoking the agent; the agent
/// itself never checks for missing inputs.
#[derive(Clone)]
pub struct AgentDescriptor {
    name: String,
    section: SectionKind,
    requires: Vec<String>,
    time_budget: Option<Duration>,
    agent: Arc<dyn Agent>,
}

impl AgentDescriptor {
    /// Describe an agent under its own name
    pub fn new(section: SectionKind, agent: Arc<dyn Agent>) -> Self {
        Self {
            name: agent.name().to_string(),
            section,
            requires: Vec::new(),
            time_budget: None,
            agent,
        }
    }

    /// Require a slot of the run state
    pub fn requires(mut self, slot: impl Into<String>) -> Self {
        self.requires.push(slot.into());
        self
    }

    /// Require another agent's result
    pub fn after(self, agent: &str) -> Self {
        self.requires(keys::agent_result(agent))
    }

    pub fn time_budget(mut self, budget: Duration) -> Self {
        self.time_budget = Some(budget);
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn section(&self) -> SectionKind {
        self.section
    }

    pub fn required_slots(&self) -> &[String] {
        &self.requires
    }

    /// Declared budget, or `fallback` when none was set
    pub fn budget_or(&self, fallback: Duration) -> Duration {
        self.time_budget.unwrap_or(fallback)
    }

    pub fn agent(&self) -> &Arc<dyn Agent> {
        &self.agent
    }

    /// Slot this agent's result is written to
    pub fn result_slot(&self) -> String {
        keys::agent_result(&self.name)
    }
}

impl fmt::Debug for AgentDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AgentDescriptor")
            .field("name", &self.name)
            .field("section", &self.section)
            .field("requires", &self.requires)
            .field("time_budget", &self.time_budget)
            .finish_non_exhaustive()
    }
}

/// Sort agents so every producer runs before its consumers
///
/// A required slot depends on the agent producing it, or, when a derivation
/// rule targets it, on the producers of that rule's sources. Among agents
/// that are ready at the same time, declaration order wins.
pub fn execution_order(
    descriptors: Vec<AgentDescriptor>,
    rules: &[DerivationRule],
) -> Result<Vec<AgentDescriptor>> {
    let mut producer: HashMap<String, usize> = HashMap::new();
    for (index, descriptor) in descriptors.iter().enumerate() {
        if producer.insert(descriptor.result_slot(), index).is_some() {
            return Err(Error::Configuration(format!(
                "agent `{}` is registered twice",
                descriptor.name
            )));
        }
    }

    let dependencies: Vec<Vec<usize>> = descriptors
        .iter()
        .map(|descriptor| {
            let mut deps = Vec::new();
            for slot in &descriptor.requires {
                if let Some(&index) = producer.get(slot) {
                    deps.push(index);
                    continue;
                }
                for rule in rules.iter().filter(|r| &r.target == slot) {
                    deps.extend(rule.sources.iter().filter_map(|s| producer.get(s).copied()));
                }
            }
            deps
        })
        .collect();

    let mut placed = vec![false; descriptors.len()];
    let mut order = Vec::with_capacity(descriptors.len());
    while order.len() < descriptors.len() {
        let ready = (0..descriptors.len())
            .find(|&i| !placed[i] && dependencies[i].iter().all(|&d| placed[d]));
        let Some(index) = ready else {
            let stuck: Vec<&str> = (0..descriptors.len())
                .filter(|&i| !placed[i])
                .map(|i| descriptors[i].name.as_str())
                .collect();
            return Err(Error::Configuration(format!(
                "agent dependencies form a cycle among: {}",
                stuck.join(", ")
            )));
        };
        placed[index] = true;
        order.push(index);
    }

    let mut slots: Vec<Option<AgentDescriptor>> = descriptors.into_iter().map(Some).collect();
    Ok(order
        .into_iter()
        .filter_map(|index| slots[index].take())
        .collect())
}
