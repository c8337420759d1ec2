//! Rules for deriving missing prerequisites from earlier results

use diligence_claims::FallbackResolver;
use diligence_core::{AgentOutput, RunState, ValuationOutput, keys};
use serde_json::json;
use std::fmt;
use std::sync::Arc;

type DeriveFn = Arc<dyn Fn(&RunState) -> Option<serde_json::Value> + Send + Sync>;

/// Computes `target` from `sources` when the caller did not supply it
#[derive(Clone)]
pub struct DerivationRule {
    pub name: String,
    /// Slot the rule fills
    pub target: String,
    /// Slots the rule reads; used for ordering and recorded as provenance
    pub sources: Vec<String>,
    pub description: String,
    derive: DeriveFn,
}

impl DerivationRule {
    pub fn new<F>(
        name: impl Into<String>,
        target: impl Into<String>,
        sources: Vec<String>,
        description: impl Into<String>,
        derive: F,
    ) -> Self
    where
        F: Fn(&RunState) -> Option<serde_json::Value> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            target: target.into(),
            sources,
            description: description.into(),
            derive: Arc::new(derive),
        }
    }

    /// Value for the target, or `None` when the sources cannot supply one
    pub fn derive(&self, state: &RunState) -> Option<serde_json::Value> {
        (self.derive)(state)
    }
}

impl fmt::Debug for DerivationRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DerivationRule")
            .field("name", &self.name)
            .field("target", &self.target)
            .field("sources", &self.sources)
            .finish_non_exhaustive()
    }
}

/// `deal_value` from the named valuation agent's enterprise value, else its
/// equity value
pub fn deal_value_from(valuation_agent: &str) -> DerivationRule {
    let agent = valuation_agent.to_string();
    let source = keys::agent_result(valuation_agent);
    DerivationRule::new(
        "deal_value_from_valuation",
        keys::DEAL_VALUE,
        vec![source],
        format!("deal value taken from {valuation_agent}'s enterprise or equity value"),
        move |state| {
            let Some(AgentOutput::Valuation(valuation)) = state.agent_output(&agent) else {
                return None;
            };
            FallbackResolver::new()
                .then("enterprise_value", |v: &ValuationOutput| {
                    v.enterprise_value.filter(|x| usable(*x))
                })
                .then("equity_value", |v: &ValuationOutput| {
                    v.equity_value.filter(|x| usable(*x))
                })
                .resolve(valuation)
                .map(|found| json!(found.value))
        },
    )
}

fn usable(value: f64) -> bool {
    value.is_finite() && value > 0.0
}

/// Rules registered unless the caller replaces them
pub fn default_rules() -> Vec<DerivationRule> {
    vec![deal_value_from("valuation")]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state_with(valuation: ValuationOutput) -> RunState {
        let mut state = RunState::new("derive").unwrap();
        state
            .record_output("valuation", AgentOutput::Valuation(valuation))
            .unwrap();
        state
    }

    #[test]
    fn test_enterprise_value_preferred() {
        let state = state_with(ValuationOutput {
            enterprise_value: Some(950.0),
            equity_value: Some(700.0),
            ..Default::default()
        });
        assert_eq!(deal_value_from("valuation").derive(&state), Some(json!(950.0)));
    }

    #[test]
    fn test_equity_value_fallback() {
        let state = state_with(ValuationOutput {
            equity_value: Some(700.0),
            ..Default::default()
        });
        assert_eq!(deal_value_from("valuation").derive(&state), Some(json!(700.0)));
    }

    #[test]
    fn test_nothing_to_derive_from() {
        let empty = RunState::new("derive").unwrap();
        let rule = deal_value_from("valuation");
        assert_eq!(rule.derive(&empty), None);
        assert_eq!(rule.sources, vec!["agent:valuation".to_string()]);

        let unusable = state_with(ValuationOutput {
            enterprise_value: Some(-5.0),
            ..Default::default()
        });
        assert_eq!(rule.derive(&unusable), None);

        let negative_ev = state_with(ValuationOutput {
            enterprise_value: Some(-5.0),
            equity_value: Some(300.0),
            ..Default::default()
        });
        assert_eq!(rule.derive(&negative_ev), Some(json!(300.0)));
    }
}
