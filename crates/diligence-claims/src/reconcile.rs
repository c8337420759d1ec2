//! Statistical resolution of numeric conflicts
//!
//! When agents assert different numbers for the same key, the calculator's
//! conflict resolution combines them. Both inputs and the resolved value are
//! kept, and the resolution becomes a correction claim superseding the inputs.

use crate::claim::{Claim, ClaimValue};
use crate::dedupe::within_tolerance;
use diligence_core::SectionKind;
use diligence_runtime::CachedCalculator;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use tracing::{info, warn};

/// One side of a conflict
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConflictInput {
    pub claim_id: String,
    pub agent: String,
    pub value: f64,
    pub confidence: f64,
}

/// A resolved numeric disagreement with its audit trail
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NumericConflict {
    pub key: String,
    pub section: SectionKind,
    pub inputs: Vec<ConflictInput>,
    pub resolved_value: f64,
    pub methodology: String,
    pub steps: Vec<String>,
    /// Id of the correction claim carrying the resolved value
    pub resolved_claim: String,
}

impl NumericConflict {
    /// Mean confidence of the inputs
    pub fn confidence(&self) -> f64 {
        if self.inputs.is_empty() {
            return 0.0;
        }
        self.inputs.iter().map(|i| i.confidence).sum::<f64>() / self.inputs.len() as f64
    }
}

#[derive(Debug, Clone)]
pub struct Reconciliation {
    pub conflict: NumericConflict,
    pub correction: Claim,
}

/// Find and resolve conflicts among numeric claims
///
/// A conflict needs at least two distinct agents on one key with values not
/// all within `tolerance` of each other. `confidence` maps claim ids to
/// their post-verification confidence.
pub async fn reconcile(
    claims: &[&Claim],
    confidence: &HashMap<String, f64>,
    calculator: &CachedCalculator,
    tolerance: f64,
) -> Vec<Reconciliation> {
    let mut by_key: BTreeMap<&str, Vec<&Claim>> = BTreeMap::new();
    for claim in claims.iter().copied().filter(|c| c.is_numeric()) {
        by_key.entry(claim.key()).or_default().push(claim);
    }

    let mut resolutions = Vec::new();
    for (key, group) in by_key {
        let agents: BTreeSet<&str> = group.iter().map(|c| c.agent()).collect();
        let values: Vec<f64> = group.iter().filter_map(|c| c.value().as_f64()).collect();
        let agree = values
            .iter()
            .all(|v| values.iter().all(|w| within_tolerance(*v, *w, tolerance)));
        if agents.len() < 2 || agree {
            continue;
        }

        let calculation = match calculator.resolve_conflict(&values).await {
            Ok(calculation) => calculation,
            Err(e) => {
                warn!(key, error = %e, "could not resolve numeric conflict");
                continue;
            }
        };

        let confidence_of = |claim: &Claim| {
            confidence
                .get(claim.id())
                .copied()
                .unwrap_or_else(|| claim.source_confidence())
        };
        let anchor = group.iter().copied().fold(group[0], |best, candidate| {
            if confidence_of(candidate) > confidence_of(best) {
                candidate
            } else {
                best
            }
        });

        let inputs: Vec<ConflictInput> = group
            .iter()
            .map(|claim| ConflictInput {
                claim_id: claim.id().to_string(),
                agent: claim.agent().to_string(),
                value: claim.value().as_f64().unwrap_or_default(),
                confidence: confidence_of(claim),
            })
            .collect();

        let listed = values
            .iter()
            .map(ToString::to_string)
            .collect::<Vec<_>>()
            .join(", ");
        let correction = anchor.correction(
            format!("{}/resolved", anchor.id()),
            ClaimValue::Number(calculation.result),
            inputs.iter().map(|i| i.claim_id.clone()).collect(),
            format!(
                "{} = {} ({} of {listed})",
                key.replace('_', " "),
                calculation.result,
                calculation.methodology.to_lowercase()
            ),
        );

        info!(
            key,
            inputs = %listed,
            resolved = calculation.result,
            methodology = %calculation.methodology,
            "numeric conflict resolved"
        );

        resolutions.push(Reconciliation {
            conflict: NumericConflict {
                key: key.to_string(),
                section: anchor.section(),
                inputs,
                resolved_value: calculation.result,
                methodology: calculation.methodology.clone(),
                steps: calculation.steps.iter().map(ToString::to_string).collect(),
                resolved_claim: correction.id().to_string(),
            },
            correction,
        });
    }
    resolutions
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claim::ClaimCategory;
    use diligence_calc::Calculator;
    use diligence_runtime::TtlCache;
    use std::time::Duration;

    fn number(id: &str, section: SectionKind, key: &str, value: f64) -> Claim {
        let agent = id.split('#').next().unwrap_or(id);
        Claim::new(id, agent, section, ClaimCategory::Metric, key, ClaimValue::Number(value))
    }

    fn calculator() -> CachedCalculator {
        CachedCalculator::new(
            Calculator::default(),
            TtlCache::new("calculation", Duration::from_secs(60)),
        )
    }

    #[tokio::test]
    async fn test_two_agents_resolve_to_median() {
        let a = number("financial#1", SectionKind::Financial, "revenue", 100.0);
        let b = number("market#3", SectionKind::Market, "revenue", 120.0);
        let confidence = HashMap::from([
            ("financial#1".to_string(), 0.9),
            ("market#3".to_string(), 0.7),
        ]);

        let resolved = reconcile(&[&a, &b], &confidence, &calculator(), 0.01).await;
        assert_eq!(resolved.len(), 1);

        let conflict = &resolved[0].conflict;
        assert_eq!(conflict.resolved_value, 110.0);
        let originals: Vec<f64> = conflict.inputs.iter().map(|i| i.value).collect();
        assert_eq!(originals, vec![100.0, 120.0]);
        assert_eq!(conflict.section, SectionKind::Financial);
        assert!((conflict.confidence() - 0.8).abs() < 1e-9);
        assert!(conflict.steps.iter().any(|s| s.contains("100") && s.contains("120")));

        let correction = &resolved[0].correction;
        assert_eq!(correction.id(), "financial#1/resolved");
        assert_eq!(correction.value().as_f64(), Some(110.0));
        assert_eq!(correction.supersedes(), ["financial#1", "market#3"]);
        assert_eq!(conflict.resolved_claim, correction.id());
    }

    #[tokio::test]
    async fn test_agreement_and_single_agent_skipped() {
        let close_a = number("financial#1", SectionKind::Financial, "ebitda", 50.0);
        let close_b = number("valuation#1", SectionKind::Valuation, "ebitda", 50.2);
        let same_agent_a = number("market#1", SectionKind::Market, "market_size", 10.0);
        let same_agent_b = number("market#2", SectionKind::Market, "market_size", 20.0);

        let resolved = reconcile(
            &[&close_a, &close_b, &same_agent_a, &same_agent_b],
            &HashMap::new(),
            &calculator(),
            0.01,
        )
        .await;
        assert!(resolved.is_empty());
    }
}
