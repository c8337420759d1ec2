//! Claim extraction from typed agent outputs

use crate::claim::{Claim, ClaimCategory, ClaimValue, normalize_key};
use crate::prioritize::PriorityRules;
use diligence_core::AgentOutput;

/// Turn one agent's output into claims with ids `<agent>#<n>`
///
/// Metrics come first, then findings, then enumerated items. Calculator
/// records and statement periods are structured sub-results and are not
/// turned into claims.
pub fn extract_claims(agent: &str, output: &AgentOutput, rules: &PriorityRules) -> Vec<Claim> {
    let section = output.section();
    let mut claims = Vec::new();
    let mut next_id = {
        let mut n = 0;
        move || {
            n += 1;
            format!("{agent}#{n}")
        }
    };

    for (name, value) in output.metrics() {
        if !value.is_finite() {
            continue;
        }
        let claim = Claim::new(
            next_id(),
            agent,
            section,
            ClaimCategory::Metric,
            name,
            ClaimValue::Number(value),
        );
        claims.push(prioritized(claim, rules));
    }

    for finding in output.findings() {
        let value = match finding.value {
            Some(v) if v.is_finite() => ClaimValue::Number(v),
            _ => ClaimValue::Text(finding.statement.clone()),
        };
        let mut claim = Claim::new(
            next_id(),
            agent,
            section,
            ClaimCategory::Finding,
            finding.topic.as_str(),
            value,
        )
        .with_statement(finding.statement.clone());
        if let Some(confidence) = finding.confidence {
            claim = claim.with_source_confidence(confidence);
        }
        claims.push(prioritized(claim, rules));
    }

    for (kind, text) in output.listed_items() {
        let text = text.trim();
        if text.is_empty() {
            continue;
        }
        let claim = Claim::new(
            next_id(),
            agent,
            section,
            ClaimCategory::from_item_kind(kind),
            kind,
            ClaimValue::Text(text.to_string()),
        )
        .with_statement(format!("{}: {text}", normalize_key(kind).replace('_', " ")));
        claims.push(prioritized(claim, rules));
    }

    claims
}

fn prioritized(claim: Claim, rules: &PriorityRules) -> Claim {
    let priority = rules.classify(claim.category(), claim.key(), claim.statement());
    claim.with_priority(priority)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claim::Priority;
    use crate::prioritize::PriorityKeywords;
    use diligence_core::{Finding, LegalOutput, MarketOutput, SectionKind};

    fn rules() -> PriorityRules {
        PriorityRules::new(&PriorityKeywords::default()).unwrap()
    }

    #[test]
    fn test_extract_market_output() {
        let output = AgentOutput::Market(MarketOutput {
            market_size: Some(5_000.0),
            growth_rate: Some(0.08),
            competitors: vec!["Globex".into(), "  ".into(), "Initech".into()],
            findings: vec![
                Finding::new("Pricing", "Prices rose 5% in 2024")
                    .with_value(0.05)
                    .with_confidence(0.9),
            ],
            ..Default::default()
        });

        let claims = extract_claims("market", &output, &rules());
        let ids: Vec<_> = claims.iter().map(Claim::id).collect();
        assert_eq!(ids, vec!["market#1", "market#2", "market#3", "market#4", "market#5"]);

        assert_eq!(claims[0].key(), "market_size");
        assert_eq!(claims[0].value(), &ClaimValue::Number(5_000.0));
        assert_eq!(claims[1].priority(), Priority::High);

        let finding = &claims[2];
        assert_eq!(finding.key(), "pricing");
        assert_eq!(finding.statement(), "Prices rose 5% in 2024");
        assert_eq!(finding.source_confidence(), 0.9);

        assert_eq!(claims[3].category(), ClaimCategory::Competitor);
        assert_eq!(claims[3].statement(), "competitor: Globex");
        assert!(claims.iter().all(|c| c.section() == SectionKind::Market));
    }

    #[test]
    fn test_text_finding_and_flags() {
        let output = AgentOutput::Legal(LegalOutput {
            open_litigation: Some(2),
            regulatory_flags: vec!["Late 10-K filing".into()],
            findings: vec![Finding::new("litigation", "Patent suit pending in Delaware")],
            ..Default::default()
        });

        let claims = extract_claims("legal", &output, &rules());
        assert_eq!(claims.len(), 3);
        assert_eq!(claims[0].key(), "open_litigation");
        assert_eq!(claims[0].priority(), Priority::Critical);
        assert_eq!(
            claims[1].value(),
            &ClaimValue::Text("Patent suit pending in Delaware".into())
        );
        assert_eq!(claims[2].category(), ClaimCategory::RegulatoryFlag);
        assert!(claims[2].priority() <= Priority::High);
    }
}
