//! Cross-agent deduplication
//!
//! Two claims describe the same fact when they share a key and either both
//! carry numbers within the relative tolerance, or both carry text whose
//! token sets overlap above the similarity threshold. The duplicate with the
//! highest source confidence survives; ties go to the earlier claim.
//! Numbers with the same key but outside the tolerance are not duplicates;
//! they are left for conflict reconciliation.

use crate::claim::{Claim, ClaimValue};
use std::collections::BTreeSet;

/// A claim folded into another
#[derive(Debug, Clone, PartialEq)]
pub struct Merge {
    pub merged: Claim,
    /// Id of the surviving claim
    pub survivor: String,
}

#[derive(Debug, Default)]
pub struct DedupeOutcome {
    pub survivors: Vec<Claim>,
    pub merges: Vec<Merge>,
}

/// Relative closeness of two numbers
pub fn within_tolerance(a: f64, b: f64, tolerance: f64) -> bool {
    let scale = a.abs().max(b.abs());
    if scale == 0.0 {
        return true;
    }
    (a - b).abs() / scale <= tolerance
}

/// Jaccard similarity of lowercase alphanumeric tokens
pub fn text_similarity(a: &str, b: &str) -> f64 {
    let tokens = |s: &str| -> BTreeSet<String> {
        s.split(|c: char| !c.is_alphanumeric())
            .filter(|t| !t.is_empty())
            .map(str::to_lowercase)
            .collect()
    };
    let (left, right) = (tokens(a), tokens(b));
    if left.is_empty() && right.is_empty() {
        return 1.0;
    }
    let shared = left.intersection(&right).count();
    let total = left.union(&right).count();
    shared as f64 / total as f64
}

/// Two agents reporting one fact; an agent never duplicates itself
fn same_fact(a: &Claim, b: &Claim, tolerance: f64, similarity: f64) -> bool {
    if a.agent() == b.agent() || a.key() != b.key() {
        return false;
    }
    match (a.value(), b.value()) {
        (ClaimValue::Number(x), ClaimValue::Number(y)) => within_tolerance(*x, *y, tolerance),
        (ClaimValue::Text(x), ClaimValue::Text(y)) => text_similarity(x, y) >= similarity,
        _ => false,
    }
}

/// Merge duplicates, keeping the most confident source of each fact
pub fn deduplicate(claims: Vec<Claim>, tolerance: f64, similarity: f64) -> DedupeOutcome {
    // Each group is a list of positions into `claims`
    let mut groups: Vec<Vec<usize>> = Vec::new();
    for (position, claim) in claims.iter().enumerate() {
        let existing = groups.iter_mut().find(|group| {
            group
                .iter()
                .any(|&member| same_fact(&claims[member], claim, tolerance, similarity))
                && group
                    .iter()
                    .all(|&member| claims[member].agent() != claim.agent())
        });
        match existing {
            Some(group) => group.push(position),
            None => groups.push(vec![position]),
        }
    }

    let mut survivor_of = vec![usize::MAX; claims.len()];
    for group in &groups {
        let best = group.iter().copied().fold(group[0], |best, candidate| {
            if claims[candidate].source_confidence() > claims[best].source_confidence() {
                candidate
            } else {
                best
            }
        });
        for &member in group {
            survivor_of[member] = best;
        }
    }

    let survivor_ids: Vec<String> = survivor_of
        .iter()
        .map(|&survivor| claims[survivor].id().to_string())
        .collect();

    let mut outcome = DedupeOutcome::default();
    for ((position, claim), survivor_id) in claims.into_iter().enumerate().zip(survivor_ids) {
        if survivor_of[position] == position {
            outcome.survivors.push(claim);
        } else {
            outcome.merges.push(Merge {
                merged: claim,
                survivor: survivor_id,
            });
        }
    }
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claim::ClaimCategory;
    use diligence_core::SectionKind;

    fn number(id: &str, key: &str, value: f64, confidence: f64) -> Claim {
        let agent = id.split('#').next().unwrap_or(id);
        Claim::new(
            id,
            agent,
            SectionKind::General,
            ClaimCategory::Metric,
            key,
            ClaimValue::Number(value),
        )
        .with_source_confidence(confidence)
    }

    fn text(id: &str, key: &str, value: &str) -> Claim {
        let agent = id.split('#').next().unwrap_or(id);
        Claim::new(
            id,
            agent,
            SectionKind::Market,
            ClaimCategory::Competitor,
            key,
            ClaimValue::Text(value.into()),
        )
    }

    #[test]
    fn test_numeric_duplicates_keep_most_confident() {
        let claims = vec![
            number("financial#1", "revenue", 1_000.0, 0.5),
            number("valuation#1", "revenue", 1_005.0, 0.8),
            number("market#1", "revenue", 1_200.0, 0.9),
        ];

        let outcome = deduplicate(claims, 0.01, 0.6);
        let ids: Vec<_> = outcome.survivors.iter().map(Claim::id).collect();
        assert_eq!(ids, vec!["valuation#1", "market#1"]);
        assert_eq!(outcome.merges.len(), 1);
        assert_eq!(outcome.merges[0].merged.id(), "financial#1");
        assert_eq!(outcome.merges[0].survivor, "valuation#1");
    }

    #[test]
    fn test_text_duplicates() {
        let claims = vec![
            text("market#1", "competitor", "Globex Corporation"),
            text("risk#1", "competitor", "globex corporation"),
            text("market#2", "competitor", "Initech"),
        ];

        let outcome = deduplicate(claims, 0.01, 0.6);
        assert_eq!(outcome.survivors.len(), 2);
        assert_eq!(outcome.merges[0].merged.id(), "risk#1");
        assert_eq!(outcome.merges[0].survivor, "market#1");
    }

    #[test]
    fn test_same_agent_never_merges_with_itself() {
        let claims = vec![
            text("market#1", "competitor", "Globex Corporation"),
            text("market#2", "competitor", "Globex Corporation"),
            text("risk#1", "competitor", "globex corporation"),
            number("financial#1", "revenue", 1_000.0, 0.5),
            number("financial#2", "revenue", 1_000.0, 0.9),
        ];

        let outcome = deduplicate(claims, 0.01, 0.6);
        let ids: Vec<_> = outcome.survivors.iter().map(Claim::id).collect();
        assert_eq!(ids, vec!["market#1", "market#2", "financial#1", "financial#2"]);
        assert_eq!(outcome.merges.len(), 1);
        assert_eq!(outcome.merges[0].merged.id(), "risk#1");
        assert_eq!(outcome.merges[0].survivor, "market#1");
    }

    #[test]
    fn test_different_keys_never_merge() {
        let claims = vec![
            number("financial#1", "revenue", 10.0, 0.5),
            number("financial#2", "ebitda", 10.0, 0.5),
        ];
        assert_eq!(deduplicate(claims, 0.01, 0.6).survivors.len(), 2);
    }

    #[test]
    fn test_tolerance_and_similarity() {
        assert!(within_tolerance(100.0, 100.9, 0.01));
        assert!(!within_tolerance(100.0, 102.0, 0.01));
        assert!(within_tolerance(0.0, 0.0, 0.01));
        assert!((text_similarity("Acme Corp.", "acme corp") - 1.0).abs() < f64::EPSILON);
        assert!(text_similarity("Acme Corp", "Globex Inc") < 0.1);
    }
}
