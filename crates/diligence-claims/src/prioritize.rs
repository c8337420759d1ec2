//! Keyword priority tiers and the per-agent cap

use crate::claim::{Claim, ClaimCategory, Priority};
use crate::error::Result;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Keyword lists per tier; anything unmatched is `Low`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PriorityKeywords {
    pub critical: Vec<String>,
    pub high: Vec<String>,
    pub medium: Vec<String>,
}

impl Default for PriorityKeywords {
    fn default() -> Self {
        let words = |list: &[&str]| list.iter().map(|w| (*w).to_string()).collect();
        Self {
            critical: words(&[
                "revenue",
                "ebitda",
                "net income",
                "enterprise value",
                "equity value",
                "deal value",
                "total debt",
                "litigation",
                "fraud",
                "sanction",
                "going concern",
                "restatement",
            ]),
            high: words(&[
                "margin",
                "growth",
                "wacc",
                "market share",
                "regulatory",
                "regulator",
                "covenant",
                "impairment",
                "concentration",
                "free cash flow",
            ]),
            medium: words(&[
                "competitor",
                "market size",
                "risk",
                "churn",
                "headcount",
                "patent",
                "supplier",
            ]),
        }
    }
}

/// Compiled tier matchers
#[derive(Debug, Clone)]
pub struct PriorityRules {
    tiers: Vec<(Priority, Regex)>,
}

impl PriorityRules {
    pub fn new(keywords: &PriorityKeywords) -> Result<Self> {
        let mut tiers = Vec::new();
        for (priority, words) in [
            (Priority::Critical, &keywords.critical),
            (Priority::High, &keywords.high),
            (Priority::Medium, &keywords.medium),
        ] {
            if words.is_empty() {
                continue;
            }
            let alternatives: Vec<String> = words
                .iter()
                .map(|w| regex::escape(&w.trim().to_lowercase()))
                .collect();
            let pattern = format!(r"\b(?:{})s?\b", alternatives.join("|"));
            tiers.push((priority, Regex::new(&pattern)?));
        }
        Ok(Self { tiers })
    }

    /// Tier for a piece of claim text
    ///
    /// Underscores count as spaces so `total_debt` matches "total debt".
    /// Regulatory flags are never below `High`.
    pub fn classify(&self, category: ClaimCategory, key: &str, statement: &str) -> Priority {
        let haystack = format!("{key} {statement}").to_lowercase().replace('_', " ");
        let matched = self
            .tiers
            .iter()
            .find(|(_, pattern)| pattern.is_match(&haystack))
            .map_or(Priority::Low, |(priority, _)| *priority);

        if category == ClaimCategory::RegulatoryFlag {
            matched.min(Priority::High)
        } else {
            matched
        }
    }
}

/// Keep at most `max_per_agent` claims per agent, highest tiers first
///
/// Ties keep extraction order. Returns `(kept, deprioritized)`, both in
/// extraction order.
pub fn cap_per_agent(claims: Vec<Claim>, max_per_agent: usize) -> (Vec<Claim>, Vec<Claim>) {
    let mut ranked: HashMap<&str, Vec<(Priority, usize)>> = HashMap::new();
    for (position, claim) in claims.iter().enumerate() {
        ranked
            .entry(claim.agent())
            .or_default()
            .push((claim.priority(), position));
    }

    let mut keep = vec![false; claims.len()];
    for mut entries in ranked.into_values() {
        entries.sort_unstable();
        for (_, position) in entries.into_iter().take(max_per_agent) {
            keep[position] = true;
        }
    }

    let mut kept = Vec::new();
    let mut dropped = Vec::new();
    for (claim, keep) in claims.into_iter().zip(keep) {
        if keep {
            kept.push(claim);
        } else {
            dropped.push(claim);
        }
    }
    (kept, dropped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::claim::ClaimValue;
    use diligence_core::SectionKind;

    fn rules() -> PriorityRules {
        PriorityRules::new(&PriorityKeywords::default()).unwrap()
    }

    fn claim(agent: &str, n: usize, priority: Priority) -> Claim {
        Claim::new(
            format!("{agent}#{n}"),
            agent,
            SectionKind::General,
            ClaimCategory::Finding,
            format!("fact_{n}"),
            ClaimValue::Number(n as f64),
        )
        .with_priority(priority)
    }

    #[test]
    fn test_classify_tiers() {
        let rules = rules();
        assert_eq!(
            rules.classify(ClaimCategory::Metric, "total_debt", "total debt = 5"),
            Priority::Critical
        );
        assert_eq!(
            rules.classify(ClaimCategory::Metric, "growth_rate", "growth rate = 0.1"),
            Priority::High
        );
        assert_eq!(
            rules.classify(ClaimCategory::Competitor, "competitor", "Globex"),
            Priority::Medium
        );
        assert_eq!(
            rules.classify(ClaimCategory::Finding, "office", "HQ is in Leeds"),
            Priority::Low
        );
        assert_eq!(
            rules.classify(ClaimCategory::Finding, "litigation", "Two open lawsuits"),
            Priority::Critical
        );
    }

    #[test]
    fn test_regulatory_flags_at_least_high() {
        let rules = rules();
        assert_eq!(
            rules.classify(ClaimCategory::RegulatoryFlag, "regulatory_flag", "late filing"),
            Priority::High
        );
    }

    #[test]
    fn test_word_boundaries() {
        // "revenues" matches through the optional plural, "prevent" does not
        let rules = rules();
        assert_eq!(
            rules.classify(ClaimCategory::Finding, "note", "revenues rose"),
            Priority::Critical
        );
        assert_eq!(
            rules.classify(ClaimCategory::Finding, "note", "steps to prevent delays"),
            Priority::Low
        );
    }

    #[test]
    fn test_cap_keeps_highest_tiers() {
        let claims = vec![
            claim("legal", 1, Priority::Low),
            claim("legal", 2, Priority::Critical),
            claim("market", 1, Priority::Low),
            claim("legal", 3, Priority::High),
            claim("legal", 4, Priority::High),
        ];

        let (kept, dropped) = cap_per_agent(claims, 2);
        let kept_ids: Vec<_> = kept.iter().map(Claim::id).collect();
        let dropped_ids: Vec<_> = dropped.iter().map(Claim::id).collect();

        assert_eq!(kept_ids, vec!["legal#2", "market#1", "legal#3"]);
        assert_eq!(dropped_ids, vec!["legal#1", "legal#4"]);
    }

    #[test]
    fn test_empty_keyword_tier() {
        let keywords = PriorityKeywords {
            critical: Vec::new(),
            ..PriorityKeywords::default()
        };
        let rules = PriorityRules::new(&keywords).unwrap();
        assert_eq!(rules.classify(ClaimCategory::Metric, "revenue", "revenue = 1"), Priority::Low);
    }
}
