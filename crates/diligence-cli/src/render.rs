//! Table rendering for the consolidated record and quality gate output

use comfy_table::presets::UTF8_FULL;
use comfy_table::{ContentArrangement, Table};
use diligence_claims::{ConsolidatedRecord, LedgerSummary, Section};
use diligence_data::{AdjustmentRecord, NormalizedSeries};
use serde_json::Value;

const MAX_VALUE_WIDTH: usize = 48;

fn table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table
        .load_preset(UTF8_FULL)
        .set_content_arrangement(ContentArrangement::Dynamic)
        .set_header(header.to_vec());
    table
}

/// One row per section with its status and confidence
pub fn sections_table(record: &ConsolidatedRecord) -> Table {
    let mut table = table(&["Section", "Status", "Confidence", "Entries", "Agents"]);
    for section in record.sections.values() {
        table.add_row(vec![
            section.kind.to_string(),
            section.status.to_string(),
            format!("{:.2}", section.confidence),
            section.entries.len().to_string(),
            section.agents.join(", "),
        ]);
    }
    table
}

/// Entries of one section, each with its source tag
pub fn entries_table(section: &Section) -> Table {
    let mut table = table(&["Field", "Value", "Source", "Confidence", "Agent"]);
    for entry in &section.entries {
        let confidence = if entry.low_confidence {
            format!("{:.2} (low)", entry.confidence)
        } else {
            format!("{:.2}", entry.confidence)
        };
        table.add_row(vec![
            entry.field.clone(),
            display_value(&entry.value),
            entry.source.to_string(),
            confidence,
            entry.agent.clone().unwrap_or_default(),
        ]);
    }
    table
}

pub fn adjustments_table(adjustments: &[AdjustmentRecord]) -> Table {
    let mut table = table(&["Period", "Field", "Reason", "Excluded", "Detail"]);
    for adjustment in adjustments {
        table.add_row(vec![
            adjustment.period.clone(),
            adjustment.field.clone(),
            adjustment.reason.to_string(),
            if adjustment.excluded { "yes" } else { "no" }.to_string(),
            adjustment.detail.clone(),
        ]);
    }
    table
}

pub fn ledger_line(summary: &LedgerSummary) -> String {
    format!(
        "claims: {} verified, {} contradicted, {} low-confidence, {} merged, {} deprioritized, {} reconciled",
        summary.verified,
        summary.contradicted,
        summary.low_confidence,
        summary.merged,
        summary.deprioritized,
        summary.reconciled
    )
}

pub fn series_line(series: &NormalizedSeries, threshold: u8) -> String {
    let source = if series.warning.is_none() && series.quality_score >= threshold {
        "normalized"
    } else {
        "raw"
    };
    format!(
        "quality score {}/100 (threshold {threshold}): {} of {} periods kept, consumers use the {source} series",
        series.quality_score,
        series.normalized.len(),
        series.raw.len()
    )
}

/// Compact single-line rendering of an entry value
pub fn display_value(value: &Value) -> String {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Array(items) => format!("[{} items]", items.len()),
        other => other.to_string(),
    };
    if text.chars().count() > MAX_VALUE_WIDTH {
        let cut: String = text.chars().take(MAX_VALUE_WIDTH - 3).collect();
        format!("{cut}...")
    } else {
        text
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use diligence_claims::{ClaimLedger, RecordEntry, SectionStatus, ValueSource};
    use diligence_core::SectionKind;
    use diligence_data::AdjustmentReason;
    use serde_json::json;
    use std::collections::BTreeMap;

    fn record() -> ConsolidatedRecord {
        let mut financial = Section::new(SectionKind::Financial);
        financial.status = SectionStatus::Populated;
        financial.confidence = 0.9;
        financial.agents = vec!["financial".into()];
        financial.entries.push(RecordEntry {
            field: "revenue".into(),
            value: json!(110.0),
            source: ValueSource::Derived,
            confidence: 0.9,
            agent: None,
            claim_id: Some("financial#1~resolved".into()),
            low_confidence: false,
        });
        let mut market = Section::new(SectionKind::Market);
        market.agents = vec!["market".into()];

        let mut sections = BTreeMap::new();
        sections.insert(SectionKind::Financial, financial);
        sections.insert(SectionKind::Market, market);

        ConsolidatedRecord {
            run_id: "run-render".into(),
            created_at: chrono::Utc::now(),
            sections,
            conflicts: Vec::new(),
            ledger: ClaimLedger::new(),
            adjustments: Vec::new(),
            series: None,
            agents: Vec::new(),
            raw_outputs: BTreeMap::new(),
        }
    }

    #[test]
    fn test_sections_table_shows_status() {
        let rendered = sections_table(&record()).to_string();
        assert!(rendered.contains("financial"));
        assert!(rendered.contains("populated"));
        assert!(rendered.contains("missing"));
        assert!(rendered.contains("0.90"));
    }

    #[test]
    fn test_entries_table_shows_source() {
        let record = record();
        let rendered = entries_table(record.get_section("financial").unwrap()).to_string();
        assert!(rendered.contains("revenue"));
        assert!(rendered.contains("derived"));
        assert!(rendered.contains("110.0"));
    }

    #[test]
    fn test_adjustments_table() {
        let rendered = adjustments_table(&[AdjustmentRecord {
            period: "FY2022".into(),
            field: "net_income".into(),
            original: Some(-200.0),
            adjusted: None,
            reason: AdjustmentReason::NetMarginOutOfBounds,
            detail: "net margin -222% outside bounds".into(),
            excluded: true,
        }])
        .to_string();
        assert!(rendered.contains("FY2022"));
        assert!(rendered.contains("net_margin_out_of_bounds"));
        assert!(rendered.contains("yes"));
    }

    #[test]
    fn test_display_value() {
        assert_eq!(display_value(&json!("text")), "text");
        assert_eq!(display_value(&json!([1, 2, 3])), "[3 items]");
        assert_eq!(display_value(&json!(0.25)), "0.25");
        let long = "x".repeat(100);
        assert_eq!(display_value(&json!(long)).chars().count(), MAX_VALUE_WIDTH);
    }
}
