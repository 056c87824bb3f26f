use std::fmt::Write;

use crate::models::{OperatorSummary, Report};
use crate::store::ProcessedBatch;

/// Operators ordered by suspicion score, highest first; ties keep operator order.
pub fn rank_operators(report: &Report) -> Vec<&OperatorSummary> {
    let mut ranked: Vec<&OperatorSummary> = report.operator_summary.iter().collect();
    ranked.sort_by(|a, b| {
        b.suspicion_score
            .partial_cmp(&a.suspicion_score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
    ranked
}

pub fn build_report(batch: &ProcessedBatch, notes: Option<&str>, top: usize) -> String {
    let report = &batch.report;
    let config = &batch.config;
    let stats = &report.flag_stats;

    let mut output = String::new();

    let _ = writeln!(output, "# POCT Usage Report");
    let _ = writeln!(
        output,
        "Generated {} from {} (batch {})",
        batch.processed_at.format("%Y-%m-%d %H:%M UTC"),
        batch.source,
        batch.batch_id
    );
    let _ = writeln!(output);
    let _ = writeln!(output, "- Total tests: {}", report.events.len());
    let _ = writeln!(output, "- Flagged events: {}", report.flagged_count());
    let _ = writeln!(output, "- Operators: {}", report.operator_summary.len());
    let _ = writeln!(output, "- Devices: {}", report.device_summary.len());

    let _ = writeln!(output);
    let _ = writeln!(output, "## Thresholds");
    let _ = writeln!(output, "- Rapid repeat: < {} min", config.rapid_minutes);
    let _ = writeln!(
        output,
        "- Location conflict: <= {} min",
        config.conflict_window_minutes
    );
    let _ = writeln!(
        output,
        "- Device hopping: >= {} devices within {} min",
        config.device_hop_min_devices,
        config.device_hop_window.num_minutes()
    );
    let _ = writeln!(
        output,
        "- Shift violation: > {}h span within {}h",
        config.shift_overrun.num_hours(),
        config.shift_lookback.num_hours()
    );
    let _ = writeln!(
        output,
        "- Hourly load: > {} tests per operator-hour",
        config.hourly_load_threshold
    );
    let _ = writeln!(
        output,
        "- Co-location: >= {} operators per device-hour",
        config.coloc_min_operators
    );

    let _ = writeln!(output);
    let _ = writeln!(output, "## Flag Mix");
    for (label, count) in [
        ("Rapid repeat", stats.rapid),
        ("Location conflict", stats.loc_conflict),
        ("Device hopping", stats.device_hop),
        ("Shift violation", stats.shift_viol),
        ("Hourly load", stats.load_dev),
        ("Co-location", stats.coloc),
    ] {
        let _ = writeln!(output, "- {label}: {count}");
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Highest Suspicion Operators");

    let ranked = rank_operators(report);
    if ranked.is_empty() {
        let _ = writeln!(output, "No operators in this batch.");
    } else {
        for summary in ranked.iter().take(top) {
            let _ = writeln!(
                output,
                "- {} score {:.2} across {} tests",
                summary.operator_id, summary.suspicion_score, summary.total_tests
            );
            for insight in &summary.insights {
                let _ = writeln!(output, "  - {insight}");
            }
        }
    }

    let _ = writeln!(output);
    let _ = writeln!(output, "## Shared Devices");

    let mut shared: Vec<_> = report
        .device_summary
        .iter()
        .filter(|device| device.coloc_events > 0)
        .collect();
    shared.sort_by(|a, b| b.coloc_events.cmp(&a.coloc_events));

    if shared.is_empty() {
        let _ = writeln!(output, "No co-location detected.");
    } else {
        for device in shared.iter().take(top) {
            let _ = writeln!(
                output,
                "- {}: {} co-located events, {} operators, {} tests",
                device.device_id, device.coloc_events, device.unique_operators, device.total_tests
            );
        }
    }

    if let Some(notes) = notes.filter(|notes| !notes.trim().is_empty()) {
        let _ = writeln!(output);
        let _ = writeln!(output, "## Audit Notes");
        let _ = writeln!(output, "{}", notes.trim());
    }

    output
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::EngineConfig;
    use crate::store::LastResultStore;
    use crate::validate::RawBatch;

    fn processed(rows: &[[&str; 5]]) -> std::sync::Arc<ProcessedBatch> {
        let columns = ["Timestamp", "Operator_ID", "Location", "Device_ID", "Test_Type"]
            .iter()
            .map(|c| c.to_string())
            .collect();
        let rows = rows
            .iter()
            .map(|row| row.iter().map(|v| v.to_string()).collect())
            .collect();
        LastResultStore::new()
            .process("ward.csv", &RawBatch::new(columns, rows), EngineConfig::default())
            .unwrap()
    }

    #[test]
    fn ranks_operators_by_score() {
        let batch = processed(&[
            ["2024-03-01 08:00", "O1", "ED", "D1", "Glucose"],
            ["2024-03-01 08:20", "O1", "ED", "D1", "Glucose"],
            ["2024-03-01 08:00", "O2", "ED", "D2", "Glucose"],
            ["2024-03-01 08:00:20", "O2", "ED", "D2", "Glucose"],
        ]);
        let ranked: Vec<&str> = rank_operators(&batch.report)
            .iter()
            .map(|s| s.operator_id.as_str())
            .collect();
        assert_eq!(ranked, vec!["O2", "O1"]);
    }

    #[test]
    fn report_lists_totals_insights_and_notes() {
        let batch = processed(&[
            ["2024-03-01 08:00", "O1", "ED", "D1", "Glucose"],
            ["2024-03-01 08:03", "O1", "ED", "D2", "Glucose"],
            ["2024-03-01 08:06", "O1", "ED", "D3", "Glucose"],
        ]);
        let text = build_report(&batch, Some("Escalated to ward manager"), 10);

        assert!(text.starts_with("# POCT Usage Report"));
        assert!(text.contains("from ward.csv"));
        assert!(text.contains("- Total tests: 3"));
        assert!(text.contains("- Flagged events: 3"));
        assert!(text.contains("- Device hopping: 3"));
        assert!(text.contains("- O1 score 1.00 across 3 tests"));
        assert!(text.contains("  - Tested on 3 devices in 6 minutes"));
        assert!(text.contains("No co-location detected."));
        assert!(text.contains("## Audit Notes\nEscalated to ward manager"));
    }

    #[test]
    fn blank_notes_are_omitted() {
        let batch = processed(&[["2024-03-01 08:00", "O1", "ED", "D1", "Glucose"]]);
        let text = build_report(&batch, Some("   "), 10);
        assert!(!text.contains("Audit Notes"));
    }

    #[test]
    fn empty_batch_renders() {
        let batch = processed(&[]);
        let text = build_report(&batch, None, 10);
        assert!(text.contains("- Total tests: 0"));
        assert!(text.contains("No operators in this batch."));
    }
}
