use std::collections::{BTreeMap, HashSet};

use chrono::Timelike;

use crate::config::EngineConfig;
use crate::models::{
    DeviceSummary, EnrichedEvent, FlagStats, HourlyMatrix, OperatorSummary, Report,
};

pub fn build_report(events: Vec<EnrichedEvent>, config: &EngineConfig) -> Report {
    Report {
        operator_summary: summarize_operators(&events, config),
        device_summary: summarize_devices(&events),
        flag_stats: flag_stats(&events),
        hourly_matrix: hourly_matrix(&events),
        events,
    }
}

pub fn summarize_operators(events: &[EnrichedEvent], config: &EngineConfig) -> Vec<OperatorSummary> {
    let mut groups: BTreeMap<&str, Vec<&EnrichedEvent>> = BTreeMap::new();
    for event in events {
        groups.entry(event.event.operator_id.as_str()).or_default().push(event);
    }

    groups
        .into_iter()
        .map(|(operator_id, group)| {
            let mut counts = FlagStats::default();
            for event in &group {
                counts.record(&event.flags);
            }

            OperatorSummary {
                operator_id: operator_id.to_string(),
                total_tests: group.len(),
                suspicion_score: suspicion_score(&counts, group.len()),
                insights: operator_insights(&group, &counts, config),
                flag_counts: counts,
            }
        })
        .collect()
}

/// Mean number of raised flags per event. Not capped; ranges over [0, 6].
pub fn suspicion_score(counts: &FlagStats, total_tests: usize) -> f64 {
    if total_tests == 0 {
        0.0
    } else {
        counts.total() as f64 / total_tests as f64
    }
}

fn operator_insights(
    group: &[&EnrichedEvent],
    counts: &FlagStats,
    config: &EngineConfig,
) -> Vec<String> {
    let mut insights = Vec::new();

    if counts.device_hop > 0 {
        let devices: HashSet<&str> = group.iter().map(|e| e.event.device_id.as_str()).collect();
        let first = group.iter().map(|e| e.event.timestamp).min();
        let last = group.iter().map(|e| e.event.timestamp).max();
        let minutes = match (first, last) {
            (Some(first), Some(last)) => (last - first).num_minutes(),
            _ => 0,
        };
        insights.push(format!("Tested on {} devices in {} minutes", devices.len(), minutes));
    }

    if counts.shift_viol > 0 {
        insights.push(format!(
            "Barcode used after >{} hours within {}h window",
            config.shift_overrun.num_hours(),
            config.shift_lookback.num_hours()
        ));
    }

    insights
}

pub fn summarize_devices(events: &[EnrichedEvent]) -> Vec<DeviceSummary> {
    let mut groups: BTreeMap<&str, (usize, HashSet<&str>, usize)> = BTreeMap::new();

    for event in events {
        let entry = groups
            .entry(event.event.device_id.as_str())
            .or_insert_with(|| (0, HashSet::new(), 0));
        entry.0 += 1;
        entry.1.insert(event.event.operator_id.as_str());
        entry.2 += usize::from(event.flags.coloc);
    }

    groups
        .into_iter()
        .map(|(device_id, (total_tests, operators, coloc_events))| DeviceSummary {
            device_id: device_id.to_string(),
            total_tests,
            unique_operators: operators.len(),
            coloc_events,
        })
        .collect()
}

pub fn flag_stats(events: &[EnrichedEvent]) -> FlagStats {
    let mut stats = FlagStats::default();
    for event in events {
        stats.record(&event.flags);
    }
    stats
}

pub fn hourly_matrix(events: &[EnrichedEvent]) -> HourlyMatrix {
    let mut matrix = HourlyMatrix::default();
    for event in events {
        matrix.increment(&event.event.operator_id, event.event.timestamp.hour());
    }
    matrix
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::compute_report;
    use crate::models::Event;
    use crate::timestamp::parse_timestamp;
    use crate::validate::NormalizedBatch;

    fn event(operator: &str, device: &str, location: &str, at: &str) -> Event {
        Event {
            timestamp: parse_timestamp(at).expect("test timestamp"),
            operator_id: operator.to_string(),
            location: location.to_string(),
            device_id: device.to_string(),
            test_type: "Glucose".to_string(),
        }
    }

    fn sample_report() -> Report {
        let batch = NormalizedBatch::new(vec![
            event("O1", "D1", "ED", "2024-03-01 08:00"),
            event("O1", "D2", "ED", "2024-03-01 08:04"),
            event("O1", "D3", "ED", "2024-03-01 08:08"),
            event("O2", "D1", "ED", "2024-03-01 08:30"),
            event("O3", "D1", "ED", "2024-03-01 08:45"),
            event("O3", "D1", "ED", "2024-03-01 23:30"),
        ]);
        compute_report(&batch, &EngineConfig::default())
    }

    #[test]
    fn operator_summaries_count_flags_per_group() {
        let report = sample_report();
        let ops: Vec<&str> = report
            .operator_summary
            .iter()
            .map(|s| s.operator_id.as_str())
            .collect();
        assert_eq!(ops, vec!["O1", "O2", "O3"]);

        let o1 = &report.operator_summary[0];
        assert_eq!(o1.total_tests, 3);
        assert_eq!(o1.flag_counts.device_hop, 3);
        assert_eq!(o1.flag_counts.loc_conflict, 0);
        assert_eq!(o1.flag_counts.coloc, 1);
        assert!((o1.suspicion_score - 4.0 / 3.0).abs() < 1e-9);
        assert_eq!(o1.insights, vec!["Tested on 3 devices in 8 minutes".to_string()]);

        let o3 = &report.operator_summary[2];
        assert_eq!(o3.flag_counts.shift_viol, 2);
        assert_eq!(o3.flag_counts.coloc, 1);
        assert!((o3.suspicion_score - 1.5).abs() < 1e-9);
        assert_eq!(
            o3.insights,
            vec!["Barcode used after >14 hours within 24h window".to_string()]
        );
    }

    #[test]
    fn device_summaries_count_distinct_operators() {
        let report = sample_report();
        let d1 = &report.device_summary[0];
        assert_eq!(d1.device_id, "D1");
        assert_eq!(d1.total_tests, 4);
        assert_eq!(d1.unique_operators, 3);
        assert_eq!(d1.coloc_events, 3);
        assert_eq!(report.device_summary.len(), 3);
    }

    #[test]
    fn global_stats_match_operator_totals() {
        let report = sample_report();
        let mut from_operators = FlagStats::default();
        for summary in &report.operator_summary {
            from_operators.rapid += summary.flag_counts.rapid;
            from_operators.loc_conflict += summary.flag_counts.loc_conflict;
            from_operators.device_hop += summary.flag_counts.device_hop;
            from_operators.shift_viol += summary.flag_counts.shift_viol;
            from_operators.load_dev += summary.flag_counts.load_dev;
            from_operators.coloc += summary.flag_counts.coloc;
        }
        assert_eq!(report.flag_stats, from_operators);
        assert_eq!(report.flag_stats, flag_stats(&report.events));
    }

    #[test]
    fn hourly_matrix_counts_by_hour_of_day() {
        let report = sample_report();
        assert_eq!(report.hourly_matrix.get("O1", 8), 3);
        assert_eq!(report.hourly_matrix.get("O3", 8), 1);
        assert_eq!(report.hourly_matrix.get("O3", 23), 1);
        assert_eq!(report.hourly_matrix.get("O2", 23), 0);
        assert_eq!(report.hourly_matrix.get("nobody", 8), 0);
        assert_eq!(report.hourly_matrix.operators().count(), 3);
    }

    #[test]
    fn hour_of_day_merges_different_dates() {
        let batch = NormalizedBatch::new(vec![
            event("O1", "D1", "ED", "2024-03-01 08:00"),
            event("O1", "D1", "ED", "2024-03-05 08:30"),
        ]);
        let report = compute_report(&batch, &EngineConfig::default());
        assert_eq!(report.hourly_matrix.get("O1", 8), 2);
    }

    #[test]
    fn empty_batch_yields_empty_summaries() {
        let report = build_report(Vec::new(), &EngineConfig::default());
        assert!(report.operator_summary.is_empty());
        assert!(report.device_summary.is_empty());
        assert_eq!(report.flag_stats, FlagStats::default());
        assert_eq!(report.hourly_matrix, HourlyMatrix::default());
    }

    #[test]
    fn score_of_empty_group_is_zero() {
        assert_eq!(suspicion_score(&FlagStats::default(), 0), 0.0);
    }

    #[test]
    fn insights_are_omitted_from_json_when_empty() {
        let report = sample_report();
        let json = serde_json::to_value(&report.operator_summary[1]).unwrap();
        assert!(json.get("insights").is_none());
        assert_eq!(json["flag_counts"]["coloc"], 1);
    }
}
