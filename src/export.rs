use std::io;

use serde::Serialize;

use crate::models::{DeviceSummary, EnrichedEvent, FlagStats, HourlyMatrix, OperatorSummary, Report};

pub const DEFAULT_PREVIEW_LIMIT: usize = 100;

const EXPORT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

const FLAGGED_HEADER: [&str; 15] = [
    "Event_ID",
    "Timestamp",
    "Operator_ID",
    "Location",
    "Device_ID",
    "Test_Type",
    "RAPID",
    "LOC_CONFLICT",
    "DEVICE_HOP",
    "SHIFT_VIOL",
    "LOAD_DEV",
    "COLOC",
    "FLAGGED",
    "Reason",
    "Flag_Count",
];

const TEMPLATE: &str = "\
Timestamp,Operator_ID,Location,Device_ID,Test_Type
2024-01-15 08:00,OP1001,Emergency,GLU-01,Glucose
2024-01-15 08:12,OP1001,Emergency,GLU-02,Glucose
15/01/2024 09:30,OP2040,ICU,INR-07,INR
";

/// JSON view of a report: aggregates plus a bounded preview of flagged events.
#[derive(Debug, Clone, Serialize)]
pub struct UsageSummary<'a> {
    pub total_events: usize,
    pub flagged_events: usize,
    pub flagged_events_preview: Vec<&'a EnrichedEvent>,
    pub operator_summary: &'a [OperatorSummary],
    pub device_summary: &'a [DeviceSummary],
    pub flag_stats: FlagStats,
    pub hourly_heatmap_matrix: &'a HourlyMatrix,
}

impl<'a> UsageSummary<'a> {
    pub fn from_report(report: &'a Report, preview_limit: usize) -> Self {
        Self {
            total_events: report.events.len(),
            flagged_events: report.flagged_count(),
            flagged_events_preview: report.flagged().take(preview_limit).collect(),
            operator_summary: &report.operator_summary,
            device_summary: &report.device_summary,
            flag_stats: report.flag_stats,
            hourly_heatmap_matrix: &report.hourly_matrix,
        }
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

#[derive(Serialize)]
struct FlaggedRow<'a> {
    event_id: u64,
    timestamp: String,
    operator_id: &'a str,
    location: &'a str,
    device_id: &'a str,
    test_type: &'a str,
    rapid: bool,
    loc_conflict: bool,
    device_hop: bool,
    shift_viol: bool,
    load_dev: bool,
    coloc: bool,
    flagged: bool,
    reason: String,
    flag_count: usize,
}

impl<'a> From<&'a EnrichedEvent> for FlaggedRow<'a> {
    fn from(enriched: &'a EnrichedEvent) -> Self {
        let event = &enriched.event;
        let flags = &enriched.flags;
        Self {
            event_id: enriched.event_id,
            timestamp: event.timestamp.format(EXPORT_TIMESTAMP_FORMAT).to_string(),
            operator_id: &event.operator_id,
            location: &event.location,
            device_id: &event.device_id,
            test_type: &event.test_type,
            rapid: flags.rapid,
            loc_conflict: flags.loc_conflict,
            device_hop: flags.device_hop,
            shift_viol: flags.shift_viol,
            load_dev: flags.load_dev,
            coloc: flags.coloc,
            flagged: enriched.flagged,
            reason: flags.labels().join("+"),
            flag_count: flags.count(),
        }
    }
}

/// Writes flagged events only, in event id order. Returns the number of rows written.
pub fn write_flagged_csv<W: io::Write>(report: &Report, writer: W) -> Result<usize, csv::Error> {
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_writer(writer);
    writer.write_record(FLAGGED_HEADER)?;

    let mut written = 0usize;
    for event in report.flagged() {
        writer.serialize(FlaggedRow::from(event))?;
        written += 1;
    }
    writer.flush()?;
    Ok(written)
}

/// Blank upload template with a few sample rows that pass validation.
pub fn template_csv() -> &'static str {
    TEMPLATE
}
