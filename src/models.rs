use std::collections::BTreeMap;

use chrono::NaiveDateTime;
use serde::Serialize;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Event {
    pub timestamp: NaiveDateTime,
    pub operator_id: String,
    pub location: String,
    pub device_id: String,
    pub test_type: String,
}

/// The six misuse signals computed for a single event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Flags {
    pub rapid: bool,
    pub loc_conflict: bool,
    pub device_hop: bool,
    pub shift_viol: bool,
    pub load_dev: bool,
    pub coloc: bool,
}

impl Flags {
    pub fn any(&self) -> bool {
        self.count() > 0
    }

    pub fn count(&self) -> usize {
        [
            self.rapid,
            self.loc_conflict,
            self.device_hop,
            self.shift_viol,
            self.load_dev,
            self.coloc,
        ]
        .iter()
        .filter(|set| **set)
        .count()
    }

    /// Short codes for the raised flags, in a fixed order.
    pub fn labels(&self) -> Vec<&'static str> {
        let mut labels = Vec::new();
        if self.rapid {
            labels.push("RAPID");
        }
        if self.loc_conflict {
            labels.push("LOC_CONFLICT");
        }
        if self.device_hop {
            labels.push("DEVICE_HOP");
        }
        if self.shift_viol {
            labels.push("SHIFT_VIOL");
        }
        if self.load_dev {
            labels.push("LOAD_DEV");
        }
        if self.coloc {
            labels.push("COLOC");
        }
        labels
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct EnrichedEvent {
    pub event_id: u64,
    #[serde(flatten)]
    pub event: Event,
    #[serde(flatten)]
    pub flags: Flags,
    pub flagged: bool,
}

/// Per-flag event counts, used both globally and per operator.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct FlagStats {
    pub rapid: usize,
    pub loc_conflict: usize,
    pub device_hop: usize,
    pub shift_viol: usize,
    pub load_dev: usize,
    pub coloc: usize,
}

impl FlagStats {
    pub fn record(&mut self, flags: &Flags) {
        self.rapid += usize::from(flags.rapid);
        self.loc_conflict += usize::from(flags.loc_conflict);
        self.device_hop += usize::from(flags.device_hop);
        self.shift_viol += usize::from(flags.shift_viol);
        self.load_dev += usize::from(flags.load_dev);
        self.coloc += usize::from(flags.coloc);
    }

    pub fn total(&self) -> usize {
        self.rapid + self.loc_conflict + self.device_hop + self.shift_viol + self.load_dev + self.coloc
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OperatorSummary {
    pub operator_id: String,
    pub total_tests: usize,
    pub suspicion_score: f64,
    pub flag_counts: FlagStats,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub insights: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DeviceSummary {
    pub device_id: String,
    pub total_tests: usize,
    pub unique_operators: usize,
    pub coloc_events: usize,
}

/// Operator id -> hour of day (0-23) -> event count. Missing entries are zero.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct HourlyMatrix(pub BTreeMap<String, BTreeMap<u32, usize>>);

impl HourlyMatrix {
    pub fn increment(&mut self, operator_id: &str, hour: u32) {
        *self
            .0
            .entry(operator_id.to_string())
            .or_default()
            .entry(hour)
            .or_insert(0) += 1;
    }

    pub fn get(&self, operator_id: &str, hour: u32) -> usize {
        self.0
            .get(operator_id)
            .and_then(|hours| hours.get(&hour))
            .copied()
            .unwrap_or(0)
    }

    pub fn operators(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Report {
    pub events: Vec<EnrichedEvent>,
    pub operator_summary: Vec<OperatorSummary>,
    pub device_summary: Vec<DeviceSummary>,
    pub flag_stats: FlagStats,
    pub hourly_matrix: HourlyMatrix,
}

impl Report {
    pub fn flagged(&self) -> impl Iterator<Item = &EnrichedEvent> {
        self.events.iter().filter(|event| event.flagged)
    }

    pub fn flagged_count(&self) -> usize {
        self.flagged().count()
    }
}
