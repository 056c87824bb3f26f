use std::collections::{HashMap, HashSet};

use chrono::{NaiveDate, NaiveDateTime, Timelike};
use tracing::{debug, info};

use crate::aggregate;
use crate::config::EngineConfig;
use crate::models::{EnrichedEvent, Event, Flags, Report};
use crate::timeline::{timelines, OperatorTimeline, WindowMarker};
use crate::validate::NormalizedBatch;

pub fn compute_report(batch: &NormalizedBatch, config: &EngineConfig) -> Report {
    let events = compute_flags(batch, config);
    let report = aggregate::build_report(events, config);

    info!(
        events = report.events.len(),
        flagged = report.flagged_count(),
        operators = report.operator_summary.len(),
        devices = report.device_summary.len(),
        "report computed"
    );
    report
}

/// Sorts the batch by (operator, timestamp), numbers it, and raises the six flags.
pub fn compute_flags(batch: &NormalizedBatch, config: &EngineConfig) -> Vec<EnrichedEvent> {
    let mut events = batch.events.clone();
    events.sort_by(|a, b| {
        a.operator_id
            .cmp(&b.operator_id)
            .then_with(|| a.timestamp.cmp(&b.timestamp))
    });

    let mut flags = vec![Flags::default(); events.len()];

    for timeline in timelines(&events) {
        let slots = &mut flags[timeline.range()];
        flag_successive(&timeline, slots, config);
        flag_device_hops(&timeline, slots, config);
        flag_shift_violations(&timeline, slots, config);
    }
    flag_hourly_load(&events, &mut flags, config);
    flag_colocation(&events, &mut flags, config);

    events
        .into_iter()
        .zip(flags)
        .enumerate()
        .map(|(index, (event, flags))| EnrichedEvent {
            event_id: index as u64 + 1,
            event,
            flags,
            flagged: flags.any(),
        })
        .collect()
}

/// Hour-floor bucket of an instant.
pub fn hour_bucket(timestamp: NaiveDateTime) -> (NaiveDate, u32) {
    (timestamp.date(), timestamp.hour())
}

fn flag_successive(timeline: &OperatorTimeline<'_>, slots: &mut [Flags], config: &EngineConfig) {
    let rapid = config.rapid_span();
    let conflict_window = config.conflict_window();

    for step in timeline.steps() {
        let elapsed = step.elapsed();
        let slot = &mut slots[step.index];
        slot.rapid = elapsed < rapid;
        slot.loc_conflict =
            step.current.location != step.previous.location && elapsed <= conflict_window;
    }
}

fn flag_device_hops(timeline: &OperatorTimeline<'_>, slots: &mut [Flags], config: &EngineConfig) {
    let events = timeline.events();
    let mut devices: HashMap<&str, usize> = HashMap::new();
    let mut covered = 0..0;
    let mut marker = WindowMarker::new();

    for window in timeline.trailing_windows(config.device_hop_window) {
        for event in &events[covered.end..window.members.end] {
            *devices.entry(event.device_id.as_str()).or_insert(0) += 1;
        }
        for event in &events[covered.start..window.members.start] {
            if let Some(count) = devices.get_mut(event.device_id.as_str()) {
                *count -= 1;
                if *count == 0 {
                    devices.remove(event.device_id.as_str());
                }
            }
        }
        covered = window.members.clone();

        if devices.len() >= config.device_hop_min_devices {
            marker.mark(window.members, slots, |flags| flags.device_hop = true);
        }
    }
}

fn flag_shift_violations(
    timeline: &OperatorTimeline<'_>,
    slots: &mut [Flags],
    config: &EngineConfig,
) {
    let events = timeline.events();
    let mut marker = WindowMarker::new();

    for window in timeline.trailing_windows(config.shift_lookback) {
        let earliest = events[window.members.start].timestamp;
        if events[window.anchor].timestamp - earliest > config.shift_overrun {
            marker.mark(window.members, slots, |flags| flags.shift_viol = true);
        }
    }
}

fn flag_hourly_load(events: &[Event], flags: &mut [Flags], config: &EngineConfig) {
    let mut counts: HashMap<(&str, (NaiveDate, u32)), usize> = HashMap::new();
    for event in events {
        *counts
            .entry((event.operator_id.as_str(), hour_bucket(event.timestamp)))
            .or_insert(0) += 1;
    }

    let heavy = counts
        .values()
        .filter(|count| **count > config.hourly_load_threshold)
        .count();
    debug!(buckets = counts.len(), heavy, "hourly load buckets");

    for (event, slot) in events.iter().zip(flags.iter_mut()) {
        let key = (event.operator_id.as_str(), hour_bucket(event.timestamp));
        if counts.get(&key).is_some_and(|count| *count > config.hourly_load_threshold) {
            slot.load_dev = true;
        }
    }
}

fn flag_colocation(events: &[Event], flags: &mut [Flags], config: &EngineConfig) {
    let mut operators: HashMap<(&str, (NaiveDate, u32)), HashSet<&str>> = HashMap::new();
    for event in events {
        operators
            .entry((event.device_id.as_str(), hour_bucket(event.timestamp)))
            .or_default()
            .insert(event.operator_id.as_str());
    }

    for (event, slot) in events.iter().zip(flags.iter_mut()) {
        let key = (event.device_id.as_str(), hour_bucket(event.timestamp));
        if operators
            .get(&key)
            .is_some_and(|users| users.len() >= config.coloc_min_operators)
        {
            slot.coloc = true;
        }
    }
}
