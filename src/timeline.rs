//! Per-operator chronological views over a batch sorted by (operator, timestamp).
//!
//! Every per-operator signal goes through these helpers so that grouping and
//! tie-breaking stay identical across signals.

use std::ops::Range;

use chrono::{Duration, NaiveDateTime};

use crate::models::Event;

/// Splits a sorted batch into one timeline per operator.
pub fn timelines(events: &[Event]) -> Timelines<'_> {
    Timelines { events, position: 0 }
}

pub struct Timelines<'a> {
    events: &'a [Event],
    position: usize,
}

impl<'a> Iterator for Timelines<'a> {
    type Item = OperatorTimeline<'a>;

    fn next(&mut self) -> Option<Self::Item> {
        let start = self.position;
        let first = self.events.get(start)?;
        let len = self.events[start..]
            .iter()
            .take_while(|event| event.operator_id == first.operator_id)
            .count();
        self.position = start + len;

        Some(OperatorTimeline {
            offset: start,
            events: &self.events[start..start + len],
        })
    }
}

/// One operator's events in chronological order. Never empty.
#[derive(Debug, Clone, Copy)]
pub struct OperatorTimeline<'a> {
    offset: usize,
    events: &'a [Event],
}

impl<'a> OperatorTimeline<'a> {
    pub fn operator_id(&self) -> &'a str {
        self.events
            .first()
            .map(|event| event.operator_id.as_str())
            .unwrap_or_default()
    }

    /// Position of this timeline within the full sorted batch.
    pub fn range(&self) -> Range<usize> {
        self.offset..self.offset + self.events.len()
    }

    pub fn events(&self) -> &'a [Event] {
        self.events
    }

    /// Consecutive event pairs. The first event has no predecessor and is never yielded as `current`.
    pub fn steps(&self) -> impl Iterator<Item = Step<'a>> + 'a {
        self.events
            .windows(2)
            .enumerate()
            .map(|(index, pair)| Step {
                index: index + 1,
                previous: &pair[0],
                current: &pair[1],
            })
    }

    /// For each anchor, the events with timestamp in `[anchor - span, anchor]`.
    pub fn trailing_windows(&self, span: Duration) -> TrailingWindows<'a> {
        TrailingWindows {
            events: self.events,
            span,
            anchor: 0,
            start: 0,
            end: 0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Step<'a> {
    /// Index of `current` within the timeline.
    pub index: usize,
    pub previous: &'a Event,
    pub current: &'a Event,
}

impl Step<'_> {
    pub fn elapsed(&self) -> Duration {
        self.current.timestamp - self.previous.timestamp
    }
}

/// A trailing window anchored at one event. `members` are timeline-local indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Window {
    pub anchor: usize,
    pub members: Range<usize>,
}

/// Two-pointer sweep: both window bounds only move forward, so a full pass is linear.
pub struct TrailingWindows<'a> {
    events: &'a [Event],
    span: Duration,
    anchor: usize,
    start: usize,
    end: usize,
}

impl TrailingWindows<'_> {
    fn timestamp(&self, index: usize) -> NaiveDateTime {
        self.events[index].timestamp
    }
}

impl Iterator for TrailingWindows<'_> {
    type Item = Window;

    fn next(&mut self) -> Option<Self::Item> {
        if self.anchor >= self.events.len() {
            return None;
        }
        let anchor_at = self.timestamp(self.anchor);

        // Later events sharing the anchor's timestamp fall inside its window.
        self.end = self.end.max(self.anchor + 1);
        while self.end < self.events.len() && self.timestamp(self.end) <= anchor_at {
            self.end += 1;
        }
        while self.start < self.anchor && anchor_at - self.timestamp(self.start) > self.span {
            self.start += 1;
        }

        let window = Window {
            anchor: self.anchor,
            members: self.start..self.end,
        };
        self.anchor += 1;
        Some(window)
    }
}

/// Scatter-writes a flag over the union of windows yielded by one sweep.
///
/// Relies on window bounds never moving backwards, which holds for
/// [`TrailingWindows`]; each slot is then written at most once.
#[derive(Debug, Default)]
pub struct WindowMarker {
    marked_until: usize,
}

impl WindowMarker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mark<T>(&mut self, members: Range<usize>, slots: &mut [T], mut set: impl FnMut(&mut T)) {
        let from = members.start.max(self.marked_until);
        if from < members.end {
            slots[from..members.end].iter_mut().for_each(&mut set);
        }
        self.marked_until = self.marked_until.max(members.end);
    }
}
