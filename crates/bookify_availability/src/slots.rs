// --- File: crates/bookify_availability/src/slots.rs ---

//! Interval arithmetic over UTC instants and slot candidate generation.
//!
//! Everything here is pure; the resolver feeds it intervals it loaded and the current time.
//! Intervals are half-open `[start, end)`.

use bookify_common::models::day_of_week;
use chrono::{DateTime, Duration, Utc};
use chrono_tz::Tz;
use serde::Serialize;

pub type Interval = (DateTime<Utc>, DateTime<Utc>);

/// A bookable slot: provider-local wall clock plus the UTC instants.
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Slot {
    /// "HH:MM" provider-local
    pub start_time: String,
    /// "HH:MM" provider-local
    pub end_time: String,
    /// 0 = Sunday .. 6 = Saturday, of the local start
    pub day_of_week: u8,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
}

impl Slot {
    pub fn new(start: DateTime<Utc>, end: DateTime<Utc>, tz: Tz) -> Self {
        let local_start = start.with_timezone(&tz);
        let local_end = end.with_timezone(&tz);
        Self {
            start_time: local_start.format("%H:%M").to_string(),
            end_time: local_end.format("%H:%M").to_string(),
            day_of_week: day_of_week(local_start.date_naive()),
            starts_at: start,
            ends_at: end,
        }
    }
}

/// Sorts and merges overlapping or touching intervals. Empty intervals are dropped.
pub fn merge_intervals(intervals: &[Interval]) -> Vec<Interval> {
    let mut sorted: Vec<Interval> = intervals.iter().copied().filter(|(s, e)| s < e).collect();
    sorted.sort_by_key(|(start, _)| *start);

    let mut merged: Vec<Interval> = Vec::with_capacity(sorted.len());
    for (start, end) in sorted {
        match merged.last_mut() {
            Some(last) if start <= last.1 => last.1 = last.1.max(end),
            _ => merged.push((start, end)),
        }
    }
    merged
}

/// `open` minus `busy`.
pub fn subtract_busy(open: &[Interval], busy: &[Interval]) -> Vec<Interval> {
    let busy = merge_intervals(busy);
    let mut free = Vec::new();

    for (open_start, open_end) in merge_intervals(open) {
        let mut cursor = open_start;
        for &(busy_start, busy_end) in &busy {
            if busy_end <= cursor {
                continue;
            }
            if busy_start >= open_end {
                break;
            }
            if busy_start > cursor {
                free.push((cursor, busy_start));
            }
            cursor = cursor.max(busy_end);
            if cursor >= open_end {
                break;
            }
        }
        if cursor < open_end {
            free.push((cursor, open_end));
        }
    }
    free
}

/// Instants covered by both sets.
pub fn intersect(a: &[Interval], b: &[Interval]) -> Vec<Interval> {
    let a = merge_intervals(a);
    let b = merge_intervals(b);
    let (mut i, mut j) = (0, 0);
    let mut out = Vec::new();

    while i < a.len() && j < b.len() {
        let start = a[i].0.max(b[j].0);
        let end = a[i].1.min(b[j].1);
        if start < end {
            out.push((start, end));
        }
        if a[i].1 < b[j].1 {
            i += 1;
        } else {
            j += 1;
        }
    }
    out
}

/// Slot starts on the `step` grid of each free interval.
///
/// Candidates start at `free.start + k * step` and must end by `free.end`. Starts before
/// `not_before` are skipped.
pub fn candidate_slots(
    free: &[Interval],
    duration: Duration,
    step: Duration,
    not_before: DateTime<Utc>,
) -> Vec<Interval> {
    if duration <= Duration::zero() || step <= Duration::zero() {
        return Vec::new();
    }

    let mut candidates = Vec::new();
    for &(free_start, free_end) in free {
        let mut start = free_start;
        while start + duration <= free_end {
            if start >= not_before {
                candidates.push((start, start + duration));
            }
            start += step;
        }
    }
    candidates
}

/// True when a single free interval holds all of `[start, end)`.
pub fn fits(free: &[Interval], start: DateTime<Utc>, end: DateTime<Utc>) -> bool {
    start < end && free.iter().any(|&(s, e)| s <= start && end <= e)
}
