// Window generation. A window plan is computed once over the combined corpus
// (every group plus the reference, deduplicated by contribution id) and then
// intersected against each group, so all groups carry identical window keys
// and downstream joins line up.

use std::collections::{BTreeMap, HashSet};

use anyhow::{bail, Result};
use chrono::{Duration, NaiveDate};

use crate::corpus::Contribution;

// Window keys are dates internally; this is the canonical label in logs.
// Report JSON uses ISO `YYYY-MM-DD`.
pub const WINDOW_LABEL_FORMAT: &str = "%Y/%m/%d";

pub fn window_label(key: &NaiveDate) -> String {
    key.format(WINDOW_LABEL_FORMAT).to_string()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowMode {
    // Fixed number of contributions per window; size/step are row counts.
    Count,
    // Fixed span of days per window; size/step are day counts.
    Time,
}

/// Per-window membership of the combined corpus: ordered keys, member
/// contribution ids, and the last contribution date per window.
#[derive(Debug, Clone, Default)]
pub struct WindowPlan {
    members: BTreeMap<NaiveDate, HashSet<i64>>,
    last_dates: BTreeMap<NaiveDate, NaiveDate>,
}

/// A group's contributions partitioned by window key. Every plan key is
/// present, possibly with an empty member list, so groups always share the
/// full key set.
pub type WindowAssignment<'a> = BTreeMap<NaiveDate, Vec<&'a Contribution>>;

impl WindowPlan {
    pub fn keys(&self) -> Vec<NaiveDate> {
        self.members.keys().copied().collect()
    }

    pub fn num_windows(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Last contribution date of each window, in key order. Used for the
    /// report's end-of-window series.
    pub fn last_dates(&self) -> Vec<NaiveDate> {
        self.members.keys().map(|k| self.last_dates[k]).collect()
    }

    /// Partitions `contributions` by window, preserving input order within
    /// each window. Overlapping windows duplicate rows across keys.
    pub fn assign<'a>(&self, contributions: &[&'a Contribution]) -> WindowAssignment<'a> {
        let mut assignment: WindowAssignment<'a> = BTreeMap::new();
        for key in self.members.keys() {
            assignment.insert(*key, Vec::new());
        }
        for contribution in contributions {
            for (key, ids) in &self.members {
                if ids.contains(&contribution.id) {
                    assignment.get_mut(key).unwrap().push(contribution);
                }
            }
        }
        assignment
    }

    fn insert_window(&mut self, key: NaiveDate, ids: HashSet<i64>, last_date: NaiveDate) {
        if self.members.contains_key(&key) {
            // Dense same-day corpora can start two count windows on one
            // date; the later window wins the key.
            eprintln!(
                "Warning: duplicate window key {}, keeping the later window",
                window_label(&key)
            );
        }
        self.members.insert(key, ids);
        self.last_dates.insert(key, last_date);
    }
}

pub fn build_plan(
    contributions: &[&Contribution],
    mode: WindowMode,
    size: usize,
    step: usize,
) -> Result<WindowPlan> {
    match mode {
        WindowMode::Time => time_windows(contributions, size, step),
        WindowMode::Count => count_windows(contributions, size, step),
    }
}

/// Rolling day-granularity windows. Start dates step forward `step_days` at a
/// time from the first contribution's date, while strictly earlier than
/// `last_date - size_days`; each window covers `[start, start + size - 1]`
/// inclusive and is keyed by its start date.
pub fn time_windows(
    contributions: &[&Contribution],
    size_days: usize,
    step_days: usize,
) -> Result<WindowPlan> {
    check_window_params(size_days, step_days)?;
    let mut plan = WindowPlan::default();
    if contributions.is_empty() {
        return Ok(plan);
    }

    let mut sorted = contributions.to_vec();
    sorted.sort_by_key(|c| c.date);
    let first = sorted[0].date.date();
    let last = sorted[sorted.len() - 1].date.date();

    let size = size_days as i64;
    let bound = (last - first).num_days() - size;
    let mut offset = 0i64;
    while offset < bound {
        let win_start = first + Duration::days(offset);
        let win_end = win_start + Duration::days(size - 1);
        let lo = sorted.partition_point(|c| c.date.date() < win_start);
        let hi = sorted.partition_point(|c| c.date.date() <= win_end);
        let slice = &sorted[lo..hi];
        let ids: HashSet<i64> = slice.iter().map(|c| c.id).collect();
        // Parliament in recess can leave a window empty; the span end stands
        // in for the missing last contribution date.
        let last_date = slice.last().map(|c| c.date.date()).unwrap_or(win_end);
        plan.insert_window(win_start, ids, last_date);
        offset += step_days as i64;
    }
    Ok(plan)
}

/// Rolling fixed-count windows. Offsets step forward `step` rows at a time
/// while strictly less than `len - size`; each window is the ordinal slice
/// `[i, i + size)` of the date-sorted corpus, keyed by its first row's date.
pub fn count_windows(
    contributions: &[&Contribution],
    size: usize,
    step: usize,
) -> Result<WindowPlan> {
    check_window_params(size, step)?;
    let mut plan = WindowPlan::default();
    if contributions.len() <= size {
        return Ok(plan);
    }

    let mut sorted = contributions.to_vec();
    sorted.sort_by_key(|c| c.date);

    let bound = sorted.len() - size;
    let mut i = 0usize;
    while i < bound {
        let slice = &sorted[i..i + size];
        let key = slice[0].date.date();
        let ids: HashSet<i64> = slice.iter().map(|c| c.id).collect();
        let last_date = slice[slice.len() - 1].date.date();
        plan.insert_window(key, ids, last_date);
        i += step;
    }
    Ok(plan)
}

fn check_window_params(size: usize, step: usize) -> Result<()> {
    if size == 0 || step == 0 {
        bail!("Window size and step must both be at least 1");
    }
    Ok(())
}
