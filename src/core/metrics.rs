//! Derived counters over a job's step reports.

use serde::Serialize;

use super::models::StepReport;

/// Read/write/filter/skip counters, either summed or taken from one step.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StepCounts {
    pub read_count: u64,
    pub write_count: u64,
    pub filter_count: u64,
    pub skip_count: u64,
}

impl StepCounts {
    pub fn of(step: &StepReport) -> Self {
        Self {
            read_count: step.read_count,
            write_count: step.write_count,
            filter_count: step.filter_count,
            skip_count: skip_total(step),
        }
    }
}

/// Skips for one step: the read/process/write sub-counters when the backend
/// reports any of them, otherwise the plain `skip_count`.
pub fn skip_total(step: &StepReport) -> u64 {
    let subs = [
        step.read_skip_count,
        step.process_skip_count,
        step.write_skip_count,
    ];
    if subs.iter().any(Option::is_some) {
        subs.iter().flatten().fold(0, |acc, n| acc.saturating_add(*n))
    } else {
        step.skip_count
    }
}

/// Sum of every step's counters, saturating at `u64::MAX`.
pub fn totals(steps: &[StepReport]) -> StepCounts {
    steps.iter().map(StepCounts::of).fold(StepCounts::default(), |acc, c| StepCounts {
        read_count: acc.read_count.saturating_add(c.read_count),
        write_count: acc.write_count.saturating_add(c.write_count),
        filter_count: acc.filter_count.saturating_add(c.filter_count),
        skip_count: acc.skip_count.saturating_add(c.skip_count),
    })
}

/// Counters recorded in history: the last step is treated as authoritative
/// for the whole job, not the totals.
pub fn history_counts(steps: &[StepReport]) -> StepCounts {
    steps.last().map(StepCounts::of).unwrap_or_default()
}

/// Percentage of read records that were written. Zero when nothing was read.
pub fn efficiency(step: &StepReport) -> f64 {
    if step.read_count == 0 {
        return 0.0;
    }
    step.write_count as f64 / step.read_count as f64 * 100.0
}
