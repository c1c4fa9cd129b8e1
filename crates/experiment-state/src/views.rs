//! Time-window classification of experiments
//!
//! Views are pure functions of a collection snapshot and `today`; nothing
//! here is cached. Dates are ISO `YYYY-MM-DD` strings and compare
//! lexicographically, so no parsing is needed and malformed dates simply
//! fall out of every bucket.

use chrono::Utc;
use serde::{Deserialize, Serialize};

use crate::schema::Experiment;

/// Where an experiment sits relative to `today`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Phase {
    /// At least one date is missing
    NotStarted,
    /// `start_date <= today <= end_date`
    Ongoing,
    /// `today > end_date`
    Completed,
}

/// Today's UTC calendar date as `YYYY-MM-DD`
pub fn today_utc() -> String {
    Utc::now().date_naive().format("%Y-%m-%d").to_string()
}

/// Classify one record. `None` means both dates are set but the window has
/// not opened yet (or the dates are inconsistent).
pub fn phase(exp: &Experiment, today: &str) -> Option<Phase> {
    let Some((start, end)) = exp.date_range() else {
        return Some(Phase::NotStarted);
    };
    if today > end {
        Some(Phase::Completed)
    } else if start <= today {
        Some(Phase::Ongoing)
    } else {
        None
    }
}

/// Experiments whose window contains `today`, latest start first.
pub fn ongoing(experiments: &[Experiment], today: &str) -> Vec<Experiment> {
    let mut out: Vec<Experiment> = experiments
        .iter()
        .filter(|e| phase(e, today) == Some(Phase::Ongoing))
        .cloned()
        .collect();
    // stable: equal start dates keep collection order
    out.sort_by(|a, b| b.start().cmp(&a.start()));
    out
}

/// Experiments whose end date is before `today`, in collection order.
pub fn completed(experiments: &[Experiment], today: &str) -> Vec<Experiment> {
    experiments
        .iter()
        .filter(|e| phase(e, today) == Some(Phase::Completed))
        .cloned()
        .collect()
}

/// Experiments missing a start or end date, in collection order.
pub fn not_started(experiments: &[Experiment]) -> Vec<Experiment> {
    experiments
        .iter()
        .filter(|e| e.date_range().is_none())
        .cloned()
        .collect()
}

/// Bucket sizes for a snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViewCounts {
    pub total: usize,
    pub ongoing: usize,
    pub completed: usize,
    pub not_started: usize,
    /// Dated experiments that have not begun yet
    pub scheduled: usize,
}

pub fn summarize(experiments: &[Experiment], today: &str) -> ViewCounts {
    let mut counts = ViewCounts {
        total: experiments.len(),
        ..Default::default()
    };
    for exp in experiments {
        match phase(exp, today) {
            Some(Phase::Ongoing) => counts.ongoing += 1,
            Some(Phase::Completed) => counts.completed += 1,
            Some(Phase::NotStarted) => counts.not_started += 1,
            None => counts.scheduled += 1,
        }
    }
    counts
}
