//! Time-window planning for point-statistics requests.
//!
//! The aggregation service caps the number of (point, day) cells per job, so a
//! long date range has to be cut into windows whose `points * days` stays
//! under that cap.

use crate::date_range::DateRange;
use crate::error::ConfigError;
use chrono::{Days, NaiveDate};
use habs_utils::dates::days_between;
use log::{debug, warn};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Shortest window worth a request, in days.
pub const MIN_WINDOW_DAYS: u64 = 2;

/// Inclusive date interval handled by a single retrieval request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ObservationWindow {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl ObservationWindow {
    pub fn new(start: NaiveDate, end: NaiveDate) -> Self {
        Self { start, end }
    }

    /// Calendar days covered, both ends included.
    pub fn days(&self) -> u64 {
        DateRange(self.start, self.end).day_count() as u64
    }
}

impl fmt::Display for ObservationWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}..={}", self.start, self.end)
    }
}

/// The result of cutting a date range into windows.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowPlan {
    /// Days per window the point budget allows.
    pub step_length: u64,
    pub n_chunks: u64,
    /// Nominal window length before the remainder is spread.
    pub t_delta: u64,
    pub windows: Vec<ObservationWindow>,
}

impl WindowPlan {
    fn empty() -> Self {
        Self {
            step_length: 0,
            n_chunks: 0,
            t_delta: 0,
            windows: Vec::new(),
        }
    }

    /// True when the requested range was empty.
    pub fn is_empty(&self) -> bool {
        self.windows.is_empty()
    }
}

/// Cut `[start, end]` into consecutive windows sized for `point_count` points.
///
/// `start > end` is not an error: it yields an empty plan, meaning there is
/// nothing to fetch.
pub fn plan_windows(
    point_count: usize,
    max_points_per_request: usize,
    start: NaiveDate,
    end: NaiveDate,
) -> Result<WindowPlan, ConfigError> {
    if point_count == 0 || max_points_per_request == 0 {
        return Err(ConfigError::InvalidPointBudget {
            point_count,
            max_points: max_points_per_request,
        });
    }
    if start > end {
        return Ok(WindowPlan::empty());
    }

    let budget = (max_points_per_request / point_count) as u64;
    if budget < MIN_WINDOW_DAYS {
        warn!(
            "{} points exceed the per-request budget of {} for {}-day windows; requests may be rejected",
            point_count, max_points_per_request, MIN_WINDOW_DAYS
        );
    }
    let step_length = budget.max(MIN_WINDOW_DAYS);
    Ok(partition(start, end, step_length))
}

/// Re-cut a failed window into pieces of at most `max_days` days.
pub fn split_window(window: &ObservationWindow, max_days: u64) -> Vec<ObservationWindow> {
    partition(window.start, window.end, max_days.max(1)).windows
}

fn partition(start: NaiveDate, end: NaiveDate, step_length: u64) -> WindowPlan {
    let n_days = days_between(&start, &end) as u64;
    let total_days = n_days + 1;

    // Never cut below the minimum length unless the whole range is shorter.
    let max_chunks = (total_days / MIN_WINDOW_DAYS).max(1);
    let n_chunks = (n_days / step_length + 1).min(max_chunks);
    let t_delta = (n_days / n_chunks).max(MIN_WINDOW_DAYS);

    let base = total_days / n_chunks;
    let remainder = total_days % n_chunks;

    let mut windows = Vec::with_capacity(n_chunks as usize);
    let mut cursor = start;
    for i in 0..n_chunks {
        // The trailing `remainder` windows take one extra day each.
        let len = if i >= n_chunks - remainder { base + 1 } else { base };
        let window_end = if i + 1 == n_chunks {
            end
        } else {
            cursor + Days::new(len - 1)
        };
        windows.push(ObservationWindow::new(cursor, window_end));
        if i + 1 < n_chunks {
            cursor = window_end + Days::new(1);
        }
    }

    debug!(
        "Planned {} windows over {}..={} (step_length {}, t_delta {})",
        windows.len(),
        start,
        end,
        step_length,
        t_delta
    );

    WindowPlan {
        step_length,
        n_chunks,
        t_delta,
        windows,
    }
}
