//! Sequential window retrieval with a one-level shrinking fallback.
//!
//! Every planned window gets one attempt. A failed window is re-cut into
//! sub-windows of at most [`RetryPolicy::sub_window_days`] days and each of
//! those is tried up to [`RetryPolicy::max_attempts`] times with a fixed
//! pause between attempts. A sub-window that keeps failing is skipped; the
//! run always moves on to the remaining windows.

use crate::error::RetrievalError;
use crate::window::{split_window, ObservationWindow, WindowPlan};
use log::{info, warn};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Bounds for the fallback stage of a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Attempts per sub-window, including the first one.
    pub max_attempts: u32,
    /// Pause between two attempts on the same sub-window.
    #[serde(with = "duration_secs")]
    pub backoff: Duration,
    /// Longest sub-window a failed window is cut into.
    pub sub_window_days: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            backoff: Duration::from_secs(1),
            sub_window_days: 30,
        }
    }
}

mod duration_secs {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_f64(d.as_secs_f64())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = f64::deserialize(d)?;
        Duration::try_from_secs_f64(secs).map_err(serde::de::Error::custom)
    }
}

/// One remote pull for one window, including whatever is done with the data.
///
/// Returns the number of rows the window contributed; `Ok(0)` is a valid
/// "no data" answer.
#[allow(async_fn_in_trait)]
pub trait WindowRetrieval {
    async fn retrieve(&mut self, window: &ObservationWindow) -> Result<usize, RetrievalError>;
}

/// How a single window (or sub-window) ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WindowResult {
    pub window: ObservationWindow,
    pub attempts: u32,
    pub rows: usize,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    pub planned: Vec<ObservationWindow>,
    pub completed: Vec<WindowResult>,
    pub skipped: Vec<WindowResult>,
}

impl RunReport {
    pub fn rows(&self) -> usize {
        self.completed.iter().map(|w| w.rows).sum()
    }

    pub fn attempts(&self) -> u32 {
        self.completed
            .iter()
            .chain(self.skipped.iter())
            .map(|w| w.attempts)
            .sum()
    }
}

/// Result of a run that got past configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunOutcome {
    /// The range was empty; no request was made.
    NothingToFetch,
    /// Every window, possibly via sub-windows, was retrieved.
    Complete(RunReport),
    /// Some sub-windows exhausted their attempts and were skipped.
    Partial(RunReport),
}

impl RunOutcome {
    pub fn report(&self) -> Option<&RunReport> {
        match self {
            RunOutcome::NothingToFetch => None,
            RunOutcome::Complete(r) | RunOutcome::Partial(r) => Some(r),
        }
    }

    pub fn rows(&self) -> usize {
        self.report().map(RunReport::rows).unwrap_or(0)
    }
}

/// Drive `retrieval` over every window of `plan`, strictly one after another.
pub async fn run_windows<R: WindowRetrieval>(
    retrieval: &mut R,
    plan: &WindowPlan,
    policy: &RetryPolicy,
) -> RunOutcome {
    if plan.is_empty() {
        return RunOutcome::NothingToFetch;
    }

    let mut report = RunReport {
        planned: plan.windows.clone(),
        ..RunReport::default()
    };

    for window in &plan.windows {
        info!("Retrieving window {}", window);
        match retrieval.retrieve(window).await {
            Ok(rows) => {
                info!("Window {} done, {} rows", window, rows);
                report.completed.push(WindowResult {
                    window: *window,
                    attempts: 1,
                    rows,
                });
            }
            Err(e) => {
                warn!(
                    "Attempt failed for {}: {}. The window will be split into windows of at most {} days",
                    window, e, policy.sub_window_days
                );
                for sub_window in split_window(window, policy.sub_window_days) {
                    let result = retry_window(retrieval, &sub_window, policy).await;
                    match result {
                        Ok(done) => report.completed.push(done),
                        Err(skipped) => report.skipped.push(skipped),
                    }
                }
            }
        }
    }

    if report.skipped.is_empty() {
        RunOutcome::Complete(report)
    } else {
        RunOutcome::Partial(report)
    }
}

async fn retry_window<R: WindowRetrieval>(
    retrieval: &mut R,
    window: &ObservationWindow,
    policy: &RetryPolicy,
) -> Result<WindowResult, WindowResult> {
    let max_attempts = policy.max_attempts.max(1);
    for attempt in 1..=max_attempts {
        match retrieval.retrieve(window).await {
            Ok(rows) => {
                info!("Sub-window {} done on attempt {}, {} rows", window, attempt, rows);
                return Ok(WindowResult {
                    window: *window,
                    attempts: attempt,
                    rows,
                });
            }
            Err(e) => {
                warn!(
                    "Attempt {}/{} failed for {}: {}",
                    attempt, max_attempts, window, e
                );
            }
        }

        if attempt < max_attempts && !policy.backoff.is_zero() {
            tokio::time::sleep(policy.backoff).await;
        }
    }

    warn!(
        "All {} attempts failed for {}; skipping it",
        max_attempts, window
    );
    Err(WindowResult {
        window: *window,
        attempts: max_attempts,
        rows: 0,
    })
}
