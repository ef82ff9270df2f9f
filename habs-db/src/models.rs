//! Query result models.

use chrono::NaiveDate;
use serde::Serialize;

/// A single (date, value) pair of a daily series.
#[derive(Debug, Clone, Copy, Serialize, PartialEq)]
pub struct DateValue {
    pub date: NaiveDate,
    pub value: f64,
}

/// Per-reservoir coverage of the observation table, for run summaries.
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ObservationCoverage {
    pub reservoir_id: String,
    pub rows: i64,
    pub points: i64,
    pub first_date: Option<NaiveDate>,
    pub last_date: Option<NaiveDate>,
}
