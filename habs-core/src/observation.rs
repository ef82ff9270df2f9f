use chrono::naive::NaiveDate;
use serde::{Deserialize, Serialize};
use std::{cmp::Ordering, collections::HashSet, hash::Hash};

/// One aggregated Sentinel-2 observation of a sample point on a given day.
///
/// `values` follow the band list the request was issued with; the column
/// names live alongside in [`crate::normalize::NormalizedTable::bands`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservationRecord {
    pub reservoir_id: String,
    pub pid: i64,
    pub date: NaiveDate,
    pub lat: f64,
    pub lon: f64,
    pub values: Vec<f64>,
}

impl ObservationRecord {
    /// Point geometry as WKT, longitude first.
    pub fn wkt(&self) -> String {
        format!("POINT({} {})", self.lon, self.lat)
    }

    /// Number of distinct sample points in a batch.
    pub fn point_count(records: &[ObservationRecord]) -> usize {
        records.iter().map(|r| r.pid).collect::<HashSet<_>>().len()
    }

    /// Latest observation date in a batch.
    pub fn last_date(records: &[ObservationRecord]) -> Option<NaiveDate> {
        records.iter().map(|r| r.date).max()
    }
}

/// One day of a target forecast with its 80% interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForecastRow {
    pub ds: NaiveDate,
    pub yhat: f64,
    pub yhat_lower: f64,
    pub yhat_upper: f64,
}

impl Hash for ObservationRecord {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.reservoir_id.hash(state);
        self.pid.hash(state);
        self.date.hash(state);
    }
}

impl Ord for ObservationRecord {
    fn cmp(&self, other: &Self) -> Ordering {
        self.date
            .cmp(&other.date)
            .then_with(|| self.pid.cmp(&other.pid))
            .then_with(|| self.reservoir_id.cmp(&other.reservoir_id))
    }
}

impl Eq for ObservationRecord {}

/// Two records are the same observation when they share reservoir, point and date.
impl PartialEq for ObservationRecord {
    fn eq(&self, other: &Self) -> bool {
        self.date == other.date && self.pid == other.pid && self.reservoir_id == other.reservoir_id
    }
}

impl PartialOrd for ObservationRecord {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
