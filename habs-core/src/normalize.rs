//! Reshape the raw CSV produced by a spatial aggregation job into
//! [`ObservationRecord`]s.
//!
//! The service names value columns positionally (`avg(band_0)`,
//! `avg(band_1)`, ...) and identifies points by their position in the
//! submitted FeatureCollection (`feature_index`). Both only make sense
//! against the exact band list and point slice the job was built from.
//!
//! Anything malformed is treated as "no data for this window".

use crate::observation::ObservationRecord;
use crate::reservoir::SamplePoint;
use csv::ReaderBuilder;
use habs_utils::dates::parse_date_prefix;
use log::{debug, warn};

pub const DATE_COLUMN: &str = "date";
pub const FEATURE_INDEX_COLUMN: &str = "feature_index";
pub const PID_COLUMN: &str = "PID";

/// Name the aggregation service gives the mean of the `i`th requested band.
pub fn raw_band_column(i: usize) -> String {
    format!("avg(band_{i})")
}

/// Normalized output: records whose `values` are laid out as `bands`.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NormalizedTable {
    pub bands: Vec<String>,
    pub records: Vec<ObservationRecord>,
}

impl NormalizedTable {
    pub fn empty(bands: &[String]) -> Self {
        Self {
            bands: bands.to_vec(),
            records: Vec::new(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }
}

/// Rename raw headers into persisted column names.
///
/// `feature_index` becomes `PID` and `avg(band_i)` becomes `bands[i]`; every
/// other header is passed through unchanged.
pub fn normalized_columns<S: AsRef<str>>(headers: &[S], bands: &[String]) -> Vec<String> {
    headers
        .iter()
        .map(|h| {
            let h = h.as_ref().trim();
            if h == FEATURE_INDEX_COLUMN {
                return PID_COLUMN.to_string();
            }
            band_position(h)
                .and_then(|i| bands.get(i))
                .cloned()
                .unwrap_or_else(|| h.to_string())
        })
        .collect()
}

fn band_position(header: &str) -> Option<usize> {
    header
        .strip_prefix("avg(band_")?
        .strip_suffix(')')?
        .parse()
        .ok()
}

fn is_missing(cell: &str) -> bool {
    let cell = cell.trim();
    cell.is_empty() || cell.eq_ignore_ascii_case("nan") || cell.eq_ignore_ascii_case("null")
}

/// Convert raw aggregation CSV into records for `reservoir_id`.
///
/// `points` must be the slice the request geometries were built from; the
/// `feature_index` of each row is resolved against it to recover the point
/// id and coordinates. Rows with any missing value are dropped.
pub fn normalize(
    raw_csv: &str,
    bands: &[String],
    points: &[SamplePoint],
    reservoir_id: &str,
) -> NormalizedTable {
    let mut rdr = ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(raw_csv.as_bytes());

    let headers: Vec<String> = match rdr.headers() {
        Ok(h) => h.iter().map(|s| s.trim().to_string()).collect(),
        Err(e) => {
            warn!("Unreadable aggregation output for {}: {}", reservoir_id, e);
            return NormalizedTable::empty(bands);
        }
    };

    let Some(date_idx) = headers.iter().position(|h| h == DATE_COLUMN) else {
        warn!("Aggregation output for {} has no '{}' column", reservoir_id, DATE_COLUMN);
        return NormalizedTable::empty(bands);
    };
    let Some(feature_idx) = headers.iter().position(|h| h == FEATURE_INDEX_COLUMN) else {
        warn!(
            "Aggregation output for {} has no '{}' column",
            reservoir_id, FEATURE_INDEX_COLUMN
        );
        return NormalizedTable::empty(bands);
    };
    let band_idx: Option<Vec<usize>> = (0..bands.len())
        .map(|i| {
            let name = raw_band_column(i);
            headers.iter().position(|h| *h == name)
        })
        .collect();
    let Some(band_idx) = band_idx else {
        warn!(
            "Aggregation output for {} is missing band columns (expected {})",
            reservoir_id,
            bands.len()
        );
        return NormalizedTable::empty(bands);
    };

    let mut records = Vec::new();
    let mut dropped = 0usize;
    for result in rdr.records() {
        let Ok(row) = result else {
            dropped += 1;
            continue;
        };
        if row.len() < headers.len() || row.iter().any(is_missing) {
            dropped += 1;
            continue;
        }
        let Some(record) = row_to_record(&row, date_idx, feature_idx, &band_idx, points, reservoir_id)
        else {
            dropped += 1;
            continue;
        };
        records.push(record);
    }
    records.sort();

    debug!(
        "Normalized {} rows for {} ({} dropped)",
        records.len(),
        reservoir_id,
        dropped
    );
    NormalizedTable {
        bands: bands.to_vec(),
        records,
    }
}

fn row_to_record(
    row: &csv::StringRecord,
    date_idx: usize,
    feature_idx: usize,
    band_idx: &[usize],
    points: &[SamplePoint],
    reservoir_id: &str,
) -> Option<ObservationRecord> {
    let date = parse_date_prefix(row.get(date_idx)?).ok()?;
    let feature: usize = row.get(feature_idx)?.trim().parse().ok()?;
    let point = points.get(feature)?;
    let values = band_idx
        .iter()
        .map(|&i| row.get(i)?.trim().parse::<f64>().ok())
        .collect::<Option<Vec<f64>>>()?;
    Some(ObservationRecord {
        reservoir_id: reservoir_id.to_string(),
        pid: point.pid,
        date,
        lat: point.lat,
        lon: point.lon,
        values,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn bands(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    fn points() -> Vec<SamplePoint> {
        vec![
            SamplePoint { pid: 0, lat: 49.50, lon: 14.10 },
            SamplePoint { pid: 1, lat: 49.51, lon: 14.11 },
            SamplePoint { pid: 2, lat: 49.52, lon: 14.12 },
        ]
    }

    #[test]
    fn columns_are_renamed_in_band_order() {
        let headers = ["feature_index", "avg(band_0)", "avg(band_1)"];
        let columns = normalized_columns(&headers, &bands(&["B02", "B03"]));
        assert_eq!(columns, vec!["PID", "B02", "B03"]);
    }

    #[test]
    fn unknown_columns_pass_through() {
        let headers = ["date", "feature_index", "avg(band_1)", "avg(band_5)"];
        let columns = normalized_columns(&headers, &bands(&["B02", "B03"]));
        assert_eq!(columns, vec!["date", "PID", "B03", "avg(band_5)"]);
    }

    #[test]
    fn normalize_maps_feature_index_to_point() {
        let raw = "\
date,feature_index,avg(band_0),avg(band_1)
2023-05-01T00:00:00.000Z,0,0.031,0.045
2023-05-01T00:00:00.000Z,2,0.029,0.041
2023-05-04T00:00:00.000Z,1,0.035,0.050
";
        let table = normalize(raw, &bands(&["B02", "B03"]), &points(), "42");
        assert_eq!(table.bands, vec!["B02", "B03"]);
        assert_eq!(table.len(), 3);
        let first = &table.records[0];
        assert_eq!(first.pid, 0);
        assert_eq!(first.date, NaiveDate::from_ymd_opt(2023, 5, 1).unwrap());
        assert_eq!(first.values, vec![0.031, 0.045]);
        let third = &table.records[2];
        assert_eq!(third.pid, 1);
        assert!((third.lat - 49.51).abs() < 1e-9);
        assert_eq!(third.reservoir_id, "42");
    }

    #[test]
    fn feature_index_is_a_position_in_the_point_list() {
        let points = vec![
            SamplePoint { pid: 7, lat: 49.57, lon: 14.17 },
            SamplePoint { pid: 3, lat: 49.53, lon: 14.13 },
        ];
        let raw = "\
date,feature_index,avg(band_0)
2023-05-01,0,0.1
2023-05-01,1,0.2
2023-05-01,7,0.3
";
        let table = normalize(raw, &bands(&["B02"]), &points, "42");
        assert_eq!(table.len(), 2);
        assert_eq!(table.records[0].pid, 7);
        assert!((table.records[0].lat - 49.57).abs() < 1e-9);
        assert_eq!(table.records[1].pid, 3);
        assert_eq!(table.records[1].values, vec![0.2]);
    }

    #[test]
    fn band_columns_follow_request_order_not_csv_order() {
        let raw = "\
avg(band_1),feature_index,date,avg(band_0)
0.2,0,2023-05-01,0.1
";
        let table = normalize(raw, &bands(&["B04", "B05"]), &points(), "42");
        assert_eq!(table.records[0].values, vec![0.1, 0.2]);
    }

    #[test]
    fn rows_with_missing_values_are_dropped() {
        let raw = "\
date,feature_index,avg(band_0),avg(band_1)
2023-05-01,0,,0.045
2023-05-01,1,nan,0.041
2023-05-01,2,0.029,0.041
";
        let table = normalize(raw, &bands(&["B02", "B03"]), &points(), "42");
        assert_eq!(table.len(), 1);
        assert_eq!(table.records[0].pid, 2);
    }

    #[test]
    fn unknown_feature_index_is_dropped() {
        let raw = "date,feature_index,avg(band_0)\n2023-05-01,9,0.1\n";
        let table = normalize(raw, &bands(&["B02"]), &points(), "42");
        assert!(table.is_empty());
    }

    #[test]
    fn output_without_date_column_is_no_data() {
        let raw = "feature_index,avg(band_0),avg(band_1)\n0,0.1,0.2\n";
        let table = normalize(raw, &bands(&["B02", "B03"]), &points(), "42");
        assert!(table.is_empty());
        assert_eq!(table.bands, vec!["B02", "B03"]);
    }

    #[test]
    fn output_missing_a_band_is_no_data() {
        let raw = "date,feature_index,avg(band_0)\n2023-05-01,0,0.1\n";
        let table = normalize(raw, &bands(&["B02", "B03"]), &points(), "42");
        assert!(table.is_empty());
    }

    #[test]
    fn empty_output_is_no_data() {
        let table = normalize("", &bands(&["B02"]), &points(), "42");
        assert!(table.is_empty());
    }
}
