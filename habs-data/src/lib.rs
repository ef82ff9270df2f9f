//! Processing of daily water-quality target series: linear gap imputation
//! and a seasonal forecast with meteorological regressors carried alongside.

pub mod forecast;

/// Linear interpolation for filling gaps in daily series.
pub mod interpolation {
    use chrono::NaiveDate;

    /// A single data point for interpolation
    #[derive(Debug, Clone, Copy, PartialEq)]
    pub struct DataPoint {
        pub date: NaiveDate,
        pub value: f64,
    }

    /// Linearly interpolate between two data points, filling in daily values.
    ///
    /// Returns a Vec of DataPoints for each day between start and end (inclusive).
    /// If start and end are the same day, returns just that point.
    pub fn interpolate_pair(start: &DataPoint, end: &DataPoint) -> Vec<DataPoint> {
        let days = (end.date - start.date).num_days();
        if days <= 0 {
            return vec![*start];
        }

        let slope = (end.value - start.value) / days as f64;
        (0..=days)
            .map(|i| DataPoint {
                date: start.date + chrono::Duration::days(i),
                value: start.value + slope * i as f64,
            })
            .collect()
    }

    /// Fill gaps in a series of data points using linear interpolation.
    ///
    /// Points are sorted by date first; duplicate dates keep the first value.
    /// Every missing day between two observations is filled.
    pub fn fill_gaps(points: &[DataPoint]) -> Vec<DataPoint> {
        let mut sorted = points.to_vec();
        sorted.sort_by_key(|p| p.date);
        sorted.dedup_by_key(|p| p.date);
        if sorted.is_empty() {
            return Vec::new();
        }

        let mut result = Vec::with_capacity(sorted.len());
        for window in sorted.windows(2) {
            let (start, end) = (&window[0], &window[1]);
            if (end.date - start.date).num_days() <= 1 {
                result.push(*start);
            } else {
                // The end point opens the next window.
                let interpolated = interpolate_pair(start, end);
                result.extend_from_slice(&interpolated[..interpolated.len() - 1]);
            }
        }
        if let Some(last) = sorted.last() {
            result.push(*last);
        }
        log::debug!("Filled {} missing days", result.len() - sorted.len());
        result
    }

    #[cfg(test)]
    mod tests {
        use super::*;

        fn point(m: u32, d: u32, value: f64) -> DataPoint {
            DataPoint {
                date: NaiveDate::from_ymd_opt(2023, m, d).unwrap(),
                value,
            }
        }

        #[test]
        fn test_interpolate_pair_basic() {
            let result = interpolate_pair(&point(5, 12, 0.07), &point(5, 17, 0.16));
            assert_eq!(result.len(), 6);
            assert_eq!(result[0].value, 0.07);
            assert!((result[1].value - 0.088).abs() < 1e-12);
            assert!((result[5].value - 0.16).abs() < 1e-12);
        }

        #[test]
        fn test_interpolate_pair_same_day() {
            let p = point(5, 12, 0.1);
            assert_eq!(interpolate_pair(&p, &p), vec![p]);
        }

        #[test]
        fn test_fill_gaps() {
            let filled = fill_gaps(&[point(1, 5, 0.14), point(1, 1, 0.10), point(1, 2, 0.11)]);
            assert_eq!(filled.len(), 5);
            assert_eq!(filled[0].value, 0.10);
            assert_eq!(filled[1].value, 0.11);
            assert!((filled[2].value - 0.12).abs() < 1e-12);
            assert_eq!(filled[4].value, 0.14);
            assert!(fill_gaps(&[]).is_empty());
        }
    }
}
