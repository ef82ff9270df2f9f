//! Shared utility functions for HABs crates.

/// Date utility functions
pub mod dates {
    use crate::error::DateError;
    use chrono::{Datelike, NaiveDate};

    /// ISO calendar date format used by both remote APIs and the database.
    pub const DATE_FORMAT: &str = "%Y-%m-%d";

    /// Format a NaiveDate as "YYYY-MM-DD"
    pub fn format_date(date: &NaiveDate) -> String {
        date.format(DATE_FORMAT).to_string()
    }

    /// Parse a date string in "YYYY-MM-DD" format
    pub fn parse_date(s: &str) -> Result<NaiveDate, DateError> {
        NaiveDate::parse_from_str(s.trim(), DATE_FORMAT).map_err(|_| DateError(s.to_string()))
    }

    /// Leading date part of a timestamp such as `2023-05-01T00:00:00Z`.
    pub fn parse_date_prefix(s: &str) -> Result<NaiveDate, DateError> {
        let trimmed = s.trim();
        match trimmed.get(..10) {
            Some(prefix) => parse_date(prefix),
            None => Err(DateError(s.to_string())),
        }
    }

    /// Whole days from `start` to `end`; negative if `end` is earlier.
    pub fn days_between(start: &NaiveDate, end: &NaiveDate) -> i64 {
        (*end - *start).num_days()
    }

    /// The winter half of the algal season: November through March.
    pub fn is_on_season(date: &NaiveDate) -> bool {
        let month = date.month();
        month > 10 || month < 4
    }

    #[cfg(test)]
    mod tests {
        use super::*;
        use chrono::NaiveDate;

        #[test]
        fn test_format_and_parse() {
            let date = NaiveDate::from_ymd_opt(2023, 6, 15).unwrap();
            let formatted = format_date(&date);
            assert_eq!(formatted, "2023-06-15");
            let parsed = parse_date(&formatted).unwrap();
            assert_eq!(parsed, date);
        }

        #[test]
        fn test_parse_rejects_compact_format() {
            let err = parse_date("20230615").unwrap_err();
            assert_eq!(err.0, "20230615");
        }

        #[test]
        fn test_parse_date_prefix() {
            let parsed = parse_date_prefix("2023-05-01T00:00:00Z").unwrap();
            assert_eq!(parsed, NaiveDate::from_ymd_opt(2023, 5, 1).unwrap());
            assert!(parse_date_prefix("2023").is_err());
        }

        #[test]
        fn test_days_between() {
            let start = NaiveDate::from_ymd_opt(2023, 1, 1).unwrap();
            let end = NaiveDate::from_ymd_opt(2023, 4, 10).unwrap();
            assert_eq!(days_between(&start, &end), 99);
            assert_eq!(days_between(&end, &start), -99);
        }

        #[test]
        fn test_is_on_season() {
            let nov = NaiveDate::from_ymd_opt(2022, 11, 1).unwrap();
            let mar = NaiveDate::from_ymd_opt(2023, 3, 31).unwrap();
            let apr = NaiveDate::from_ymd_opt(2023, 4, 1).unwrap();
            let oct = NaiveDate::from_ymd_opt(2023, 10, 31).unwrap();
            assert!(is_on_season(&nov));
            assert!(is_on_season(&mar));
            assert!(!is_on_season(&apr));
            assert!(!is_on_season(&oct));
        }
    }
}

/// Error types
pub mod error {
    use std::fmt;

    #[derive(Debug)]
    pub struct DateError(pub String);

    impl fmt::Display for DateError {
        fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
            write!(f, "Date error: {:?} must be of YYYY-MM-DD format", self.0)
        }
    }

    impl std::error::Error for DateError {}
}
