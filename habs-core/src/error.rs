//! Error taxonomy shared by the ingestion pipeline.
//!
//! - [`ConfigError`] aborts a run before any retrieval starts.
//! - [`RetrievalError`] is recoverable at window granularity: the executor
//!   splits the window and retries.
//!
//! Malformed or empty remote payloads are not errors at all; they are
//! normalized into an empty result.

use chrono::NaiveDate;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid date {0:?}, expected YYYY-MM-DD")]
    InvalidDate(String),

    #[error("reservoir '{0}' not found in table '{1}'")]
    UnknownReservoir(String, String),

    #[error("reservoir '{0}' has no sample points")]
    NoSamplePoints(String),

    #[error("point count and max points per request must both be positive (got {point_count} and {max_points})")]
    InvalidPointBudget { point_count: usize, max_points: usize },

    #[error("'{0}' is not a valid table or column identifier")]
    InvalidIdentifier(String),

    #[error("no bands requested")]
    EmptyBandList,

    #[error("missing access token: set {0}")]
    MissingToken(&'static str),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Error)]
pub enum RetrievalError {
    #[error("network request to {url} failed: {message}")]
    Network { url: String, message: String },

    #[error("HTTP request to {url} failed with status {status}")]
    HttpStatus { url: String, status: u16 },

    #[error("batch job {job_id} ended with status '{status}'")]
    JobFailed { job_id: String, status: String },

    #[error("batch job {job_id} did not finish within {waited_secs} s")]
    JobTimeout { job_id: String, waited_secs: u64 },

    #[error("unexpected response from {url}: {message}")]
    UnexpectedResponse { url: String, message: String },

    #[error("failed to persist window {start}..={end}: {message}")]
    Persist {
        start: NaiveDate,
        end: NaiveDate,
        message: String,
    },
}

impl From<habs_utils::error::DateError> for ConfigError {
    fn from(err: habs_utils::error::DateError) -> Self {
        ConfigError::InvalidDate(err.0)
    }
}

/// Reject anything that cannot be spliced into SQL as a bare identifier.
pub fn validate_identifier(name: &str) -> Result<&str, ConfigError> {
    let mut chars = name.chars();
    let valid_head = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_');
    if valid_head && chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        Ok(name)
    } else {
        Err(ConfigError::InvalidIdentifier(name.to_string()))
    }
}
