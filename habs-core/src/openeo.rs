//! Minimal openEO batch-job client: describe a collection, submit a process
//! graph, wait for it and download the CSV result.

use crate::error::RetrievalError;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[cfg(feature = "api")]
use crate::{cache::CacheExpiry, error::ConfigError, session::HttpSession};
#[cfg(feature = "api")]
use log::{debug, info};
#[cfg(feature = "api")]
use serde_json::json;
#[cfg(feature = "api")]
use std::time::{Duration, Instant};

/// Environment variable holding the OIDC access token.
pub const TOKEN_ENV: &str = "OPENEO_ACCESS_TOKEN";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenEoConfig {
    /// Versioned API root, e.g. `https://openeo.dataspace.copernicus.eu/openeo/1.2`.
    pub url: String,
    /// OIDC provider id used in the bearer token.
    pub auth_provider: String,
    pub collection: String,
    /// How many leading bands of the collection to request.
    pub band_count: usize,
    pub poll_interval_secs: u64,
    pub job_timeout_secs: u64,
}

impl Default for OpenEoConfig {
    fn default() -> Self {
        Self {
            url: "https://openeo.dataspace.copernicus.eu/openeo/1.2".to_string(),
            auth_provider: "CDSE".to_string(),
            collection: "SENTINEL2_L2A".to_string(),
            band_count: 15,
            poll_interval_secs: 10,
            job_timeout_secs: 3 * 3600,
        }
    }
}

/// Lifecycle state of a batch job as reported by the back-end.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Created,
    Queued,
    Running,
    Finished,
    Canceled,
    Error,
    Other(String),
}

impl JobStatus {
    pub fn parse(s: &str) -> Self {
        match s {
            "created" => JobStatus::Created,
            "queued" => JobStatus::Queued,
            "running" => JobStatus::Running,
            "finished" => JobStatus::Finished,
            "canceled" => JobStatus::Canceled,
            "error" => JobStatus::Error,
            other => JobStatus::Other(other.to_string()),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, JobStatus::Finished | JobStatus::Canceled | JobStatus::Error)
    }

    pub fn as_str(&self) -> &str {
        match self {
            JobStatus::Created => "created",
            JobStatus::Queued => "queued",
            JobStatus::Running => "running",
            JobStatus::Finished => "finished",
            JobStatus::Canceled => "canceled",
            JobStatus::Error => "error",
            JobStatus::Other(s) => s,
        }
    }
}

fn unexpected(url: &str, message: impl Into<String>) -> RetrievalError {
    RetrievalError::UnexpectedResponse {
        url: url.to_string(),
        message: message.into(),
    }
}

/// Leading `max` band names of a collection description.
pub fn parse_band_names(url: &str, collection: &Value, max: usize) -> Result<Vec<String>, RetrievalError> {
    let values = collection
        .pointer("/cube:dimensions/bands/values")
        .and_then(Value::as_array)
        .ok_or_else(|| unexpected(url, "collection has no band dimension"))?;
    let bands: Vec<String> = values
        .iter()
        .filter_map(Value::as_str)
        .take(max)
        .map(str::to_string)
        .collect();
    if bands.is_empty() {
        return Err(unexpected(url, "collection lists no bands"));
    }
    Ok(bands)
}

pub fn parse_job_status(url: &str, job: &Value) -> Result<JobStatus, RetrievalError> {
    job.get("status")
        .and_then(Value::as_str)
        .map(JobStatus::parse)
        .ok_or_else(|| unexpected(url, "job metadata has no status"))
}

/// Link to the CSV asset of a finished job.
pub fn pick_csv_asset(url: &str, results: &Value) -> Result<String, RetrievalError> {
    let assets = results
        .get("assets")
        .and_then(Value::as_object)
        .ok_or_else(|| unexpected(url, "job results have no assets"))?;
    fn is_csv(name: &str, asset: &Value) -> bool {
        let media = asset.get("type").and_then(Value::as_str).unwrap_or_default();
        media.contains("csv") || name.to_ascii_lowercase().ends_with(".csv")
    }
    assets
        .iter()
        .find(|(name, asset)| is_csv(name.as_str(), asset))
        .or_else(|| assets.iter().next())
        .and_then(|(_, asset)| asset.get("href").and_then(Value::as_str))
        .map(str::to_string)
        .ok_or_else(|| unexpected(url, "job results contain no downloadable asset"))
}

#[cfg(feature = "api")]
pub struct OpenEoClient<'s> {
    session: &'s HttpSession,
    config: OpenEoConfig,
    bearer: String,
}

#[cfg(feature = "api")]
impl<'s> OpenEoClient<'s> {
    /// Bind a session to an openEO back-end. The token is not validated
    /// until the first request.
    pub fn connect(
        session: &'s HttpSession,
        config: OpenEoConfig,
        access_token: &str,
    ) -> Result<Self, ConfigError> {
        if access_token.trim().is_empty() {
            return Err(ConfigError::MissingToken(TOKEN_ENV));
        }
        let bearer = format!("Bearer oidc/{}/{}", config.auth_provider, access_token.trim());
        Ok(Self {
            session,
            config,
            bearer,
        })
    }

    pub fn config(&self) -> &OpenEoConfig {
        &self.config
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{}", self.config.url.trim_end_matches('/'), path)
    }

    async fn get_json(&self, url: &str) -> Result<Value, RetrievalError> {
        let response = self
            .session
            .send(url, |c| c.get(url).header("Authorization", &self.bearer))
            .await?;
        response
            .json::<Value>()
            .await
            .map_err(|e| unexpected(url, format!("invalid JSON: {e}")))
    }

    /// Band names of the configured collection.
    pub async fn describe_bands(&self) -> Result<Vec<String>, RetrievalError> {
        let url = self.endpoint(&format!("collections/{}", self.config.collection));
        let body = self.session.get_text(&url, CacheExpiry::Bypass).await?;
        let description: Value =
            serde_json::from_str(&body).map_err(|e| unexpected(&url, format!("invalid JSON: {e}")))?;
        parse_band_names(&url, &description, self.config.band_count)
    }

    /// Run `process_graph` as a batch job and return the CSV it produced.
    pub async fn run_batch_csv(&self, process_graph: Value, title: &str) -> Result<String, RetrievalError> {
        let job_id = self.create_job(process_graph, title).await?;
        self.start_job(&job_id).await?;
        self.wait_for_job(&job_id).await?;
        let href = self.result_href(&job_id).await?;
        debug!("Downloading result of job {} from {}", job_id, href);
        self.session.get_text(&href, CacheExpiry::Bypass).await
    }

    async fn create_job(&self, process_graph: Value, title: &str) -> Result<String, RetrievalError> {
        let url = self.endpoint("jobs");
        let body = json!({ "title": title, "process": { "process_graph": process_graph } });
        let response = self
            .session
            .send(&url, |c| c.post(&url).header("Authorization", &self.bearer).json(&body))
            .await?;
        let job_id = response
            .headers()
            .get("OpenEO-Identifier")
            .and_then(|v| v.to_str().ok())
            .map(str::to_string)
            .ok_or_else(|| unexpected(&url, "missing OpenEO-Identifier header"))?;
        info!("Created batch job {} ({})", job_id, title);
        Ok(job_id)
    }

    async fn start_job(&self, job_id: &str) -> Result<(), RetrievalError> {
        let url = self.endpoint(&format!("jobs/{job_id}/results"));
        self.session
            .send(&url, |c| c.post(&url).header("Authorization", &self.bearer))
            .await?;
        Ok(())
    }

    async fn wait_for_job(&self, job_id: &str) -> Result<(), RetrievalError> {
        let url = self.endpoint(&format!("jobs/{job_id}"));
        let started = Instant::now();
        let timeout = Duration::from_secs(self.config.job_timeout_secs);
        loop {
            let status = parse_job_status(&url, &self.get_json(&url).await?)?;
            debug!("Job {} is {}", job_id, status.as_str());
            match status {
                JobStatus::Finished => return Ok(()),
                s if s.is_terminal() => {
                    return Err(RetrievalError::JobFailed {
                        job_id: job_id.to_string(),
                        status: s.as_str().to_string(),
                    })
                }
                _ => {}
            }
            if started.elapsed() >= timeout {
                return Err(RetrievalError::JobTimeout {
                    job_id: job_id.to_string(),
                    waited_secs: started.elapsed().as_secs(),
                });
            }
            tokio::time::sleep(Duration::from_secs(self.config.poll_interval_secs)).await;
        }
    }

    async fn result_href(&self, job_id: &str) -> Result<String, RetrievalError> {
        let url = self.endpoint(&format!("jobs/{job_id}/results"));
        let results = self.get_json(&url).await?;
        pick_csv_asset(&url, &results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn band_names_are_truncated() {
        let description = json!({
            "cube:dimensions": {
                "bands": { "type": "bands", "values": ["B01", "B02", "B03", "SCL"] }
            }
        });
        let bands = parse_band_names("u", &description, 3).unwrap();
        assert_eq!(bands, vec!["B01", "B02", "B03"]);
    }

    #[test]
    fn missing_band_dimension_is_unexpected() {
        let err = parse_band_names("u", &json!({"id": "X"}), 15).unwrap_err();
        assert!(matches!(err, RetrievalError::UnexpectedResponse { .. }));
    }

    #[test]
    fn job_status_parsing() {
        assert_eq!(parse_job_status("u", &json!({"status": "running"})).unwrap(), JobStatus::Running);
        let error = parse_job_status("u", &json!({"status": "error"})).unwrap();
        assert!(error.is_terminal());
        assert!(!JobStatus::Queued.is_terminal());
        assert_eq!(JobStatus::parse("paused"), JobStatus::Other("paused".into()));
        assert!(parse_job_status("u", &json!({})).is_err());
    }

    #[test]
    fn csv_asset_is_preferred() {
        let results = json!({
            "assets": {
                "job-results.json": { "href": "https://x/meta.json", "type": "application/json" },
                "timeseries.csv": { "href": "https://x/ts.csv", "type": "text/csv" }
            }
        });
        assert_eq!(pick_csv_asset("u", &results).unwrap(), "https://x/ts.csv");
    }

    #[test]
    fn single_untyped_asset_is_used() {
        let results = json!({ "assets": { "out": { "href": "https://x/out" } } });
        assert_eq!(pick_csv_asset("u", &results).unwrap(), "https://x/out");
        assert!(pick_csv_asset("u", &json!({ "assets": {} })).is_err());
    }
}
