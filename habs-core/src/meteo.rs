//! Daily weather series from the Open-Meteo archive and forecast APIs.
//!
//! Values are kept in the order the features were requested; Open-Meteo
//! reports gaps as `null`, which stay as `None`.

use crate::error::RetrievalError;
use chrono::NaiveDate;
use habs_utils::dates::parse_date_prefix;
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[cfg(feature = "api")]
use crate::{cache::CacheExpiry, session::HttpSession};
#[cfg(feature = "api")]
use habs_utils::dates::format_date;
#[cfg(feature = "api")]
use log::info;
#[cfg(feature = "api")]
use std::time::Duration;

/// The forecast endpoint serves at most this many days.
pub const MAX_FORECAST_DAYS: u32 = 16;

pub fn default_features() -> Vec<String> {
    [
        "weather_code",
        "temperature_2m_max",
        "temperature_2m_min",
        "daylight_duration",
        "sunshine_duration",
        "precipitation_sum",
        "wind_speed_10m_max",
        "wind_direction_10m_dominant",
        "shortwave_radiation_sum",
    ]
    .iter()
    .map(|s| s.to_string())
    .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MeteoConfig {
    pub archive_url: String,
    pub forecast_url: String,
    pub features: Vec<String>,
    pub timezone: String,
    pub forecast_days: u32,
    /// Cache lifetime of forecast responses; archive responses never expire.
    pub forecast_cache_secs: u64,
}

impl Default for MeteoConfig {
    fn default() -> Self {
        Self {
            archive_url: "https://archive-api.open-meteo.com/v1/archive".to_string(),
            forecast_url: "https://api.open-meteo.com/v1/forecast".to_string(),
            features: default_features(),
            timezone: "GMT".to_string(),
            forecast_days: MAX_FORECAST_DAYS,
            forecast_cache_secs: 3600,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MeteoDay {
    pub date: NaiveDate,
    pub values: Vec<Option<f64>>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct MeteoSeries {
    pub features: Vec<String>,
    pub days: Vec<MeteoDay>,
}

impl MeteoSeries {
    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }

    /// Column index of a feature.
    pub fn feature_index(&self, name: &str) -> Option<usize> {
        self.features.iter().position(|f| f == name)
    }

    /// Parse the `daily` block of an Open-Meteo response.
    ///
    /// A response without a `daily` block is treated as an empty series.
    pub fn from_response(url: &str, body: &Value, features: &[String]) -> Result<Self, RetrievalError> {
        let Some(daily) = body.get("daily") else {
            if let Some(reason) = body.get("reason").and_then(Value::as_str) {
                return Err(RetrievalError::UnexpectedResponse {
                    url: url.to_string(),
                    message: reason.to_string(),
                });
            }
            return Ok(Self {
                features: features.to_vec(),
                days: Vec::new(),
            });
        };
        let times = daily
            .get("time")
            .and_then(Value::as_array)
            .ok_or_else(|| RetrievalError::UnexpectedResponse {
                url: url.to_string(),
                message: "daily block has no time axis".to_string(),
            })?;
        let columns: Vec<&[Value]> = features
            .iter()
            .map(|f| {
                daily
                    .get(f)
                    .and_then(Value::as_array)
                    .map(Vec::as_slice)
                    .unwrap_or(&[])
            })
            .collect();

        let mut days = Vec::with_capacity(times.len());
        for (i, t) in times.iter().enumerate() {
            let Some(date) = t.as_str().and_then(|s| parse_date_prefix(s).ok()) else {
                continue;
            };
            let values = columns
                .iter()
                .map(|col| col.get(i).and_then(Value::as_f64))
                .collect();
            days.push(MeteoDay { date, values });
        }
        days.sort_by_key(|d| d.date);
        Ok(Self {
            features: features.to_vec(),
            days,
        })
    }
}

#[cfg(feature = "api")]
pub struct OpenMeteoClient<'s> {
    session: &'s HttpSession,
    config: MeteoConfig,
}

#[cfg(feature = "api")]
impl<'s> OpenMeteoClient<'s> {
    pub fn new(session: &'s HttpSession, config: MeteoConfig) -> Self {
        Self { session, config }
    }

    pub fn config(&self) -> &MeteoConfig {
        &self.config
    }

    fn url(&self, base: &str, params: &[(&str, String)]) -> Result<String, RetrievalError> {
        reqwest::Url::parse_with_params(base, params)
            .map(String::from)
            .map_err(|e| RetrievalError::UnexpectedResponse {
                url: base.to_string(),
                message: format!("invalid URL: {e}"),
            })
    }

    async fn fetch(&self, url: &str, expiry: CacheExpiry) -> Result<MeteoSeries, RetrievalError> {
        let body = self.session.get_text(url, expiry).await?;
        let json: Value = serde_json::from_str(&body).map_err(|e| RetrievalError::UnexpectedResponse {
            url: url.to_string(),
            message: format!("invalid JSON: {e}"),
        })?;
        MeteoSeries::from_response(url, &json, &self.config.features)
    }

    /// Daily history for `[start, end]` at a location.
    pub async fn history(
        &self,
        lat: f64,
        lon: f64,
        start: NaiveDate,
        end: NaiveDate,
    ) -> Result<MeteoSeries, RetrievalError> {
        let url = self.url(
            &self.config.archive_url,
            &[
                ("latitude", lat.to_string()),
                ("longitude", lon.to_string()),
                ("start_date", format_date(&start)),
                ("end_date", format_date(&end)),
                ("daily", self.config.features.join(",")),
                ("timezone", self.config.timezone.clone()),
            ],
        )?;
        info!("Fetching meteo history {}..={} at ({}, {})", start, end, lat, lon);
        self.fetch(&url, CacheExpiry::Never).await
    }

    /// Daily forecast for the next `days` days (clamped to 1..=16).
    pub async fn forecast(&self, lat: f64, lon: f64, days: u32) -> Result<MeteoSeries, RetrievalError> {
        let days = days.clamp(1, MAX_FORECAST_DAYS);
        let url = self.url(
            &self.config.forecast_url,
            &[
                ("latitude", lat.to_string()),
                ("longitude", lon.to_string()),
                ("daily", self.config.features.join(",")),
                ("timezone", self.config.timezone.clone()),
                ("forecast_days", days.to_string()),
            ],
        )?;
        info!("Fetching {}-day meteo forecast at ({}, {})", days, lat, lon);
        let expiry = CacheExpiry::After(Duration::from_secs(self.config.forecast_cache_secs));
        self.fetch(&url, expiry).await
    }
}
