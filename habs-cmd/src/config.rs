//! Run configuration, loaded from an optional JSON file.
//!
//! Every field has a default, so a partial file only overrides what it names:
//!
//! ```json
//! { "database": "habs.sqlite", "max_cloud_cover": 20, "openeo": { "band_count": 15 } }
//! ```

use habs_core::error::ConfigError;
use habs_core::executor::RetryPolicy;
use habs_core::meteo::MeteoConfig;
use habs_core::openeo::{OpenEoConfig, TOKEN_ENV};
use habs_core::session::{HttpRetryPolicy, HttpSession};
use habs_db::{Database, TableNames};
use log::info;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// SQLite database file.
    pub database: PathBuf,
    pub tables: TableNames,
    pub openeo: OpenEoConfig,
    /// Scenes above this cloud cover (percent) are not loaded.
    pub max_cloud_cover: f64,
    pub cloud_mask: bool,
    /// Point-days a single aggregation request may cover.
    pub max_points_per_request: usize,
    pub retry: RetryPolicy,
    pub http: HttpRetryPolicy,
    pub meteo: MeteoConfig,
    /// HTTP response cache; `null` disables caching.
    pub cache_dir: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database: PathBuf::from("habs.sqlite"),
            tables: TableNames::default(),
            openeo: OpenEoConfig::default(),
            max_cloud_cover: 30.0,
            cloud_mask: true,
            max_points_per_request: 5000,
            retry: RetryPolicy::default(),
            http: HttpRetryPolicy::default(),
            meteo: MeteoConfig::default(),
            cache_dir: Some(PathBuf::from(".cache")),
        }
    }
}

impl Config {
    /// Defaults, overridden by `path` when given.
    pub fn load(path: Option<&Path>) -> anyhow::Result<Self> {
        let config = match path {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                let text = std::fs::read_to_string(path)
                    .map_err(|e| anyhow::anyhow!("failed to read config {}: {}", path.display(), e))?;
                serde_json::from_str(&text)
                    .map_err(|e| anyhow::anyhow!("invalid config {}: {}", path.display(), e))?
            }
            None => Self::default(),
        };
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.tables.validate()?;
        if self.max_points_per_request == 0 {
            return Err(ConfigError::Invalid("max_points_per_request must be positive".into()));
        }
        if !(0.0..=100.0).contains(&self.max_cloud_cover) {
            return Err(ConfigError::Invalid(format!(
                "max_cloud_cover {} is outside 0..=100",
                self.max_cloud_cover
            )));
        }
        if self.retry.max_attempts == 0 || self.retry.sub_window_days == 0 {
            return Err(ConfigError::Invalid("retry policy needs at least one attempt and one day".into()));
        }
        if self.meteo.features.is_empty() {
            return Err(ConfigError::Invalid("no meteo features configured".into()));
        }
        Ok(())
    }

    /// OpenEO access token from the environment.
    pub fn access_token(&self) -> Result<String, ConfigError> {
        std::env::var(TOKEN_ENV)
            .ok()
            .filter(|t| !t.trim().is_empty())
            .ok_or(ConfigError::MissingToken(TOKEN_ENV))
    }

    pub fn open_database(&self) -> anyhow::Result<Database> {
        Database::open(&self.database, self.tables.clone())
    }

    /// A fresh HTTP session for one command.
    pub fn http_session(&self) -> anyhow::Result<HttpSession> {
        Ok(HttpSession::new(self.http, self.cache_dir.as_deref())?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_documented_values() {
        let config = Config::default();
        assert_eq!(config.tables.reservoirs, "water_reservoirs");
        assert_eq!(config.tables.observations, "s2_points_eo_data");
        assert_eq!(config.max_points_per_request, 5000);
        assert_eq!(config.max_cloud_cover, 30.0);
        assert_eq!(config.retry.max_attempts, 5);
        assert_eq!(config.meteo.timezone, "GMT");
        assert_eq!(config.meteo.forecast_days, 16);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn partial_file_overrides_named_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{ "max_cloud_cover": 20, "tables": {{ "observations": "s2_obs" }}, "retry": {{ "backoff": 0.5 }} }}"#
        )
        .unwrap();
        let config = Config::load(Some(file.path())).unwrap();
        assert_eq!(config.max_cloud_cover, 20.0);
        assert_eq!(config.tables.observations, "s2_obs");
        assert_eq!(config.tables.reservoirs, "water_reservoirs");
        assert_eq!(config.retry.backoff, std::time::Duration::from_millis(500));
        assert_eq!(config.retry.max_attempts, 5);
    }

    #[test]
    fn invalid_values_are_config_errors() {
        let config = Config {
            max_points_per_request: 0,
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::Invalid(_))));
        let config = Config {
            tables: TableNames {
                observations: "1bad".to_string(),
                ..TableNames::default()
            },
            ..Config::default()
        };
        assert!(matches!(config.validate(), Err(ConfigError::InvalidIdentifier(_))));
    }

    #[test]
    fn unreadable_file_is_an_error() {
        assert!(Config::load(Some(Path::new("/nonexistent/habs.json"))).is_err());
    }
}
