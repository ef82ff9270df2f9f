//! Open-Meteo ingestion at a reservoir's centroid.

use crate::config::Config;
use crate::{resolve_reservoir, today};
use chrono::{Days, NaiveDate};
use habs_core::meteo::OpenMeteoClient;
use habs_db::sink::default_start_date;
use habs_db::Database;
use log::info;

/// Days the archive lags behind today.
pub const ARCHIVE_LAG_DAYS: u64 = 5;

fn archive_end() -> NaiveDate {
    let today = today();
    today.checked_sub_days(Days::new(ARCHIVE_LAG_DAYS)).unwrap_or(today)
}

/// Append archive days after the last stored date. Returns the rows written.
pub async fn run_meteo_history(
    config: &Config,
    reservoir_id: &str,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> anyhow::Result<usize> {
    let db = config.open_database()?;
    let written = history(config, &db, reservoir_id, start, end).await;
    db.close()?;
    written
}

async fn history(
    config: &Config,
    db: &Database,
    reservoir_id: &str,
    start: Option<NaiveDate>,
    end: Option<NaiveDate>,
) -> anyhow::Result<usize> {
    let reservoir = resolve_reservoir(db, reservoir_id)?;
    let start = db.next_start_date(&config.tables.meteo_history, reservoir_id, start, default_start_date())?;
    let end = end.unwrap_or_else(archive_end);
    if start > end {
        info!("Meteo history of {} is up to date ({} is after {})", reservoir_id, start, end);
        return Ok(0);
    }

    let session = config.http_session()?;
    let client = OpenMeteoClient::new(&session, config.meteo.clone());
    let series = client.history(reservoir.lat, reservoir.lon, start, end).await?;
    if series.is_empty() {
        info!("No meteo history returned for {}..={}", start, end);
        return Ok(0);
    }
    db.append_meteo_history(reservoir_id, &series)
}

/// Fetch a new forecast and replace the stored one. Returns the days stored.
pub async fn run_meteo_forecast(config: &Config, reservoir_id: &str, days: Option<u32>) -> anyhow::Result<usize> {
    let db = config.open_database()?;
    let written = forecast(config, &db, reservoir_id, days).await;
    db.close()?;
    written
}

async fn forecast(config: &Config, db: &Database, reservoir_id: &str, days: Option<u32>) -> anyhow::Result<usize> {
    let reservoir = resolve_reservoir(db, reservoir_id)?;
    let session = config.http_session()?;
    let client = OpenMeteoClient::new(&session, config.meteo.clone());
    let series = client
        .forecast(reservoir.lat, reservoir.lon, days.unwrap_or(config.meteo.forecast_days))
        .await?;
    if series.is_empty() {
        info!("Empty meteo forecast for {}; keeping the stored one", reservoir_id);
        return Ok(0);
    }
    db.replace_meteo_forecast(reservoir_id, today(), &series)
}

#[cfg(test)]
mod tests {
    use super::*;
    use habs_core::error::ConfigError;

    fn config(dir: &tempfile::TempDir) -> Config {
        let config = Config {
            database: dir.path().join("habs.sqlite"),
            cache_dir: None,
            ..Config::default()
        };
        let db = config.open_database().unwrap();
        db.load_reservoirs("reservoir_id,name,lat,lon,geometry_wkt\n42,Orlik,49.5,14.1,\n")
            .unwrap();
        db.close().unwrap();
        config
    }

    #[tokio::test]
    async fn history_past_requested_end_is_a_no_op() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir);
        let written = run_meteo_history(
            &config,
            "42",
            NaiveDate::from_ymd_opt(2023, 6, 2),
            NaiveDate::from_ymd_opt(2023, 6, 1),
        )
        .await
        .unwrap();
        assert_eq!(written, 0);
    }

    #[tokio::test]
    async fn unknown_reservoir_is_fatal() {
        let dir = tempfile::tempdir().unwrap();
        let config = config(&dir);
        let err = run_meteo_forecast(&config, "999", None).await.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ConfigError>(),
            Some(ConfigError::UnknownReservoir(..))
        ));
    }

    #[test]
    fn archive_end_trails_today() {
        assert_eq!((today() - archive_end()).num_days(), ARCHIVE_LAG_DAYS as i64);
    }
}
