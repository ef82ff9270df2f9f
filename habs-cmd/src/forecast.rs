//! Band forecast: daily reservoir mean of one band, joined with the stored
//! meteo history, fitted and predicted by the seasonal model.

use crate::config::Config;
use crate::resolve_reservoir;
use habs_core::error::validate_identifier;
use habs_core::observation::ForecastRow;
use habs_data::forecast::{forecast, ForecastFrame};
use habs_data::interpolation::{fill_gaps, DataPoint};
use habs_db::Database;
use log::info;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone)]
pub struct ForecastArgs {
    pub reservoir_id: String,
    pub band: String,
    pub periods: u32,
    pub interpolate: bool,
    pub output: Option<PathBuf>,
}

pub fn run_forecast(config: &Config, args: &ForecastArgs) -> anyhow::Result<Vec<ForecastRow>> {
    let db = config.open_database()?;
    let rows = forecast_band(&db, args);
    db.close()?;
    let rows = rows?;
    if let Some(path) = &args.output {
        write_csv(path, &rows)?;
        info!("Wrote {} forecast rows to {}", rows.len(), path.display());
    }
    Ok(rows)
}

fn forecast_band(db: &Database, args: &ForecastArgs) -> anyhow::Result<Vec<ForecastRow>> {
    let reservoir = resolve_reservoir(db, &args.reservoir_id)?;
    let band = validate_identifier(&args.band)?;
    let series = db.query_band_daily_mean(&reservoir.reservoir_id, band)?;
    if series.is_empty() {
        anyhow::bail!("no {} observations stored for reservoir {}", band, reservoir.reservoir_id);
    }

    let mut target: Vec<DataPoint> = series
        .iter()
        .map(|dv| DataPoint {
            date: dv.date,
            value: dv.value,
        })
        .collect();
    if args.interpolate {
        target = fill_gaps(&target);
    }
    let meteo = db.query_meteo_history(&reservoir.reservoir_id)?;
    let frame = ForecastFrame::merge(&target, &meteo);
    info!(
        "Forecasting {} for {} from {} days, frame columns: {}",
        band,
        reservoir.name,
        target.len(),
        frame.header().join(", ")
    );

    let rows = forecast(&frame, args.periods)?;
    db.write_forecast(&reservoir.reservoir_id, band, &rows)?;
    Ok(rows)
}

fn write_csv(path: &Path, rows: &[ForecastRow]) -> anyhow::Result<()> {
    let mut wtr = csv::Writer::from_path(path)?;
    for row in rows {
        wtr.serialize(row)?;
    }
    wtr.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use habs_core::normalize::NormalizedTable;
    use habs_core::observation::ObservationRecord;

    fn seeded_config(dir: &tempfile::TempDir, days: &[u32]) -> Config {
        let config = Config {
            database: dir.path().join("habs.sqlite"),
            cache_dir: None,
            ..Config::default()
        };
        let db = config.open_database().unwrap();
        db.load_reservoirs("reservoir_id,name,lat,lon,geometry_wkt\n42,Orlik,49.5,14.1,\n")
            .unwrap();
        let records = days
            .iter()
            .flat_map(|&d| {
                (0..2).map(move |pid| ObservationRecord {
                    reservoir_id: "42".to_string(),
                    pid,
                    date: NaiveDate::from_ymd_opt(2023, 6, d).unwrap(),
                    lat: 49.5,
                    lon: 14.1,
                    values: vec![0.1 + pid as f64 * 0.1],
                })
            })
            .collect();
        db.append_observations(&NormalizedTable {
            bands: vec!["B02".to_string()],
            records,
        })
        .unwrap();
        db.close().unwrap();
        config
    }

    fn args(output: Option<PathBuf>, interpolate: bool) -> ForecastArgs {
        ForecastArgs {
            reservoir_id: "42".to_string(),
            band: "B02".to_string(),
            periods: 3,
            interpolate,
            output,
        }
    }

    #[test]
    fn forecast_is_stored_and_written() {
        let dir = tempfile::tempdir().unwrap();
        let config = seeded_config(&dir, &[1, 2, 3, 4]);
        let out = dir.path().join("forecast.csv");
        let rows = run_forecast(&config, &args(Some(out.clone()), false)).unwrap();
        assert_eq!(rows.len(), 7);
        assert!((rows[0].yhat - 0.15).abs() < 1e-9);

        let csv = std::fs::read_to_string(&out).unwrap();
        assert_eq!(csv.lines().next(), Some("ds,yhat,yhat_lower,yhat_upper"));
        assert_eq!(csv.lines().count(), 8);

        let db = config.open_database().unwrap();
        assert_eq!(db.query_forecast("42", "B02").unwrap().len(), 7);
    }

    #[test]
    fn interpolation_fills_missing_days() {
        let dir = tempfile::tempdir().unwrap();
        let config = seeded_config(&dir, &[1, 5]);
        assert_eq!(run_forecast(&config, &args(None, false)).unwrap().len(), 5);
        assert_eq!(run_forecast(&config, &args(None, true)).unwrap().len(), 8);
    }

    #[test]
    fn unknown_band_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let config = seeded_config(&dir, &[1, 2]);
        let args = ForecastArgs {
            band: "B12".to_string(),
            ..args(None, false)
        };
        assert!(run_forecast(&config, &args).is_err());
    }
}
