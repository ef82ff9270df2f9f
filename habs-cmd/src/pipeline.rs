//! The full ingestion run for one reservoir.

use crate::config::Config;
use crate::meteo::{run_meteo_forecast, run_meteo_history};
use crate::s2_points::{run_s2_points, S2PointsArgs};
use habs_core::executor::RunOutcome;
use log::{info, warn};

/// Sentinel-2 points, then meteo history, then meteo forecast.
///
/// A partial Sentinel-2 run does not stop the meteo steps; any error does.
pub async fn run_pipeline(config: &Config, reservoir_id: &str) -> anyhow::Result<()> {
    let args = S2PointsArgs {
        reservoir_id: reservoir_id.to_string(),
        ..S2PointsArgs::default()
    };
    match run_s2_points(config, &args).await? {
        RunOutcome::NothingToFetch => info!("Sentinel-2 data of {} is up to date", reservoir_id),
        RunOutcome::Complete(report) => info!("Sentinel-2: {} rows appended", report.rows()),
        RunOutcome::Partial(report) => warn!(
            "Sentinel-2: {} rows appended, {} sub-windows skipped",
            report.rows(),
            report.skipped.len()
        ),
    }

    let history = run_meteo_history(config, reservoir_id, None, None).await?;
    info!("Meteo history: {} days appended", history);

    let forecast = run_meteo_forecast(config, reservoir_id, None).await?;
    info!("Meteo forecast: {} days stored", forecast);
    Ok(())
}
