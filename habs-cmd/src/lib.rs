//! Command implementations for the habs CLI.
//!
//! Each command opens the database and, where it talks to a remote service,
//! an HTTP session for its own duration; both are released when it returns.

use chrono::{Local, NaiveDate};
use clap::Subcommand;
use habs_core::error::ConfigError;
use habs_core::reservoir::Reservoir;
use habs_db::Database;
use habs_utils::dates::parse_date;
use std::path::PathBuf;

pub mod config;
pub mod forecast;
pub mod load;
pub mod meteo;
pub mod pipeline;
pub mod s2_points;

pub use config::Config;

fn date_arg(s: &str) -> Result<NaiveDate, String> {
    parse_date(s).map_err(|e| e.to_string())
}

#[derive(Subcommand)]
pub enum Command {
    /// Load reservoir metadata (reservoir_id,name,lat,lon,geometry_wkt)
    LoadReservoirs {
        #[arg(long)]
        csv: PathBuf,
    },

    /// Load sample points (reservoir_id,pid,lat,lon)
    LoadPoints {
        #[arg(long)]
        csv: PathBuf,
    },

    /// Fetch Sentinel-2 band means at the sample points of a reservoir
    S2Points {
        #[arg(short = 'r', long)]
        reservoir_id: String,

        /// First date to fetch when nothing is stored yet (YYYY-MM-DD)
        #[arg(long, value_parser = date_arg)]
        start: Option<NaiveDate>,

        /// Last date to fetch, defaults to today (YYYY-MM-DD)
        #[arg(long, value_parser = date_arg)]
        end: Option<NaiveDate>,

        /// Maximum scene cloud cover in percent
        #[arg(long)]
        max_cloud_cover: Option<f64>,

        /// Skip the SCL water mask
        #[arg(long)]
        no_cloud_mask: bool,

        /// Point-days allowed in a single request
        #[arg(long)]
        max_points: Option<usize>,
    },

    /// Append Open-Meteo archive days after the last stored date
    MeteoHistory {
        #[arg(short = 'r', long)]
        reservoir_id: String,

        #[arg(long, value_parser = date_arg)]
        start: Option<NaiveDate>,

        #[arg(long, value_parser = date_arg)]
        end: Option<NaiveDate>,
    },

    /// Replace the stored meteo forecast of a reservoir
    MeteoForecast {
        #[arg(short = 'r', long)]
        reservoir_id: String,

        /// Forecast horizon in days (1-16)
        #[arg(long)]
        days: Option<u32>,
    },

    /// Forecast the daily mean of one band
    Forecast {
        #[arg(short = 'r', long)]
        reservoir_id: String,

        #[arg(short = 'b', long)]
        band: String,

        /// Days to predict past the last observation
        #[arg(long, default_value_t = habs_data::forecast::DEFAULT_PERIODS)]
        periods: u32,

        /// Linearly fill missing days before fitting
        #[arg(long)]
        interpolate: bool,

        /// Also write the forecast to this CSV file
        #[arg(short = 'o', long)]
        output: Option<PathBuf>,
    },

    /// Fetch Sentinel-2 points, meteo history and meteo forecast in turn
    Run {
        #[arg(short = 'r', long)]
        reservoir_id: String,
    },
}

pub async fn run(command: Command, config: &Config) -> anyhow::Result<()> {
    match command {
        Command::LoadReservoirs { csv } => load::run_load_reservoirs(config, &csv).map(|_| ()),
        Command::LoadPoints { csv } => load::run_load_points(config, &csv).map(|_| ()),
        Command::S2Points {
            reservoir_id,
            start,
            end,
            max_cloud_cover,
            no_cloud_mask,
            max_points,
        } => {
            let args = s2_points::S2PointsArgs {
                reservoir_id,
                start,
                end,
                max_cloud_cover,
                no_cloud_mask,
                max_points,
            };
            s2_points::run_s2_points(config, &args).await.map(|_| ())
        }
        Command::MeteoHistory {
            reservoir_id,
            start,
            end,
        } => meteo::run_meteo_history(config, &reservoir_id, start, end).await.map(|_| ()),
        Command::MeteoForecast { reservoir_id, days } => {
            meteo::run_meteo_forecast(config, &reservoir_id, days).await.map(|_| ())
        }
        Command::Forecast {
            reservoir_id,
            band,
            periods,
            interpolate,
            output,
        } => {
            let args = forecast::ForecastArgs {
                reservoir_id,
                band,
                periods,
                interpolate,
                output,
            };
            forecast::run_forecast(config, &args).map(|_| ())
        }
        Command::Run { reservoir_id } => pipeline::run_pipeline(config, &reservoir_id).await,
    }
}

/// Look a reservoir up, failing with a configuration error if it is unknown.
pub(crate) fn resolve_reservoir(db: &Database, reservoir_id: &str) -> anyhow::Result<Reservoir> {
    db.query_reservoir(reservoir_id)?.ok_or_else(|| {
        ConfigError::UnknownReservoir(reservoir_id.to_string(), db.tables().reservoirs.clone()).into()
    })
}

pub(crate) fn today() -> NaiveDate {
    Local::now().date_naive()
}
