//! Sentinel-2 point statistics: plan windows past the last stored date, run
//! one openEO batch job per window and append the normalized rows.

use crate::config::Config;
use crate::{resolve_reservoir, today};
use chrono::NaiveDate;
use habs_core::error::{ConfigError, RetrievalError};
use habs_core::executor::{run_windows, RunOutcome, WindowRetrieval};
use habs_core::normalize::normalize;
use habs_core::observation::ObservationRecord;
use habs_core::openeo::OpenEoClient;
use habs_core::process_graph::{build_process_graph, AggregationRequest};
use habs_core::reservoir::{points_feature_collection, SamplePoint};
use habs_core::window::{plan_windows, ObservationWindow};
use habs_db::sink::default_start_date;
use habs_db::Database;
use log::{info, warn};
use serde_json::Value;

/// Per-invocation overrides of the configured defaults.
#[derive(Debug, Clone, Default)]
pub struct S2PointsArgs {
    pub reservoir_id: String,
    pub start: Option<NaiveDate>,
    pub end: Option<NaiveDate>,
    pub max_cloud_cover: Option<f64>,
    pub no_cloud_mask: bool,
    pub max_points: Option<usize>,
}

/// Retrieves one window of point statistics and hands it to the sink.
pub struct S2PointRetrieval<'a> {
    db: &'a Database,
    client: &'a OpenEoClient<'a>,
    reservoir_id: &'a str,
    points: &'a [SamplePoint],
    geometries: Value,
    bands: Vec<String>,
    max_cloud_cover: f64,
    cloud_mask: bool,
}

impl<'a> S2PointRetrieval<'a> {
    fn request(&self, window: ObservationWindow) -> AggregationRequest<'_> {
        AggregationRequest {
            collection: &self.client.config().collection,
            window,
            max_cloud_cover: self.max_cloud_cover,
            bands: &self.bands,
            cloud_mask: self.cloud_mask,
            geometries: &self.geometries,
        }
    }
}

impl WindowRetrieval for S2PointRetrieval<'_> {
    async fn retrieve(&mut self, window: &ObservationWindow) -> Result<usize, RetrievalError> {
        let graph = build_process_graph(&self.request(*window)).map_err(|e| RetrievalError::UnexpectedResponse {
            url: self.client.config().url.clone(),
            message: e.to_string(),
        })?;
        let title = format!("habs {} {}", self.reservoir_id, window);
        let raw = self.client.run_batch_csv(graph, &title).await?;

        let table = normalize(&raw, &self.bands, self.points, self.reservoir_id);
        if table.is_empty() {
            warn!("Window {} returned no usable rows", window);
            return Ok(0);
        }
        info!(
            "Window {} yielded {} rows at {} points, last observed {}",
            window,
            table.len(),
            ObservationRecord::point_count(&table.records),
            ObservationRecord::last_date(&table.records).map_or_else(|| "-".to_string(), |d| d.to_string())
        );
        self.db
            .append_observations(&table)
            .map_err(|e| RetrievalError::Persist {
                start: window.start,
                end: window.end,
                message: e.to_string(),
            })
    }
}

pub async fn run_s2_points(config: &Config, args: &S2PointsArgs) -> anyhow::Result<RunOutcome> {
    let db = config.open_database()?;
    let outcome = ingest(config, &db, args).await;
    db.close()?;
    outcome
}

async fn ingest(config: &Config, db: &Database, args: &S2PointsArgs) -> anyhow::Result<RunOutcome> {
    let reservoir = resolve_reservoir(db, &args.reservoir_id)?;
    let points = db.query_sample_points(&reservoir.reservoir_id)?;
    if points.is_empty() {
        return Err(ConfigError::NoSamplePoints(reservoir.reservoir_id).into());
    }

    let start = db.next_start_date(
        &config.tables.observations,
        &reservoir.reservoir_id,
        args.start,
        default_start_date(),
    )?;
    let end = args.end.unwrap_or_else(today);
    let max_points = args.max_points.unwrap_or(config.max_points_per_request);
    let plan = plan_windows(points.len(), max_points, start, end)?;
    if plan.is_empty() {
        info!(
            "Reservoir {} is up to date ({} is after {})",
            reservoir.reservoir_id, start, end
        );
        return Ok(RunOutcome::NothingToFetch);
    }
    info!(
        "Reservoir {} ({}): {} points, {}..={} in {} windows of ~{} days (step {})",
        reservoir.reservoir_id,
        reservoir.name,
        points.len(),
        start,
        end,
        plan.n_chunks,
        plan.t_delta,
        plan.step_length
    );

    let token = config.access_token()?;
    let session = config.http_session()?;
    let client = OpenEoClient::connect(&session, config.openeo.clone(), &token)?;
    let bands = client.describe_bands().await?;
    info!("Requesting bands {}", bands.join(", "));

    let mut retrieval = S2PointRetrieval {
        db,
        client: &client,
        reservoir_id: &reservoir.reservoir_id,
        points: &points,
        geometries: points_feature_collection(&points),
        bands,
        max_cloud_cover: args.max_cloud_cover.unwrap_or(config.max_cloud_cover),
        cloud_mask: config.cloud_mask && !args.no_cloud_mask,
    };
    // A graph that cannot be built for one window cannot be built for any.
    build_process_graph(&retrieval.request(plan.windows[0]))?;

    let outcome = run_windows(&mut retrieval, &plan, &config.retry).await;
    match &outcome {
        RunOutcome::Complete(report) => info!(
            "Completed {} windows, appended {} rows in {} attempts",
            report.completed.len(),
            report.rows(),
            report.attempts()
        ),
        RunOutcome::Partial(report) => warn!(
            "Skipped {} sub-windows; appended {} rows from {} others",
            report.skipped.len(),
            report.rows(),
            report.completed.len()
        ),
        RunOutcome::NothingToFetch => {}
    }
    let coverage = db.query_observation_coverage(&reservoir.reservoir_id)?;
    info!(
        "Reservoir {} now holds {} rows at {} points up to {}",
        coverage.reservoir_id,
        coverage.rows,
        coverage.points,
        coverage.last_date.map_or_else(|| "-".to_string(), |d| d.to_string())
    );
    Ok(outcome)
}
