//! Seasonal forecast of a daily target series.
//!
//! A flat level plus a day-of-week effect, fitted separately for November to
//! March and for the rest of the year. Predictions are floored at zero and
//! carry an 80% interval from the residual spread.
//!
//! Meteo regressors are joined into the frame so the fitted data can be
//! exported with its drivers; the model itself does not use them.

use crate::interpolation::DataPoint;
use chrono::{Datelike, Days, NaiveDate};
use habs_core::meteo::MeteoSeries;
use habs_core::observation::ForecastRow;
use habs_utils::dates::is_on_season;
use serde::Serialize;
use std::collections::BTreeMap;
use thiserror::Error;

/// Two-sided 80% normal quantile.
const Z_80: f64 = 1.281_551_565_545;
/// Lowest value a prediction may take.
pub const FLOOR: f64 = 0.0;
pub const DEFAULT_PERIODS: u32 = 20;

#[derive(Debug, Error, PartialEq)]
pub enum ForecastError {
    #[error("need at least 2 observed values to fit, got {0}")]
    NotEnoughData(usize),
}

/// One day of the merged frame.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FrameRow {
    pub ds: NaiveDate,
    pub y: Option<f64>,
    pub regressors: Vec<Option<f64>>,
}

/// Target series outer-joined with meteo regressors on date.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ForecastFrame {
    pub regressors: Vec<String>,
    pub rows: Vec<FrameRow>,
}

impl ForecastFrame {
    /// Outer join of `target` and `meteo` on date, sorted by date.
    pub fn merge(target: &[DataPoint], meteo: &MeteoSeries) -> Self {
        let width = meteo.features.len();
        let mut rows: BTreeMap<NaiveDate, FrameRow> = BTreeMap::new();
        for p in target {
            rows.entry(p.date)
                .or_insert_with(|| FrameRow {
                    ds: p.date,
                    y: None,
                    regressors: vec![None; width],
                })
                .y = Some(p.value);
        }
        for day in &meteo.days {
            let mut values = day.values.clone();
            values.resize(width, None);
            rows.entry(day.date)
                .or_insert_with(|| FrameRow {
                    ds: day.date,
                    y: None,
                    regressors: vec![None; width],
                })
                .regressors = values;
        }
        Self {
            regressors: meteo.features.clone(),
            rows: rows.into_values().collect(),
        }
    }

    /// Rows with an observed target.
    pub fn observed(&self) -> impl Iterator<Item = (NaiveDate, f64)> + '_ {
        self.rows.iter().filter_map(|r| r.y.map(|y| (r.ds, y)))
    }

    /// CSV header: `ds, y` followed by the regressor names.
    pub fn header(&self) -> Vec<String> {
        let mut header = vec!["ds".to_string(), "y".to_string()];
        header.extend(self.regressors.iter().cloned());
        header
    }
}

fn season_index(date: &NaiveDate) -> usize {
    usize::from(!is_on_season(date))
}

/// Fitted level and weekly effects.
#[derive(Debug, Clone, PartialEq)]
pub struct SeasonalModel {
    pub level: f64,
    /// Day-of-week offsets (Monday first), on-season then off-season.
    pub weekly: [[f64; 7]; 2],
    /// Standard deviation of in-sample residuals.
    pub sigma: f64,
    history: Vec<NaiveDate>,
}

impl SeasonalModel {
    pub fn fit(frame: &ForecastFrame) -> Result<Self, ForecastError> {
        let observed: Vec<(NaiveDate, f64)> = frame.observed().collect();
        if observed.len() < 2 {
            return Err(ForecastError::NotEnoughData(observed.len()));
        }
        let level = observed.iter().map(|(_, y)| y).sum::<f64>() / observed.len() as f64;

        let mut sums = [[0.0; 7]; 2];
        let mut counts = [[0usize; 7]; 2];
        for (ds, y) in &observed {
            let (s, d) = (season_index(ds), ds.weekday().num_days_from_monday() as usize);
            sums[s][d] += y - level;
            counts[s][d] += 1;
        }
        let mut weekly = [[0.0; 7]; 2];
        for s in 0..2 {
            for d in 0..7 {
                if counts[s][d] > 0 {
                    weekly[s][d] = sums[s][d] / counts[s][d] as f64;
                }
            }
        }

        let mut model = Self {
            level,
            weekly,
            sigma: 0.0,
            history: observed.iter().map(|(ds, _)| *ds).collect(),
        };
        let sq: f64 = observed
            .iter()
            .map(|(ds, y)| (y - model.mean_at(ds)).powi(2))
            .sum();
        model.sigma = (sq / (observed.len() - 1) as f64).sqrt();
        log::info!(
            "Fitted level {:.4} with residual sigma {:.4} on {} days",
            model.level,
            model.sigma,
            observed.len()
        );
        Ok(model)
    }

    fn mean_at(&self, ds: &NaiveDate) -> f64 {
        self.level + self.weekly[season_index(ds)][ds.weekday().num_days_from_monday() as usize]
    }

    pub fn predict_at(&self, ds: NaiveDate) -> ForecastRow {
        let mean = self.mean_at(&ds);
        let half_width = Z_80 * self.sigma;
        ForecastRow {
            ds,
            yhat: mean.max(FLOOR),
            yhat_lower: (mean - half_width).max(FLOOR),
            yhat_upper: (mean + half_width).max(FLOOR),
        }
    }

    /// Predictions over the fitted history followed by `periods` future days.
    pub fn predict(&self, periods: u32) -> Vec<ForecastRow> {
        let mut rows: Vec<ForecastRow> = self.history.iter().map(|ds| self.predict_at(*ds)).collect();
        if let Some(last) = self.history.last() {
            rows.extend(
                (1..=u64::from(periods))
                    .filter_map(|i| last.checked_add_days(Days::new(i)))
                    .map(|ds| self.predict_at(ds)),
            );
        }
        rows
    }
}

/// Fit on `frame` and predict history plus `periods` days.
pub fn forecast(frame: &ForecastFrame, periods: u32) -> Result<Vec<ForecastRow>, ForecastError> {
    Ok(SeasonalModel::fit(frame)?.predict(periods))
}
