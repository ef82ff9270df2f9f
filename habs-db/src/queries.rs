//! Typed read queries.

use crate::models::{DateValue, ObservationCoverage};
use crate::schema::quote;
use crate::Database;
use chrono::NaiveDate;
use habs_core::meteo::{MeteoDay, MeteoSeries};
use habs_core::observation::ForecastRow;
use habs_core::reservoir::{Reservoir, SamplePoint};
use habs_utils::dates::parse_date;
use rusqlite::{params, Connection, OptionalExtension};

fn date_column(value: Option<String>) -> anyhow::Result<Option<NaiveDate>> {
    Ok(value.as_deref().map(parse_date).transpose()?)
}

pub(crate) fn table_exists(conn: &Connection, table: &str) -> anyhow::Result<bool> {
    let count: i64 = conn.query_row(
        "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
        [table],
        |row| row.get(0),
    )?;
    Ok(count > 0)
}

pub(crate) fn table_columns(conn: &Connection, table: &str) -> anyhow::Result<Vec<String>> {
    let mut stmt = conn.prepare("SELECT name FROM pragma_table_info(?1)")?;
    let columns = stmt
        .query_map([table], |row| row.get(0))?
        .collect::<Result<Vec<String>, _>>()?;
    Ok(columns)
}

pub(crate) fn last_date(conn: &Connection, table: &str, reservoir_id: &str) -> anyhow::Result<Option<NaiveDate>> {
    if !table_exists(conn, table)? {
        return Ok(None);
    }
    let max: Option<String> = conn.query_row(
        &format!("SELECT MAX(date) FROM {} WHERE reservoir_id = ?1", quote(table)?),
        [reservoir_id],
        |row| row.get(0),
    )?;
    date_column(max)
}

impl Database {
    pub fn query_reservoirs(&self) -> anyhow::Result<Vec<Reservoir>> {
        let conn = self.conn.borrow();
        let mut stmt = conn.prepare(&format!(
            "SELECT reservoir_id, name, lat, lon, geometry FROM {} ORDER BY reservoir_id",
            quote(&self.tables.reservoirs)?
        ))?;
        let rows = stmt
            .query_map([], |row| {
                Ok(Reservoir {
                    reservoir_id: row.get(0)?,
                    name: row.get(1)?,
                    lat: row.get(2)?,
                    lon: row.get(3)?,
                    geometry_wkt: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn query_reservoir(&self, reservoir_id: &str) -> anyhow::Result<Option<Reservoir>> {
        let conn = self.conn.borrow();
        let reservoir = conn
            .query_row(
                &format!(
                    "SELECT reservoir_id, name, lat, lon, geometry FROM {} WHERE reservoir_id = ?1",
                    quote(&self.tables.reservoirs)?
                ),
                [reservoir_id],
                |row| {
                    Ok(Reservoir {
                        reservoir_id: row.get(0)?,
                        name: row.get(1)?,
                        lat: row.get(2)?,
                        lon: row.get(3)?,
                        geometry_wkt: row.get::<_, Option<String>>(4)?.unwrap_or_default(),
                    })
                },
            )
            .optional()?;
        Ok(reservoir)
    }

    /// Sample points of a reservoir, ordered by `pid`.
    pub fn query_sample_points(&self, reservoir_id: &str) -> anyhow::Result<Vec<SamplePoint>> {
        let conn = self.conn.borrow();
        let mut stmt = conn.prepare(&format!(
            "SELECT pid, lat, lon FROM {} WHERE reservoir_id = ?1 ORDER BY pid",
            quote(&self.tables.sample_points)?
        ))?;
        let points = stmt
            .query_map([reservoir_id], |row| {
                Ok(SamplePoint {
                    pid: row.get(0)?,
                    lat: row.get(1)?,
                    lon: row.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        log::debug!("Reservoir {} has {} sample points", reservoir_id, points.len());
        Ok(points)
    }

    /// Latest stored date of a reservoir in `table`; `None` if the table is
    /// missing or has no rows for it.
    pub fn last_date(&self, table: &str, reservoir_id: &str) -> anyhow::Result<Option<NaiveDate>> {
        last_date(&self.conn.borrow(), table, reservoir_id)
    }

    /// Daily mean of one band over all sample points of a reservoir.
    pub fn query_band_daily_mean(&self, reservoir_id: &str, band: &str) -> anyhow::Result<Vec<DateValue>> {
        let conn = self.conn.borrow();
        let table = &self.tables.observations;
        if !table_exists(&conn, table)? {
            return Ok(Vec::new());
        }
        if !table_columns(&conn, table)?.iter().any(|c| c == band) {
            anyhow::bail!("table {} has no band column {}", table, band);
        }
        let mut stmt = conn.prepare(&format!(
            "SELECT date, AVG({band}) FROM {table}
             WHERE reservoir_id = ?1 AND {band} IS NOT NULL
             GROUP BY date ORDER BY date",
            band = quote(band)?,
            table = quote(table)?,
        ))?;
        let rows = stmt
            .query_map([reservoir_id], |row| Ok((row.get::<_, String>(0)?, row.get::<_, f64>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        let series = rows
            .into_iter()
            .map(|(date, value)| Ok(DateValue { date: parse_date(&date)?, value }))
            .collect::<anyhow::Result<Vec<_>>>()?;
        log::info!("query_band_daily_mean returned {} days of {}", series.len(), band);
        Ok(series)
    }

    /// Stored meteo history of a reservoir, every feature column in table order.
    pub fn query_meteo_history(&self, reservoir_id: &str) -> anyhow::Result<MeteoSeries> {
        let conn = self.conn.borrow();
        let table = &self.tables.meteo_history;
        if !table_exists(&conn, table)? {
            return Ok(MeteoSeries::default());
        }
        let features: Vec<String> = table_columns(&conn, table)?
            .into_iter()
            .filter(|c| c != "reservoir_id" && c != "date")
            .collect();
        let mut select = vec!["date".to_string()];
        for f in &features {
            select.push(quote(f)?);
        }
        let mut stmt = conn.prepare(&format!(
            "SELECT {} FROM {} WHERE reservoir_id = ?1 ORDER BY date",
            select.join(", "),
            quote(table)?
        ))?;
        let n = features.len();
        let rows = stmt
            .query_map([reservoir_id], |row| {
                let date: String = row.get(0)?;
                let values = (1..=n)
                    .map(|i| row.get::<_, Option<f64>>(i))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok((date, values))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        let days = rows
            .into_iter()
            .map(|(date, values)| Ok(MeteoDay { date: parse_date(&date)?, values }))
            .collect::<anyhow::Result<Vec<_>>>()?;
        Ok(MeteoSeries { features, days })
    }

    pub fn query_forecast(&self, reservoir_id: &str, band: &str) -> anyhow::Result<Vec<ForecastRow>> {
        let conn = self.conn.borrow();
        let mut stmt = conn.prepare(&format!(
            "SELECT ds, yhat, yhat_lower, yhat_upper FROM {}
             WHERE reservoir_id = ?1 AND band = ?2 ORDER BY ds",
            quote(&self.tables.forecast)?
        ))?;
        let rows = stmt
            .query_map(params![reservoir_id, band], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, f64>(1)?,
                    row.get::<_, f64>(2)?,
                    row.get::<_, f64>(3)?,
                ))
            })?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(ds, yhat, yhat_lower, yhat_upper)| {
                Ok(ForecastRow {
                    ds: parse_date(&ds)?,
                    yhat,
                    yhat_lower,
                    yhat_upper,
                })
            })
            .collect()
    }

    /// Row, point and date coverage of a reservoir in the observation table.
    pub fn query_observation_coverage(&self, reservoir_id: &str) -> anyhow::Result<ObservationCoverage> {
        let conn = self.conn.borrow();
        let table = &self.tables.observations;
        if !table_exists(&conn, table)? {
            return Ok(ObservationCoverage {
                reservoir_id: reservoir_id.to_string(),
                rows: 0,
                points: 0,
                first_date: None,
                last_date: None,
            });
        }
        let (rows, points, first, last): (i64, i64, Option<String>, Option<String>) = conn.query_row(
            &format!(
                "SELECT COUNT(*), COUNT(DISTINCT PID), MIN(date), MAX(date) FROM {} WHERE reservoir_id = ?1",
                quote(table)?
            ),
            [reservoir_id],
            |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
        )?;
        Ok(ObservationCoverage {
            reservoir_id: reservoir_id.to_string(),
            rows,
            points,
            first_date: date_column(first)?,
            last_date: date_column(last)?,
        })
    }
}
