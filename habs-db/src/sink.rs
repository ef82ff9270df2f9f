//! Append-only persistence of ingested series.
//!
//! A reservoir's series only grows forward: every append skips rows dated at
//! or before the last date already stored for that reservoir, and each batch
//! is written in a single transaction.

use crate::queries::{last_date, table_columns};
use crate::schema::{meteo_table_sql, observation_table_sql, quote};
use crate::Database;
use chrono::{Days, NaiveDate};
use habs_core::meteo::MeteoSeries;
use habs_core::normalize::NormalizedTable;
use habs_core::observation::ForecastRow;
use habs_utils::dates::format_date;
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection};
use std::collections::HashMap;

/// First date fetched for a reservoir with no stored history.
pub fn default_start_date() -> NaiveDate {
    NaiveDate::from_ymd_opt(2015, 6, 1).unwrap_or_default()
}

/// Add REAL columns that an existing table lacks.
fn ensure_columns(conn: &Connection, table: &str, columns: &[String]) -> anyhow::Result<()> {
    let existing = table_columns(conn, table)?;
    for column in columns.iter().filter(|c| !existing.contains(c)) {
        log::info!("Adding column {} to {}", column, table);
        conn.execute(
            &format!("ALTER TABLE {} ADD COLUMN {} REAL", quote(table)?, quote(column)?),
            [],
        )?;
    }
    Ok(())
}

fn placeholders(n: usize) -> String {
    (1..=n).map(|i| format!("?{i}")).collect::<Vec<_>>().join(", ")
}

impl Database {
    /// Date the next retrieval for `reservoir_id` should start from.
    ///
    /// The day after the last stored row when `table` has rows for the
    /// reservoir, otherwise `requested` or `default_start`.
    pub fn next_start_date(
        &self,
        table: &str,
        reservoir_id: &str,
        requested: Option<NaiveDate>,
        default_start: NaiveDate,
    ) -> anyhow::Result<NaiveDate> {
        match self.last_date(table, reservoir_id)? {
            Some(last) => last
                .checked_add_days(Days::new(1))
                .ok_or_else(|| anyhow::anyhow!("no date after {}", last)),
            None => Ok(requested.unwrap_or(default_start)),
        }
    }

    /// Append normalized Sentinel-2 records to the observation table.
    ///
    /// Returns the number of rows written.
    pub fn append_observations(&self, batch: &NormalizedTable) -> anyhow::Result<usize> {
        if batch.is_empty() {
            return Ok(0);
        }
        let table = self.tables.observations.clone();
        let mut conn = self.conn.borrow_mut();
        let tx = conn.transaction()?;
        tx.execute_batch(&observation_table_sql(&table, &batch.bands)?)?;
        ensure_columns(&tx, &table, &batch.bands)?;

        let mut columns = vec!["reservoir_id".to_string(), "PID".into(), "date".into(), "lat".into(), "lon".into()];
        for band in &batch.bands {
            columns.push(quote(band)?);
        }
        columns.push("geometry".into());
        let sql = format!(
            "INSERT OR IGNORE INTO {} ({}) VALUES ({})",
            quote(&table)?,
            columns.join(", "),
            placeholders(columns.len())
        );

        let mut last_stored: HashMap<&str, Option<NaiveDate>> = HashMap::new();
        let mut written = 0usize;
        let mut skipped = 0usize;
        {
            let mut stmt = tx.prepare(&sql)?;
            for record in &batch.records {
                let last = match last_stored.get(record.reservoir_id.as_str()) {
                    Some(last) => *last,
                    None => {
                        let last = last_date(&tx, &table, &record.reservoir_id)?;
                        last_stored.insert(record.reservoir_id.as_str(), last);
                        last
                    }
                };
                if last.is_some_and(|last| record.date <= last) {
                    skipped += 1;
                    continue;
                }
                let mut values = vec![
                    Value::Text(record.reservoir_id.clone()),
                    Value::Integer(record.pid),
                    Value::Text(format_date(&record.date)),
                    Value::Real(record.lat),
                    Value::Real(record.lon),
                ];
                values.extend(record.values.iter().map(|v| Value::Real(*v)));
                values.push(Value::Text(record.wkt()));
                written += stmt.execute(params_from_iter(values.iter()))?;
            }
        }
        tx.commit()?;
        if skipped > 0 {
            log::warn!("Skipped {} rows already covered by {}", skipped, table);
        }
        log::info!("Appended {} rows to {}", written, table);
        Ok(written)
    }

    /// Append archive days after the last stored date of the reservoir.
    pub fn append_meteo_history(&self, reservoir_id: &str, series: &MeteoSeries) -> anyhow::Result<usize> {
        if series.is_empty() {
            return Ok(0);
        }
        let table = self.tables.meteo_history.clone();
        let mut conn = self.conn.borrow_mut();
        let tx = conn.transaction()?;
        tx.execute_batch(&meteo_table_sql(&table, &series.features, false)?)?;
        ensure_columns(&tx, &table, &series.features)?;
        let last = last_date(&tx, &table, reservoir_id)?;

        let mut columns = vec!["reservoir_id".to_string(), "date".into()];
        for f in &series.features {
            columns.push(quote(f)?);
        }
        let sql = format!(
            "INSERT OR IGNORE INTO {} ({}) VALUES ({})",
            quote(&table)?,
            columns.join(", "),
            placeholders(columns.len())
        );
        let mut written = 0usize;
        {
            let mut stmt = tx.prepare(&sql)?;
            for day in series.days.iter().filter(|d| last.map_or(true, |last| d.date > last)) {
                let mut values = vec![Value::Text(reservoir_id.to_string()), Value::Text(format_date(&day.date))];
                values.extend(day.values.iter().map(|v| v.map_or(Value::Null, Value::Real)));
                written += stmt.execute(params_from_iter(values.iter()))?;
            }
        }
        tx.commit()?;
        log::info!("Appended {} meteo days for reservoir {}", written, reservoir_id);
        Ok(written)
    }

    /// Replace the stored forecast of a reservoir with a newly issued one.
    pub fn replace_meteo_forecast(
        &self,
        reservoir_id: &str,
        issued: NaiveDate,
        series: &MeteoSeries,
    ) -> anyhow::Result<usize> {
        let table = self.tables.meteo_forecast.clone();
        let mut conn = self.conn.borrow_mut();
        let tx = conn.transaction()?;
        tx.execute_batch(&meteo_table_sql(&table, &series.features, true)?)?;
        ensure_columns(&tx, &table, &series.features)?;
        let removed = tx.execute(
            &format!("DELETE FROM {} WHERE reservoir_id = ?1", quote(&table)?),
            [reservoir_id],
        )?;

        let mut columns = vec!["reservoir_id".to_string(), "issued".into(), "date".into()];
        for f in &series.features {
            columns.push(quote(f)?);
        }
        let sql = format!(
            "INSERT INTO {} ({}) VALUES ({})",
            quote(&table)?,
            columns.join(", "),
            placeholders(columns.len())
        );
        let mut written = 0usize;
        {
            let mut stmt = tx.prepare(&sql)?;
            for day in &series.days {
                let mut values = vec![
                    Value::Text(reservoir_id.to_string()),
                    Value::Text(format_date(&issued)),
                    Value::Text(format_date(&day.date)),
                ];
                values.extend(day.values.iter().map(|v| v.map_or(Value::Null, Value::Real)));
                written += stmt.execute(params_from_iter(values.iter()))?;
            }
        }
        tx.commit()?;
        log::info!(
            "Replaced {} forecast days with {} for reservoir {}",
            removed,
            written,
            reservoir_id
        );
        Ok(written)
    }

    /// Store a target forecast, replacing the previous one for the same band.
    pub fn write_forecast(&self, reservoir_id: &str, band: &str, rows: &[ForecastRow]) -> anyhow::Result<usize> {
        let table = quote(&self.tables.forecast)?;
        let mut conn = self.conn.borrow_mut();
        let tx = conn.transaction()?;
        tx.execute(
            &format!("DELETE FROM {table} WHERE reservoir_id = ?1 AND band = ?2"),
            params![reservoir_id, band],
        )?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT INTO {table} (reservoir_id, band, ds, yhat, yhat_lower, yhat_upper)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)"
            ))?;
            for row in rows {
                stmt.execute(params![
                    reservoir_id,
                    band,
                    format_date(&row.ds),
                    row.yhat,
                    row.yhat_lower,
                    row.yhat_upper
                ])?;
            }
        }
        tx.commit()?;
        log::info!("Stored {} forecast rows of {} for reservoir {}", rows.len(), band, reservoir_id);
        Ok(rows.len())
    }
}
