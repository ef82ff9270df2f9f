//! SQL schema for the database.
//!
//! Reservoirs and sample points have a fixed layout and are created when the
//! database is opened. Observation and meteo tables carry one REAL column per
//! band or feature, so their DDL is generated from the column list on first
//! write.

use habs_core::error::{validate_identifier, ConfigError};
use serde::{Deserialize, Serialize};

/// Names of every table the toolkit reads or writes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TableNames {
    pub reservoirs: String,
    pub sample_points: String,
    pub observations: String,
    pub meteo_history: String,
    pub meteo_forecast: String,
    pub forecast: String,
}

impl Default for TableNames {
    fn default() -> Self {
        Self {
            reservoirs: "water_reservoirs".to_string(),
            sample_points: "selected_points".to_string(),
            observations: "s2_points_eo_data".to_string(),
            meteo_history: "meteo_history".to_string(),
            meteo_forecast: "meteo_forecast".to_string(),
            forecast: "wq_forecast".to_string(),
        }
    }
}

impl TableNames {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for name in [
            &self.reservoirs,
            &self.sample_points,
            &self.observations,
            &self.meteo_history,
            &self.meteo_forecast,
            &self.forecast,
        ] {
            validate_identifier(name)?;
        }
        Ok(())
    }
}

/// Double-quote an identifier after validating it.
pub fn quote(name: &str) -> Result<String, ConfigError> {
    Ok(format!("\"{}\"", validate_identifier(name)?))
}

/// Static schema: reservoirs, sample points and stored forecasts.
pub fn create_schema(tables: &TableNames) -> String {
    format!(
        r#"
    CREATE TABLE IF NOT EXISTS "{reservoirs}" (
        reservoir_id TEXT PRIMARY KEY,
        name TEXT NOT NULL,
        lat REAL NOT NULL,
        lon REAL NOT NULL,
        geometry TEXT
    );

    CREATE TABLE IF NOT EXISTS "{points}" (
        reservoir_id TEXT NOT NULL,
        pid INTEGER NOT NULL,
        lat REAL NOT NULL,
        lon REAL NOT NULL,
        geometry TEXT NOT NULL,
        PRIMARY KEY (reservoir_id, pid)
    );

    CREATE TABLE IF NOT EXISTS "{forecast}" (
        reservoir_id TEXT NOT NULL,
        band TEXT NOT NULL,
        ds TEXT NOT NULL,
        yhat REAL NOT NULL,
        yhat_lower REAL NOT NULL,
        yhat_upper REAL NOT NULL,
        PRIMARY KEY (reservoir_id, band, ds)
    );
    "#,
        reservoirs = tables.reservoirs,
        points = tables.sample_points,
        forecast = tables.forecast,
    )
}

/// DDL for a per-point observation table with one column per band.
pub fn observation_table_sql(table: &str, bands: &[String]) -> Result<String, ConfigError> {
    let mut columns = vec![
        "reservoir_id TEXT NOT NULL".to_string(),
        "PID INTEGER NOT NULL".to_string(),
        "date TEXT NOT NULL".to_string(),
        "lat REAL NOT NULL".to_string(),
        "lon REAL NOT NULL".to_string(),
    ];
    for band in bands {
        columns.push(format!("{} REAL", quote(band)?));
    }
    columns.push("geometry TEXT NOT NULL".to_string());
    columns.push("PRIMARY KEY (reservoir_id, PID, date)".to_string());
    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n);\nCREATE INDEX IF NOT EXISTS {} ON {}(reservoir_id, date);",
        quote(table)?,
        columns.join(",\n    "),
        quote(&format!("idx_{table}_reservoir_date"))?,
        quote(table)?,
    ))
}

/// DDL for a daily meteo table. Forecast tables also record the issue date.
pub fn meteo_table_sql(table: &str, features: &[String], with_issued: bool) -> Result<String, ConfigError> {
    let mut columns = vec!["reservoir_id TEXT NOT NULL".to_string()];
    if with_issued {
        columns.push("issued TEXT NOT NULL".to_string());
    }
    columns.push("date TEXT NOT NULL".to_string());
    for feature in features {
        columns.push(format!("{} REAL", quote(feature)?));
    }
    columns.push("PRIMARY KEY (reservoir_id, date)".to_string());
    Ok(format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n);",
        quote(table)?,
        columns.join(",\n    ")
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rusqlite::Connection;

    fn table_count(conn: &Connection, name: &str) -> i64 {
        conn.query_row(
            "SELECT COUNT(*) FROM sqlite_master WHERE type='table' AND name=?1",
            [name],
            |row| row.get(0),
        )
        .unwrap()
    }

    #[test]
    fn schema_creates_static_tables() {
        let conn = Connection::open_in_memory().unwrap();
        let tables = TableNames::default();
        conn.execute_batch(&create_schema(&tables)).unwrap();
        for table in ["water_reservoirs", "selected_points", "wq_forecast"] {
            assert_eq!(table_count(&conn, table), 1, "Table '{}' should exist", table);
        }
    }

    #[test]
    fn schema_is_idempotent() {
        let conn = Connection::open_in_memory().unwrap();
        let tables = TableNames::default();
        conn.execute_batch(&create_schema(&tables)).unwrap();
        conn.execute_batch(&create_schema(&tables))
            .expect("Applying schema twice should succeed due to IF NOT EXISTS");
    }

    #[test]
    fn observation_table_has_band_columns() {
        let conn = Connection::open_in_memory().unwrap();
        let bands = vec!["B02".to_string(), "B03".to_string()];
        conn.execute_batch(&observation_table_sql("s2_points_eo_data", &bands).unwrap())
            .unwrap();
        let mut stmt = conn.prepare("SELECT name FROM pragma_table_info('s2_points_eo_data')").unwrap();
        let columns: Vec<String> = stmt
            .query_map([], |row| row.get(0))
            .unwrap()
            .collect::<Result<_, _>>()
            .unwrap();
        assert_eq!(columns, vec!["reservoir_id", "PID", "date", "lat", "lon", "B02", "B03", "geometry"]);
    }

    #[test]
    fn hostile_column_names_are_rejected() {
        let bands = vec!["B02\"; DROP TABLE x; --".to_string()];
        assert!(observation_table_sql("obs", &bands).is_err());
        assert!(meteo_table_sql("meteo history", &[], false).is_err());
    }
}
