//! CSV loading of the static reservoir tables.
//!
//! # CSV Formats
//!
//! - **Reservoirs** (has headers): `reservoir_id,name,lat,lon,geometry_wkt`
//! - **Sample points** (has headers): `reservoir_id,pid,lat,lon`

use crate::schema::quote;
use crate::Database;
use habs_core::reservoir::{Reservoir, SamplePoint};
use rusqlite::params;

impl Database {
    /// Load reservoir metadata, replacing rows with the same id.
    pub fn load_reservoirs(&self, csv_data: &str) -> anyhow::Result<usize> {
        let reservoirs = Reservoir::parse_reservoir_csv(csv_data)?;
        let table = quote(&self.tables.reservoirs)?;
        let mut conn = self.conn.borrow_mut();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT OR REPLACE INTO {table} (reservoir_id, name, lat, lon, geometry)
                 VALUES (?1, ?2, ?3, ?4, ?5)"
            ))?;
            for r in &reservoirs {
                let geometry = (!r.geometry_wkt.is_empty()).then_some(r.geometry_wkt.as_str());
                stmt.execute(params![r.reservoir_id, r.name, r.lat, r.lon, geometry])?;
            }
        }
        tx.commit()?;
        log::info!("Loaded {} reservoirs", reservoirs.len());
        Ok(reservoirs.len())
    }

    /// Load sample points, replacing rows with the same (reservoir, pid).
    pub fn load_sample_points(&self, csv_data: &str) -> anyhow::Result<usize> {
        let points = SamplePoint::parse_sample_point_csv(csv_data)?;
        let table = quote(&self.tables.sample_points)?;
        let mut conn = self.conn.borrow_mut();
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare(&format!(
                "INSERT OR REPLACE INTO {table} (reservoir_id, pid, lat, lon, geometry)
                 VALUES (?1, ?2, ?3, ?4, ?5)"
            ))?;
            for rp in &points {
                let p = rp.point;
                stmt.execute(params![rp.reservoir_id, p.pid, p.lat, p.lon, p.wkt()])?;
            }
        }
        tx.commit()?;
        log::info!("Loaded {} sample points", points.len());
        Ok(points.len())
    }
}

#[cfg(test)]
mod tests {
    use crate::Database;

    #[test]
    fn load_reservoirs_from_csv() {
        let db = Database::new().unwrap();
        let csv = "\
reservoir_id,name,lat,lon,geometry_wkt
42,Orlik,49.51,14.17,\"POLYGON((14.1 49.5, 14.2 49.5, 14.2 49.6, 14.1 49.5))\"
77,Lipno,48.63,14.17,
";
        assert_eq!(db.load_reservoirs(csv).unwrap(), 2);

        let conn = db.conn.borrow();
        let name: String = conn
            .query_row("SELECT name FROM water_reservoirs WHERE reservoir_id = '77'", [], |row| row.get(0))
            .unwrap();
        assert_eq!(name, "Lipno");
        let geometry: Option<String> = conn
            .query_row("SELECT geometry FROM water_reservoirs WHERE reservoir_id = '77'", [], |row| row.get(0))
            .unwrap();
        assert!(geometry.is_none());
    }

    #[test]
    fn load_reservoirs_replaces_on_conflict() {
        let db = Database::new().unwrap();
        db.load_reservoirs("reservoir_id,name,lat,lon,geometry_wkt\n42,Orlik,49.5,14.1,\n")
            .unwrap();
        db.load_reservoirs("reservoir_id,name,lat,lon,geometry_wkt\n42,Orlik dam,49.5,14.1,\n")
            .unwrap();

        let reservoirs = db.query_reservoirs().unwrap();
        assert_eq!(reservoirs.len(), 1, "Should have 1 row after upsert");
        assert_eq!(reservoirs[0].name, "Orlik dam");
    }

    #[test]
    fn load_sample_points_from_csv() {
        let db = Database::new().unwrap();
        let csv = "\
reservoir_id,pid,lat,lon
42,0,49.51,14.17
42,1,49.52,14.18
77,0,48.63,14.17
";
        assert_eq!(db.load_sample_points(csv).unwrap(), 3);

        let conn = db.conn.borrow();
        let geometry: String = conn
            .query_row(
                "SELECT geometry FROM selected_points WHERE reservoir_id = '42' AND pid = 1",
                [],
                |row| row.get(0),
            )
            .unwrap();
        assert_eq!(geometry, "POINT(14.18 49.52)");
    }

    #[test]
    fn malformed_csv_loads_nothing() {
        let db = Database::new().unwrap();
        assert!(db.load_sample_points("reservoir_id,pid,lat,lon\n42,x,49.5,14.1\n").is_err());
        assert!(db.query_sample_points("42").unwrap().is_empty());
    }
}
