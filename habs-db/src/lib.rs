//! SQLite persistence for reservoir water-quality data.
//!
//! Reservoir metadata and sample points are loaded once from CSV. Sentinel-2
//! point observations and Open-Meteo series are appended by the sink, which
//! only ever extends a reservoir's series past its last stored date.
//!
//! # Usage
//!
//! ```rust
//! use habs_db::Database;
//!
//! let db = Database::new().unwrap();
//! db.load_reservoirs("reservoir_id,name,lat,lon,geometry_wkt\n42,Orlik,49.5,14.1,\n").unwrap();
//! let reservoir = db.query_reservoir("42").unwrap();
//! assert_eq!(reservoir.map(|r| r.name), Some("Orlik".to_string()));
//! ```
//!
//! # Tables
//!
//! Table names are configurable through [`TableNames`]; see
//! [`schema::create_schema`] for the static part of the schema. Observation and
//! meteo tables get one column per band or feature and are created on first
//! append.

pub mod schema;
mod loader;
mod queries;
pub mod models;
pub mod sink;

pub use schema::TableNames;

use rusqlite::Connection;
use std::cell::RefCell;
use std::path::Path;
use std::rc::Rc;

/// SQLite connection plus the table layout it was opened with.
///
/// Cloning shares the connection; it is opened per command and closed
/// explicitly with [`Database::close`].
#[derive(Clone)]
pub struct Database {
    conn: Rc<RefCell<Connection>>,
    tables: TableNames,
}

impl Database {
    /// In-memory database with the default table names.
    pub fn new() -> anyhow::Result<Self> {
        Self::open_in_memory(TableNames::default())
    }

    pub fn open_in_memory(tables: TableNames) -> anyhow::Result<Self> {
        Self::init(Connection::open_in_memory()?, tables)
    }

    /// Open (or create) a database file.
    pub fn open(path: impl AsRef<Path>, tables: TableNames) -> anyhow::Result<Self> {
        let path = path.as_ref();
        log::info!("Opening database {}", path.display());
        Self::init(Connection::open(path)?, tables)
    }

    fn init(conn: Connection, tables: TableNames) -> anyhow::Result<Self> {
        tables.validate()?;
        conn.execute_batch(&schema::create_schema(&tables))?;
        Ok(Self {
            conn: Rc::new(RefCell::new(conn)),
            tables,
        })
    }

    pub fn tables(&self) -> &TableNames {
        &self.tables
    }

    /// Close the connection, surfacing any error SQLite reports on close.
    ///
    /// If other clones are still alive the connection stays open until the
    /// last one is dropped.
    pub fn close(self) -> anyhow::Result<()> {
        match Rc::try_unwrap(self.conn) {
            Ok(cell) => cell.into_inner().close().map_err(|(_, e)| e.into()),
            Err(_) => {
                log::debug!("Database still shared, closing on last drop");
                Ok(())
            }
        }
    }
}
