//! Loading of reservoir and sample-point CSV files.

use crate::config::Config;
use log::info;
use std::path::Path;

fn read_csv(path: &Path) -> anyhow::Result<String> {
    if !path.exists() {
        anyhow::bail!("{} not found", path.display());
    }
    Ok(std::fs::read_to_string(path)?)
}

pub fn run_load_reservoirs(config: &Config, csv_path: &Path) -> anyhow::Result<usize> {
    let data = read_csv(csv_path)?;
    let db = config.open_database()?;
    let count = db.load_reservoirs(&data)?;
    let total = db.query_reservoirs()?.len();
    db.close()?;
    info!(
        "Loaded {} reservoirs from {} ({} in database)",
        count,
        csv_path.display(),
        total
    );
    Ok(count)
}

pub fn run_load_points(config: &Config, csv_path: &Path) -> anyhow::Result<usize> {
    let data = read_csv(csv_path)?;
    let db = config.open_database()?;
    let count = db.load_sample_points(&data)?;
    db.close()?;
    info!("Loaded {} sample points from {}", count, csv_path.display());
    Ok(count)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn loads_files_into_configured_database() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            database: dir.path().join("habs.sqlite"),
            ..Config::default()
        };
        let reservoirs = dir.path().join("reservoirs.csv");
        std::fs::write(&reservoirs, "reservoir_id,name,lat,lon,geometry_wkt\n42,Orlik,49.5,14.1,\n").unwrap();
        let points = dir.path().join("points.csv");
        std::fs::write(&points, "reservoir_id,pid,lat,lon\n42,0,49.51,14.17\n42,1,49.52,14.18\n").unwrap();

        assert_eq!(run_load_reservoirs(&config, &reservoirs).unwrap(), 1);
        assert_eq!(run_load_points(&config, &points).unwrap(), 2);

        let db = config.open_database().unwrap();
        assert_eq!(db.query_sample_points("42").unwrap().len(), 2);
    }

    #[test]
    fn missing_file_is_reported() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config {
            database: dir.path().join("habs.sqlite"),
            ..Config::default()
        };
        let err = run_load_points(&config, &dir.path().join("nope.csv")).unwrap_err();
        assert!(err.to_string().contains("not found"));
    }
}
