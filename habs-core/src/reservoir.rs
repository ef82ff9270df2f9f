use csv::{ReaderBuilder, StringRecord};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// A monitored water reservoir, keyed by its external geographic id.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct Reservoir {
    /// External identifier, e.g. the OSM id of the water body.
    pub reservoir_id: String,
    pub name: String,
    /// Centroid latitude (WGS84).
    pub lat: f64,
    /// Centroid longitude (WGS84).
    pub lon: f64,
    /// Outline polygon as WKT; only carried through, never interpreted.
    pub geometry_wkt: String,
}

/// A sampling point inside a reservoir. `pid` is unique per reservoir.
#[derive(Debug, PartialEq, Clone, Copy, Serialize, Deserialize)]
pub struct SamplePoint {
    pub pid: i64,
    pub lat: f64,
    pub lon: f64,
}

/// A sample point tagged with the reservoir it belongs to, as loaded from CSV.
#[derive(Debug, PartialEq, Clone, Serialize, Deserialize)]
pub struct ReservoirPoint {
    pub reservoir_id: String,
    pub point: SamplePoint,
}

fn field<'r>(record: &'r StringRecord, idx: usize, name: &str) -> Result<&'r str, csv::Error> {
    record
        .get(idx)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| invalid_field(record, name))
}

fn parse_field<T: std::str::FromStr>(
    record: &StringRecord,
    idx: usize,
    name: &str,
) -> Result<T, csv::Error> {
    field(record, idx, name)?
        .parse::<T>()
        .map_err(|_| invalid_field(record, name))
}

fn invalid_field(record: &StringRecord, name: &str) -> csv::Error {
    let line = record.position().map(|p| p.line()).unwrap_or_default();
    csv::Error::from(std::io::Error::new(
        std::io::ErrorKind::InvalidData,
        format!("line {line}: missing or invalid {name}"),
    ))
}

impl Reservoir {
    /// Parse a CSV string of reservoirs.
    ///
    /// Expected columns (with headers): `reservoir_id,name,lat,lon,geometry_wkt`.
    /// The WKT column is optional and usually quoted.
    pub fn parse_reservoir_csv(csv_object: &str) -> Result<Vec<Reservoir>, csv::Error> {
        let mut reservoir_list: Vec<Reservoir> = Vec::new();
        let mut rdr = ReaderBuilder::new()
            .delimiter(b',')
            .has_headers(true)
            .flexible(true)
            .from_reader(csv_object.as_bytes());
        for row in rdr.records() {
            let rho = row?;
            reservoir_list.push(Reservoir {
                reservoir_id: field(&rho, 0, "reservoir_id")?.to_string(),
                name: rho.get(1).unwrap_or_default().trim().to_string(),
                lat: parse_field(&rho, 2, "lat")?,
                lon: parse_field(&rho, 3, "lon")?,
                geometry_wkt: rho.get(4).unwrap_or_default().trim().to_string(),
            });
        }
        Ok(reservoir_list)
    }
}

impl SamplePoint {
    /// Point geometry as WKT, longitude first.
    pub fn wkt(&self) -> String {
        format!("POINT({} {})", self.lon, self.lat)
    }

    /// Parse a CSV string of sample points.
    ///
    /// Expected columns (with headers): `reservoir_id,pid,lat,lon`.
    pub fn parse_sample_point_csv(csv_object: &str) -> Result<Vec<ReservoirPoint>, csv::Error> {
        let mut rdr = ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(csv_object.as_bytes());
        rdr.records()
            .map(|row| {
                let rho = row?;
                Ok(ReservoirPoint {
                    reservoir_id: field(&rho, 0, "reservoir_id")?.to_string(),
                    point: SamplePoint {
                        pid: parse_field(&rho, 1, "pid")?,
                        lat: parse_field(&rho, 2, "lat")?,
                        lon: parse_field(&rho, 3, "lon")?,
                    },
                })
            })
            .collect()
    }
}

/// GeoJSON FeatureCollection of the points, in slice order.
///
/// The aggregation service reports results by position in this collection
/// (`feature_index`), so callers must keep the same slice to map results back.
pub fn points_feature_collection(points: &[SamplePoint]) -> Value {
    let features: Vec<Value> = points
        .iter()
        .map(|p| {
            json!({
                "type": "Feature",
                "properties": { "PID": p.pid },
                "geometry": { "type": "Point", "coordinates": [p.lon, p.lat] },
            })
        })
        .collect();
    json!({ "type": "FeatureCollection", "features": features })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_reservoir_csv() {
        let csv = "\
reservoir_id,name,lat,lon,geometry_wkt
11092220,Orlik,49.51,14.17,\"POLYGON((14.1 49.5,14.2 49.5,14.2 49.6,14.1 49.5))\"
1239458,Lipno,48.63,14.23
";
        let reservoirs = Reservoir::parse_reservoir_csv(csv).unwrap();
        assert_eq!(reservoirs.len(), 2);
        assert_eq!(reservoirs[0].reservoir_id, "11092220");
        assert_eq!(reservoirs[0].name, "Orlik");
        assert!(reservoirs[0].geometry_wkt.starts_with("POLYGON(("));
        assert_eq!(reservoirs[1].geometry_wkt, "");
        assert!((reservoirs[1].lon - 14.23).abs() < 1e-9);
    }

    #[test]
    fn test_parse_reservoir_csv_rejects_bad_latitude() {
        let csv = "reservoir_id,name,lat,lon\n42,Test,north,14.0\n";
        assert!(Reservoir::parse_reservoir_csv(csv).is_err());
    }

    #[test]
    fn test_parse_sample_point_csv() {
        let csv = "\
reservoir_id,pid,lat,lon
42,0,49.50,14.10
42,1,49.51,14.11
";
        let points = SamplePoint::parse_sample_point_csv(csv).unwrap();
        assert_eq!(points.len(), 2);
        assert_eq!(points[1].reservoir_id, "42");
        assert_eq!(points[1].point.pid, 1);
        assert_eq!(points[0].point.wkt(), "POINT(14.1 49.5)");
    }

    #[test]
    fn test_feature_collection_keeps_order() {
        let points = [
            SamplePoint { pid: 7, lat: 1.0, lon: 2.0 },
            SamplePoint { pid: 3, lat: 3.0, lon: 4.0 },
        ];
        let fc = points_feature_collection(&points);
        let features = fc["features"].as_array().unwrap();
        assert_eq!(features.len(), 2);
        assert_eq!(features[0]["properties"]["PID"], 7);
        assert_eq!(features[1]["geometry"]["coordinates"][0], 4.0);
    }
}
