//! openEO process graphs for per-point Sentinel-2 band means.
//!
//! The graph loads the collection for one window, optionally masks
//! everything that is not open water, and reduces each point geometry to the
//! mean of every requested band. Output is CSV so the normalizer can read it.

use crate::error::ConfigError;
use crate::window::ObservationWindow;
use chrono::Days;
use habs_utils::dates::format_date;
use serde_json::{json, Value};

/// Scene classification band of Sentinel-2 L2A.
pub const SCL_BAND: &str = "SCL";
/// SCL classes kept by the water mask: 2 dark area pixels, 6 water.
pub const SCL_KEEP: [u8; 2] = [6, 2];
pub const KERNEL_SIZE: usize = 11;
pub const KERNEL_STD: f64 = 1.6;
pub const KERNEL_THRESHOLD: f64 = 0.1;

/// Everything a single aggregation job depends on.
#[derive(Debug, Clone)]
pub struct AggregationRequest<'a> {
    pub collection: &'a str,
    pub window: ObservationWindow,
    pub max_cloud_cover: f64,
    pub bands: &'a [String],
    pub cloud_mask: bool,
    /// GeoJSON FeatureCollection of the sample points.
    pub geometries: &'a Value,
}

/// Normalized 2-D Gaussian kernel, the outer product of a 1-D window.
pub fn gaussian_kernel(size: usize, std: f64) -> Vec<Vec<f64>> {
    let center = (size as f64 - 1.0) / 2.0;
    let g: Vec<f64> = (0..size)
        .map(|n| {
            let x = (n as f64 - center) / std;
            (-0.5 * x * x).exp()
        })
        .collect();
    let total: f64 = g.iter().sum::<f64>().powi(2);
    g.iter()
        .map(|a| g.iter().map(|b| a * b / total).collect())
        .collect()
}

fn callback(nodes: Value) -> Value {
    json!({ "process_graph": nodes })
}

/// Build the `process_graph` object for one window.
pub fn build_process_graph(req: &AggregationRequest<'_>) -> Result<Value, ConfigError> {
    if req.bands.is_empty() {
        return Err(ConfigError::EmptyBandList);
    }
    if req.cloud_mask && !req.bands.iter().any(|b| b == SCL_BAND) {
        return Err(ConfigError::Invalid(format!(
            "cloud masking needs the {SCL_BAND} band in the band list"
        )));
    }

    // openEO temporal extents are half-open; the window end is inclusive.
    let end_exclusive = req
        .window
        .end
        .checked_add_days(Days::new(1))
        .unwrap_or(req.window.end);

    let mut graph = serde_json::Map::new();
    graph.insert(
        "load1".into(),
        json!({
            "process_id": "load_collection",
            "arguments": {
                "id": req.collection,
                "spatial_extent": null,
                "temporal_extent": [format_date(&req.window.start), format_date(&end_exclusive)],
                "bands": req.bands,
                "properties": {
                    "eo:cloud_cover": callback(json!({
                        "cc1": {
                            "process_id": "lte",
                            "arguments": { "x": { "from_parameter": "value" }, "y": req.max_cloud_cover },
                            "result": true
                        }
                    }))
                }
            }
        }),
    );

    let data_node = if req.cloud_mask {
        insert_water_mask(&mut graph);
        "mask1"
    } else {
        "load1"
    };

    graph.insert(
        "agg1".into(),
        json!({
            "process_id": "aggregate_spatial",
            "arguments": {
                "data": { "from_node": data_node },
                "geometries": req.geometries,
                "reducer": callback(json!({
                    "mean1": {
                        "process_id": "mean",
                        "arguments": { "data": { "from_parameter": "data" } },
                        "result": true
                    }
                }))
            }
        }),
    );
    graph.insert(
        "save1".into(),
        json!({
            "process_id": "save_result",
            "arguments": { "data": { "from_node": "agg1" }, "format": "CSV" },
            "result": true
        }),
    );

    Ok(Value::Object(graph))
}

/// Mask pixels outside SCL water/dark classes, grown by a Gaussian dilation
/// so shoreline pixels are rejected as well.
///
/// The SCL band is reduced out of the `bands` dimension, so the mask has no
/// band labels and applies to every band of the loaded cube.
fn insert_water_mask(graph: &mut serde_json::Map<String, Value>) {
    graph.insert(
        "reject1".into(),
        json!({
            "process_id": "reduce_dimension",
            "arguments": {
                "data": { "from_node": "load1" },
                "dimension": "bands",
                "reducer": callback(json!({
                    "scl1": {
                        "process_id": "array_element",
                        "arguments": { "data": { "from_parameter": "data" }, "label": SCL_BAND }
                    },
                    "eq1": { "process_id": "eq", "arguments": { "x": { "from_node": "scl1" }, "y": SCL_KEEP[0] } },
                    "eq2": { "process_id": "eq", "arguments": { "x": { "from_node": "scl1" }, "y": SCL_KEEP[1] } },
                    "or1": { "process_id": "or", "arguments": { "x": { "from_node": "eq1" }, "y": { "from_node": "eq2" } } },
                    "not1": { "process_id": "not", "arguments": { "x": { "from_node": "or1" } }, "result": true }
                }))
            }
        }),
    );
    graph.insert(
        "dilate1".into(),
        json!({
            "process_id": "apply_kernel",
            "arguments": {
                "data": { "from_node": "reject1" },
                "kernel": gaussian_kernel(KERNEL_SIZE, KERNEL_STD),
                "factor": 1,
                "border": 0,
                "replace_invalid": 0
            }
        }),
    );
    graph.insert(
        "threshold1".into(),
        json!({
            "process_id": "apply",
            "arguments": {
                "data": { "from_node": "dilate1" },
                "process": callback(json!({
                    "gt1": {
                        "process_id": "gt",
                        "arguments": { "x": { "from_parameter": "x" }, "y": KERNEL_THRESHOLD },
                        "result": true
                    }
                }))
            }
        }),
    );
    graph.insert(
        "mask1".into(),
        json!({
            "process_id": "mask",
            "arguments": { "data": { "from_node": "load1" }, "mask": { "from_node": "threshold1" } }
        }),
    );
}
