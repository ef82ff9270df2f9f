#[cfg(feature = "api")]
pub mod cache;
pub mod date_range;
pub mod error;
pub mod executor;
pub mod meteo;
pub mod normalize;
pub mod observation;
pub mod openeo;
pub mod process_graph;
pub mod reservoir;
#[cfg(feature = "api")]
pub mod session;
pub mod window;
