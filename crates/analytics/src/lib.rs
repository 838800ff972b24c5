//! Statistical post-processing for tabular query output.
//!
//! All three analytics are pure, synchronous computations over extracted
//! numeric columns. They run to completion once started; cancellation is the
//! caller's concern via a timeout around the whole augmented request.
pub mod anomaly;
pub mod cluster;
pub mod forecast;

pub use anomaly::{detect_anomalies, Anomaly, Direction};
pub use cluster::{cluster, ClusterAssignment};
pub use forecast::{forecast, Forecast, ForecastPoint, SeriesPoint};
