//! Aggregation planning and decoding
//!
//! [`AggregationPlanner`] builds the request tree, [`ResultDecoder`] reads the
//! matching response back into [`DataPoint`]s.

pub mod decoder;
pub mod interval;
pub mod planner;
pub mod types;

pub use decoder::ResultDecoder;
pub use interval::interval_token;
pub use planner::{AggregationPlan, AggregationPlanner, HISTOGRAM_KEY, NESTED_KEY, SCALAR_KEY};
pub use types::{AggFunc, DataPoint, GroupKey, GroupedResult, TimeSeries, TimeSeries2D};
