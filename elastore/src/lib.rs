//! Entity datastore on Elasticsearch
//!
//! Compiles declarative filters, sorting, paging and aggregations into the
//! engine's query DSL, executes them and decodes the responses into typed
//! results.
//!
//! # Components
//!
//! - [`QueryTranslator`] - filter groups to a `bool` query, with nested-field grouping
//! - [`QueryBuilder`] - fluent query configuration and execution
//! - [`AggregationPlanner`] / [`ResultDecoder`] - aggregation trees and their results
//! - [`BulkIndexer`] - background batched writes with per-item accounting
//! - [`ElasticStore`] - CRUD, bulk writes and index management
//!
//! # Example
//!
//! ```ignore
//! use elastore::{field, AggFunc, ElasticStore};
//!
//! let store = ElasticStore::connect("elastic://localhost:9200")?;
//! let (by_color, total) = store
//!     .query::<Hero>()
//!     .match_any([field("color").eq("red"), field("color").eq("white")])
//!     .group_count("color")
//!     .await?;
//! ```

pub mod aggregations;
pub mod bulk;
pub mod config;
pub mod entity;
pub mod error;
pub mod filter;
pub mod index;
pub mod logging;
pub mod metrics;
pub mod query;
pub mod store;
pub mod transport;

pub use aggregations::{
    interval_token, AggFunc, AggregationPlanner, DataPoint, GroupKey, GroupedResult, ResultDecoder,
    TimeSeries, TimeSeries2D,
};
pub use bulk::{BulkAction, BulkIndexer, BulkItem, BulkReport, BulkStats, ItemFailure};
pub use config::{BulkConfig, LoggingConfig, StoreConfig};
pub use entity::{Entity, FieldMapping, FieldType, Timestamp};
pub use error::{Error, Result};
pub use filter::{field, Filter, LikePolarity, Operator};
pub use query::{QueryBuilder, QueryTranslator, RangeFilter};
pub use store::ElasticStore;
pub use transport::{HttpTransport, Transport, TransportRequest, TransportResponse};
