//! Elasticsearch wire types used by elastore
//!
//! This crate holds the serde representation of the subset of the engine
//! protocol elastore speaks:
//! - Query DSL requests (`bool`, `term`, `terms`, `range`, `nested`, ...)
//! - Aggregation request containers (metrics, terms, date histograms, nested)
//! - Search, count, bulk and error responses
//! - [`Aggregate`], a closed sum type over the aggregation results returned
//!   with `typed_keys=true`

pub mod aggregate;
pub mod aggregation;
pub mod error;
pub mod query;
pub mod response;

pub use aggregate::{parse_aggregates, Aggregate, Aggregates, Bucket, HistogramAggregate};
pub use aggregate::{SingleBucketAggregate, TermsAggregate, ValueAggregate};
pub use aggregation::Aggregation;
pub use error::DslError;
pub use query::{BoolQuery, CountRequest, Query, SearchRequest, SortClause, SortOrder};
pub use response::{BulkResponse, CountResponse, ErrorResponse, Hit, SearchResponse};

pub type Result<T> = std::result::Result<T, DslError>;
