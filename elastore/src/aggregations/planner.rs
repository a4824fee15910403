//! Aggregation tree construction
//!
//! Request layouts (key names are shared with the decoder):
//! - scalar: `{"aggs": <metric>}`
//! - grouped: `{"aggs": {terms, aggregations: {<fn>: <metric>}}}`
//! - histogram: `{"0": {date_histogram | auto_date_histogram, aggregations: {<fn>: <metric>}}}`
//! - 2D: `{"0": {date_histogram, aggregations: {<fn>: {terms(dim), aggregations: {<fn>: <metric>}}}}}`
//!
//! A dotted field (scalar) or time field (histograms) wraps the tree in
//! `{"nested": {"path": ..}, "aggregations": {"nested": <tree>}}`. `Count`
//! adds no sub-metric; buckets then report their document count.

use super::interval::interval_token;
use super::types::AggFunc;
use elastore_dsl::aggregation::Aggregation;
use elastore_dsl::query::{Query, SearchRequest};
use std::collections::HashMap;
use std::time::Duration;

/// Key of scalar and grouped aggregations
pub const SCALAR_KEY: &str = "aggs";

/// Key of the outer time-bucket aggregation
pub const HISTOGRAM_KEY: &str = "0";

/// Child key under a nested wrapper
pub const NESTED_KEY: &str = "nested";

/// Cardinality precision threshold; counts are exact up to this value
pub const CARDINALITY_PRECISION: u32 = 40_000;

/// A named aggregation ready to go into a search request
#[derive(Debug, Clone, PartialEq)]
pub struct AggregationPlan {
    pub name: &'static str,
    pub aggregation: Aggregation,
}

impl AggregationPlan {
    /// Hits are not needed, only the aggregation
    pub fn into_request(self, query: Query) -> SearchRequest {
        SearchRequest {
            query: Some(query),
            size: Some(0),
            aggregations: Some(HashMap::from([(self.name.to_string(), self.aggregation)])),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct AggregationPlanner {
    limit: usize,
}

fn nested_path(field: &str) -> Option<&str> {
    field.split_once('.').map(|(path, _)| path)
}

fn wrap_nested(field: &str, agg: Aggregation) -> Aggregation {
    match nested_path(field) {
        Some(path) => Aggregation::nested(path).with_sub(NESTED_KEY, agg),
        None => agg,
    }
}

impl AggregationPlanner {
    /// `limit` bounds terms buckets and the auto histogram bucket target
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }

    pub fn limit(&self) -> usize {
        self.limit
    }

    /// The metric placed under each bucket. `None` for `Count`.
    pub fn sub_metric(field: &str, function: AggFunc) -> Option<Aggregation> {
        match function {
            AggFunc::Sum => Some(Aggregation::sum(field)),
            AggFunc::Avg => Some(Aggregation::avg(field)),
            AggFunc::Min => Some(Aggregation::min(field)),
            AggFunc::Max => Some(Aggregation::max(field)),
            AggFunc::Count => None,
        }
    }

    fn with_metric(agg: Aggregation, field: &str, function: AggFunc) -> Aggregation {
        match Self::sub_metric(field, function) {
            Some(metric) => agg.with_sub(function.as_str(), metric),
            None => agg,
        }
    }

    /// Single value over all matching documents
    pub fn scalar(&self, field: &str, function: AggFunc) -> AggregationPlan {
        let metric = match function {
            AggFunc::Sum => Aggregation::sum(field),
            AggFunc::Avg => Aggregation::avg(field),
            AggFunc::Min => Aggregation::min(field),
            AggFunc::Max => Aggregation::max(field),
            AggFunc::Count => Aggregation::cardinality(field, CARDINALITY_PRECISION),
        };
        AggregationPlan {
            name: SCALAR_KEY,
            aggregation: wrap_nested(field, metric),
        }
    }

    /// Terms on `group_field`, `function` of `metric_field` per bucket
    pub fn grouped(&self, group_field: &str, metric_field: &str, function: AggFunc) -> AggregationPlan {
        let terms = Aggregation::terms(group_field, self.limit);
        AggregationPlan {
            name: SCALAR_KEY,
            aggregation: Self::with_metric(terms, metric_field, function),
        }
    }

    fn time_buckets(&self, time_field: &str, interval: Duration) -> Aggregation {
        let token = interval_token(interval);
        if token.is_empty() {
            Aggregation::auto_date_histogram(time_field, self.limit)
        } else {
            Aggregation::date_histogram(time_field, token)
        }
    }

    /// `function` of `field` per time bucket. A zero interval lets the engine
    /// pick one, targeting at most `limit` buckets.
    pub fn histogram(
        &self,
        field: &str,
        function: AggFunc,
        time_field: &str,
        interval: Duration,
    ) -> AggregationPlan {
        let buckets = Self::with_metric(self.time_buckets(time_field, interval), field, function);
        AggregationPlan {
            name: HISTOGRAM_KEY,
            aggregation: wrap_nested(time_field, buckets),
        }
    }

    /// Time buckets, then terms on `dim`, then `function` of `field`
    pub fn histogram_2d(
        &self,
        field: &str,
        function: AggFunc,
        dim: &str,
        time_field: &str,
        interval: Duration,
    ) -> AggregationPlan {
        let groups = Self::with_metric(Aggregation::terms(dim, self.limit), field, function);
        let buckets = self
            .time_buckets(time_field, interval)
            .with_sub(function.as_str(), groups);
        AggregationPlan {
            name: HISTOGRAM_KEY,
            aggregation: wrap_nested(time_field, buckets),
        }
    }
}
