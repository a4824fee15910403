//! Aggregation request containers
//!
//! An [`Aggregation`] sets exactly one of its kind slots and may carry named
//! sub-aggregations, serialized under `aggregations`.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct Aggregation {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub avg: Option<FieldAgg>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sum: Option<FieldAgg>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min: Option<FieldAgg>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub max: Option<FieldAgg>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cardinality: Option<CardinalityAgg>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub terms: Option<TermsAgg>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub date_histogram: Option<DateHistogramAgg>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub auto_date_histogram: Option<AutoDateHistogramAgg>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub nested: Option<NestedAgg>,
    #[serde(default, alias = "aggs", skip_serializing_if = "HashMap::is_empty")]
    pub aggregations: HashMap<String, Aggregation>,
}

/// Single-field metric (`avg`, `sum`, `min`, `max`)
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FieldAgg {
    pub field: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CardinalityAgg {
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub precision_threshold: Option<u32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TermsAgg {
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct DateHistogramAgg {
    pub field: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fixed_interval: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub calendar_interval: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_doc_count: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct AutoDateHistogramAgg {
    pub field: String,
    pub buckets: usize,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NestedAgg {
    pub path: String,
}

fn field(name: &str) -> Option<FieldAgg> {
    Some(FieldAgg {
        field: name.to_string(),
    })
}

impl Aggregation {
    pub fn avg(name: &str) -> Self {
        Self {
            avg: field(name),
            ..Default::default()
        }
    }

    pub fn sum(name: &str) -> Self {
        Self {
            sum: field(name),
            ..Default::default()
        }
    }

    pub fn min(name: &str) -> Self {
        Self {
            min: field(name),
            ..Default::default()
        }
    }

    pub fn max(name: &str) -> Self {
        Self {
            max: field(name),
            ..Default::default()
        }
    }

    pub fn cardinality(name: &str, precision_threshold: u32) -> Self {
        Self {
            cardinality: Some(CardinalityAgg {
                field: name.to_string(),
                precision_threshold: Some(precision_threshold),
            }),
            ..Default::default()
        }
    }

    pub fn terms(name: &str, size: usize) -> Self {
        Self {
            terms: Some(TermsAgg {
                field: name.to_string(),
                size: Some(size),
            }),
            ..Default::default()
        }
    }

    pub fn date_histogram(name: &str, fixed_interval: impl Into<String>) -> Self {
        Self {
            date_histogram: Some(DateHistogramAgg {
                field: name.to_string(),
                fixed_interval: Some(fixed_interval.into()),
                calendar_interval: None,
                min_doc_count: None,
            }),
            ..Default::default()
        }
    }

    pub fn auto_date_histogram(name: &str, buckets: usize) -> Self {
        Self {
            auto_date_histogram: Some(AutoDateHistogramAgg {
                field: name.to_string(),
                buckets,
            }),
            ..Default::default()
        }
    }

    pub fn nested(path: &str) -> Self {
        Self {
            nested: Some(NestedAgg {
                path: path.to_string(),
            }),
            ..Default::default()
        }
    }

    /// Attach a named sub-aggregation
    pub fn with_sub(mut self, name: impl Into<String>, sub: Aggregation) -> Self {
        self.aggregations.insert(name.into(), sub);
        self
    }
}
