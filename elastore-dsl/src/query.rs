//! Elasticsearch Query DSL types
//!
//! Only the clauses elastore compiles are modelled. Single-field clauses are
//! keyed maps (`{"term": {"color": {"value": "red"}}}`), matching the engine's
//! own JSON layout.

use crate::aggregation::Aggregation;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

/// Root search request body
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct SearchRequest {
    /// The query to execute
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<Query>,

    /// Sort order, most significant first
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sort: Vec<SortClause>,

    /// Starting offset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub from: Option<usize>,

    /// Maximum number of hits
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub size: Option<usize>,

    /// Fields to return in `_source`
    #[serde(default, rename = "_source", skip_serializing_if = "Option::is_none")]
    pub source: Option<Vec<String>>,

    /// Aggregations keyed by name
    #[serde(default, alias = "aggs", skip_serializing_if = "Option::is_none")]
    pub aggregations: Option<HashMap<String, Aggregation>>,
}

impl SearchRequest {
    pub fn with_query(query: Query) -> Self {
        Self {
            query: Some(query),
            ..Default::default()
        }
    }
}

/// `_count` request body
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct CountRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub query: Option<Query>,
}

/// One sort key: `{"field": {"order": "asc"}}`
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(transparent)]
pub struct SortClause(pub HashMap<String, FieldSort>);

impl SortClause {
    pub fn new(field: impl Into<String>, order: SortOrder) -> Self {
        Self(HashMap::from([(field.into(), FieldSort { order })]))
    }

    pub fn asc(field: impl Into<String>) -> Self {
        Self::new(field, SortOrder::Asc)
    }

    pub fn desc(field: impl Into<String>) -> Self {
        Self::new(field, SortOrder::Desc)
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct FieldSort {
    pub order: SortOrder,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

/// Query clauses
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Query {
    /// Match all documents
    MatchAll(MatchAllQuery),

    /// Exact value match on a keyword field
    Term(HashMap<String, TermValue>),

    /// Any of several exact values
    Terms(HashMap<String, Vec<Value>>),

    /// Array field containing the given terms
    TermsSet(HashMap<String, TermsSetParams>),

    /// Range query
    Range(HashMap<String, RangeParams>),

    /// Wildcard pattern match
    Wildcard(HashMap<String, WildcardParams>),

    /// Document ids
    Ids(IdsQuery),

    /// Query scoped to a nested sub-document
    Nested(NestedQuery),

    /// Bool query (filter, must, should, must_not)
    Bool(BoolQuery),
}

impl Query {
    pub fn match_all() -> Self {
        Query::MatchAll(MatchAllQuery::default())
    }

    pub fn term(field: impl Into<String>, value: Value) -> Self {
        Query::Term(HashMap::from([(field.into(), TermValue { value })]))
    }

    pub fn terms(field: impl Into<String>, values: Vec<Value>) -> Self {
        Query::Terms(HashMap::from([(field.into(), values)]))
    }

    pub fn terms_set(field: impl Into<String>, terms: Vec<Value>) -> Self {
        Query::TermsSet(HashMap::from([(
            field.into(),
            TermsSetParams {
                terms,
                minimum_should_match: None,
            },
        )]))
    }

    pub fn range(field: impl Into<String>, params: RangeParams) -> Self {
        Query::Range(HashMap::from([(field.into(), params)]))
    }

    pub fn wildcard(field: impl Into<String>, value: impl Into<String>) -> Self {
        Query::Wildcard(HashMap::from([(
            field.into(),
            WildcardParams {
                value: value.into(),
            },
        )]))
    }

    pub fn ids<I, S>(values: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Query::Ids(IdsQuery {
            values: values.into_iter().map(Into::into).collect(),
        })
    }

    pub fn nested(path: impl Into<String>, query: Query) -> Self {
        Query::Nested(NestedQuery {
            path: path.into(),
            query: Box::new(query),
        })
    }

    /// The field a single-field clause targets, if any
    pub fn field(&self) -> Option<&str> {
        let key = match self {
            Query::Term(m) => m.keys().next(),
            Query::Terms(m) => m.keys().next(),
            Query::TermsSet(m) => m.keys().next(),
            Query::Range(m) => m.keys().next(),
            Query::Wildcard(m) => m.keys().next(),
            Query::MatchAll(_) | Query::Ids(_) | Query::Nested(_) | Query::Bool(_) => None,
        };
        key.map(String::as_str)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct MatchAllQuery {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub boost: Option<f32>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TermValue {
    pub value: Value,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct TermsSetParams {
    pub terms: Vec<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_should_match: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct RangeParams {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gt: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub gte: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lt: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lte: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct WildcardParams {
    pub value: String,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct IdsQuery {
    pub values: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct NestedQuery {
    pub path: String,
    pub query: Box<Query>,
}

/// Bool query. Empty clause lists are left out of the JSON.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
pub struct BoolQuery {
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub filter: Vec<Query>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub must: Vec<Query>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub should: Vec<Query>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub must_not: Vec<Query>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub minimum_should_match: Option<Value>,
}

impl BoolQuery {
    pub fn is_empty(&self) -> bool {
        self.filter.is_empty()
            && self.must.is_empty()
            && self.should.is_empty()
            && self.must_not.is_empty()
    }
}
