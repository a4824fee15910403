//! Engine response types

use crate::aggregate::{parse_aggregates, Aggregates};
use crate::error::DslError;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Search response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchResponse {
    #[serde(default)]
    pub took: u64,
    #[serde(default)]
    pub timed_out: bool,
    #[serde(default)]
    pub hits: HitsResponse,
    /// Raw `typed_keys` aggregations; see [`SearchResponse::aggregates`]
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregations: Option<Map<String, Value>>,
}

impl SearchResponse {
    /// Decode the aggregations section into the closed [`Aggregate`](crate::Aggregate) set
    pub fn aggregates(&self) -> Result<Aggregates, DslError> {
        match &self.aggregations {
            Some(raw) => parse_aggregates(raw),
            None => Ok(HashMap::new()),
        }
    }

    pub fn total_hits(&self) -> u64 {
        self.hits.total.as_ref().map(|t| t.value).unwrap_or(0)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct HitsResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total: Option<TotalHits>,
    #[serde(default)]
    pub hits: Vec<Hit>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TotalHits {
    pub value: u64,
    #[serde(default)]
    pub relation: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Hit {
    #[serde(rename = "_index")]
    pub index: String,
    #[serde(rename = "_id")]
    pub id: String,
    #[serde(rename = "_source", default)]
    pub source: Value,
}

/// `_count` response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CountResponse {
    pub count: u64,
}

/// `_bulk` response
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkResponse {
    #[serde(default)]
    pub took: u64,
    #[serde(default)]
    pub errors: bool,
    /// One single-entry map per item, keyed by action name
    #[serde(default)]
    pub items: Vec<HashMap<String, BulkItemResult>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BulkItemResult {
    #[serde(rename = "_index", default)]
    pub index: String,
    #[serde(rename = "_id", default)]
    pub id: String,
    #[serde(default)]
    pub status: u16,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorCause>,
}

/// Engine error body: `{"error": {...}, "status": 400}`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorBody,
    #[serde(default)]
    pub status: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ErrorBody {
    Cause(ErrorCause),
    Message(String),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorCause {
    #[serde(rename = "type", default)]
    pub error_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub root_cause: Vec<ErrorCause>,
}

impl ErrorResponse {
    /// Human readable reason: first root cause, then the top-level reason
    pub fn reason(&self) -> Option<String> {
        match &self.error {
            ErrorBody::Message(msg) => Some(msg.clone()),
            ErrorBody::Cause(cause) => cause
                .root_cause
                .iter()
                .find_map(|rc| rc.reason.clone())
                .or_else(|| cause.reason.clone()),
        }
    }
}

/// One row of `_cat/indices?format=json`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatIndex {
    pub index: String,
    #[serde(default)]
    pub health: Option<String>,
    #[serde(default)]
    pub status: Option<String>,
    #[serde(rename = "docs.count", default)]
    pub docs_count: Option<String>,
}
