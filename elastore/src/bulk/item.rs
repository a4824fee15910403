//! Bulk items and their NDJSON encoding

use crate::error::Result;
use elastore_dsl::response::BulkItemResult;
use serde_json::{json, Map, Value};
use std::fmt;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BulkAction {
    Index,
    Update,
    Delete,
}

impl BulkAction {
    pub fn as_str(&self) -> &'static str {
        match self {
            BulkAction::Index => "index",
            BulkAction::Update => "update",
            BulkAction::Delete => "delete",
        }
    }
}

impl fmt::Display for BulkAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a single bulk item did not succeed
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ItemFailure {
    /// Reported by the engine for this item
    #[error("{error_type} ({status}): {reason}")]
    Engine {
        status: u16,
        error_type: String,
        reason: String,
    },

    /// The whole bulk request failed
    #[error("{0}")]
    Transport(String),
}

impl ItemFailure {
    pub(crate) fn from_result(result: &BulkItemResult) -> Self {
        let (error_type, reason) = match &result.error {
            Some(cause) => (
                cause.error_type.clone(),
                cause
                    .reason
                    .clone()
                    .unwrap_or_else(|| format!("HTTP status {}", result.status)),
            ),
            None => (
                String::new(),
                result
                    .result
                    .clone()
                    .unwrap_or_else(|| format!("HTTP status {}", result.status)),
            ),
        };
        ItemFailure::Engine {
            status: result.status,
            error_type,
            reason,
        }
    }
}

pub type SuccessHook = Box<dyn FnOnce(&BulkItemResult) + Send>;
pub type FailureHook = Box<dyn FnOnce(&ItemFailure) + Send>;

/// One queued mutation
pub struct BulkItem {
    pub action: BulkAction,
    pub index: String,
    pub id: String,
    /// Document for `index`, update body (`{"doc": ..}`) for `update`
    pub body: Option<Value>,
    pub(crate) on_success: Option<SuccessHook>,
    pub(crate) on_failure: Option<FailureHook>,
}

impl BulkItem {
    fn new(action: BulkAction, index: impl Into<String>, id: impl Into<String>, body: Option<Value>) -> Self {
        Self {
            action,
            index: index.into(),
            id: id.into(),
            body,
            on_success: None,
            on_failure: None,
        }
    }

    /// Full document replace
    pub fn index(index: impl Into<String>, id: impl Into<String>, document: Value) -> Self {
        Self::new(BulkAction::Index, index, id, Some(document))
    }

    /// Partial update; `body` is the complete update body
    pub fn update(index: impl Into<String>, id: impl Into<String>, body: Value) -> Self {
        Self::new(BulkAction::Update, index, id, Some(body))
    }

    /// Merge `doc` into the stored document
    pub fn merge(index: impl Into<String>, id: impl Into<String>, doc: Value) -> Self {
        Self::update(index, id, json!({ "doc": doc }))
    }

    /// Merge `doc`, creating the document when it does not exist
    pub fn upsert(index: impl Into<String>, id: impl Into<String>, doc: Value) -> Self {
        Self::update(index, id, json!({ "doc": doc, "doc_as_upsert": true }))
    }

    pub fn delete(index: impl Into<String>, id: impl Into<String>) -> Self {
        Self::new(BulkAction::Delete, index, id, None)
    }

    pub fn on_success(mut self, hook: impl FnOnce(&BulkItemResult) + Send + 'static) -> Self {
        self.on_success = Some(Box::new(hook));
        self
    }

    pub fn on_failure(mut self, hook: impl FnOnce(&ItemFailure) + Send + 'static) -> Self {
        self.on_failure = Some(Box::new(hook));
        self
    }

    /// Action line plus body line, each newline terminated
    pub fn encode(&self) -> Result<String> {
        let mut header = Map::new();
        header.insert(
            self.action.as_str().to_string(),
            json!({ "_index": self.index, "_id": self.id }),
        );
        let mut lines = serde_json::to_string(&header)?;
        lines.push('\n');
        if let Some(body) = &self.body {
            lines.push_str(&serde_json::to_string(body)?);
            lines.push('\n');
        }
        Ok(lines)
    }
}

impl fmt::Debug for BulkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BulkItem")
            .field("action", &self.action)
            .field("index", &self.index)
            .field("id", &self.id)
            .field("body", &self.body)
            .finish()
    }
}
