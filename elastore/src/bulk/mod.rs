//! Bulk writes
//!
//! [`BulkIndexer`] batches [`BulkItem`]s into `_bulk` requests on background
//! workers and accounts every item as flushed or failed. Individual items are
//! never retried; only whole requests are, by the transport.

mod indexer;
mod item;

pub use indexer::{BulkIndexer, BulkState, BulkStats};
pub use item::{BulkAction, BulkItem, FailureHook, ItemFailure, SuccessHook};

use crate::error::{Error, Result};

/// Outcome of a store-level bulk call
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkReport {
    pub affected: u64,
    pub failed: u64,
}

impl BulkReport {
    /// `PartialBulkFailure` when any item failed
    pub fn into_result(self) -> Result<Self> {
        if self.failed > 0 {
            Err(Error::PartialBulkFailure {
                affected: self.affected,
                failed: self.failed,
            })
        } else {
            Ok(self)
        }
    }
}

impl From<BulkStats> for BulkReport {
    fn from(stats: BulkStats) -> Self {
        Self {
            affected: stats.flushed,
            failed: stats.failed,
        }
    }
}
