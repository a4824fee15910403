//! Errors raised while reading engine responses

/// Wire decoding errors
#[derive(Debug, thiserror::Error)]
pub enum DslError {
    #[error("Unsupported aggregation type: {0}")]
    UnsupportedAggregation(String),

    #[error("Invalid aggregate '{name}': {reason}")]
    InvalidAggregate { name: String, reason: String },
}

impl DslError {
    pub(crate) fn invalid(name: &str, reason: impl ToString) -> Self {
        Self::InvalidAggregate {
            name: name.to_string(),
            reason: reason.to_string(),
        }
    }
}
