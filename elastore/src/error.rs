//! Error types for elastore

use elastore_dsl::response::ErrorResponse;
use elastore_dsl::DslError;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Cannot convert value {value} of field '{field}' to a number")]
    Conversion { field: String, value: String },

    #[error("Unsupported aggregation function: {0}")]
    UnsupportedFunction(String),

    #[error("Unsupported operator: {0}")]
    UnsupportedOperator(String),

    #[error("Unsupported aggregation type: {0}")]
    UnsupportedAggregationType(String),

    #[error("Invalid aggregation result: {0}")]
    InvalidAggregation(String),

    #[error("Transport error: {0}")]
    Transport(String),

    #[error("Engine error ({status}): {reason}")]
    Engine { status: u16, reason: String },

    #[error("Bulk operation partially failed: {affected} affected, {failed} failed")]
    PartialBulkFailure { affected: u64, failed: u64 },

    #[error("Bulk flush failed after {affected} affected, {failed} failed: {reason}")]
    BulkFlush {
        affected: u64,
        failed: u64,
        reason: String,
    },

    #[error("Bulk indexer is closed")]
    BulkClosed,

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),
}

impl From<reqwest::Error> for Error {
    fn from(err: reqwest::Error) -> Self {
        Error::Transport(err.to_string())
    }
}

impl From<DslError> for Error {
    fn from(err: DslError) -> Self {
        match err {
            DslError::UnsupportedAggregation(kind) => Error::UnsupportedAggregationType(kind),
            invalid @ DslError::InvalidAggregate { .. } => Error::InvalidAggregation(invalid.to_string()),
        }
    }
}

impl Error {
    /// Build an engine error from a non-2xx response body. The first root-cause
    /// reason is preferred, then the top-level reason, then the raw body.
    pub fn from_engine_response(status: u16, body: &[u8]) -> Self {
        let reason = serde_json::from_slice::<ErrorResponse>(body)
            .ok()
            .and_then(|resp| resp.reason())
            .unwrap_or_else(|| {
                let raw = String::from_utf8_lossy(body).trim().to_string();
                if raw.is_empty() {
                    format!("HTTP status {}", status)
                } else {
                    raw
                }
            });
        Error::Engine { status, reason }
    }

    /// Stable label used for metrics and logs
    pub fn error_type(&self) -> &'static str {
        match self {
            Error::NotFound(_) => "not_found",
            Error::Conversion { .. } => "conversion",
            Error::UnsupportedFunction(_) => "unsupported_function",
            Error::UnsupportedOperator(_) => "unsupported_operator",
            Error::UnsupportedAggregationType(_) => "unsupported_aggregation_type",
            Error::InvalidAggregation(_) => "invalid_aggregation",
            Error::Transport(_) => "transport",
            Error::Engine { .. } => "engine",
            Error::PartialBulkFailure { .. } => "partial_bulk_failure",
            Error::BulkFlush { .. } => "bulk_flush",
            Error::BulkClosed => "bulk_closed",
            Error::Json(_) => "json",
            Error::InvalidUrl(_) => "invalid_url",
            Error::Io(_) => "io",
            Error::Config(_) => "config",
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_) | Error::Engine { status: 404, .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engine_error_prefers_root_cause() {
        let body = br#"{"error":{"root_cause":[{"type":"mapper_parsing_exception","reason":"failed to parse field [num]"}],"type":"mapper_parsing_exception","reason":"outer"},"status":400}"#;
        match Error::from_engine_response(400, body) {
            Error::Engine { status, reason } => {
                assert_eq!(status, 400);
                assert_eq!(reason, "failed to parse field [num]");
            }
            other => panic!("Expected Engine, got {:?}", other),
        }
    }

    #[test]
    fn test_engine_error_falls_back_to_body() {
        match Error::from_engine_response(502, b"Bad Gateway") {
            Error::Engine { reason, .. } => assert_eq!(reason, "Bad Gateway"),
            other => panic!("Expected Engine, got {:?}", other),
        }
        match Error::from_engine_response(503, b"") {
            Error::Engine { reason, .. } => assert_eq!(reason, "HTTP status 503"),
            other => panic!("Expected Engine, got {:?}", other),
        }
    }

    #[test]
    fn test_dsl_error_conversion() {
        let err: Error = DslError::UnsupportedAggregation("percentiles".into()).into();
        assert_eq!(err.error_type(), "unsupported_aggregation_type");

        let err: Error = DslError::InvalidAggregate {
            name: "sterms#aggs".into(),
            reason: "missing field `buckets`".into(),
        }
        .into();
        match &err {
            Error::InvalidAggregation(message) => {
                assert!(message.contains("sterms#aggs"));
                assert!(message.contains("missing field `buckets`"));
            }
            other => panic!("Expected InvalidAggregation, got {:?}", other),
        }
        assert_eq!(err.error_type(), "invalid_aggregation");
    }

    #[test]
    fn test_not_found_detection() {
        assert!(Error::NotFound("hero/1".into()).is_not_found());
        assert!(Error::Engine {
            status: 404,
            reason: "missing".into()
        }
        .is_not_found());
        assert!(!Error::BulkClosed.is_not_found());
    }
}
