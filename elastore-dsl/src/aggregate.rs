//! Aggregation results
//!
//! Searches are sent with `typed_keys=true`, so every aggregation in a
//! response is keyed `<kind>#<name>` (`sterms#aggs`, `nested#0`, ...). The kind
//! prefix selects the [`Aggregate`] variant; anything outside the known set is
//! rejected with [`DslError::UnsupportedAggregation`].

use crate::error::DslError;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Named aggregation results, keyed without the type prefix
pub type Aggregates = HashMap<String, Aggregate>;

#[derive(Debug, Clone, PartialEq)]
pub enum Aggregate {
    Cardinality(ValueAggregate),
    Avg(ValueAggregate),
    Min(ValueAggregate),
    Max(ValueAggregate),
    Sum(ValueAggregate),
    StringTerms(TermsAggregate<String>),
    LongTerms(TermsAggregate<i64>),
    DoubleTerms(TermsAggregate<f64>),
    /// Terms on a field no target index maps
    UnmappedTerms,
    DateHistogram(HistogramAggregate),
    AutoDateHistogram(HistogramAggregate),
    Nested(SingleBucketAggregate),
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ValueAggregate {
    /// `null` when no document had the field
    pub value: Option<f64>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct TermsAggregate<K> {
    pub buckets: Vec<Bucket<K>>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct HistogramAggregate {
    /// Bucket start, epoch milliseconds
    pub buckets: Vec<Bucket<i64>>,
    /// Interval picked by the engine (auto histograms only)
    pub interval: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Bucket<K> {
    pub key: K,
    pub key_as_string: Option<String>,
    pub doc_count: i64,
    pub aggregations: Aggregates,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SingleBucketAggregate {
    pub doc_count: i64,
    pub aggregations: Aggregates,
}

impl Aggregate {
    /// The `typed_keys` prefix of this variant
    pub fn kind(&self) -> &'static str {
        match self {
            Aggregate::Cardinality(_) => "cardinality",
            Aggregate::Avg(_) => "avg",
            Aggregate::Min(_) => "min",
            Aggregate::Max(_) => "max",
            Aggregate::Sum(_) => "sum",
            Aggregate::StringTerms(_) => "sterms",
            Aggregate::LongTerms(_) => "lterms",
            Aggregate::DoubleTerms(_) => "dterms",
            Aggregate::UnmappedTerms => "umterms",
            Aggregate::DateHistogram(_) => "date_histogram",
            Aggregate::AutoDateHistogram(_) => "auto_date_histogram",
            Aggregate::Nested(_) => "nested",
        }
    }

    /// Parse one aggregate body given its kind prefix
    pub fn parse(kind: &str, name: &str, body: &Value) -> Result<Self, DslError> {
        let agg = match kind {
            "cardinality" => Aggregate::Cardinality(parse_value(body)),
            "avg" => Aggregate::Avg(parse_value(body)),
            "min" => Aggregate::Min(parse_value(body)),
            "max" => Aggregate::Max(parse_value(body)),
            "sum" => Aggregate::Sum(parse_value(body)),
            "sterms" => Aggregate::StringTerms(TermsAggregate {
                buckets: parse_buckets(name, body)?,
            }),
            "lterms" => Aggregate::LongTerms(TermsAggregate {
                buckets: parse_buckets(name, body)?,
            }),
            "dterms" => Aggregate::DoubleTerms(TermsAggregate {
                buckets: parse_buckets(name, body)?,
            }),
            "umterms" => Aggregate::UnmappedTerms,
            "date_histogram" => Aggregate::DateHistogram(parse_histogram(name, body)?),
            "auto_date_histogram" => Aggregate::AutoDateHistogram(parse_histogram(name, body)?),
            "nested" => {
                let obj = as_object(name, body)?;
                Aggregate::Nested(SingleBucketAggregate {
                    doc_count: doc_count(obj),
                    aggregations: parse_aggregates(obj)?,
                })
            }
            other => return Err(DslError::UnsupportedAggregation(other.to_string())),
        };
        Ok(agg)
    }
}

/// Parse every `kind#name` entry of a JSON object. Plain keys (`doc_count`,
/// `key`, ...) are skipped.
pub fn parse_aggregates(obj: &Map<String, Value>) -> Result<Aggregates, DslError> {
    let mut out = HashMap::new();
    for (typed_key, body) in obj {
        let Some((kind, name)) = typed_key.split_once('#') else {
            continue;
        };
        out.insert(name.to_string(), Aggregate::parse(kind, name, body)?);
    }
    Ok(out)
}

fn as_object<'a>(name: &str, body: &'a Value) -> Result<&'a Map<String, Value>, DslError> {
    body.as_object()
        .ok_or_else(|| DslError::invalid(name, "expected an object"))
}

fn doc_count(obj: &Map<String, Value>) -> i64 {
    obj.get("doc_count").and_then(Value::as_i64).unwrap_or(0)
}

fn parse_value(body: &Value) -> ValueAggregate {
    ValueAggregate {
        value: body.get("value").and_then(Value::as_f64),
    }
}

fn parse_histogram(name: &str, body: &Value) -> Result<HistogramAggregate, DslError> {
    Ok(HistogramAggregate {
        buckets: parse_buckets(name, body)?,
        interval: body
            .get("interval")
            .and_then(Value::as_str)
            .map(str::to_string),
    })
}

fn parse_buckets<K: DeserializeOwned>(name: &str, body: &Value) -> Result<Vec<Bucket<K>>, DslError> {
    let buckets = match body.get("buckets") {
        Some(Value::Array(items)) => items,
        Some(_) => return Err(DslError::invalid(name, "keyed buckets are not supported")),
        None => return Ok(Vec::new()),
    };

    buckets
        .iter()
        .map(|bucket| {
            let obj = as_object(name, bucket)?;
            let key = obj
                .get("key")
                .cloned()
                .ok_or_else(|| DslError::invalid(name, "bucket without key"))?;
            let key = serde_json::from_value(key).map_err(|e| DslError::invalid(name, e))?;
            Ok(Bucket {
                key,
                key_as_string: obj
                    .get("key_as_string")
                    .and_then(Value::as_str)
                    .map(str::to_string),
                doc_count: doc_count(obj),
                aggregations: parse_aggregates(obj)?,
            })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn parse(value: Value) -> Result<Aggregates, DslError> {
        parse_aggregates(value.as_object().unwrap())
    }

    // ===== Metrics =====

    #[test]
    fn test_parse_sum() {
        let aggs = parse(json!({"sum#aggs": {"value": 42.5}})).unwrap();
        assert_eq!(
            aggs["aggs"],
            Aggregate::Sum(ValueAggregate { value: Some(42.5) })
        );
    }

    #[test]
    fn test_parse_null_avg() {
        let aggs = parse(json!({"avg#aggs": {"value": null}})).unwrap();
        assert_eq!(aggs["aggs"], Aggregate::Avg(ValueAggregate { value: None }));
    }

    // ===== Buckets =====

    #[test]
    fn test_parse_string_terms_with_sub_metric() {
        let aggs = parse(json!({
            "sterms#aggs": {
                "doc_count_error_upper_bound": 0,
                "sum_other_doc_count": 0,
                "buckets": [
                    {"key": "red", "doc_count": 10, "avg#avg": {"value": 3.0}},
                    {"key": "blue", "doc_count": 3}
                ]
            }
        }))
        .unwrap();
        match &aggs["aggs"] {
            Aggregate::StringTerms(t) => {
                assert_eq!(t.buckets.len(), 2);
                assert_eq!(t.buckets[0].key, "red");
                assert_eq!(t.buckets[0].doc_count, 10);
                assert!(t.buckets[0].aggregations.contains_key("avg"));
                assert!(t.buckets[1].aggregations.is_empty());
            }
            other => panic!("Expected StringTerms, got {}", other.kind()),
        }
    }

    #[test]
    fn test_parse_long_terms_keys() {
        let aggs = parse(json!({"lterms#aggs": {"buckets": [{"key": 7, "doc_count": 2}]}})).unwrap();
        match &aggs["aggs"] {
            Aggregate::LongTerms(t) => assert_eq!(t.buckets[0].key, 7),
            _ => panic!("Expected LongTerms"),
        }
    }

    #[test]
    fn test_parse_nested_histogram() {
        let aggs = parse(json!({
            "nested#0": {
                "doc_count": 4,
                "date_histogram#nested": {
                    "buckets": [
                        {"key_as_string": "1700000000000", "key": 1700000000000i64, "doc_count": 4}
                    ]
                }
            }
        }))
        .unwrap();
        match &aggs["0"] {
            Aggregate::Nested(n) => match &n.aggregations["nested"] {
                Aggregate::DateHistogram(h) => assert_eq!(h.buckets[0].key, 1_700_000_000_000),
                _ => panic!("Expected DateHistogram"),
            },
            _ => panic!("Expected Nested"),
        }
    }

    #[test]
    fn test_parse_auto_histogram_interval() {
        let aggs = parse(json!({
            "auto_date_histogram#0": {"buckets": [], "interval": "1d"}
        }))
        .unwrap();
        match &aggs["0"] {
            Aggregate::AutoDateHistogram(h) => assert_eq!(h.interval.as_deref(), Some("1d")),
            _ => panic!("Expected AutoDateHistogram"),
        }
    }

    // ===== Errors =====

    #[test]
    fn test_unknown_kind_is_rejected() {
        let err = parse(json!({"percentiles#aggs": {"values": {}}})).unwrap_err();
        assert!(matches!(err, DslError::UnsupportedAggregation(kind) if kind == "percentiles"));
    }

    #[test]
    fn test_bucket_without_key_is_invalid() {
        let err = parse(json!({"sterms#aggs": {"buckets": [{"doc_count": 1}]}})).unwrap_err();
        assert!(matches!(err, DslError::InvalidAggregate { .. }));
    }

    #[test]
    fn test_untyped_keys_are_skipped() {
        let aggs = parse(json!({"doc_count": 3, "key": "x"})).unwrap();
        assert!(aggs.is_empty());
    }
}
