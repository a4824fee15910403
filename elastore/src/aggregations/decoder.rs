//! Aggregation result decoding
//!
//! Projects [`Aggregate`] trees into scalars, per-group data points and time
//! series. Nested wrappers are unwrapped transparently. Each bucket reports
//! its document count, replaced by its sub-metric value when it carries
//! exactly one.

use super::planner::NESTED_KEY;
use super::types::{DataPoint, GroupKey, GroupedResult, TimeSeries, TimeSeries2D};
use crate::entity::Timestamp;
use crate::error::{Error, Result};
use elastore_dsl::aggregate::{Aggregate, Aggregates, Bucket};

pub struct ResultDecoder;

impl ResultDecoder {
    /// Follow nested wrappers down to the first non-nested aggregate
    pub fn unwrap_nested(agg: &Aggregate) -> Result<&Aggregate> {
        let mut current = agg;
        while let Aggregate::Nested(nested) = current {
            current = match nested.aggregations.get(NESTED_KEY) {
                Some(child) => child,
                None if nested.aggregations.len() == 1 => nested
                    .aggregations
                    .values()
                    .next()
                    .ok_or_else(|| Error::InvalidAggregation("empty nested aggregate".into()))?,
                None => {
                    return Err(Error::InvalidAggregation(format!(
                        "nested aggregate has {} children and no '{}' key",
                        nested.aggregations.len(),
                        NESTED_KEY
                    )))
                }
            };
        }
        Ok(current)
    }

    /// Value of a single-metric aggregate; `null` metrics decode to 0
    pub fn scalar(agg: &Aggregate) -> Result<f64> {
        match Self::unwrap_nested(agg)? {
            Aggregate::Cardinality(v)
            | Aggregate::Avg(v)
            | Aggregate::Min(v)
            | Aggregate::Max(v)
            | Aggregate::Sum(v) => Ok(v.value.unwrap_or(0.0)),
            other => Err(Error::UnsupportedAggregationType(other.kind().to_string())),
        }
    }

    /// Terms buckets to group data points
    pub fn grouped(agg: &Aggregate) -> Result<GroupedResult> {
        let mut result = GroupedResult::default();
        match Self::unwrap_nested(agg)? {
            Aggregate::StringTerms(t) => {
                Self::collect_groups(&t.buckets, |k| GroupKey::Str(k.clone()), &mut result)
            }
            Aggregate::LongTerms(t) => Self::collect_groups(&t.buckets, |k| GroupKey::Int(*k), &mut result),
            Aggregate::DoubleTerms(t) => {
                Self::collect_groups(&t.buckets, |k| GroupKey::Float(*k), &mut result)
            }
            Aggregate::UnmappedTerms => {}
            other => return Err(Error::UnsupportedAggregationType(other.kind().to_string())),
        }
        Ok(result)
    }

    /// Date histogram buckets to a time series
    pub fn histogram(agg: &Aggregate) -> Result<TimeSeries> {
        let mut series = TimeSeries::default();
        for bucket in Self::time_buckets(agg)? {
            let point = Self::data_point(bucket.doc_count, &bucket.aggregations);
            series.total += point.value;
            series.buckets.insert(Timestamp(bucket.key), point);
        }
        Ok(series)
    }

    /// Date histogram buckets, each holding terms under `group_key`
    pub fn histogram_2d(agg: &Aggregate, group_key: &str) -> Result<TimeSeries2D> {
        let mut series = TimeSeries2D::default();
        for bucket in Self::time_buckets(agg)? {
            let groups = match bucket.aggregations.get(group_key) {
                Some(terms) => Self::grouped(terms)?,
                None => GroupedResult::default(),
            };
            series.total += groups.total;
            series.buckets.insert(Timestamp(bucket.key), groups.groups);
        }
        Ok(series)
    }

    fn time_buckets(agg: &Aggregate) -> Result<&[Bucket<i64>]> {
        match Self::unwrap_nested(agg)? {
            Aggregate::DateHistogram(h) | Aggregate::AutoDateHistogram(h) => Ok(&h.buckets),
            other => Err(Error::UnsupportedAggregationType(other.kind().to_string())),
        }
    }

    fn collect_groups<K>(buckets: &[Bucket<K>], key: impl Fn(&K) -> GroupKey, out: &mut GroupedResult) {
        for bucket in buckets {
            let point = Self::data_point(bucket.doc_count, &bucket.aggregations);
            out.total += point.value;
            out.groups.insert(key(&bucket.key), point);
        }
    }

    /// Document count as fallback value, replaced by a lone sub-metric
    fn data_point(doc_count: i64, aggregations: &Aggregates) -> DataPoint {
        let mut metrics = aggregations.values().filter_map(|agg| match agg {
            Aggregate::Cardinality(v)
            | Aggregate::Avg(v)
            | Aggregate::Min(v)
            | Aggregate::Max(v)
            | Aggregate::Sum(v) => Some(v.value.unwrap_or(0.0)),
            _ => None,
        });
        let value = match (metrics.next(), metrics.next()) {
            (Some(value), None) => value,
            _ => doc_count as f64,
        };
        DataPoint::new(doc_count, value)
    }
}
