//! Fluent query builder
//!
//! Configuration methods consume and return the builder; execution methods
//! borrow it, so one configured query can be run several ways:
//!
//! ```ignore
//! let query = store
//!     .query::<Hero>()
//!     .match_any([field("color").eq("red"), field("color").eq("white")])
//!     .sort("num-")
//!     .limit(20);
//! let total = query.count().await?;
//! let (heroes, _) = query.find().await?;
//! ```

use super::translator::{RangeFilter, Translation};
use crate::aggregations::{
    AggFunc, AggregationPlan, AggregationPlanner, GroupKey, GroupedResult, ResultDecoder,
    TimeSeries, TimeSeries2D,
};
use crate::bulk::BulkReport;
use crate::entity::{Entity, Timestamp};
use crate::error::{Error, Result};
use crate::filter::Filter;
use crate::index::index_pattern;
use crate::store::ElasticStore;
use crate::transport::Transport;
use elastore_dsl::aggregate::Aggregate;
use elastore_dsl::query::{CountRequest, Query, SearchRequest, SortClause};
use elastore_dsl::response::Hit;
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::marker::PhantomData;
use std::time::Duration;
use tracing::{debug, warn};

/// Post-processing step; `None` drops the entity from the result
pub type Callback<E> = Box<dyn Fn(E) -> Option<E> + Send + Sync>;

pub struct QueryBuilder<'s, E: Entity, T: Transport + 'static> {
    store: &'s ElasticStore<T>,
    all_filters: Vec<Vec<Filter>>,
    any_filters: Vec<Vec<Filter>>,
    asc_fields: Vec<String>,
    desc_fields: Vec<String>,
    callbacks: Vec<Callback<E>>,
    range: Option<RangeFilter>,
    page: usize,
    limit: usize,
    shard: String,
    last_query: Mutex<Option<String>>,
    _entity: PhantomData<fn() -> E>,
}

impl<'s, E: Entity, T: Transport + 'static> QueryBuilder<'s, E, T> {
    pub(crate) fn new(store: &'s ElasticStore<T>) -> Self {
        Self {
            store,
            all_filters: Vec::new(),
            any_filters: Vec::new(),
            asc_fields: Vec::new(),
            desc_fields: Vec::new(),
            callbacks: Vec::new(),
            range: None,
            page: 0,
            limit: store.config().default_limit,
            shard: String::new(),
            last_query: Mutex::new(None),
            _entity: PhantomData,
        }
    }

    // ===== Configuration =====

    /// Add one AND filter; inactive filters are ignored
    pub fn filter(mut self, filter: Filter) -> Self {
        if filter.is_active() {
            self.all_filters.push(vec![filter]);
        }
        self
    }

    /// Every filter must match
    pub fn match_all(mut self, filters: impl IntoIterator<Item = Filter>) -> Self {
        self.all_filters
            .push(filters.into_iter().filter(Filter::is_active).collect());
        self
    }

    /// At least one filter must match. Filters of repeated calls share a
    /// single OR group.
    pub fn match_any(mut self, filters: impl IntoIterator<Item = Filter>) -> Self {
        self.any_filters
            .push(filters.into_iter().filter(Filter::is_active).collect());
        self
    }

    /// Closed time range on `field`
    pub fn range(
        mut self,
        field: impl Into<String>,
        from: impl Into<Timestamp>,
        to: impl Into<Timestamp>,
    ) -> Self {
        self.range = Some(RangeFilter {
            field: field.into(),
            from: from.into(),
            to: to.into(),
        });
        self
    }

    /// `field` or `field+` sorts ascending, `field-` descending. Ascending
    /// fields take precedence over descending ones. A bare suffix is ignored.
    pub fn sort(mut self, sort: &str) -> Self {
        let (field, descending) = match sort.strip_suffix('-') {
            Some(field) => (field, true),
            None => (sort.strip_suffix('+').unwrap_or(sort), false),
        };
        if field.is_empty() {
            return self;
        }
        if descending {
            self.desc_fields.push(field.to_string());
        } else {
            self.asc_fields.push(field.to_string());
        }
        self
    }

    /// Page size; also bounds terms buckets and the auto histogram target
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    /// Zero-based page number
    pub fn page(mut self, page: usize) -> Self {
        self.page = page;
        self
    }

    pub fn apply(mut self, callback: impl Fn(E) -> Option<E> + Send + Sync + 'static) -> Self {
        self.callbacks.push(Box::new(callback));
        self
    }

    /// Shard (account) key narrowing the index pattern
    pub fn key(mut self, shard: impl Into<String>) -> Self {
        self.shard = shard.into();
        self
    }

    // ===== Compilation =====

    fn translate(&self) -> Result<Translation> {
        let and: Vec<Filter> = self.all_filters.iter().flatten().cloned().collect();
        let or: Vec<Filter> = self.any_filters.iter().flatten().cloned().collect();
        self.store
            .translator()
            .translate(&and, &or, self.range.as_ref())
    }

    fn build_query(&self) -> Result<Query> {
        Ok(self.translate()?.into_query())
    }

    fn build_sort(&self) -> Vec<SortClause> {
        self.asc_fields
            .iter()
            .map(SortClause::asc)
            .chain(self.desc_fields.iter().map(SortClause::desc))
            .collect()
    }

    /// The search request `find` sends
    pub fn compile(&self) -> Result<SearchRequest> {
        Ok(SearchRequest {
            query: Some(self.build_query()?),
            sort: self.build_sort(),
            from: Some(self.page.saturating_mul(self.limit)),
            size: Some(self.limit),
            ..Default::default()
        })
    }

    fn pattern(&self) -> String {
        index_pattern(&E::table(), &self.shard)
    }

    /// DSL of the last request this builder sent
    pub fn last_query(&self) -> Option<String> {
        self.last_query.lock().clone()
    }

    fn remember<R: serde::Serialize>(&self, request: &R) {
        match serde_json::to_string(request) {
            Ok(dsl) => {
                debug!("{} query: {}", E::table(), dsl);
                *self.last_query.lock() = Some(dsl);
            }
            Err(e) => warn!("Cannot serialize query for {}: {}", E::table(), e),
        }
    }

    fn process(&self, entity: E) -> Option<E> {
        self.callbacks.iter().try_fold(entity, |entity, cb| cb(entity))
    }

    fn decode_hits(&self, hits: Vec<Hit>) -> Vec<E> {
        hits.into_iter()
            .filter_map(|hit| match serde_json::from_value::<E>(hit.source) {
                Ok(entity) => Some(entity),
                Err(e) => {
                    warn!("Skipping {}/{}: {}", hit.index, hit.id, e);
                    None
                }
            })
            .filter_map(|entity| self.process(entity))
            .collect()
    }

    // ===== Find =====

    /// One page of matching entities and the total match count
    pub async fn find(&self) -> Result<(Vec<E>, u64)> {
        let total = self.count().await?;
        let request = self.compile()?;
        self.remember(&request);
        let response = self.store.search(&self.pattern(), &request).await?;
        Ok((self.decode_hits(response.hits.hits), total))
    }

    /// Entities by id; filters are not applied, callbacks are
    pub async fn list<S: AsRef<str>>(&self, ids: &[S]) -> Result<Vec<E>> {
        let entities = self.store.list::<E, S>(ids, &self.shard).await?;
        Ok(entities
            .into_iter()
            .filter_map(|entity| self.process(entity))
            .collect())
    }

    /// Matching entities as JSON objects reduced to `fields` (all fields
    /// when empty)
    pub async fn select(&self, fields: &[&str]) -> Result<Vec<Map<String, Value>>> {
        let (entities, _) = self.find().await?;
        entities
            .iter()
            .map(|entity| -> Result<Map<String, Value>> {
                let Value::Object(object) = serde_json::to_value(entity)? else {
                    return Ok(Map::new());
                };
                if fields.is_empty() {
                    return Ok(object);
                }
                Ok(object
                    .into_iter()
                    .filter(|(k, _)| fields.contains(&k.as_str()))
                    .collect())
            })
            .collect()
    }

    pub async fn find_single(&self) -> Result<E> {
        let (entities, _) = self.find().await?;
        entities
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("no {} matches the query", self.pattern())))
    }

    pub async fn get_map(&self) -> Result<HashMap<String, E>> {
        let (entities, _) = self.find().await?;
        Ok(entities.into_iter().map(|e| (e.id(), e)).collect())
    }

    pub async fn get_ids(&self) -> Result<Vec<String>> {
        let (entities, _) = self.find().await?;
        Ok(entities.iter().map(|e| e.id()).collect())
    }

    // ===== Mutations =====

    /// Delete the matching entities of the current page
    pub async fn delete(&self) -> Result<BulkReport> {
        let ids = self.get_ids().await?;
        self.store.bulk_delete::<E, String>(&ids, &self.shard).await
    }

    pub async fn set_field(&self, field: &str, value: impl Into<Value>) -> Result<BulkReport> {
        let mut fields = Map::new();
        fields.insert(field.to_string(), value.into());
        self.set_fields(fields).await
    }

    /// Merge `fields` into every matching entity and write them back
    pub async fn set_fields(&self, fields: Map<String, Value>) -> Result<BulkReport> {
        let (entities, _) = self.find().await?;
        let changed: Vec<E> = entities
            .iter()
            .filter_map(|entity| match merge_fields(entity, &fields) {
                Ok(changed) => Some(changed),
                Err(e) => {
                    warn!("Cannot set fields on {}: {}", entity.id(), e);
                    None
                }
            })
            .collect();
        self.store.bulk_update(&changed).await
    }

    // ===== Aggregations =====

    pub async fn count(&self) -> Result<u64> {
        let request = CountRequest {
            query: Some(self.build_query()?),
        };
        self.remember(&request);
        self.store.count(&self.pattern(), &request).await
    }

    fn planner(&self) -> AggregationPlanner {
        AggregationPlanner::new(self.limit)
    }

    async fn aggregate(&self, plan: AggregationPlan) -> Result<Option<Aggregate>> {
        let name = plan.name;
        let request = plan.into_request(self.build_query()?);
        self.remember(&request);
        let response = self.store.search(&self.pattern(), &request).await?;
        let mut aggregates = response.aggregates()?;
        Ok(aggregates.remove(name))
    }

    /// `function` of `field` over all matches; `Count` is a distinct count
    pub async fn aggregation(&self, field: &str, function: AggFunc) -> Result<f64> {
        match self.aggregate(self.planner().scalar(field, function)).await? {
            Some(agg) => ResultDecoder::scalar(&agg),
            None => Ok(0.0),
        }
    }

    /// Document count per distinct value of `field`, and their sum
    pub async fn group_count(&self, field: &str) -> Result<(HashMap<GroupKey, i64>, i64)> {
        let result = self.group_aggregation(field, AggFunc::Count).await?;
        Ok((result.counts(), result.total as i64))
    }

    /// Terms on `field` with `function` of the same field per bucket
    pub async fn group_aggregation(&self, field: &str, function: AggFunc) -> Result<GroupedResult> {
        self.group_aggregation_by(field, field, function).await
    }

    /// Terms on `group_field` with `function` of `metric_field` per bucket
    pub async fn group_aggregation_by(
        &self,
        group_field: &str,
        metric_field: &str,
        function: AggFunc,
    ) -> Result<GroupedResult> {
        let plan = self.planner().grouped(group_field, metric_field, function);
        match self.aggregate(plan).await? {
            Some(agg) => ResultDecoder::grouped(&agg),
            None => Ok(GroupedResult::default()),
        }
    }

    /// `function` of `field` per `interval` of `time_field`; a zero interval
    /// lets the engine choose, with at most `limit` buckets
    pub async fn histogram(
        &self,
        field: &str,
        function: AggFunc,
        time_field: &str,
        interval: Duration,
    ) -> Result<TimeSeries> {
        let plan = self.planner().histogram(field, function, time_field, interval);
        match self.aggregate(plan).await? {
            Some(agg) => ResultDecoder::histogram(&agg),
            None => Ok(TimeSeries::default()),
        }
    }

    /// Like [`histogram`](Self::histogram), split per value of `dim`
    pub async fn histogram_2d(
        &self,
        field: &str,
        function: AggFunc,
        dim: &str,
        time_field: &str,
        interval: Duration,
    ) -> Result<TimeSeries2D> {
        let plan = self
            .planner()
            .histogram_2d(field, function, dim, time_field, interval);
        match self.aggregate(plan).await? {
            Some(agg) => ResultDecoder::histogram_2d(&agg, function.as_str()),
            None => Ok(TimeSeries2D::default()),
        }
    }
}

/// Serialize, overwrite `fields`, deserialize
pub(crate) fn merge_fields<E: Entity>(entity: &E, fields: &Map<String, Value>) -> Result<E> {
    let mut value = serde_json::to_value(entity)?;
    match value.as_object_mut() {
        Some(object) => {
            for (k, v) in fields {
                object.insert(k.clone(), v.clone());
            }
        }
        None => {
            return Err(Error::Conversion {
                field: "_source".to_string(),
                value: value.to_string(),
            })
        }
    }
    Ok(serde_json::from_value(value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::StoreConfig;
    use crate::filter::field;
    use crate::transport::{TransportRequest, TransportResponse};
    use async_trait::async_trait;
    use serde::{Deserialize, Serialize};
    use serde_json::json;
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
    struct Hero {
        id: String,
        color: String,
        num: i64,
    }

    impl Entity for Hero {
        fn table() -> String {
            "hero-{accountId}-{year}.{month}".to_string()
        }

        fn id(&self) -> String {
            self.id.clone()
        }
    }

    struct Unreachable;

    #[async_trait]
    impl Transport for Unreachable {
        async fn send(&self, request: TransportRequest) -> Result<TransportResponse> {
            Err(Error::Transport(format!("unexpected request {}", request.path)))
        }
    }

    fn store() -> ElasticStore<Unreachable> {
        ElasticStore::with_transport(Arc::new(Unreachable), StoreConfig::default())
    }

    // ===== Compilation =====

    #[test]
    fn test_sort_ascending_before_descending() {
        let store = store();
        let request = store
            .query::<Hero>()
            .sort("num-")
            .sort("color")
            .sort("id+")
            .sort("")
            .compile()
            .unwrap();
        assert_eq!(
            serde_json::to_value(&request.sort).unwrap(),
            json!([
                {"color": {"order": "asc"}},
                {"id": {"order": "asc"}},
                {"num": {"order": "desc"}}
            ])
        );
    }

    #[test]
    fn test_page_offset_is_page_times_limit() {
        let store = store();
        let request = store.query::<Hero>().limit(20).page(3).compile().unwrap();
        assert_eq!(request.from, Some(60));
        assert_eq!(request.size, Some(20));
    }

    #[test]
    fn test_bare_sort_suffix_is_ignored() {
        let store = store();
        let request = store
            .query::<Hero>()
            .sort("-")
            .sort("+")
            .sort("num-")
            .compile()
            .unwrap();
        assert_eq!(
            serde_json::to_value(&request.sort).unwrap(),
            json!([{"num": {"order": "desc"}}])
        );
    }

    #[test]
    fn test_huge_page_offset_saturates() {
        let store = store();
        let request = store
            .query::<Hero>()
            .limit(usize::MAX / 2)
            .page(3)
            .compile()
            .unwrap();
        assert_eq!(request.from, Some(usize::MAX));
    }

    #[test]
    fn test_default_limit_from_config() {
        let store = store();
        let request = store.query::<Hero>().compile().unwrap();
        assert_eq!(request.size, Some(100));
        assert_eq!(request.from, Some(0));
    }

    #[test]
    fn test_inactive_filters_are_ignored() {
        let store = store();
        let request = store
            .query::<Hero>()
            .filter(field("color").eq("red").when(false))
            .match_all([field("num").gt(3).when(false)])
            .compile()
            .unwrap();
        assert_eq!(request.query, Some(Query::match_all()));
    }

    #[test]
    fn test_repeated_match_any_flattens() {
        let store = store();
        let request = store
            .query::<Hero>()
            .match_any([field("color").eq("red")])
            .match_any([field("color").eq("white")])
            .compile()
            .unwrap();
        let query = serde_json::to_value(request.query.unwrap()).unwrap();
        assert_eq!(query["bool"]["should"][0]["bool"]["should"].as_array().unwrap().len(), 2);
        assert_eq!(query["bool"]["minimum_should_match"], json!(1));
    }

    #[test]
    fn test_range_joins_filter() {
        let store = store();
        let request = store
            .query::<Hero>()
            .filter(field("color").eq("red"))
            .range("createdOn", Timestamp(1_000), Timestamp(2_000))
            .compile()
            .unwrap();
        let query = serde_json::to_value(request.query.unwrap()).unwrap();
        assert_eq!(
            query["bool"]["filter"][1],
            json!({"range": {"createdOn": {"gte": 1000, "lte": 2000, "format": "epoch_millis"}}})
        );
    }

    // ===== Post-processing =====

    #[test]
    fn test_callbacks_chain_and_drop() {
        let store = store();
        let query = store
            .query::<Hero>()
            .apply(|mut h: Hero| {
                h.num *= 2;
                Some(h)
            })
            .apply(|h: Hero| (h.num > 4).then_some(h));
        let hits = vec![
            Hit {
                index: "hero-1".into(),
                id: "1".into(),
                source: json!({"id": "1", "color": "red", "num": 1}),
            },
            Hit {
                index: "hero-1".into(),
                id: "2".into(),
                source: json!({"id": "2", "color": "red", "num": 3}),
            },
            Hit {
                index: "hero-1".into(),
                id: "3".into(),
                source: json!({"broken": true}),
            },
        ];
        let entities = query.decode_hits(hits);
        assert_eq!(entities.len(), 1);
        assert_eq!(entities[0].num, 6);
    }

    #[test]
    fn test_merge_fields() {
        let hero = Hero {
            id: "1".into(),
            color: "red".into(),
            num: 1,
        };
        let mut fields = Map::new();
        fields.insert("color".into(), json!("white"));
        let merged = merge_fields(&hero, &fields).unwrap();
        assert_eq!(merged.color, "white");
        assert_eq!(merged.num, 1);

        fields.insert("num".into(), json!("not a number"));
        assert!(merge_fields(&hero, &fields).is_err());
    }

    #[tokio::test]
    async fn test_transport_error_surfaces() {
        let store = store();
        let err = store.query::<Hero>().count().await.unwrap_err();
        assert_eq!(err.error_type(), "transport");
    }
}
