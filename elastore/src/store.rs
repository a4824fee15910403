//! Datastore handle
//!
//! [`ElasticStore`] owns the transport and the configuration. Reads go
//! through an `ids` search over the entity's index pattern because a
//! document's concrete index depends on when it was written.

use crate::bulk::{BulkIndexer, BulkItem, BulkReport};
use crate::config::StoreConfig;
use crate::entity::Entity;
use crate::error::{Error, Result};
use crate::index::{index_name, index_pattern, index_template, template_name, wildcard_match};
use crate::query::builder::merge_fields;
use crate::query::{QueryBuilder, QueryTranslator, TranslatorOptions};
use crate::transport::{self, HttpTransport, Method, Transport, TransportRequest, TransportResponse};
use chrono::Utc;
use elastore_dsl::query::{CountRequest, Query, SearchRequest};
use elastore_dsl::response::{CatIndex, CountResponse, Hit, SearchResponse};
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Upper bound of documents fetched by id in one request
pub const LIST_LIMIT: usize = 10_000;

const MAX_PING_RETRIES: u32 = 10;
const MAX_PING_INTERVAL: Duration = Duration::from_secs(60);

pub struct ElasticStore<T: Transport = HttpTransport> {
    transport: Arc<T>,
    config: StoreConfig,
}

impl ElasticStore<HttpTransport> {
    pub fn new(config: StoreConfig) -> Result<Self> {
        let transport = HttpTransport::new(&config)?;
        info!("Elasticsearch store on {:?}", config.hosts);
        Ok(Self::with_transport(Arc::new(transport), config))
    }

    /// Store for a connection URI; `ELASTICSEARCH_HOSTS` overrides its host
    pub fn connect(uri: &str) -> Result<Self> {
        Self::new(StoreConfig::resolve(uri)?)
    }
}

impl<T: Transport> Clone for ElasticStore<T> {
    fn clone(&self) -> Self {
        Self {
            transport: Arc::clone(&self.transport),
            config: self.config.clone(),
        }
    }
}

impl<T: Transport + 'static> ElasticStore<T> {
    pub fn with_transport(transport: Arc<T>, config: StoreConfig) -> Self {
        Self { transport, config }
    }

    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    pub fn transport(&self) -> &Arc<T> {
        &self.transport
    }

    /// A handle sharing this store's transport
    pub fn clone_store(&self) -> Self {
        self.clone()
    }

    pub(crate) fn translator(&self) -> QueryTranslator {
        QueryTranslator::new(TranslatorOptions {
            like_polarity: self.config.like_polarity,
        })
    }

    async fn send(&self, request: TransportRequest) -> Result<TransportResponse> {
        self.transport.send(request).await?.error_for_status()
    }

    /// Probe `HEAD /` up to `retries` times (at most 10), `interval` apart
    /// (at most 60s)
    pub async fn ping(&self, retries: u32, interval: Duration) -> Result<()> {
        let attempts = retries.clamp(1, MAX_PING_RETRIES);
        let interval = interval.min(MAX_PING_INTERVAL);

        for attempt in 1..=attempts {
            match self
                .transport
                .send(TransportRequest::new(Method::Head, "/", "ping"))
                .await
            {
                Ok(response) if response.is_success() => {
                    info!("Connected after {} attempt(s)", attempt);
                    return Ok(());
                }
                Ok(response) => warn!(
                    "Ping returned {}, try {} of {}",
                    response.status, attempt, attempts
                ),
                Err(e) => warn!("Ping failed: {}, try {} of {}", e, attempt, attempts),
            }
            if attempt < attempts {
                tokio::time::sleep(interval).await;
            }
        }
        Err(Error::Transport(format!(
            "could not establish a connection after {} attempts",
            attempts
        )))
    }

    // ===== Search plumbing =====

    pub(crate) async fn search(&self, pattern: &str, request: &SearchRequest) -> Result<SearchResponse> {
        let request = TransportRequest::new(Method::Post, transport::path(&[pattern, "_search"]), "search")
            .param("typed_keys", "true")
            .param("expand_wildcards", "all")
            .param("allow_no_indices", "true")
            .json(serde_json::to_value(request)?);
        self.send(request).await?.json()
    }

    pub(crate) async fn count(&self, pattern: &str, request: &CountRequest) -> Result<u64> {
        let request = TransportRequest::new(Method::Post, transport::path(&[pattern, "_count"]), "count")
            .param("expand_wildcards", "all")
            .param("allow_no_indices", "true")
            .json(serde_json::to_value(request)?);
        let response: CountResponse = self.send(request).await?.json()?;
        Ok(response.count)
    }

    async fn hits_by_id<S: AsRef<str>>(&self, pattern: &str, ids: &[S]) -> Result<Vec<Hit>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let request = SearchRequest {
            query: Some(Query::ids(ids.iter().map(|id| id.as_ref().to_string()))),
            size: Some(ids.len().min(LIST_LIMIT)),
            ..Default::default()
        };
        Ok(self.search(pattern, &request).await?.hits.hits)
    }

    async fn find_hit(&self, pattern: &str, id: &str) -> Result<Hit> {
        self.hits_by_id(pattern, &[id])
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| Error::NotFound(format!("{} in {}", id, pattern)))
    }

    /// Concrete index of every id found under `pattern`
    async fn locate<S: AsRef<str>>(&self, pattern: &str, ids: &[S]) -> Result<HashMap<String, String>> {
        Ok(self
            .hits_by_id(pattern, ids)
            .await?
            .into_iter()
            .map(|hit| (hit.id, hit.index))
            .collect())
    }

    // ===== CRUD =====

    pub async fn get<E: Entity>(&self, id: &str, key: &str) -> Result<E> {
        let hit = self.find_hit(&index_pattern(&E::table(), key), id).await?;
        Ok(serde_json::from_value(hit.source)?)
    }

    /// Entities by id, skipping documents that do not decode
    pub async fn list<E: Entity, S: AsRef<str>>(&self, ids: &[S], key: &str) -> Result<Vec<E>> {
        let pattern = index_pattern(&E::table(), key);
        let mut hits = Vec::with_capacity(ids.len());
        for chunk in ids.chunks(LIST_LIMIT) {
            hits.extend(self.hits_by_id(&pattern, chunk).await?);
        }
        Ok(hits
            .into_iter()
            .filter_map(|hit| match serde_json::from_value(hit.source) {
                Ok(entity) => Some(entity),
                Err(e) => {
                    warn!("Skipping {}/{}: {}", hit.index, hit.id, e);
                    None
                }
            })
            .collect())
    }

    pub async fn exists<E: Entity>(&self, id: &str, key: &str) -> Result<bool> {
        match self.find_hit(&index_pattern(&E::table(), key), id).await {
            Ok(_) => Ok(true),
            Err(e) if e.is_not_found() => Ok(false),
            Err(e) => Err(e),
        }
    }

    async fn put_document<E: Entity>(&self, index: &str, entity: &E) -> Result<()> {
        let id = entity.id();
        let request = TransportRequest::new(Method::Put, transport::path(&[index, "_doc", id.as_str()]), "index")
            .json(serde_json::to_value(entity)?);
        self.send(request).await?;
        debug!("Wrote {}/{}", index, id);
        Ok(())
    }

    /// Write into the current index of the entity's table
    pub async fn insert<E: Entity>(&self, entity: &E) -> Result<()> {
        let index = index_name(&E::table(), &entity.key(), Utc::now());
        self.put_document(&index, entity).await
    }

    /// Replace an existing document in the index it lives in
    pub async fn update<E: Entity>(&self, entity: &E) -> Result<()> {
        let hit = self
            .find_hit(&index_pattern(&E::table(), &entity.key()), &entity.id())
            .await?;
        self.put_document(&hit.index, entity).await
    }

    /// Update in place when the document exists, insert otherwise
    pub async fn upsert<E: Entity>(&self, entity: &E) -> Result<()> {
        let index = match self
            .find_hit(&index_pattern(&E::table(), &entity.key()), &entity.id())
            .await
        {
            Ok(hit) => hit.index,
            Err(e) if e.is_not_found() => index_name(&E::table(), &entity.key(), Utc::now()),
            Err(e) => return Err(e),
        };
        self.put_document(&index, entity).await
    }

    pub async fn delete<E: Entity>(&self, id: &str, key: &str) -> Result<()> {
        let hit = self.find_hit(&index_pattern(&E::table(), key), id).await?;
        let request = TransportRequest::new(
            Method::Delete,
            transport::path(&[hit.index.as_str(), "_doc", id]),
            "delete",
        );
        self.send(request).await?;
        Ok(())
    }

    pub async fn set_field<E: Entity>(
        &self,
        id: &str,
        field: &str,
        value: impl Into<Value>,
        key: &str,
    ) -> Result<()> {
        let mut fields = Map::new();
        fields.insert(field.to_string(), value.into());
        self.set_fields::<E>(id, fields, key).await
    }

    /// Fetch, merge `fields` into the document, write it back
    pub async fn set_fields<E: Entity>(&self, id: &str, fields: Map<String, Value>, key: &str) -> Result<()> {
        let hit = self.find_hit(&index_pattern(&E::table(), key), id).await?;
        let entity: E = serde_json::from_value(hit.source)?;
        let changed = merge_fields(&entity, &fields)?;
        self.put_document(&hit.index, &changed).await
    }

    pub fn query<E: Entity>(&self) -> QueryBuilder<'_, E, T> {
        QueryBuilder::new(self)
    }

    // ===== Index management =====

    pub async fn index_exists(&self, name: &str) -> Result<bool> {
        let response = self
            .transport
            .send(TransportRequest::new(Method::Head, transport::path(&[name]), "index_exists"))
            .await?;
        match response.status {
            404 => Ok(false),
            _ => Ok(response.error_for_status()?.is_success()),
        }
    }

    /// Create an index without mappings; returns its name
    pub async fn create_index(&self, name: &str) -> Result<String> {
        let response = self
            .send(TransportRequest::new(Method::Put, transport::path(&[name]), "create_index"))
            .await?;
        let body: Value = response.json()?;
        let created = body["index"].as_str().unwrap_or(name).to_string();
        info!("Created index {}", created);
        Ok(created)
    }

    /// Put the index template for `E` and create its index for `key`
    pub async fn create_entity_index<E: Entity>(&self, key: &str) -> Result<String> {
        let table = E::table();
        let template = template_name(&table);
        let request = TransportRequest::new(
            Method::Put,
            transport::path(&["_index_template", template.as_str()]),
            "put_index_template",
        )
        .json(index_template(&table, &E::mappings()));
        self.send(request).await?;
        info!("Put index template {}", template);

        self.create_index(&index_name(&table, key, Utc::now())).await
    }

    /// Document count of every index matching the wildcard `pattern`
    pub async fn list_indices(&self, pattern: &str) -> Result<HashMap<String, u64>> {
        let request = TransportRequest::new(Method::Get, "/_cat/indices", "list_indices")
            .param("format", "json");
        let indices: Vec<CatIndex> = self.send(request).await?.json()?;
        Ok(indices
            .into_iter()
            .filter(|idx| wildcard_match(&idx.index, pattern))
            .map(|idx| {
                let count = idx
                    .docs_count
                    .as_deref()
                    .and_then(|c| c.parse().ok())
                    .unwrap_or(0);
                (idx.index, count)
            })
            .collect())
    }

    /// `true` when the engine acknowledged the deletion
    pub async fn drop_index(&self, name: &str) -> Result<bool> {
        let response = self
            .transport
            .send(TransportRequest::new(Method::Delete, transport::path(&[name]), "drop_index"))
            .await?;
        Ok(response.is_success())
    }

    // ===== Native =====

    /// Run a raw search DSL document; returns its raw aggregations
    pub async fn execute_query(&self, dsl: &str) -> Result<Map<String, Value>> {
        let body: Value = serde_json::from_str(dsl)?;
        let request = TransportRequest::new(Method::Post, "/_search", "execute_query").json(body);
        let response: SearchResponse = self.send(request).await?.json()?;
        Ok(response.aggregations.unwrap_or_default())
    }

    // ===== Bulk =====

    async fn run_bulk(&self, items: Vec<BulkItem>) -> Result<BulkReport> {
        let indexer = BulkIndexer::new(Arc::clone(&self.transport), &self.config.bulk);
        for item in items {
            match indexer.add(item).await {
                Ok(()) => {}
                Err(Error::Json(e)) => warn!("Skipping bulk item: {}", e),
                Err(e) => return Err(indexer.abort(e).await),
            }
        }

        match indexer.close().await {
            Ok(stats) => {
                let report = BulkReport::from(stats);
                debug!(
                    "Bulk done: {} affected, {} failed",
                    report.affected, report.failed
                );
                Ok(report)
            }
            Err(e) => {
                let stats = indexer.stats();
                Err(Error::BulkFlush {
                    affected: stats.flushed,
                    failed: stats.failed,
                    reason: e.to_string(),
                })
            }
        }
    }

    /// Where each entity lives, per shard key
    async fn locate_entities<E: Entity>(&self, entities: &[E]) -> Result<HashMap<String, String>> {
        let mut by_key: HashMap<String, Vec<String>> = HashMap::new();
        for entity in entities {
            by_key.entry(entity.key()).or_default().push(entity.id());
        }
        let mut located = HashMap::new();
        for (key, ids) in by_key {
            for chunk in ids.chunks(LIST_LIMIT) {
                located.extend(self.locate(&index_pattern(&E::table(), &key), chunk).await?);
            }
        }
        Ok(located)
    }

    fn documents<'e, E: Entity>(entities: &'e [E]) -> impl Iterator<Item = (&'e E, Value)> + 'e {
        entities
            .iter()
            .filter_map(|entity| match serde_json::to_value(entity) {
                Ok(doc) => Some((entity, doc)),
                Err(e) => {
                    warn!("Skipping {} {}: {}", E::table(), entity.id(), e);
                    None
                }
            })
    }

    /// Index every entity into its current index
    pub async fn bulk_insert<E: Entity>(&self, entities: &[E]) -> Result<BulkReport> {
        let now = Utc::now();
        let items = Self::documents(entities)
            .map(|(entity, doc)| {
                BulkItem::index(index_name(&E::table(), &entity.key(), now), entity.id(), doc)
            })
            .collect();
        self.run_bulk(items).await
    }

    /// Merge every entity into its stored document. Entities that are not
    /// stored fail individually.
    pub async fn bulk_update<E: Entity>(&self, entities: &[E]) -> Result<BulkReport> {
        let located = self.locate_entities(entities).await?;
        let now = Utc::now();
        let items = Self::documents(entities)
            .map(|(entity, doc)| {
                let index = located
                    .get(&entity.id())
                    .cloned()
                    .unwrap_or_else(|| index_name(&E::table(), &entity.key(), now));
                BulkItem::merge(index, entity.id(), doc)
            })
            .collect();
        self.run_bulk(items).await
    }

    /// Merge into the stored document, or create it in the current index
    pub async fn bulk_upsert<E: Entity>(&self, entities: &[E]) -> Result<BulkReport> {
        let located = self.locate_entities(entities).await?;
        let now = Utc::now();
        let items = Self::documents(entities)
            .map(|(entity, doc)| {
                let index = located
                    .get(&entity.id())
                    .cloned()
                    .unwrap_or_else(|| index_name(&E::table(), &entity.key(), now));
                BulkItem::upsert(index, entity.id(), doc)
            })
            .collect();
        self.run_bulk(items).await
    }

    pub async fn bulk_delete<E: Entity, S: AsRef<str>>(&self, ids: &[S], key: &str) -> Result<BulkReport> {
        let pattern = index_pattern(&E::table(), key);
        let mut located = HashMap::new();
        for chunk in ids.chunks(LIST_LIMIT) {
            located.extend(self.locate(&pattern, chunk).await?);
        }
        let fallback = index_name(&E::table(), key, Utc::now());
        let items = ids
            .iter()
            .map(|id| {
                let id = id.as_ref();
                let index = located.get(id).cloned().unwrap_or_else(|| fallback.clone());
                BulkItem::delete(index, id)
            })
            .collect();
        self.run_bulk(items).await
    }

    /// Set `field` on each document id to its value in `values`
    pub async fn bulk_set_fields<E: Entity>(
        &self,
        field: &str,
        values: &HashMap<String, Value>,
        key: &str,
    ) -> Result<BulkReport> {
        let pattern = index_pattern(&E::table(), key);
        let ids: Vec<&String> = values.keys().collect();
        let mut located = HashMap::new();
        for chunk in ids.chunks(LIST_LIMIT) {
            located.extend(self.locate(&pattern, chunk).await?);
        }
        let fallback = index_name(&E::table(), key, Utc::now());
        let items = values
            .iter()
            .map(|(id, value)| {
                let mut doc = Map::new();
                doc.insert(field.to_string(), value.clone());
                let index = located.get(id).cloned().unwrap_or_else(|| fallback.clone());
                BulkItem::merge(index, id, Value::Object(doc))
            })
            .collect();
        self.run_bulk(items).await
    }
}

impl<T: Transport> std::fmt::Debug for ElasticStore<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElasticStore")
            .field("hosts", &self.config.hosts)
            .finish()
    }
}
