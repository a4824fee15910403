//! Shared test fixtures: entities and an in-memory transport

#![allow(dead_code)]

use async_trait::async_trait;
use elastore::index::wildcard_match;
use elastore::transport::{Method, RequestBody};
use elastore::{
    ElasticStore, Entity, FieldMapping, Result, StoreConfig, Timestamp, Transport, TransportRequest,
    TransportResponse,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Hero {
    pub id: String,
    pub name: String,
    pub color: String,
    pub num: i64,
    pub created_on: Timestamp,
    #[serde(default)]
    pub account: String,
}

impl Hero {
    pub fn new(id: &str, color: &str, num: i64) -> Self {
        Self {
            id: id.to_string(),
            name: format!("hero {}", id),
            color: color.to_string(),
            num,
            created_on: Timestamp(1_700_000_000_000),
            account: String::new(),
        }
    }
}

impl Entity for Hero {
    fn table() -> String {
        "hero-{accountId}-{year}.{month}".to_string()
    }

    fn id(&self) -> String {
        self.id.clone()
    }

    fn key(&self) -> String {
        self.account.clone()
    }

    fn mappings() -> Vec<FieldMapping> {
        vec![
            FieldMapping::keyword("id"),
            FieldMapping::keyword("color"),
            FieldMapping::long("num"),
            FieldMapping::date("createdOn"),
        ]
    }
}

pub fn json_response(status: u16, body: Value) -> TransportResponse {
    TransportResponse::new(status, serde_json::to_vec(&body).unwrap_or_default())
}

#[derive(Debug, Clone)]
struct Doc {
    index: String,
    source: Value,
}

/// Records every request. Answers from the scripted queue first, then
/// emulates the handful of engine endpoints the store uses over an
/// in-memory document map.
#[derive(Default)]
pub struct MockTransport {
    requests: Mutex<Vec<TransportRequest>>,
    scripted: Mutex<VecDeque<TransportResponse>>,
    docs: Mutex<BTreeMap<String, Doc>>,
    indices: Mutex<BTreeSet<String>>,
    fail_bulk: Mutex<bool>,
}

impl MockTransport {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, response: TransportResponse) {
        self.scripted.lock().push_back(response);
    }

    pub fn script_json(&self, status: u16, body: Value) {
        self.script(json_response(status, body));
    }

    /// Make every `_bulk` request fail with a 500
    pub fn fail_bulk(&self) {
        *self.fail_bulk.lock() = true;
    }

    pub fn requests(&self) -> Vec<TransportRequest> {
        self.requests.lock().clone()
    }

    pub fn last_request(&self) -> Option<TransportRequest> {
        self.requests.lock().last().cloned()
    }

    /// Requests whose path ends with `suffix`
    pub fn requests_to(&self, suffix: &str) -> Vec<TransportRequest> {
        self.requests
            .lock()
            .iter()
            .filter(|r| r.path.ends_with(suffix))
            .cloned()
            .collect()
    }

    pub fn doc_index(&self, id: &str) -> Option<String> {
        self.docs.lock().get(id).map(|d| d.index.clone())
    }

    pub fn source(&self, id: &str) -> Option<Value> {
        self.docs.lock().get(id).map(|d| d.source.clone())
    }

    pub fn doc_count(&self) -> usize {
        self.docs.lock().len()
    }

    pub fn seed(&self, index: &str, id: &str, source: Value) {
        self.indices.lock().insert(index.to_string());
        self.docs.lock().insert(
            id.to_string(),
            Doc {
                index: index.to_string(),
                source,
            },
        );
    }

    fn handle(&self, request: &TransportRequest) -> TransportResponse {
        let segments: Vec<&str> = request
            .path
            .trim_start_matches('/')
            .split('/')
            .filter(|s| !s.is_empty())
            .collect();

        match (request.method, segments.as_slice()) {
            (Method::Head, []) => json_response(200, json!({})),
            (Method::Post, ["_bulk"]) => self.bulk(request),
            (Method::Get, ["_cat", "indices"]) => self.cat_indices(),
            (Method::Put, ["_index_template", _]) => json_response(200, json!({"acknowledged": true})),
            (Method::Post, [pattern, "_search"]) => self.search(pattern, request.json_body()),
            (Method::Post, ["_search"]) => json_response(200, json!({"hits": {"hits": []}})),
            (Method::Post, [pattern, "_count"]) => {
                let count = self
                    .docs
                    .lock()
                    .values()
                    .filter(|d| wildcard_match(&d.index, pattern))
                    .count();
                json_response(200, json!({"count": count}))
            }
            (Method::Put, [index, "_doc", id]) => {
                let created = !self.docs.lock().contains_key(*id);
                self.seed(index, id, request.json_body().cloned().unwrap_or(Value::Null));
                let result = if created { "created" } else { "updated" };
                json_response(if created { 201 } else { 200 }, json!({"result": result}))
            }
            (Method::Delete, [index, "_doc", id]) => match self.docs.lock().remove(*id) {
                Some(_) => json_response(200, json!({"_index": index, "result": "deleted"})),
                None => json_response(404, json!({"_index": index, "result": "not_found"})),
            },
            (Method::Head, [index]) => {
                let status = if self.indices.lock().contains(*index) { 200 } else { 404 };
                json_response(status, json!({}))
            }
            (Method::Put, [index]) => {
                self.indices.lock().insert(index.to_string());
                json_response(200, json!({"acknowledged": true, "index": index}))
            }
            (Method::Delete, [index]) => {
                if self.indices.lock().remove(*index) {
                    self.docs.lock().retain(|_, d| d.index != *index);
                    json_response(200, json!({"acknowledged": true}))
                } else {
                    json_response(
                        404,
                        json!({"error": {"type": "index_not_found_exception", "reason": "no such index"}, "status": 404}),
                    )
                }
            }
            _ => json_response(
                400,
                json!({"error": {"type": "illegal_argument_exception", "reason": format!("unhandled {}", request.path)}}),
            ),
        }
    }

    fn search(&self, pattern: &str, body: Option<&Value>) -> TransportResponse {
        let ids: Option<Vec<String>> = body
            .and_then(|b| b["query"]["ids"]["values"].as_array())
            .map(|values| {
                values
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect()
            });
        let docs = self.docs.lock();
        let hits: Vec<Value> = docs
            .iter()
            .filter(|(id, doc)| {
                wildcard_match(&doc.index, pattern)
                    && ids.as_ref().map_or(true, |ids| ids.contains(*id))
            })
            .map(|(id, doc)| json!({"_index": doc.index, "_id": id, "_source": doc.source}))
            .collect();
        json_response(
            200,
            json!({
                "took": 1,
                "timed_out": false,
                "hits": {"total": {"value": hits.len(), "relation": "eq"}, "hits": hits}
            }),
        )
    }

    fn bulk(&self, request: &TransportRequest) -> TransportResponse {
        if *self.fail_bulk.lock() {
            return json_response(
                500,
                json!({"error": {"root_cause": [{"type": "exception", "reason": "bulk rejected"}], "type": "exception"}, "status": 500}),
            );
        }
        let lines = match &request.body {
            Some(RequestBody::NdJson(lines)) => lines.clone(),
            _ => String::new(),
        };
        let mut lines = lines.lines().filter_map(|l| serde_json::from_str::<Value>(l).ok());
        let mut items = Vec::new();
        let mut errors = false;

        while let Some(header) = lines.next() {
            let Some((action, meta)) = header.as_object().and_then(|o| o.iter().next()) else {
                continue;
            };
            let index = meta["_index"].as_str().unwrap_or_default().to_string();
            let id = meta["_id"].as_str().unwrap_or_default().to_string();
            let (status, result, error) = match action.as_str() {
                "index" => {
                    let body = lines.next().unwrap_or(Value::Null);
                    let existed = self.docs.lock().contains_key(&id);
                    self.seed(&index, &id, body);
                    if existed { (200, "updated", None) } else { (201, "created", None) }
                }
                "update" => {
                    let body = lines.next().unwrap_or(Value::Null);
                    self.apply_update(&index, &id, &body)
                }
                "delete" => match self.docs.lock().remove(&id) {
                    Some(_) => (200, "deleted", None),
                    None => (404, "not_found", None),
                },
                _ => continue,
            };
            errors |= error.is_some();
            let mut entry = Map::new();
            let mut item = json!({"_index": index, "_id": id, "status": status, "result": result});
            if let Some(error) = error {
                item["error"] = error;
            }
            entry.insert(action.clone(), item);
            items.push(Value::Object(entry));
        }

        json_response(200, json!({"took": 1, "errors": errors, "items": items}))
    }

    fn apply_update(&self, index: &str, id: &str, body: &Value) -> (u16, &'static str, Option<Value>) {
        let mut docs = self.docs.lock();
        let upsert = body["doc_as_upsert"].as_bool().unwrap_or(false);
        match docs.get_mut(id) {
            Some(doc) => {
                if let (Some(target), Some(fields)) = (doc.source.as_object_mut(), body["doc"].as_object()) {
                    for (k, v) in fields {
                        target.insert(k.clone(), v.clone());
                    }
                }
                (200, "updated", None)
            }
            None if upsert => {
                docs.insert(
                    id.to_string(),
                    Doc {
                        index: index.to_string(),
                        source: body["doc"].clone(),
                    },
                );
                (201, "created", None)
            }
            None => (
                404,
                "not_found",
                Some(json!({
                    "type": "document_missing_exception",
                    "reason": format!("[{}]: document missing", id)
                })),
            ),
        }
    }

    fn cat_indices(&self) -> TransportResponse {
        let docs = self.docs.lock();
        let rows: Vec<Value> = self
            .indices
            .lock()
            .iter()
            .map(|index| {
                let count = docs.values().filter(|d| d.index == *index).count();
                json!({"index": index, "health": "green", "status": "open", "docs.count": count.to_string()})
            })
            .collect();
        json_response(200, json!(rows))
    }
}

#[async_trait]
impl Transport for MockTransport {
    async fn send(&self, request: TransportRequest) -> Result<TransportResponse> {
        self.requests.lock().push(request.clone());
        if let Some(response) = self.scripted.lock().pop_front() {
            return Ok(response);
        }
        Ok(self.handle(&request))
    }
}

pub fn store(transport: &Arc<MockTransport>) -> ElasticStore<MockTransport> {
    ElasticStore::with_transport(Arc::clone(transport), StoreConfig::default())
}
