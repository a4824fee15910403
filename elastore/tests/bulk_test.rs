//! Tests for store-level bulk writes and the bulk indexer lifecycle

mod common;

use common::{store, Hero, MockTransport};
use elastore::bulk::BulkState;
use elastore::{field, BulkConfig, BulkIndexer, BulkItem, Entity, Error};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

fn heroes(n: usize) -> Vec<Hero> {
    (0..n)
        .map(|i| Hero::new(&format!("h{}", i), if i % 2 == 0 { "red" } else { "white" }, i as i64))
        .collect()
}

// ============================================================================
// Insert
// ============================================================================

#[tokio::test]
async fn test_bulk_insert_then_get() {
    let transport = MockTransport::new();
    let store = store(&transport);

    let report = store.bulk_insert(&heroes(25)).await.unwrap();
    assert_eq!(report.affected, 25);
    assert_eq!(report.failed, 0);
    assert_eq!(transport.doc_count(), 25);

    let hero: Hero = store.get("h7", "").await.unwrap();
    assert_eq!(hero.color, "white");
    assert_eq!(hero.num, 7);
}

#[tokio::test]
async fn test_bulk_insert_splits_by_item_threshold() {
    let transport = MockTransport::new();
    let mut config = elastore::StoreConfig::default();
    config.bulk.flush_items = 10;
    let store = elastore::ElasticStore::with_transport(Arc::clone(&transport), config);

    let report = store.bulk_insert(&heroes(25)).await.unwrap();
    assert_eq!(report.affected, 25);
    assert_eq!(transport.requests_to("/_bulk").len(), 3);
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct Poison {
    id: String,
    #[serde(serialize_with = "refuse")]
    broken: bool,
}

fn refuse<S: Serializer>(broken: &bool, serializer: S) -> Result<S::Ok, S::Error> {
    if *broken {
        Err(serde::ser::Error::custom("refusing to serialize"))
    } else {
        serializer.serialize_bool(false)
    }
}

impl Entity for Poison {
    fn table() -> String {
        "poison-{year}".to_string()
    }

    fn id(&self) -> String {
        self.id.clone()
    }
}

#[tokio::test]
async fn test_unserializable_entities_are_skipped() {
    let transport = MockTransport::new();
    let store = store(&transport);
    let entities: Vec<Poison> = (0..6)
        .map(|i| Poison {
            id: format!("p{}", i),
            broken: i % 3 == 0,
        })
        .collect();

    let report = store.bulk_insert(&entities).await.unwrap();
    assert_eq!(report.affected, 4);
    assert!(report.affected + report.failed < entities.len() as u64);
}

// ============================================================================
// Update / upsert / delete
// ============================================================================

#[tokio::test]
async fn test_bulk_update_missing_documents_fail_individually() {
    let transport = MockTransport::new();
    let store = store(&transport);
    store.bulk_insert(&heroes(3)).await.unwrap();

    let mut changed = heroes(5);
    for hero in &mut changed {
        hero.color = "black".to_string();
    }
    let report = store.bulk_update(&changed).await.unwrap();
    assert_eq!(report.affected, 3);
    assert_eq!(report.failed, 2);
    assert!(matches!(
        report.into_result(),
        Err(Error::PartialBulkFailure { affected: 3, failed: 2 })
    ));
    assert_eq!(transport.source("h1").unwrap()["color"], json!("black"));
    assert!(transport.source("h4").is_none());
}

#[tokio::test]
async fn test_bulk_update_writes_to_located_index() {
    let transport = MockTransport::new();
    transport.seed(
        "hero--2019.01",
        "old",
        serde_json::to_value(Hero::new("old", "red", 1)).unwrap(),
    );
    let store = store(&transport);

    let report = store
        .bulk_update(&[Hero::new("old", "blue", 2)])
        .await
        .unwrap();
    assert_eq!(report.affected, 1);
    assert_eq!(transport.doc_index("old").unwrap(), "hero--2019.01");
    assert_eq!(transport.source("old").unwrap()["color"], json!("blue"));
}

#[tokio::test]
async fn test_bulk_upsert_creates_and_merges() {
    let transport = MockTransport::new();
    let store = store(&transport);
    store.bulk_insert(&heroes(2)).await.unwrap();

    let report = store.bulk_upsert(&heroes(4)).await.unwrap();
    assert_eq!(report, elastore::BulkReport { affected: 4, failed: 0 });
    assert_eq!(transport.doc_count(), 4);
}

#[tokio::test]
async fn test_bulk_delete_and_set_fields() {
    let transport = MockTransport::new();
    let store = store(&transport);
    store.bulk_insert(&heroes(4)).await.unwrap();

    let values = HashMap::from([
        ("h0".to_string(), json!("green")),
        ("h1".to_string(), json!("green")),
    ]);
    let report = store.bulk_set_fields::<Hero>("color", &values, "").await.unwrap();
    assert_eq!(report.affected, 2);
    assert_eq!(transport.source("h0").unwrap()["color"], json!("green"));
    assert_eq!(transport.source("h0").unwrap()["num"], json!(0));

    let report = store.bulk_delete::<Hero, _>(&["h2", "h3", "nope"], "").await.unwrap();
    assert_eq!(report.affected, 2);
    assert_eq!(report.failed, 1);
    assert_eq!(transport.doc_count(), 2);
}

#[tokio::test]
async fn test_query_delete_removes_matches() {
    let transport = MockTransport::new();
    let store = store(&transport);
    store.bulk_insert(&heroes(3)).await.unwrap();

    // The fake engine ignores the filter and returns every document
    let report = store
        .query::<Hero>()
        .filter(field("color").eq("red"))
        .delete()
        .await
        .unwrap();
    assert_eq!(report.affected, 3);
    assert_eq!(transport.doc_count(), 0);
}

// ============================================================================
// Failures
// ============================================================================

#[tokio::test]
async fn test_failed_flush_surfaces_as_bulk_flush() {
    let transport = MockTransport::new();
    transport.fail_bulk();
    let store = store(&transport);

    let err = store.bulk_insert(&heroes(3)).await.unwrap_err();
    match err {
        Error::BulkFlush { affected, failed, reason } => {
            assert_eq!(affected, 0);
            assert_eq!(failed, 3);
            assert!(reason.contains("bulk rejected"), "reason: {}", reason);
        }
        other => panic!("unexpected error: {:?}", other),
    }
}

#[tokio::test]
async fn test_indexer_rejects_after_close() {
    let transport = MockTransport::new();
    let indexer = BulkIndexer::new(Arc::clone(&transport), &BulkConfig::default());

    let flushed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&flushed);
    indexer
        .add(
            BulkItem::index("hero--2024.03", "a", json!({"id": "a"}))
                .on_success(move |_| {
                    counter.fetch_add(1, Ordering::SeqCst);
                }),
        )
        .await
        .unwrap();

    let stats = indexer.close().await.unwrap();
    assert_eq!(stats.flushed, 1);
    assert_eq!(stats.created, 1);
    assert_eq!(flushed.load(Ordering::SeqCst), 1);
    assert_eq!(indexer.state(), BulkState::Closed);

    let err = indexer
        .add(BulkItem::delete("hero--2024.03", "a"))
        .await
        .unwrap_err();
    assert!(matches!(err, Error::BulkClosed));
    assert!(matches!(indexer.close().await, Err(Error::BulkClosed)));
}

#[tokio::test]
async fn test_abort_returns_cause_over_close_failure() {
    let transport = MockTransport::new();
    transport.fail_bulk();
    let indexer = BulkIndexer::new(Arc::clone(&transport), &BulkConfig::default());
    indexer
        .add(BulkItem::index("hero--2024.03", "a", json!({"id": "a"})))
        .await
        .unwrap();

    let err = indexer
        .abort(Error::NotFound("hero--2024.03/b".to_string()))
        .await;
    assert!(matches!(err, Error::NotFound(ref what) if what == "hero--2024.03/b"));
    assert_eq!(indexer.state(), BulkState::Closed);
    assert_eq!(indexer.stats().failed, 1);
    assert_eq!(transport.requests_to("/_bulk").len(), 1);
}
