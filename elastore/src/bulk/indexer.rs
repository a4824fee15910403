//! Background bulk indexer
//!
//! Items are queued to a pool of worker tasks. Each worker buffers NDJSON and
//! flushes to `_bulk` when its byte or item threshold is crossed, or when the
//! periodic flush interval elapses with items pending. `close` drains the
//! queue, runs the final flushes and joins the workers.

use super::item::{BulkAction, BulkItem, ItemFailure};
use crate::config::BulkConfig;
use crate::error::{Error, Result};
use crate::transport::{Method, Transport, TransportRequest};
use elastore_dsl::response::{BulkItemResult, BulkResponse};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, warn};

const OPEN: u8 = 0;
const FLUSHING: u8 = 1;
const CLOSED: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BulkState {
    Open,
    Flushing,
    Closed,
}

/// Counter snapshot
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BulkStats {
    pub added: u64,
    /// Items the engine accepted
    pub flushed: u64,
    pub failed: u64,
    pub indexed: u64,
    pub created: u64,
    pub updated: u64,
    pub deleted: u64,
    pub requests: u64,
    pub flushed_bytes: u64,
}

#[derive(Debug, Default)]
struct Counters {
    added: AtomicU64,
    flushed: AtomicU64,
    failed: AtomicU64,
    indexed: AtomicU64,
    created: AtomicU64,
    updated: AtomicU64,
    deleted: AtomicU64,
    requests: AtomicU64,
    flushed_bytes: AtomicU64,
}

impl Counters {
    fn snapshot(&self) -> BulkStats {
        BulkStats {
            added: self.added.load(Ordering::Relaxed),
            flushed: self.flushed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            indexed: self.indexed.load(Ordering::Relaxed),
            created: self.created.load(Ordering::Relaxed),
            updated: self.updated.load(Ordering::Relaxed),
            deleted: self.deleted.load(Ordering::Relaxed),
            requests: self.requests.load(Ordering::Relaxed),
            flushed_bytes: self.flushed_bytes.load(Ordering::Relaxed),
        }
    }
}

struct Queued {
    item: BulkItem,
    lines: String,
}

type SharedQueue = Arc<tokio::sync::Mutex<mpsc::Receiver<Queued>>>;

pub struct BulkIndexer {
    sender: Mutex<Option<mpsc::Sender<Queued>>>,
    workers: tokio::sync::Mutex<Vec<JoinHandle<()>>>,
    state: AtomicU8,
    counters: Arc<Counters>,
    first_error: Arc<Mutex<Option<Error>>>,
}

impl BulkIndexer {
    /// Spawn the workers; must be called inside a tokio runtime
    pub fn new<T: Transport + 'static>(transport: Arc<T>, config: &BulkConfig) -> Self {
        let transport: Arc<dyn Transport> = transport;
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let queue: SharedQueue = Arc::new(tokio::sync::Mutex::new(receiver));
        let counters = Arc::new(Counters::default());
        let first_error = Arc::new(Mutex::new(None));

        let workers = (0..config.workers.max(1))
            .map(|id| {
                let worker = Worker {
                    id,
                    transport: Arc::clone(&transport),
                    queue: Arc::clone(&queue),
                    counters: Arc::clone(&counters),
                    first_error: Arc::clone(&first_error),
                    flush_bytes: config.flush_bytes,
                    flush_items: config.flush_items,
                    flush_interval: config.flush_interval().max(Duration::from_millis(1)),
                    items: Vec::new(),
                    body: String::new(),
                };
                tokio::spawn(worker.run())
            })
            .collect();

        debug!(
            "Bulk indexer started with {} workers, flush at {} bytes / {}ms",
            config.workers.max(1),
            config.flush_bytes,
            config.flush_interval_ms
        );

        Self {
            sender: Mutex::new(Some(sender)),
            workers: tokio::sync::Mutex::new(workers),
            state: AtomicU8::new(OPEN),
            counters,
            first_error,
        }
    }

    pub fn state(&self) -> BulkState {
        match self.state.load(Ordering::Acquire) {
            OPEN => BulkState::Open,
            FLUSHING => BulkState::Flushing,
            _ => BulkState::Closed,
        }
    }

    pub fn stats(&self) -> BulkStats {
        self.counters.snapshot()
    }

    /// Queue an item, waiting while the queue is full
    pub async fn add(&self, item: BulkItem) -> Result<()> {
        if self.state.load(Ordering::Acquire) != OPEN {
            return Err(Error::BulkClosed);
        }
        let sender = self.sender.lock().clone().ok_or(Error::BulkClosed)?;
        let lines = item.encode()?;
        sender
            .send(Queued { item, lines })
            .await
            .map_err(|_| Error::BulkClosed)?;
        self.counters.added.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    /// Flush everything queued and stop the workers. Returns the first
    /// request-level flush error, if any; counters stay readable either way.
    pub async fn close(&self) -> Result<BulkStats> {
        if self
            .state
            .compare_exchange(OPEN, FLUSHING, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            return Err(Error::BulkClosed);
        }
        self.sender.lock().take();

        let workers = std::mem::take(&mut *self.workers.lock().await);
        for handle in workers {
            if let Err(e) = handle.await {
                warn!("Bulk worker ended abnormally: {}", e);
            }
        }
        self.state.store(CLOSED, Ordering::Release);

        let stats = self.stats();
        debug!(
            "Bulk indexer closed: {} added, {} flushed, {} failed in {} requests",
            stats.added, stats.flushed, stats.failed, stats.requests
        );
        match self.first_error.lock().take() {
            Some(err) => Err(err),
            None => Ok(stats),
        }
    }

    /// Close after a failed `add`, returning `cause`. A close failure is
    /// logged, never returned in its place.
    pub async fn abort(&self, cause: Error) -> Error {
        if let Err(close_err) = self.close().await {
            let stats = self.stats();
            warn!(
                "Bulk close after failed add: {} ({} flushed, {} failed)",
                close_err, stats.flushed, stats.failed
            );
        }
        cause
    }
}

struct Worker {
    id: usize,
    transport: Arc<dyn Transport>,
    queue: SharedQueue,
    counters: Arc<Counters>,
    first_error: Arc<Mutex<Option<Error>>>,
    flush_bytes: usize,
    flush_items: usize,
    flush_interval: Duration,
    items: Vec<BulkItem>,
    body: String,
}

impl Worker {
    async fn run(mut self) {
        let mut ticker = tokio::time::interval(self.flush_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        ticker.tick().await;

        loop {
            let queue = Arc::clone(&self.queue);
            tokio::select! {
                next = async move { queue.lock().await.recv().await } => match next {
                    Some(queued) => {
                        self.body.push_str(&queued.lines);
                        self.items.push(queued.item);
                        if self.threshold_reached() {
                            self.flush().await;
                        }
                    }
                    None => break,
                },
                _ = ticker.tick() => {
                    if !self.items.is_empty() {
                        debug!("Bulk worker {} periodic flush", self.id);
                        self.flush().await;
                    }
                }
            }
        }

        self.flush().await;
    }

    fn threshold_reached(&self) -> bool {
        self.body.len() >= self.flush_bytes
            || (self.flush_items > 0 && self.items.len() >= self.flush_items)
    }

    async fn flush(&mut self) {
        if self.items.is_empty() {
            return;
        }
        let items = std::mem::take(&mut self.items);
        let body = std::mem::take(&mut self.body);
        let count = items.len();
        let bytes = body.len();
        let started = Instant::now();

        self.counters.requests.fetch_add(1, Ordering::Relaxed);
        let request = TransportRequest::new(Method::Post, "/_bulk", "bulk").ndjson(body);
        let result = match self.transport.send(request).await {
            Ok(response) => response
                .error_for_status()
                .and_then(|r| r.json::<BulkResponse>()),
            Err(err) => Err(err),
        };

        match result {
            Ok(response) => {
                self.counters
                    .flushed_bytes
                    .fetch_add(bytes as u64, Ordering::Relaxed);
                self.complete(items, response);
            }
            Err(err) => {
                warn!("Bulk flush of {} items failed: {}", count, err);
                crate::metrics::record_request_error("bulk", err.error_type());
                let reason = err.to_string();
                for item in items {
                    self.fail(item, ItemFailure::Transport(reason.clone()));
                }
                let mut first = self.first_error.lock();
                if first.is_none() {
                    *first = Some(err);
                }
            }
        }

        crate::metrics::record_bulk_flush(count, bytes, started.elapsed());
    }

    fn complete(&self, items: Vec<BulkItem>, response: BulkResponse) {
        let mut results = response.items.into_iter();
        for item in items {
            let result = results.next().and_then(|entry| entry.into_values().next());
            match result {
                Some(result) if result.error.is_none() && result.status <= 201 => {
                    self.succeed(item, &result)
                }
                Some(result) => self.fail(item, ItemFailure::from_result(&result)),
                None => self.fail(
                    item,
                    ItemFailure::Transport("bulk response is missing this item".to_string()),
                ),
            }
        }
    }

    fn succeed(&self, mut item: BulkItem, result: &BulkItemResult) {
        self.counters.flushed.fetch_add(1, Ordering::Relaxed);
        let by_action = match item.action {
            BulkAction::Index => &self.counters.indexed,
            BulkAction::Update => &self.counters.updated,
            BulkAction::Delete => &self.counters.deleted,
        };
        by_action.fetch_add(1, Ordering::Relaxed);
        if result.result.as_deref() == Some("created") {
            self.counters.created.fetch_add(1, Ordering::Relaxed);
        }
        crate::metrics::record_bulk_item(item.action.as_str(), "success");

        if let Some(hook) = item.on_success.take() {
            hook(result);
        }
    }

    fn fail(&self, mut item: BulkItem, failure: ItemFailure) {
        self.counters.failed.fetch_add(1, Ordering::Relaxed);
        error!(
            "Bulk {} of {}/{} failed: {}",
            item.action, item.index, item.id, failure
        );
        crate::metrics::record_bulk_item(item.action.as_str(), "failure");

        if let Some(hook) = item.on_failure.take() {
            hook(&failure);
        }
    }
}
