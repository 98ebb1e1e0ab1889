//! In-memory source
//!
//! A process-local stand-in for the readings table. Rows inserted here are
//! served by bulk queries and pushed to every live subscription, which makes
//! it the transport for tests and for the `demo` command.

use async_trait::async_trait;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use tokio::sync::{mpsc, Mutex, RwLock};
use tokio_util::sync::CancellationToken;

use super::{
    BulkQuery, ChangeEvent, RawRecord, ReadingSource, SortDirection, SourceError, SourceResult,
    Subscription,
};
use crate::model::SensorReading;

const EVENT_CHANNEL_CAPACITY: usize = 256;

/// In-process table with insert notifications
pub struct MemorySource {
    /// Stored rows keyed by id, in insertion order
    rows: RwLock<Vec<(i64, RawRecord)>>,
    /// Live subscriptions and their cancellation tokens
    subscribers: Mutex<Vec<(CancellationToken, mpsc::Sender<ChangeEvent>)>>,
    next_id: AtomicI64,
    fail_queries: AtomicBool,
    fail_subscribe: AtomicBool,
}

impl MemorySource {
    pub fn new() -> Self {
        Self {
            rows: RwLock::new(Vec::new()),
            subscribers: Mutex::new(Vec::new()),
            next_id: AtomicI64::new(1),
            fail_queries: AtomicBool::new(false),
            fail_subscribe: AtomicBool::new(false),
        }
    }

    /// Insert a row and notify subscribers.
    ///
    /// A row without a numeric `id` gets the next free one, mirroring a
    /// serial primary key. Returns the row's id.
    pub async fn insert(&self, mut record: RawRecord) -> i64 {
        let id = match record.get("id").and_then(Value::as_i64) {
            Some(id) => {
                self.next_id.fetch_max(id.saturating_add(1), Ordering::SeqCst);
                id
            }
            None => {
                let id = self.next_id.fetch_add(1, Ordering::SeqCst);
                record.insert("id".to_string(), Value::from(id));
                id
            }
        };

        self.rows.write().await.push((id, record.clone()));
        self.notify(ChangeEvent::Insert(record)).await;
        id
    }

    /// Store a row without notifying subscribers (bulk seed)
    pub async fn seed(&self, record: RawRecord) -> i64 {
        let id = SensorReading::from_record(&record).id;
        self.next_id.fetch_max(id.saturating_add(1), Ordering::SeqCst);
        self.rows.write().await.push((id, record));
        id
    }

    /// Push an event to subscribers only, without storing anything
    /// (redeliveries, late events)
    pub async fn redeliver(&self, record: RawRecord) {
        self.notify(ChangeEvent::Insert(record)).await;
    }

    /// Break every live subscription with `reason`
    pub async fn fail_subscriptions(&self, reason: &str) {
        self.notify(ChangeEvent::Failed(reason.to_string())).await;
        self.subscribers.lock().await.clear();
    }

    /// Make bulk queries fail until reset
    pub fn set_failing(&self, failing: bool) {
        self.fail_queries.store(failing, Ordering::SeqCst);
    }

    /// Make new subscriptions fail to establish until reset
    pub fn set_subscribe_failing(&self, failing: bool) {
        self.fail_subscribe.store(failing, Ordering::SeqCst);
    }

    pub async fn row_count(&self) -> usize {
        self.rows.read().await.len()
    }

    pub async fn subscriber_count(&self) -> usize {
        let mut subs = self.subscribers.lock().await;
        subs.retain(|(token, tx)| !token.is_cancelled() && !tx.is_closed());
        subs.len()
    }

    async fn notify(&self, event: ChangeEvent) {
        let mut subs = self.subscribers.lock().await;
        subs.retain(|(token, tx)| !token.is_cancelled() && !tx.is_closed());

        for (_, tx) in subs.iter() {
            if let Err(e) = tx.try_send(event.clone()) {
                tracing::warn!(error = %e, "Dropping event for lagging subscription");
            }
        }
    }
}

impl Default for MemorySource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl ReadingSource for MemorySource {
    fn name(&self) -> &str {
        "memory"
    }

    async fn query(&self, query: &BulkQuery) -> SourceResult<Vec<RawRecord>> {
        if self.fail_queries.load(Ordering::SeqCst) {
            return Err(SourceError::Unavailable);
        }

        let rows = self.rows.read().await;
        let mut sorted: Vec<&(i64, RawRecord)> = rows.iter().collect();

        // Only `id` ordering is meaningful for this table
        sorted.sort_by_key(|(id, _)| *id);
        if query.direction == SortDirection::Descending {
            sorted.reverse();
        }

        Ok(sorted
            .into_iter()
            .take(query.limit)
            .map(|(_, record)| record.clone())
            .collect())
    }

    async fn subscribe(&self, _table: &str) -> SourceResult<Subscription> {
        if self.fail_subscribe.load(Ordering::SeqCst) {
            return Err(SourceError::Subscribe("subscription refused".to_string()));
        }

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();

        self.subscribers.lock().await.push((cancel.clone(), tx));
        Ok(Subscription::new(rx, cancel))
    }
}
