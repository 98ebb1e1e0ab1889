//! Series Synchronizer
//!
//! Keeps "the latest N readings" in step with the backend: one bulk load
//! installs the initial series, then insert events append to it. Events that
//! arrive before the series is live are queued and replayed after the load,
//! so an insert landing between subscription setup and the bulk query is not
//! lost.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::buffer::{BufferInsert, SeriesBuffer};
use super::error::{SyncError, SyncResult};
use super::state::{InsertOutcome, LoadOutcome, SeriesEvent, Snapshot, SyncState};
use crate::model::{RawRecord, SensorReading};
use crate::source::{BulkQuery, ChangeEvent, ReadingSource, Subscription};

/// How new readings reach the synchronizer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncMode {
    /// Realtime change subscription
    Push,
    /// Re-query the latest rows on a fixed interval
    Poll { interval: Duration },
}

/// Configuration for a synchronizer
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Table holding the readings
    pub table: String,
    /// Maximum readings kept (N)
    pub limit: usize,
    /// Push or poll
    pub mode: SyncMode,
    /// Capacity of the update broadcast channel
    pub event_capacity: usize,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            table: "sensor_data".to_string(),
            limit: 100,
            mode: SyncMode::Push,
            event_capacity: 256,
        }
    }
}

/// Mutable state guarded by the synchronizer's lock
struct Inner {
    state: SyncState,
    buffer: SeriesBuffer,
    /// Published copy of `buffer`, swapped after every mutation
    published: Arc<[SensorReading]>,
    /// Events received before the series went live
    pending: Vec<SensorReading>,
    last_error: Option<String>,
    /// Cancellation token of the attached change subscription
    subscription: Option<CancellationToken>,
}

impl Inner {
    fn publish(&mut self) {
        self.published = self.buffer.freeze();
    }

    fn queue(&mut self, reading: SensorReading) -> InsertOutcome {
        if self.pending.iter().any(|r| r.id == reading.id) {
            return InsertOutcome::Duplicate;
        }
        self.pending.push(reading);

        // Only the newest N can survive the replay anyway
        if self.pending.len() > self.buffer.capacity() {
            if let Some((oldest, _)) = self.pending.iter().enumerate().min_by_key(|(_, r)| r.id) {
                self.pending.remove(oldest);
            }
        }

        InsertOutcome::Queued
    }
}

/// Bounded, ordered, de-duplicated series fed by a bulk load and an insert stream
pub struct SeriesSynchronizer {
    source: Arc<dyn ReadingSource>,
    config: SyncConfig,
    inner: RwLock<Inner>,
    /// Serializes bulk loads and refreshes
    load_gate: Mutex<()>,
    events: broadcast::Sender<SeriesEvent>,
    shutdown: CancellationToken,
}

impl SeriesSynchronizer {
    /// Create an idle synchronizer over `source`
    pub fn new(source: Arc<dyn ReadingSource>, config: SyncConfig) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let buffer = SeriesBuffer::new(config.limit);

        Self {
            source,
            inner: RwLock::new(Inner {
                state: SyncState::Idle,
                published: buffer.freeze(),
                buffer,
                pending: Vec::new(),
                last_error: None,
                subscription: None,
            }),
            load_gate: Mutex::new(()),
            config,
            events,
            shutdown: CancellationToken::new(),
        }
    }

    pub fn config(&self) -> &SyncConfig {
        &self.config
    }

    /// Name of the underlying source
    pub fn source_name(&self) -> &str {
        self.source.name()
    }

    /// Receive series events from now on
    pub fn updates(&self) -> broadcast::Receiver<SeriesEvent> {
        self.events.subscribe()
    }

    /// Token cancelled by [`teardown`](Self::teardown)
    pub fn shutdown_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub async fn state(&self) -> SyncState {
        self.inner.read().await.state
    }

    pub fn is_closed(&self) -> bool {
        self.shutdown.is_cancelled()
    }

    /// Current series as an immutable ordered sequence
    pub async fn snapshot(&self) -> Snapshot {
        let inner = self.inner.read().await;
        Snapshot {
            state: inner.state,
            readings: Arc::clone(&inner.published),
            last_error: inner.last_error.clone(),
            capacity: inner.buffer.capacity(),
        }
    }

    fn transition(&self, inner: &mut Inner, next: SyncState, error: Option<String>) {
        let previous = inner.state;
        inner.state = next;
        inner.last_error = error.clone();

        if previous != next {
            tracing::info!(from = %previous, to = %next, "Series state changed");
        }
        let _ = self.events.send(SeriesEvent::StateChanged { state: next, error });
    }

    /// Load the latest N readings and go live.
    ///
    /// A call while another load is in flight returns
    /// [`LoadOutcome::AlreadyLoading`] without touching the buffer. On
    /// failure the buffer is left as it was and the state becomes `Error`.
    pub async fn initialize(&self) -> SyncResult<LoadOutcome> {
        if !self.begin_load().await? {
            tracing::debug!("Bulk load already in flight");
            return Ok(LoadOutcome::AlreadyLoading);
        }

        // Wait out a refresh that is still applying its rows
        let _gate = self.load_gate.lock().await;
        self.install_latest().await
    }

    /// Move to `Loading`; `false` when a load already owns that state
    async fn begin_load(&self) -> SyncResult<bool> {
        let mut inner = self.inner.write().await;
        match inner.state {
            SyncState::Closed => Err(SyncError::Closed),
            SyncState::Loading => Ok(false),
            _ => {
                self.transition(&mut inner, SyncState::Loading, None);
                Ok(true)
            }
        }
    }

    /// Query and install the latest rows. Caller holds the load gate and
    /// has moved the state to `Loading`.
    async fn install_latest(&self) -> SyncResult<LoadOutcome> {
        let query = BulkQuery::latest(self.config.table.as_str(), self.config.limit);
        let result = self.source.query(&query).await;

        let mut inner = self.inner.write().await;
        if inner.state == SyncState::Closed {
            return Err(SyncError::Closed);
        }

        match result {
            Ok(rows) => {
                // Rows arrive newest first
                let readings: Vec<SensorReading> =
                    rows.iter().rev().map(SensorReading::from_record).collect();
                inner.buffer.install(readings);
                let count = inner.buffer.len();

                let pending = std::mem::take(&mut inner.pending);
                let replayed = pending.len();
                for reading in pending {
                    inner.buffer.insert(reading);
                }

                inner.publish();
                self.transition(&mut inner, SyncState::Live, None);
                let _ = self.events.send(SeriesEvent::Installed {
                    count: inner.buffer.len(),
                });

                tracing::info!(
                    source = self.source.name(),
                    table = %self.config.table,
                    count,
                    replayed,
                    "Series loaded"
                );
                Ok(LoadOutcome::Installed { count, replayed })
            }
            Err(e) => {
                tracing::warn!(error = %e, table = %self.config.table, "Bulk load failed");
                self.transition(&mut inner, SyncState::Error, Some(e.to_string()));
                Err(SyncError::Transport(e))
            }
        }
    }

    /// Re-query the latest N readings and merge them into the series.
    ///
    /// Used by poll mode and the refresh endpoint. Before the first
    /// successful load this is a full load. Inserts queued while the series
    /// was in `Error` are replayed on success. A failure keeps the last good
    /// series and moves to `Error`. Refreshes and loads never overlap; if a
    /// load starts while the query is out, the rows are merged but the state
    /// is left to that load.
    pub async fn refresh(&self) -> SyncResult<LoadOutcome> {
        let _gate = self.load_gate.lock().await;

        let (state, empty) = {
            let inner = self.inner.read().await;
            (inner.state, inner.buffer.is_empty())
        };
        match state {
            SyncState::Closed => return Err(SyncError::Closed),
            SyncState::Loading => return Ok(LoadOutcome::AlreadyLoading),
            SyncState::Idle => return self.load_gated().await,
            SyncState::Error if empty => return self.load_gated().await,
            _ => {}
        }

        let query = BulkQuery::latest(self.config.table.as_str(), self.config.limit);
        let result = self.source.query(&query).await;

        let mut inner = self.inner.write().await;
        if inner.state == SyncState::Closed {
            return Err(SyncError::Closed);
        }
        let loading = inner.state == SyncState::Loading;

        match result {
            Ok(rows) => {
                let mut added = Vec::new();
                for reading in rows.iter().rev().map(SensorReading::from_record) {
                    if inner.buffer.insert(reading.clone()) == BufferInsert::Added {
                        added.push(reading);
                    }
                }

                // A pending load owns the queue and the state
                if !loading {
                    for reading in std::mem::take(&mut inner.pending) {
                        if inner.buffer.insert(reading.clone()) == BufferInsert::Added {
                            added.push(reading);
                        }
                    }
                }

                if !added.is_empty() {
                    inner.publish();
                    for reading in &added {
                        let _ = self.events.send(SeriesEvent::Appended(reading.clone()));
                    }
                }
                if !loading && inner.state != SyncState::Live {
                    self.transition(&mut inner, SyncState::Live, None);
                }

                tracing::debug!(added = added.len(), "Series refreshed");
                Ok(LoadOutcome::Refreshed { added: added.len() })
            }
            Err(e) if loading => {
                tracing::debug!(error = %e, "Refresh failed while a load is pending");
                Err(SyncError::Transport(e))
            }
            Err(e) => {
                tracing::warn!(error = %e, "Refresh failed, keeping last good series");
                self.transition(&mut inner, SyncState::Error, Some(e.to_string()));
                Err(SyncError::Transport(e))
            }
        }
    }

    /// Full load while the caller already holds the load gate
    async fn load_gated(&self) -> SyncResult<LoadOutcome> {
        if !self.begin_load().await? {
            return Ok(LoadOutcome::AlreadyLoading);
        }
        self.install_latest().await
    }

    /// Apply one insert notification.
    ///
    /// Duplicate ids are discarded, so redelivery is harmless. Before the
    /// series is live the reading is queued for replay; after teardown the
    /// event is ignored.
    pub async fn on_insert_event(&self, record: &RawRecord) -> InsertOutcome {
        let reading = SensorReading::from_record(record);
        let mut inner = self.inner.write().await;

        match inner.state {
            SyncState::Closed => {
                tracing::trace!(id = reading.id, "Ignoring insert after teardown");
                InsertOutcome::Ignored
            }
            SyncState::Live => match inner.buffer.insert(reading.clone()) {
                BufferInsert::Added => {
                    inner.publish();
                    tracing::trace!(id = reading.id, "Reading appended");
                    let _ = self.events.send(SeriesEvent::Appended(reading));
                    InsertOutcome::Appended
                }
                BufferInsert::Duplicate => {
                    tracing::debug!(id = reading.id, "Discarding redelivered reading");
                    InsertOutcome::Duplicate
                }
                BufferInsert::Stale => {
                    tracing::debug!(id = reading.id, "Discarding reading older than the series");
                    InsertOutcome::Stale
                }
            },
            SyncState::Idle | SyncState::Loading | SyncState::Error => {
                tracing::debug!(
                    id = reading.id,
                    state = %inner.state,
                    "Queueing insert until live"
                );
                inner.queue(reading)
            }
        }
    }

    /// Record that the change subscription broke after it was established.
    ///
    /// The series stays readable; only the state moves to `Error`.
    pub async fn mark_failed(&self, reason: &str) {
        let mut inner = self.inner.write().await;
        if inner.state == SyncState::Closed {
            return;
        }
        tracing::warn!(
            reason = %reason,
            buffered = inner.buffer.len(),
            "Change subscription failed"
        );
        inner.subscription = None;
        self.transition(&mut inner, SyncState::Error, Some(reason.to_string()));
    }

    /// Open the change subscription and forward its events
    pub async fn subscribe(self: &Arc<Self>) -> SyncResult<JoinHandle<()>> {
        if self.is_closed() {
            return Err(SyncError::Closed);
        }

        match self.source.subscribe(&self.config.table).await {
            Ok(subscription) => self.attach(subscription).await,
            Err(e) => {
                let mut inner = self.inner.write().await;
                if inner.state != SyncState::Closed {
                    self.transition(&mut inner, SyncState::Error, Some(e.to_string()));
                }
                Err(SyncError::Transport(e))
            }
        }
    }

    /// Forward events from an established subscription.
    ///
    /// Replaces (and releases) any previously attached subscription. The
    /// forwarding task stops on teardown, on cancellation, or when the
    /// subscription fails.
    pub async fn attach(
        self: &Arc<Self>,
        mut subscription: Subscription,
    ) -> SyncResult<JoinHandle<()>> {
        let token = subscription.cancel_token();
        {
            let mut inner = self.inner.write().await;
            if inner.state == SyncState::Closed {
                subscription.unsubscribe();
                return Err(SyncError::Closed);
            }
            if let Some(previous) = inner.subscription.replace(token.clone()) {
                previous.cancel();
            }
        }

        let this = Arc::clone(self);
        let shutdown = self.shutdown.clone();

        Ok(tokio::spawn(async move {
            loop {
                tokio::select! {
                    biased;
                    _ = shutdown.cancelled() => break,
                    _ = token.cancelled() => break,
                    event = subscription.next() => match event {
                        Some(ChangeEvent::Insert(record)) => {
                            this.on_insert_event(&record).await;
                        }
                        Some(ChangeEvent::Failed(reason)) => {
                            this.mark_failed(&reason).await;
                            break;
                        }
                        None => {
                            this.mark_failed("subscription ended").await;
                            break;
                        }
                    },
                }
            }
        }))
    }

    /// Release the subscription and close. Safe to call more than once;
    /// returns whether this call did the release.
    pub async fn teardown(&self) -> bool {
        let mut inner = self.inner.write().await;
        if inner.state == SyncState::Closed {
            return false;
        }

        if let Some(token) = inner.subscription.take() {
            token.cancel();
        }
        inner.pending.clear();
        self.shutdown.cancel();
        self.transition(&mut inner, SyncState::Closed, None);

        tracing::info!(table = %self.config.table, "Synchronizer torn down");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::source::{MemorySource, SourceError, SourceResult};
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use tokio::sync::{mpsc, Notify};

    fn record(value: Value) -> RawRecord {
        value.as_object().cloned().unwrap()
    }

    fn row(id: i64) -> RawRecord {
        record(json!({ "id": id, "weight_g": id as f64 * 1.5, "ir_value": id * 10 }))
    }

    fn ids(snapshot: &Snapshot) -> Vec<i64> {
        snapshot.readings.iter().map(|r| r.id).collect()
    }

    fn config(limit: usize) -> SyncConfig {
        SyncConfig {
            limit,
            ..Default::default()
        }
    }

    /// Source whose subscription sender stays in the test's hands
    struct StubSource {
        rows: Vec<RawRecord>,
        gate: Option<Arc<Notify>>,
        fail: bool,
        sender: std::sync::Mutex<Option<mpsc::Sender<ChangeEvent>>>,
    }

    impl StubSource {
        fn new(ids: impl IntoIterator<Item = i64>) -> Self {
            Self {
                rows: ids.into_iter().map(row).collect(),
                gate: None,
                fail: false,
                sender: std::sync::Mutex::new(None),
            }
        }

        fn gated(mut self, gate: Arc<Notify>) -> Self {
            self.gate = Some(gate);
            self
        }

        fn failing(mut self) -> Self {
            self.fail = true;
            self
        }

        fn sender(&self) -> mpsc::Sender<ChangeEvent> {
            self.sender.lock().unwrap().clone().unwrap()
        }
    }

    #[async_trait]
    impl ReadingSource for StubSource {
        fn name(&self) -> &str {
            "stub"
        }

        async fn query(&self, query: &BulkQuery) -> SourceResult<Vec<RawRecord>> {
            if let Some(gate) = &self.gate {
                gate.notified().await;
            }
            if self.fail {
                return Err(SourceError::Unavailable);
            }
            Ok(self.rows.iter().rev().take(query.limit).cloned().collect())
        }

        async fn subscribe(&self, _table: &str) -> SourceResult<Subscription> {
            let (tx, rx) = mpsc::channel(16);
            *self.sender.lock().unwrap() = Some(tx);
            Ok(Subscription::new(rx, CancellationToken::new()))
        }
    }

    async fn wait_for_state(sync: &SeriesSynchronizer, state: SyncState) {
        for _ in 0..1000 {
            if sync.state().await == state {
                return;
            }
            tokio::task::yield_now().await;
        }
        panic!("state never reached {}", state);
    }

    #[tokio::test]
    async fn test_initialize_installs_ascending() {
        let sync = SeriesSynchronizer::new(Arc::new(StubSource::new(1..=30)), config(100));
        assert_eq!(sync.state().await, SyncState::Idle);

        let outcome = sync.initialize().await.unwrap();
        assert_eq!(outcome, LoadOutcome::Installed { count: 30, replayed: 0 });

        let snapshot = sync.snapshot().await;
        assert_eq!(snapshot.state, SyncState::Live);
        assert_eq!(ids(&snapshot), (1..=30).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_initialize_keeps_latest_n() {
        let sync = SeriesSynchronizer::new(Arc::new(StubSource::new(1..=120)), config(100));
        sync.initialize().await.unwrap();

        let snapshot = sync.snapshot().await;
        assert_eq!(snapshot.len(), 100);
        assert_eq!(ids(&snapshot).first(), Some(&21));
        assert_eq!(ids(&snapshot).last(), Some(&120));
    }

    #[tokio::test]
    async fn test_initialize_failure_is_typed_and_leaves_buffer_empty() {
        let sync = SeriesSynchronizer::new(Arc::new(StubSource::new(1..=5).failing()), config(100));

        let err = sync.initialize().await.unwrap_err();
        assert!(matches!(err, SyncError::Transport(SourceError::Unavailable)));

        let snapshot = sync.snapshot().await;
        assert_eq!(snapshot.state, SyncState::Error);
        assert!(snapshot.is_empty());
        assert!(snapshot.last_error.is_some());
    }

    #[tokio::test]
    async fn test_append_evicts_oldest() {
        let sync = SeriesSynchronizer::new(Arc::new(StubSource::new(1..=50)), config(50));
        sync.initialize().await.unwrap();

        let outcome = sync.on_insert_event(&row(51)).await;
        assert_eq!(outcome, InsertOutcome::Appended);
        assert_eq!(ids(&sync.snapshot().await), (2..=51).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_duplicate_insert_is_idempotent() {
        let sync = SeriesSynchronizer::new(Arc::new(StubSource::new(1..=10)), config(100));
        sync.initialize().await.unwrap();
        let before = sync.snapshot().await;

        assert_eq!(sync.on_insert_event(&row(7)).await, InsertOutcome::Duplicate);
        assert_eq!(sync.on_insert_event(&row(10)).await, InsertOutcome::Duplicate);

        let after = sync.snapshot().await;
        assert!(Arc::ptr_eq(&before.readings, &after.readings));
    }

    #[tokio::test]
    async fn test_insert_sequence_respects_bound_and_uniqueness() {
        let sync = SeriesSynchronizer::new(Arc::new(StubSource::new(1..=5)), config(10));
        sync.initialize().await.unwrap();

        for id in [6, 7, 7, 3, 8, 12, 9, 12, 15, 20, 21, 22, 23, 6] {
            sync.on_insert_event(&row(id)).await;
            let snapshot = sync.snapshot().await;
            assert!(snapshot.len() <= 10);

            let current = ids(&snapshot);
            assert!(current.windows(2).all(|w| w[0] < w[1]));
        }
    }

    #[tokio::test]
    async fn test_events_before_live_are_replayed() {
        let gate = Arc::new(Notify::new());
        let source = StubSource::new(1..=5).gated(Arc::clone(&gate));
        let sync = Arc::new(SeriesSynchronizer::new(Arc::new(source), config(100)));

        let loader = {
            let sync = Arc::clone(&sync);
            tokio::spawn(async move { sync.initialize().await })
        };
        wait_for_state(&sync, SyncState::Loading).await;

        // Landed between subscription setup and the bulk query
        assert_eq!(sync.on_insert_event(&row(6)).await, InsertOutcome::Queued);
        // Also part of the bulk result; replay must not duplicate it
        assert_eq!(sync.on_insert_event(&row(5)).await, InsertOutcome::Queued);
        assert_eq!(sync.on_insert_event(&row(6)).await, InsertOutcome::Duplicate);

        gate.notify_one();
        let outcome = loader.await.unwrap().unwrap();
        assert_eq!(outcome, LoadOutcome::Installed { count: 5, replayed: 2 });
        assert_eq!(ids(&sync.snapshot().await), vec![1, 2, 3, 4, 5, 6]);
    }

    #[tokio::test]
    async fn test_second_initialize_while_loading_is_noop() {
        let gate = Arc::new(Notify::new());
        let source = StubSource::new(1..=3).gated(Arc::clone(&gate));
        let sync = Arc::new(SeriesSynchronizer::new(Arc::new(source), config(100)));

        let loader = {
            let sync = Arc::clone(&sync);
            tokio::spawn(async move { sync.initialize().await })
        };
        wait_for_state(&sync, SyncState::Loading).await;

        assert_eq!(sync.initialize().await.unwrap(), LoadOutcome::AlreadyLoading);

        gate.notify_one();
        loader.await.unwrap().unwrap();
        assert_eq!(ids(&sync.snapshot().await), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_refresh_and_initialize_do_not_overlap() {
        let gate = Arc::new(Notify::new());
        let source = StubSource::new(1..=4).gated(Arc::clone(&gate));
        let sync = Arc::new(SeriesSynchronizer::new(Arc::new(source), config(100)));

        gate.notify_one();
        sync.initialize().await.unwrap();
        sync.mark_failed("socket closed").await;

        // Refresh takes the load gate and parks in its query
        let refresher = {
            let sync = Arc::clone(&sync);
            tokio::spawn(async move { sync.refresh().await })
        };
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }

        // Driver reconnects and starts a full load behind the refresh
        let loader = {
            let sync = Arc::clone(&sync);
            tokio::spawn(async move { sync.initialize().await })
        };
        wait_for_state(&sync, SyncState::Loading).await;
        assert_eq!(sync.on_insert_event(&row(5)).await, InsertOutcome::Queued);

        gate.notify_one();
        let refreshed = refresher.await.unwrap().unwrap();
        assert_eq!(refreshed, LoadOutcome::Refreshed { added: 0 });
        assert_eq!(sync.state().await, SyncState::Loading);
        assert_eq!(sync.initialize().await.unwrap(), LoadOutcome::AlreadyLoading);

        gate.notify_one();
        let installed = loader.await.unwrap().unwrap();
        assert_eq!(installed, LoadOutcome::Installed { count: 4, replayed: 1 });

        let snapshot = sync.snapshot().await;
        assert_eq!(snapshot.state, SyncState::Live);
        assert_eq!(ids(&snapshot), vec![1, 2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_refresh_from_error_replays_queued_inserts() {
        let sync = SeriesSynchronizer::new(Arc::new(StubSource::new(1..=3)), config(100));
        sync.initialize().await.unwrap();
        sync.mark_failed("socket closed").await;

        assert_eq!(sync.on_insert_event(&row(4)).await, InsertOutcome::Queued);
        assert_eq!(sync.on_insert_event(&row(2)).await, InsertOutcome::Queued);

        assert_eq!(
            sync.refresh().await.unwrap(),
            LoadOutcome::Refreshed { added: 1 }
        );

        let snapshot = sync.snapshot().await;
        assert_eq!(snapshot.state, SyncState::Live);
        assert_eq!(ids(&snapshot), vec![1, 2, 3, 4]);

        // Queue was drained; a later load has nothing left to replay
        assert_eq!(
            sync.initialize().await.unwrap(),
            LoadOutcome::Installed { count: 3, replayed: 0 }
        );
    }

    #[tokio::test]
    async fn test_teardown_blocks_late_events() {
        let source = Arc::new(StubSource::new(1..=5));
        let sync = Arc::new(SeriesSynchronizer::new(
            Arc::clone(&source) as Arc<dyn ReadingSource>,
            config(100),
        ));

        let forward = sync.subscribe().await.unwrap();
        sync.initialize().await.unwrap();
        let before = sync.snapshot().await;

        assert!(sync.teardown().await);
        forward.await.unwrap();

        // The transport fires its callback after the view went away
        let late = source.sender();
        let _ = late.send(ChangeEvent::Insert(row(6))).await;
        assert_eq!(sync.on_insert_event(&row(7)).await, InsertOutcome::Ignored);

        let after = sync.snapshot().await;
        assert_eq!(after.state, SyncState::Closed);
        assert_eq!(ids(&after), ids(&before));
    }

    #[tokio::test]
    async fn test_teardown_is_idempotent() {
        let sync = SeriesSynchronizer::new(Arc::new(StubSource::new(1..=2)), config(100));
        assert!(sync.teardown().await);
        assert!(!sync.teardown().await);
        assert!(sync.is_closed());
        assert!(matches!(sync.initialize().await, Err(SyncError::Closed)));
    }

    #[tokio::test]
    async fn test_forwarded_events_reach_buffer() {
        let source = Arc::new(StubSource::new(1..=3));
        let sync = Arc::new(SeriesSynchronizer::new(
            Arc::clone(&source) as Arc<dyn ReadingSource>,
            config(100),
        ));
        let mut updates = sync.updates();

        sync.subscribe().await.unwrap();
        sync.initialize().await.unwrap();

        source.sender().send(ChangeEvent::Insert(row(4))).await.unwrap();

        let appended = tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if let Ok(SeriesEvent::Appended(reading)) = updates.recv().await {
                    return reading;
                }
            }
        })
        .await
        .unwrap();
        assert_eq!(appended.id, 4);
        assert_eq!(ids(&sync.snapshot().await), vec![1, 2, 3, 4]);
    }

    #[tokio::test]
    async fn test_subscription_failure_keeps_series() {
        let source = Arc::new(StubSource::new(1..=3));
        let sync = Arc::new(SeriesSynchronizer::new(
            Arc::clone(&source) as Arc<dyn ReadingSource>,
            config(100),
        ));

        let forward = sync.subscribe().await.unwrap();
        sync.initialize().await.unwrap();

        source
            .sender()
            .send(ChangeEvent::Failed("socket closed".into()))
            .await
            .unwrap();
        forward.await.unwrap();

        let snapshot = sync.snapshot().await;
        assert_eq!(snapshot.state, SyncState::Error);
        assert_eq!(snapshot.last_error.as_deref(), Some("socket closed"));
        assert_eq!(ids(&snapshot), vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn test_snapshot_is_never_torn() {
        let sync = SeriesSynchronizer::new(Arc::new(StubSource::new(1..=3)), config(3));
        sync.initialize().await.unwrap();

        let before = sync.snapshot().await;
        sync.on_insert_event(&row(4)).await;
        let after = sync.snapshot().await;

        // The earlier snapshot is unaffected by the append
        assert_eq!(ids(&before), vec![1, 2, 3]);
        assert_eq!(ids(&after), vec![2, 3, 4]);
        assert_eq!(after.latest().map(|r| r.ir_value), Some(40));
        assert_eq!(before.latest().map(|r| r.ir_value), Some(30));
    }

    #[tokio::test]
    async fn test_refresh_merges_and_recovers() {
        let source = Arc::new(MemorySource::new());
        for id in 1..=3 {
            source.seed(row(id)).await;
        }
        let sync = SeriesSynchronizer::new(
            Arc::clone(&source) as Arc<dyn ReadingSource>,
            SyncConfig {
                limit: 4,
                mode: SyncMode::Poll {
                    interval: Duration::from_millis(10),
                },
                ..Default::default()
            },
        );

        // First refresh performs the bulk load
        let outcome = sync.refresh().await.unwrap();
        assert!(matches!(outcome, LoadOutcome::Installed { count: 3, .. }));

        source.seed(row(4)).await;
        source.seed(row(5)).await;
        source.set_failing(true);
        assert!(sync.refresh().await.is_err());

        let stale = sync.snapshot().await;
        assert_eq!(stale.state, SyncState::Error);
        assert_eq!(ids(&stale), vec![1, 2, 3]);

        source.set_failing(false);
        assert_eq!(
            sync.refresh().await.unwrap(),
            LoadOutcome::Refreshed { added: 2 }
        );
        let fresh = sync.snapshot().await;
        assert_eq!(fresh.state, SyncState::Live);
        assert_eq!(ids(&fresh), vec![2, 3, 4, 5]);
    }

    #[tokio::test]
    async fn test_memory_source_end_to_end() {
        let source = Arc::new(MemorySource::new());
        for id in 1..=10 {
            source.seed(row(id)).await;
        }
        let sync = Arc::new(SeriesSynchronizer::new(
            Arc::clone(&source) as Arc<dyn ReadingSource>,
            config(10),
        ));
        let mut updates = sync.updates();

        sync.subscribe().await.unwrap();
        sync.initialize().await.unwrap();

        source.insert(record(json!({ "weight_g": "250.5" }))).await;
        // Redelivery of the same row
        source.redeliver(row(11)).await;

        tokio::time::timeout(Duration::from_secs(2), async {
            loop {
                if let Ok(SeriesEvent::Appended(reading)) = updates.recv().await {
                    assert_eq!(reading.id, 11);
                    assert_eq!(reading.weight_g, 250.5);
                    break;
                }
            }
        })
        .await
        .unwrap();

        // Give the forwarder a moment to process the redelivery
        tokio::time::sleep(Duration::from_millis(20)).await;
        let snapshot = sync.snapshot().await;
        assert_eq!(ids(&snapshot), (2..=11).collect::<Vec<_>>());

        sync.teardown().await;
        assert_eq!(source.subscriber_count().await, 0);
    }
}
