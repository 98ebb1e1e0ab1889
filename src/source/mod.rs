//! Remote Data Source
//!
//! The managed database is consumed through the [`ReadingSource`] trait:
//! a one-shot bulk query for the latest rows and a long-lived change
//! subscription for inserts.
//!
//! ## Adapters
//!
//! - [`SupabaseSource`]: PostgREST for queries, Realtime websocket for inserts
//! - [`MemorySource`]: in-process table used by tests and the `demo` command
//!
//! ## Subscriptions
//!
//! [`ReadingSource::subscribe`] hands back a [`Subscription`]: a receiver of
//! [`ChangeEvent`]s plus the cancellation token that tears the channel down.
//! Cancelling (or dropping) the subscription is the unsubscribe.

mod error;
mod memory;
mod realtime;
mod rest;
mod supabase;

pub use error::{SourceError, SourceResult};
pub use memory::MemorySource;
pub use realtime::{RealtimeClient, RealtimeFrame};
pub use rest::PostgrestClient;
pub use supabase::{SupabaseConfig, SupabaseSource};

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use crate::model::RawRecord;

/// Backend that can list recent rows and push newly inserted ones
#[async_trait]
pub trait ReadingSource: Send + Sync {
    /// Short name used in logs
    fn name(&self) -> &str;

    /// Run a bulk query, returning rows in the requested order
    async fn query(&self, query: &BulkQuery) -> SourceResult<Vec<RawRecord>>;

    /// Open a change subscription delivering inserts on `table`.
    ///
    /// Returns once the subscription is established; failure to establish
    /// is reported here rather than through the event stream.
    async fn subscribe(&self, table: &str) -> SourceResult<Subscription>;
}

/// Sort direction for a bulk query
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SortDirection {
    Ascending,
    Descending,
}

impl SortDirection {
    /// PostgREST spelling (`asc` / `desc`)
    pub fn as_str(&self) -> &'static str {
        match self {
            SortDirection::Ascending => "asc",
            SortDirection::Descending => "desc",
        }
    }
}

/// Parameters of a bulk query
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BulkQuery {
    pub table: String,
    pub order_column: String,
    pub direction: SortDirection,
    pub limit: usize,
}

impl BulkQuery {
    /// The most recent `limit` rows, newest first
    pub fn latest(table: impl Into<String>, limit: usize) -> Self {
        Self {
            table: table.into(),
            order_column: "id".to_string(),
            direction: SortDirection::Descending,
            limit,
        }
    }
}

/// Event delivered by a change subscription
#[derive(Debug, Clone, PartialEq)]
pub enum ChangeEvent {
    /// A row was inserted
    Insert(RawRecord),
    /// The subscription broke after it was established
    Failed(String),
}

/// Live change subscription.
///
/// Events arrive on an mpsc channel; the cancellation token stops the
/// producing task. Dropping the subscription cancels it.
pub struct Subscription {
    events: mpsc::Receiver<ChangeEvent>,
    cancel: CancellationToken,
}

impl Subscription {
    pub fn new(events: mpsc::Receiver<ChangeEvent>, cancel: CancellationToken) -> Self {
        Self { events, cancel }
    }

    /// Wait for the next event; `None` once the producer is gone
    pub async fn next(&mut self) -> Option<ChangeEvent> {
        self.events.recv().await
    }

    /// Token that ends this subscription when cancelled
    pub fn cancel_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Release the subscription
    pub fn unsubscribe(&self) {
        self.cancel.cancel();
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
