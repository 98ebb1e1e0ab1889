//! Synchronizer state, snapshots and change events

use serde::Serialize;
use std::fmt;
use std::sync::Arc;

use crate::model::SensorReading;

/// Lifecycle of a [`SeriesSynchronizer`](super::SeriesSynchronizer).
///
/// `Idle → Loading → Live → (Error | Live)`; `Closed` is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncState {
    Idle,
    Loading,
    Live,
    Error,
    Closed,
}

impl SyncState {
    pub fn as_str(&self) -> &'static str {
        match self {
            SyncState::Idle => "idle",
            SyncState::Loading => "loading",
            SyncState::Live => "live",
            SyncState::Error => "error",
            SyncState::Closed => "closed",
        }
    }

    pub fn is_live(&self) -> bool {
        matches!(self, SyncState::Live)
    }
}

impl fmt::Display for SyncState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Point-in-time view of the series.
///
/// `readings` is shared and never mutated after publication, so a snapshot
/// taken mid-append is either the old sequence or the new one.
#[derive(Debug, Clone, Serialize)]
pub struct Snapshot {
    pub state: SyncState,
    pub readings: Arc<[SensorReading]>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    pub capacity: usize,
}

impl Snapshot {
    pub fn len(&self) -> usize {
        self.readings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.readings.is_empty()
    }

    /// Newest reading, if any
    pub fn latest(&self) -> Option<&SensorReading> {
        self.readings.last()
    }
}

/// Change notification published to listeners (websocket clients, CLI)
#[derive(Debug, Clone)]
pub enum SeriesEvent {
    /// A bulk load replaced the buffer
    Installed { count: usize },
    /// One reading joined the series
    Appended(SensorReading),
    /// The synchronizer changed state
    StateChanged {
        state: SyncState,
        error: Option<String>,
    },
}

/// What a call to `on_insert_event` did
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    /// Reading added to the live series
    Appended,
    /// Id already present; nothing changed
    Duplicate,
    /// Older than the whole (full) buffer; dropped
    Stale,
    /// Not live yet; held for replay after the bulk load
    Queued,
    /// Synchronizer closed; event discarded
    Ignored,
}

/// What a load or refresh did
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum LoadOutcome {
    /// Bulk load installed `count` readings, then replayed `replayed` queued events
    Installed { count: usize, replayed: usize },
    /// Poll refresh merged `added` new readings
    Refreshed { added: usize },
    /// Another load was already in flight
    AlreadyLoading,
}
