//! WebSocket Message Types
//!
//! Defines all message types for WebSocket communication between
//! dashboards and the SensoGuard server.

use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::model::SensorReading;
use crate::sync::{SeriesEvent, Snapshot, SyncState};

/// Messages sent from client to server
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// Ask for the full current series again
    Snapshot,
    /// Ping for keepalive
    Ping,
}

/// Messages sent from server to client
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// Connection established
    Connected {
        /// Unique connection identifier
        connection_id: String,
    },
    /// Full series, ascending by id
    Snapshot {
        state: SyncState,
        capacity: usize,
        readings: Arc<[SensorReading]>,
    },
    /// One reading appended to the series
    Reading { reading: SensorReading },
    /// Synchronizer state changed
    State {
        state: SyncState,
        #[serde(skip_serializing_if = "Option::is_none")]
        error: Option<String>,
    },
    /// Pong response to ping
    Pong,
    /// Error message
    Error {
        /// Error description
        message: String,
    },
}

impl From<Snapshot> for ServerMessage {
    fn from(snapshot: Snapshot) -> Self {
        ServerMessage::Snapshot {
            state: snapshot.state,
            capacity: snapshot.capacity,
            readings: snapshot.readings,
        }
    }
}

impl ServerMessage {
    /// Message for a series event. `Installed` carries no readings, so it
    /// maps to `None` and the caller sends a fresh snapshot instead.
    pub fn from_event(event: SeriesEvent) -> Option<Self> {
        match event {
            SeriesEvent::Installed { .. } => None,
            SeriesEvent::Appended(reading) => Some(ServerMessage::Reading { reading }),
            SeriesEvent::StateChanged { state, error } => {
                Some(ServerMessage::State { state, error })
            }
        }
    }

    /// Serialize for the wire
    pub fn to_json(&self) -> String {
        serde_json::to_string(self).unwrap_or_else(|e| {
            format!(r#"{{"type":"error","message":"serialization failed: {}"}}"#, e)
        })
    }
}
