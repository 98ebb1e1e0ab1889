//! WebSocket Connection Hub
//!
//! Tracks dashboard connections and fans series updates out to all of them.

use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{mpsc, RwLock};
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::messages::ServerMessage;
use crate::sync::{SeriesEvent, SeriesSynchronizer, SyncState};

/// Unique identifier for a WebSocket connection
pub type ConnectionId = String;

/// Configuration for the connection hub
#[derive(Debug, Clone)]
pub struct HubConfig {
    /// Maximum number of concurrent connections
    pub max_connections: usize,
}

impl Default for HubConfig {
    fn default() -> Self {
        Self {
            max_connections: 1000,
        }
    }
}

/// Manages all WebSocket connections
pub struct ConnectionHub {
    /// Active connections: ConnectionId → outbound channel
    connections: RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<ServerMessage>>>,
    config: HubConfig,
}

impl ConnectionHub {
    /// Create a new connection hub
    pub fn new(config: HubConfig) -> Self {
        Self {
            connections: RwLock::new(HashMap::new()),
            config,
        }
    }

    /// Register a new WebSocket connection
    ///
    /// Returns the connection ID on success, or an error if the connection
    /// limit has been reached.
    pub async fn register(
        &self,
        sender: mpsc::UnboundedSender<ServerMessage>,
    ) -> Result<ConnectionId, HubError> {
        let mut connections = self.connections.write().await;
        if connections.len() >= self.config.max_connections {
            return Err(HubError::TooManyConnections(self.config.max_connections));
        }

        let id = Uuid::new_v4().to_string();
        connections.insert(id.clone(), sender);

        tracing::info!(connection_id = %id, "WebSocket connected");
        Ok(id)
    }

    /// Unregister a connection
    pub async fn unregister(&self, id: &str) {
        if self.connections.write().await.remove(id).is_some() {
            tracing::info!(connection_id = %id, "WebSocket disconnected");
        }
    }

    /// Send a message directly to a specific connection
    pub async fn send_to(&self, id: &str, message: ServerMessage) -> Result<(), HubError> {
        let connections = self.connections.read().await;
        let sender = connections.get(id).ok_or(HubError::ConnectionNotFound)?;

        sender.send(message).map_err(|_| HubError::SendFailed)
    }

    /// Send a message to every connection; returns how many accepted it
    pub async fn broadcast(&self, message: &ServerMessage) -> usize {
        let connections = self.connections.read().await;

        let sent = connections
            .values()
            .filter(|sender| sender.send(message.clone()).is_ok())
            .count();

        if sent > 0 {
            tracing::trace!(connections = sent, "Broadcast message");
        }
        sent
    }

    /// Get the current connection count
    pub async fn connection_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// Relay series events from `sync` to all connections until it closes.
    ///
    /// Bulk installs and lagged receivers are answered with a full snapshot
    /// so every client converges on the synchronizer's series.
    pub fn forward_series(self: &Arc<Self>, sync: Arc<SeriesSynchronizer>) -> JoinHandle<()> {
        let hub = Arc::clone(self);
        let mut updates = sync.updates();
        let shutdown = sync.shutdown_token();

        tokio::spawn(async move {
            loop {
                let event = tokio::select! {
                    biased;
                    event = updates.recv() => event,
                    _ = shutdown.cancelled() => break,
                };

                match event {
                    Ok(SeriesEvent::Installed { .. }) => {
                        hub.broadcast(&sync.snapshot().await.into()).await;
                    }
                    Ok(event) => {
                        let closed = matches!(
                            event,
                            SeriesEvent::StateChanged {
                                state: SyncState::Closed,
                                ..
                            }
                        );
                        if let Some(message) = ServerMessage::from_event(event) {
                            hub.broadcast(&message).await;
                        }
                        if closed {
                            break;
                        }
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        tracing::warn!(skipped, "WebSocket relay lagged, resending snapshot");
                        hub.broadcast(&sync.snapshot().await.into()).await;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
            tracing::debug!("WebSocket relay stopped");
        })
    }
}

/// Errors that can occur in the connection hub
#[derive(Debug, Error)]
pub enum HubError {
    #[error("Too many connections (limit: {0})")]
    TooManyConnections(usize),

    #[error("Connection not found")]
    ConnectionNotFound,

    #[error("Failed to send message")]
    SendFailed,
}
