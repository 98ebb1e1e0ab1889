//! Realtime Client
//!
//! Websocket client for Supabase Realtime. Speaks the Phoenix channel
//! protocol: join a `realtime:{channel}` topic with a `postgres_changes`
//! INSERT filter, keep it alive with heartbeats, and forward every inserted
//! row as a [`ChangeEvent::Insert`].

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tokio_util::sync::CancellationToken;

use super::{ChangeEvent, RawRecord, SourceError, SourceResult, Subscription, SupabaseConfig};

/// Capacity of the per-subscription event channel
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// Ref used for the channel join; replies carry it back
const JOIN_REF: &str = "1";

/// Realtime websocket client
pub struct RealtimeClient {
    config: SupabaseConfig,
}

/// Message on the Phoenix socket, both directions
#[derive(Debug, Clone, Serialize, Deserialize)]
struct PhoenixMessage {
    topic: String,
    event: String,
    #[serde(default)]
    payload: Value,
    #[serde(rename = "ref", default)]
    reference: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    join_ref: Option<String>,
}

/// Decoded inbound frame, reduced to what the subscription cares about
#[derive(Debug, Clone, PartialEq)]
pub enum RealtimeFrame {
    /// Reply to one of our pushes
    Reply {
        reference: Option<String>,
        ok: bool,
        detail: String,
    },
    /// A row was inserted
    Insert(RawRecord),
    /// Server reported a channel error
    ChannelError(String),
    /// Server closed the channel
    Closed,
    /// Heartbeat replies, presence, other tables, ...
    Ignored,
}

impl RealtimeClient {
    pub fn new(config: SupabaseConfig) -> Self {
        Self { config }
    }

    /// Realtime websocket URL derived from the project URL
    pub fn socket_url(&self) -> String {
        let base = self.config.base_url();
        let ws_base = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{}", rest)
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{}", rest)
        } else {
            base.to_string()
        };

        format!(
            "{}/realtime/v1/websocket?apikey={}&vsn=1.0.0",
            ws_base,
            urlencoding::encode(&self.config.anon_key)
        )
    }

    /// Channel topic joined for this client
    pub fn topic(&self) -> String {
        format!("realtime:{}", self.config.channel)
    }

    fn join_message(&self, table: &str) -> PhoenixMessage {
        PhoenixMessage {
            topic: self.topic(),
            event: "phx_join".to_string(),
            payload: json!({
                "config": {
                    "broadcast": { "self": false },
                    "presence": { "key": "" },
                    "postgres_changes": [{
                        "event": "INSERT",
                        "schema": self.config.schema,
                        "table": table,
                    }],
                },
                "access_token": self.config.anon_key,
            }),
            reference: Some(JOIN_REF.to_string()),
            join_ref: Some(JOIN_REF.to_string()),
        }
    }

    /// Connect, join the channel and start forwarding inserts.
    ///
    /// Resolves only after the server acknowledged the join.
    pub async fn subscribe(&self, table: &str) -> SourceResult<Subscription> {
        let url = self.socket_url();
        tracing::debug!(topic = %self.topic(), table = %table, "Connecting to Realtime");

        let (socket, _) = tokio_tungstenite::connect_async(url.as_str()).await?;
        let (mut write, mut read) = socket.split();

        let join = serde_json::to_string(&self.join_message(table))?;
        write.send(Message::Text(join)).await?;

        // Wait for the join reply before reporting the subscription as live
        let join_timeout = Duration::from_millis(self.config.join_timeout_ms);
        let joined = tokio::time::timeout(join_timeout, async {
            while let Some(msg) = read.next().await {
                let Message::Text(text) = msg? else {
                    continue;
                };
                match decode_frame(&text) {
                    RealtimeFrame::Reply {
                        reference, ok, detail,
                    } if reference.as_deref() == Some(JOIN_REF) => {
                        return if ok {
                            Ok(())
                        } else {
                            Err(SourceError::Subscribe(detail))
                        };
                    }
                    RealtimeFrame::ChannelError(reason) => {
                        return Err(SourceError::Subscribe(reason));
                    }
                    _ => {}
                }
            }
            Err::<(), SourceError>(SourceError::Subscribe(
                "socket closed before join reply".to_string(),
            ))
        })
        .await;

        match joined {
            Ok(result) => result?,
            Err(_) => return Err(SourceError::Timeout),
        }

        tracing::info!(topic = %self.topic(), table = %table, "Realtime subscription established");

        let (tx, rx) = mpsc::channel(EVENT_CHANNEL_CAPACITY);
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let topic = self.topic();
        let heartbeat = Duration::from_millis(self.config.heartbeat_interval_ms);

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(heartbeat);
            ticker.tick().await;
            let mut next_ref: u64 = 2;

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        let leave = PhoenixMessage {
                            topic: topic.clone(),
                            event: "phx_leave".to_string(),
                            payload: json!({}),
                            reference: Some(next_ref.to_string()),
                            join_ref: Some(JOIN_REF.to_string()),
                        };
                        if let Ok(text) = serde_json::to_string(&leave) {
                            let _ = write.send(Message::Text(text)).await;
                        }
                        let _ = write.close().await;
                        tracing::debug!(topic = %topic, "Realtime subscription released");
                        break;
                    }
                    _ = ticker.tick() => {
                        let beat = PhoenixMessage {
                            topic: "phoenix".to_string(),
                            event: "heartbeat".to_string(),
                            payload: json!({}),
                            reference: Some(next_ref.to_string()),
                            join_ref: None,
                        };
                        next_ref += 1;
                        let sent = match serde_json::to_string(&beat) {
                            Ok(text) => write.send(Message::Text(text)).await.is_ok(),
                            Err(_) => false,
                        };
                        if !sent {
                            let _ = tx
                                .send(ChangeEvent::Failed("heartbeat send failed".into()))
                                .await;
                            break;
                        }
                    }
                    msg = read.next() => {
                        let text = match msg {
                            Some(Ok(Message::Text(text))) => text,
                            Some(Ok(Message::Close(_))) | None => {
                                let _ = tx.send(ChangeEvent::Failed("socket closed".into())).await;
                                break;
                            }
                            Some(Ok(_)) => continue,
                            Some(Err(e)) => {
                                let _ = tx.send(ChangeEvent::Failed(e.to_string())).await;
                                break;
                            }
                        };

                        match decode_frame(&text) {
                            RealtimeFrame::Insert(record) => {
                                if tx.send(ChangeEvent::Insert(record)).await.is_err() {
                                    // Receiver dropped: nobody is listening anymore
                                    break;
                                }
                            }
                            RealtimeFrame::ChannelError(reason) => {
                                let _ = tx.send(ChangeEvent::Failed(reason)).await;
                                break;
                            }
                            RealtimeFrame::Closed => {
                                let _ = tx
                                    .send(ChangeEvent::Failed("channel closed by server".into()))
                                    .await;
                                break;
                            }
                            RealtimeFrame::Reply { ok: false, detail, .. } => {
                                tracing::warn!(
                                    topic = %topic,
                                    detail = %detail,
                                    "Realtime push rejected"
                                );
                            }
                            _ => {}
                        }
                    }
                }
            }
        });

        Ok(Subscription::new(rx, cancel))
    }
}

/// Decode one text frame from the Realtime socket
pub fn decode_frame(text: &str) -> RealtimeFrame {
    let msg: PhoenixMessage = match serde_json::from_str(text) {
        Ok(msg) => msg,
        Err(e) => {
            tracing::debug!(error = %e, "Ignoring undecodable Realtime frame");
            return RealtimeFrame::Ignored;
        }
    };

    match msg.event.as_str() {
        "phx_reply" => {
            let ok = msg.payload.get("status").and_then(Value::as_str) == Some("ok");
            let detail = msg
                .payload
                .get("response")
                .map(|r| r.to_string())
                .unwrap_or_default();
            RealtimeFrame::Reply {
                reference: msg.reference,
                ok,
                detail,
            }
        }
        "postgres_changes" => {
            let data = &msg.payload["data"];
            let is_insert = data.get("type").and_then(Value::as_str) == Some("INSERT");
            match data.get("record") {
                Some(Value::Object(record)) if is_insert => RealtimeFrame::Insert(record.clone()),
                _ => RealtimeFrame::Ignored,
            }
        }
        // Older servers send the change type as the event name
        "INSERT" => match msg.payload.get("record") {
            Some(Value::Object(record)) => RealtimeFrame::Insert(record.clone()),
            _ => RealtimeFrame::Ignored,
        },
        "phx_error" => RealtimeFrame::ChannelError("channel error".to_string()),
        "phx_close" => RealtimeFrame::Closed,
        "system" if msg.payload.get("status").and_then(Value::as_str) == Some("error") => {
            let message = msg
                .payload
                .get("message")
                .and_then(Value::as_str)
                .unwrap_or("system error")
                .to_string();
            RealtimeFrame::ChannelError(message)
        }
        _ => RealtimeFrame::Ignored,
    }
}
