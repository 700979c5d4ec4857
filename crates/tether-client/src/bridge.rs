//! WebSocket bridge client.
//!
//! Talks to a sidecar process that owns the real network protocol stack. All
//! frames are JSON text tagged by `type`. Requests that expect an answer
//! carry an `id` and are acknowledged by an `ack` frame with the same id.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use dashmap::DashMap;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tether_core::Credentials;
use tokio::sync::{mpsc, oneshot};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};

use crate::client::{ClientHandle, Connection, GroupMetadata, MessagingClient, OutboundPayload};
use crate::close::CloseReason;
use crate::envelope::{MessageKey, RawMessage};
use crate::error::ClientError;
use crate::event::{ClientEvent, ConnectionUpdate};

/// Capacity of the per-connection event queue.
const EVENT_BUFFER: usize = 256;

/// Frames sent to the bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BridgeRequest {
    #[serde(rename = "connect")]
    Connect { creds: Credentials },
    #[serde(rename = "send")]
    Send {
        id: String,
        chat_id: String,
        payload: OutboundPayload,
    },
    #[serde(rename = "read")]
    Read { id: String, keys: Vec<MessageKey> },
    #[serde(rename = "group_metadata")]
    GroupMetadata { id: String, chat_id: String },
}

impl BridgeRequest {
    fn id(&self) -> Option<&str> {
        match self {
            BridgeRequest::Connect { .. } => None,
            BridgeRequest::Send { id, .. }
            | BridgeRequest::Read { id, .. }
            | BridgeRequest::GroupMetadata { id, .. } => Some(id),
        }
    }
}

/// Frames received from the bridge.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum BridgeEvent {
    #[serde(rename = "connection.update")]
    ConnectionUpdate {
        /// `"connecting"`, `"open"` or `"close"`.
        connection: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        status_code: Option<u16>,
    },
    /// Full credential blob after a rotation.
    #[serde(rename = "creds.update")]
    CredsUpdate { creds: Value },
    #[serde(rename = "messages.upsert")]
    MessagesUpsert { messages: Vec<RawMessage> },
    #[serde(rename = "ack")]
    Ack {
        id: String,
        #[serde(default)]
        error: Option<String>,
        #[serde(default)]
        result: Option<Value>,
    },
}

impl BridgeEvent {
    /// Translate a connection update frame.
    fn connection_update(connection: &str, status_code: Option<u16>) -> Option<ConnectionUpdate> {
        match connection {
            "connecting" => Some(ConnectionUpdate::Connecting),
            "open" => Some(ConnectionUpdate::Open),
            "close" => Some(ConnectionUpdate::Closed(
                status_code
                    .map(CloseReason::from_status_code)
                    .unwrap_or(CloseReason::Unknown),
            )),
            _ => None,
        }
    }
}

struct Ack {
    error: Option<String>,
    result: Option<Value>,
}

enum Outgoing {
    Frame(String),
    Close,
}

/// [`MessagingClient`] backed by a WebSocket protocol sidecar.
pub struct BridgeClient {
    url: String,
    request_timeout: Duration,
}

impl BridgeClient {
    pub fn new(url: impl Into<String>, request_timeout: Duration) -> Self {
        Self {
            url: url.into(),
            request_timeout,
        }
    }
}

#[async_trait]
impl MessagingClient for BridgeClient {
    fn name(&self) -> &str {
        "bridge"
    }

    async fn connect(&self, creds: &Credentials) -> Result<Connection, ClientError> {
        info!(url = %self.url, "bridge: connecting");
        let hello = serde_json::to_string(&BridgeRequest::Connect {
            creds: creds.clone(),
        })
        .map_err(|e| ClientError::Protocol(e.to_string()))?;

        // WebSocket upgrade plus hello share one deadline.
        let handshake = async {
            let (ws_stream, _response) = connect_async(self.url.as_str())
                .await
                .map_err(|e| ClientError::ConnectionFailed(e.to_string()))?;
            let (mut ws_sink, ws_reader) = ws_stream.split();
            ws_sink
                .send(Message::Text(hello.into()))
                .await
                .map_err(|e| ClientError::ConnectionFailed(e.to_string()))?;
            Ok::<_, ClientError>((ws_sink, ws_reader))
        };
        let (mut ws_sink, mut ws_reader) =
            match tokio::time::timeout(self.request_timeout, handshake).await {
                Ok(result) => result?,
                Err(_) => {
                    warn!(url = %self.url, "bridge: handshake timed out");
                    return Err(ClientError::Timeout {
                        ms: self.request_timeout.as_millis() as u64,
                    });
                }
            };

        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let (write_tx, mut write_rx) = mpsc::unbounded_channel::<Outgoing>();
        let pending: Arc<DashMap<String, oneshot::Sender<Ack>>> = Arc::new(DashMap::new());

        // Writer: drains the outgoing queue into the socket.
        tokio::spawn(async move {
            while let Some(out) = write_rx.recv().await {
                match out {
                    Outgoing::Frame(text) => {
                        if let Err(e) = ws_sink.send(Message::Text(text.into())).await {
                            warn!(error = %e, "bridge: write failed");
                            break;
                        }
                    }
                    Outgoing::Close => {
                        let _ = ws_sink.close().await;
                        break;
                    }
                }
            }
            debug!("bridge: writer task ended");
        });

        // Reader: translates frames into client events and resolves acks.
        let pending_reader = Arc::clone(&pending);
        let close_tx = write_tx.clone();
        tokio::spawn(async move {
            let mut close_sent = false;
            while let Some(msg) = ws_reader.next().await {
                let text = match msg {
                    Ok(Message::Text(text)) => text,
                    Ok(Message::Close(_)) => break,
                    Ok(Message::Ping(_)) | Ok(Message::Pong(_)) | Ok(Message::Binary(_)) => continue,
                    Ok(Message::Frame(_)) => continue,
                    Err(e) => {
                        warn!(error = %e, "bridge: read failed");
                        break;
                    }
                };

                let event: BridgeEvent = match serde_json::from_str(text.as_str()) {
                    Ok(ev) => ev,
                    Err(e) => {
                        warn!(error = %e, "bridge: unparseable frame dropped");
                        continue;
                    }
                };

                let forwarded = match event {
                    BridgeEvent::Ack { id, error, result } => {
                        if let Some((_, tx)) = pending_reader.remove(&id) {
                            let _ = tx.send(Ack { error, result });
                        }
                        None
                    }
                    BridgeEvent::ConnectionUpdate {
                        connection,
                        status_code,
                    } => {
                        let update = BridgeEvent::connection_update(&connection, status_code);
                        if update.is_none() {
                            debug!(%connection, "bridge: ignoring connection state");
                        }
                        if matches!(update, Some(ConnectionUpdate::Closed(_))) {
                            close_sent = true;
                        }
                        update.map(ClientEvent::ConnectionUpdate)
                    }
                    BridgeEvent::CredsUpdate { creds } => match Credentials::from_value(creds, &[])
                    {
                        Ok(c) => Some(ClientEvent::CredentialsUpdate(c)),
                        Err(e) => {
                            warn!(error = %e, "bridge: creds.update rejected");
                            None
                        }
                    },
                    BridgeEvent::MessagesUpsert { messages } => {
                        Some(ClientEvent::MessagesUpsert(messages))
                    }
                };

                if let Some(ev) = forwarded {
                    if event_tx.send(ev).await.is_err() {
                        // Consumer dropped the connection.
                        let _ = close_tx.send(Outgoing::Close);
                        return;
                    }
                }
                if close_sent {
                    break;
                }
            }

            if !close_sent {
                let _ = event_tx
                    .send(ClientEvent::ConnectionUpdate(ConnectionUpdate::Closed(
                        CloseReason::NetworkLost,
                    )))
                    .await;
            }
            // Fail outstanding requests fast instead of letting them time out.
            pending_reader.clear();
            debug!("bridge: reader task ended");
        });

        let handle = BridgeHandle {
            write_tx,
            pending,
            request_timeout: self.request_timeout,
            closed: AtomicBool::new(false),
        };

        Ok(Connection {
            handle: Arc::new(handle),
            events: event_rx,
        })
    }
}

/// Outbound half of a bridge connection.
struct BridgeHandle {
    write_tx: mpsc::UnboundedSender<Outgoing>,
    pending: Arc<DashMap<String, oneshot::Sender<Ack>>>,
    request_timeout: Duration,
    closed: AtomicBool,
}

impl BridgeHandle {
    async fn request(&self, frame: BridgeRequest) -> Result<Option<Value>, ClientError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(ClientError::NotConnected);
        }
        let id = frame
            .id()
            .map(str::to_string)
            .ok_or_else(|| ClientError::Protocol("request without id".into()))?;
        let text = serde_json::to_string(&frame).map_err(|e| ClientError::Protocol(e.to_string()))?;

        let (tx, rx) = oneshot::channel();
        self.pending.insert(id.clone(), tx);
        if self.write_tx.send(Outgoing::Frame(text)).is_err() {
            self.pending.remove(&id);
            return Err(ClientError::NotConnected);
        }

        let ack = match tokio::time::timeout(self.request_timeout, rx).await {
            Ok(Ok(ack)) => ack,
            Ok(Err(_)) => return Err(ClientError::NotConnected),
            Err(_) => {
                self.pending.remove(&id);
                return Err(ClientError::Timeout {
                    ms: self.request_timeout.as_millis() as u64,
                });
            }
        };

        match ack.error {
            Some(err) => Err(ClientError::SendFailed(err)),
            None => Ok(ack.result),
        }
    }

    fn next_id() -> String {
        uuid::Uuid::new_v4().to_string()
    }
}

#[async_trait]
impl ClientHandle for BridgeHandle {
    async fn send_message(
        &self,
        chat_id: &str,
        payload: OutboundPayload,
    ) -> Result<(), ClientError> {
        self.request(BridgeRequest::Send {
            id: Self::next_id(),
            chat_id: chat_id.to_string(),
            payload,
        })
        .await
        .map(|_| ())
    }

    async fn read_messages(&self, keys: &[MessageKey]) -> Result<(), ClientError> {
        self.request(BridgeRequest::Read {
            id: Self::next_id(),
            keys: keys.to_vec(),
        })
        .await
        .map(|_| ())
    }

    async fn fetch_group_metadata(&self, chat_id: &str) -> Result<GroupMetadata, ClientError> {
        let result = self
            .request(BridgeRequest::GroupMetadata {
                id: Self::next_id(),
                chat_id: chat_id.to_string(),
            })
            .await?
            .ok_or_else(|| ClientError::Protocol("group_metadata ack without result".into()))?;
        serde_json::from_value(result).map_err(|e| ClientError::Protocol(e.to_string()))
    }

    async fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            let _ = self.write_tx.send(Outgoing::Close);
        }
    }
}
