//! Message contracts between the core and its collaborators, and the
//! websocket bridge that carries them.
//!
//! The page-side collaborators (panel, cursor guide, voice output, the
//! in-page dispatcher) connect as websocket clients. Outbound messages are
//! fire-and-forget except the DOM-snapshot handshake, which correlates a
//! request id with a response through a pending map and gives up after
//! [`SNAPSHOT_TIMEOUT`] with a single best-effort fallback.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{info, warn};
use uuid::Uuid;

use crate::errors::NavError;
use crate::intent::NavAction;
use crate::orchestrator::TabSink;

/// How long to wait for the page to answer a snapshot request.
pub const SNAPSHOT_TIMEOUT: Duration = Duration::from_secs(5);

/// Fallback notice when the snapshot handshake expires.
pub const SNAPSHOT_FALLBACK: &str = "Could not read the page structure in time.";

/// Display-only reasoning surfaced to the panel UI.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningFeedback {
    pub reasoning: String,
    pub action: String,
    pub selector: String,
}

/// Listening state and last transcript, for the popup.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub listening: bool,
    pub last_transcript: String,
}

/// The page's answer to a snapshot request: a line-per-element summary
/// (sensitive fields redacted) and the page URL.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SnapshotPayload {
    pub elements: String,
    pub url: String,
}

/// Messages from the core to the page and UI collaborators.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum OutboundMessage {
    #[serde(rename = "NAV_ACTION")]
    NavAction { payload: NavAction },
    #[serde(rename = "REASONING_FEEDBACK")]
    Feedback(ReasoningFeedback),
    #[serde(rename = "SPEAK_ERROR")]
    SpeakError { message: String },
    #[serde(rename = "SNAPSHOT_REQUEST")]
    SnapshotRequest { id: String },
    #[serde(rename = "RELOAD_CONFIG")]
    ReloadConfig,
    #[serde(rename = "STATUS_UPDATE")]
    StatusUpdate(Status),
    #[serde(rename = "FIND_AND_GUIDE")]
    FindAndGuide { keyword: String },
}

/// Messages from the UI and page collaborators to the core.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum InboundMessage {
    #[serde(rename = "VOICE_COMMAND")]
    VoiceCommand { text: String },
    #[serde(rename = "REPEAT_LAST")]
    RepeatLast,
    #[serde(rename = "UPDATE_LISTENING")]
    UpdateListening { listening: bool },
    #[serde(rename = "GET_STATUS")]
    GetStatus,
    #[serde(rename = "FIND_AND_GUIDE")]
    FindAndGuide { keyword: String },
    #[serde(rename = "RELOAD_CONFIG")]
    ReloadConfig,
    #[serde(rename = "SNAPSHOT_RESPONSE")]
    SnapshotResponse {
        id: String,
        elements: String,
        url: String,
    },
}

struct Client {
    sender: mpsc::UnboundedSender<Message>,
}

type PendingMap = HashMap<String, oneshot::Sender<SnapshotPayload>>;

/// Websocket endpoint the page-side collaborators connect to.
pub struct PageBridge {
    _server_task: JoinHandle<()>,
    local_addr: SocketAddr,
    clients: Arc<Mutex<Vec<Client>>>,
    pending: Arc<Mutex<PendingMap>>,
}

impl PageBridge {
    /// Bind the listener and start accepting page clients. Returns the
    /// bridge and the stream of inbound messages for the host to route.
    pub async fn start(
        addr: &str,
    ) -> Result<(Arc<PageBridge>, mpsc::UnboundedReceiver<InboundMessage>), NavError> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| NavError::Internal(format!("failed to bind bridge on {addr}: {e}")))?;
        let local_addr = listener
            .local_addr()
            .map_err(|e| NavError::Internal(format!("bridge local addr: {e}")))?;
        info!(%local_addr, "page bridge listening");

        let clients: Arc<Mutex<Vec<Client>>> = Arc::new(Mutex::new(Vec::new()));
        let pending: Arc<Mutex<PendingMap>> = Arc::new(Mutex::new(HashMap::new()));
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();

        let accept_clients = clients.clone();
        let accept_pending = pending.clone();
        let server_task = tokio::spawn(async move {
            loop {
                let (stream, _peer) = match listener.accept().await {
                    Ok(v) => v,
                    Err(e) => {
                        warn!("bridge accept error: {e}");
                        continue;
                    }
                };
                let conn_clients = accept_clients.clone();
                let conn_pending = accept_pending.clone();
                let conn_inbound = inbound_tx.clone();
                tokio::spawn(async move {
                    let ws_stream = match accept_async(stream).await {
                        Ok(s) => s,
                        Err(e) => {
                            warn!("bridge handshake error: {e}");
                            return;
                        }
                    };
                    let (mut sink, mut stream) = ws_stream.split();
                    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();

                    let writer = tokio::spawn(async move {
                        while let Some(msg) = rx.recv().await {
                            if let Err(e) = sink.send(msg).await {
                                warn!("bridge send error: {e}");
                                break;
                            }
                        }
                    });

                    conn_clients
                        .lock()
                        .expect("clients lock")
                        .push(Client { sender: tx });
                    info!("page client connected");

                    while let Some(Ok(msg)) = stream.next().await {
                        if !msg.is_text() {
                            continue;
                        }
                        let text = msg.into_text().unwrap_or_default();
                        match serde_json::from_str::<InboundMessage>(&text) {
                            Ok(InboundMessage::SnapshotResponse { id, elements, url }) => {
                                let entry =
                                    conn_pending.lock().expect("pending lock").remove(&id);
                                if let Some(reply) = entry {
                                    let _ = reply.send(SnapshotPayload { elements, url });
                                } else {
                                    warn!(%id, "snapshot response with no pending request");
                                }
                            }
                            Ok(other) => {
                                let _ = conn_inbound.send(other);
                            }
                            Err(e) => warn!("invalid inbound bridge JSON: {e}"),
                        }
                    }

                    writer.abort();
                });
            }
        });

        let bridge = Arc::new(PageBridge {
            _server_task: server_task,
            local_addr,
            clients,
            pending,
        });
        Ok((bridge, inbound_rx))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn is_client_connected(&self) -> bool {
        !self.clients.lock().expect("clients lock").is_empty()
    }

    /// Send a message to the active page client, pruning clients whose
    /// connection has gone away.
    pub fn send_message(&self, message: &OutboundMessage) {
        let payload = match serde_json::to_string(message) {
            Ok(p) => p,
            Err(e) => {
                warn!("bridge serialize error: {e}");
                return;
            }
        };
        let mut clients = self.clients.lock().expect("clients lock");
        clients.retain(|c| !c.sender.is_closed());
        match clients.first() {
            Some(client) => {
                let _ = client.sender.send(Message::Text(payload));
            }
            None => warn!("no page client connected; dropping message"),
        }
    }

    /// Broadcast to every connected client (config reloads go to all
    /// tabs, not just the active one).
    pub fn broadcast(&self, message: &OutboundMessage) {
        let payload = match serde_json::to_string(message) {
            Ok(p) => p,
            Err(e) => {
                warn!("bridge serialize error: {e}");
                return;
            }
        };
        let mut clients = self.clients.lock().expect("clients lock");
        clients.retain(|c| !c.sender.is_closed());
        for client in clients.iter() {
            let _ = client.sender.send(Message::Text(payload.clone()));
        }
    }

    /// Ask the page for its element summary. Expires after
    /// [`SNAPSHOT_TIMEOUT`] with [`SNAPSHOT_FALLBACK`]; no retry.
    pub async fn request_snapshot(&self) -> Result<SnapshotPayload, NavError> {
        if !self.is_client_connected() {
            return Err(NavError::Precondition(
                "no page client connected".to_string(),
            ));
        }
        let id = Uuid::new_v4().to_string();
        let (tx, rx) = oneshot::channel();
        self.pending
            .lock()
            .expect("pending lock")
            .insert(id.clone(), tx);
        self.send_message(&OutboundMessage::SnapshotRequest { id: id.clone() });

        match tokio::time::timeout(SNAPSHOT_TIMEOUT, rx).await {
            Ok(Ok(payload)) => Ok(payload),
            Ok(Err(_closed)) => {
                self.pending.lock().expect("pending lock").remove(&id);
                Err(NavError::Internal(
                    "snapshot channel closed before a response arrived".to_string(),
                ))
            }
            Err(_elapsed) => {
                self.pending.lock().expect("pending lock").remove(&id);
                warn!(%id, "snapshot request timed out");
                Err(NavError::Timeout(SNAPSHOT_FALLBACK.to_string()))
            }
        }
    }
}

impl TabSink for PageBridge {
    fn send(&self, message: OutboundMessage) {
        match message {
            OutboundMessage::ReloadConfig => self.broadcast(&message),
            _ => self.send_message(&message),
        }
    }
}
