//! WebSocket sessions for collaborative editing.
//!
//! Each connection is attached to one document. A session forwards client
//! edits to the document, acknowledges what took effect, and relays the
//! operations published by every other session on the same document.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::SplitSink;
use futures_util::{SinkExt, StreamExt};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::crdt::{Operation, Snapshot};
use crate::error::{CodecError, SessionError};
use crate::server::document::Document;
use crate::server::registry::{DocumentRegistry, SharedDocument};

/// Messages accepted from clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMessage {
    /// A remote operation produced by the client's own replica.
    Operation { operation: Operation<char> },
    Batch { operations: Vec<Operation<char>> },
    /// A positional edit performed by the server on the client's behalf.
    InsertAt { position: usize, value: char },
    DeleteAt { position: usize },
    /// Requests a fresh `init`.
    Sync,
    GetContent,
}

/// Messages sent to clients.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    Init {
        document_id: Uuid,
        content: String,
        snapshot: Snapshot<char>,
    },
    /// Operations that took effect because of the client's last message.
    Ack { operations: Vec<Operation<char>> },
    /// Operations published by another session.
    Operations { operations: Vec<Operation<char>> },
    Content { content: String },
    Error { message: String },
}

impl ServerMessage {
    pub fn init(document: &Document) -> Self {
        ServerMessage::Init {
            document_id: document.id(),
            content: document.text(),
            snapshot: document.snapshot(),
        }
    }
}

struct WebSocketSession {
    id: Uuid,
    document: SharedDocument,
    registry: Arc<DocumentRegistry>,
    sink: SplitSink<WebSocket, Message>,
}

/// Runs a session until the client disconnects.
pub async fn handle_websocket_connection(
    socket: WebSocket,
    registry: Arc<DocumentRegistry>,
    document: SharedDocument,
) {
    let (sink, mut stream) = socket.split();

    // Subscribing under the same lock as the snapshot guarantees that no
    // operation falls between the two.
    let (mut updates, init, document_id) = {
        let doc = document.lock();
        (doc.subscribe(), ServerMessage::init(&doc), doc.id())
    };

    let mut session = WebSocketSession {
        id: Uuid::new_v4(),
        document,
        registry,
        sink,
    };
    info!(session = %session.id, document = %document_id, "websocket session established");

    if let Err(err) = session.send(&init).await {
        error!(session = %session.id, "failed to send initial state: {err}");
        return;
    }

    loop {
        tokio::select! {
            incoming = stream.next() => match incoming {
                Some(Ok(Message::Text(text))) => {
                    if let Err(err) = session.handle_text_message(&text).await {
                        error!(session = %session.id, "error handling message: {err}");
                        break;
                    }
                }
                Some(Ok(Message::Ping(data))) => {
                    if let Err(err) = session.sink.send(Message::Pong(data)).await {
                        error!(session = %session.id, "failed to send pong: {err}");
                        break;
                    }
                }
                Some(Ok(Message::Close(_))) | None => {
                    info!(session = %session.id, "websocket session closed by client");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(err)) => {
                    warn!(session = %session.id, "websocket error: {err}");
                    break;
                }
            },
            update = updates.recv() => {
                let result = match update {
                    Ok(envelope) if envelope.sender == session.id => Ok(()),
                    Ok(envelope) => {
                        session
                            .send(&ServerMessage::Operations { operations: envelope.operations })
                            .await
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        warn!(session = %session.id, skipped, "subscriber lagged, resynchronising");
                        session.resync().await
                    }
                    Err(RecvError::Closed) => break,
                };
                if let Err(err) = result {
                    error!(session = %session.id, "failed to forward operations: {err}");
                    break;
                }
            }
        }
    }

    info!(session = %session.id, "websocket session ended");
}

impl WebSocketSession {
    async fn handle_text_message(&mut self, text: &str) -> Result<(), SessionError> {
        debug!(session = %self.id, "received: {text}");

        match serde_json::from_str::<ClientMessage>(text) {
            Ok(message) => self.process(message).await,
            Err(err) => {
                warn!(session = %self.id, "failed to parse message: {err}");
                // Parse errors are reported but do not end the session.
                self.send(&ServerMessage::Error {
                    message: format!("invalid message: {err}"),
                })
                .await
            }
        }
    }

    async fn process(&mut self, message: ClientMessage) -> Result<(), SessionError> {
        let reply = match message {
            ClientMessage::Sync => ServerMessage::init(&self.document.lock()),
            ClientMessage::GetContent => ServerMessage::Content {
                content: self.document.lock().text(),
            },
            edit => ServerMessage::Ack {
                operations: self.apply_edit(edit),
            },
        };
        self.send(&reply).await
    }

    /// Applies an edit and persists the document when anything changed.
    fn apply_edit(&self, edit: ClientMessage) -> Vec<Operation<char>> {
        let mut doc = self.document.lock();
        let applied = match edit {
            ClientMessage::Operation { operation } => doc.apply_operations(self.id, vec![operation]),
            ClientMessage::Batch { operations } => doc.apply_operations(self.id, operations),
            ClientMessage::InsertAt { position, value } => doc.insert_at(self.id, position, value),
            ClientMessage::DeleteAt { position } => doc.delete_at(self.id, position),
            ClientMessage::Sync | ClientMessage::GetContent => Vec::new(),
        };

        if !applied.is_empty() {
            if let Err(err) = self.registry.save(&doc) {
                warn!(session = %self.id, document = %doc.id(), "failed to persist document: {err}");
            }
        }
        applied
    }

    async fn resync(&mut self) -> Result<(), SessionError> {
        let init = ServerMessage::init(&self.document.lock());
        self.send(&init).await
    }

    async fn send(&mut self, message: &ServerMessage) -> Result<(), SessionError> {
        let json = serde_json::to_string(message).map_err(CodecError::from)?;
        self.sink.send(Message::Text(json)).await?;
        Ok(())
    }
}
