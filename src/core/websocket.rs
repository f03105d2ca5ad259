/// WebSocket transport for the host.
///
/// Each socket gets a connection id and an outgoing channel; the engine's
/// deliveries are fanned out to one or all of them. Sends are fire-and-forget:
/// a slow or dead socket never holds up the engine.
use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use futures_util::{SinkExt, StreamExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{mpsc, RwLock};
use tokio_tungstenite::{accept_async, tungstenite::protocol::Message};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::core::game::ConnectionId;
use crate::core::protocol::{ClientMessage, ServerMessage, SessionEndReason};
use crate::engine::{Delivery, EngineEvent, Recipient};
use crate::error::ErrorKind;

type Connections = Arc<RwLock<HashMap<ConnectionId, mpsc::UnboundedSender<Message>>>>;

pub struct WebSocketServer {
    listener: TcpListener,
    connections: Connections,
}

impl WebSocketServer {
    pub async fn bind(addr: &str) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .with_context(|| format!("failed to bind {addr}"))?;
        Ok(Self {
            listener,
            connections: Arc::new(RwLock::new(HashMap::new())),
        })
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.listener.local_addr()?)
    }

    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle { connections: Arc::clone(&self.connections) }
    }

    /// Starts routing `deliveries` and accepts connections until the listener fails.
    pub async fn serve(
        self,
        events: mpsc::Sender<EngineEvent>,
        deliveries: mpsc::UnboundedReceiver<Delivery>,
    ) -> Result<()> {
        info!(addr = %self.listener.local_addr()?, "websocket server listening");
        tokio::spawn(fan_out(deliveries, Arc::clone(&self.connections)));

        loop {
            let (stream, addr) = self.listener.accept().await.context("accept failed")?;
            debug!(%addr, "new tcp connection");
            tokio::spawn(handle_connection(
                stream,
                addr,
                Arc::clone(&self.connections),
                events.clone(),
            ));
        }
    }
}

/// Lets the host say goodbye to every open socket when it stops.
#[derive(Clone)]
pub struct ShutdownHandle {
    connections: Connections,
}

impl ShutdownHandle {
    pub async fn close_all(&self, reason: SessionEndReason) {
        let Ok(json) = serde_json::to_string(&ServerMessage::SessionEnded { reason }) else {
            return;
        };
        let sessions = self.connections.read().await;
        for tx in sessions.values() {
            let _ = tx.send(Message::Text(json.clone()));
            let _ = tx.send(Message::Close(None));
        }
        debug!(count = sessions.len(), "closing all connections");
    }
}

/// Routes engine output to sockets. A `session_ended` also closes whoever it
/// was addressed to.
async fn fan_out(mut deliveries: mpsc::UnboundedReceiver<Delivery>, connections: Connections) {
    while let Some(Delivery { to, message }) = deliveries.recv().await {
        let closing = matches!(message, ServerMessage::SessionEnded { .. });
        let json = match serde_json::to_string(&message) {
            Ok(json) => json,
            Err(e) => {
                warn!(error = %e, "failed to encode server message");
                continue;
            }
        };

        let sessions = connections.read().await;
        let targets: Vec<&mpsc::UnboundedSender<Message>> = match to {
            Recipient::All => sessions.values().collect(),
            Recipient::Connection(id) => sessions.get(&id).into_iter().collect(),
        };
        for tx in targets {
            let _ = tx.send(Message::Text(json.clone()));
            if closing {
                let _ = tx.send(Message::Close(None));
            }
        }
    }
    debug!("delivery channel closed");
}

async fn handle_connection(
    stream: TcpStream,
    addr: SocketAddr,
    connections: Connections,
    events: mpsc::Sender<EngineEvent>,
) {
    let ws_stream = match accept_async(stream).await {
        Ok(ws) => ws,
        Err(e) => {
            warn!(%addr, error = %e, "websocket handshake failed");
            return;
        }
    };

    let (mut ws_sender, mut ws_receiver) = ws_stream.split();
    let connection: ConnectionId = Uuid::new_v4();
    let (tx, mut rx) = mpsc::unbounded_channel::<Message>();
    connections.write().await.insert(connection, tx.clone());
    info!(%addr, %connection, "viewer connected");

    let sender_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let is_close = matches!(msg, Message::Close(_));
            if ws_sender.send(msg).await.is_err() || is_close {
                break;
            }
        }
    });

    while let Some(frame) = ws_receiver.next().await {
        match frame {
            Ok(Message::Text(text)) => match serde_json::from_str::<ClientMessage>(&text) {
                Ok(message) => {
                    if events.send(EngineEvent::Intent { connection, message }).await.is_err() {
                        warn!(%connection, "engine stopped, dropping connection");
                        break;
                    }
                }
                Err(e) => {
                    debug!(%connection, error = %e, "malformed frame");
                    let reply = ServerMessage::ActionRejected {
                        kind: ErrorKind::Validation,
                        context: format!("malformed message: {e}"),
                    };
                    if let Ok(json) = serde_json::to_string(&reply) {
                        let _ = tx.send(Message::Text(json));
                    }
                }
            },
            Ok(Message::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                debug!(%connection, error = %e, "websocket error");
                break;
            }
        }
    }

    connections.write().await.remove(&connection);
    let _ = events.send(EngineEvent::Disconnected { connection }).await;
    info!(%connection, "viewer disconnected");
    sender_task.abort();
}
