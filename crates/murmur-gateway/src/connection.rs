use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use axum::extract::ws::{Message, WebSocket};
use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use murmur_types::events::{GatewayCommand, GatewayEvent};

use crate::error::RelayError;
use crate::presence::ConnectionHandle;
use crate::relay::Relay;

/// Heartbeat interval: server sends a Ping every 15 seconds.
/// If 2 consecutive Pongs are missed (~30s), the connection is dropped.
const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(15);

/// Lifecycle of one gateway connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConnectionState {
    /// Open but not a delivery target yet. Sends are already allowed.
    Connected,
    /// Registered as the live connection for this user.
    Registered(String),
    /// Terminal.
    Closed,
}

/// Per-connection state machine, driven by the connection worker.
pub struct Session {
    conn_id: Uuid,
    identity: String,
    handle: ConnectionHandle,
    state: ConnectionState,
}

impl Session {
    /// `identity` is the user id verified at the HTTP upgrade; the session will
    /// not act as anyone else.
    pub fn new(identity: String, tx: &mpsc::UnboundedSender<GatewayEvent>) -> Self {
        let conn_id = Uuid::new_v4();
        Self {
            conn_id,
            identity,
            handle: ConnectionHandle::new(conn_id, tx),
            state: ConnectionState::Connected,
        }
    }

    pub fn conn_id(&self) -> Uuid {
        self.conn_id
    }

    pub fn state(&self) -> &ConnectionState {
        &self.state
    }

    pub async fn handle_command(&mut self, relay: &Relay, cmd: GatewayCommand) {
        if self.state == ConnectionState::Closed {
            debug!("connection {} closed, ignoring {:?}", self.conn_id, cmd);
            return;
        }

        match cmd {
            GatewayCommand::UserConnected(user_id) => {
                if user_id != self.identity {
                    warn!(
                        "connection {} ({}) tried to register as {}, ignoring",
                        self.conn_id, self.identity, user_id
                    );
                    return;
                }
                relay.register(&user_id, self.handle.clone());
                self.state = ConnectionState::Registered(user_id);
            }

            GatewayCommand::SendMessage(msg) => {
                if msg.sender != self.identity {
                    warn!(
                        "connection {} ({}) tried to send as {}, dropping",
                        self.conn_id, self.identity, msg.sender
                    );
                    return;
                }
                match relay.send(msg).await {
                    Ok(_) => {}
                    Err(e @ RelayError::InvalidMessage(_)) => {
                        warn!("{} ({}) send rejected: {}", self.identity, self.conn_id, e);
                    }
                    Err(e) => {
                        error!("{} ({}) send aborted: {}", self.identity, self.conn_id, e);
                    }
                }
            }
        }
    }

    /// Transport is gone: drop presence and stop accepting commands.
    pub fn close(&mut self, relay: &Relay) {
        relay.disconnect(self.conn_id);
        self.state = ConnectionState::Closed;
    }
}

/// Run queued commands in order until every sender is gone, then close the session.
async fn run_worker(mut session: Session, relay: Relay, mut cmd_rx: mpsc::UnboundedReceiver<GatewayCommand>) {
    while let Some(cmd) = cmd_rx.recv().await {
        session.handle_command(&relay, cmd).await;
    }
    session.close(&relay);
}

/// Handle a WebSocket whose user id was already verified at the upgrade.
pub async fn handle_connection(socket: WebSocket, relay: Relay, user_id: String) {
    let (sender, receiver) = socket.split();
    run_connection_loop(sender, receiver, relay, user_id).await;
}

async fn run_connection_loop(
    mut sender: SplitSink<WebSocket, Message>,
    mut receiver: SplitStream<WebSocket>,
    relay: Relay,
    user_id: String,
) {
    // The only strong sender lives here; presence holds weak handles.
    let (tx, mut outbound_rx) = mpsc::unbounded_channel::<GatewayEvent>();
    let session = Session::new(user_id.clone(), &tx);
    let conn_id = session.conn_id();
    info!("{} connected to gateway (connection {})", user_id, conn_id);

    // Commands run one at a time in arrival order. The worker is never aborted:
    // on disconnect it finishes what was already received, then cleans up presence.
    let (cmd_tx, cmd_rx) = mpsc::unbounded_channel::<GatewayCommand>();
    let worker = tokio::spawn(run_worker(session, relay, cmd_rx));

    let pong_received = Arc::new(AtomicBool::new(true));
    let pong_flag_send = pong_received.clone();
    let pong_flag_recv = pong_received.clone();

    // Forward relayed events -> client, with heartbeat
    let mut send_task = tokio::spawn(async move {
        let mut heartbeat = tokio::time::interval(HEARTBEAT_INTERVAL);
        heartbeat.tick().await;
        let mut missed_heartbeats: u8 = 0;

        loop {
            tokio::select! {
                event = outbound_rx.recv() => {
                    let Some(event) = event else { break };
                    let text = match serde_json::to_string(&event) {
                        Ok(text) => text,
                        Err(e) => {
                            warn!("failed to encode gateway event: {}", e);
                            continue;
                        }
                    };
                    if sender.send(Message::Text(text.into())).await.is_err() {
                        break;
                    }
                }
                _ = heartbeat.tick() => {
                    if pong_flag_send.swap(false, Ordering::Acquire) {
                        missed_heartbeats = 0;
                    } else {
                        missed_heartbeats += 1;
                        if missed_heartbeats >= 2 {
                            warn!("Heartbeat timeout (missed {} pongs), dropping connection", missed_heartbeats);
                            break;
                        }
                    }
                    if sender.send(Message::Ping(Vec::new().into())).await.is_err() {
                        break;
                    }
                }
            }
        }
    });

    // Read commands from client
    let user_id_recv = user_id.clone();
    let mut recv_task = tokio::spawn(async move {
        while let Some(Ok(msg)) = receiver.next().await {
            match msg {
                Message::Text(text) => {
                    match serde_json::from_str::<GatewayCommand>(text.as_str()) {
                        Ok(cmd) => {
                            if cmd_tx.send(cmd).is_err() {
                                break;
                            }
                        }
                        Err(e) => {
                            let raw = text.as_str();
                            warn!(
                                "{} ({}) malformed event, closing: {} -- raw: {}",
                                user_id_recv,
                                conn_id,
                                e,
                                &raw[..floor_char_boundary(raw, 200)]
                            );
                            break;
                        }
                    }
                }
                Message::Binary(_) => {
                    warn!("{} ({}) sent a binary frame, closing", user_id_recv, conn_id);
                    break;
                }
                Message::Pong(_) => {
                    pong_flag_recv.store(true, Ordering::Release);
                }
                Message::Close(_) => break,
                _ => {}
            }
        }
    });

    // Wait for either task to finish
    tokio::select! {
        _ = &mut send_task => recv_task.abort(),
        _ = &mut recv_task => send_task.abort(),
    }

    drop(tx);
    if let Err(e) = worker.await {
        error!("connection worker for {} ({}) failed: {}", user_id, conn_id, e);
    }
    info!("{} disconnected from gateway (connection {})", user_id, conn_id);
}

/// Largest index <= `max` that falls on a char boundary of `s`.
fn floor_char_boundary(s: &str, max: usize) -> usize {
    if max >= s.len() {
        return s.len();
    }
    (0..=max).rev().find(|&i| s.is_char_boundary(i)).unwrap_or(0)
}
