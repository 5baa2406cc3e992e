use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use murmur_db::Database;
use murmur_types::events::{DeliveryPayload, GatewayEvent, SendMessage};
use murmur_types::models::Message;

use crate::error::RelayError;
use crate::ledger::{Ledger, ProfileDirectory};
use crate::presence::{ConnectionHandle, DeliveryStatus, PresenceTable};

/// What happened to one successfully persisted message.
#[derive(Debug, Clone)]
pub struct SendReport {
    pub message: Message,
    pub receiver: DeliveryStatus,
    pub sender_echo: DeliveryStatus,
}

/// Presence-aware message relay: persists each message, then pushes it to the
/// receiver's and the sender's live connections.
#[derive(Clone)]
pub struct Relay {
    inner: Arc<RelayInner>,
}

struct RelayInner {
    presence: PresenceTable,
    ledger: Arc<dyn Ledger>,
    profiles: Arc<dyn ProfileDirectory>,
}

impl Relay {
    pub fn new(ledger: Arc<dyn Ledger>, profiles: Arc<dyn ProfileDirectory>) -> Self {
        Self {
            inner: Arc::new(RelayInner {
                presence: PresenceTable::new(),
                ledger,
                profiles,
            }),
        }
    }

    /// Relay backed by one database for both messages and sender profiles.
    pub fn with_database(db: Arc<Database>) -> Self {
        Self::new(db.clone(), db)
    }

    pub fn presence(&self) -> &PresenceTable {
        &self.inner.presence
    }

    pub fn ledger(&self) -> &Arc<dyn Ledger> {
        &self.inner.ledger
    }

    /// Make `handle` the delivery target for `user_id`. Any previous handle is
    /// forgotten but left open.
    pub fn register(&self, user_id: &str, handle: ConnectionHandle) {
        let conn_id = handle.conn_id();
        if self.inner.presence.register(user_id, handle).is_some() {
            info!("{} online on connection {} (previous connection displaced)", user_id, conn_id);
        } else {
            info!("{} online on connection {}", user_id, conn_id);
        }
    }

    /// Transport-level disconnect: forget whatever users this connection served.
    pub fn disconnect(&self, conn_id: Uuid) {
        for user_id in self.inner.presence.remove(conn_id) {
            info!("{} offline (connection {} closed)", user_id, conn_id);
        }
    }

    /// Persist then deliver.
    ///
    /// Persistence failure aborts before any delivery. Delivery to the receiver
    /// and the echo to the sender are independent and best-effort; neither can
    /// fail the send once the record is stored.
    pub async fn send(&self, req: SendMessage) -> Result<SendReport, RelayError> {
        if req.sender.trim().is_empty() {
            return Err(RelayError::InvalidMessage("sender is empty"));
        }
        if req.receiver.trim().is_empty() {
            return Err(RelayError::InvalidMessage("receiver is empty"));
        }
        if req.content.is_empty() {
            return Err(RelayError::InvalidMessage("content is empty"));
        }

        let sender_name = self.sender_label(&req.sender).await;

        // Timestamp is taken here, at persistence time, never from the client.
        let message = Message {
            id: Uuid::new_v4(),
            sender: req.sender,
            receiver: req.receiver,
            content: req.content,
            sender_name: Some(sender_name),
            created_at: Utc::now(),
        };

        let ledger = self.inner.ledger.clone();
        let record = message.clone();
        tokio::task::spawn_blocking(move || ledger.append(&record))
            .await?
            .map_err(RelayError::Persist)?;

        let event = GatewayEvent::ReceiveMessage(DeliveryPayload::from(&message));
        let receiver_handle = self.inner.presence.lookup(&message.receiver);
        let sender_handle = self.inner.presence.lookup(&message.sender);

        let receiver = deliver(receiver_handle.as_ref(), &event);
        let sender_echo = match (&sender_handle, &receiver_handle) {
            // Messaging yourself: one connection, one copy.
            (Some(s), Some(r)) if s.conn_id() == r.conn_id() => receiver,
            _ => deliver(sender_handle.as_ref(), &event),
        };

        debug!(
            "message {} {} -> {}: receiver {:?}, sender echo {:?}",
            message.id, message.sender, message.receiver, receiver, sender_echo
        );

        Ok(SendReport {
            message,
            receiver,
            sender_echo,
        })
    }

    /// Profile display name, or the raw id when there is none. Never fails.
    async fn sender_label(&self, sender: &str) -> String {
        let profiles = self.inner.profiles.clone();
        let id = sender.to_string();

        match tokio::task::spawn_blocking(move || profiles.display_name(&id)).await {
            Ok(Ok(Some(name))) => name,
            Ok(Ok(None)) => sender.to_string(),
            Ok(Err(e)) => {
                warn!("profile lookup for {} failed, using raw id: {:#}", sender, e);
                sender.to_string()
            }
            Err(e) => {
                warn!("profile lookup task for {} failed, using raw id: {}", sender, e);
                sender.to_string()
            }
        }
    }
}

fn deliver(handle: Option<&ConnectionHandle>, event: &GatewayEvent) -> DeliveryStatus {
    match handle {
        Some(handle) => handle.deliver(event.clone()),
        None => DeliveryStatus::Offline,
    }
}
