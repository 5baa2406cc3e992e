use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use murmur_types::events::GatewayEvent;

/// Outcome of pushing one event at one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryStatus {
    /// Queued on the live connection.
    Delivered,
    /// No presence entry for the user.
    Offline,
    /// An entry existed but its connection is already gone.
    Closed,
}

/// Non-owning reference to one live gateway connection.
///
/// Holds only a weak sender: the connection task owns the strong end and the
/// socket, so dropping or displacing a handle never closes anything.
#[derive(Clone)]
pub struct ConnectionHandle {
    conn_id: Uuid,
    tx: mpsc::WeakUnboundedSender<GatewayEvent>,
}

impl ConnectionHandle {
    pub fn new(conn_id: Uuid, tx: &mpsc::UnboundedSender<GatewayEvent>) -> Self {
        Self {
            conn_id,
            tx: tx.downgrade(),
        }
    }

    pub fn conn_id(&self) -> Uuid {
        self.conn_id
    }

    pub fn deliver(&self, event: GatewayEvent) -> DeliveryStatus {
        match self.tx.upgrade() {
            Some(tx) if tx.send(event).is_ok() => DeliveryStatus::Delivered,
            _ => DeliveryStatus::Closed,
        }
    }
}

impl fmt::Debug for ConnectionHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionHandle")
            .field("conn_id", &self.conn_id)
            .finish()
    }
}

/// Process-local map from user id to that user's live connection.
///
/// At most one handle per user: the newest registration wins and the older
/// connection silently stops receiving deliveries. Every operation takes the
/// lock for a single step and never awaits while holding it.
#[derive(Clone, Default)]
pub struct PresenceTable {
    inner: Arc<RwLock<HashMap<String, ConnectionHandle>>>,
}

impl PresenceTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Associate `user_id` with `handle`, returning the displaced handle if any.
    /// The displaced connection is not closed.
    pub fn register(&self, user_id: &str, handle: ConnectionHandle) -> Option<ConnectionHandle> {
        let displaced = self.write().insert(user_id.to_string(), handle);
        if let Some(old) = &displaced {
            debug!("{} re-registered, displacing connection {}", user_id, old.conn_id);
        }
        displaced
    }

    pub fn lookup(&self, user_id: &str) -> Option<ConnectionHandle> {
        self.read().get(user_id).cloned()
    }

    /// Drop every entry pointing at `conn_id` and return the affected user ids.
    /// A connection that was never registered, or was already displaced, is a no-op.
    pub fn remove(&self, conn_id: Uuid) -> Vec<String> {
        let mut removed = Vec::new();
        self.write().retain(|user_id, handle| {
            if handle.conn_id == conn_id {
                removed.push(user_id.clone());
                false
            } else {
                true
            }
        });
        removed
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.read().contains_key(user_id)
    }

    pub fn len(&self) -> usize {
        self.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    // Each operation is a single map call, so a poisoned lock still guards a consistent map.
    fn read(&self) -> RwLockReadGuard<'_, HashMap<String, ConnectionHandle>> {
        self.inner.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, HashMap<String, ConnectionHandle>> {
        self.inner.write().unwrap_or_else(PoisonError::into_inner)
    }
}
