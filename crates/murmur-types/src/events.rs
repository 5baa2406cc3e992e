use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{Message, UserRef};

/// Commands sent FROM client TO server over the gateway WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum GatewayCommand {
    /// Mark this connection as the live delivery target for a user.
    /// No acknowledgement is sent back.
    UserConnected(String),

    /// Persist a direct message and relay it to whoever is online.
    SendMessage(SendMessage),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SendMessage {
    pub sender: String,
    pub receiver: String,
    pub content: String,
}

/// Events sent FROM server TO client over the gateway WebSocket.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "camelCase")]
pub enum GatewayEvent {
    /// A message was persisted; pushed to the receiver and echoed to the sender.
    ReceiveMessage(DeliveryPayload),
}

/// Canonical delivery payload, identical for receiver and sender echo.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeliveryPayload {
    pub id: Uuid,
    pub sender: UserRef,
    pub receiver: UserRef,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sender_name: Option<String>,
    pub timestamp: chrono::DateTime<chrono::Utc>,
}

impl From<&Message> for DeliveryPayload {
    fn from(msg: &Message) -> Self {
        Self {
            id: msg.id,
            sender: UserRef::new(msg.sender.clone()),
            receiver: UserRef::new(msg.receiver.clone()),
            content: msg.content.clone(),
            sender_name: msg.sender_name.clone(),
            timestamp: msg.created_at,
        }
    }
}
