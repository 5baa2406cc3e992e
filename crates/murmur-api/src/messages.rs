use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    response::IntoResponse,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use tracing::info;

use murmur_types::api::{ClearResponse, MessageResponse, MessagesResponse};

use crate::auth::AppState;
use crate::error::ApiError;
use crate::middleware::AuthUser;

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    /// Only messages created strictly after this instant.
    pub since: Option<DateTime<Utc>>,
}

/// Conversation history between the caller and `contact_id`, oldest first.
///
/// Reads go through the same ledger the relay writes to, so the pair is
/// derived identically on both paths.
pub async fn get_messages(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(contact_id): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let ledger = state.relay.ledger().clone();
    let messages = tokio::task::spawn_blocking(move || {
        ledger.find_conversation(&user_id, &contact_id, query.since)
    })
    .await??;

    Ok(Json(MessagesResponse {
        messages: messages.into_iter().map(MessageResponse::from).collect(),
    }))
}

pub async fn clear_messages(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(contact_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = delete_conversation(&state, user_id, contact_id).await?;
    Ok(Json(ClearResponse {
        message: "Chat cleared successfully".into(),
        deleted,
    }))
}

/// Irreversible. Shared by the chat-clear and DM-delete endpoints.
pub(crate) async fn delete_conversation(
    state: &AppState,
    user_id: String,
    contact_id: String,
) -> Result<usize, ApiError> {
    if contact_id.trim().is_empty() {
        return Err(ApiError::bad_request("Missing contact id"));
    }

    let ledger = state.relay.ledger().clone();
    let (uid, cid) = (user_id.clone(), contact_id.clone());
    let deleted = tokio::task::spawn_blocking(move || ledger.delete_conversation(&uid, &cid)).await??;

    info!("{} cleared conversation with {} ({} messages)", user_id, contact_id, deleted);
    Ok(deleted)
}
