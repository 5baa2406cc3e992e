use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use murmur_db::models::UserRow;
use murmur_gateway::PresenceTable;
use murmur_types::api::{
    AddContactRequest, AddContactResponse, ClearResponse, ContactListEntry, ContactListResponse,
    ContactResponse, ContactsResponse, SearchRequest,
};

use crate::auth::{AppState, with_db};
use crate::error::ApiError;
use crate::messages::delete_conversation;
use crate::middleware::AuthUser;

fn contact(row: UserRow, presence: Option<&PresenceTable>) -> ContactResponse {
    ContactResponse {
        is_online: presence.map(|p| p.is_online(&row.id)),
        id: row.id,
        email: row.email,
        first_name: row.first_name,
        last_name: row.last_name,
    }
}

/// The caller's saved contacts, each flagged with live presence.
pub async fn list_contacts(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = with_db(&state, move |db| Ok(db.get_contacts(&user_id)?)).await?;

    let presence = state.relay.presence();
    let contacts = rows.into_iter().map(|row| contact(row, Some(presence))).collect();
    Ok(Json(ContactsResponse { contacts }))
}

pub async fn add_contact(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Json(req): Json<AddContactRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let email = req.email.trim().to_string();
    if email.is_empty() {
        return Err(ApiError::bad_request("Missing email in request body"));
    }

    let row = with_db(&state, move |db| {
        let target = db
            .get_user_by_email(&email)?
            .ok_or_else(|| ApiError::not_found("No user found with that email"))?;
        db.add_contact(&user_id, &target.id)?;
        Ok(target)
    })
    .await?;

    Ok((
        StatusCode::CREATED,
        Json(AddContactResponse {
            message: "Contact added".into(),
            contact: contact(row, Some(state.relay.presence())),
        }),
    ))
}

pub async fn search_contacts(
    State(state): State<AppState>,
    Extension(_user): Extension<AuthUser>,
    Json(req): Json<SearchRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let term = req.search_term.trim().to_string();
    if term.is_empty() {
        return Err(ApiError::bad_request("Missing searchTerm"));
    }

    let rows = with_db(&state, move |db| Ok(db.search_users(&term)?)).await?;
    let contacts = rows.into_iter().map(|row| contact(row, None)).collect();
    Ok(Json(ContactsResponse { contacts }))
}

pub async fn all_contacts(
    State(state): State<AppState>,
    Extension(_user): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let rows = with_db(&state, |db| Ok(db.list_users(None)?)).await?;
    let contacts = rows.into_iter().map(|row| contact(row, None)).collect();
    Ok(Json(ContactsResponse { contacts }))
}

/// Every other user with the time of the latest message exchanged with the
/// caller. Most recent conversation first; users never messaged go last.
pub async fn contacts_for_list(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
) -> Result<impl IntoResponse, ApiError> {
    let mut entries = with_db(&state, move |db| {
        let others = db.list_users(Some(user_id.as_str()))?;
        let mut entries = Vec::with_capacity(others.len());
        for row in others {
            let last = db.last_message_at(&user_id, &row.id)?;
            entries.push((row, last));
        }
        Ok(entries)
    })
    .await?;

    // None sorts below Some, so reversing puts never-messaged users last.
    entries.sort_by(|a, b| b.1.cmp(&a.1));

    let contacts = entries
        .into_iter()
        .map(|(row, last)| ContactListEntry {
            contact: contact(row, None),
            last_message_timestamp: last,
        })
        .collect();
    Ok(Json(ContactListResponse { contacts }))
}

pub async fn delete_dm(
    State(state): State<AppState>,
    Extension(AuthUser(user_id)): Extension<AuthUser>,
    Path(contact_id): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let deleted = delete_conversation(&state, user_id, contact_id).await?;
    Ok(Json(ClearResponse {
        message: "DM deleted successfully".into(),
        deleted,
    }))
}
