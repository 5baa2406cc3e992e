use axum::{
    extract::{Query, State, WebSocketUpgrade},
    http::HeaderMap,
    response::IntoResponse,
};
use axum_extra::headers::{Authorization, HeaderMapExt, authorization::Bearer};
use serde::Deserialize;

use murmur_api::auth::AppState;
use murmur_api::error::ApiError;
use murmur_api::middleware::verify_token;
use murmur_gateway::connection;

#[derive(Debug, Deserialize)]
pub struct GatewayQuery {
    token: Option<String>,
}

/// Verify the caller before upgrading. Browsers cannot set headers on a
/// WebSocket handshake, so the token may also arrive as `?token=`.
pub async fn ws_upgrade(
    State(state): State<AppState>,
    Query(query): Query<GatewayQuery>,
    headers: HeaderMap,
    ws: WebSocketUpgrade,
) -> Result<impl IntoResponse, ApiError> {
    let token = headers
        .typed_get::<Authorization<Bearer>>()
        .map(|Authorization(bearer)| bearer.token().to_string())
        .or(query.token)
        .ok_or(ApiError::Unauthorized("No token provided"))?;

    let claims = verify_token(&state.jwt_secret, &token)
        .map_err(|_| ApiError::Unauthorized("Invalid token"))?;

    let relay = state.relay.clone();
    Ok(ws.on_upgrade(move |socket| connection::handle_connection(socket, relay, claims.sub)))
}
