pub mod config;
pub mod gateway;

use axum::{Router, extract::Request, routing::get};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::Span;

use murmur_api::auth::AppState;

/// Full HTTP surface: REST API, gateway WebSocket, health check.
pub fn app(state: AppState) -> Router {
    let ws_route = Router::new()
        .route("/gateway", get(gateway::ws_upgrade))
        .with_state(state.clone());

    Router::new()
        .route("/health", get(|| async { "ok" }))
        .merge(murmur_api::router(state))
        .merge(ws_route)
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http().make_span_with(request_span))
}

/// Path only: the gateway carries bearer tokens in its query string.
fn request_span(req: &Request) -> Span {
    tracing::debug_span!(
        "request",
        method = %req.method(),
        path = %req.uri().path(),
        version = ?req.version(),
    )
}
