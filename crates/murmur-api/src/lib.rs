pub mod auth;
pub mod contacts;
pub mod error;
pub mod messages;
pub mod middleware;

use axum::{
    Router, middleware as axum_middleware,
    routing::{delete, get, post},
};

use crate::auth::AppState;
use crate::middleware::require_auth;

/// All `/api` routes. Everything except signup and login requires a bearer token.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/api/auth/signup", post(auth::signup))
        .route("/api/auth/login", post(auth::login));

    let protected_routes = Router::new()
        .route("/api/auth/logout", post(auth::logout))
        .route("/api/auth/userinfo", get(auth::user_info))
        .route("/api/auth/update-profile", post(auth::update_profile))
        .route("/api/contacts", get(contacts::list_contacts).post(contacts::add_contact))
        .route("/api/contacts/search", post(contacts::search_contacts))
        .route("/api/contacts/all-contacts", get(contacts::all_contacts))
        .route("/api/contacts/get-contacts-for-list", get(contacts::contacts_for_list))
        .route("/api/contacts/delete-dm/{contact_id}", delete(contacts::delete_dm))
        .route("/api/messages/{contact_id}", get(messages::get_messages))
        .route("/api/messages/clear/{contact_id}", delete(messages::clear_messages))
        .layer(axum_middleware::from_fn_with_state(state.clone(), require_auth));

    public_routes.merge(protected_routes).with_state(state)
}
