pub mod activities;
pub mod chats;
pub mod error;
pub mod messages;
pub mod middleware;
pub mod notifications;

use std::sync::Arc;

use axum::{
    Router,
    routing::{get, patch, post},
};

use socio_core::Core;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub core: Core,
    pub jwt_secret: String,
}

/// Mount point of every HTTP route; existing web clients call `/api/v1/...`.
pub const API_PREFIX: &str = "/api/v1";

/// Every authenticated HTTP route under [`API_PREFIX`]. The caller adds CORS,
/// tracing and the gateway.
pub fn router(state: AppState) -> Router {
    let routes = Router::new()
        .route("/chat", post(chats::resolve_chat))
        .route("/chat/{username}", get(chats::list_chats))
        .route("/message", post(messages::send_message))
        .route("/message/{chat_id}", get(messages::get_messages))
        .route("/notifications", get(notifications::list_notifications))
        .route("/notifications/read-all", post(notifications::mark_all_read))
        .route("/notifications/{id}", patch(notifications::mark_read))
        .route(
            "/users/{username}/activities",
            get(activities::list_activities).post(activities::record_activity),
        )
        .layer(axum::middleware::from_fn_with_state(
            state.clone(),
            middleware::require_auth,
        ))
        .with_state(state);

    Router::new().nest(API_PREFIX, routes)
}
