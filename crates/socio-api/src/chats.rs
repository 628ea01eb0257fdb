use axum::{
    Extension, Json,
    extract::{Path, State},
    response::IntoResponse,
};
use tracing::debug;

use socio_types::api::{Claims, ResolveChatRequest};

use crate::AppState;
use crate::error::{ApiError, ApiResult};

/// Chats the caller takes part in. Users only list their own chats.
pub async fn list_chats(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    if username != claims.sub {
        return Err(ApiError::forbidden("chats are only visible to their members"));
    }

    let chats = state.core.chats.chats_for(&username).await?;
    Ok(Json(chats))
}

/// Resolve (creating on first contact) the chat with `receiverUsername`.
pub async fn resolve_chat(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<ResolveChatRequest>,
) -> ApiResult<impl IntoResponse> {
    let chat = state
        .core
        .chats
        .resolve_chat(&claims.sub, &req.receiver_username)
        .await?;
    debug!("{} resolved chat {} with {}", claims.sub, chat.id, req.receiver_username);
    Ok(Json(chat))
}
