use axum::{
    Extension, Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::IntoResponse,
};
use serde::Deserialize;
use tracing::{debug, warn};
use uuid::Uuid;

use socio_core::SocioError;
use socio_core::delivery::DEFAULT_HISTORY_LIMIT;
use socio_types::api::{Claims, SendMessageRequest};

use crate::AppState;
use crate::error::ApiResult;

#[derive(Debug, Deserialize)]
pub struct MessageQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
}

fn default_limit() -> u32 {
    DEFAULT_HISTORY_LIMIT
}

/// Persist a message and push it to the receiver if they are online.
pub async fn send_message(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<impl IntoResponse> {
    if req.sender_username != claims.sub {
        warn!("{} tried to send as {} in chat {}", claims.sub, req.sender_username, req.chat_id);
        return Err(SocioError::Validation("senderUsername does not match the authenticated user".into()).into());
    }

    let delivery = state
        .core
        .messages
        .deliver(req.chat_id, &claims.sub, &req.text)
        .await?;
    debug!(
        "{} -> {} message {} over HTTP ({} live connection(s))",
        claims.sub, delivery.receiver, delivery.message.id, delivery.pushed
    );

    Ok((StatusCode::CREATED, Json(delivery.message)))
}

/// Chronological history; members only. `limit` is capped server-side.
pub async fn get_messages(
    State(state): State<AppState>,
    Path(chat_id): Path<Uuid>,
    Query(query): Query<MessageQuery>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let messages = state
        .core
        .messages
        .history(chat_id, &claims.sub, query.limit)
        .await?;
    Ok(Json(messages))
}
