use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use uuid::Uuid;

use socio_types::api::{Claims, MarkAllReadResponse};

use crate::AppState;
use crate::error::ApiResult;

pub async fn list_notifications(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let notifications = state.core.notifications.list(&claims.sub).await?;
    Ok(Json(notifications))
}

/// Idempotent. Someone else's notification is reported as missing.
pub async fn mark_read(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    state.core.notifications.mark_read_for(&claims.sub, id).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn mark_all_read(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let count = state.core.notifications.mark_all_read(&claims.sub).await?;
    Ok(Json(MarkAllReadResponse { count }))
}
