use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};

use socio_types::api::{Claims, RecordActivityRequest};
use socio_types::models::ActionType;

use crate::AppState;
use crate::error::{ApiError, ApiResult};

/// Most recent activities of any user, newest first.
pub async fn list_activities(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Extension(_claims): Extension<Claims>,
) -> ApiResult<impl IntoResponse> {
    let activities = state.core.activities.recent(&username).await?;
    Ok(Json(activities))
}

/// Record an activity for the caller and notify the target's owner.
pub async fn record_activity(
    State(state): State<AppState>,
    Path(username): Path<String>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<RecordActivityRequest>,
) -> ApiResult<impl IntoResponse> {
    if username != claims.sub {
        return Err(ApiError::forbidden("activities can only be recorded for yourself"));
    }

    let activity = state
        .core
        .activities
        .record_activity(&username, req.kind, req.target.as_deref())
        .await?;

    if let (Some(action), Some(receiver)) = (req.kind.notifies(), req.receiver_username.as_deref()) {
        // Follows point at a user, not a post
        let post_id = match action {
            ActionType::Follow => None,
            _ => req.target.as_deref(),
        };
        state.core.notifications.notify(&username, receiver, action, post_id).await;
    }

    Ok((StatusCode::CREATED, Json(activity)))
}
