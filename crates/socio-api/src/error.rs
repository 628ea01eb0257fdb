use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::warn;

use socio_core::SocioError;
use socio_types::api::ErrorResponse;

pub type ApiResult<T> = Result<T, ApiError>;

/// An error rendered as `{ "error": code, "message": text }`.
#[derive(Debug, Error)]
#[error("{code}: {message}")]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
}

impl ApiError {
    pub fn new(status: StatusCode, code: &'static str, message: impl Into<String>) -> Self {
        Self {
            status,
            code,
            message: message.into(),
        }
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, "forbidden", message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<SocioError> for ApiError {
    fn from(err: SocioError) -> Self {
        let status = match &err {
            SocioError::Validation(_) => StatusCode::BAD_REQUEST,
            SocioError::NotAMember { .. }
            | SocioError::MessagingDisallowed(_)
            | SocioError::ChatBlocked { .. } => StatusCode::FORBIDDEN,
            SocioError::NotFound(_) => StatusCode::NOT_FOUND,
            SocioError::TransientStore(e) => {
                warn!("Store failure surfaced to client: {:#}", e);
                StatusCode::SERVICE_UNAVAILABLE
            }
        };
        Self::new(status, err.code(), err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let body = ErrorResponse {
            error: self.code.to_string(),
            message: self.message,
        };
        (self.status, Json(body)).into_response()
    }
}
