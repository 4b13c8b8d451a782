use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::types::{ApiErrorCode, ApiErrorResponse};

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Unauthorized(String),
}

impl ApiError {
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::Unauthorized(message.into())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message) = match self {
            ApiError::BadRequest(message) => {
                (StatusCode::BAD_REQUEST, ApiErrorCode::Validation, message)
            }
            ApiError::Unauthorized(message) => {
                (StatusCode::UNAUTHORIZED, ApiErrorCode::Unauthorized, message)
            }
        };

        (status, Json(ApiErrorResponse { code, message })).into_response()
    }
}
