//! Maps rejections and failures to JSON error responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use search_core::error::{Error, Rejection};
use serde_json::json;

/// Each variant answers with `{"result": false, "error": message}`:
/// - `BadRequest` → 400
/// - `Conflict` → 409
/// - `Internal` → 500
#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Conflict(String),
    Internal(String),
}

impl From<Rejection> for ApiError {
    fn from(rejection: Rejection) -> Self {
        let message = rejection.to_string();
        match rejection {
            Rejection::AlreadyRunning
            | Rejection::StillStopping
            | Rejection::NotRunning
            | Rejection::AlreadyStopping
            | Rejection::NotIndexed => ApiError::Conflict(message),
            Rejection::PageOutOfScope | Rejection::UnknownSite | Rejection::EmptyQuery => {
                ApiError::BadRequest(message)
            }
        }
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        tracing::error!(error = %err, "request failed");
        ApiError::Internal(err.to_string())
    }
}

impl From<Error> for ApiError {
    fn from(err: Error) -> Self {
        match err {
            Error::Rejected(rejection) => rejection.into(),
            Error::Internal(err) => err.into(),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Internal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg),
        };
        (status, Json(json!({ "result": false, "error": message }))).into_response()
    }
}
