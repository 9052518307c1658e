//! HTTP error mapping for API handlers.

use crate::AppError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;

/// Error returned by HTTP handlers.
#[derive(Debug)]
pub enum HttpError {
    /// Domain or storage failure from the core crate.
    App(AppError),
    /// No valid caller identity on a request that needs one.
    Unauthorized,
    /// Caller is known but may not perform the action.
    Forbidden(String),
}

impl From<AppError> for HttpError {
    fn from(value: AppError) -> Self {
        Self::App(value)
    }
}

impl HttpError {
    pub(crate) fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let (status, error_message) = match self {
            HttpError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "Authentication required".to_string(),
            ),
            HttpError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg),
            HttpError::App(AppError::NotFound) => (StatusCode::NOT_FOUND, "Not found".to_string()),
            HttpError::App(AppError::Conflict(msg)) => (StatusCode::CONFLICT, msg),
            HttpError::App(AppError::BadRequest(msg)) => (StatusCode::BAD_REQUEST, msg),
            HttpError::App(err) if err.is_transient() => {
                tracing::error!("Storage error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Storage error".to_string(),
                )
            }
            HttpError::App(err) => {
                tracing::error!("Internal error: {:?}", err);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                )
            }
        };

        let body = Json(json!({ "error": error_message }));
        (status, body).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn domain_errors_map_to_client_statuses() {
        let cases = [
            (HttpError::App(AppError::NotFound), StatusCode::NOT_FOUND),
            (
                HttpError::App(AppError::Conflict("taken".to_string())),
                StatusCode::CONFLICT,
            ),
            (
                HttpError::App(AppError::BadRequest("blank".to_string())),
                StatusCode::BAD_REQUEST,
            ),
            (HttpError::Unauthorized, StatusCode::UNAUTHORIZED),
            (HttpError::forbidden("not yours"), StatusCode::FORBIDDEN),
            (
                HttpError::App(AppError::StorageMessage("disk".to_string())),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
            (
                HttpError::App(AppError::Internal),
                StatusCode::INTERNAL_SERVER_ERROR,
            ),
        ];
        for (error, expected) in cases {
            assert_eq!(error.into_response().status(), expected);
        }
    }
}
