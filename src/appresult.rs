use std::fmt::Display;

use axum::{extract::{rejection::{JsonRejection, PathRejection}, Path}, http::StatusCode, response::{IntoResponse, Response}, Json};
use serde_json::json;

pub type AppResult<T> = Result<T, AppError>;

#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub error: anyhow::Error,
}

impl AppError {
    pub fn bad_request(msg: impl Display) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            error: anyhow::Error::msg(msg.to_string()),
        }
    }

    pub fn not_found(msg: impl Display) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            error: anyhow::Error::msg(msg.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(error = %self.error, backtrace = %self.error.backtrace(), "request failed");
        }

        (
            self.status,
            Json(json!({ "error": self.error.to_string() })),
        )
            .into_response()
    }
}

impl<E> From<E> for AppError
where
    E: Into<anyhow::Error>,
{
    fn from(err: E) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            error: err.into(),
        }
    }
}

/// Unwraps a JSON body, turning a rejection into a 400.
pub fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> AppResult<T> {
    body.map(|Json(x)| x)
        .map_err(|rejection| AppError::bad_request(rejection.body_text()))
}

/// Unwraps a path parameter, turning a rejection into a 400.
pub fn path_param<T>(param: Result<Path<T>, PathRejection>) -> AppResult<T> {
    param.map(|Path(x)| x)
        .map_err(|rejection| AppError::bad_request(rejection.body_text()))
}
