use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde::{Deserialize, Serialize};

use crate::{db::DbError, ingest::IngestError, retention::SweepError};

/// Error body: `{"error": {"type": "...", "message": "...", "code": "..."}}`
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: ErrorInfo,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorInfo {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
    pub code: String,
}

impl ErrorResponse {
    pub fn new(error_type: &str, code: &str, message: impl Into<String>) -> Self {
        Self {
            error: ErrorInfo {
                error_type: error_type.to_string(),
                message: message.into(),
                code: code.to_string(),
            },
        }
    }
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    /// The message can never be stored; Pub/Sub should stop redelivering it.
    InvalidMessage(String),
    Store(DbError),
    Sweep(SweepError),
    Internal(String),
}

impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::Validation(msg) => ApiError::BadRequest(msg),
            _ => ApiError::Store(err),
        }
    }
}

impl From<IngestError> for ApiError {
    fn from(err: IngestError) -> Self {
        match err {
            IngestError::Store(db_err) => ApiError::Store(db_err),
            other => ApiError::InvalidMessage(other.to_string()),
        }
    }
}

impl From<SweepError> for ApiError {
    fn from(err: SweepError) -> Self {
        ApiError::Sweep(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, error_type, code, message) = match self {
            ApiError::BadRequest(msg) => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                "bad_request",
                msg,
            ),
            ApiError::InvalidMessage(msg) => (
                StatusCode::BAD_REQUEST,
                "invalid_request_error",
                "invalid_message",
                msg,
            ),
            ApiError::Store(err) => {
                tracing::error!(error = %err, "Store error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "server_error",
                    "store_error",
                    "An internal store error occurred".to_string(),
                )
            }
            ApiError::Sweep(err) => {
                tracing::error!(error = %err, "Retention sweep failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "server_error",
                    "sweep_failed",
                    format!("Retention sweep failed: {err}"),
                )
            }
            ApiError::Internal(msg) => {
                tracing::error!(error = %msg, "Internal error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "server_error",
                    "internal_error",
                    "An internal error occurred".to_string(),
                )
            }
        };

        (status, Json(ErrorResponse::new(error_type, code, message))).into_response()
    }
}
