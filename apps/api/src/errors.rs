use std::collections::BTreeMap;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use thiserror::Error;

use crate::data::{DataError, DataErrorKind};

pub const DUPLICATE_SCORE_MESSAGE: &str =
    "A score for this subject and semester already exists";

/// Application-level error type.
/// Implements `IntoResponse` so Axum handlers can return `Result<T, AppError>`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    /// Field name → message, rendered next to the offending inputs.
    #[error("Invalid fields: {0:?}")]
    InvalidFields(BTreeMap<String, String>),

    #[error("Unauthorized")]
    Unauthorized,

    #[error("Forbidden")]
    Forbidden,

    #[error("No school on file")]
    NoSchoolOnFile,

    #[error("Confirmation required: {0}")]
    ConfirmationRequired(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    /// In-memory capacity exhausted; the client may retry later.
    #[error("Busy: {0}")]
    Busy(String),

    #[error("Data error: {0}")]
    Data(#[from] DataError),

    #[error("Internal server error: {0}")]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let mut fields = None;
        let (status, code, message) = match &self {
            AppError::NotFound(msg) => (StatusCode::NOT_FOUND, "NOT_FOUND", msg.clone()),
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, "VALIDATION_ERROR", msg.clone()),
            AppError::InvalidFields(map) => {
                fields = Some(map.clone());
                (
                    StatusCode::BAD_REQUEST,
                    "VALIDATION_ERROR",
                    "Some fields need attention".to_string(),
                )
            }
            AppError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "UNAUTHORIZED",
                "Not authenticated".to_string(),
            ),
            AppError::Forbidden => (
                StatusCode::FORBIDDEN,
                "FORBIDDEN",
                "Access denied".to_string(),
            ),
            AppError::NoSchoolOnFile => (
                StatusCode::FORBIDDEN,
                "NO_SCHOOL",
                "No school on file for this admin account".to_string(),
            ),
            AppError::ConfirmationRequired(msg) => (
                StatusCode::CONFLICT,
                "CONFIRMATION_REQUIRED",
                msg.clone(),
            ),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, "CONFLICT", msg.clone()),
            AppError::Busy(msg) => (StatusCode::SERVICE_UNAVAILABLE, "BUSY", msg.clone()),
            AppError::Data(e) => match e.kind {
                DataErrorKind::Duplicate => (
                    StatusCode::CONFLICT,
                    "DUPLICATE_SCORE",
                    DUPLICATE_SCORE_MESSAGE.to_string(),
                ),
                DataErrorKind::NotFound => (StatusCode::NOT_FOUND, "NOT_FOUND", e.message.clone()),
                DataErrorKind::PermissionDenied => (
                    StatusCode::FORBIDDEN,
                    "FORBIDDEN",
                    "Access denied".to_string(),
                ),
                DataErrorKind::Unavailable => {
                    tracing::error!("Data service unavailable: {e}");
                    (
                        StatusCode::SERVICE_UNAVAILABLE,
                        "DATA_UNAVAILABLE",
                        "The data service is unavailable. Please try again.".to_string(),
                    )
                }
                DataErrorKind::Invalid | DataErrorKind::Other => {
                    tracing::error!("Data error: {e}");
                    (
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "DATABASE_ERROR",
                        "Failed to save data. Please try again.".to_string(),
                    )
                }
            },
            AppError::Internal(e) => {
                tracing::error!("Internal error: {e:?}");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "INTERNAL_ERROR",
                    "An internal server error occurred".to_string(),
                )
            }
        };

        let mut error = json!({
            "code": code,
            "message": message
        });
        if let Some(fields) = fields {
            error["fields"] = json!(fields);
        }

        (status, Json(json!({ "error": error }))).into_response()
    }
}
