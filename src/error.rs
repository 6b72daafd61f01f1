use axum::extract::rejection::{JsonRejection, PathRejection, QueryRejection};
use axum::{Json, http::StatusCode, response::IntoResponse};
use serde::Serialize;
use sqlx::Error as SqlxError;
use std::fmt::Display;
use thiserror::Error as ThisError;
use tracing::error;

/// Longest statement error message handed back to the caller.
pub const STATEMENT_ERROR_LIMIT: usize = 200;

#[derive(Debug, ThisError)]
pub enum HubError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Metadata store error: {0}")]
    DatabaseError(#[from] SqlxError),

    #[error("Credential cipher error: {0}")]
    Crypto(String),

    #[error("Missing or invalid credentials")]
    Unauthenticated,

    #[error("Access denied: {0}")]
    Forbidden(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("The row was not found or has already been deleted")]
    RowNotFound,

    #[error("Table `{table}` has no primary key; rows cannot be modified")]
    NoPrimaryKey { table: String },

    #[error("Primary key value for `{column}` not found in row payload")]
    MissingKeyValue { column: String },

    #[error("{0}")]
    Validation(String),

    #[error("Invalid identifier: {0}")]
    InvalidIdentifier(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Statement failed: {0}")]
    Statement(String),
}

impl HubError {
    /// Statement failure with the driver message cut to [`STATEMENT_ERROR_LIMIT`] chars.
    pub fn statement(err: impl Display) -> Self {
        HubError::Statement(truncate_chars(&err.to_string(), STATEMENT_ERROR_LIMIT))
    }

    pub fn connection(err: impl Display) -> Self {
        HubError::Connection(err.to_string())
    }

    pub fn forbidden(reason: impl Into<String>) -> Self {
        HubError::Forbidden(reason.into())
    }

    pub fn validation(reason: impl Into<String>) -> Self {
        HubError::Validation(reason.into())
    }
}

pub fn truncate_chars(s: &str, limit: usize) -> String {
    match s.char_indices().nth(limit) {
        Some((idx, _)) => s[..idx].to_string(),
        None => s.to_string(),
    }
}

// Extractor rejections are reported through the uniform error body.
impl From<JsonRejection> for HubError {
    fn from(rejection: JsonRejection) -> Self {
        HubError::Validation(rejection.body_text())
    }
}

impl From<PathRejection> for HubError {
    fn from(rejection: PathRejection) -> Self {
        HubError::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for HubError {
    fn from(rejection: QueryRejection) -> Self {
        HubError::Validation(rejection.body_text())
    }
}

impl IntoResponse for HubError {
    fn into_response(self) -> axum::response::Response {
        let (status, code) = match &self {
            HubError::Unauthenticated => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            HubError::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            HubError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            HubError::RowNotFound => (StatusCode::NOT_FOUND, "ROW_NOT_FOUND"),
            HubError::NoPrimaryKey { .. } => (StatusCode::CONFLICT, "NO_PRIMARY_KEY"),
            HubError::MissingKeyValue { .. } => {
                (StatusCode::UNPROCESSABLE_ENTITY, "MISSING_KEY_VALUE")
            }
            HubError::Validation(_) => (StatusCode::UNPROCESSABLE_ENTITY, "VALIDATION_ERROR"),
            HubError::InvalidIdentifier(_) => {
                (StatusCode::UNPROCESSABLE_ENTITY, "INVALID_IDENTIFIER")
            }
            HubError::Connection(_) => (StatusCode::BAD_GATEWAY, "CONNECTION_ERROR"),
            HubError::Statement(_) => (StatusCode::BAD_REQUEST, "STATEMENT_ERROR"),
            HubError::Config(_) | HubError::DatabaseError(_) | HubError::Crypto(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        };

        let message = match &self {
            HubError::Config(_) | HubError::DatabaseError(_) | HubError::Crypto(_) => {
                error!(error = %self, "internal error while handling request");
                "An internal server error occurred.".to_string()
            }
            other => other.to_string(),
        };

        let body = ApiErrorResponse {
            error: ApiErrorBody {
                code: code.to_string(),
                message,
            },
        };
        (status, Json(body)).into_response()
    }
}

/// Standardized API error response body
#[derive(Serialize)]
pub struct ApiErrorBody {
    pub code: String,
    pub message: String,
}

#[derive(Serialize)]
pub struct ApiErrorResponse {
    pub error: ApiErrorBody,
}
