use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::response::Response;
use axum::Json;
use serde_json::json;
use std::fmt;

/// Error taxonomy shared by the read model, the projectors, and the identity
/// resolver. Projectors inspect the variant to decide whether to reject an
/// event outright or leave it for firehose replay to retry; read-model
/// callers turn the same variants into HTTP status codes.
#[derive(Debug)]
pub enum AppError {
    /// Entity absent. In projectors: "not yet indexed, proceed or reject per
    /// policy". In read callers: 404.
    NotFound(String),
    /// Malformed input, a threading-immutability violation, or a bad cursor.
    Validation(String),
    /// Duplicate insert; projectors treat this idempotently (skip), write
    /// RPCs surface it as 409.
    Conflict(String),
    /// Cross-repo spoof attempt (e.g. a post claiming a community whose
    /// repository owner differs) or a caller lacking required auth.
    Unauthorized(String),
    /// Network or database condition expected to clear on retry. Projectors
    /// must not commit; the firehose event will re-arrive.
    Transient(String),
    /// Startup configuration invalid, database unreachable at boot.
    Fatal(String),
    /// Wrap anyhow errors for anything not classified above.
    Internal(anyhow::Error),
}

impl AppError {
    pub fn not_found(resource: impl Into<String>) -> Self {
        AppError::NotFound(resource.into())
    }

    pub fn validation(msg: impl Into<String>) -> Self {
        AppError::Validation(msg.into())
    }

    pub fn unauthorized(msg: impl Into<String>) -> Self {
        AppError::Unauthorized(msg.into())
    }

    /// True when a projector should leave the transaction uncommitted and
    /// rely on at-least-once firehose redelivery rather than logging a
    /// permanent rejection.
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::Transient(_))
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            AppError::NotFound(resource) => {
                (StatusCode::NOT_FOUND, format!("{resource} not found"))
            }
            AppError::Validation(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            AppError::Conflict(msg) => (StatusCode::CONFLICT, msg.clone()),
            AppError::Unauthorized(msg) => (StatusCode::UNAUTHORIZED, msg.clone()),
            AppError::Transient(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                format!("temporarily unavailable: {msg}"),
            ),
            AppError::Fatal(msg) => (StatusCode::INTERNAL_SERVER_ERROR, msg.clone()),
            AppError::Internal(err) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                format!("internal error: {err}"),
            ),
        };

        if status.is_server_error() {
            tracing::error!(%status, %message, "request failed");
        } else {
            tracing::debug!(%status, %message, "request rejected");
        }

        (status, Json(json!({ "error": message }))).into_response()
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::NotFound(resource) => write!(f, "{resource} not found"),
            AppError::Validation(msg) => write!(f, "validation error: {msg}"),
            AppError::Conflict(msg) => write!(f, "conflict: {msg}"),
            AppError::Unauthorized(msg) => write!(f, "unauthorized: {msg}"),
            AppError::Transient(msg) => write!(f, "transient error: {msg}"),
            AppError::Fatal(msg) => write!(f, "fatal error: {msg}"),
            AppError::Internal(err) => write!(f, "{err}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::RowNotFound => AppError::NotFound("row".to_string()),
            sqlx::Error::Database(db_err) => {
                if db_err.is_unique_violation() {
                    AppError::Conflict(db_err.message().to_string())
                } else if db_err.is_foreign_key_violation() {
                    AppError::NotFound(db_err.message().to_string())
                } else {
                    AppError::Transient(db_err.message().to_string())
                }
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::Io(_) => AppError::Transient(err.to_string()),
            _ => AppError::Internal(err.into()),
        }
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::Internal(err)
    }
}
