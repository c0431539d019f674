use crate::database::DatabaseError;
use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use sqlx::Error as SqlxError;
use thiserror::Error;
use tracing::error;

/// Message returned to callers for every internal failure
pub const INTERNAL_ERROR_MESSAGE: &str = "Internal server error";

/// Application-level error types
#[derive(Error, Debug)]
pub enum AppError {
    /// Database-related errors
    #[error("Database error: {0}")]
    Database(#[from] DatabaseError),

    /// Repository errors that carry no business meaning for the caller
    #[error("Repository error: {0}")]
    Repository(RepositoryError),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Malformed or out-of-range input
    #[error("Validation error: {0}")]
    Validation(String),

    /// Referenced resource does not exist
    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The resource is not of the kind the action requires
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// The caller already holds a participation for this deal
    #[error("Already joined: {0}")]
    AlreadyJoined(String),

    /// The deal's end date has passed
    #[error("Expired: {0}")]
    Expired(String),

    /// Missing or invalid caller identity
    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    /// Authenticated but not allowed
    #[error("Forbidden: {0}")]
    Forbidden(String),

    /// Generic error with message
    #[error("{0}")]
    Message(String),
}

/// Result type alias for application errors
pub type AppResult<T> = Result<T, AppError>;

impl AppError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, AppError::NotFound(_))
    }

    /// True for errors detected before any mutation; these are never retried
    pub fn is_rejection(&self) -> bool {
        matches!(
            self,
            AppError::Validation(_)
                | AppError::NotFound(_)
                | AppError::InvalidOperation(_)
                | AppError::AlreadyJoined(_)
                | AppError::Expired(_)
                | AppError::Unauthorized(_)
                | AppError::Forbidden(_)
        )
    }

    /// True when the whole unit of work may be retried
    pub fn is_transient(&self) -> bool {
        matches!(self, AppError::Repository(e) if e.is_transient())
    }

    /// Get HTTP status code for the error
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Forbidden(_) => StatusCode::FORBIDDEN,
            AppError::Validation(_)
            | AppError::InvalidOperation(_)
            | AppError::AlreadyJoined(_)
            | AppError::Expired(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let message = if status == StatusCode::INTERNAL_SERVER_ERROR {
            error!("Internal server error: {}", self);
            INTERNAL_ERROR_MESSAGE.to_string()
        } else {
            match self {
                AppError::NotFound(msg)
                | AppError::Unauthorized(msg)
                | AppError::Forbidden(msg)
                | AppError::Validation(msg)
                | AppError::InvalidOperation(msg)
                | AppError::AlreadyJoined(msg)
                | AppError::Expired(msg) => msg,
                other => other.to_string(),
            }
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Repository-specific error types
#[derive(Error, Debug)]
pub enum RepositoryError {
    /// Database query error
    #[error("Query error: {0}")]
    Query(SqlxError),

    /// Record not found
    #[error("Record not found: {0}")]
    NotFound(String),

    /// Duplicate record (unique violation)
    #[error("Duplicate record: {0}")]
    Duplicate(String),

    /// Constraint violation
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Invalid input
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Serialization failure or deadlock; the transaction can be replayed
    #[error("Transient failure: {0}")]
    Transient(String),

    /// Storage backend failure that is not a SQL error
    #[error("Storage failure: {0}")]
    Storage(String),
}

impl RepositoryError {
    pub fn is_transient(&self) -> bool {
        matches!(self, RepositoryError::Transient(_))
    }
}

impl From<RepositoryError> for AppError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound(msg) => AppError::NotFound(msg),
            RepositoryError::InvalidInput(msg) => AppError::Validation(msg),
            RepositoryError::ConstraintViolation(msg) => AppError::Validation(msg),
            other => AppError::Repository(other),
        }
    }
}

impl From<SqlxError> for RepositoryError {
    fn from(err: SqlxError) -> Self {
        match &err {
            SqlxError::RowNotFound => RepositoryError::NotFound("Record not found".to_string()),
            SqlxError::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                match code.as_deref() {
                    // unique_violation
                    Some("23505") => RepositoryError::Duplicate(db_err.message().to_string()),
                    // foreign_key_violation, check_violation
                    Some("23503") | Some("23514") => {
                        RepositoryError::ConstraintViolation(db_err.message().to_string())
                    }
                    // serialization_failure, deadlock_detected
                    Some("40001") | Some("40P01") => {
                        RepositoryError::Transient(db_err.message().to_string())
                    }
                    _ => RepositoryError::Query(err),
                }
            }
            _ => RepositoryError::Query(err),
        }
    }
}
