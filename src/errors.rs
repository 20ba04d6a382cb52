use crate::services::{
    history_service::HistoryError, registry_client::RegistryError,
    review_queue::ReviewQueueError, staging_service::StagingError, workflow::WorkflowError,
};
use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use serde_json::{Value, json};
use std::fmt;

/// Error taxonomy exposed to callers. Rendered as the `code` field.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Validation,
    AuthenticationRequired,
    ServiceUnavailable,
    ServiceTimeout,
    NotFound,
    Unauthorized,
    Conflict,
    Internal,
}

impl ErrorKind {
    pub fn code(self) -> &'static str {
        match self {
            ErrorKind::Validation => "VALIDATION_ERROR",
            ErrorKind::AuthenticationRequired => "AUTHENTICATION_REQUIRED",
            ErrorKind::ServiceUnavailable => "SERVICE_UNAVAILABLE",
            ErrorKind::ServiceTimeout => "SERVICE_TIMEOUT",
            ErrorKind::NotFound => "NOT_FOUND",
            ErrorKind::Unauthorized => "UNAUTHORIZED",
            ErrorKind::Conflict => "CONFLICT",
            ErrorKind::Internal => "INTERNAL_ERROR",
        }
    }
}

/// A lightweight wrapper for general errors that keeps the message local.
#[derive(Debug)]
pub struct AppError {
    pub status: StatusCode,
    pub kind: ErrorKind,
    pub message: String,
    pub details: Option<Value>,
}

impl AppError {
    /// Create a new AppError with a specific status, kind and message.
    pub fn new(status: StatusCode, kind: ErrorKind, msg: impl Into<String>) -> Self {
        Self {
            status,
            kind,
            message: msg.into(),
            details: None,
        }
    }

    /// Attach a structured payload (e.g. a validation report).
    pub fn with_details(mut self, details: Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Shortcut for a 400 Bad Request
    pub fn bad_request(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, ErrorKind::Validation, msg)
    }

    /// Shortcut for a 401 Unauthorized (no or unusable identity)
    pub fn authentication_required() -> Self {
        Self::new(
            StatusCode::UNAUTHORIZED,
            ErrorKind::AuthenticationRequired,
            "authentication required",
        )
    }

    /// Shortcut for a 403 Forbidden
    pub fn unauthorized(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, ErrorKind::Unauthorized, msg)
    }

    /// Shortcut for 404 Not Found
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, ErrorKind::NotFound, msg)
    }

    /// Shortcut for 409 Conflict
    pub fn conflict(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::CONFLICT, ErrorKind::Conflict, msg)
    }

    /// Shortcut for a 500 Internal Server Error
    pub fn internal(msg: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, ErrorKind::Internal, msg)
    }
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)
    }
}

impl std::error::Error for AppError {}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        if self.status.is_server_error() {
            tracing::error!(code = self.kind.code(), "{}", self.message);
        }

        let mut body = json!({
            "error": self.message,
            "code": self.kind.code(),
            "status": self.status.as_u16()
        });
        if let Some(details) = self.details {
            body["details"] = details;
        }

        (self.status, Json(body)).into_response()
    }
}

impl From<anyhow::Error> for AppError {
    fn from(err: anyhow::Error) -> Self {
        AppError::internal(err.to_string())
    }
}

impl From<StagingError> for AppError {
    fn from(err: StagingError) -> Self {
        match err {
            StagingError::ObjectNotFound(_) => AppError::not_found(err.to_string()),
            StagingError::InvalidKey => AppError::bad_request(err.to_string()),
            StagingError::Sqlx(_) | StagingError::Io(_) => AppError::internal(err.to_string()),
        }
    }
}

impl From<HistoryError> for AppError {
    fn from(err: HistoryError) -> Self {
        match err {
            HistoryError::EmptyReason => AppError::bad_request(err.to_string()),
            HistoryError::Sqlx(_) => AppError::internal(err.to_string()),
        }
    }
}

impl From<ReviewQueueError> for AppError {
    fn from(err: ReviewQueueError) -> Self {
        match err {
            ReviewQueueError::ItemNotFound(_) => AppError::not_found(err.to_string()),
            ReviewQueueError::NotClaimedBy { .. } => AppError::conflict(err.to_string()),
            ReviewQueueError::Sqlx(_) => AppError::internal(err.to_string()),
        }
    }
}

impl From<RegistryError> for AppError {
    fn from(err: RegistryError) -> Self {
        match err {
            RegistryError::Timeout => AppError::new(
                StatusCode::GATEWAY_TIMEOUT,
                ErrorKind::ServiceTimeout,
                err.to_string(),
            ),
            RegistryError::NotFound(_) => AppError::not_found(err.to_string()),
            RegistryError::Unavailable(_) | RegistryError::Parse(_) => AppError::new(
                StatusCode::SERVICE_UNAVAILABLE,
                ErrorKind::ServiceUnavailable,
                err.to_string(),
            ),
        }
    }
}

impl From<WorkflowError> for AppError {
    fn from(err: WorkflowError) -> Self {
        match err {
            WorkflowError::Validation(report) => {
                let details = serde_json::to_value(&report).unwrap_or(Value::Null);
                AppError::new(
                    StatusCode::UNPROCESSABLE_ENTITY,
                    ErrorKind::Validation,
                    "upload failed validation",
                )
                .with_details(details)
            }
            WorkflowError::AccountSuspended(_) | WorkflowError::NotAttemptOwner(_) => {
                AppError::unauthorized(err.to_string())
            }
            WorkflowError::AttemptNotFound(_) => AppError::not_found(err.to_string()),
            WorkflowError::AttemptBusy(_) => AppError::conflict(err.to_string()),
            WorkflowError::History(inner) => inner.into(),
            WorkflowError::Review(inner) => inner.into(),
        }
    }
}
