use axum::{
    extract::rejection::{PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use thiserror::Error;
use uuid::Uuid;

/// Failure while reading or writing durable state (tables or image objects).
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("object store error: {0}")]
    Object(String),

    #[error("record store is closed")]
    Closed,
}

/// Errors surfaced by the record store and the analysis pipeline.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("entry {0} not found")]
    NotFound(Uuid),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error("analysis service failed: {0}")]
    Collaborator(String),
}

impl StoreError {
    /// Stable code the HTTP layer hands to clients.
    pub fn code(&self) -> &'static str {
        match self {
            StoreError::NotFound(_) => "NOT_FOUND",
            StoreError::Storage(_) => "STORAGE_ERROR",
            StoreError::Collaborator(_) => "COLLABORATOR_ERROR",
        }
    }

    /// Only collaborator failures are worth retrying as-is.
    pub fn is_retryable(&self) -> bool {
        matches!(self, StoreError::Collaborator(_))
    }
}

/// JSON body returned by every endpoint on failure.
#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub code: &'static str,
    pub message: String,
    pub retryable: bool,
}

#[derive(Debug, Error)]
pub enum AppError {
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}

impl From<StorageError> for AppError {
    fn from(e: StorageError) -> Self {
        AppError::Store(StoreError::Storage(e))
    }
}

impl From<PathRejection> for AppError {
    fn from(e: PathRejection) -> Self {
        AppError::Validation(e.body_text())
    }
}

impl From<QueryRejection> for AppError {
    fn from(e: QueryRejection) -> Self {
        AppError::Validation(e.body_text())
    }
}

impl AppError {
    fn status_and_body(self) -> (StatusCode, ErrorBody) {
        match self {
            AppError::Validation(message) => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    code: "VALIDATION_ERROR",
                    message,
                    retryable: false,
                },
            ),
            AppError::Store(e) => {
                let status = match e {
                    StoreError::NotFound(_) => StatusCode::NOT_FOUND,
                    StoreError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
                    StoreError::Collaborator(_) => StatusCode::BAD_GATEWAY,
                };
                (
                    status,
                    ErrorBody {
                        code: e.code(),
                        retryable: e.is_retryable(),
                        message: e.to_string(),
                    },
                )
            }
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let (status, body) = self.status_and_body();
        if status.is_server_error() {
            tracing::error!(code = body.code, message = %body.message, "request failed");
        }
        (status, Json(body)).into_response()
    }
}
