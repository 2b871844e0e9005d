use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use gatepass_core::{AuthorityError, Error as CoreError};
use serde_json::json;
use thiserror::Error;
use tracing::error;
use uuid::Uuid;

use crate::utils::response::error as error_response;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Invalid template: {0}")]
    InvalidTemplate(String),

    #[error("Authentication error: {0}")]
    AuthError(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    /// The session row was written, its tickets were not.
    #[error("Session {session_id} created without tickets: {reason}")]
    TicketGenerationFailed { session_id: Uuid, reason: String },

    #[error("Database error")]
    DatabaseError(#[from] sqlx::Error),

    #[error("Internal server error")]
    InternalServerError(String),
}

impl AppError {
    pub fn status_code(&self) -> StatusCode {
        match self {
            AppError::ValidationError(_) => StatusCode::BAD_REQUEST,
            AppError::InvalidTemplate(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::AuthError(_) => StatusCode::UNAUTHORIZED,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::TicketGenerationFailed { .. } => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::DatabaseError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::InternalServerError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            AppError::ValidationError(_) => "VALIDATION_ERROR",
            AppError::InvalidTemplate(_) => "INVALID_TEMPLATE_CONFIG",
            AppError::AuthError(_) => "AUTH_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::TicketGenerationFailed { .. } => "TICKET_GENERATION_FAILED",
            AppError::DatabaseError(_) => "DATABASE_ERROR",
            AppError::InternalServerError(_) => "INTERNAL_SERVER_ERROR",
        }
    }

    fn log(&self) {
        match self {
            AppError::ValidationError(msg)
            | AppError::InvalidTemplate(msg)
            | AppError::AuthError(msg)
            | AppError::NotFound(msg)
            | AppError::InternalServerError(msg) => {
                error!(error = ?self, message = %msg, "Application error");
            }
            AppError::TicketGenerationFailed { session_id, reason } => {
                error!(%session_id, reason = %reason, "Session left without tickets");
            }
            AppError::DatabaseError(e) => {
                error!(error = ?e, "Database error");
            }
        }
    }
}

impl From<CoreError> for AppError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::InvalidTemplateConfig(msg) => AppError::InvalidTemplate(msg),
            CoreError::TicketGenerationFailed {
                session_id, reason, ..
            } => AppError::TicketGenerationFailed { session_id, reason },
            CoreError::TicketNotFound(code) => AppError::NotFound(format!("Ticket '{}'", code)),
            CoreError::InvalidTime(_) | CoreError::InvalidFieldValue { .. } => {
                AppError::ValidationError(err.to_string())
            }
            CoreError::Store(e) => AppError::DatabaseError(e),
            other => AppError::InternalServerError(other.to_string()),
        }
    }
}

impl From<AppError> for AuthorityError {
    fn from(err: AppError) -> Self {
        match err {
            AppError::NotFound(msg) => AuthorityError::NotFound(msg),
            AppError::DatabaseError(e) => AuthorityError::Transport(e.to_string()),
            other => AuthorityError::Rejected {
                status: other.status_code().as_u16(),
                message: other.to_string(),
            },
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status_code();
        let code = self.code();

        // Log internal details
        self.log();

        // Only expose high-level message to the client
        let public_message = match &self {
            AppError::ValidationError(msg)
            | AppError::InvalidTemplate(msg)
            | AppError::AuthError(msg)
            | AppError::NotFound(msg) => msg.clone(),
            AppError::TicketGenerationFailed { .. } => {
                "Session was created but its tickets could not be stored".to_string()
            }
            AppError::DatabaseError(_) => "A database error occurred".to_string(),
            AppError::InternalServerError(_) => "An internal error occurred".to_string(),
        };

        // The orphaned session id is the one detail a caller needs to recover.
        let details = match &self {
            AppError::TicketGenerationFailed { session_id, .. } => {
                Some(json!({ "session_id": session_id }))
            }
            _ => None,
        };

        error_response(code, public_message, details, status)
    }
}
