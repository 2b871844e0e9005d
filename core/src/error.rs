use thiserror::Error;
use uuid::Uuid;

use crate::models::FieldType;

pub type Result<T, E = Error> = std::result::Result<T, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Invalid template configuration: {0}")]
    InvalidTemplateConfig(String),

    /// The session row exists but its ticket batch was not (fully) written.
    #[error("Session {session_id} was created but its {expected} tickets were not stored: {reason}")]
    TicketGenerationFailed {
        session_id: Uuid,
        expected: usize,
        reason: String,
    },

    #[error("Ticket not found: {0}")]
    TicketNotFound(String),

    #[error("Download failed: {0}")]
    DownloadFailed(#[source] AuthorityError),

    #[error("Invalid time '{0}', expected HH:MM")]
    InvalidTime(String),

    #[error("Invalid value '{value}' for a {data_type} field")]
    InvalidFieldValue { data_type: FieldType, value: String },

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Local store error")]
    Store(#[from] sqlx::Error),

    #[error("Local store migration failed")]
    Migration(#[from] sqlx::migrate::MigrateError),

    #[error("Serialization error")]
    Serialization(#[from] serde_json::Error),
}

/// Failures reported by an authoritative store client.
#[derive(Debug, Clone, Error)]
pub enum AuthorityError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("request timed out after {0}s")]
    Timeout(u64),

    #[error("rejected ({status}): {message}")]
    Rejected { status: u16, message: String },

    #[error("record not found: {0}")]
    NotFound(String),

    #[error("malformed response: {0}")]
    Malformed(String),
}
