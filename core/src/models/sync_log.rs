use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// One failed push, kept in the device's append-only sync log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncLogEntry {
    pub timestamp: DateTime<Utc>,
    pub ticket: String,
    pub error: String,
}

impl SyncLogEntry {
    pub fn new(ticket: impl Into<String>, error: impl ToString) -> Self {
        Self {
            timestamp: Utc::now(),
            ticket: ticket.into(),
            error: error.to_string(),
        }
    }
}
