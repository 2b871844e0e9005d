use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::error::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TicketStatus {
    #[default]
    Generated,
    Redeemed,
}

impl TicketStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            TicketStatus::Generated => "generated",
            TicketStatus::Redeemed => "redeemed",
        }
    }
}

impl FromStr for TicketStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "generated" => Ok(TicketStatus::Generated),
            "redeemed" => Ok(TicketStatus::Redeemed),
            other => Err(Error::InvalidRecord(format!(
                "unknown ticket status '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for TicketStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The authoritative ticket record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Ticket {
    pub id: Uuid,
    pub session_id: Uuid,
    pub template_id: Uuid,
    pub qr_code: String,
    /// Ticket number ("1", "2", ...) or slot start ("09:30").
    pub assigned_value: String,
    #[serde(default)]
    pub user_data: Map<String, Value>,
    #[serde(default)]
    pub status: TicketStatus,
    pub last_scan_timestamp: Option<DateTime<Utc>>,
}

impl Ticket {
    /// The full-state overwrite pushed to the authoritative store.
    pub fn to_update(&self) -> TicketUpdate {
        TicketUpdate {
            id: self.id,
            qr_code: self.qr_code.clone(),
            status: self.status,
            user_data: self.user_data.clone(),
            last_scan_timestamp: self.last_scan_timestamp,
        }
    }
}

/// A ticket as cached on a scanning device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LocalTicket {
    #[serde(flatten)]
    pub ticket: Ticket,
    /// False once redeemed locally, true again after a successful push.
    pub synced: bool,
}

impl LocalTicket {
    /// A freshly downloaded copy. Any scan time the server holds is dropped.
    pub fn downloaded(mut ticket: Ticket) -> Self {
        ticket.last_scan_timestamp = None;
        Self {
            ticket,
            synced: true,
        }
    }

    pub fn is_dirty(&self) -> bool {
        !self.synced && self.ticket.status == TicketStatus::Redeemed
    }

    /// Marks the ticket redeemed and merges `patch` over its user data.
    /// Redeeming twice keeps the status and refreshes data and timestamp.
    pub fn redeem(&mut self, patch: Map<String, Value>, at: DateTime<Utc>) {
        self.ticket.user_data.extend(patch);
        self.ticket.status = TicketStatus::Redeemed;
        self.ticket.last_scan_timestamp = Some(at);
        self.synced = false;
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TicketUpdate {
    pub id: Uuid,
    pub qr_code: String,
    pub status: TicketStatus,
    pub user_data: Map<String, Value>,
    pub last_scan_timestamp: Option<DateTime<Utc>>,
}
