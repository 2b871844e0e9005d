use std::fmt;
use std::str::FromStr;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock::ClockTime;
use crate::error::Error;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    #[default]
    Scheduled,
    Open,
    Full,
    Completed,
    Cancelled,
}

impl SessionStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SessionStatus::Scheduled => "scheduled",
            SessionStatus::Open => "open",
            SessionStatus::Full => "full",
            SessionStatus::Completed => "completed",
            SessionStatus::Cancelled => "cancelled",
        }
    }

    /// Whether tickets are normally redeemed in this state. Advisory only;
    /// redemption itself does not check it.
    pub fn accepts_redemption(self) -> bool {
        matches!(self, SessionStatus::Open | SessionStatus::Full)
    }
}

impl FromStr for SessionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "scheduled" => Ok(SessionStatus::Scheduled),
            "open" => Ok(SessionStatus::Open),
            "full" => Ok(SessionStatus::Full),
            "completed" => Ok(SessionStatus::Completed),
            "cancelled" => Ok(SessionStatus::Cancelled),
            other => Err(Error::InvalidRecord(format!(
                "unknown session status '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Session-creation input handed over by the scheduling layer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewSession {
    pub template_id: Uuid,
    pub session_date: NaiveDate,
    pub start_time: ClockTime,
    #[serde(default)]
    pub status: SessionStatus,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub template_id: Uuid,
    pub session_date: NaiveDate,
    pub start_time: ClockTime,
    /// Derived from the template at creation time.
    pub end_time: Option<ClockTime>,
    pub status: SessionStatus,
}
