use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;

pub const MINUTES_PER_DAY: u32 = 24 * 60;

/// A wall-clock time of day with minute precision, rendered as "HH:MM".
///
/// Arithmetic wraps within a single 24-hour day; there is no date rollover.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClockTime(u16);

impl ClockTime {
    /// Builds a time from an arbitrary minute count, wrapping modulo one day.
    pub fn from_minutes(minutes: u32) -> Self {
        Self((minutes % MINUTES_PER_DAY) as u16)
    }

    pub fn minutes(self) -> u32 {
        u32::from(self.0)
    }

    pub fn hour(self) -> u32 {
        self.minutes() / 60
    }

    pub fn minute(self) -> u32 {
        self.minutes() % 60
    }

    pub fn add_minutes(self, minutes: u32) -> Self {
        Self::from_minutes(self.minutes() + minutes % MINUTES_PER_DAY)
    }
}

impl FromStr for ClockTime {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let invalid = || Error::InvalidTime(s.to_string());

        // Postgres TIME columns and HTML time inputs may carry seconds.
        let mut parts = s.trim().split(':');
        let hours = parts.next().ok_or_else(invalid)?;
        let minutes = parts.next().ok_or_else(invalid)?;
        if let Some(seconds) = parts.next() {
            if seconds.is_empty() || !seconds.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
        }
        if parts.next().is_some() {
            return Err(invalid());
        }

        let digits = |part: &str| -> Result<u32, Error> {
            if part.is_empty() || part.len() > 2 || !part.bytes().all(|b| b.is_ascii_digit()) {
                return Err(invalid());
            }
            part.parse().map_err(|_| invalid())
        };

        let (h, m) = (digits(hours)?, digits(minutes)?);
        if h > 23 || m > 59 {
            return Err(invalid());
        }

        Ok(Self((h * 60 + m) as u16))
    }
}

impl TryFrom<String> for ClockTime {
    type Error = Error;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<ClockTime> for String {
    fn from(value: ClockTime) -> Self {
        value.to_string()
    }
}

impl fmt::Display for ClockTime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:02}:{:02}", self.hour(), self.minute())
    }
}
