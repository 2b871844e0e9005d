use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Number, Value};
use uuid::Uuid;

use crate::clock::ClockTime;
use crate::error::{Error, Result};
use crate::slug::slugify;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TicketFormat {
    Numeric,
    TimeAllotted,
}

impl TicketFormat {
    pub fn as_str(self) -> &'static str {
        match self {
            TicketFormat::Numeric => "Numeric",
            TicketFormat::TimeAllotted => "TimeAllotted",
        }
    }
}

impl FromStr for TicketFormat {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "Numeric" => Ok(TicketFormat::Numeric),
            "TimeAllotted" => Ok(TicketFormat::TimeAllotted),
            other => Err(Error::InvalidTemplateConfig(format!(
                "unknown ticket format '{}'",
                other
            ))),
        }
    }
}

impl fmt::Display for TicketFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// How a template turns into tickets. Each variant carries only the
/// settings its allocation model reads.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "ticket_format")]
pub enum TicketAllocation {
    /// Tickets numbered `1..=capacity`.
    Numeric { capacity: u32 },
    /// `total_slots` consecutive slots of `slot_duration` minutes, each with
    /// `capacity_per_slot` tickets.
    TimeAllotted {
        slot_duration: u32,
        total_slots: u32,
        capacity_per_slot: u32,
    },
}

impl TicketAllocation {
    pub fn format(&self) -> TicketFormat {
        match self {
            TicketAllocation::Numeric { .. } => TicketFormat::Numeric,
            TicketAllocation::TimeAllotted { .. } => TicketFormat::TimeAllotted,
        }
    }

    /// Number of tickets one session of this allocation produces.
    ///
    /// Fails instead of returning zero so issuance never silently produces
    /// an empty batch.
    pub fn ticket_count(&self) -> Result<usize> {
        match *self {
            TicketAllocation::Numeric { capacity } => {
                if capacity == 0 {
                    return Err(Error::InvalidTemplateConfig(
                        "numeric capacity must be at least 1".to_string(),
                    ));
                }
                Ok(capacity as usize)
            }
            TicketAllocation::TimeAllotted {
                slot_duration,
                total_slots,
                capacity_per_slot,
            } => {
                if slot_duration == 0 || total_slots == 0 || capacity_per_slot == 0 {
                    return Err(Error::InvalidTemplateConfig(format!(
                        "time slots need a positive duration, slot count and per-slot capacity \
                         (got {} min x {} slots x {} tickets)",
                        slot_duration, total_slots, capacity_per_slot
                    )));
                }
                (total_slots as usize)
                    .checked_mul(capacity_per_slot as usize)
                    .ok_or_else(|| {
                        Error::InvalidTemplateConfig("time slot capacity overflows".to_string())
                    })
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldType {
    Text,
    Number,
    Boolean,
    List,
}

impl FieldType {
    /// Converts operator input into the JSON value stored in `user_data`.
    /// Blank input clears the field.
    pub fn parse_input(self, raw: &str) -> Result<Value> {
        let raw = raw.trim();
        if raw.is_empty() {
            return Ok(Value::Null);
        }

        let invalid = || Error::InvalidFieldValue {
            data_type: self,
            value: raw.to_string(),
        };

        match self {
            FieldType::Number => {
                if let Ok(n) = raw.parse::<i64>() {
                    return Ok(Value::from(n));
                }
                raw.parse::<f64>()
                    .ok()
                    .and_then(Number::from_f64)
                    .map(Value::Number)
                    .ok_or_else(invalid)
            }
            FieldType::Boolean => match raw.to_lowercase().as_str() {
                "true" | "yes" | "y" | "1" => Ok(Value::Bool(true)),
                "false" | "no" | "n" | "0" => Ok(Value::Bool(false)),
                _ => Err(invalid()),
            },
            FieldType::Text | FieldType::List => Ok(Value::String(raw.to_string())),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            FieldType::Text => "text",
            FieldType::Number => "number",
            FieldType::Boolean => "boolean",
            FieldType::List => "list",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldDefinition {
    pub label: String,
    pub data_type: FieldType,
}

impl FieldDefinition {
    pub fn new(label: impl Into<String>, data_type: FieldType) -> Self {
        Self {
            label: label.into(),
            data_type,
        }
    }

    /// The `user_data` key this field is stored under.
    pub fn key(&self) -> String {
        slugify(&self.label)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Template {
    pub id: Uuid,
    pub name: String,
    #[serde(flatten)]
    pub allocation: TicketAllocation,
    /// Default session bounds; only consulted to derive a Numeric duration.
    pub start_time: Option<ClockTime>,
    pub end_time: Option<ClockTime>,
    #[serde(default)]
    pub required_user_fields: Vec<FieldDefinition>,
}

impl Template {
    pub fn format(&self) -> TicketFormat {
        self.allocation.format()
    }

    /// `user_data` for a freshly issued ticket: every field key mapped to
    /// null. Labels that slug to the same key collapse, the last one wins.
    pub fn initial_user_data(&self) -> Map<String, Value> {
        self.required_user_fields
            .iter()
            .map(|field| (field.key(), Value::Null))
            .collect()
    }

    /// Checks a template before it is saved. Stricter than issuance: labels
    /// must produce distinct, non-empty keys.
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(Error::InvalidTemplateConfig("name is required".to_string()));
        }
        self.allocation.ticket_count()?;

        let mut seen: HashMap<String, &str> = HashMap::new();
        for field in &self.required_user_fields {
            let key = field.key();
            if key.is_empty() {
                return Err(Error::InvalidTemplateConfig(format!(
                    "field label '{}' has no usable characters",
                    field.label
                )));
            }
            if let Some(previous) = seen.insert(key.clone(), &field.label) {
                return Err(Error::InvalidTemplateConfig(format!(
                    "field labels '{}' and '{}' both map to key '{}'",
                    previous, field.label, key
                )));
            }
        }
        Ok(())
    }

    pub fn summary(&self) -> TemplateSummary {
        TemplateSummary {
            id: self.id,
            ticket_format: self.format(),
            required_user_fields: self.required_user_fields.clone(),
        }
    }
}

/// The part of a template a scanning device needs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemplateSummary {
    pub id: Uuid,
    pub ticket_format: TicketFormat,
    pub required_user_fields: Vec<FieldDefinition>,
}
