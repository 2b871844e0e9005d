use gatepass_core::models::{
    FieldDefinition, Template, TicketAllocation, TicketFormat,
};
use gatepass_core::ClockTime;
use serde::Deserialize;
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::utils::error::AppError;

/// Flattened storage shape of a template: one nullable column per
/// allocation setting.
#[derive(Debug, Clone, FromRow)]
pub struct TemplateRecord {
    pub id: Uuid,
    pub name: String,
    pub ticket_format: String,
    pub capacity: Option<i32>,
    pub slot_duration: Option<i32>,
    pub total_slots: Option<i32>,
    pub capacity_per_slot: Option<i32>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub required_user_fields: Json<Vec<FieldDefinition>>,
}

impl TemplateRecord {
    pub fn from_template(template: &Template) -> Self {
        let (capacity, slot_duration, total_slots, capacity_per_slot) = match template.allocation {
            TicketAllocation::Numeric { capacity } => (Some(capacity), None, None, None),
            TicketAllocation::TimeAllotted {
                slot_duration,
                total_slots,
                capacity_per_slot,
            } => (
                None,
                Some(slot_duration),
                Some(total_slots),
                Some(capacity_per_slot),
            ),
        };
        let column = |v: Option<u32>| v.map(|v| i32::try_from(v).unwrap_or(i32::MAX));

        Self {
            id: template.id,
            name: template.name.clone(),
            ticket_format: template.format().as_str().to_string(),
            capacity: column(capacity),
            slot_duration: column(slot_duration),
            total_slots: column(total_slots),
            capacity_per_slot: column(capacity_per_slot),
            start_time: template.start_time.map(|t| t.to_string()),
            end_time: template.end_time.map(|t| t.to_string()),
            required_user_fields: Json(template.required_user_fields.clone()),
        }
    }
}

fn setting(name: &str, value: Option<i32>) -> Result<u32, AppError> {
    value
        .and_then(|v| u32::try_from(v).ok())
        .ok_or_else(|| AppError::InvalidTemplate(format!("{} is missing or negative", name)))
}

fn clock(value: Option<String>) -> Result<Option<ClockTime>, AppError> {
    value.map(|v| v.parse::<ClockTime>()).transpose().map_err(AppError::from)
}

impl TryFrom<TemplateRecord> for Template {
    type Error = AppError;

    fn try_from(record: TemplateRecord) -> Result<Self, Self::Error> {
        let allocation = match record.ticket_format.parse::<TicketFormat>()? {
            TicketFormat::Numeric => TicketAllocation::Numeric {
                capacity: setting("capacity", record.capacity)?,
            },
            TicketFormat::TimeAllotted => TicketAllocation::TimeAllotted {
                slot_duration: setting("slot_duration", record.slot_duration)?,
                total_slots: setting("total_slots", record.total_slots)?,
                capacity_per_slot: setting("capacity_per_slot", record.capacity_per_slot)?,
            },
        };

        Ok(Template {
            id: record.id,
            name: record.name,
            allocation,
            start_time: clock(record.start_time)?,
            end_time: clock(record.end_time)?,
            required_user_fields: record.required_user_fields.0,
        })
    }
}

/// Body of `POST /templates`.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateTemplate {
    pub name: String,
    #[serde(flatten)]
    pub allocation: TicketAllocation,
    pub start_time: Option<ClockTime>,
    pub end_time: Option<ClockTime>,
    #[serde(default)]
    pub required_user_fields: Vec<FieldDefinition>,
}

impl CreateTemplate {
    pub fn into_template(self) -> Template {
        Template {
            id: Uuid::new_v4(),
            name: self.name.trim().to_string(),
            allocation: self.allocation,
            start_time: self.start_time,
            end_time: self.end_time,
            required_user_fields: self.required_user_fields,
        }
    }
}
