use chrono::{DateTime, Utc};
use gatepass_core::models::Ticket;
use serde_json::{Map, Value};
use sqlx::types::Json;
use sqlx::FromRow;
use uuid::Uuid;

use crate::utils::error::AppError;

#[derive(Debug, Clone, FromRow)]
pub struct TicketRecord {
    pub id: Uuid,
    pub session_id: Uuid,
    pub template_id: Uuid,
    pub qr_code: String,
    pub assigned_value: String,
    pub user_data: Json<Map<String, Value>>,
    pub status: String,
    pub last_scan_timestamp: Option<DateTime<Utc>>,
}

impl TryFrom<TicketRecord> for Ticket {
    type Error = AppError;

    fn try_from(record: TicketRecord) -> Result<Self, Self::Error> {
        Ok(Ticket {
            id: record.id,
            session_id: record.session_id,
            template_id: record.template_id,
            qr_code: record.qr_code,
            assigned_value: record.assigned_value,
            user_data: record.user_data.0,
            status: record.status.parse()?,
            last_scan_timestamp: record.last_scan_timestamp,
        })
    }
}
