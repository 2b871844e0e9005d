use chrono::NaiveDate;
use gatepass_core::models::Session;
use sqlx::FromRow;
use uuid::Uuid;

use crate::utils::error::AppError;

#[derive(Debug, Clone, FromRow)]
pub struct SessionRecord {
    pub id: Uuid,
    pub template_id: Uuid,
    pub session_date: NaiveDate,
    pub start_time: String,
    pub end_time: Option<String>,
    pub status: String,
}

impl TryFrom<SessionRecord> for Session {
    type Error = AppError;

    fn try_from(record: SessionRecord) -> Result<Self, Self::Error> {
        Ok(Session {
            id: record.id,
            template_id: record.template_id,
            session_date: record.session_date,
            start_time: record.start_time.parse()?,
            end_time: record.end_time.map(|t| t.parse()).transpose()?,
            status: record.status.parse()?,
        })
    }
}
