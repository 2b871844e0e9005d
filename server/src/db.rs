//! Postgres access for templates, sessions and tickets.
//!
//! [`Database`] is also the server-side [`TicketAuthority`], which is what
//! the issuer writes ticket batches through.

use async_trait::async_trait;
use gatepass_core::models::{Session, Template, TemplateSummary, Ticket, TicketUpdate};
use gatepass_core::{AuthorityError, TicketAuthority};
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use tracing::debug;
use uuid::Uuid;

use crate::models::{SessionRecord, TemplateRecord, TicketRecord};
use crate::utils::error::AppError;

/// Rows per INSERT statement; keeps bind parameters under Postgres' limit.
const INSERT_CHUNK: usize = 1_000;

const TEMPLATE_COLUMNS: &str = "id, name, ticket_format, capacity, slot_duration, total_slots, \
     capacity_per_slot, start_time, end_time, required_user_fields";

const TICKET_COLUMNS: &str =
    "id, session_id, template_id, qr_code, assigned_value, user_data, status, last_scan_timestamp";

#[derive(Clone)]
pub struct Database {
    pool: PgPool,
}

impl Database {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn insert_template(&self, template: &Template) -> Result<(), AppError> {
        let record = TemplateRecord::from_template(template);
        sqlx::query(&format!(
            "INSERT INTO templates ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)",
            TEMPLATE_COLUMNS
        ))
        .bind(record.id)
        .bind(&record.name)
        .bind(&record.ticket_format)
        .bind(record.capacity)
        .bind(record.slot_duration)
        .bind(record.total_slots)
        .bind(record.capacity_per_slot)
        .bind(&record.start_time)
        .bind(&record.end_time)
        .bind(&record.required_user_fields)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_template(&self, id: Uuid) -> Result<Template, AppError> {
        let record = sqlx::query_as::<_, TemplateRecord>(&format!(
            "SELECT {} FROM templates WHERE id = $1",
            TEMPLATE_COLUMNS
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Template with id '{}' was not found", id)))?;

        Template::try_from(record)
    }

    pub async fn template_summaries(&self, ids: &[Uuid]) -> Result<Vec<TemplateSummary>, AppError> {
        let records = sqlx::query_as::<_, TemplateRecord>(&format!(
            "SELECT {} FROM templates WHERE id = ANY($1) ORDER BY name",
            TEMPLATE_COLUMNS
        ))
        .bind(ids)
        .fetch_all(&self.pool)
        .await?;

        records
            .into_iter()
            .map(|record| Template::try_from(record).map(|t| t.summary()))
            .collect()
    }

    pub async fn insert_session(&self, session: &Session) -> Result<(), AppError> {
        sqlx::query(
            "INSERT INTO sessions (id, template_id, session_date, start_time, end_time, status) \
             VALUES ($1, $2, $3, $4, $5, $6)",
        )
        .bind(session.id)
        .bind(session.template_id)
        .bind(session.session_date)
        .bind(session.start_time.to_string())
        .bind(session.end_time.map(|t| t.to_string()))
        .bind(session.status.as_str())
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    pub async fn get_session(&self, id: Uuid) -> Result<Session, AppError> {
        let record = sqlx::query_as::<_, SessionRecord>(
            "SELECT id, template_id, session_date, start_time, end_time, status \
             FROM sessions WHERE id = $1",
        )
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Session with id '{}' was not found", id)))?;

        Session::try_from(record)
    }

    pub async fn session_tickets(&self, session_id: Uuid) -> Result<Vec<Ticket>, AppError> {
        let records = sqlx::query_as::<_, TicketRecord>(&format!(
            "SELECT {} FROM tickets WHERE session_id = $1 ORDER BY created_at, assigned_value",
            TICKET_COLUMNS
        ))
        .bind(session_id)
        .fetch_all(&self.pool)
        .await?;

        records.into_iter().map(Ticket::try_from).collect()
    }

    /// Inserts a batch in one transaction, so it lands entirely or not at all.
    pub async fn insert_tickets(&self, tickets: &[Ticket]) -> Result<(), AppError> {
        let mut tx = self.pool.begin().await?;

        for chunk in tickets.chunks(INSERT_CHUNK) {
            let mut builder: QueryBuilder<Postgres> =
                QueryBuilder::new(format!("INSERT INTO tickets ({}) ", TICKET_COLUMNS));
            builder.push_values(chunk, |mut row, ticket| {
                row.push_bind(ticket.id)
                    .push_bind(ticket.session_id)
                    .push_bind(ticket.template_id)
                    .push_bind(&ticket.qr_code)
                    .push_bind(&ticket.assigned_value)
                    .push_bind(Json(&ticket.user_data))
                    .push_bind(ticket.status.as_str())
                    .push_bind(ticket.last_scan_timestamp);
            });
            builder.build().execute(&mut *tx).await?;
        }

        tx.commit().await?;
        debug!(count = tickets.len(), "Inserted ticket batch");
        Ok(())
    }

    /// Overwrites a ticket's mutable state.
    pub async fn update_ticket(&self, update: &TicketUpdate) -> Result<(), AppError> {
        let result = sqlx::query(
            "UPDATE tickets \
             SET status = $2, user_data = $3, last_scan_timestamp = $4, updated_at = NOW() \
             WHERE id = $1",
        )
        .bind(update.id)
        .bind(update.status.as_str())
        .bind(Json(&update.user_data))
        .bind(update.last_scan_timestamp)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(AppError::NotFound(format!(
                "Ticket with id '{}' was not found",
                update.id
            )));
        }
        Ok(())
    }
}

#[async_trait]
impl TicketAuthority for Database {
    async fn fetch_tickets_for_session(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<Ticket>, AuthorityError> {
        Ok(self.session_tickets(session_id).await?)
    }

    async fn fetch_templates(&self, ids: &[Uuid]) -> Result<Vec<TemplateSummary>, AuthorityError> {
        Ok(self.template_summaries(ids).await?)
    }

    async fn upsert_ticket(&self, update: &TicketUpdate) -> Result<(), AuthorityError> {
        Ok(self.update_ticket(update).await?)
    }

    async fn create_tickets_bulk(&self, tickets: &[Ticket]) -> Result<(), AuthorityError> {
        Ok(self.insert_tickets(tickets).await?)
    }
}
