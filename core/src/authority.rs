use std::sync::Arc;

use async_trait::async_trait;
use uuid::Uuid;

use crate::error::AuthorityError;
use crate::models::{TemplateSummary, Ticket, TicketUpdate};

/// Client for the authoritative ticket store.
///
/// Credentials belong to the implementation; the engines only see these
/// four calls.
#[async_trait]
pub trait TicketAuthority: Send + Sync {
    async fn fetch_tickets_for_session(&self, session_id: Uuid)
        -> Result<Vec<Ticket>, AuthorityError>;

    async fn fetch_templates(&self, ids: &[Uuid]) -> Result<Vec<TemplateSummary>, AuthorityError>;

    /// Overwrites the mutable state of one ticket, keyed by `update.id`.
    async fn upsert_ticket(&self, update: &TicketUpdate) -> Result<(), AuthorityError>;

    /// Stores a whole batch; either every ticket is written or none is.
    async fn create_tickets_bulk(&self, tickets: &[Ticket]) -> Result<(), AuthorityError>;
}

#[async_trait]
impl<T: TicketAuthority + ?Sized> TicketAuthority for &T {
    async fn fetch_tickets_for_session(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<Ticket>, AuthorityError> {
        (**self).fetch_tickets_for_session(session_id).await
    }

    async fn fetch_templates(&self, ids: &[Uuid]) -> Result<Vec<TemplateSummary>, AuthorityError> {
        (**self).fetch_templates(ids).await
    }

    async fn upsert_ticket(&self, update: &TicketUpdate) -> Result<(), AuthorityError> {
        (**self).upsert_ticket(update).await
    }

    async fn create_tickets_bulk(&self, tickets: &[Ticket]) -> Result<(), AuthorityError> {
        (**self).create_tickets_bulk(tickets).await
    }
}

#[async_trait]
impl<T: TicketAuthority + ?Sized> TicketAuthority for Arc<T> {
    async fn fetch_tickets_for_session(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<Ticket>, AuthorityError> {
        (**self).fetch_tickets_for_session(session_id).await
    }

    async fn fetch_templates(&self, ids: &[Uuid]) -> Result<Vec<TemplateSummary>, AuthorityError> {
        (**self).fetch_templates(ids).await
    }

    async fn upsert_ticket(&self, update: &TicketUpdate) -> Result<(), AuthorityError> {
        (**self).upsert_ticket(update).await
    }

    async fn create_tickets_bulk(&self, tickets: &[Ticket]) -> Result<(), AuthorityError> {
        (**self).create_tickets_bulk(tickets).await
    }
}
