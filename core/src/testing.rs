//! In-process authoritative store for unit tests.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use crate::authority::TicketAuthority;
use crate::error::AuthorityError;
use crate::models::{FieldDefinition, FieldType, TemplateSummary, Ticket, TicketFormat, TicketUpdate};

#[derive(Default)]
pub struct MockAuthority {
    tickets: Mutex<HashMap<Uuid, Ticket>>,
    templates: Mutex<HashMap<Uuid, TemplateSummary>>,
    pushed: Mutex<Vec<TicketUpdate>>,
    rejected_codes: Mutex<HashSet<String>>,
    offline: AtomicBool,
    fail_bulk: AtomicBool,
    calls: AtomicUsize,
}

impl MockAuthority {
    pub fn seed_session(&self, session_id: Uuid, codes: &[&str]) -> Uuid {
        let template_id = Uuid::new_v4();
        self.templates.lock().unwrap().insert(
            template_id,
            TemplateSummary {
                id: template_id,
                ticket_format: TicketFormat::Numeric,
                required_user_fields: vec![FieldDefinition::new("Family Size", FieldType::Number)],
            },
        );

        let mut tickets = self.tickets.lock().unwrap();
        for (i, code) in codes.iter().enumerate() {
            let id = Uuid::new_v4();
            tickets.insert(
                id,
                Ticket {
                    id,
                    session_id,
                    template_id,
                    qr_code: code.to_string(),
                    assigned_value: (i + 1).to_string(),
                    user_data: [("family_size".to_string(), serde_json::Value::Null)]
                        .into_iter()
                        .collect(),
                    status: Default::default(),
                    last_scan_timestamp: None,
                },
            );
        }
        template_id
    }

    pub fn tickets_for(&self, session_id: Uuid) -> Vec<Ticket> {
        let mut tickets: Vec<_> = self
            .tickets
            .lock()
            .unwrap()
            .values()
            .filter(|t| t.session_id == session_id)
            .cloned()
            .collect();
        tickets.sort_by_key(|t| t.assigned_value.parse::<u32>().unwrap_or(u32::MAX));
        tickets
    }

    pub fn pushed(&self) -> Vec<TicketUpdate> {
        self.pushed.lock().unwrap().clone()
    }

    /// Pushes for `code` fail until [`MockAuthority::accept`] is called.
    pub fn reject(&self, code: &str) {
        self.rejected_codes.lock().unwrap().insert(code.to_string());
    }

    pub fn accept(&self, code: &str) {
        self.rejected_codes.lock().unwrap().remove(code);
    }

    pub fn go_offline(&self) {
        self.offline.store(true, Ordering::SeqCst);
    }

    pub fn fail_bulk_create(&self) {
        self.fail_bulk.store(true, Ordering::SeqCst);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    fn enter(&self) -> Result<(), AuthorityError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.offline.load(Ordering::SeqCst) {
            return Err(AuthorityError::Transport("network unreachable".to_string()));
        }
        Ok(())
    }
}

#[async_trait]
impl TicketAuthority for MockAuthority {
    async fn fetch_tickets_for_session(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<Ticket>, AuthorityError> {
        self.enter()?;
        Ok(self.tickets_for(session_id))
    }

    async fn fetch_templates(&self, ids: &[Uuid]) -> Result<Vec<TemplateSummary>, AuthorityError> {
        self.enter()?;
        let templates = self.templates.lock().unwrap();
        Ok(ids.iter().filter_map(|id| templates.get(id).cloned()).collect())
    }

    async fn upsert_ticket(&self, update: &TicketUpdate) -> Result<(), AuthorityError> {
        self.enter()?;
        if self.rejected_codes.lock().unwrap().contains(&update.qr_code) {
            return Err(AuthorityError::Rejected {
                status: 409,
                message: format!("ticket {} rejected", update.qr_code),
            });
        }

        let mut tickets = self.tickets.lock().unwrap();
        let ticket = tickets
            .get_mut(&update.id)
            .ok_or_else(|| AuthorityError::NotFound(update.id.to_string()))?;
        ticket.status = update.status;
        ticket.user_data = update.user_data.clone();
        ticket.last_scan_timestamp = update.last_scan_timestamp;
        self.pushed.lock().unwrap().push(update.clone());
        Ok(())
    }

    async fn create_tickets_bulk(&self, tickets: &[Ticket]) -> Result<(), AuthorityError> {
        self.enter()?;
        if self.fail_bulk.load(Ordering::SeqCst) {
            return Err(AuthorityError::Rejected {
                status: 500,
                message: "bulk insert failed".to_string(),
            });
        }
        let mut stored = self.tickets.lock().unwrap();
        for ticket in tickets {
            stored.insert(ticket.id, ticket.clone());
        }
        Ok(())
    }
}
