use chrono::Utc;
use serde::Serialize;
use serde_json::{Map, Value};
use tracing::{info, warn};

use crate::codegen::normalize_code;
use crate::error::{Error, Result};
use crate::models::{FieldType, LocalTicket, TicketStatus};
use crate::storage::LocalStore;

/// One user-data field to show the operator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldPrompt {
    pub key: String,
    pub label: String,
    pub data_type: FieldType,
    pub value: Value,
}

/// A looked-up ticket and the fields the operator should fill in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScanPrompt {
    pub ticket: LocalTicket,
    pub fields: Vec<FieldPrompt>,
}

impl ScanPrompt {
    pub fn already_redeemed(&self) -> bool {
        self.ticket.ticket.status == TicketStatus::Redeemed
    }

    pub fn field(&self, key: &str) -> Option<&FieldPrompt> {
        self.fields.iter().find(|f| f.key == key)
    }
}

/// Redemption workflow. Works entirely against the local store.
#[derive(Clone)]
pub struct ScanEngine {
    store: LocalStore,
}

impl ScanEngine {
    pub fn new(store: LocalStore) -> Self {
        Self { store }
    }

    async fn find(&self, code: &str) -> Result<LocalTicket> {
        let code = normalize_code(code);
        self.store
            .get(&code)
            .await?
            .ok_or(Error::TicketNotFound(code))
    }

    /// Finds a ticket and lists its fields with their current values.
    ///
    /// Fields come from the cached template in its declared order. Without
    /// a cached template every existing `user_data` key is offered as text.
    pub async fn lookup(&self, code: &str) -> Result<ScanPrompt> {
        let ticket = self.find(code).await?;
        let user_data = &ticket.ticket.user_data;

        let fields = match self.store.get_template(ticket.ticket.template_id).await? {
            Some(template) => {
                let mut fields: Vec<FieldPrompt> = Vec::new();
                for definition in template.required_user_fields {
                    let key = definition.key();
                    let prompt = FieldPrompt {
                        value: user_data.get(&key).cloned().unwrap_or(Value::Null),
                        key,
                        label: definition.label,
                        data_type: definition.data_type,
                    };
                    // Colliding labels share one key; the last definition wins.
                    match fields.iter_mut().find(|f| f.key == prompt.key) {
                        Some(existing) => *existing = prompt,
                        None => fields.push(prompt),
                    }
                }
                fields
            }
            None => {
                warn!(
                    template_id = %ticket.ticket.template_id,
                    "Template not cached, showing raw ticket fields"
                );
                user_data
                    .iter()
                    .map(|(key, value)| FieldPrompt {
                        key: key.clone(),
                        label: key.clone(),
                        data_type: FieldType::Text,
                        value: value.clone(),
                    })
                    .collect()
            }
        };

        Ok(ScanPrompt { ticket, fields })
    }

    /// Redeems a ticket, merging `patch` over its user data.
    ///
    /// Re-redeeming is allowed for corrections; the status stays redeemed.
    pub async fn redeem(&self, code: &str, patch: Map<String, Value>) -> Result<LocalTicket> {
        let mut ticket = self.find(code).await?;
        let was_redeemed = ticket.ticket.status == TicketStatus::Redeemed;

        ticket.redeem(patch, Utc::now());
        self.store.put(&ticket).await?;

        info!(
            code = %ticket.ticket.qr_code,
            assigned = %ticket.ticket.assigned_value,
            correction = was_redeemed,
            "Ticket redeemed"
        );
        Ok(ticket)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use serde_json::json;
    use uuid::Uuid;

    use super::*;
    use crate::testing::MockAuthority;

    async fn engine_with(codes: &[&str]) -> (ScanEngine, LocalStore) {
        let store = LocalStore::open_in_memory().await.unwrap();
        let authority = MockAuthority::default();
        let session = Uuid::new_v4();
        authority.seed_session(session, codes);
        store
            .download(&authority, session, Duration::from_secs(5))
            .await
            .unwrap();
        (ScanEngine::new(store.clone()), store)
    }

    fn patch(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[tokio::test]
    async fn test_redeem_generated_ticket() {
        let (engine, store) = engine_with(&["AAA111"]).await;

        let redeemed = engine
            .redeem("AAA111", patch(json!({"family_size": 3})))
            .await
            .unwrap();

        assert_eq!(redeemed.ticket.status, TicketStatus::Redeemed);
        assert!(!redeemed.synced);
        assert!(redeemed.ticket.last_scan_timestamp.is_some());
        assert_eq!(store.get("AAA111").await.unwrap().unwrap(), redeemed);
    }

    #[tokio::test]
    async fn test_second_redeem_updates_data_but_keeps_status() {
        let (engine, _store) = engine_with(&["AAA111"]).await;

        let first = engine
            .redeem("AAA111", patch(json!({"family_size": 3})))
            .await
            .unwrap();
        tokio::time::sleep(Duration::from_millis(5)).await;
        let second = engine
            .redeem("AAA111", patch(json!({"family_size": 5})))
            .await
            .unwrap();

        assert_eq!(second.ticket.status, TicketStatus::Redeemed);
        assert_eq!(second.ticket.user_data["family_size"], json!(5));
        assert!(second.ticket.last_scan_timestamp > first.ticket.last_scan_timestamp);
    }

    #[tokio::test]
    async fn test_unknown_code_is_not_found() {
        let (engine, _store) = engine_with(&["AAA111"]).await;

        let err = engine.redeem("ZZZ999", Map::new()).await.unwrap_err();
        assert!(matches!(err, Error::TicketNotFound(code) if code == "ZZZ999"));
        assert!(matches!(
            engine.lookup("zzz999").await,
            Err(Error::TicketNotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_lookup_normalizes_typed_codes() {
        let (engine, _store) = engine_with(&["AAA111"]).await;

        let prompt = engine.lookup(" aaa111 ").await.unwrap();
        assert_eq!(prompt.ticket.ticket.qr_code, "AAA111");
        assert!(!prompt.already_redeemed());
    }

    #[tokio::test]
    async fn test_lookup_renders_template_fields() {
        let (engine, _store) = engine_with(&["AAA111"]).await;
        engine
            .redeem("AAA111", patch(json!({"family_size": 2})))
            .await
            .unwrap();

        let prompt = engine.lookup("AAA111").await.unwrap();
        let field = prompt.field("family_size").unwrap();
        assert_eq!(field.label, "Family Size");
        assert_eq!(field.data_type, FieldType::Number);
        assert_eq!(field.value, json!(2));
        assert!(prompt.already_redeemed());
    }
}
