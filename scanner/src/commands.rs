use std::fmt::Write as _;

use anyhow::{anyhow, bail, Context};
use gatepass_core::models::{LocalTicket, SyncLogEntry, TicketStatus};
use gatepass_core::{
    DownloadSummary, ScanEngine, ScanPrompt, SyncEngine, SyncSummary, TicketAuthority,
};
use serde_json::{Map, Value};
use uuid::Uuid;

pub async fn download<A: TicketAuthority>(
    engine: &SyncEngine<A>,
    session_id: Uuid,
) -> anyhow::Result<()> {
    let DownloadSummary { count } = engine
        .download_session(session_id)
        .await
        .with_context(|| format!("Downloading session {}", session_id))?;

    if count == 0 {
        println!("Session {} has no tickets; local cache left unchanged", session_id);
    } else {
        println!("Downloaded {} tickets for session {}", count, session_id);
    }
    Ok(())
}

pub async fn lookup(scanner: &ScanEngine, code: &str) -> anyhow::Result<()> {
    let prompt = scanner.lookup(code).await?;
    print!("{}", render_prompt(&prompt));
    Ok(())
}

pub async fn redeem(
    scanner: &ScanEngine,
    code: &str,
    assignments: &[String],
) -> anyhow::Result<()> {
    let prompt = scanner.lookup(code).await?;
    if prompt.already_redeemed() {
        println!(
            "Ticket {} was already redeemed; recording a correction",
            prompt.ticket.ticket.qr_code
        );
    }

    let patch = parse_assignments(&prompt, assignments)?;
    let ticket = scanner.redeem(code, patch).await?;
    println!(
        "Redeemed {} ({})",
        ticket.ticket.qr_code, ticket.ticket.assigned_value
    );
    Ok(())
}

pub async fn sync<A: TicketAuthority>(engine: &SyncEngine<A>) -> anyhow::Result<()> {
    let summary = engine.sync().await?;
    print!("{}", render_sync(&summary));
    Ok(())
}

pub async fn log<A: TicketAuthority>(engine: &SyncEngine<A>) -> anyhow::Result<()> {
    let entries = engine.store().sync_log().await?;
    print!("{}", render_log(&entries));
    Ok(())
}

pub async fn status<A: TicketAuthority>(engine: &SyncEngine<A>) -> anyhow::Result<()> {
    let store = engine.store();
    let total = store.count().await?;
    let tickets = store.all_tickets().await?;
    print!("{}", render_status(total, &tickets));
    Ok(())
}

/// Turns `key=value` arguments into a typed user-data patch, using the
/// field types from the ticket's template.
pub fn parse_assignments(
    prompt: &ScanPrompt,
    assignments: &[String],
) -> anyhow::Result<Map<String, Value>> {
    let mut patch = Map::new();
    for assignment in assignments {
        let (key, raw) = assignment
            .split_once('=')
            .ok_or_else(|| anyhow!("Expected key=value, got '{}'", assignment))?;
        let key = key.trim();

        let Some(field) = prompt.field(key) else {
            let known: Vec<&str> = prompt.fields.iter().map(|f| f.key.as_str()).collect();
            bail!("Unknown field '{}' (expected one of: {})", key, known.join(", "));
        };

        let value = field
            .data_type
            .parse_input(raw)
            .with_context(|| format!("Field '{}'", field.label))?;
        patch.insert(field.key.clone(), value);
    }
    Ok(patch)
}

fn display_value(value: &Value) -> String {
    match value {
        Value::Null => "-".to_string(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

pub fn render_prompt(prompt: &ScanPrompt) -> String {
    let ticket = &prompt.ticket.ticket;
    let mut out = String::new();
    let _ = writeln!(out, "Ticket   {}", ticket.qr_code);
    let _ = writeln!(out, "Assigned {}", ticket.assigned_value);
    let _ = writeln!(out, "Status   {}", ticket.status);
    if let Some(at) = ticket.last_scan_timestamp {
        let _ = writeln!(out, "Scanned  {}", at.to_rfc3339());
    }
    if prompt.already_redeemed() {
        let _ = writeln!(out, "WARNING: already redeemed");
    }
    for field in &prompt.fields {
        let _ = writeln!(
            out,
            "  {} [{}] ({}): {}",
            field.label,
            field.key,
            field.data_type,
            display_value(&field.value)
        );
    }
    out
}

pub fn render_sync(summary: &SyncSummary) -> String {
    let mut out = String::new();
    if summary.total == 0 {
        let _ = writeln!(out, "Nothing to sync");
        return out;
    }
    let _ = writeln!(
        out,
        "Synced {}/{} tickets ({} failed)",
        summary.success, summary.total, summary.failed
    );
    for entry in &summary.errors {
        let _ = writeln!(out, "  {}: {}", entry.ticket, entry.error);
    }
    out
}

pub fn render_log(entries: &[SyncLogEntry]) -> String {
    if entries.is_empty() {
        return "Sync log is empty\n".to_string();
    }
    let mut out = String::new();
    for entry in entries {
        let _ = writeln!(
            out,
            "{}  {}  {}",
            entry.timestamp.to_rfc3339(),
            entry.ticket,
            entry.error
        );
    }
    out
}

pub fn render_status(total: usize, tickets: &[LocalTicket]) -> String {
    let redeemed = tickets
        .iter()
        .filter(|t| t.ticket.status == TicketStatus::Redeemed)
        .count();
    let pending = tickets.iter().filter(|t| t.is_dirty()).count();
    format!(
        "Tickets  {}\nRedeemed {}\nUnsynced {}\n",
        total, redeemed, pending
    )
}

#[cfg(test)]
mod tests {
    use chrono::Utc;
    use gatepass_core::models::{FieldType, Ticket};
    use gatepass_core::FieldPrompt;
    use serde_json::json;

    use super::*;

    fn ticket(status: TicketStatus, synced: bool) -> LocalTicket {
        LocalTicket {
            ticket: Ticket {
                id: Uuid::new_v4(),
                session_id: Uuid::new_v4(),
                template_id: Uuid::new_v4(),
                qr_code: "AB12CD".to_string(),
                assigned_value: "09:20".to_string(),
                user_data: Map::new(),
                status,
                last_scan_timestamp: None,
            },
            synced,
        }
    }

    fn prompt() -> ScanPrompt {
        ScanPrompt {
            ticket: ticket(TicketStatus::Generated, true),
            fields: vec![
                FieldPrompt {
                    key: "family_size".to_string(),
                    label: "Family Size".to_string(),
                    data_type: FieldType::Number,
                    value: Value::Null,
                },
                FieldPrompt {
                    key: "member".to_string(),
                    label: "Member".to_string(),
                    data_type: FieldType::Boolean,
                    value: Value::Null,
                },
            ],
        }
    }

    #[test]
    fn test_parse_assignments_uses_field_types() {
        let patch = parse_assignments(
            &prompt(),
            &["family_size=4".to_string(), "member=yes".to_string()],
        )
        .unwrap();
        assert_eq!(Value::Object(patch), json!({"family_size": 4, "member": true}));
    }

    #[test]
    fn test_parse_assignments_rejects_bad_input() {
        assert!(parse_assignments(&prompt(), &["family_size".to_string()]).is_err());
        assert!(parse_assignments(&prompt(), &["shoe_size=9".to_string()]).is_err());
        assert!(parse_assignments(&prompt(), &["family_size=lots".to_string()]).is_err());
    }

    #[test]
    fn test_render_prompt_shows_fields() {
        let mut prompt = prompt();
        prompt.fields[0].value = json!(3);
        let out = render_prompt(&prompt);
        assert!(out.contains("Ticket   AB12CD"));
        assert!(out.contains("Family Size [family_size] (number): 3"));
        assert!(out.contains("Member [member] (boolean): -"));
        assert!(!out.contains("WARNING"));
    }

    #[test]
    fn test_render_sync() {
        assert_eq!(render_sync(&SyncSummary::default()), "Nothing to sync\n");

        let summary = SyncSummary {
            total: 3,
            success: 2,
            failed: 1,
            errors: vec![SyncLogEntry {
                timestamp: Utc::now(),
                ticket: "AB12CD".to_string(),
                error: "request timed out after 30s".to_string(),
            }],
        };
        let out = render_sync(&summary);
        assert!(out.starts_with("Synced 2/3 tickets (1 failed)"));
        assert!(out.contains("AB12CD: request timed out after 30s"));
    }

    #[test]
    fn test_render_status_counts_unsynced() {
        let tickets = vec![
            ticket(TicketStatus::Generated, true),
            ticket(TicketStatus::Redeemed, false),
            ticket(TicketStatus::Redeemed, true),
        ];
        assert_eq!(
            render_status(3, &tickets),
            "Tickets  3\nRedeemed 2\nUnsynced 1\n"
        );
    }
}
