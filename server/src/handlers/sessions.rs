use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use gatepass_core::models::{NewSession, Ticket};
use gatepass_core::TicketIssuer;
use uuid::Uuid;

use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::{created, success};

/// Schedules a session and issues its full ticket batch.
///
/// The session row is written before the batch. If the batch fails the
/// session stays and the error carries its id.
pub async fn create_session(
    State(state): State<AppState>,
    Json(payload): Json<NewSession>,
) -> Result<Response, AppError> {
    let template = state.db.get_template(payload.template_id).await?;

    let issuer = TicketIssuer::new(&state.db);
    let prepared = issuer.prepare(&template, payload)?;

    state.db.insert_session(&prepared.session).await?;
    let issued = issuer.commit(prepared).await?;

    Ok(created(issued, "Session created"))
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let session = state.db.get_session(session_id).await?;
    Ok(success(session, "Session retrieved"))
}

pub async fn session_tickets(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
) -> Result<Response, AppError> {
    let tickets = state.db.session_tickets(session_id).await?;
    tracing::debug!(%session_id, count = tickets.len(), "Serving session tickets");
    Ok(success(tickets, "Tickets retrieved"))
}

/// Bulk insert for a session that already exists.
pub async fn create_tickets(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(tickets): Json<Vec<Ticket>>,
) -> Result<Response, AppError> {
    check_batch(session_id, &tickets)?;
    state.db.get_session(session_id).await?;

    state.db.insert_tickets(&tickets).await?;
    Ok(created(
        serde_json::json!({ "count": tickets.len() }),
        "Tickets created",
    ))
}

fn check_batch(session_id: Uuid, tickets: &[Ticket]) -> Result<(), AppError> {
    if tickets.is_empty() {
        return Err(AppError::ValidationError("Ticket batch is empty".to_string()));
    }
    if let Some(stray) = tickets.iter().find(|t| t.session_id != session_id) {
        return Err(AppError::ValidationError(format!(
            "Ticket '{}' belongs to session '{}'",
            stray.qr_code, stray.session_id
        )));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use gatepass_core::models::TicketStatus;
    use serde_json::Map;

    use super::*;

    fn ticket(session_id: Uuid, code: &str) -> Ticket {
        Ticket {
            id: Uuid::new_v4(),
            session_id,
            template_id: Uuid::new_v4(),
            qr_code: code.to_string(),
            assigned_value: "1".to_string(),
            user_data: Map::new(),
            status: TicketStatus::Generated,
            last_scan_timestamp: None,
        }
    }

    #[test]
    fn test_check_batch() {
        let session_id = Uuid::new_v4();
        assert!(check_batch(session_id, &[ticket(session_id, "AAAAAA")]).is_ok());
        assert!(check_batch(session_id, &[]).is_err());

        let mixed = [ticket(session_id, "AAAAAA"), ticket(Uuid::new_v4(), "BBBBBB")];
        let err = check_batch(session_id, &mixed).unwrap_err();
        assert!(err.to_string().contains("BBBBBB"));
    }
}
