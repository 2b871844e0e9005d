use axum::extract::{Path, State};
use axum::response::Response;
use axum::Json;
use gatepass_core::models::TicketUpdate;
use uuid::Uuid;

use crate::state::AppState;
use crate::utils::error::AppError;
use crate::utils::response::empty_success;

/// Overwrites a ticket with the state a scanner pushed.
pub async fn update_ticket(
    State(state): State<AppState>,
    Path(ticket_id): Path<Uuid>,
    Json(update): Json<TicketUpdate>,
) -> Result<Response, AppError> {
    if update.id != ticket_id {
        return Err(AppError::ValidationError(format!(
            "Body id '{}' does not match path id '{}'",
            update.id, ticket_id
        )));
    }

    state.db.update_ticket(&update).await?;
    tracing::info!(
        %ticket_id,
        qr_code = %update.qr_code,
        status = %update.status,
        "Ticket updated"
    );

    Ok(empty_success("Ticket updated"))
}
