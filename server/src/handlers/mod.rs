use axum::response::Response;
use serde::Serialize;

use crate::utils::response::success;

pub mod sessions;
pub mod templates;
pub mod tickets;

pub use sessions::{create_session, create_tickets, get_session, session_tickets};
pub use templates::{create_template, list_templates};
pub use tickets::update_ticket;

#[derive(Serialize)]
struct HealthPayload {
    status: &'static str,
    service: &'static str,
}

pub async fn health_check() -> Response {
    let payload = HealthPayload {
        status: "ok",
        service: "gatepass-api",
    };

    success(payload, "Health check successful")
}
