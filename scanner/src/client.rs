//! HTTP client for the gatepass server.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use gatepass_core::models::{TemplateSummary, Ticket, TicketUpdate};
use gatepass_core::{AuthorityError, TicketAuthority};
use reqwest::{Client, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use tracing::debug;
use uuid::Uuid;

#[derive(Deserialize)]
struct Envelope<T> {
    success: bool,
    data: Option<T>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Deserialize)]
struct ErrorBody {
    code: String,
    message: String,
}

/// [`TicketAuthority`] backed by the server's REST API. The bearer token is
/// fixed at construction.
#[derive(Clone)]
pub struct HttpAuthority {
    client: Client,
    base_url: String,
    api_token: Option<String>,
    timeout: Duration,
}

impl HttpAuthority {
    pub fn new(
        base_url: impl Into<String>,
        api_token: Option<String>,
        timeout: Duration,
    ) -> Result<Self, AuthorityError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AuthorityError::Transport(e.to_string()))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_token,
            timeout,
        })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base_url, path.trim_start_matches('/'))
    }

    fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        match &self.api_token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn send(&self, request: RequestBuilder) -> Result<Response, AuthorityError> {
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| self.transport_error(e))?;

        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(status_error(status, &body))
    }

    async fn read<T: DeserializeOwned>(&self, response: Response) -> Result<T, AuthorityError> {
        let body = response
            .text()
            .await
            .map_err(|e| self.transport_error(e))?;
        decode(&body)
    }

    fn transport_error(&self, err: reqwest::Error) -> AuthorityError {
        if err.is_timeout() {
            AuthorityError::Timeout(self.timeout.as_secs())
        } else {
            AuthorityError::Transport(err.to_string())
        }
    }
}

/// Unwraps the `data` of a success envelope.
fn decode<T: DeserializeOwned>(body: &str) -> Result<T, AuthorityError> {
    let envelope: Envelope<T> =
        serde_json::from_str(body).map_err(|e| AuthorityError::Malformed(e.to_string()))?;

    match envelope {
        Envelope {
            success: true,
            data: Some(data),
        } => Ok(data),
        Envelope { success: false, .. } => Err(AuthorityError::Malformed(
            "success response flagged as failed".to_string(),
        )),
        Envelope { data: None, .. } => {
            Err(AuthorityError::Malformed("response has no data".to_string()))
        }
    }
}

fn status_error(status: StatusCode, body: &str) -> AuthorityError {
    let message = match serde_json::from_str::<ErrorEnvelope>(body) {
        Ok(envelope) => format!("{}: {}", envelope.error.code, envelope.error.message),
        Err(_) if body.trim().is_empty() => status.to_string(),
        Err(_) => body.trim().to_string(),
    };

    if status == StatusCode::NOT_FOUND {
        AuthorityError::NotFound(message)
    } else {
        AuthorityError::Rejected {
            status: status.as_u16(),
            message,
        }
    }
}

#[async_trait]
impl TicketAuthority for HttpAuthority {
    async fn fetch_tickets_for_session(
        &self,
        session_id: Uuid,
    ) -> Result<Vec<Ticket>, AuthorityError> {
        let url = self.url(&format!("sessions/{}/tickets", session_id));
        let response = self.send(self.client.get(url)).await?;
        self.read(response).await
    }

    async fn fetch_templates(&self, ids: &[Uuid]) -> Result<Vec<TemplateSummary>, AuthorityError> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }

        let ids = ids
            .iter()
            .map(Uuid::to_string)
            .collect::<Vec<_>>()
            .join(",");
        let request = self.client.get(self.url("templates")).query(&[("ids", ids)]);
        let response = self.send(request).await?;
        self.read(response).await
    }

    async fn upsert_ticket(&self, update: &TicketUpdate) -> Result<(), AuthorityError> {
        let url = self.url(&format!("tickets/{}", update.id));
        self.send(self.client.put(url).json(update)).await?;
        debug!(qr_code = %update.qr_code, "Pushed ticket");
        Ok(())
    }

    /// One request per session; the server only accepts same-session batches.
    async fn create_tickets_bulk(&self, tickets: &[Ticket]) -> Result<(), AuthorityError> {
        let mut by_session: BTreeMap<Uuid, Vec<&Ticket>> = BTreeMap::new();
        for ticket in tickets {
            by_session.entry(ticket.session_id).or_default().push(ticket);
        }

        for (session_id, batch) in by_session {
            let url = self.url(&format!("sessions/{}/tickets", session_id));
            self.send(self.client.post(url).json(&batch)).await?;
        }
        Ok(())
    }
}
