use axum::extract::{Request, State};
use axum::http::header::AUTHORIZATION;
use axum::middleware::Next;
use axum::response::Response;

use crate::state::AppState;
use crate::utils::error::AppError;

/// Rejects requests whose `Authorization: Bearer` token does not match the
/// configured API token. Passes everything through when no token is set.
pub async fn require_token(
    State(state): State<AppState>,
    request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let Some(expected) = state.api_token.as_deref() else {
        return Ok(next.run(request).await);
    };

    let presented = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|value| value.to_str().ok())
        .and_then(bearer_token);

    match presented {
        Some(token) if token == expected => Ok(next.run(request).await),
        Some(_) => Err(AppError::AuthError("Invalid API token".to_string())),
        None => Err(AppError::AuthError("Missing bearer token".to_string())),
    }
}

fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}
