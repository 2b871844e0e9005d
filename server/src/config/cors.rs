use axum::http::{header, HeaderValue, Method};
use std::time::Duration;
use tower_http::cors::{AllowOrigin, CorsLayer};

pub const DEFAULT_ALLOWED_ORIGINS: &str = "http://localhost:3000,http://localhost:5173";

const PREFLIGHT_MAX_AGE_SECS: u64 = 86400;

/// Builds the CORS layer for the admin UI. `origins` is a comma-separated
/// list; an empty or fully invalid list falls back to any origin.
pub fn create_cors_layer(origins: &str) -> CorsLayer {
    let layer = CorsLayer::new()
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::OPTIONS])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION, header::ACCEPT])
        .max_age(Duration::from_secs(PREFLIGHT_MAX_AGE_SECS));

    match parse_origins(origins) {
        Some(list) => layer.allow_origin(AllowOrigin::list(list)),
        None => {
            tracing::warn!(
                "CORS: No valid origins configured, using permissive settings for development"
            );
            layer.allow_origin(AllowOrigin::any())
        }
    }
}

fn parse_origins(origins: &str) -> Option<Vec<HeaderValue>> {
    let parsed: Vec<HeaderValue> = origins
        .split(',')
        .map(str::trim)
        .filter(|origin| !origin.is_empty())
        .filter_map(|origin| match origin.parse::<HeaderValue>() {
            Ok(value) => {
                tracing::debug!("CORS: Allowing origin: {}", origin);
                Some(value)
            }
            Err(e) => {
                tracing::warn!("CORS: Invalid origin '{}': {}", origin, e);
                None
            }
        })
        .collect();

    if parsed.is_empty() {
        None
    } else {
        tracing::info!("CORS: Configured with {} allowed origin(s)", parsed.len());
        Some(parsed)
    }
}
