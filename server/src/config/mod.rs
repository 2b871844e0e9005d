use std::env;
use std::net::SocketAddr;

pub mod auth;
pub mod cors;
pub mod security;

pub use auth::require_token;
pub use cors::create_cors_layer;
pub use security::apply_security_headers;

const DEFAULT_DATABASE_URL: &str = "postgres://localhost/gatepass";
const DEFAULT_PORT: u16 = 3001;
const DEFAULT_MAX_CONNECTIONS: u32 = 5;

#[derive(Debug, Clone)]
pub struct Config {
    pub database_url: String,
    pub bind_addr: SocketAddr,
    pub max_connections: u32,
    pub api_token: Option<String>,
    pub cors_origins: String,
    /// HSTS is only sent in production (HTTPS) deployments.
    pub production: bool,
}

impl Config {
    pub fn from_env() -> Self {
        let bind_addr = env::var("GATEPASS_BIND_ADDR")
            .ok()
            .and_then(|addr| match addr.parse() {
                Ok(addr) => Some(addr),
                Err(e) => {
                    tracing::warn!("Config: Invalid GATEPASS_BIND_ADDR '{}': {}", addr, e);
                    None
                }
            })
            .unwrap_or_else(|| SocketAddr::from(([0, 0, 0, 0], DEFAULT_PORT)));

        let max_connections = env::var("DATABASE_MAX_CONNECTIONS")
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(DEFAULT_MAX_CONNECTIONS);

        let api_token = env::var("GATEPASS_API_TOKEN")
            .ok()
            .filter(|token| !token.trim().is_empty());
        if api_token.is_none() {
            tracing::warn!("Config: GATEPASS_API_TOKEN not set, API routes are unauthenticated");
        }

        Self {
            database_url: env::var("DATABASE_URL")
                .unwrap_or_else(|_| DEFAULT_DATABASE_URL.to_string()),
            bind_addr,
            max_connections,
            api_token,
            cors_origins: env::var("CORS_ALLOWED_ORIGINS")
                .unwrap_or_else(|_| cors::DEFAULT_ALLOWED_ORIGINS.to_string()),
            production: env::var("RUST_ENV")
                .map(|v| v.to_lowercase() == "production")
                .unwrap_or(false),
        }
    }
}
