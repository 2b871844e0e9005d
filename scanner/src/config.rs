use std::env;
use std::path::PathBuf;
use std::time::Duration;

use anyhow::{bail, Context};

const DEFAULT_SERVER_URL: &str = "http://localhost:3001";
const DEFAULT_LOCAL_DB: &str = "gatepass-scanner.db";
const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 30;

/// Device settings, read from the environment (and `.env`).
#[derive(Debug, Clone, PartialEq)]
pub struct ScannerConfig {
    pub server_url: String,
    pub api_token: Option<String>,
    pub local_db: PathBuf,
    pub request_timeout: Duration,
}

impl ScannerConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> anyhow::Result<Self> {
        let server_url = get("GATEPASS_SERVER_URL")
            .unwrap_or_else(|| DEFAULT_SERVER_URL.to_string())
            .trim_end_matches('/')
            .to_string();
        if !server_url.starts_with("http://") && !server_url.starts_with("https://") {
            bail!("GATEPASS_SERVER_URL must be an http(s) URL, got '{}'", server_url);
        }

        let request_timeout = match get("GATEPASS_REQUEST_TIMEOUT_SECS") {
            Some(raw) => {
                let secs: u64 = raw
                    .trim()
                    .parse()
                    .with_context(|| format!("Invalid GATEPASS_REQUEST_TIMEOUT_SECS '{}'", raw))?;
                if secs == 0 {
                    bail!("GATEPASS_REQUEST_TIMEOUT_SECS must be positive");
                }
                secs
            }
            None => DEFAULT_REQUEST_TIMEOUT_SECS,
        };

        Ok(Self {
            server_url,
            api_token: get("GATEPASS_API_TOKEN").filter(|t| !t.trim().is_empty()),
            local_db: get("GATEPASS_LOCAL_DB")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_LOCAL_DB)),
            request_timeout: Duration::from_secs(request_timeout),
        })
    }
}
