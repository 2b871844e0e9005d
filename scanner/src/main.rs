// Door-side scanner: offline redemption against a local ticket cache

use anyhow::Context;
use clap::{Parser, Subcommand};
use dotenvy::dotenv;
use gatepass_core::{LocalStore, ScanEngine, SyncEngine};
use tracing_subscriber::EnvFilter;
use uuid::Uuid;

mod client;
mod commands;
mod config;

use client::HttpAuthority;
use config::ScannerConfig;

#[derive(Parser)]
#[command(name = "gatepass-scanner")]
#[command(about = "Gatepass scanner - offline ticket redemption", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Replace the local cache with one session's tickets
    Download {
        /// Session ID (UUID)
        session_id: Uuid,
    },

    /// Show a ticket and its attendee fields
    Lookup {
        /// Ticket code
        code: String,
    },

    /// Redeem a ticket, optionally filling in attendee fields
    Redeem {
        /// Ticket code
        code: String,

        /// Field value (field_key=value), repeatable
        #[arg(short, long = "set", value_name = "KEY=VALUE")]
        set: Vec<String>,
    },

    /// Push redeemed tickets to the server
    Sync,

    /// Show recorded sync failures
    Log,

    /// Show local cache counts
    Status,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenv().ok();
    let cli = Cli::parse();

    let default_filter = if cli.verbose {
        "gatepass_scanner=debug,gatepass_core=debug"
    } else {
        "gatepass_scanner=warn,gatepass_core=warn"
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)),
        )
        .with_writer(std::io::stderr)
        .init();

    let config = ScannerConfig::from_env()?;
    let store = LocalStore::open(&config.local_db)
        .await
        .with_context(|| format!("Opening local store at {}", config.local_db.display()))?;

    let authority = HttpAuthority::new(
        config.server_url.clone(),
        config.api_token.clone(),
        config.request_timeout,
    )?;
    let engine =
        SyncEngine::new(store.clone(), authority).with_request_timeout(config.request_timeout);
    let scanner = ScanEngine::new(store.clone());

    let result = match cli.command {
        Commands::Download { session_id } => commands::download(&engine, session_id).await,
        Commands::Lookup { code } => commands::lookup(&scanner, &code).await,
        Commands::Redeem { code, set } => commands::redeem(&scanner, &code, &set).await,
        Commands::Sync => commands::sync(&engine).await,
        Commands::Log => commands::log(&engine).await,
        Commands::Status => commands::status(&engine).await,
    };

    store.close().await;
    result
}
