//! Process entry point
//!
//! Loads environment configuration, initializes tracing to stderr, and
//! serves the HTTP API until interrupted. See [`Config::load_from_env`] for
//! the full set of `GMAIL_GATEWAY_*` environment variables.

use std::sync::Arc;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use mail_gmail_http_rs::agent::{AgentRuntime, HttpAgentRuntime};
use mail_gmail_http_rs::config::Config;
use mail_gmail_http_rs::gmail::GmailClient;
use mail_gmail_http_rs::http::{self, AppState};
use mail_gmail_http_rs::session::SessionManager;

/// Command-line options
///
/// Everything else is environment-driven.
#[derive(Debug, Parser)]
#[command(
    name = "mail-gmail-http-rs",
    about = "Gmail HTTP gateway with OAuth sessions"
)]
struct Cli {
    /// Override the configured listen address (e.g., 0.0.0.0:8000)
    #[arg(long)]
    listen: Option<String>,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let mut config = Config::load_from_env()?;
    if let Some(listen) = cli.listen {
        config.listen_addr = listen;
    }
    let config = Arc::new(config);

    let gmail = GmailClient::new(&config)?;
    let sessions = Arc::new(SessionManager::new(config.clone())?);
    let runtime = HttpAgentRuntime::from_config(&config)?
        .map(|runtime| Arc::new(runtime) as Arc<dyn AgentRuntime>);
    if runtime.is_none() {
        tracing::info!("agent runtime not configured; chat endpoint is disabled");
    }

    let app = http::router(AppState {
        config: config.clone(),
        gmail,
        sessions,
        runtime,
    });

    let listener = tokio::net::TcpListener::bind(&config.listen_addr).await?;
    tracing::info!(addr = %config.listen_addr, "gateway listening");
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}

/// Resolve when the process receives an interrupt
async fn shutdown_signal() {
    tokio::signal::ctrl_c().await.ok();
}
