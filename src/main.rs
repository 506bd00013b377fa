// src/main.rs
// linear-fast - unified Linear MCP gateway

mod cli;

use anyhow::Result;
use clap::Parser;
use tracing::Level;
use tracing_subscriber::FmtSubscriber;

use cli::{Cli, Commands};

#[tokio::main]
async fn main() -> Result<()> {
    // Load .env from ~/.linear-fast/.env only (never from CWD - a malicious
    // repo could override the upstream command)
    if let Some(home) = dirs::home_dir()
        && let Err(e) = dotenvy::from_path(home.join(".linear-fast/.env"))
    {
        tracing::debug!("Failed to load global .env file: {}", e);
    }

    let cli = Cli::parse();

    // Logging goes to stderr; stdout belongs to the MCP stdio transport.
    // LINEAR_FAST_LOG overrides the quiet default.
    let level = match std::env::var("LINEAR_FAST_LOG")
        .unwrap_or_default()
        .to_lowercase()
        .as_str()
    {
        "error" => Level::ERROR,
        "info" => Level::INFO,
        "debug" => Level::DEBUG,
        "trace" => Level::TRACE,
        _ => Level::WARN,
    };
    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_writer(std::io::stderr)
        .with_ansi(false)
        .finish();
    let _ = tracing::subscriber::set_global_default(subscriber);

    match cli.command {
        None | Some(Commands::Serve) => cli::run_mcp_server().await?,
        Some(Commands::Health) => cli::run_health().await?,
    }

    Ok(())
}
