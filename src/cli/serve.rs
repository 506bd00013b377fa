// src/cli/serve.rs
// MCP server initialization and main loop

use std::sync::Arc;

use anyhow::Result;
use linear_fast::config::EnvConfig;
use linear_fast::mcp::LinearFastServer;
use linear_fast::session::{OfficialSessionManager, reauth};
use tracing::{info, warn};

/// Run the MCP server with stdio transport.
pub async fn run_mcp_server() -> Result<()> {
    let config = EnvConfig::load()?;
    let server = LinearFastServer::new(&config);

    // Load the local cache up front; a failed load starts the server
    // degraded rather than refusing to serve.
    {
        let reader = server.reader.clone();
        let init = tokio::task::spawn_blocking(move || reader.refresh_cache(true)).await?;
        if let Err(e) = init {
            warn!(error = %e, "Cache init failed, starting degraded");
        }
    }

    // A reconnect sentinel (left by SIGTERM) or cached OAuth tokens mean the
    // upstream can come up without user action, so connect eagerly instead
    // of waiting for the first call.
    let reconnecting = reauth::take_reconnect_sentinel();
    if reconnecting || server.official.has_cached_tokens() {
        if let Err(e) = server.official.ensure_connected().await {
            warn!(error = %e, "Official MCP connection failed");
        }
    }

    spawn_sigterm_handler(server.official.clone());

    let transport = rmcp::transport::io::stdio();
    let service = rmcp::serve_server(server, transport).await?;
    service.waiting().await?;

    Ok(())
}

/// On SIGTERM: clear tokens + write the reconnect flag so the next start
/// re-authenticates eagerly, then shut down.
fn spawn_sigterm_handler(official: Arc<OfficialSessionManager>) {
    #[cfg(unix)]
    tokio::spawn(async move {
        use tokio::signal::unix::{SignalKind, signal};
        let Ok(mut sigterm) = signal(SignalKind::terminate()) else {
            return;
        };
        if sigterm.recv().await.is_some() {
            info!("SIGTERM received; preparing reconnect and shutting down");
            official.prepare_reconnect().await;
            std::process::exit(0);
        }
    });
    #[cfg(not(unix))]
    let _ = official;
}

/// Print the merged gateway health without serving.
pub async fn run_health() -> Result<()> {
    let config = EnvConfig::load()?;
    let server = LinearFastServer::new(&config);
    println!(
        "{}",
        serde_json::to_string_pretty(&server.router.get_health())?
    );
    Ok(())
}
