// src/session/mod.rs
// Official Linear MCP client session manager.
//
// Maintains one long-lived MCP client session with reconnect and
// single-retry semantics for transient failures. The default transport is
// the official `mcp-remote` stdio bridge so existing OAuth flows are reused
// without custom token plumbing.

pub mod reauth;

use std::process::Stdio;
use std::sync::Mutex;
use std::time::Duration;

use rmcp::model::{CallToolRequestParams, CallToolResult, ClientInfo};
use rmcp::service::{Peer, RunningService};
use rmcp::transport::StreamableHttpClientTransport;
use rmcp::transport::child_process::TokioChildProcess;
use rmcp::transport::streamable_http_client::StreamableHttpClientTransportConfig;
use rmcp::{RoleClient, serve_client};
use serde_json::{Value, json};
use tokio::process::Command;
use tracing::{debug, info, warn};

use crate::config::{OfficialMcpConfig, Transport};
use crate::error::OfficialToolError;
use crate::util::now_ts;

/// A connected upstream session.
/// The `RunningService` must stay alive: dropping it cancels the transport
/// and kills the bridge child process.
struct ConnectedSession {
    peer: Peer<RoleClient>,
    _service: RunningService<RoleClient, ClientInfo>,
}

#[derive(Debug, Default)]
struct SessionStats {
    connected: bool,
    failure_count: u32,
    last_error: Option<String>,
    last_failure_at: Option<f64>,
    last_connected_at: Option<f64>,
}

/// Internal failure split: semantic errors propagate unchanged, transport
/// failures are retried once and then tagged `official_unavailable`.
enum CallFailure {
    Semantic(OfficialToolError),
    Transport(String),
}

/// Shared session to the official Linear MCP server.
///
/// All calls are serialized by the session mutex - the underlying session is
/// not safe for concurrent use, and serialization is simpler than per-call
/// session cloning.
pub struct OfficialSessionManager {
    config: OfficialMcpConfig,
    session: tokio::sync::Mutex<Option<ConnectedSession>>,
    stats: Mutex<SessionStats>,
}

impl OfficialSessionManager {
    pub fn new(config: OfficialMcpConfig) -> Self {
        Self {
            config,
            session: tokio::sync::Mutex::new(None),
            stats: Mutex::new(SessionStats::default()),
        }
    }

    pub fn url(&self) -> &str {
        &self.config.url
    }

    /// Whether the bridge has cached OAuth tokens for this session's URL.
    pub fn has_cached_tokens(&self) -> bool {
        reauth::has_cached_tokens(&self.config.url)
    }

    fn stats(&self) -> std::sync::MutexGuard<'_, SessionStats> {
        self.stats.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn record_failure(&self, message: &str) {
        warn!(error = %message, "Official MCP call failed");
        let mut stats = self.stats();
        stats.failure_count += 1;
        stats.last_error = Some(message.to_string());
        stats.last_failure_at = Some(now_ts());
    }

    fn record_success(&self) {
        let mut stats = self.stats();
        stats.failure_count = 0;
        stats.last_error = None;
    }

    /// Eagerly open the session (used at startup after a reconnect request).
    pub async fn ensure_connected(&self) -> Result<(), OfficialToolError> {
        let mut session = self.session.lock().await;
        self.connect_locked(&mut session)
            .await
            .map_err(OfficialToolError::unavailable)
    }

    async fn connect_locked(
        &self,
        session: &mut Option<ConnectedSession>,
    ) -> Result<(), String> {
        if session.is_some() {
            return Ok(());
        }

        let client_info = ClientInfo {
            meta: None,
            protocol_version: Default::default(),
            capabilities: Default::default(),
            client_info: rmcp::model::Implementation {
                name: "linear-fast".into(),
                title: Some("Linear Fast MCP Gateway".into()),
                version: env!("CARGO_PKG_VERSION").into(),
                icons: None,
                website_url: None,
            },
        };

        let service = match self.config.transport {
            Transport::Stdio => {
                info!(
                    command = %self.config.command,
                    args = ?self.config.args,
                    "Spawning official MCP bridge process"
                );

                let mut cmd = Command::new(&self.config.command);
                cmd.args(&self.config.args);
                if let Some(cwd) = &self.config.cwd {
                    cmd.current_dir(cwd);
                }
                if let Some(env) = &self.config.env {
                    for (key, value) in env {
                        cmd.env(key, value);
                    }
                }
                cmd.stdin(Stdio::piped())
                    .stdout(Stdio::piped())
                    .stderr(Stdio::null());

                let transport = TokioChildProcess::new(cmd)
                    .map_err(|e| format!("failed to spawn official MCP bridge: {e}"))?;

                serve_client(client_info, transport)
                    .await
                    .map_err(|e| format!("failed to initialize official MCP session: {e}"))?
            }
            Transport::Http => {
                info!(url = %self.config.url, "Connecting to official MCP over HTTP");

                let mut transport_config =
                    StreamableHttpClientTransportConfig::with_uri(self.config.url.as_str());
                if let Some(headers) = &self.config.headers {
                    // The transport config only supports bearer auth; other
                    // headers cannot be attached per-request.
                    if let Some(auth) = headers.get("Authorization") {
                        transport_config = transport_config.auth_header(auth.clone());
                    }
                    if headers.keys().any(|k| k != "Authorization") {
                        warn!(
                            "Only the Authorization header is applied to the official MCP HTTP transport"
                        );
                    }
                }

                let transport = StreamableHttpClientTransport::from_config(transport_config);
                serve_client(client_info, transport)
                    .await
                    .map_err(|e| format!("failed to initialize official MCP HTTP session: {e}"))?
            }
        };

        let peer = service.peer().clone();
        *session = Some(ConnectedSession {
            peer,
            _service: service,
        });

        let mut stats = self.stats();
        stats.connected = true;
        stats.last_connected_at = Some(now_ts());
        Ok(())
    }

    /// Tear down the current session. Dropping the running service cancels
    /// the transport; cancellation noise is expected here, so failures
    /// surface at debug only.
    async fn disconnect_locked(&self, session: &mut Option<ConnectedSession>) {
        if session.take().is_some() {
            debug!("Official MCP session disconnected");
        }
        self.stats().connected = false;
    }

    /// Best-effort disconnect without holding a caller lock.
    pub async fn close(&self) {
        let mut session = self.session.lock().await;
        self.disconnect_locked(&mut session).await;
    }

    /// Call one official tool. Semantic tool errors propagate unchanged;
    /// transport failures tear the session down and get one retry.
    pub async fn call_tool(
        &self,
        name: &str,
        arguments: Value,
    ) -> Result<Value, OfficialToolError> {
        let mut session = self.session.lock().await;

        for attempt in 0..2 {
            match self.call_tool_once(&mut session, name, arguments.clone()).await {
                Ok(value) => {
                    self.record_success();
                    return Ok(value);
                }
                Err(CallFailure::Semantic(err)) => {
                    // Do not degrade semantic tool errors into transport failures.
                    return Err(err);
                }
                Err(CallFailure::Transport(message)) => {
                    self.record_failure(&message);
                    self.disconnect_locked(&mut session).await;
                    if attempt == 1 {
                        return Err(OfficialToolError::unavailable(format!(
                            "official MCP call failed for tool '{name}': {message}"
                        )));
                    }
                }
            }
        }

        Err(OfficialToolError::unavailable("official MCP unavailable"))
    }

    async fn call_tool_once(
        &self,
        session: &mut Option<ConnectedSession>,
        name: &str,
        arguments: Value,
    ) -> Result<Value, CallFailure> {
        self.connect_locked(session)
            .await
            .map_err(CallFailure::Transport)?;
        let Some(connected) = session.as_ref() else {
            return Err(CallFailure::Transport(
                "official MCP session unavailable".to_string(),
            ));
        };

        let params = CallToolRequestParams {
            meta: None,
            name: name.to_string().into(),
            arguments: match arguments {
                Value::Object(map) => Some(map),
                Value::Null => None,
                _ => None,
            },
            task: None,
        };

        let result = tokio::time::timeout(
            self.call_deadline(),
            connected.peer.call_tool(params),
        )
        .await
        .map_err(|_| {
            CallFailure::Transport(format!(
                "official MCP call timed out after {}s",
                self.call_deadline().as_secs()
            ))
        })?
        .map_err(|e| CallFailure::Transport(e.to_string()))?;

        normalize_result(result)
    }

    /// Calls are bounded by the read timeout plus slack for transport setup.
    fn call_deadline(&self) -> Duration {
        self.config.read_timeout + Duration::from_secs(10)
    }

    /// Tool names currently available upstream, with the same retry
    /// semantics as `call_tool`.
    pub async fn list_tools(&self) -> Result<Vec<String>, OfficialToolError> {
        let mut session = self.session.lock().await;

        for attempt in 0..2 {
            let outcome = async {
                self.connect_locked(&mut session).await?;
                let Some(connected) = session.as_ref() else {
                    return Err("official MCP session unavailable".to_string());
                };
                tokio::time::timeout(self.call_deadline(), connected.peer.list_all_tools())
                    .await
                    .map_err(|_| "official MCP list_tools timed out".to_string())?
                    .map_err(|e| e.to_string())
            }
            .await;

            match outcome {
                Ok(tools) => {
                    self.record_success();
                    return Ok(tools.into_iter().map(|t| t.name.to_string()).collect());
                }
                Err(message) => {
                    self.record_failure(&message);
                    self.disconnect_locked(&mut session).await;
                    if attempt == 1 {
                        return Err(OfficialToolError::unavailable(format!(
                            "official MCP list_tools failed: {message}"
                        )));
                    }
                }
            }
        }

        Ok(Vec::new())
    }

    pub fn get_health(&self) -> Value {
        let stats = self.stats();
        let mut health = json!({
            "transport": self.config.transport.as_str(),
            "url": self.config.url,
            "connected": stats.connected,
            "failureCount": stats.failure_count,
            "lastError": stats.last_error,
            "lastFailureAt": stats.last_failure_at,
            "lastConnectedAt": stats.last_connected_at,
        });
        if let Some(map) = health.as_object_mut() {
            match self.config.transport {
                Transport::Stdio => {
                    map.insert("command".into(), json!(self.config.command));
                    map.insert("args".into(), json!(self.config.args));
                }
                Transport::Http => {
                    map.insert("hasHeaders".into(), json!(self.config.headers.is_some()));
                }
            }
        }
        health
    }

    /// Disconnect and clear this session's OAuth token cache so the next
    /// call triggers a fresh login flow. Disconnect failures are ignored;
    /// the deleted-file count reflects what was actually removed.
    pub async fn reauth(&self) -> Value {
        self.close().await;
        let report = reauth::clear_token_cache_for_url(&self.config.url);
        info!(
            url_hash = %report.url_hash,
            deleted = report.deleted_files,
            "Cleared official MCP token cache"
        );
        report.to_value(
            "reauth_triggered",
            "cleared cached OAuth tokens; next call will re-authenticate",
        )
    }

    /// SIGTERM prep: clear own tokens and leave the reconnect sentinel so
    /// the next process eagerly re-connects before serving the first call.
    pub async fn prepare_reconnect(&self) {
        self.close().await;
        let _ = reauth::clear_token_cache_for_url(&self.config.url);
        reauth::write_reconnect_sentinel();
    }
}

fn extract_text(result: &CallToolResult) -> String {
    result
        .content
        .iter()
        .filter_map(|block| block.as_text().map(|t| t.text.to_string()))
        .filter(|t| !t.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
        .trim()
        .to_string()
}

/// Normalize a tool result: `isError` becomes a semantic error; otherwise
/// prefer structured content, then text parsed as JSON, then wrapped text,
/// then the raw result shape.
fn normalize_result(result: CallToolResult) -> Result<Value, CallFailure> {
    if result.is_error.unwrap_or(false) {
        let text = extract_text(&result);
        let message = if text.is_empty() {
            "official MCP returned an error".to_string()
        } else {
            text
        };
        return Err(CallFailure::Semantic(OfficialToolError::tool_error(message)));
    }

    if let Some(structured) = result.structured_content.clone() {
        return Ok(structured);
    }

    let text = extract_text(&result);
    if !text.is_empty() {
        return Ok(serde_json::from_str(&text).unwrap_or_else(|_| json!({ "text": text })));
    }

    Ok(serde_json::to_value(&result).unwrap_or(Value::Null))
}
