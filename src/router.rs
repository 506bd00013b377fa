// src/router.rs
// Tool routing policy for unified local-fast + official Linear MCP access.

use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value, json};
use tracing::{error, warn};

use crate::error::{FallbackReason, HandlerError, OfficialToolError};
use crate::session::OfficialSessionManager;
use crate::session::reauth;
use crate::util::now_ts;

/// Tool-name prefixes treated as writes (unless a local read handler with
/// that name is registered).
pub const WRITE_TOOL_PREFIXES: &[&str] = &[
    "create_",
    "update_",
    "delete_",
    "archive_",
    "unarchive_",
    "set_",
    "add_",
    "remove_",
    "move_",
];

/// Local cache side of the router: freshness signals and the read-handler
/// dispatch table.
#[async_trait]
pub trait LocalBackend: Send + Sync {
    /// Record a tool call for idle-gap staleness tracking.
    fn ensure_fresh(&self);

    fn is_degraded(&self) -> bool;

    fn has_handler(&self, tool_name: &str) -> bool;

    async fn call(
        &self,
        tool_name: &str,
        arguments: &Map<String, Value>,
    ) -> Result<Value, HandlerError>;

    /// Force a full reload.
    async fn refresh(&self) -> Result<(), String>;

    fn get_health(&self) -> Value;
}

/// Upstream side of the router.
#[async_trait]
pub trait Upstream: Send + Sync {
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, OfficialToolError>;

    async fn list_tools(&self) -> Result<Vec<String>, OfficialToolError>;

    fn get_health(&self) -> Value;

    async fn reauth(&self) -> Value;
}

#[async_trait]
impl Upstream for OfficialSessionManager {
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, OfficialToolError> {
        OfficialSessionManager::call_tool(self, name, arguments).await
    }

    async fn list_tools(&self) -> Result<Vec<String>, OfficialToolError> {
        OfficialSessionManager::list_tools(self).await
    }

    fn get_health(&self) -> Value {
        OfficialSessionManager::get_health(self)
    }

    async fn reauth(&self) -> Value {
        OfficialSessionManager::reauth(self).await
    }
}

/// Routes tool calls between local cache handlers and the official MCP.
///
/// After a write, reads prefer the upstream for a coherence window so
/// read-your-writes lag in the local snapshot is masked.
pub struct ToolRouter {
    local: Arc<dyn LocalBackend>,
    official: Arc<dyn Upstream>,
    coherence_window: Duration,
    notion_url: String,
    remote_reads_until: Mutex<f64>,
}

impl ToolRouter {
    pub fn new(
        local: Arc<dyn LocalBackend>,
        official: Arc<dyn Upstream>,
        coherence_window: Duration,
        notion_url: String,
    ) -> Self {
        Self {
            local,
            official,
            coherence_window,
            notion_url,
            remote_reads_until: Mutex::new(0.0),
        }
    }

    fn deadline(&self) -> MutexGuard<'_, f64> {
        self.remote_reads_until
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn mark_recent_write(&self) {
        *self.deadline() = now_ts() + self.coherence_window.as_secs_f64();
    }

    fn read_remote_first(&self) -> bool {
        now_ts() < *self.deadline()
    }

    fn is_probable_write_tool(&self, tool_name: &str) -> bool {
        if self.local.has_handler(tool_name) {
            return false;
        }
        WRITE_TOOL_PREFIXES
            .iter()
            .any(|prefix| tool_name.starts_with(prefix))
    }

    async fn call_local(
        &self,
        tool_name: &str,
        arguments: &Map<String, Value>,
        allow_degraded: bool,
    ) -> Result<Value, HandlerError> {
        if !self.local.has_handler(tool_name) {
            return Err(HandlerError::fallback(
                FallbackReason::UnsupportedTool,
                format!("tool '{tool_name}' not implemented in local cache"),
            ));
        }
        if self.local.is_degraded() && !allow_degraded {
            return Err(HandlerError::fallback(
                FallbackReason::DegradedLocal,
                "local cache is degraded",
            ));
        }
        self.local.call(tool_name, arguments).await
    }

    /// Unconditional upstream call. Successful writes open the coherence
    /// window for subsequent reads.
    pub async fn call_official(
        &self,
        tool_name: &str,
        arguments: Value,
    ) -> Result<Value, OfficialToolError> {
        self.local.ensure_fresh();
        let result = self.official.call_tool(tool_name, arguments).await?;
        if self.is_probable_write_tool(tool_name) {
            self.mark_recent_write();
        }
        Ok(result)
    }

    /// Read path: local when safe, upstream inside the coherence window or
    /// when the cache cannot serve the call, stale local as a last resort.
    pub async fn call_read(
        &self,
        tool_name: &str,
        arguments: Value,
    ) -> Result<Value, OfficialToolError> {
        self.local.ensure_fresh();
        let args = into_map(arguments);
        let mut remote_error: Option<OfficialToolError> = None;

        if self.read_remote_first() {
            match self
                .call_official(tool_name, Value::Object(args.clone()))
                .await
            {
                Ok(value) => return Ok(value),
                Err(err) if err.is_semantic() => return Err(err),
                Err(err) => {
                    warn!(
                        tool = tool_name,
                        "Remote-first read failed, falling back to local"
                    );
                    remote_error = Some(err);
                }
            }
        }

        match self.call_local(tool_name, &args, false).await {
            Ok(value) => Ok(value),
            Err(HandlerError::Fallback { reason, .. }) => {
                if let Some(remote_err) = remote_error {
                    if reason == FallbackReason::DegradedLocal {
                        warn!(
                            tool = tool_name,
                            "Returning stale local because remote failed during remote-first window"
                        );
                        return match self.call_local(tool_name, &args, true).await {
                            Ok(value) => Ok(mark_stale(value)),
                            Err(_) => Err(remote_err),
                        };
                    }
                    return Err(remote_err);
                }

                match self
                    .call_official(tool_name, Value::Object(args.clone()))
                    .await
                {
                    Ok(value) => Ok(value),
                    Err(err) if err.is_semantic() => Err(err),
                    Err(err) => {
                        if reason == FallbackReason::DegradedLocal {
                            // When remote is unavailable, a stale local read
                            // is better than a hard failure.
                            warn!(
                                tool = tool_name,
                                "Returning stale local because remote is unavailable and local is degraded"
                            );
                            match self.call_local(tool_name, &args, true).await {
                                Ok(value) => Ok(mark_stale(value)),
                                Err(_) => Err(err),
                            }
                        } else {
                            Err(err)
                        }
                    }
                }
            }
            Err(HandlerError::Internal(message)) => {
                error!(tool = tool_name, error = %message, "Unexpected local error");
                self.call_official(tool_name, Value::Object(args)).await
            }
        }
    }

    /// Force a local reload and return the local health state.
    pub async fn refresh_local_cache(&self) -> Result<Value, String> {
        self.local.refresh().await?;
        Ok(self.local.get_health())
    }

    pub async fn list_official_tools(&self) -> Result<Vec<String>, OfficialToolError> {
        self.official.list_tools().await
    }

    pub fn get_health(&self) -> Value {
        json!({
            "local": self.local.get_health(),
            "official": self.official.get_health(),
            "remoteReadUntil": *self.deadline(),
            "coherenceWindowSeconds": self.coherence_window.as_secs_f64(),
        })
    }

    pub async fn reauth_official(&self) -> Value {
        self.official.reauth().await
    }

    /// Clear the Notion MCP token cache so its next call re-authenticates.
    pub fn reauth_notion(&self) -> Value {
        let report = reauth::clear_token_cache_for_url(&self.notion_url);
        report.to_value(
            "reauth_triggered",
            "cleared cached Notion OAuth tokens; next Notion MCP call will re-authenticate",
        )
    }

    pub async fn reauth_all(&self) -> Value {
        json!({
            "linear": self.reauth_official().await,
            "notion": self.reauth_notion(),
        })
    }
}

fn into_map(arguments: Value) -> Map<String, Value> {
    match arguments {
        Value::Object(map) => map,
        _ => Map::new(),
    }
}

/// Decorate a degraded-local fallback payload. Mappings gain a `_metadata`
/// key; lists are wrapped under `results`. Fresh responses are never
/// decorated.
fn mark_stale(value: Value) -> Value {
    let metadata = json!({ "stale": true });
    match value {
        Value::Object(mut map) => {
            map.insert("_metadata".to_string(), metadata);
            Value::Object(map)
        }
        Value::Array(items) => json!({
            "results": items,
            "_metadata": metadata,
        }),
        other => other,
    }
}
