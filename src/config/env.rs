// src/config/env.rs
// Environment-based configuration - single source of truth for all env vars

use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::time::Duration;

use serde_json::Value;
use tracing::{info, warn};

use crate::error::{LinearFastError, Result};

pub const DEFAULT_OFFICIAL_MCP_URL: &str = "https://mcp.linear.app/mcp";
pub const DEFAULT_NOTION_MCP_URL: &str = "https://mcp.notion.com/mcp";
pub const DEFAULT_STDIO_COMMAND: &str = "npx";
pub const DEFAULT_STDIO_ARGS_PREFIX: [&str; 2] = ["-y", "mcp-remote"];

const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(300);
const DEFAULT_IDLE_REFRESH_THRESHOLD: Duration = Duration::from_secs(60);
const DEFAULT_COHERENCE_WINDOW: Duration = Duration::from_secs(30);

/// How the official MCP session reaches the upstream server.
/// Fixed at construction; an invalid value is a startup error, not a fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Stdio,
    Http,
}

impl Transport {
    pub fn as_str(&self) -> &'static str {
        match self {
            Transport::Stdio => "stdio",
            Transport::Http => "http",
        }
    }

    fn parse(raw: &str) -> Result<Self> {
        match raw.to_lowercase().as_str() {
            "stdio" => Ok(Transport::Stdio),
            "http" => Ok(Transport::Http),
            _ => Err(LinearFastError::Config(
                "LINEAR_OFFICIAL_MCP_TRANSPORT must be one of: stdio, http".to_string(),
            )),
        }
    }
}

/// Connection settings for the official Linear MCP upstream.
///
/// The stdio default launches the `mcp-remote` OAuth bridge so existing
/// browser-based login flows are reused without custom token plumbing.
#[derive(Debug, Clone)]
pub struct OfficialMcpConfig {
    pub transport: Transport,
    pub url: String,
    pub headers: Option<HashMap<String, String>>,
    pub command: String,
    pub args: Vec<String>,
    pub env: Option<HashMap<String, String>>,
    pub cwd: Option<String>,
    /// Total HTTP connect/request timeout.
    pub timeout: Duration,
    pub sse_read_timeout: Duration,
    /// Per-request read timeout; individual calls are bounded by this + 10 s.
    pub read_timeout: Duration,
}

impl OfficialMcpConfig {
    pub fn from_env() -> Result<Self> {
        let transport = match read_env("LINEAR_OFFICIAL_MCP_TRANSPORT") {
            Some(raw) => Transport::parse(&raw)?,
            None => Transport::Stdio,
        };
        let url =
            read_env("LINEAR_OFFICIAL_MCP_URL").unwrap_or_else(|| DEFAULT_OFFICIAL_MCP_URL.into());
        let command =
            read_env("LINEAR_OFFICIAL_MCP_COMMAND").unwrap_or_else(|| DEFAULT_STDIO_COMMAND.into());
        let args = parse_stdio_args(read_env("LINEAR_OFFICIAL_MCP_ARGS").as_deref(), &url);
        let headers = read_env("LINEAR_OFFICIAL_MCP_HEADERS")
            .and_then(|raw| parse_string_map(&raw, "LINEAR_OFFICIAL_MCP_HEADERS"));
        let env = read_env("LINEAR_OFFICIAL_MCP_ENV")
            .and_then(|raw| parse_string_map(&raw, "LINEAR_OFFICIAL_MCP_ENV"));
        let cwd = read_env("LINEAR_OFFICIAL_MCP_CWD");

        Ok(Self {
            transport,
            url,
            headers,
            command,
            args,
            env,
            cwd,
            timeout: Duration::from_secs(30),
            sse_read_timeout: Duration::from_secs(300),
            read_timeout: Duration::from_secs(30),
        })
    }

    /// Stdio-bridge config for a given upstream URL with all defaults.
    pub fn for_url(url: impl Into<String>) -> Self {
        let url = url.into();
        let args = parse_stdio_args(None, &url);
        Self {
            transport: Transport::Stdio,
            url,
            headers: None,
            command: DEFAULT_STDIO_COMMAND.into(),
            args,
            env: None,
            cwd: None,
            timeout: Duration::from_secs(30),
            sse_read_timeout: Duration::from_secs(300),
            read_timeout: Duration::from_secs(30),
        }
    }
}

/// Settings for the local cache reader.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// IndexedDB LevelDB directory of the Linear desktop app.
    pub db_path: PathBuf,
    /// Sibling blob directory.
    pub blob_path: PathBuf,
    pub ttl: Duration,
    pub idle_refresh_threshold: Duration,
    /// Load heavy document bodies (off by default).
    pub load_document_content: bool,
    /// Allowed account emails (lowercased). Empty = no email scoping.
    pub account_emails: HashSet<String>,
    /// Allowed userAccountIds. Empty = no id scoping.
    pub user_account_ids: HashSet<String>,
}

impl CacheConfig {
    pub fn from_env() -> Self {
        let mut cfg = Self::default();
        cfg.ttl = parse_secs_env("LINEAR_FAST_CACHE_TTL_SECONDS", DEFAULT_CACHE_TTL);
        cfg.idle_refresh_threshold = parse_secs_env(
            "LINEAR_FAST_IDLE_REFRESH_SECONDS",
            DEFAULT_IDLE_REFRESH_THRESHOLD,
        );
        cfg.load_document_content =
            parse_bool_env("LINEAR_FAST_LOAD_DOCUMENT_CONTENT").unwrap_or(false);
        cfg.account_emails = parse_set_env("LINEAR_FAST_ACCOUNT_EMAILS", "LINEAR_FAST_ACCOUNT_EMAIL")
            .into_iter()
            .map(|e| e.to_lowercase())
            .collect();
        cfg.user_account_ids =
            parse_set_env("LINEAR_FAST_USER_ACCOUNT_IDS", "LINEAR_FAST_USER_ACCOUNT_ID")
                .into_iter()
                .collect();
        cfg
    }

    /// Config pointed at explicit database paths, otherwise defaults.
    pub fn for_paths(db_path: impl Into<PathBuf>, blob_path: impl Into<PathBuf>) -> Self {
        Self {
            db_path: db_path.into(),
            blob_path: blob_path.into(),
            ..Self::default()
        }
    }

    /// Account scoping is active when either allow-set is configured.
    pub fn scope_enabled(&self) -> bool {
        !self.account_emails.is_empty() || !self.user_account_ids.is_empty()
    }
}

impl Default for CacheConfig {
    fn default() -> Self {
        let support = dirs::home_dir()
            .unwrap_or_default()
            .join("Library/Application Support/Linear/IndexedDB");
        Self {
            db_path: support.join("https_linear.app_0.indexeddb.leveldb"),
            blob_path: support.join("https_linear.app_0.indexeddb.blob"),
            ttl: DEFAULT_CACHE_TTL,
            idle_refresh_threshold: DEFAULT_IDLE_REFRESH_THRESHOLD,
            load_document_content: false,
            account_emails: HashSet::new(),
            user_account_ids: HashSet::new(),
        }
    }
}

/// Environment configuration - all env vars in one place
#[derive(Debug, Clone)]
pub struct EnvConfig {
    pub official: OfficialMcpConfig,
    pub cache: CacheConfig,
    /// Window after a write during which reads prefer the upstream.
    pub coherence_window: Duration,
    /// Secondary service URL for combined re-auth.
    pub notion_url: String,
}

impl EnvConfig {
    /// Load all environment configuration (call once at startup).
    /// An invalid transport is the only fatal input; everything else
    /// logs and falls back to its default.
    pub fn load() -> Result<Self> {
        info!("Loading environment configuration");

        Ok(Self {
            official: OfficialMcpConfig::from_env()?,
            cache: CacheConfig::from_env(),
            coherence_window: parse_secs_env(
                "LINEAR_FAST_COHERENCE_WINDOW_SECONDS",
                DEFAULT_COHERENCE_WINDOW,
            ),
            notion_url: read_env("NOTION_OFFICIAL_MCP_URL")
                .unwrap_or_else(|| DEFAULT_NOTION_MCP_URL.into()),
        })
    }
}

fn read_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|v| !v.trim().is_empty())
}

fn parse_bool_env(name: &str) -> Option<bool> {
    let value = std::env::var(name).ok()?.to_lowercase();
    match value.as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

fn parse_secs_env(name: &str, default: Duration) -> Duration {
    match read_env(name) {
        Some(raw) => match raw.parse::<f64>() {
            Ok(secs) if secs >= 0.0 => Duration::from_secs_f64(secs),
            _ => {
                warn!(var = name, value = %raw, "Ignoring invalid duration value");
                default
            }
        },
        None => default,
    }
}

/// Parse a JSON object env var into a string map, stringifying scalar values.
/// Invalid JSON is logged and ignored.
fn parse_string_map(raw: &str, var: &str) -> Option<HashMap<String, String>> {
    match serde_json::from_str::<Value>(raw) {
        Ok(Value::Object(map)) => Some(
            map.into_iter()
                .map(|(k, v)| match v {
                    Value::String(s) => (k, s),
                    other => (k, other.to_string()),
                })
                .collect(),
        ),
        _ => {
            warn!(var = var, "Ignoring invalid JSON object value");
            None
        }
    }
}

/// Parse stdio bridge args. A JSON array gives exact argument boundaries;
/// otherwise the value is split shell-style; anything unparsable falls back
/// to the default `mcp-remote` invocation.
fn parse_stdio_args(raw: Option<&str>, default_url: &str) -> Vec<String> {
    let default = || {
        DEFAULT_STDIO_ARGS_PREFIX
            .iter()
            .map(|s| s.to_string())
            .chain(std::iter::once(default_url.to_string()))
            .collect()
    };

    let Some(raw) = raw.map(str::trim).filter(|r| !r.is_empty()) else {
        return default();
    };

    if let Ok(Value::Array(items)) = serde_json::from_str::<Value>(raw) {
        return items
            .into_iter()
            .map(|item| match item {
                Value::String(s) => s,
                other => other.to_string(),
            })
            .collect();
    }

    match shell_words::split(raw) {
        Ok(args) => args,
        Err(_) => {
            warn!("Ignoring invalid LINEAR_OFFICIAL_MCP_ARGS value; using default args");
            default()
        }
    }
}

/// Read a comma-separated plural env var plus a singular variant.
fn parse_set_env(plural: &str, singular: &str) -> Vec<String> {
    let mut values = Vec::new();
    if let Some(raw) = read_env(plural) {
        values.extend(
            raw.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(String::from),
        );
    }
    if let Some(single) = read_env(singular) {
        let single = single.trim().to_string();
        if !single.is_empty() && !values.contains(&single) {
            values.push(single);
        }
    }
    values
}
