// src/session/reauth.rs
// OAuth token-cache clearing for mcp-remote bridged sessions.
//
// mcp-remote caches tokens per upstream URL in versioned directories under
// ~/.mcp-auth/. Clearing the three files for a URL forces the next connect
// to run the browser OAuth flow again.

use std::path::{Path, PathBuf};

use serde_json::{Value, json};
use tracing::debug;

/// File suffixes mcp-remote writes per URL hash.
const TOKEN_FILE_SUFFIXES: &[&str] = &["_tokens.json", "_client_info.json", "_code_verifier.txt"];

/// Zero-byte flag consumed at startup to force an eager reconnect.
const RECONNECT_SENTINEL_NAME: &str = "oh-my-linear-reconnect";

/// md5 hex of the upstream URL; names the token cache files.
pub fn url_hash(url: &str) -> String {
    format!("{:x}", md5::compute(url.as_bytes()))
}

/// What a token-cache sweep touched.
#[derive(Debug, Clone)]
pub struct TokenCacheReport {
    pub url_hash: String,
    pub deleted_files: usize,
    pub searched_dirs: Vec<PathBuf>,
}

impl TokenCacheReport {
    pub fn to_value(&self, status: &str, message: &str) -> Value {
        json!({
            "status": status,
            "message": message,
            "urlHash": self.url_hash,
            "deletedFiles": self.deleted_files,
            "searchedDirs": self
                .searched_dirs
                .iter()
                .map(|p| p.display().to_string())
                .collect::<Vec<_>>(),
        })
    }
}

/// All mcp-remote version directories under `<home>/.mcp-auth`, sorted.
/// The bridge version is not pinned, so every version dir is searched.
pub fn find_token_cache_dirs_in(home: &Path) -> Vec<PathBuf> {
    let mcp_auth = home.join(".mcp-auth");
    let Ok(entries) = std::fs::read_dir(&mcp_auth) else {
        return Vec::new();
    };

    let mut dirs: Vec<PathBuf> = entries
        .flatten()
        .map(|entry| entry.path())
        .filter(|path| {
            path.is_dir()
                && path
                    .file_name()
                    .and_then(|n| n.to_str())
                    .is_some_and(|n| n.starts_with("mcp-remote-"))
        })
        .collect();
    dirs.sort();
    dirs
}

pub fn find_token_cache_dirs() -> Vec<PathBuf> {
    dirs::home_dir()
        .map(|home| find_token_cache_dirs_in(&home))
        .unwrap_or_default()
}

/// Delete exactly the three token files for a URL in every version dir.
/// File errors are non-fatal; the returned counter reflects what was
/// actually removed.
pub fn clear_token_cache_for_url_in(home: &Path, url: &str) -> TokenCacheReport {
    let hash = url_hash(url);
    let searched_dirs = find_token_cache_dirs_in(home);
    let mut deleted_files = 0;

    for dir in &searched_dirs {
        for suffix in TOKEN_FILE_SUFFIXES {
            let path = dir.join(format!("{hash}{suffix}"));
            if path.exists() {
                match std::fs::remove_file(&path) {
                    Ok(()) => deleted_files += 1,
                    Err(e) => debug!(path = %path.display(), error = %e, "Token file removal failed"),
                }
            }
        }
    }

    TokenCacheReport {
        url_hash: hash,
        deleted_files,
        searched_dirs,
    }
}

/// Clear the token cache of any service URL (used by combined re-auth).
pub fn clear_token_cache_for_url(url: &str) -> TokenCacheReport {
    match dirs::home_dir() {
        Some(home) => clear_token_cache_for_url_in(&home, url),
        None => TokenCacheReport {
            url_hash: url_hash(url),
            deleted_files: 0,
            searched_dirs: Vec::new(),
        },
    }
}

/// Whether mcp-remote has a cached token for this URL in some version dir.
pub fn has_cached_tokens_in(home: &Path, url: &str) -> bool {
    let hash = url_hash(url);
    find_token_cache_dirs_in(home)
        .iter()
        .any(|dir| dir.join(format!("{hash}_tokens.json")).exists())
}

pub fn has_cached_tokens(url: &str) -> bool {
    dirs::home_dir()
        .map(|home| has_cached_tokens_in(&home, url))
        .unwrap_or(false)
}

/// Path of the reconnect sentinel in the OS temp dir.
pub fn reconnect_sentinel_path() -> PathBuf {
    std::env::temp_dir().join(RECONNECT_SENTINEL_NAME)
}

/// Write the sentinel so the next startup eagerly reconnects (and thereby
/// triggers the OAuth flow) before serving the first call.
pub fn write_reconnect_sentinel() {
    let path = reconnect_sentinel_path();
    if let Err(e) = std::fs::File::create(&path) {
        debug!(path = %path.display(), error = %e, "Reconnect sentinel write failed");
    }
}

/// Consume the sentinel; returns whether it was present.
pub fn take_reconnect_sentinel() -> bool {
    let path = reconnect_sentinel_path();
    if path.exists() {
        let _ = std::fs::remove_file(&path);
        true
    } else {
        false
    }
}
