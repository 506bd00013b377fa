// tests/reauth.rs
// Token-cache clearing: exactly the three files for a URL hash, across all
// mcp-remote version directories, leaving everything else untouched.

use std::fs;
use std::path::Path;

use linear_fast::config::{DEFAULT_NOTION_MCP_URL, OfficialMcpConfig};
use linear_fast::session::OfficialSessionManager;
use linear_fast::session::reauth::{
    clear_token_cache_for_url_in, find_token_cache_dirs_in, has_cached_tokens_in, url_hash,
};

const LINEAR_URL: &str = "https://mcp.linear.app/mcp";

const TOKEN_SUFFIXES: &[&str] = &["_tokens.json", "_client_info.json", "_code_verifier.txt"];

fn seed_token_files(dir: &Path, hash: &str, content: &str) {
    fs::create_dir_all(dir).expect("create cache dir");
    for suffix in TOKEN_SUFFIXES {
        fs::write(dir.join(format!("{hash}{suffix}")), content).expect("write token file");
    }
}

#[test]
fn finds_version_dirs_sorted() {
    let home = tempfile::tempdir().expect("tempdir");
    let mcp_auth = home.path().join(".mcp-auth");
    fs::create_dir_all(mcp_auth.join("mcp-remote-0.1.37")).expect("mkdir");
    fs::create_dir_all(mcp_auth.join("mcp-remote-0.1.36")).expect("mkdir");
    fs::create_dir_all(mcp_auth.join("other-dir")).expect("mkdir");

    let dirs = find_token_cache_dirs_in(home.path());

    assert_eq!(dirs.len(), 2);
    assert!(dirs[0].to_string_lossy().contains("0.1.36"));
    assert!(dirs[1].to_string_lossy().contains("0.1.37"));
}

#[test]
fn finds_nothing_without_mcp_auth() {
    let home = tempfile::tempdir().expect("tempdir");
    assert!(find_token_cache_dirs_in(home.path()).is_empty());
}

#[test]
fn deletes_exactly_matching_token_files() {
    let home = tempfile::tempdir().expect("tempdir");
    let cache_dir = home.path().join(".mcp-auth/mcp-remote-0.1.37");
    let hash = url_hash(LINEAR_URL);
    seed_token_files(&cache_dir, &hash, "test");
    // Unrelated file that must survive
    fs::write(cache_dir.join("other_hash_tokens.json"), "keep").expect("write");

    let report = clear_token_cache_for_url_in(home.path(), LINEAR_URL);

    assert_eq!(report.deleted_files, 3);
    assert_eq!(report.url_hash, hash);
    for suffix in TOKEN_SUFFIXES {
        assert!(!cache_dir.join(format!("{hash}{suffix}")).exists());
    }
    assert!(cache_dir.join("other_hash_tokens.json").exists());
}

#[test]
fn no_error_when_no_files() {
    let home = tempfile::tempdir().expect("tempdir");
    fs::create_dir_all(home.path().join(".mcp-auth/mcp-remote-0.1.37")).expect("mkdir");

    let report = clear_token_cache_for_url_in(home.path(), LINEAR_URL);

    assert_eq!(report.deleted_files, 0);
    assert_eq!(report.searched_dirs.len(), 1);
}

#[test]
fn no_error_when_no_cache_dir() {
    let home = tempfile::tempdir().expect("tempdir");

    let report = clear_token_cache_for_url_in(home.path(), LINEAR_URL);

    assert_eq!(report.deleted_files, 0);
    assert!(report.searched_dirs.is_empty());
}

#[test]
fn clears_only_the_target_service() {
    let home = tempfile::tempdir().expect("tempdir");
    let cache_dir = home.path().join(".mcp-auth/mcp-remote-0.1.37");
    let linear_hash = url_hash(LINEAR_URL);
    let notion_hash = url_hash(DEFAULT_NOTION_MCP_URL);
    seed_token_files(&cache_dir, &linear_hash, "linear");
    seed_token_files(&cache_dir, &notion_hash, "notion");

    let report = clear_token_cache_for_url_in(home.path(), DEFAULT_NOTION_MCP_URL);

    assert_eq!(report.deleted_files, 3);
    assert_eq!(report.url_hash, notion_hash);
    for suffix in TOKEN_SUFFIXES {
        assert!(cache_dir.join(format!("{linear_hash}{suffix}")).exists());
        assert!(!cache_dir.join(format!("{notion_hash}{suffix}")).exists());
    }
}

#[test]
fn searches_every_version_dir() {
    let home = tempfile::tempdir().expect("tempdir");
    let hash = url_hash(DEFAULT_NOTION_MCP_URL);
    let d1 = home.path().join(".mcp-auth/mcp-remote-0.1.36");
    let d2 = home.path().join(".mcp-auth/mcp-remote-0.1.37");
    fs::create_dir_all(&d1).expect("mkdir");
    fs::create_dir_all(&d2).expect("mkdir");
    fs::write(d1.join(format!("{hash}_tokens.json")), "old").expect("write");
    fs::write(d2.join(format!("{hash}_tokens.json")), "new").expect("write");

    let report = clear_token_cache_for_url_in(home.path(), DEFAULT_NOTION_MCP_URL);

    assert_eq!(report.deleted_files, 2);
    assert_eq!(report.searched_dirs.len(), 2);
}

#[test]
fn cached_token_detection_requires_tokens_file() {
    let home = tempfile::tempdir().expect("tempdir");
    let cache_dir = home.path().join(".mcp-auth/mcp-remote-0.1.37");
    fs::create_dir_all(&cache_dir).expect("mkdir");

    assert!(!has_cached_tokens_in(home.path(), LINEAR_URL));

    let hash = url_hash(LINEAR_URL);
    fs::write(cache_dir.join(format!("{hash}_tokens.json")), "token").expect("write");

    assert!(has_cached_tokens_in(home.path(), LINEAR_URL));
    assert!(!has_cached_tokens_in(home.path(), DEFAULT_NOTION_MCP_URL));
}

#[tokio::test]
async fn manager_reauth_reports_status_and_hash() {
    // A URL no real environment has tokens for, so the sweep is a no-op.
    let url = "https://reauth-test.invalid/mcp";
    let manager = OfficialSessionManager::new(OfficialMcpConfig::for_url(url));

    let result = manager.reauth().await;

    assert_eq!(result["status"], "reauth_triggered");
    assert_eq!(result["urlHash"], url_hash(url));
    assert!(result["deletedFiles"].is_number());
    assert!(result["searchedDirs"].is_array());
}

#[tokio::test]
async fn manager_reauth_is_safe_with_no_session() {
    let manager = OfficialSessionManager::new(OfficialMcpConfig::for_url(
        "https://reauth-test.invalid/mcp",
    ));

    // Never connected; reauth must still succeed.
    let result = manager.reauth().await;
    assert_eq!(result["status"], "reauth_triggered");
}
