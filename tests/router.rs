// tests/router.rs
// Routing policy: local-first reads, coherence window, stale marking,
// semantic-error passthrough, idle-refresh signaling.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use linear_fast::error::{FallbackReason, HandlerError, OfficialErrorCode, OfficialToolError};
use linear_fast::router::{LocalBackend, ToolRouter, Upstream};

type Handler = Box<dyn Fn(&Map<String, Value>) -> Result<Value, HandlerError> + Send + Sync>;

/// Local backend with one installable handler under "list_issues".
#[derive(Default)]
struct FakeLocal {
    degraded: AtomicBool,
    ensure_fresh_calls: AtomicUsize,
    refresh_calls: AtomicUsize,
    handler_calls: AtomicUsize,
    handler: Mutex<Option<Handler>>,
}

impl FakeLocal {
    fn new(degraded: bool) -> Arc<Self> {
        let local = Self::default();
        local.degraded.store(degraded, Ordering::SeqCst);
        Arc::new(local)
    }

    fn install<F>(&self, handler: F)
    where
        F: Fn(&Map<String, Value>) -> Result<Value, HandlerError> + Send + Sync + 'static,
    {
        *self.handler.lock().expect("handler lock") = Some(Box::new(handler));
    }
}

#[async_trait]
impl LocalBackend for FakeLocal {
    fn ensure_fresh(&self) {
        self.ensure_fresh_calls.fetch_add(1, Ordering::SeqCst);
    }

    fn is_degraded(&self) -> bool {
        self.degraded.load(Ordering::SeqCst)
    }

    fn has_handler(&self, tool_name: &str) -> bool {
        tool_name == "list_issues" && self.handler.lock().expect("handler lock").is_some()
    }

    async fn call(
        &self,
        _tool_name: &str,
        arguments: &Map<String, Value>,
    ) -> Result<Value, HandlerError> {
        self.handler_calls.fetch_add(1, Ordering::SeqCst);
        let handler = self.handler.lock().expect("handler lock");
        match handler.as_ref() {
            Some(handler) => handler(arguments),
            None => Err(HandlerError::fallback(
                FallbackReason::UnsupportedTool,
                "not implemented",
            )),
        }
    }

    async fn refresh(&self) -> Result<(), String> {
        self.refresh_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn get_health(&self) -> Value {
        json!({
            "degraded": self.degraded.load(Ordering::SeqCst),
            "refreshCount": self.refresh_calls.load(Ordering::SeqCst),
        })
    }
}

#[derive(Default)]
struct FakeOfficial {
    calls: Mutex<Vec<(String, Value)>>,
    responses: Mutex<HashMap<String, Value>>,
    errors: Mutex<HashMap<String, OfficialToolError>>,
}

impl FakeOfficial {
    fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    fn respond(&self, tool: &str, value: Value) {
        self.responses
            .lock()
            .expect("responses lock")
            .insert(tool.to_string(), value);
    }

    fn fail(&self, tool: &str, error: OfficialToolError) {
        self.errors
            .lock()
            .expect("errors lock")
            .insert(tool.to_string(), error);
    }

    fn calls(&self) -> Vec<(String, Value)> {
        self.calls.lock().expect("calls lock").clone()
    }
}

#[async_trait]
impl Upstream for FakeOfficial {
    async fn call_tool(&self, name: &str, arguments: Value) -> Result<Value, OfficialToolError> {
        self.calls
            .lock()
            .expect("calls lock")
            .push((name.to_string(), arguments.clone()));
        if let Some(err) = self.errors.lock().expect("errors lock").get(name) {
            return Err(err.clone());
        }
        Ok(self
            .responses
            .lock()
            .expect("responses lock")
            .get(name)
            .cloned()
            .unwrap_or_else(|| json!({"ok": true, "tool": name, "args": arguments})))
    }

    async fn list_tools(&self) -> Result<Vec<String>, OfficialToolError> {
        Ok(vec!["create_issue".to_string(), "list_issues".to_string()])
    }

    fn get_health(&self) -> Value {
        json!({"connected": true})
    }

    async fn reauth(&self) -> Value {
        json!({
            "status": "reauth_triggered",
            "urlHash": "abc",
            "deletedFiles": 0,
            "searchedDirs": [],
        })
    }
}

fn make_router(local: &Arc<FakeLocal>, official: &Arc<FakeOfficial>) -> ToolRouter {
    ToolRouter::new(
        local.clone(),
        official.clone(),
        Duration::from_secs(30),
        "https://mcp.notion.com/mcp".to_string(),
    )
}

fn offline_error() -> OfficialToolError {
    OfficialToolError::unavailable("offline")
}

#[tokio::test]
async fn read_local_success_without_official_call() {
    let local = FakeLocal::new(false);
    let official = FakeOfficial::new();
    local.install(|_| Ok(json!({"source": "local"})));

    let router = make_router(&local, &official);
    let result = router.call_read("list_issues", json!({})).await.expect("read");

    assert_eq!(result, json!({"source": "local"}));
    assert!(official.calls().is_empty());
}

#[tokio::test]
async fn read_unsupported_filter_falls_back_to_official() {
    let local = FakeLocal::new(false);
    let official = FakeOfficial::new();
    local.install(|_| {
        Err(HandlerError::fallback(
            FallbackReason::UnsupportedFilter,
            "unsupported",
        ))
    });

    let router = make_router(&local, &official);
    let result = router
        .call_read("list_issues", json!({"query": "hello"}))
        .await
        .expect("read");

    assert_eq!(result["tool"], "list_issues");
    assert_eq!(official.calls(), vec![(
        "list_issues".to_string(),
        json!({"query": "hello"})
    )]);
}

#[tokio::test]
async fn unsupported_tool_goes_upstream() {
    let local = FakeLocal::new(false);
    let official = FakeOfficial::new();
    // No handler installed: nothing is registered locally.

    let router = make_router(&local, &official);
    let result = router.call_read("get_cycle", json!({})).await.expect("read");

    assert_eq!(result["tool"], "get_cycle");
    assert_eq!(official.calls().len(), 1);
    assert_eq!(local.handler_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn degraded_local_uses_official_when_available() {
    let local = FakeLocal::new(true);
    let official = FakeOfficial::new();
    local.install(|_| Ok(json!({"source": "local"})));

    let router = make_router(&local, &official);
    let result = router.call_read("list_issues", json!({})).await.expect("read");

    assert_eq!(result["tool"], "list_issues");
    assert_eq!(official.calls().len(), 1);
}

#[tokio::test]
async fn degraded_local_returns_stale_when_remote_down() {
    let local = FakeLocal::new(true);
    let official = FakeOfficial::new();
    official.fail("list_issues", offline_error());
    local.install(|_| Ok(json!({"source": "local-stale", "data": [1, 2, 3]})));

    let router = make_router(&local, &official);
    let result = router.call_read("list_issues", json!({})).await.expect("read");

    assert_eq!(
        result,
        json!({"source": "local-stale", "data": [1, 2, 3], "_metadata": {"stale": true}})
    );
    assert_eq!(official.calls().len(), 1);
}

#[tokio::test]
async fn unexpected_local_error_falls_back_to_official() {
    let local = FakeLocal::new(false);
    let official = FakeOfficial::new();
    local.install(|_| Err(HandlerError::Internal("boom".to_string())));

    let router = make_router(&local, &official);
    let result = router.call_read("list_issues", json!({})).await.expect("read");

    assert_eq!(result["tool"], "list_issues");
    assert_eq!(official.calls().len(), 1);
}

#[tokio::test]
async fn write_marks_coherence_and_uses_remote_first() {
    let local = FakeLocal::new(false);
    let official = FakeOfficial::new();
    official.respond("create_issue", json!({"id": "ISS-1"}));
    official.respond("list_issues", json!({"source": "remote"}));
    local.install(|_| Ok(json!({"source": "local"})));

    let router = make_router(&local, &official);
    router
        .call_official("create_issue", json!({"title": "T"}))
        .await
        .expect("write");
    let result = router.call_read("list_issues", json!({})).await.expect("read");

    assert_eq!(result, json!({"source": "remote"}));
    let calls = official.calls();
    assert_eq!(calls[0].0, "create_issue");
    assert_eq!(calls[1].0, "list_issues");
    assert_eq!(local.handler_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn remote_first_falls_back_to_local_when_remote_fails() {
    let local = FakeLocal::new(false);
    let official = FakeOfficial::new();
    official.respond("create_issue", json!({"id": "ISS-1"}));
    official.fail("list_issues", offline_error());
    local.install(|_| Ok(json!({"source": "local"})));

    let router = make_router(&local, &official);
    router
        .call_official("create_issue", json!({"title": "T"}))
        .await
        .expect("write");
    let result = router.call_read("list_issues", json!({})).await.expect("read");

    // Healthy local fallback carries no stale metadata.
    assert_eq!(result, json!({"source": "local"}));
    assert_eq!(official.calls().len(), 2);
}

#[tokio::test]
async fn remote_first_tool_error_does_not_fall_back_to_local() {
    let local = FakeLocal::new(false);
    let official = FakeOfficial::new();
    official.respond("create_issue", json!({"id": "ISS-1"}));
    official.fail("list_issues", OfficialToolError::tool_error("bad args"));
    local.install(|_| Ok(json!({"source": "local"})));

    let router = make_router(&local, &official);
    router
        .call_official("create_issue", json!({"title": "T"}))
        .await
        .expect("write");
    let err = router
        .call_read("list_issues", json!({}))
        .await
        .expect_err("semantic error must propagate");

    assert_eq!(err.code, OfficialErrorCode::ToolError);
    assert!(err.message.contains("bad args"));
    assert_eq!(official.calls().len(), 2);
    assert_eq!(local.handler_calls.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn remote_first_degraded_local_does_not_retry_official_twice() {
    let local = FakeLocal::new(true);
    let official = FakeOfficial::new();
    official.respond("create_issue", json!({"id": "ISS-1"}));
    official.fail("list_issues", offline_error());
    local.install(|_| Ok(json!({"source": "local-stale"})));

    let router = make_router(&local, &official);
    router
        .call_official("create_issue", json!({"title": "T"}))
        .await
        .expect("write");
    let result = router.call_read("list_issues", json!({})).await.expect("read");

    assert_eq!(
        result,
        json!({"source": "local-stale", "_metadata": {"stale": true}})
    );
    assert_eq!(official.calls().len(), 2);
}

#[tokio::test]
async fn non_write_official_call_does_not_force_remote_first() {
    let local = FakeLocal::new(false);
    let official = FakeOfficial::new();
    local.install(|_| Ok(json!({"source": "local"})));

    let router = make_router(&local, &official);
    router
        .call_official("list_teams", json!({}))
        .await
        .expect("official read");
    let result = router.call_read("list_issues", json!({})).await.expect("read");

    assert_eq!(result, json!({"source": "local"}));
}

#[tokio::test]
async fn healthy_local_with_remote_down_serves_local_without_metadata() {
    let local = FakeLocal::new(false);
    let official = FakeOfficial::new();
    official.fail("list_issues", offline_error());
    local.install(|_| Ok(json!({"source": "local-healthy"})));

    let router = make_router(&local, &official);
    let result = router.call_read("list_issues", json!({})).await.expect("read");

    assert_eq!(result, json!({"source": "local-healthy"}));
    // Local is healthy and first in line; the upstream is never consulted.
    assert!(official.calls().is_empty());
}

#[tokio::test]
async fn stale_metadata_wraps_list_responses() {
    let local = FakeLocal::new(true);
    let official = FakeOfficial::new();
    official.fail("list_issues", offline_error());
    local.install(|_| Ok(json!([{"id": "1"}, {"id": "2"}, {"id": "3"}])));

    let router = make_router(&local, &official);
    let result = router.call_read("list_issues", json!({})).await.expect("read");

    assert_eq!(result["results"], json!([{"id": "1"}, {"id": "2"}, {"id": "3"}]));
    assert_eq!(result["_metadata"]["stale"], true);
    assert_eq!(official.calls().len(), 1);
}

#[tokio::test]
async fn stale_metadata_wraps_empty_list_responses() {
    let local = FakeLocal::new(true);
    let official = FakeOfficial::new();
    official.fail("list_issues", offline_error());
    local.install(|_| Ok(json!([])));

    let router = make_router(&local, &official);
    let result = router.call_read("list_issues", json!({})).await.expect("read");

    assert_eq!(result["results"], json!([]));
    assert_eq!(result["_metadata"]["stale"], true);
}

#[tokio::test]
async fn stale_metadata_preserves_dict_structure() {
    let local = FakeLocal::new(true);
    let official = FakeOfficial::new();
    official.fail("list_issues", offline_error());
    local.install(|_| {
        Ok(json!({
            "issues": [{"id": "ISS-1", "title": "Bug"}],
            "pageInfo": {"hasNextPage": false},
            "timestamp": 1234567890,
        }))
    });

    let router = make_router(&local, &official);
    let result = router.call_read("list_issues", json!({})).await.expect("read");

    assert_eq!(result["issues"], json!([{"id": "ISS-1", "title": "Bug"}]));
    assert_eq!(result["pageInfo"], json!({"hasNextPage": false}));
    assert_eq!(result["timestamp"], 1234567890);
    assert_eq!(result["_metadata"]["stale"], true);
}

#[tokio::test]
async fn stale_metadata_preserves_nested_structures() {
    let local = FakeLocal::new(true);
    let official = FakeOfficial::new();
    official.fail("list_issues", offline_error());
    local.install(|_| {
        Ok(json!({
            "nested": {"level1": {"level2": {"data": [1, 2, 3], "info": "preserved"}}}
        }))
    });

    let router = make_router(&local, &official);
    let result = router.call_read("list_issues", json!({})).await.expect("read");

    assert_eq!(result["nested"]["level1"]["level2"]["data"], json!([1, 2, 3]));
    assert_eq!(result["nested"]["level1"]["level2"]["info"], "preserved");
    assert_eq!(result["_metadata"]["stale"], true);
}

#[tokio::test]
async fn stale_metadata_on_every_sequential_degraded_read() {
    let local = FakeLocal::new(true);
    let official = FakeOfficial::new();
    official.fail("list_issues", offline_error());
    local.install(|_| Ok(json!({"source": "local-stale"})));

    let router = make_router(&local, &official);
    let first = router.call_read("list_issues", json!({})).await.expect("read");
    let second = router.call_read("list_issues", json!({})).await.expect("read");

    assert_eq!(first["_metadata"]["stale"], true);
    assert_eq!(second["_metadata"]["stale"], true);
    assert_eq!(official.calls().len(), 2);
}

#[tokio::test]
async fn no_stale_metadata_when_remote_succeeds_during_coherence() {
    let local = FakeLocal::new(false);
    let official = FakeOfficial::new();
    official.respond("create_issue", json!({"id": "ISS-1"}));
    official.respond("list_issues", json!({"source": "remote", "data": [7, 8, 9]}));
    local.install(|_| Ok(json!({"source": "local"})));

    let router = make_router(&local, &official);
    router
        .call_official("create_issue", json!({"title": "T"}))
        .await
        .expect("write");
    let result = router.call_read("list_issues", json!({})).await.expect("read");

    assert_eq!(result, json!({"source": "remote", "data": [7, 8, 9]}));
    assert!(result.get("_metadata").is_none());
}

#[tokio::test]
async fn official_fallback_response_has_no_metadata() {
    let local = FakeLocal::new(false);
    let official = FakeOfficial::new();
    official.respond("list_issues", json!({"source": "official", "data": [4, 5, 6]}));
    local.install(|_| {
        Err(HandlerError::fallback(
            FallbackReason::UnsupportedFilter,
            "unsupported",
        ))
    });

    let router = make_router(&local, &official);
    let result = router.call_read("list_issues", json!({})).await.expect("read");

    assert_eq!(result, json!({"source": "official", "data": [4, 5, 6]}));
    assert!(result.get("_metadata").is_none());
}

#[tokio::test]
async fn refresh_local_cache_returns_local_health() {
    let local = FakeLocal::new(false);
    let official = FakeOfficial::new();

    let router = make_router(&local, &official);
    let health = router.refresh_local_cache().await.expect("refresh");

    assert_eq!(health["refreshCount"], 1);
}

#[tokio::test]
async fn router_health_includes_local_and_official() {
    let local = FakeLocal::new(false);
    let official = FakeOfficial::new();

    let router = make_router(&local, &official);
    let health = router.get_health();

    assert!(health.get("local").is_some());
    assert!(health.get("official").is_some());
    assert_eq!(health["coherenceWindowSeconds"], 30.0);
    assert_eq!(health["remoteReadUntil"], 0.0);
}

#[tokio::test]
async fn reauth_official_delegates_to_upstream() {
    let local = FakeLocal::new(false);
    let official = FakeOfficial::new();

    let router = make_router(&local, &official);
    let result = router.reauth_official().await;

    assert_eq!(result["status"], "reauth_triggered");
}

#[tokio::test]
async fn call_read_invokes_ensure_fresh() {
    let local = FakeLocal::new(false);
    let official = FakeOfficial::new();
    local.install(|_| Ok(json!({"source": "local"})));

    let router = make_router(&local, &official);
    router.call_read("list_issues", json!({})).await.expect("read");

    assert_eq!(local.ensure_fresh_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn call_official_invokes_ensure_fresh() {
    let local = FakeLocal::new(false);
    let official = FakeOfficial::new();

    let router = make_router(&local, &official);
    router
        .call_official("create_issue", json!({"title": "T"}))
        .await
        .expect("write");

    assert_eq!(local.ensure_fresh_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn write_then_read_calls_ensure_fresh_for_each_entry() {
    let local = FakeLocal::new(false);
    let official = FakeOfficial::new();
    official.respond("create_issue", json!({"id": "ISS-1"}));
    official.respond("list_issues", json!({"source": "remote"}));
    local.install(|_| Ok(json!({"source": "local"})));

    let router = make_router(&local, &official);
    router
        .call_official("create_issue", json!({"title": "T"}))
        .await
        .expect("write");
    router.call_read("list_issues", json!({})).await.expect("read");

    // call_official, call_read, and the internal remote-first call_official
    assert_eq!(local.ensure_fresh_calls.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn multiple_reads_call_ensure_fresh_each_time() {
    let local = FakeLocal::new(false);
    let official = FakeOfficial::new();
    local.install(|_| Ok(json!({"source": "local"})));

    let router = make_router(&local, &official);
    for _ in 0..3 {
        router.call_read("list_issues", json!({})).await.expect("read");
    }

    assert_eq!(local.ensure_fresh_calls.load(Ordering::SeqCst), 3);
}
