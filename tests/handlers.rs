// tests/handlers.rs
// Local handler projections: shapes match the tool contracts, unsupported
// filters request fallback instead of guessing.

use serde_json::{Map, Value, json};

use linear_fast::config::CacheConfig;
use linear_fast::error::FallbackReason;
use linear_fast::handlers;
use linear_fast::reader::LinearLocalReader;
use linear_fast::store::fixture::{FixtureCatalog, FixtureDatabase};

fn comment_body(text: &str) -> String {
    json!({
        "type": "doc",
        "content": [{"type": "paragraph", "content": [{"type": "text", "text": text}]}]
    })
    .to_string()
}

fn fixture_reader() -> LinearLocalReader {
    let db = FixtureDatabase::new("linear_ws1")
        .with_store(
            "st_teams",
            vec![
                json!({"id": "t2", "key": "OPS", "name": "Operations"}),
                json!({"id": "t1", "key": "ENG", "name": "Engineering"}),
            ],
        )
        .with_store(
            "st_users",
            vec![json!({
                "id": "u1", "name": "ada lovelace", "displayName": "Ada",
                "email": "ada@example.com"
            })],
        )
        .with_store(
            "st_states",
            vec![
                json!({"id": "s1", "name": "Todo", "type": "unstarted", "color": "#aaa", "teamId": "t1", "position": 2.0}),
                json!({"id": "s2", "name": "In Progress", "type": "started", "color": "#bbb", "teamId": "t1", "position": 1.0}),
            ],
        )
        .with_store(
            "st_issues",
            vec![
                json!({
                    "id": "i1", "number": 1, "teamId": "t1", "stateId": "s1",
                    "title": "Fix login bug", "assigneeId": "u1", "projectId": "p1", "priority": 2,
                    "createdAt": "2026-01-01T00:00:00Z", "updatedAt": "2026-01-02T00:00:00Z"
                }),
                json!({
                    "id": "i2", "number": 2, "teamId": "t1", "stateId": "s2",
                    "title": "Add search", "assigneeId": "u1", "projectId": "p1", "priority": 1,
                    "createdAt": "2026-01-03T00:00:00Z", "updatedAt": "2026-01-05T00:00:00Z"
                }),
                json!({
                    "id": "i3", "number": 3, "teamId": "t2", "stateId": "s2",
                    "title": "Ops task",
                    "createdAt": "2026-01-02T00:00:00Z", "updatedAt": "2026-01-04T00:00:00Z"
                }),
            ],
        )
        .with_store(
            "st_comments",
            vec![json!({
                "id": "c1", "issueId": "i1", "userId": "u1",
                "bodyData": comment_body("Looks good"),
                "createdAt": "2026-01-01T10:00:00Z", "updatedAt": "2026-01-01T10:00:00Z"
            })],
        )
        .with_store(
            "st_projects",
            vec![json!({
                "id": "p1", "name": "Apollo", "teamIds": ["t1"], "slugId": "apollo",
                "statusId": "ps1", "memberIds": ["u1"],
                "startDate": "2026-01-01", "targetDate": "2026-03-01"
            })],
        )
        .with_store(
            "st_project_statuses",
            vec![json!({"id": "ps1", "name": "In Progress", "color": "#123", "position": 1.0, "type": "started", "indefinite": false})],
        )
        .with_store(
            "st_project_updates",
            vec![json!({
                "id": "pu1", "body": "On track", "health": "onTrack", "projectId": "p1",
                "userId": "u1", "createdAt": "2026-01-02T00:00:00Z", "updatedAt": "2026-01-02T00:00:00Z"
            })],
        );
    LinearLocalReader::new(
        CacheConfig::for_paths("/tmp", "/tmp"),
        Box::new(FixtureCatalog::single(db)),
    )
}

fn call(reader: &LinearLocalReader, tool: &str, args: Value) -> Result<Value, linear_fast::error::HandlerError> {
    let handler = handlers::lookup(tool).unwrap_or_else(|| panic!("handler for {tool}"));
    let args: Map<String, Value> = match args {
        Value::Object(map) => map,
        _ => Map::new(),
    };
    handler(reader, &args)
}

#[test]
fn list_teams_sorted_by_key_with_counts() {
    let reader = fixture_reader();
    let teams = call(&reader, "list_teams", json!({})).expect("list_teams");

    let teams = teams.as_array().expect("array");
    assert_eq!(teams.len(), 2);
    assert_eq!(teams[0]["key"], "ENG");
    assert_eq!(teams[0]["issueCount"], 2);
    assert_eq!(teams[1]["key"], "OPS");
    assert_eq!(teams[1]["issueCount"], 1);
}

#[test]
fn list_issues_filters_and_sorts() {
    let reader = fixture_reader();

    let result = call(&reader, "list_issues", json!({"team": "ENG"})).expect("list_issues");
    assert_eq!(result["totalCount"], 2);
    let issues = result["issues"].as_array().expect("array");
    // updatedAt descending
    assert_eq!(issues[0]["identifier"], "ENG-2");
    assert_eq!(issues[1]["identifier"], "ENG-1");
    assert_eq!(issues[1]["state"], "Todo");
    assert_eq!(issues[1]["stateType"], "unstarted");
    assert_eq!(issues[1]["assignee"], "ada lovelace");

    let result = call(
        &reader,
        "list_issues",
        json!({"state": "started", "orderBy": "createdAt"}),
    )
    .expect("list_issues");
    assert_eq!(result["totalCount"], 2);
    let issues = result["issues"].as_array().expect("array");
    assert_eq!(issues[0]["identifier"], "ENG-2");
    assert_eq!(issues[1]["identifier"], "OPS-3");

    let result = call(&reader, "list_issues", json!({"query": "login"})).expect("list_issues");
    assert_eq!(result["totalCount"], 1);

    let result = call(&reader, "list_issues", json!({"team": "nope"})).expect("list_issues");
    assert_eq!(result["totalCount"], 0);
}

#[test]
fn list_issues_respects_limit() {
    let reader = fixture_reader();
    let result = call(&reader, "list_issues", json!({"limit": 1})).expect("list_issues");

    assert_eq!(result["issues"].as_array().map(Vec::len), Some(1));
    assert_eq!(result["totalCount"], 3);

    let result = call(&reader, "list_issues", json!({"limit": 0})).expect("list_issues");
    assert_eq!(result["issues"].as_array().map(Vec::len), Some(3));
}

#[test]
fn get_issue_includes_comments() {
    let reader = fixture_reader();
    let issue = call(&reader, "get_issue", json!({"id": "ENG-1"})).expect("get_issue");

    assert_eq!(issue["identifier"], "ENG-1");
    assert_eq!(issue["state"], "Todo");
    assert_eq!(issue["project"], "Apollo");
    let comments = issue["comments"].as_array().expect("comments");
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0]["author"], "ada lovelace");
    assert_eq!(comments[0]["body"], "Looks good");
}

#[test]
fn get_issue_unknown_identifier_is_null() {
    let reader = fixture_reader();
    let issue = call(&reader, "get_issue", json!({"id": "ENG-999"})).expect("get_issue");
    assert!(issue.is_null());
}

#[test]
fn get_team_reports_state_breakdown() {
    let reader = fixture_reader();
    let team = call(&reader, "get_team", json!({"query": "ENG"})).expect("get_team");

    assert_eq!(team["key"], "ENG");
    assert_eq!(team["issueCount"], 2);
    assert_eq!(team["issuesByState"]["unstarted"], 1);
    assert_eq!(team["issuesByState"]["started"], 1);
}

#[test]
fn list_projects_projection() {
    let reader = fixture_reader();
    let projects = call(&reader, "list_projects", json!({})).expect("list_projects");

    let projects = projects.as_array().expect("array");
    assert_eq!(projects.len(), 1);
    assert_eq!(projects[0]["name"], "Apollo");
    assert_eq!(projects[0]["state"], "In Progress");
    assert_eq!(projects[0]["issueCount"], 2);
}

#[test]
fn list_issue_statuses_sorted_by_position() {
    let reader = fixture_reader();
    let states = call(&reader, "list_issue_statuses", json!({"team": "ENG"})).expect("statuses");

    let states = states.as_array().expect("array");
    assert_eq!(states[0]["name"], "In Progress");
    assert_eq!(states[1]["name"], "Todo");
}

#[test]
fn get_issue_status_by_name_and_id() {
    let reader = fixture_reader();

    let by_name = call(
        &reader,
        "get_issue_status",
        json!({"team": "ENG", "name": "todo"}),
    )
    .expect("status");
    assert_eq!(by_name["id"], "s1");
    assert_eq!(by_name["team"], "Engineering");

    let by_id = call(
        &reader,
        "get_issue_status",
        json!({"team": "ENG", "id": "s2"}),
    )
    .expect("status");
    assert_eq!(by_id["name"], "In Progress");
}

#[test]
fn list_comments_resolves_issue_identifier() {
    let reader = fixture_reader();
    let comments = call(&reader, "list_comments", json!({"issueId": "ENG-1"})).expect("comments");

    let comments = comments.as_array().expect("array");
    assert_eq!(comments.len(), 1);
    assert_eq!(comments[0]["author"], "ada lovelace");
}

#[test]
fn status_updates_support_project_type_only() {
    let reader = fixture_reader();

    let err = call(&reader, "get_status_updates", json!({"type": "initiative"}))
        .expect_err("must fall back");
    assert_eq!(err.fallback_reason(), Some(FallbackReason::UnsupportedFilter));

    let err = call(
        &reader,
        "get_status_updates",
        json!({"type": "project", "initiative": "x"}),
    )
    .expect_err("must fall back");
    assert_eq!(err.fallback_reason(), Some(FallbackReason::UnsupportedFilter));

    let err = call(
        &reader,
        "get_status_updates",
        json!({"type": "project", "includeArchived": true}),
    )
    .expect_err("must fall back");
    assert_eq!(err.fallback_reason(), Some(FallbackReason::UnsupportedFilter));
}

#[test]
fn status_updates_project_projection() {
    let reader = fixture_reader();
    let result = call(
        &reader,
        "get_status_updates",
        json!({"type": "project", "project": "Apollo"}),
    )
    .expect("updates");

    assert_eq!(result["totalCount"], 1);
    let updates = result["statusUpdates"].as_array().expect("array");
    assert_eq!(updates[0]["health"], "onTrack");
    assert_eq!(updates[0]["author"], "ada lovelace");
    assert_eq!(updates[0]["project"], "Apollo");
}

#[test]
fn list_project_updates_by_project_name() {
    let reader = fixture_reader();
    let updates = call(&reader, "list_project_updates", json!({"project": "Apollo"}))
        .expect("updates");

    let updates = updates.as_array().expect("array");
    assert_eq!(updates.len(), 1);
    assert_eq!(updates[0]["body"], "On track");
}

#[test]
fn unknown_tool_is_not_dispatched() {
    assert!(handlers::lookup("create_issue").is_none());
    assert!(handlers::lookup("get_cache_health").is_none());
}
