// src/store/detect.rs
// Auto-detect Linear object store hashes by sampling records.
//
// Store names may change between Linear.app versions, so stores are
// classified by the shape of their first record instead of by name.

use serde_json::{Map, Value};

use super::Database;

/// Entity kinds held by the local cache, in detection priority order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityKind {
    Issue,
    Team,
    User,
    WorkflowState,
    Comment,
    Project,
    IssueContent,
    Label,
    Initiative,
    ProjectStatus,
    Cycle,
    Document,
    DocumentContent,
    Milestone,
    ProjectUpdate,
}

impl EntityKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityKind::Issue => "issues",
            EntityKind::Team => "teams",
            EntityKind::User => "users",
            EntityKind::WorkflowState => "workflow_states",
            EntityKind::Comment => "comments",
            EntityKind::Project => "projects",
            EntityKind::IssueContent => "issue_content",
            EntityKind::Label => "labels",
            EntityKind::Initiative => "initiatives",
            EntityKind::ProjectStatus => "project_statuses",
            EntityKind::Cycle => "cycles",
            EntityKind::Document => "documents",
            EntityKind::DocumentContent => "document_content",
            EntityKind::Milestone => "milestones",
            EntityKind::ProjectUpdate => "project_updates",
        }
    }
}

/// Container for detected object store names.
///
/// Users, workflow states and labels appear in both per-team and
/// per-workspace stores, so those collect every matching store.
#[derive(Debug, Clone, Default)]
pub struct DetectedStores {
    pub issues: Option<String>,
    pub teams: Option<String>,
    pub users: Vec<String>,
    pub workflow_states: Vec<String>,
    pub comments: Option<String>,
    pub projects: Option<String>,
    /// Encoded issue descriptions (CRDT document state).
    pub issue_content: Option<String>,
    pub labels: Vec<String>,
    pub initiatives: Option<String>,
    pub project_statuses: Option<String>,
    pub cycles: Option<String>,
    pub documents: Option<String>,
    pub document_content: Option<String>,
    pub milestones: Option<String>,
    pub project_updates: Option<String>,
}

impl DetectedStores {
    /// Kinds that were detected in this database.
    pub fn detected_kinds(&self) -> Vec<EntityKind> {
        let mut kinds = Vec::new();
        let mut add = |kind, present: bool| {
            if present {
                kinds.push(kind);
            }
        };
        add(EntityKind::Issue, self.issues.is_some());
        add(EntityKind::Team, self.teams.is_some());
        add(EntityKind::User, !self.users.is_empty());
        add(EntityKind::WorkflowState, !self.workflow_states.is_empty());
        add(EntityKind::Comment, self.comments.is_some());
        add(EntityKind::Project, self.projects.is_some());
        add(EntityKind::IssueContent, self.issue_content.is_some());
        add(EntityKind::Label, !self.labels.is_empty());
        add(EntityKind::Initiative, self.initiatives.is_some());
        add(EntityKind::ProjectStatus, self.project_statuses.is_some());
        add(EntityKind::Cycle, self.cycles.is_some());
        add(EntityKind::Document, self.documents.is_some());
        add(EntityKind::DocumentContent, self.document_content.is_some());
        add(EntityKind::Milestone, self.milestones.is_some());
        add(EntityKind::ProjectUpdate, self.project_updates.is_some());
        kinds
    }
}

fn has_keys(record: &Map<String, Value>, keys: &[&str]) -> bool {
    keys.iter().all(|k| record.contains_key(*k))
}

fn is_issue_record(record: &Map<String, Value>) -> bool {
    has_keys(record, &["number", "teamId", "stateId", "title"])
}

fn is_user_record(record: &Map<String, Value>) -> bool {
    has_keys(record, &["name", "displayName", "email"])
}

fn is_team_record(record: &Map<String, Value>) -> bool {
    if !has_keys(record, &["key", "name"]) {
        return false;
    }
    let Some(key) = record.get("key").and_then(Value::as_str) else {
        return false;
    };
    !key.is_empty()
        && key.len() <= 10
        && key.chars().all(|c| c.is_ascii_alphabetic() && c.is_ascii_uppercase())
}

fn is_workflow_state_record(record: &Map<String, Value>) -> bool {
    if !has_keys(record, &["name", "type", "color", "teamId"]) {
        return false;
    }
    matches!(
        record.get("type").and_then(Value::as_str),
        Some("started" | "unstarted" | "completed" | "canceled" | "backlog")
    )
}

fn is_comment_record(record: &Map<String, Value>) -> bool {
    has_keys(record, &["issueId", "userId", "bodyData", "createdAt"])
}

fn is_project_record(record: &Map<String, Value>) -> bool {
    has_keys(record, &["name", "teamIds", "slugId", "statusId", "memberIds"])
}

fn is_issue_content_record(record: &Map<String, Value>) -> bool {
    has_keys(record, &["issueId", "contentState"])
}

fn is_label_record(record: &Map<String, Value>) -> bool {
    has_keys(record, &["name", "color", "isGroup"])
}

fn is_initiative_record(record: &Map<String, Value>) -> bool {
    has_keys(record, &["name", "ownerId", "slugId", "frequencyResolution"])
}

fn is_project_status_record(record: &Map<String, Value>) -> bool {
    if !has_keys(record, &["name", "color", "position", "type", "indefinite"]) {
        return false;
    }
    // teamId would make it a workflow state
    !record.contains_key("teamId")
}

fn is_cycle_record(record: &Map<String, Value>) -> bool {
    has_keys(record, &["number", "teamId", "startsAt", "endsAt"])
}

fn is_document_record(record: &Map<String, Value>) -> bool {
    has_keys(record, &["title", "slugId", "projectId", "sortOrder"])
        && !record.contains_key("number")
        && !record.contains_key("stateId")
}

fn is_document_content_record(record: &Map<String, Value>) -> bool {
    has_keys(record, &["documentContentId", "contentData"])
}

fn is_milestone_record(record: &Map<String, Value>) -> bool {
    has_keys(record, &["name", "projectId", "sortOrder"])
        && (record.contains_key("currentProgress") || record.contains_key("targetDate"))
}

fn is_project_update_record(record: &Map<String, Value>) -> bool {
    record.contains_key("body")
        && (record.contains_key("projectId") || record.contains_key("health"))
        && !record.contains_key("issueId")
}

/// Detect object stores by sampling their first record.
///
/// Predicates run in a fixed priority order and the first match claims the
/// store; the required-key sets are mutually exclusive in practice and the
/// order is the deliberate tie-breaker. Malformed stores are skipped.
pub fn detect_stores(db: &dyn Database) -> DetectedStores {
    let mut result = DetectedStores::default();

    for store_name in db.store_names() {
        if store_name.starts_with('_') || store_name.contains("_partial") {
            continue;
        }

        let Ok(mut records) = db.records(&store_name) else {
            continue;
        };
        let Some(Value::Object(record)) = records.next() else {
            continue;
        };

        if is_issue_record(&record) && result.issues.is_none() {
            result.issues = Some(store_name);
        } else if is_team_record(&record) && result.teams.is_none() {
            result.teams = Some(store_name);
        } else if is_user_record(&record) && !result.users.contains(&store_name) {
            result.users.push(store_name);
        } else if is_workflow_state_record(&record) && !result.workflow_states.contains(&store_name)
        {
            result.workflow_states.push(store_name);
        } else if is_comment_record(&record) && result.comments.is_none() {
            result.comments = Some(store_name);
        } else if is_project_record(&record) && result.projects.is_none() {
            result.projects = Some(store_name);
        } else if is_issue_content_record(&record) && result.issue_content.is_none() {
            result.issue_content = Some(store_name);
        } else if is_label_record(&record) && !result.labels.contains(&store_name) {
            result.labels.push(store_name);
        } else if is_initiative_record(&record) && result.initiatives.is_none() {
            result.initiatives = Some(store_name);
        } else if is_project_status_record(&record) && result.project_statuses.is_none() {
            result.project_statuses = Some(store_name);
        } else if is_cycle_record(&record) && result.cycles.is_none() {
            result.cycles = Some(store_name);
        } else if is_document_record(&record) && result.documents.is_none() {
            result.documents = Some(store_name);
        } else if is_document_content_record(&record) && result.document_content.is_none() {
            result.document_content = Some(store_name);
        } else if is_milestone_record(&record) && result.milestones.is_none() {
            result.milestones = Some(store_name);
        } else if is_project_update_record(&record) && result.project_updates.is_none() {
            result.project_updates = Some(store_name);
        }
    }

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::fixture::FixtureDatabase;
    use serde_json::json;

    #[test]
    fn detects_core_stores_by_record_shape() {
        let db = FixtureDatabase::new("linear_abc")
            .with_store(
                "a1b2",
                vec![json!({"id": "i1", "number": 1, "teamId": "t1", "stateId": "s1", "title": "Bug"})],
            )
            .with_store(
                "c3d4",
                vec![json!({"id": "t1", "key": "ENG", "name": "Engineering"})],
            )
            .with_store(
                "e5f6",
                vec![json!({"id": "u1", "name": "ada", "displayName": "Ada", "email": "ada@example.com"})],
            );

        let stores = detect_stores(&db);
        assert_eq!(stores.issues.as_deref(), Some("a1b2"));
        assert_eq!(stores.teams.as_deref(), Some("c3d4"));
        assert_eq!(stores.users, vec!["e5f6"]);
    }

    #[test]
    fn skips_underscore_and_partial_stores() {
        let db = FixtureDatabase::new("linear_abc")
            .with_store(
                "_meta",
                vec![json!({"id": "t1", "key": "ENG", "name": "Engineering"})],
            )
            .with_store(
                "teams_partial_1",
                vec![json!({"id": "t1", "key": "ENG", "name": "Engineering"})],
            );

        let stores = detect_stores(&db);
        assert!(stores.teams.is_none());
    }

    #[test]
    fn team_key_must_be_uppercase_short_code() {
        let db = FixtureDatabase::new("linear_abc").with_store(
            "x",
            vec![json!({"id": "t1", "key": "eng", "name": "Engineering"})],
        );
        assert!(detect_stores(&db).teams.is_none());

        let db = FixtureDatabase::new("linear_abc").with_store(
            "x",
            vec![json!({"id": "t1", "key": "VERYLONGKEYX", "name": "Engineering"})],
        );
        assert!(detect_stores(&db).teams.is_none());
    }

    #[test]
    fn project_status_requires_missing_team_id() {
        // With teamId the record is a workflow state, not a project status.
        let db = FixtureDatabase::new("linear_abc").with_store(
            "x",
            vec![json!({
                "id": "ps1", "name": "Planned", "color": "#888",
                "position": 1, "type": "planned", "indefinite": false, "teamId": "t1"
            })],
        );
        let stores = detect_stores(&db);
        assert!(stores.project_statuses.is_none());

        let db = FixtureDatabase::new("linear_abc").with_store(
            "x",
            vec![json!({
                "id": "ps1", "name": "Planned", "color": "#888",
                "position": 1, "type": "planned", "indefinite": false
            })],
        );
        assert_eq!(detect_stores(&db).project_statuses.as_deref(), Some("x"));
    }

    #[test]
    fn document_must_not_look_like_issue() {
        let db = FixtureDatabase::new("linear_abc").with_store(
            "x",
            vec![json!({
                "id": "d1", "title": "Doc", "slugId": "doc", "projectId": "p1",
                "sortOrder": 1, "number": 7
            })],
        );
        assert!(detect_stores(&db).documents.is_none());
    }

    #[test]
    fn project_update_must_not_be_comment() {
        let db = FixtureDatabase::new("linear_abc").with_store(
            "x",
            vec![json!({"id": "pu1", "body": "On track", "health": "onTrack", "issueId": "i1"})],
        );
        assert!(detect_stores(&db).project_updates.is_none());
    }

    #[test]
    fn users_collect_multiple_stores() {
        let user = json!({"id": "u1", "name": "ada", "displayName": "Ada", "email": "a@x.com"});
        let db = FixtureDatabase::new("linear_abc")
            .with_store("team_users", vec![user.clone()])
            .with_store("workspace_users", vec![user]);

        let stores = detect_stores(&db);
        assert_eq!(stores.users, vec!["team_users", "workspace_users"]);
    }

    #[test]
    fn first_matching_predicate_claims_store() {
        // An issue-shaped record also has name-ish fields; priority order wins.
        let db = FixtureDatabase::new("linear_abc").with_store(
            "x",
            vec![json!({
                "id": "i1", "number": 4, "teamId": "t1", "stateId": "s1",
                "title": "T", "name": "also-named", "color": "#fff", "isGroup": false
            })],
        );
        let stores = detect_stores(&db);
        assert_eq!(stores.issues.as_deref(), Some("x"));
        assert!(stores.labels.is_empty());
    }

    #[test]
    fn non_object_first_record_skips_store() {
        let db = FixtureDatabase::new("linear_abc").with_store("x", vec![json!("just a string")]);
        let stores = detect_stores(&db);
        assert!(stores.detected_kinds().is_empty());
    }
}
