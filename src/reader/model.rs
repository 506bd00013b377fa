// src/reader/model.rs
// Typed entities held by the cache snapshot.
//
// Raw object-store records carry many more fields than the cache keeps;
// deserialization retains only the modeled subset. Field names serialize
// back out in the camelCase shape clients expect.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::util::now_ts;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Team {
    pub id: String,
    pub key: Option<String>,
    pub name: Option<String>,
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct User {
    pub id: String,
    pub name: Option<String>,
    pub display_name: Option<String>,
    pub email: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub organization_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_account_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active: Option<bool>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct WorkflowState {
    pub id: String,
    pub name: Option<String>,
    /// One of started/unstarted/completed/canceled/backlog.
    pub r#type: Option<String>,
    pub color: Option<String>,
    pub team_id: Option<String>,
    pub position: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Issue {
    pub id: String,
    /// Derived "{teamKey}-{number}"; never trusted from the raw record.
    #[serde(skip_deserializing)]
    pub identifier: String,
    pub title: Option<String>,
    pub description: Option<String>,
    pub number: Option<i64>,
    pub priority: Option<i64>,
    pub estimate: Option<f64>,
    pub team_id: Option<String>,
    pub state_id: Option<String>,
    pub assignee_id: Option<String>,
    pub project_id: Option<String>,
    pub label_ids: Vec<String>,
    pub due_date: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Comment {
    pub id: String,
    pub issue_id: String,
    pub user_id: Option<String>,
    /// Plain text extracted from the structured body at load time.
    #[serde(skip_deserializing)]
    pub body: String,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Project {
    pub id: String,
    pub name: Option<String>,
    pub description: Option<String>,
    pub slug_id: Option<String>,
    pub icon: Option<String>,
    pub color: Option<String>,
    /// Resolved from `project_statuses[statusId].name` after all databases
    /// are merged; the raw record's own state field is ignored.
    #[serde(skip_deserializing)]
    pub state: Option<String>,
    pub status_id: Option<String>,
    pub priority: Option<i64>,
    pub team_ids: Vec<String>,
    pub member_ids: Vec<String>,
    pub lead_id: Option<String>,
    pub start_date: Option<String>,
    pub target_date: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Label {
    pub id: String,
    pub name: Option<String>,
    pub color: Option<String>,
    pub is_group: Option<bool>,
    pub parent_id: Option<String>,
    pub team_id: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Initiative {
    pub id: String,
    pub name: Option<String>,
    pub slug_id: Option<String>,
    pub color: Option<String>,
    pub status: Option<String>,
    pub owner_id: Option<String>,
    pub team_ids: Vec<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Cycle {
    pub id: String,
    pub number: Option<i64>,
    pub team_id: Option<String>,
    pub starts_at: Option<String>,
    pub ends_at: Option<String>,
    pub completed_at: Option<String>,
    pub current_progress: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Document {
    pub id: String,
    pub title: Option<String>,
    pub slug_id: Option<String>,
    pub project_id: Option<String>,
    pub creator_id: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DocumentContent {
    pub id: String,
    pub document_content_id: String,
    pub content_data: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct Milestone {
    pub id: String,
    pub name: Option<String>,
    pub project_id: Option<String>,
    pub target_date: Option<String>,
    pub sort_order: Option<f64>,
    pub current_progress: Option<Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectUpdate {
    pub id: String,
    pub body: Option<String>,
    pub health: Option<String>,
    pub project_id: Option<String>,
    pub user_id: Option<String>,
    pub created_at: Option<String>,
    pub updated_at: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct ProjectStatus {
    pub id: String,
    pub name: Option<String>,
    pub color: Option<String>,
    pub r#type: Option<String>,
}

/// Per-state-type issue tallies, keyed by the workflow state's `type`.
pub type StateCounts = HashMap<String, usize>;

/// One immutable snapshot of the local Linear data.
///
/// Owned exclusively by the reader and replaced atomically on reload;
/// readers hold an `Arc` to whichever snapshot was installed when they
/// started.
#[derive(Debug, Clone, Default)]
pub struct CachedData {
    pub teams: IndexMap<String, Team>,
    pub users: IndexMap<String, User>,
    pub states: IndexMap<String, WorkflowState>,
    pub issues: IndexMap<String, Issue>,
    pub comments: IndexMap<String, Comment>,
    pub comments_by_issue: HashMap<String, Vec<String>>,
    pub projects: IndexMap<String, Project>,
    /// issueId -> extracted description text
    pub issue_content: HashMap<String, String>,
    pub labels: IndexMap<String, Label>,
    pub initiatives: IndexMap<String, Initiative>,
    pub cycles: IndexMap<String, Cycle>,
    pub documents: IndexMap<String, Document>,
    pub document_content: HashMap<String, DocumentContent>,
    pub milestones: IndexMap<String, Milestone>,
    pub project_updates: IndexMap<String, ProjectUpdate>,
    pub project_statuses: IndexMap<String, ProjectStatus>,

    pub issue_counts_by_team: HashMap<String, usize>,
    pub issue_counts_by_project: HashMap<String, usize>,
    pub issue_counts_by_user: HashMap<String, usize>,
    pub issue_state_counts_by_team: HashMap<String, StateCounts>,
    pub issue_state_counts_by_project: HashMap<String, StateCounts>,
    pub issue_state_counts_by_user: HashMap<String, StateCounts>,

    /// Epoch seconds of snapshot installation; 0 = never loaded.
    pub loaded_at: f64,
}

impl CachedData {
    pub fn is_expired(&self, ttl: std::time::Duration) -> bool {
        now_ts() - self.loaded_at > ttl.as_secs_f64()
    }

    /// Resolve an issue's workflow state type ("unknown" when unresolvable).
    pub fn state_type(&self, state_id: Option<&str>) -> String {
        state_id
            .and_then(|id| self.states.get(id))
            .and_then(|s| s.r#type.clone())
            .unwrap_or_else(|| "unknown".to_string())
    }

    /// Resolve an issue's workflow state name.
    pub fn state_name(&self, state_id: Option<&str>) -> String {
        state_id
            .and_then(|id| self.states.get(id))
            .and_then(|s| s.name.clone())
            .unwrap_or_else(|| "Unknown".to_string())
    }
}
