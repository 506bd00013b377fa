// src/reader/load.rs
// Snapshot construction: detect stores, load and merge entities, fix up,
// apply scope, build derived indexes.

use std::collections::{HashMap, HashSet};

use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::{debug, warn};

use crate::error::{LinearFastError, Result};
use crate::store::{Database, DetectedStores, EntityKind, detect_stores};
use crate::util::now_ts;

use super::LinearLocalReader;
use super::model::*;
use super::richtext;
use super::scope::apply_account_scope;

/// What a reload observed, feeding the health rules.
#[derive(Debug, Default)]
pub(super) struct LoadReport {
    /// Entity kinds detected across all databases.
    pub detected: HashSet<EntityKind>,
    /// Store read failures that degrade the cache.
    pub hard_errors: usize,
    /// Store read failures tolerated without degrading (issue content only).
    pub soft_errors: usize,
}

/// Detection of these kinds is required for a healthy cache.
const REQUIRED_KINDS: &[EntityKind] = &[
    EntityKind::Issue,
    EntityKind::Team,
    EntityKind::User,
    EntityKind::WorkflowState,
    EntityKind::Project,
];

impl LoadReport {
    pub fn missing_required(&self) -> Vec<&'static str> {
        REQUIRED_KINDS
            .iter()
            .filter(|k| !self.detected.contains(*k))
            .map(|k| k.as_str())
            .collect()
    }
}

impl LinearLocalReader {
    /// Build a fresh snapshot from every Linear database in the catalog.
    /// Returns a hard error when no databases exist or the account scope
    /// resolves empty; store-level read failures are recorded in the report.
    pub(super) fn build_snapshot(&self) -> Result<(CachedData, LoadReport)> {
        let databases = self.catalog.databases()?;
        let linear_dbs: Vec<_> = databases
            .into_iter()
            .filter(|db| db.name().contains("linear_") && db.name() != "linear_databases")
            .filter(|db| !db.store_names().is_empty())
            .collect();
        if linear_dbs.is_empty() {
            return Err(LinearFastError::NoLinearDatabases);
        }

        let mut cache = CachedData {
            loaded_at: now_ts(),
            ..Default::default()
        };
        let mut report = LoadReport::default();

        for db in &linear_dbs {
            let stores = detect_stores(db.as_ref());
            report.detected.extend(stores.detected_kinds());
            self.load_database(db.as_ref(), &stores, &mut cache, &mut report);
        }

        resolve_identifiers(&mut cache);
        resolve_project_states(&mut cache);
        apply_issue_content(&mut cache);
        apply_account_scope(&mut cache, &self.config)?;
        build_issue_indexes(&mut cache);

        Ok((cache, report))
    }

    fn load_database(
        &self,
        db: &dyn Database,
        stores: &DetectedStores,
        cache: &mut CachedData,
        report: &mut LoadReport,
    ) {
        if let Some(store) = &stores.teams {
            for record in load_records(db, store, report, false) {
                if let Some(team) = decode::<Team>(record) {
                    cache.teams.insert(team.id.clone(), team);
                }
            }
        }

        for store in &stores.users {
            for record in load_records(db, store, report, false) {
                if let Some(user) = decode::<User>(record) {
                    if !cache.users.contains_key(&user.id) {
                        cache.users.insert(user.id.clone(), user);
                    }
                }
            }
        }

        for store in &stores.workflow_states {
            for record in load_records(db, store, report, false) {
                if let Some(state) = decode::<WorkflowState>(record) {
                    if !cache.states.contains_key(&state.id) {
                        cache.states.insert(state.id.clone(), state);
                    }
                }
            }
        }

        if let Some(store) = &stores.issues {
            for mut record in load_records(db, store, report, false) {
                let description_data = record.remove("descriptionData");
                if let Some(mut issue) = decode::<Issue>(record) {
                    if issue.description.as_deref().unwrap_or("").is_empty() {
                        if let Some(data) = &description_data {
                            let text = richtext::structured_text(data);
                            if !text.is_empty() {
                                issue.description = Some(text);
                            }
                        }
                    }
                    cache.issues.insert(issue.id.clone(), issue);
                }
            }
        }

        if let Some(store) = &stores.comments {
            for mut record in load_records(db, store, report, false) {
                let body_data = record.remove("bodyData");
                if let Some(mut comment) = decode::<Comment>(record) {
                    if comment.id.is_empty() || comment.issue_id.is_empty() {
                        continue;
                    }
                    if let Some(data) = &body_data {
                        comment.body = richtext::structured_text(data);
                    }
                    cache
                        .comments_by_issue
                        .entry(comment.issue_id.clone())
                        .or_default()
                        .push(comment.id.clone());
                    cache.comments.insert(comment.id.clone(), comment);
                }
            }
        }

        if let Some(store) = &stores.projects {
            for record in load_records(db, store, report, false) {
                if let Some(project) = decode::<Project>(record) {
                    cache.projects.insert(project.id.clone(), project);
                }
            }
        }

        if let Some(store) = &stores.issue_content {
            for record in load_records(db, store, report, true) {
                let issue_id = record.get("issueId").and_then(Value::as_str);
                let content_state = record.get("contentState").and_then(Value::as_str);
                if let (Some(issue_id), Some(content_state)) = (issue_id, content_state) {
                    let extracted = richtext::encoded_text(content_state);
                    if !extracted.is_empty() {
                        cache.issue_content.insert(issue_id.to_string(), extracted);
                    }
                }
            }
        }

        for store in &stores.labels {
            for record in load_records(db, store, report, false) {
                if let Some(label) = decode::<Label>(record) {
                    if !cache.labels.contains_key(&label.id) {
                        cache.labels.insert(label.id.clone(), label);
                    }
                }
            }
        }

        if let Some(store) = &stores.initiatives {
            for record in load_records(db, store, report, false) {
                if let Some(initiative) = decode::<Initiative>(record) {
                    cache.initiatives.insert(initiative.id.clone(), initiative);
                }
            }
        }

        if let Some(store) = &stores.cycles {
            for record in load_records(db, store, report, false) {
                if let Some(cycle) = decode::<Cycle>(record) {
                    cache.cycles.insert(cycle.id.clone(), cycle);
                }
            }
        }

        if let Some(store) = &stores.documents {
            for record in load_records(db, store, report, false) {
                if let Some(document) = decode::<Document>(record) {
                    // Documents appear in multiple versions across databases;
                    // the lexically greatest updatedAt wins.
                    if let Some(existing) = cache.documents.get(&document.id) {
                        if existing.updated_at.as_deref().unwrap_or("")
                            >= document.updated_at.as_deref().unwrap_or("")
                        {
                            continue;
                        }
                    }
                    cache.documents.insert(document.id.clone(), document);
                }
            }
        }

        if self.config.load_document_content {
            if let Some(store) = &stores.document_content {
                for record in load_records(db, store, report, false) {
                    if let Some(content) = decode::<DocumentContent>(record) {
                        if !content.document_content_id.is_empty() {
                            cache
                                .document_content
                                .insert(content.document_content_id.clone(), content);
                        }
                    }
                }
            }
        }

        if let Some(store) = &stores.milestones {
            for record in load_records(db, store, report, false) {
                if let Some(milestone) = decode::<Milestone>(record) {
                    cache.milestones.insert(milestone.id.clone(), milestone);
                }
            }
        }

        if let Some(store) = &stores.project_statuses {
            for record in load_records(db, store, report, false) {
                if let Some(status) = decode::<ProjectStatus>(record) {
                    if !cache.project_statuses.contains_key(&status.id) {
                        cache.project_statuses.insert(status.id.clone(), status);
                    }
                }
            }
        }

        if let Some(store) = &stores.project_updates {
            for record in load_records(db, store, report, false) {
                if let Some(update) = decode::<ProjectUpdate>(record) {
                    cache.project_updates.insert(update.id.clone(), update);
                }
            }
        }
    }
}

/// Read every object record of one store, tallying failures in the report.
fn load_records(
    db: &dyn Database,
    store: &str,
    report: &mut LoadReport,
    soft: bool,
) -> Vec<Map<String, Value>> {
    match db.records(store) {
        Ok(records) => records
            .filter_map(|value| match value {
                Value::Object(map) => Some(map),
                _ => None,
            })
            .collect(),
        Err(e) => {
            if soft {
                report.soft_errors += 1;
                debug!(db = db.name(), store = store, error = %e, "Soft store read failure");
            } else {
                report.hard_errors += 1;
                warn!(db = db.name(), store = store, error = %e, "Store read failure");
            }
            Vec::new()
        }
    }
}

fn decode<T: DeserializeOwned + HasId>(record: Map<String, Value>) -> Option<T> {
    match serde_json::from_value::<T>(Value::Object(record)) {
        Ok(entity) if !entity.id().is_empty() => Some(entity),
        Ok(_) => None,
        Err(e) => {
            debug!(error = %e, "Skipping malformed record");
            None
        }
    }
}

/// Entities addressable by string id.
trait HasId {
    fn id(&self) -> &str;
}

macro_rules! has_id {
    ($($ty:ty),* $(,)?) => {
        $(impl HasId for $ty {
            fn id(&self) -> &str {
                &self.id
            }
        })*
    };
}

has_id!(
    Team,
    User,
    WorkflowState,
    Issue,
    Comment,
    Project,
    Label,
    Initiative,
    Cycle,
    Document,
    DocumentContent,
    Milestone,
    ProjectUpdate,
    ProjectStatus,
);

/// Derive `identifier` after all databases merged so cross-database
/// team/issue splits still resolve.
fn resolve_identifiers(cache: &mut CachedData) {
    let keys: HashMap<String, String> = cache
        .teams
        .iter()
        .filter_map(|(id, team)| team.key.clone().map(|key| (id.clone(), key)))
        .collect();

    for issue in cache.issues.values_mut() {
        let key = issue
            .team_id
            .as_ref()
            .and_then(|id| keys.get(id))
            .map(String::as_str)
            .unwrap_or("???");
        let number = issue
            .number
            .map(|n| n.to_string())
            .unwrap_or_else(|| "?".to_string());
        issue.identifier = format!("{key}-{number}");
    }
}

/// Resolve `project.state` from the status map after all databases merged.
fn resolve_project_states(cache: &mut CachedData) {
    let names: HashMap<String, Option<String>> = cache
        .project_statuses
        .iter()
        .map(|(id, status)| (id.clone(), status.name.clone()))
        .collect();

    for project in cache.projects.values_mut() {
        if let Some(status_id) = &project.status_id {
            if let Some(name) = names.get(status_id) {
                project.state = name.clone();
            }
        }
    }
}

/// Fill issue descriptions from extracted issue content where missing.
fn apply_issue_content(cache: &mut CachedData) {
    for (issue_id, text) in &cache.issue_content {
        if let Some(issue) = cache.issues.get_mut(issue_id) {
            if issue.description.as_deref().unwrap_or("").is_empty() {
                issue.description = Some(text.clone());
            }
        }
    }
}

/// Build the O(1) count indexes from the retained issues.
fn build_issue_indexes(cache: &mut CachedData) {
    let mut by_team: HashMap<String, usize> = HashMap::new();
    let mut by_project: HashMap<String, usize> = HashMap::new();
    let mut by_user: HashMap<String, usize> = HashMap::new();
    let mut states_by_team: HashMap<String, StateCounts> = HashMap::new();
    let mut states_by_project: HashMap<String, StateCounts> = HashMap::new();
    let mut states_by_user: HashMap<String, StateCounts> = HashMap::new();

    for issue in cache.issues.values() {
        let state_type = cache.state_type(issue.state_id.as_deref());

        if let Some(team_id) = &issue.team_id {
            *by_team.entry(team_id.clone()).or_default() += 1;
            *states_by_team
                .entry(team_id.clone())
                .or_default()
                .entry(state_type.clone())
                .or_default() += 1;
        }
        if let Some(project_id) = &issue.project_id {
            *by_project.entry(project_id.clone()).or_default() += 1;
            *states_by_project
                .entry(project_id.clone())
                .or_default()
                .entry(state_type.clone())
                .or_default() += 1;
        }
        if let Some(assignee_id) = &issue.assignee_id {
            *by_user.entry(assignee_id.clone()).or_default() += 1;
            *states_by_user
                .entry(assignee_id.clone())
                .or_default()
                .entry(state_type.clone())
                .or_default() += 1;
        }
    }

    cache.issue_counts_by_team = by_team;
    cache.issue_counts_by_project = by_project;
    cache.issue_counts_by_user = by_user;
    cache.issue_state_counts_by_team = states_by_team;
    cache.issue_state_counts_by_project = states_by_project;
    cache.issue_state_counts_by_user = states_by_user;
}
