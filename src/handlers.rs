// src/handlers.rs
// Local read handlers: thin projections over the cache reader.
//
// Every handler shares one signature so the router can dispatch by name.
// Handlers return typed fallback errors when a requested filter is only
// available upstream; anything else unexpected becomes an internal error
// and the router retries the call against the official MCP.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{Map, Value, json};

use crate::error::{FallbackReason, HandlerError, LinearFastError};
use crate::reader::{CachedData, Issue, LinearLocalReader, Project, ProjectUpdate, Team};
use crate::router::LocalBackend;

pub type LocalHandler =
    fn(&LinearLocalReader, &Map<String, Value>) -> Result<Value, HandlerError>;

/// Dispatch table of local read handlers.
pub fn lookup(tool_name: &str) -> Option<LocalHandler> {
    Some(match tool_name {
        "list_issues" => list_issues,
        "get_issue" => get_issue,
        "list_teams" => list_teams,
        "get_team" => get_team,
        "list_projects" => list_projects,
        "get_project" => get_project,
        "list_users" => list_users,
        "get_user" => get_user,
        "list_issue_statuses" => list_issue_statuses,
        "get_issue_status" => get_issue_status,
        "list_comments" => list_comments,
        "list_issue_labels" => list_issue_labels,
        "list_initiatives" => list_initiatives,
        "get_initiative" => get_initiative,
        "list_cycles" => list_cycles,
        "list_documents" => list_documents,
        "get_document" => get_document,
        "list_milestones" => list_milestones,
        "get_milestone" => get_milestone,
        "get_status_updates" => get_status_updates,
        "list_project_updates" => list_project_updates,
        _ => return None,
    })
}

pub fn is_registered(tool_name: &str) -> bool {
    lookup(tool_name).is_some()
}

/// Production [`LocalBackend`]: the dispatch table over a shared reader.
/// Handler bodies do blocking snapshot work, so calls run on the blocking
/// pool.
pub struct LocalCache {
    reader: Arc<LinearLocalReader>,
}

impl LocalCache {
    pub fn new(reader: Arc<LinearLocalReader>) -> Self {
        Self { reader }
    }
}

#[async_trait]
impl LocalBackend for LocalCache {
    fn ensure_fresh(&self) {
        self.reader.ensure_fresh();
    }

    fn is_degraded(&self) -> bool {
        self.reader.is_degraded()
    }

    fn has_handler(&self, tool_name: &str) -> bool {
        is_registered(tool_name)
    }

    async fn call(
        &self,
        tool_name: &str,
        arguments: &Map<String, Value>,
    ) -> Result<Value, HandlerError> {
        let Some(handler) = lookup(tool_name) else {
            return Err(HandlerError::fallback(
                FallbackReason::UnsupportedTool,
                format!("tool '{tool_name}' not implemented in local cache"),
            ));
        };
        let reader = self.reader.clone();
        let arguments = arguments.clone();
        tokio::task::spawn_blocking(move || handler(&reader, &arguments))
            .await
            .map_err(|e| HandlerError::Internal(e.to_string()))?
    }

    async fn refresh(&self) -> Result<(), String> {
        let reader = self.reader.clone();
        tokio::task::spawn_blocking(move || reader.refresh_cache(true))
            .await
            .map_err(|e| e.to_string())?
            .map_err(|e| e.to_string())
    }

    fn get_health(&self) -> Value {
        self.reader.get_health()
    }
}

impl From<LinearFastError> for HandlerError {
    fn from(err: LinearFastError) -> Self {
        HandlerError::Internal(err.to_string())
    }
}

fn unsupported_filter(message: impl Into<String>) -> HandlerError {
    HandlerError::fallback(FallbackReason::UnsupportedFilter, message)
}

fn arg_str<'a>(args: &'a Map<String, Value>, key: &str) -> Option<&'a str> {
    args.get(key).and_then(Value::as_str).filter(|s| !s.is_empty())
}

fn arg_i64(args: &Map<String, Value>, key: &str) -> Option<i64> {
    args.get(key).and_then(Value::as_i64)
}

fn arg_present(args: &Map<String, Value>, key: &str) -> bool {
    args.get(key).is_some_and(|v| !v.is_null())
}

fn limit_from(args: &Map<String, Value>, default: i64) -> i64 {
    arg_i64(args, "limit").unwrap_or(default)
}

/// Apply a `limit` with the convention that 0 or negative returns all.
fn truncate<T>(mut items: Vec<T>, limit: i64) -> Vec<T> {
    if limit > 0 && items.len() > limit as usize {
        items.truncate(limit as usize);
    }
    items
}

fn user_name(cache: &CachedData, user_id: Option<&str>) -> Value {
    match user_id {
        None => Value::Null,
        Some(id) => cache
            .users
            .get(id)
            .map(|u| {
                json!(
                    u.name
                        .clone()
                        .or_else(|| u.display_name.clone())
                        .unwrap_or_else(|| "Unknown".to_string())
                )
            })
            .unwrap_or(Value::Null),
    }
}

fn project_name(cache: &CachedData, project_id: Option<&str>) -> Value {
    project_id
        .and_then(|id| cache.projects.get(id))
        .and_then(|p| p.name.clone())
        .map(Value::String)
        .unwrap_or(Value::Null)
}

/// Resolve a team by id, key, or name.
fn resolve_team<'a>(cache: &'a CachedData, query: &str) -> Option<&'a Team> {
    if let Some(team) = cache.teams.get(query) {
        return Some(team);
    }
    let upper = query.to_uppercase();
    let lower = query.to_lowercase();
    cache
        .teams
        .values()
        .find(|t| t.key.as_deref() == Some(upper.as_str()))
        .or_else(|| {
            cache.teams.values().find(|t| {
                t.name
                    .as_deref()
                    .is_some_and(|n| n.to_lowercase().contains(&lower))
            })
        })
}

/// Resolve a project by id, then by name/slug search.
fn resolve_project(
    reader: &LinearLocalReader,
    cache: &CachedData,
    query: &str,
) -> Result<Option<Project>, HandlerError> {
    if let Some(project) = cache.projects.get(query) {
        return Ok(Some(project.clone()));
    }
    Ok(reader.find_project(query)?)
}

fn issue_summary(cache: &CachedData, issue: &Issue) -> Value {
    json!({
        "identifier": issue.identifier,
        "title": issue.title,
        "priority": issue.priority,
        "state": cache.state_name(issue.state_id.as_deref()),
        "stateType": cache.state_type(issue.state_id.as_deref()),
        "assignee": user_name(cache, issue.assignee_id.as_deref()),
        "dueDate": issue.due_date,
    })
}

fn list_issues(
    reader: &LinearLocalReader,
    args: &Map<String, Value>,
) -> Result<Value, HandlerError> {
    let cache = reader.snapshot()?;

    let assignee = match arg_str(args, "assignee") {
        Some(query) => match reader.find_user(query)? {
            Some(user) => Some(user),
            None => return Ok(json!({ "issues": [], "totalCount": 0 })),
        },
        None => None,
    };
    let team = match arg_str(args, "team") {
        Some(query) => match resolve_team(&cache, query) {
            Some(team) => Some(team.clone()),
            None => return Ok(json!({ "issues": [], "totalCount": 0 })),
        },
        None => None,
    };
    let project = match arg_str(args, "project") {
        Some(query) => match resolve_project(reader, &cache, query)? {
            Some(project) => Some(project),
            None => return Ok(json!({ "issues": [], "totalCount": 0 })),
        },
        None => None,
    };
    let state = arg_str(args, "state").map(str::to_lowercase);
    let priority = arg_i64(args, "priority");
    let query = arg_str(args, "query").map(str::to_lowercase);
    let order_by = arg_str(args, "orderBy").unwrap_or("updatedAt");

    let mut matched: Vec<&Issue> = cache
        .issues
        .values()
        .filter(|issue| {
            if let Some(user) = &assignee {
                if issue.assignee_id.as_deref() != Some(user.id.as_str()) {
                    return false;
                }
            }
            if let Some(team) = &team {
                if issue.team_id.as_deref() != Some(team.id.as_str()) {
                    return false;
                }
            }
            if let Some(project) = &project {
                if issue.project_id.as_deref() != Some(project.id.as_str()) {
                    return false;
                }
            }
            if let Some(state) = &state {
                let name = cache.state_name(issue.state_id.as_deref()).to_lowercase();
                let state_type = cache.state_type(issue.state_id.as_deref()).to_lowercase();
                if name != *state && state_type != *state {
                    return false;
                }
            }
            if let Some(priority) = priority {
                if issue.priority != Some(priority) {
                    return false;
                }
            }
            if let Some(query) = &query {
                if !issue
                    .title
                    .as_deref()
                    .unwrap_or("")
                    .to_lowercase()
                    .contains(query)
                {
                    return false;
                }
            }
            true
        })
        .collect();

    // Descending by the requested timestamp field
    if order_by == "createdAt" {
        matched.sort_by(|a, b| {
            b.created_at
                .as_deref()
                .unwrap_or("")
                .cmp(a.created_at.as_deref().unwrap_or(""))
        });
    } else {
        matched.sort_by(|a, b| {
            b.updated_at
                .as_deref()
                .unwrap_or("")
                .cmp(a.updated_at.as_deref().unwrap_or(""))
        });
    }

    let total = matched.len();
    let limited = truncate(matched, limit_from(args, 50));
    let issues: Vec<Value> = limited
        .into_iter()
        .map(|issue| issue_summary(&cache, issue))
        .collect();

    Ok(json!({ "issues": issues, "totalCount": total }))
}

fn get_issue(
    reader: &LinearLocalReader,
    args: &Map<String, Value>,
) -> Result<Value, HandlerError> {
    let Some(id) = arg_str(args, "id") else {
        return Ok(Value::Null);
    };
    let cache = reader.snapshot()?;
    let Some(issue) = reader.get_issue_by_identifier(id)? else {
        return Ok(Value::Null);
    };

    let comments: Vec<Value> = reader
        .get_comments_for_issue(&issue.id)?
        .iter()
        .map(|comment| {
            json!({
                "author": user_name(&cache, comment.user_id.as_deref()),
                "body": comment.body,
                "createdAt": comment.created_at,
            })
        })
        .collect();

    Ok(json!({
        "identifier": issue.identifier,
        "title": issue.title,
        "description": issue.description,
        "priority": issue.priority,
        "estimate": issue.estimate,
        "state": cache.state_name(issue.state_id.as_deref()),
        "stateType": cache.state_type(issue.state_id.as_deref()),
        "assignee": user_name(&cache, issue.assignee_id.as_deref()),
        "project": project_name(&cache, issue.project_id.as_deref()),
        "dueDate": issue.due_date,
        "createdAt": issue.created_at,
        "updatedAt": issue.updated_at,
        "comments": comments,
    }))
}

fn list_teams(
    reader: &LinearLocalReader,
    _args: &Map<String, Value>,
) -> Result<Value, HandlerError> {
    let cache = reader.snapshot()?;
    let mut teams: Vec<&Team> = cache.teams.values().collect();
    teams.sort_by(|a, b| {
        a.key
            .as_deref()
            .unwrap_or("")
            .cmp(b.key.as_deref().unwrap_or(""))
    });

    let teams: Vec<Value> = teams
        .into_iter()
        .map(|team| {
            json!({
                "key": team.key,
                "name": team.name,
                "issueCount": cache.issue_counts_by_team.get(&team.id).copied().unwrap_or(0),
            })
        })
        .collect();
    Ok(json!(teams))
}

fn get_team(
    reader: &LinearLocalReader,
    args: &Map<String, Value>,
) -> Result<Value, HandlerError> {
    let Some(query) = arg_str(args, "query") else {
        return Ok(Value::Null);
    };
    let Some(team) = reader.find_team(query)? else {
        return Ok(Value::Null);
    };
    let cache = reader.snapshot()?;

    Ok(json!({
        "id": team.id,
        "key": team.key,
        "name": team.name,
        "description": team.description,
        "issueCount": cache.issue_counts_by_team.get(&team.id).copied().unwrap_or(0),
        "issuesByState": json!(cache.issue_state_counts_by_team.get(&team.id).cloned().unwrap_or_default()),
    }))
}

fn list_projects(
    reader: &LinearLocalReader,
    args: &Map<String, Value>,
) -> Result<Value, HandlerError> {
    let cache = reader.snapshot()?;

    let team = match arg_str(args, "team") {
        Some(query) => match resolve_team(&cache, query) {
            Some(team) => Some(team.clone()),
            None => return Ok(json!([])),
        },
        None => None,
    };

    let mut projects: Vec<&Project> = cache
        .projects
        .values()
        .filter(|project| match &team {
            Some(team) => project.team_ids.contains(&team.id),
            None => true,
        })
        .collect();
    projects.sort_by(|a, b| {
        a.name
            .as_deref()
            .unwrap_or("")
            .cmp(b.name.as_deref().unwrap_or(""))
    });

    let projects: Vec<Value> = projects
        .into_iter()
        .map(|project| {
            json!({
                "name": project.name,
                "state": project.state,
                "issueCount": cache.issue_counts_by_project.get(&project.id).copied().unwrap_or(0),
                "startDate": project.start_date,
                "targetDate": project.target_date,
            })
        })
        .collect();
    Ok(json!(projects))
}

fn get_project(
    reader: &LinearLocalReader,
    args: &Map<String, Value>,
) -> Result<Value, HandlerError> {
    let Some(query) = arg_str(args, "query") else {
        return Ok(Value::Null);
    };
    let Some(project) = reader.find_project(query)? else {
        return Ok(Value::Null);
    };
    let cache = reader.snapshot()?;

    Ok(json!({
        "id": project.id,
        "name": project.name,
        "description": project.description,
        "state": project.state,
        "startDate": project.start_date,
        "targetDate": project.target_date,
        "issueCount": cache.issue_counts_by_project.get(&project.id).copied().unwrap_or(0),
        "issuesByState": json!(cache.issue_state_counts_by_project.get(&project.id).cloned().unwrap_or_default()),
    }))
}

fn list_users(
    reader: &LinearLocalReader,
    _args: &Map<String, Value>,
) -> Result<Value, HandlerError> {
    let cache = reader.snapshot()?;
    let users: Vec<Value> = cache
        .users
        .values()
        .map(|user| {
            json!({
                "id": user.id,
                "name": user.name,
                "email": user.email,
                "displayName": user.display_name,
                "assignedIssueCount": cache.issue_counts_by_user.get(&user.id).copied().unwrap_or(0),
            })
        })
        .collect();
    Ok(json!(users))
}

fn get_user(
    reader: &LinearLocalReader,
    args: &Map<String, Value>,
) -> Result<Value, HandlerError> {
    let Some(query) = arg_str(args, "query") else {
        return Ok(Value::Null);
    };
    let Some(user) = reader.find_user(query)? else {
        return Ok(Value::Null);
    };
    let cache = reader.snapshot()?;

    Ok(json!({
        "id": user.id,
        "name": user.name,
        "email": user.email,
        "displayName": user.display_name,
        "assignedIssueCount": cache.issue_counts_by_user.get(&user.id).copied().unwrap_or(0),
        "issuesByState": json!(cache.issue_state_counts_by_user.get(&user.id).cloned().unwrap_or_default()),
    }))
}

fn list_issue_statuses(
    reader: &LinearLocalReader,
    args: &Map<String, Value>,
) -> Result<Value, HandlerError> {
    let cache = reader.snapshot()?;
    let Some(team) = arg_str(args, "team").and_then(|q| resolve_team(&cache, q)) else {
        return Ok(json!([]));
    };

    let mut states: Vec<_> = cache
        .states
        .values()
        .filter(|state| state.team_id.as_deref() == Some(team.id.as_str()))
        .collect();
    states.sort_by(|a, b| {
        a.position
            .unwrap_or(0.0)
            .partial_cmp(&b.position.unwrap_or(0.0))
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let states: Vec<Value> = states
        .into_iter()
        .map(|state| {
            json!({
                "id": state.id,
                "name": state.name,
                "type": state.r#type,
                "color": state.color,
                "position": state.position,
            })
        })
        .collect();
    Ok(json!(states))
}

fn get_issue_status(
    reader: &LinearLocalReader,
    args: &Map<String, Value>,
) -> Result<Value, HandlerError> {
    let cache = reader.snapshot()?;
    let Some(team) = arg_str(args, "team").and_then(|q| resolve_team(&cache, q)).cloned() else {
        return Ok(Value::Null);
    };

    let state = if let Some(id) = arg_str(args, "id") {
        cache
            .states
            .get(id)
            .filter(|s| s.team_id.as_deref() == Some(team.id.as_str()))
            .cloned()
    } else if let Some(name) = arg_str(args, "name") {
        reader.find_issue_status(&team.id, name)?
    } else {
        None
    };

    Ok(match state {
        Some(state) => json!({
            "id": state.id,
            "name": state.name,
            "type": state.r#type,
            "color": state.color,
            "position": state.position,
            "team": team.name,
        }),
        None => Value::Null,
    })
}

fn list_comments(
    reader: &LinearLocalReader,
    args: &Map<String, Value>,
) -> Result<Value, HandlerError> {
    let Some(issue_identifier) = arg_str(args, "issueId") else {
        return Ok(json!([]));
    };
    let Some(issue) = reader.get_issue_by_identifier(issue_identifier)? else {
        return Ok(json!([]));
    };
    let cache = reader.snapshot()?;

    let comments: Vec<Value> = reader
        .get_comments_for_issue(&issue.id)?
        .iter()
        .map(|comment| {
            json!({
                "id": comment.id,
                "author": user_name(&cache, comment.user_id.as_deref()),
                "body": comment.body,
                "createdAt": comment.created_at,
                "updatedAt": comment.updated_at,
            })
        })
        .collect();
    Ok(json!(comments))
}

fn list_issue_labels(
    reader: &LinearLocalReader,
    args: &Map<String, Value>,
) -> Result<Value, HandlerError> {
    let cache = reader.snapshot()?;

    let team = match arg_str(args, "team") {
        Some(query) => match resolve_team(&cache, query) {
            Some(team) => Some(team.clone()),
            None => return Ok(json!([])),
        },
        None => None,
    };

    let mut labels: Vec<_> = cache
        .labels
        .values()
        .filter(|label| match &team {
            Some(team) => label.team_id.as_deref() == Some(team.id.as_str()),
            None => true,
        })
        .collect();
    labels.sort_by(|a, b| {
        a.name
            .as_deref()
            .unwrap_or("")
            .cmp(b.name.as_deref().unwrap_or(""))
    });

    let labels: Vec<Value> = labels
        .into_iter()
        .map(|label| {
            json!({
                "id": label.id,
                "name": label.name,
                "color": label.color,
                "isGroup": label.is_group,
            })
        })
        .collect();
    Ok(json!(labels))
}

fn list_initiatives(
    reader: &LinearLocalReader,
    _args: &Map<String, Value>,
) -> Result<Value, HandlerError> {
    let cache = reader.snapshot()?;
    let mut initiatives: Vec<_> = cache.initiatives.values().collect();
    initiatives.sort_by(|a, b| {
        a.name
            .as_deref()
            .unwrap_or("")
            .cmp(b.name.as_deref().unwrap_or(""))
    });

    let initiatives: Vec<Value> = initiatives
        .into_iter()
        .map(|initiative| {
            json!({
                "id": initiative.id,
                "name": initiative.name,
                "slugId": initiative.slug_id,
                "color": initiative.color,
                "status": initiative.status,
                "owner": user_name(&cache, initiative.owner_id.as_deref()),
            })
        })
        .collect();
    Ok(json!(initiatives))
}

fn get_initiative(
    reader: &LinearLocalReader,
    args: &Map<String, Value>,
) -> Result<Value, HandlerError> {
    let Some(query) = arg_str(args, "query") else {
        return Ok(Value::Null);
    };
    let Some(initiative) = reader.find_initiative(query)? else {
        return Ok(Value::Null);
    };
    let cache = reader.snapshot()?;

    Ok(json!({
        "id": initiative.id,
        "name": initiative.name,
        "slugId": initiative.slug_id,
        "color": initiative.color,
        "status": initiative.status,
        "owner": user_name(&cache, initiative.owner_id.as_deref()),
        "teamIds": initiative.team_ids,
        "createdAt": initiative.created_at,
        "updatedAt": initiative.updated_at,
    }))
}

fn list_cycles(
    reader: &LinearLocalReader,
    args: &Map<String, Value>,
) -> Result<Value, HandlerError> {
    let cache = reader.snapshot()?;
    let Some(team) = arg_str(args, "teamId").and_then(|q| resolve_team(&cache, q)).cloned()
    else {
        return Ok(json!([]));
    };

    let cycles: Vec<Value> = reader
        .get_cycles_for_team(&team.id)?
        .iter()
        .map(|cycle| {
            json!({
                "id": cycle.id,
                "number": cycle.number,
                "startsAt": cycle.starts_at,
                "endsAt": cycle.ends_at,
                "completedAt": cycle.completed_at,
                "progress": cycle.current_progress,
            })
        })
        .collect();
    Ok(json!(cycles))
}

fn list_documents(
    reader: &LinearLocalReader,
    args: &Map<String, Value>,
) -> Result<Value, HandlerError> {
    let cache = reader.snapshot()?;

    let mut documents = match arg_str(args, "project") {
        Some(query) => match resolve_project(reader, &cache, query)? {
            Some(project) => reader.get_documents_for_project(&project.id)?,
            None => return Ok(json!([])),
        },
        None => cache.documents.values().cloned().collect(),
    };
    documents.sort_by(|a, b| {
        b.updated_at
            .as_deref()
            .unwrap_or("")
            .cmp(a.updated_at.as_deref().unwrap_or(""))
    });

    let documents: Vec<Value> = documents
        .iter()
        .map(|document| {
            json!({
                "id": document.id,
                "title": document.title,
                "slugId": document.slug_id,
                "project": project_name(&cache, document.project_id.as_deref()),
                "createdAt": document.created_at,
                "updatedAt": document.updated_at,
            })
        })
        .collect();
    Ok(json!(documents))
}

fn get_document(
    reader: &LinearLocalReader,
    args: &Map<String, Value>,
) -> Result<Value, HandlerError> {
    let Some(id) = arg_str(args, "id") else {
        return Ok(Value::Null);
    };
    let cache = reader.snapshot()?;

    let document = match cache.documents.get(id) {
        Some(document) => Some(document.clone()),
        None => reader.find_document(id)?,
    };
    let Some(document) = document else {
        return Ok(Value::Null);
    };

    Ok(json!({
        "id": document.id,
        "title": document.title,
        "slugId": document.slug_id,
        "project": project_name(&cache, document.project_id.as_deref()),
        "creator": user_name(&cache, document.creator_id.as_deref()),
        "createdAt": document.created_at,
        "updatedAt": document.updated_at,
    }))
}

fn list_milestones(
    reader: &LinearLocalReader,
    args: &Map<String, Value>,
) -> Result<Value, HandlerError> {
    let cache = reader.snapshot()?;
    let Some(project) = arg_str(args, "project")
        .map(|q| resolve_project(reader, &cache, q))
        .transpose()?
        .flatten()
    else {
        return Ok(json!([]));
    };

    let milestones: Vec<Value> = reader
        .get_milestones_for_project(&project.id)?
        .iter()
        .map(|milestone| {
            json!({
                "id": milestone.id,
                "name": milestone.name,
                "targetDate": milestone.target_date,
                "progress": milestone.current_progress,
            })
        })
        .collect();
    Ok(json!(milestones))
}

fn get_milestone(
    reader: &LinearLocalReader,
    args: &Map<String, Value>,
) -> Result<Value, HandlerError> {
    let cache = reader.snapshot()?;
    let (Some(project_query), Some(query)) = (arg_str(args, "project"), arg_str(args, "query"))
    else {
        return Ok(Value::Null);
    };
    let Some(project) = resolve_project(reader, &cache, project_query)? else {
        return Ok(Value::Null);
    };
    let Some(milestone) = reader.find_milestone(&project.id, query)? else {
        return Ok(Value::Null);
    };

    Ok(json!({
        "id": milestone.id,
        "name": milestone.name,
        "project": project.name,
        "targetDate": milestone.target_date,
        "sortOrder": milestone.sort_order,
        "progress": milestone.current_progress,
    }))
}

fn get_status_updates(
    reader: &LinearLocalReader,
    args: &Map<String, Value>,
) -> Result<Value, HandlerError> {
    // The local cache only holds project updates; anything else is official-only.
    match arg_str(args, "type") {
        Some("project") => {}
        Some(other) => {
            return Err(unsupported_filter(format!(
                "status update type '{other}' is only available from official MCP"
            )));
        }
        None => return Err(unsupported_filter("status update type is required")),
    }
    for filter in ["initiative", "cursor", "createdAt", "updatedAt"] {
        if arg_present(args, filter) {
            return Err(unsupported_filter(format!(
                "filter '{filter}' is only available from official MCP"
            )));
        }
    }
    if args.get("includeArchived").and_then(Value::as_bool) == Some(true) {
        return Err(unsupported_filter(
            "includeArchived is only available from official MCP",
        ));
    }

    let cache = reader.snapshot()?;

    let updates = match arg_str(args, "project") {
        Some(query) => match resolve_project(reader, &cache, query)? {
            Some(project) => reader.get_updates_for_project(&project.id)?,
            None => Vec::new(),
        },
        None => {
            let mut all: Vec<_> = cache.project_updates.values().cloned().collect();
            let order_by = arg_str(args, "orderBy").unwrap_or("createdAt");
            if order_by == "updatedAt" {
                all.sort_by(|a, b| {
                    b.updated_at
                        .as_deref()
                        .unwrap_or("")
                        .cmp(a.updated_at.as_deref().unwrap_or(""))
                });
            } else {
                all.sort_by(|a, b| {
                    b.created_at
                        .as_deref()
                        .unwrap_or("")
                        .cmp(a.created_at.as_deref().unwrap_or(""))
                });
            }
            all
        }
    };

    let user = match arg_str(args, "user") {
        Some(query) => match reader.find_user(query)? {
            Some(user) => Some(user),
            None => return Ok(json!({ "statusUpdates": [], "totalCount": 0 })),
        },
        None => None,
    };
    let wanted_id = arg_str(args, "id");

    let filtered: Vec<_> = updates
        .into_iter()
        .filter(|update| {
            if let Some(id) = wanted_id {
                if update.id != id {
                    return false;
                }
            }
            if let Some(user) = &user {
                if update.user_id.as_deref() != Some(user.id.as_str()) {
                    return false;
                }
            }
            true
        })
        .collect();

    let total = filtered.len();
    let limited = truncate(filtered, limit_from(args, 50));
    let updates: Vec<Value> = limited
        .iter()
        .map(|update| project_update_value(&cache, update))
        .collect();

    Ok(json!({ "statusUpdates": updates, "totalCount": total }))
}

fn list_project_updates(
    reader: &LinearLocalReader,
    args: &Map<String, Value>,
) -> Result<Value, HandlerError> {
    let cache = reader.snapshot()?;
    let Some(project) = arg_str(args, "project")
        .map(|q| resolve_project(reader, &cache, q))
        .transpose()?
        .flatten()
    else {
        return Ok(json!([]));
    };

    let updates: Vec<Value> = reader
        .get_updates_for_project(&project.id)?
        .iter()
        .map(|update| project_update_value(&cache, update))
        .collect();
    Ok(json!(updates))
}

fn project_update_value(cache: &CachedData, update: &ProjectUpdate) -> Value {
    json!({
        "id": update.id,
        "body": update.body,
        "health": update.health,
        "author": user_name(cache, update.user_id.as_deref()),
        "project": project_name(cache, update.project_id.as_deref()),
        "createdAt": update.created_at,
        "updatedAt": update.updated_at,
    })
}
