// src/reader/mod.rs
// Linear local data reader with TTL-based caching.
//
// Reads the desktop app's object-store snapshot to answer issue, user, team,
// workflow-state and project queries without API calls. Data is cached in
// memory and replaced atomically on reload.

mod load;
pub mod model;
pub mod richtext;
mod scope;

pub use model::*;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, RwLock};

use serde_json::{Value, json};
use tracing::{debug, warn};

use crate::config::CacheConfig;
use crate::error::Result;
use crate::store::Catalog;
use crate::util::now_ts;

/// Load-state summary surfaced through `get_health`.
#[derive(Debug, Clone, Default)]
pub struct CacheHealth {
    pub degraded: bool,
    pub reason: Option<String>,
    pub failure_count: u32,
    pub last_error: Option<String>,
    pub last_error_at: Option<f64>,
    pub last_success_at: Option<f64>,
}

/// Reader over the local Linear object-store snapshot.
///
/// Reloads are single-flight behind a mutex; readers always observe either
/// the previous or the fully built next snapshot.
pub struct LinearLocalReader {
    config: CacheConfig,
    catalog: Box<dyn Catalog>,
    cache: RwLock<Arc<CachedData>>,
    reload_lock: Mutex<()>,
    health: Mutex<CacheHealth>,
    last_tool_call_at: Mutex<f64>,
    force_next_refresh: AtomicBool,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl LinearLocalReader {
    pub fn new(config: CacheConfig, catalog: Box<dyn Catalog>) -> Self {
        Self {
            config,
            catalog,
            cache: RwLock::new(Arc::new(CachedData::default())),
            reload_lock: Mutex::new(()),
            health: Mutex::new(CacheHealth::default()),
            last_tool_call_at: Mutex::new(0.0),
            force_next_refresh: AtomicBool::new(false),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    fn current(&self) -> Arc<CachedData> {
        self.cache
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    fn needs_reload(&self, snapshot: &CachedData) -> bool {
        self.force_next_refresh.load(Ordering::SeqCst)
            || snapshot.is_expired(self.config.ttl)
            || snapshot.teams.is_empty()
    }

    /// Ensure the cache is loaded and not expired, then return it.
    ///
    /// A reload failure with an older snapshot in place serves the stale
    /// snapshot (health is already degraded); with no snapshot at all the
    /// error propagates to the handler.
    pub fn snapshot(&self) -> Result<Arc<CachedData>> {
        if self.needs_reload(&self.current()) {
            if let Err(e) = self.refresh_cache(false) {
                let current = self.current();
                if current.loaded_at > 0.0 {
                    warn!(error = %e, "Cache reload failed; serving previous snapshot");
                    return Ok(current);
                }
                return Err(e);
            }
        }
        Ok(self.current())
    }

    /// Reload from the catalog. `force` reloads even when fresh; otherwise
    /// the reload happens only when the TTL or a stale mark requires it.
    pub fn refresh_cache(&self, force: bool) -> Result<()> {
        let _guard = lock(&self.reload_lock);
        let forced_mark = self.force_next_refresh.swap(false, Ordering::SeqCst);
        if !force && !forced_mark {
            let current = self.current();
            if !current.is_expired(self.config.ttl) && !current.teams.is_empty() {
                return Ok(());
            }
        }

        match self.build_snapshot() {
            Ok((snapshot, report)) => {
                self.update_health(&snapshot, &report);
                let mut cache = self
                    .cache
                    .write()
                    .unwrap_or_else(|poisoned| poisoned.into_inner());
                *cache = Arc::new(snapshot);
                Ok(())
            }
            Err(e) => {
                let message = e.to_string();
                warn!(error = %message, "Cache reload failed");
                let mut health = lock(&self.health);
                health.degraded = true;
                health.reason = Some(message.clone());
                health.failure_count += 1;
                health.last_error = Some(message);
                health.last_error_at = Some(now_ts());
                Err(e)
            }
        }
    }

    fn update_health(&self, snapshot: &CachedData, report: &load::LoadReport) {
        let missing = report.missing_required();
        let mut health = lock(&self.health);

        if !missing.is_empty() {
            health.degraded = true;
            health.reason = Some(format!("missing required stores: {}", missing.join(", ")));
        } else if snapshot.issues.is_empty()
            || snapshot.teams.is_empty()
            || snapshot.users.is_empty()
        {
            health.degraded = true;
            health.reason = Some("required entities are missing".to_string());
        } else if report.hard_errors > 0 {
            health.degraded = true;
            health.reason = Some(format!("store read errors: {}", report.hard_errors));
        } else {
            health.degraded = false;
            health.reason = None;
        }

        if report.soft_errors > 0 {
            debug!(count = report.soft_errors, "Tolerated soft store read errors");
        }

        health.failure_count = 0;
        health.last_success_at = Some(now_ts());
    }

    /// Force the next cache access to reload.
    pub fn mark_stale(&self) {
        self.force_next_refresh.store(true, Ordering::SeqCst);
    }

    /// Record a tool call and mark the cache stale when the gap since the
    /// previous call reached the idle-refresh threshold. The first-ever
    /// call never marks (it would otherwise always fire).
    pub fn ensure_fresh(&self) {
        let now = now_ts();
        let previous = {
            let mut last = lock(&self.last_tool_call_at);
            let previous = *last;
            *last = now;
            previous
        };
        if previous > 0.0 && now - previous >= self.config.idle_refresh_threshold.as_secs_f64() {
            debug!(
                gap_secs = now - previous,
                "Idle gap reached threshold; marking cache stale"
            );
            self.mark_stale();
        }
    }

    pub fn is_degraded(&self) -> bool {
        lock(&self.health).degraded
    }

    pub fn get_health(&self) -> Value {
        let health = lock(&self.health).clone();
        let snapshot = self.current();
        let mut emails: Vec<&String> = self.config.account_emails.iter().collect();
        emails.sort();
        let mut account_ids: Vec<&String> = self.config.user_account_ids.iter().collect();
        account_ids.sort();

        json!({
            "degraded": health.degraded,
            "reason": health.reason,
            "failureCount": health.failure_count,
            "lastError": health.last_error,
            "lastErrorAt": health.last_error_at,
            "lastSuccessAt": health.last_success_at,
            "loadedAt": snapshot.loaded_at,
            "ttlSeconds": self.config.ttl.as_secs_f64(),
            "lastToolCallAt": *lock(&self.last_tool_call_at),
            "idleRefreshThresholdSeconds": self.config.idle_refresh_threshold.as_secs_f64(),
            "scope": {
                "enabled": self.config.scope_enabled(),
                "accountEmails": emails,
                "userAccountIds": account_ids,
            },
        })
    }

    /// Entity counts for health output.
    pub fn get_summary(&self) -> Result<Value> {
        let cache = self.snapshot()?;
        Ok(json!({
            "teams": cache.teams.len(),
            "users": cache.users.len(),
            "states": cache.states.len(),
            "issues": cache.issues.len(),
            "comments": cache.comments.len(),
            "projects": cache.projects.len(),
        }))
    }

    /// Get an issue by its identifier (e.g. "ENG-123"), case-insensitive.
    pub fn get_issue_by_identifier(&self, identifier: &str) -> Result<Option<Issue>> {
        let wanted = identifier.to_uppercase();
        let cache = self.snapshot()?;
        Ok(cache
            .issues
            .values()
            .find(|issue| issue.identifier.to_uppercase() == wanted)
            .cloned())
    }

    pub fn find_user(&self, search: &str) -> Result<Option<User>> {
        let q = search.to_lowercase();
        let cache = self.snapshot()?;
        Ok(best_match(cache.users.values(), |user| {
            let mut scores = vec![
                score_name(&q, user.name.as_deref().unwrap_or(""), 70),
                score_prefix_or_substring(&q, user.display_name.as_deref().unwrap_or(""), 40),
            ];
            let email = user.email.as_deref().unwrap_or("").to_lowercase();
            if !email.is_empty() {
                if email == q {
                    scores.push(Some(100));
                } else if email.contains(&q) {
                    scores.push(Some(10));
                }
            }
            max_score(scores)
        })
        .cloned())
    }

    pub fn find_team(&self, search: &str) -> Result<Option<Team>> {
        let q = search.to_lowercase();
        let key_query = search.to_uppercase();
        let cache = self.snapshot()?;
        Ok(best_match(cache.teams.values(), |team| {
            let mut scores = vec![score_name(&q, team.name.as_deref().unwrap_or(""), 70)];
            if team.key.as_deref() == Some(key_query.as_str()) {
                scores.push(Some(100));
            }
            max_score(scores)
        })
        .cloned())
    }

    pub fn find_project(&self, search: &str) -> Result<Option<Project>> {
        let q = search.to_lowercase();
        let cache = self.snapshot()?;
        Ok(best_match(cache.projects.values(), |project| {
            let mut scores = vec![score_name(&q, project.name.as_deref().unwrap_or(""), 80)];
            if project
                .slug_id
                .as_deref()
                .is_some_and(|slug| slug.to_lowercase() == q)
            {
                scores.push(Some(70));
            }
            max_score(scores)
        })
        .cloned())
    }

    pub fn find_initiative(&self, search: &str) -> Result<Option<Initiative>> {
        let q = search.to_lowercase();
        let cache = self.snapshot()?;
        Ok(best_match(cache.initiatives.values(), |initiative| {
            let mut scores = vec![score_name(&q, initiative.name.as_deref().unwrap_or(""), 70)];
            if initiative
                .slug_id
                .as_deref()
                .is_some_and(|slug| slug.to_lowercase() == q)
            {
                scores.push(Some(70));
            }
            max_score(scores)
        })
        .cloned())
    }

    pub fn find_document(&self, search: &str) -> Result<Option<Document>> {
        let q = search.to_lowercase();
        let cache = self.snapshot()?;
        Ok(best_match(cache.documents.values(), |document| {
            let mut scores = vec![score_name(&q, document.title.as_deref().unwrap_or(""), 70)];
            if document
                .slug_id
                .as_deref()
                .is_some_and(|slug| slug.to_lowercase() == q)
            {
                scores.push(Some(70));
            }
            max_score(scores)
        })
        .cloned())
    }

    pub fn find_milestone(&self, project_id: &str, search: &str) -> Result<Option<Milestone>> {
        let q = search.to_lowercase();
        let cache = self.snapshot()?;
        Ok(best_match(
            cache
                .milestones
                .values()
                .filter(|m| m.project_id.as_deref() == Some(project_id)),
            |milestone| {
                let mut scores = vec![score_name(&q, milestone.name.as_deref().unwrap_or(""), 70)];
                if milestone.id.to_lowercase() == q {
                    scores.push(Some(100));
                }
                max_score(scores)
            },
        )
        .cloned())
    }

    pub fn find_issue_status(&self, team_id: &str, search: &str) -> Result<Option<WorkflowState>> {
        let q = search.to_lowercase();
        let cache = self.snapshot()?;
        Ok(best_match(
            cache
                .states
                .values()
                .filter(|s| s.team_id.as_deref() == Some(team_id)),
            |state| {
                let mut scores = vec![score_name(&q, state.name.as_deref().unwrap_or(""), 70)];
                if state.id.to_lowercase() == q {
                    scores.push(Some(100));
                }
                max_score(scores)
            },
        )
        .cloned())
    }

    /// All comments for an issue, ascending by creation time.
    pub fn get_comments_for_issue(&self, issue_id: &str) -> Result<Vec<Comment>> {
        let cache = self.snapshot()?;
        let mut comments: Vec<Comment> = cache
            .comments_by_issue
            .get(issue_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| cache.comments.get(id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default();
        comments.sort_by(|a, b| {
            a.created_at
                .as_deref()
                .unwrap_or("")
                .cmp(b.created_at.as_deref().unwrap_or(""))
        });
        Ok(comments)
    }

    /// All cycles for a team, by number descending.
    pub fn get_cycles_for_team(&self, team_id: &str) -> Result<Vec<Cycle>> {
        let cache = self.snapshot()?;
        let mut cycles: Vec<Cycle> = cache
            .cycles
            .values()
            .filter(|c| c.team_id.as_deref() == Some(team_id))
            .cloned()
            .collect();
        cycles.sort_by_key(|c| std::cmp::Reverse(c.number.unwrap_or(0)));
        Ok(cycles)
    }

    pub fn get_documents_for_project(&self, project_id: &str) -> Result<Vec<Document>> {
        let cache = self.snapshot()?;
        Ok(cache
            .documents
            .values()
            .filter(|d| d.project_id.as_deref() == Some(project_id))
            .cloned()
            .collect())
    }

    /// All milestones for a project, by sort order ascending.
    pub fn get_milestones_for_project(&self, project_id: &str) -> Result<Vec<Milestone>> {
        let cache = self.snapshot()?;
        let mut milestones: Vec<Milestone> = cache
            .milestones
            .values()
            .filter(|m| m.project_id.as_deref() == Some(project_id))
            .cloned()
            .collect();
        milestones.sort_by(|a, b| {
            a.sort_order
                .unwrap_or(0.0)
                .partial_cmp(&b.sort_order.unwrap_or(0.0))
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        Ok(milestones)
    }

    /// All updates for a project, newest first.
    pub fn get_updates_for_project(&self, project_id: &str) -> Result<Vec<ProjectUpdate>> {
        let cache = self.snapshot()?;
        let mut updates: Vec<ProjectUpdate> = cache
            .project_updates
            .values()
            .filter(|u| u.project_id.as_deref() == Some(project_id))
            .cloned()
            .collect();
        updates.sort_by(|a, b| {
            b.created_at
                .as_deref()
                .unwrap_or("")
                .cmp(a.created_at.as_deref().unwrap_or(""))
        });
        Ok(updates)
    }

    pub fn get_issue_count_for_team(&self, team_id: &str) -> Result<usize> {
        Ok(self
            .snapshot()?
            .issue_counts_by_team
            .get(team_id)
            .copied()
            .unwrap_or(0))
    }

    pub fn get_issue_count_for_project(&self, project_id: &str) -> Result<usize> {
        Ok(self
            .snapshot()?
            .issue_counts_by_project
            .get(project_id)
            .copied()
            .unwrap_or(0))
    }

    pub fn get_issue_count_for_user(&self, user_id: &str) -> Result<usize> {
        Ok(self
            .snapshot()?
            .issue_counts_by_user
            .get(user_id)
            .copied()
            .unwrap_or(0))
    }

    pub fn get_issue_state_counts_for_team(&self, team_id: &str) -> Result<StateCounts> {
        Ok(self
            .snapshot()?
            .issue_state_counts_by_team
            .get(team_id)
            .cloned()
            .unwrap_or_default())
    }

    pub fn get_issue_state_counts_for_project(&self, project_id: &str) -> Result<StateCounts> {
        Ok(self
            .snapshot()?
            .issue_state_counts_by_project
            .get(project_id)
            .cloned()
            .unwrap_or_default())
    }

    pub fn get_issue_state_counts_for_user(&self, user_id: &str) -> Result<StateCounts> {
        Ok(self
            .snapshot()?
            .issue_state_counts_by_user
            .get(user_id)
            .cloned()
            .unwrap_or_default())
    }

    /// Case-insensitive substring search on issue titles.
    pub fn search_issues(&self, query: &str, limit: usize) -> Result<Vec<Issue>> {
        let q = query.to_lowercase();
        let cache = self.snapshot()?;
        let mut results = Vec::new();
        for issue in cache.issues.values() {
            if issue
                .title
                .as_deref()
                .unwrap_or("")
                .to_lowercase()
                .contains(&q)
            {
                results.push(issue.clone());
                if limit > 0 && results.len() >= limit {
                    break;
                }
            }
        }
        Ok(results)
    }
}

/// Best scored candidate; ties keep the earliest (insertion order).
fn best_match<'a, T, I, F>(candidates: I, mut score: F) -> Option<&'a T>
where
    I: Iterator<Item = &'a T>,
    F: FnMut(&T) -> Option<i32>,
{
    let mut best: Option<(i32, &T)> = None;
    for candidate in candidates {
        if let Some(s) = score(candidate) {
            if best.map(|(b, _)| s > b).unwrap_or(true) {
                best = Some((s, candidate));
            }
        }
    }
    best.map(|(_, value)| value)
}

/// Standard name scoring: exact 90, prefix (caller-specified), word-start 50,
/// substring 10.
fn score_name(query: &str, name: &str, prefix_score: i32) -> Option<i32> {
    if query.is_empty() || name.is_empty() {
        return None;
    }
    let name_lower = name.to_lowercase();
    if name_lower == query {
        Some(90)
    } else if name_lower.starts_with(query) {
        Some(prefix_score)
    } else if format!(" {name_lower}").contains(&format!(" {query}")) {
        Some(50)
    } else if name_lower.contains(query) {
        Some(10)
    } else {
        None
    }
}

/// Secondary-field scoring (display names): prefix or substring only.
fn score_prefix_or_substring(query: &str, value: &str, prefix_score: i32) -> Option<i32> {
    if query.is_empty() || value.is_empty() {
        return None;
    }
    let lower = value.to_lowercase();
    if lower.starts_with(query) {
        Some(prefix_score)
    } else if lower.contains(query) {
        Some(10)
    } else {
        None
    }
}

fn max_score(scores: Vec<Option<i32>>) -> Option<i32> {
    scores.into_iter().flatten().max()
}
