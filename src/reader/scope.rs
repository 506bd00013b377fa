// src/reader/scope.rs
// Optional account/organization scoping of a freshly built snapshot.
//
// Filtering is conservative: an allow-set that resolves empty fails the
// whole load instead of silently returning unfiltered data.

use std::collections::HashSet;

use crate::config::CacheConfig;
use crate::error::{LinearFastError, Result};

use super::model::CachedData;

/// Drop every entity that does not transitively belong to an allowed
/// organization. No-op when scoping is not configured.
pub(super) fn apply_account_scope(cache: &mut CachedData, config: &CacheConfig) -> Result<()> {
    if !config.scope_enabled() {
        return Ok(());
    }

    // Configured account ids, plus the accounts of allowed emails.
    let mut allowed_accounts: HashSet<String> = config.user_account_ids.clone();
    for user in cache.users.values() {
        let email = user.email.as_deref().unwrap_or("").to_lowercase();
        if config.account_emails.contains(&email) {
            if let Some(account_id) = &user.user_account_id {
                allowed_accounts.insert(account_id.clone());
            }
        }
    }
    if allowed_accounts.is_empty() {
        return Err(LinearFastError::ScopeMisconfigured(
            "configured account emails matched no users".to_string(),
        ));
    }

    let allowed_orgs: HashSet<String> = cache
        .users
        .values()
        .filter(|u| {
            u.user_account_id
                .as_ref()
                .is_some_and(|id| allowed_accounts.contains(id))
        })
        .filter_map(|u| u.organization_id.clone())
        .collect();
    if allowed_orgs.is_empty() {
        return Err(LinearFastError::ScopeMisconfigured(
            "allowed accounts resolved to no organizations".to_string(),
        ));
    }

    cache.users.retain(|_, user| {
        user.organization_id
            .as_ref()
            .is_some_and(|org| allowed_orgs.contains(org))
    });
    cache.teams.retain(|_, team| {
        team.organization_id
            .as_ref()
            .is_some_and(|org| allowed_orgs.contains(org))
    });

    let allowed_teams: HashSet<String> = cache.teams.keys().cloned().collect();
    let allowed_users: HashSet<String> = cache.users.keys().cloned().collect();
    let in_teams = |team_id: &Option<String>| {
        team_id.as_ref().is_some_and(|id| allowed_teams.contains(id))
    };

    cache.states.retain(|_, state| in_teams(&state.team_id));
    cache.issues.retain(|_, issue| in_teams(&issue.team_id));

    let allowed_issues: HashSet<String> = cache.issues.keys().cloned().collect();
    cache
        .issue_content
        .retain(|issue_id, _| allowed_issues.contains(issue_id));
    cache
        .comments
        .retain(|_, comment| allowed_issues.contains(&comment.issue_id));
    let retained_comments: HashSet<String> = cache.comments.keys().cloned().collect();
    cache
        .comments_by_issue
        .retain(|issue_id, _| allowed_issues.contains(issue_id));
    for ids in cache.comments_by_issue.values_mut() {
        ids.retain(|id| retained_comments.contains(id));
    }

    cache.projects.retain(|_, project| {
        let team_match = project.team_ids.iter().any(|id| allowed_teams.contains(id));
        let lead_match = project.team_ids.is_empty()
            && project
                .lead_id
                .as_ref()
                .is_some_and(|id| allowed_users.contains(id));
        let member_match = project
            .member_ids
            .iter()
            .any(|id| allowed_users.contains(id));
        team_match || lead_match || member_match
    });

    let allowed_projects: HashSet<String> = cache.projects.keys().cloned().collect();
    let in_projects = |project_id: &Option<String>| {
        project_id
            .as_ref()
            .is_some_and(|id| allowed_projects.contains(id))
    };

    cache
        .labels
        .retain(|_, label| label.team_id.is_none() || in_teams(&label.team_id));
    cache.initiatives.retain(|_, initiative| {
        initiative.team_ids.iter().any(|id| allowed_teams.contains(id))
            || initiative
                .owner_id
                .as_ref()
                .is_some_and(|id| allowed_users.contains(id))
    });
    cache.cycles.retain(|_, cycle| in_teams(&cycle.team_id));
    cache.documents.retain(|_, document| {
        in_projects(&document.project_id)
            || (document.project_id.is_none()
                && document
                    .creator_id
                    .as_ref()
                    .is_some_and(|id| allowed_users.contains(id)))
    });
    cache
        .milestones
        .retain(|_, milestone| in_projects(&milestone.project_id));
    cache
        .project_updates
        .retain(|_, update| in_projects(&update.project_id));

    let referenced_statuses: HashSet<String> = cache
        .projects
        .values()
        .filter_map(|p| p.status_id.clone())
        .collect();
    cache
        .project_statuses
        .retain(|id, _| referenced_statuses.contains(id));

    Ok(())
}
