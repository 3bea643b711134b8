//! Who may act on a ticket, and who gets access entries on its channel.

use futures::try_join;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;

use crate::shared::error::InfraError;
use crate::shared::models::{
    Actor, GroupId, Panel, RuleAction, StaffGrants, SupportTeam, UserId, WorkspaceId,
};
use crate::tickets::repository::TicketRepository;

pub mod snapshot;

pub use snapshot::{Blacklist, SnapshotCache};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "snake_case")]
pub enum PermissionLevel {
    Everyone,
    Support,
    Admin,
}

impl fmt::Display for PermissionLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Everyone => write!(f, "everyone"),
            Self::Support => write!(f, "support"),
            Self::Admin => write!(f, "admin"),
        }
    }
}

/// Highest level granted to `actor`. Grants stack, so every source is
/// checked and the maximum wins.
pub fn actor_level(
    owner_id: UserId,
    actor: &Actor,
    grants: &StaffGrants,
    teams: &[SupportTeam],
) -> PermissionLevel {
    let in_any = |groups: &[GroupId]| actor.groups.iter().any(|g| groups.contains(g));

    let mut level = PermissionLevel::Everyone;

    let team_member = teams
        .iter()
        .any(|t| t.users.contains(&actor.user_id) || in_any(&t.groups));
    if team_member
        || grants.support_users.contains(&actor.user_id)
        || in_any(&grants.support_groups)
    {
        level = PermissionLevel::Support;
    }

    if actor.user_id == owner_id
        || actor.has_admin_permission
        || grants.admin_users.contains(&actor.user_id)
        || in_any(&grants.admin_groups)
    {
        level = level.max(PermissionLevel::Admin);
    }

    level
}

/// Users and groups that receive staff access entries on a ticket channel.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AllowedStaff {
    pub users: BTreeSet<UserId>,
    pub groups: BTreeSet<GroupId>,
    /// Subset of the above holding admin grants; keeps access when a
    /// claim hides the ticket from support.
    pub admin_users: BTreeSet<UserId>,
    pub admin_groups: BTreeSet<GroupId>,
}

pub fn allowed_staff(
    panel: Option<&Panel>,
    grants: &StaffGrants,
    panel_teams: &[SupportTeam],
) -> AllowedStaff {
    let mut staff = AllowedStaff::default();

    if panel.map_or(true, |p| p.with_default_team) {
        staff.admin_users.extend(grants.admin_users.iter().copied());
        staff.admin_groups.extend(grants.admin_groups.iter().copied());
        staff.users.extend(grants.admin_users.iter().copied());
        staff.users.extend(grants.support_users.iter().copied());
        staff.groups.extend(grants.admin_groups.iter().copied());
        staff.groups.extend(grants.support_groups.iter().copied());
    }

    if let Some(panel) = panel {
        for team in panel_teams.iter().filter(|t| panel.team_ids.contains(&t.id)) {
            staff.users.extend(team.users.iter().copied());
            staff.groups.extend(team.groups.iter().copied());
        }
    }

    staff
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PanelAccess {
    Allow,
    /// `matched_group` is `None` when no rule matched and the panel has an
    /// allow-list.
    Deny { matched_group: Option<GroupId> },
}

/// Evaluates the panel's rules in priority order against the actor's groups
/// plus the workspace-wide group (whose id is the workspace id).
pub fn panel_access(panel: &Panel, workspace_id: WorkspaceId, actor_groups: &[GroupId]) -> PanelAccess {
    let mut rules = panel.access_rules.clone();
    rules.sort_by_key(|r| r.priority);

    let is_member = |group: GroupId| group == workspace_id || actor_groups.contains(&group);

    if let Some(rule) = rules.iter().find(|r| is_member(r.group_id)) {
        return match rule.action {
            RuleAction::Allow => PanelAccess::Allow,
            RuleAction::Deny => PanelAccess::Deny {
                matched_group: Some(rule.group_id),
            },
        };
    }

    if rules.iter().any(|r| r.action == RuleAction::Allow) {
        PanelAccess::Deny {
            matched_group: None,
        }
    } else {
        PanelAccess::Allow
    }
}

/// Groups named in the panel's allow rules, for the denial reply.
pub fn allowed_groups(panel: &Panel) -> Vec<GroupId> {
    let mut rules = panel.access_rules.clone();
    rules.sort_by_key(|r| r.priority);
    rules
        .iter()
        .filter(|r| r.action == RuleAction::Allow)
        .map(|r| r.group_id)
        .collect()
}

/// Repository-backed front for the pure resolvers above. Independent lookups
/// run concurrently; the first failure aborts the join.
#[derive(Clone)]
pub struct AccessResolver {
    repo: Arc<dyn TicketRepository>,
}

impl AccessResolver {
    pub fn new(repo: Arc<dyn TicketRepository>) -> Self {
        Self { repo }
    }

    pub async fn resolve_actor_level(
        &self,
        workspace_id: WorkspaceId,
        owner_id: UserId,
        actor: &Actor,
    ) -> Result<PermissionLevel, InfraError> {
        let (grants, teams) = try_join!(
            self.repo.staff_grants(workspace_id),
            self.repo.teams(workspace_id)
        )?;
        Ok(actor_level(owner_id, actor, &grants, &teams))
    }

    pub async fn resolve_allowed_staff(
        &self,
        workspace_id: WorkspaceId,
        panel: Option<&Panel>,
    ) -> Result<AllowedStaff, InfraError> {
        let (grants, teams) = try_join!(
            self.repo.staff_grants(workspace_id),
            self.repo.teams(workspace_id)
        )?;
        Ok(allowed_staff(panel, &grants, &teams))
    }
}
