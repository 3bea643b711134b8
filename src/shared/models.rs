use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

pub type WorkspaceId = u64;
pub type UserId = u64;
pub type GroupId = u64;
pub type ChannelId = u64;
pub type MessageId = u64;
pub type TicketId = i32;
pub type PanelId = i32;
pub type TeamId = i32;

/// Lifecycle position derived from the persisted ticket row.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TicketState {
    /// Reserved under the open lease, channel not created yet.
    Pending,
    Open,
    /// Closed thread ticket; the thread still exists and may reopen.
    Archived,
    /// Closed standalone ticket; the channel was deleted.
    Closed,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Ticket {
    pub id: TicketId,
    pub workspace_id: WorkspaceId,
    pub opener_id: UserId,
    pub channel_id: Option<ChannelId>,
    pub open: bool,
    pub opened_at: DateTime<Utc>,
    pub panel_id: Option<PanelId>,
    pub is_thread: bool,
    pub claimed_by: Option<UserId>,
    pub close_reason: Option<String>,
    pub closed_by: Option<UserId>,
    pub has_transcript: bool,
    pub join_message_id: Option<MessageId>,
    pub permission_settings_id: Option<i32>,
    pub autoclose_excluded: bool,
}

impl Ticket {
    pub fn state(&self) -> TicketState {
        match (self.open, self.channel_id, self.is_thread) {
            (true, None, _) => TicketState::Pending,
            (true, Some(_), _) => TicketState::Open,
            (false, _, true) => TicketState::Archived,
            (false, _, false) => TicketState::Closed,
        }
    }

    pub fn is_claimed(&self) -> bool {
        self.claimed_by.is_some()
    }
}

/// Values needed to reserve a ticket row. The repository assigns the id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTicket {
    pub workspace_id: WorkspaceId,
    pub opener_id: UserId,
    pub panel_id: Option<PanelId>,
    pub is_thread: bool,
    pub permission_settings_id: Option<i32>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CloseMetadata {
    pub reason: Option<String>,
    pub closed_by: Option<UserId>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ClaimVisibility {
    #[default]
    FullVisibility,
    SupportCannotView,
    SupportCannotType,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct OverflowSettings {
    pub enabled: bool,
    /// `None` with overflow enabled places tickets outside any category.
    pub category_id: Option<ChannelId>,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord)]
#[serde(rename_all = "snake_case")]
pub enum PremiumTier {
    #[default]
    None,
    Premium,
    Whitelabel,
}

impl PremiumTier {
    pub fn is_premium(self) -> bool {
        self >= PremiumTier::Premium
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkspaceSettings {
    pub workspace_id: WorkspaceId,
    pub owner_id: UserId,
    pub ticket_limit: u8,
    pub use_threads: bool,
    pub default_category: Option<ChannelId>,
    pub overflow: OverflowSettings,
    pub claim_visibility: ClaimVisibility,
    pub notification_channel: Option<ChannelId>,
    pub archive_channel: Option<ChannelId>,
    pub store_transcripts: bool,
    pub users_can_close: bool,
    pub welcome_message: String,
    pub naming_scheme: NamingScheme,
}

impl WorkspaceSettings {
    pub fn new(workspace_id: WorkspaceId, owner_id: UserId) -> Self {
        Self {
            workspace_id,
            owner_id,
            ticket_limit: 5,
            use_threads: false,
            default_category: None,
            overflow: OverflowSettings::default(),
            claim_visibility: ClaimVisibility::default(),
            notification_channel: None,
            archive_channel: None,
            store_transcripts: true,
            users_can_close: true,
            welcome_message: "Thank you for contacting support.\nPlease describe your issue and wait for a response.".to_string(),
            naming_scheme: NamingScheme::Id,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NamingScheme {
    #[default]
    Id,
    Username,
    /// Placeholder template, e.g. `%username%-%ticket_id%`.
    Custom(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RuleAction {
    Allow,
    Deny,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessRule {
    pub priority: i32,
    pub group_id: GroupId,
    pub action: RuleAction,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Panel {
    pub id: PanelId,
    pub workspace_id: WorkspaceId,
    pub title: String,
    pub category_id: Option<ChannelId>,
    pub naming_scheme: Option<NamingScheme>,
    pub welcome_message: Option<String>,
    pub with_default_team: bool,
    pub team_ids: Vec<TeamId>,
    pub access_rules: Vec<AccessRule>,
    pub disabled: bool,
    pub force_disabled: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct StaffGrants {
    pub admin_users: Vec<UserId>,
    pub admin_groups: Vec<GroupId>,
    pub support_users: Vec<UserId>,
    pub support_groups: Vec<GroupId>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SupportTeam {
    pub id: TeamId,
    pub name: String,
    pub users: Vec<UserId>,
    pub groups: Vec<GroupId>,
}

/// The user or system on whose behalf an operation runs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Actor {
    pub user_id: UserId,
    pub username: String,
    pub groups: Vec<GroupId>,
    /// Platform-level administrator permission in the workspace.
    pub has_admin_permission: bool,
}

impl Actor {
    pub fn new(user_id: UserId, username: impl Into<String>) -> Self {
        Self {
            user_id,
            username: username.into(),
            groups: Vec::new(),
            has_admin_permission: false,
        }
    }

    pub fn with_groups(mut self, groups: Vec<GroupId>) -> Self {
        self.groups = groups;
        self
    }

    pub fn with_admin_permission(mut self) -> Self {
        self.has_admin_permission = true;
        self
    }

    pub fn mention(&self) -> String {
        format!("<@{}>", self.user_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ticket() -> Ticket {
        Ticket {
            id: 1,
            workspace_id: 10,
            opener_id: 100,
            channel_id: None,
            open: true,
            opened_at: Utc::now(),
            panel_id: None,
            is_thread: false,
            claimed_by: None,
            close_reason: None,
            closed_by: None,
            has_transcript: false,
            join_message_id: None,
            permission_settings_id: None,
            autoclose_excluded: false,
        }
    }

    #[test]
    fn test_ticket_state_derivation() {
        let mut t = ticket();
        assert_eq!(t.state(), TicketState::Pending);

        t.channel_id = Some(500);
        assert_eq!(t.state(), TicketState::Open);

        t.open = false;
        assert_eq!(t.state(), TicketState::Closed);

        t.is_thread = true;
        assert_eq!(t.state(), TicketState::Archived);
    }

    #[test]
    fn test_premium_tier_ordering() {
        assert!(!PremiumTier::None.is_premium());
        assert!(PremiumTier::Premium.is_premium());
        assert!(PremiumTier::Whitelabel.is_premium());
    }
}
