//! Contract for the chat platform REST API.
//!
//! The engine never talks HTTP to the platform itself; a deployment injects
//! an implementation of [`ChannelApi`] bound to its gateway client. Every call
//! carries the [`TenantContext`] whose credential and rate-limit bucket it
//! must use.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::ops::{BitOr, BitOrAssign};

use crate::shared::error::PlatformError;
use crate::shared::models::{ChannelId, GroupId, MessageId, UserId, WorkspaceId};
use crate::tenant::TenantContext;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    Category,
    Text,
    Thread,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Channel {
    pub id: ChannelId,
    pub workspace_id: WorkspaceId,
    pub kind: ChannelKind,
    pub parent_id: Option<ChannelId>,
    pub name: String,
    pub archived: bool,
    pub locked: bool,
}

#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Permissions(pub u64);

impl Permissions {
    pub const NONE: Self = Self(0);
    pub const ADD_REACTIONS: Self = Self(1 << 6);
    pub const MANAGE_CHANNELS: Self = Self(1 << 4);
    pub const VIEW_CHANNEL: Self = Self(1 << 10);
    pub const SEND_MESSAGES: Self = Self(1 << 11);
    pub const MANAGE_MESSAGES: Self = Self(1 << 13);
    pub const EMBED_LINKS: Self = Self(1 << 14);
    pub const ATTACH_FILES: Self = Self(1 << 15);
    pub const READ_MESSAGE_HISTORY: Self = Self(1 << 16);
    pub const MANAGE_ROLES: Self = Self(1 << 28);
    pub const MANAGE_WEBHOOKS: Self = Self(1 << 29);

    /// What a participant needs to hold a conversation in a ticket.
    pub fn participant() -> Self {
        Self::VIEW_CHANNEL
            | Self::SEND_MESSAGES
            | Self::ADD_REACTIONS
            | Self::EMBED_LINKS
            | Self::ATTACH_FILES
            | Self::READ_MESSAGE_HISTORY
    }

    /// Read-only access.
    pub fn observer() -> Self {
        Self::VIEW_CHANNEL | Self::READ_MESSAGE_HISTORY
    }

    /// The bot's own elevated entry.
    pub fn bot() -> Self {
        Self::participant()
            | Self::MANAGE_CHANNELS
            | Self::MANAGE_MESSAGES
            | Self::MANAGE_ROLES
            | Self::MANAGE_WEBHOOKS
    }

    pub fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

impl BitOr for Permissions {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for Permissions {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[serde(tag = "type", content = "id", rename_all = "snake_case")]
pub enum EntryTarget {
    User(UserId),
    Group(GroupId),
}

/// One per-user or per-group allow/deny pair on a channel.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct AccessEntry {
    pub target: EntryTarget,
    pub allow: Permissions,
    pub deny: Permissions,
}

impl AccessEntry {
    pub fn allow(target: EntryTarget, allow: Permissions) -> Self {
        Self {
            target,
            allow,
            deny: Permissions::NONE,
        }
    }

    pub fn deny(target: EntryTarget, deny: Permissions) -> Self {
        Self {
            target,
            allow: Permissions::NONE,
            deny,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateChannel {
    pub name: String,
    pub parent_id: Option<ChannelId>,
    pub topic: Option<String>,
    pub access_entries: Vec<AccessEntry>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CreateThread {
    pub parent_id: ChannelId,
    pub name: String,
    pub private: bool,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ModifyChannel {
    pub name: Option<String>,
    pub archived: Option<bool>,
    pub locked: Option<bool>,
}

impl ModifyChannel {
    pub fn rename(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Self::default()
        }
    }

    pub fn archive() -> Self {
        Self {
            archived: Some(true),
            locked: Some(true),
            ..Self::default()
        }
    }

    pub fn unarchive() -> Self {
        Self {
            archived: Some(false),
            locked: Some(false),
            ..Self::default()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct MessageBody {
    pub content: String,
}

impl MessageBody {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Message {
    pub id: MessageId,
    pub channel_id: ChannelId,
    pub author_id: UserId,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Webhook {
    pub id: u64,
    pub token: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct WorkspaceInfo {
    pub id: WorkspaceId,
    pub name: String,
    pub owner_id: UserId,
}

#[async_trait]
pub trait ChannelApi: Send + Sync {
    async fn workspace(
        &self,
        ctx: &TenantContext,
        workspace_id: WorkspaceId,
    ) -> Result<WorkspaceInfo, PlatformError>;

    async fn channel(&self, ctx: &TenantContext, channel_id: ChannelId) -> Result<Channel, PlatformError>;

    async fn list_channels(
        &self,
        ctx: &TenantContext,
        workspace_id: WorkspaceId,
    ) -> Result<Vec<Channel>, PlatformError>;

    async fn create_channel(
        &self,
        ctx: &TenantContext,
        workspace_id: WorkspaceId,
        request: CreateChannel,
    ) -> Result<Channel, PlatformError>;

    async fn create_thread(
        &self,
        ctx: &TenantContext,
        workspace_id: WorkspaceId,
        request: CreateThread,
    ) -> Result<Channel, PlatformError>;

    async fn add_thread_member(
        &self,
        ctx: &TenantContext,
        thread_id: ChannelId,
        user_id: UserId,
    ) -> Result<(), PlatformError>;

    async fn modify_channel(
        &self,
        ctx: &TenantContext,
        channel_id: ChannelId,
        request: ModifyChannel,
    ) -> Result<Channel, PlatformError>;

    async fn delete_channel(&self, ctx: &TenantContext, channel_id: ChannelId) -> Result<(), PlatformError>;

    /// Replaces the channel's whole access-entry list.
    async fn edit_access_entries(
        &self,
        ctx: &TenantContext,
        channel_id: ChannelId,
        entries: Vec<AccessEntry>,
    ) -> Result<(), PlatformError>;

    async fn send_message(
        &self,
        ctx: &TenantContext,
        channel_id: ChannelId,
        body: MessageBody,
    ) -> Result<Message, PlatformError>;

    async fn delete_message(
        &self,
        ctx: &TenantContext,
        channel_id: ChannelId,
        message_id: MessageId,
    ) -> Result<(), PlatformError>;

    /// Newest first, strictly older than `before` when given.
    async fn messages_before(
        &self,
        ctx: &TenantContext,
        channel_id: ChannelId,
        before: Option<MessageId>,
        limit: usize,
    ) -> Result<Vec<Message>, PlatformError>;

    async fn create_dm(&self, ctx: &TenantContext, user_id: UserId) -> Result<ChannelId, PlatformError>;

    async fn create_webhook(
        &self,
        ctx: &TenantContext,
        channel_id: ChannelId,
        name: &str,
    ) -> Result<Webhook, PlatformError>;
}
