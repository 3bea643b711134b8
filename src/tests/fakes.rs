//! In-memory stand-ins for every collaborator the engine talks to.
//!
//! Each fake keeps its state behind one mutex and exposes inspection and
//! fault-injection helpers for tests. None of them is meant for production.

use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap, HashSet};
use std::sync::Mutex;
use std::time::Duration;

use crate::access::snapshot::BlacklistSource;
use crate::access::Blacklist;
use crate::channels::{
    AccessEntry, Channel, ChannelApi, ChannelKind, CreateChannel, CreateThread, Message,
    MessageBody, ModifyChannel, Webhook, WorkspaceInfo,
};
use crate::placeholders::{IdentityLookup, VerifiedIdentity};
use crate::shared::error::{ArchiveError, InfraError, PlatformError};
use crate::shared::models::{
    ChannelId, CloseMetadata, MessageId, NewTicket, Panel, PanelId, PremiumTier, StaffGrants,
    SupportTeam, Ticket, TicketId, UserId, WorkspaceId, WorkspaceSettings,
};
use crate::tenant::{TenantContext, TenantDirectory, WhitelabelBot};
use crate::tickets::repository::{Archiver, TicketRepository};

fn lock<T>(mutex: &Mutex<T>) -> std::sync::MutexGuard<'_, T> {
    match mutex.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    }
}

pub fn ticket_fixture(workspace_id: WorkspaceId, id: TicketId, opener_id: UserId) -> Ticket {
    Ticket {
        id,
        workspace_id,
        opener_id,
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

pub fn not_found() -> PlatformError {
    PlatformError::Api {
        status: 404,
        message: "Unknown Channel".to_string(),
    }
}

pub fn forbidden() -> PlatformError {
    PlatformError::Api {
        status: 403,
        message: "Missing Access".to_string(),
    }
}

// Repository

#[derive(Default)]
struct RepoState {
    settings: HashMap<WorkspaceId, WorkspaceSettings>,
    grants: HashMap<WorkspaceId, StaffGrants>,
    teams: HashMap<WorkspaceId, Vec<SupportTeam>>,
    panels: HashMap<(WorkspaceId, PanelId), Panel>,
    tickets: BTreeMap<(WorkspaceId, TicketId), Ticket>,
    close_requests: HashSet<(WorkspaceId, TicketId)>,
    autoclose_excluded_workspaces: HashSet<WorkspaceId>,
    unavailable: bool,
}

#[derive(Default)]
pub struct InMemoryRepository {
    state: Mutex<RepoState>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn put_settings(&self, settings: WorkspaceSettings) {
        lock(&self.state).settings.insert(settings.workspace_id, settings);
    }

    pub fn update_settings(&self, workspace_id: WorkspaceId, f: impl FnOnce(&mut WorkspaceSettings)) {
        let mut state = lock(&self.state);
        let settings = state
            .settings
            .entry(workspace_id)
            .or_insert_with(|| WorkspaceSettings::new(workspace_id, 0));
        f(settings);
    }

    pub fn settings_of(&self, workspace_id: WorkspaceId) -> Option<WorkspaceSettings> {
        lock(&self.state).settings.get(&workspace_id).cloned()
    }

    pub fn put_grants(&self, workspace_id: WorkspaceId, grants: StaffGrants) {
        lock(&self.state).grants.insert(workspace_id, grants);
    }

    pub fn add_team(&self, workspace_id: WorkspaceId, team: SupportTeam) {
        lock(&self.state).teams.entry(workspace_id).or_default().push(team);
    }

    pub fn put_panel(&self, panel: Panel) {
        lock(&self.state).panels.insert((panel.workspace_id, panel.id), panel);
    }

    pub fn put_ticket(&self, ticket: Ticket) {
        lock(&self.state)
            .tickets
            .insert((ticket.workspace_id, ticket.id), ticket);
    }

    pub fn ticket_snapshot(&self, workspace_id: WorkspaceId, ticket_id: TicketId) -> Option<Ticket> {
        lock(&self.state).tickets.get(&(workspace_id, ticket_id)).cloned()
    }

    pub fn tickets(&self, workspace_id: WorkspaceId) -> Vec<Ticket> {
        lock(&self.state)
            .tickets
            .values()
            .filter(|t| t.workspace_id == workspace_id)
            .cloned()
            .collect()
    }

    pub fn add_close_request(&self, workspace_id: WorkspaceId, ticket_id: TicketId) {
        lock(&self.state).close_requests.insert((workspace_id, ticket_id));
    }

    pub fn has_close_request(&self, workspace_id: WorkspaceId, ticket_id: TicketId) -> bool {
        lock(&self.state).close_requests.contains(&(workspace_id, ticket_id))
    }

    pub fn workspace_excluded(&self, workspace_id: WorkspaceId) -> bool {
        lock(&self.state)
            .autoclose_excluded_workspaces
            .contains(&workspace_id)
    }

    /// Every call fails with a database error while set.
    pub fn set_unavailable(&self, unavailable: bool) {
        lock(&self.state).unavailable = unavailable;
    }

    fn state(&self) -> Result<std::sync::MutexGuard<'_, RepoState>, InfraError> {
        let state = lock(&self.state);
        if state.unavailable {
            return Err(InfraError::Database("connection refused".to_string()));
        }
        Ok(state)
    }

    fn with_ticket<T>(
        &self,
        workspace_id: WorkspaceId,
        ticket_id: TicketId,
        f: impl FnOnce(&mut Ticket) -> T,
    ) -> Result<T, InfraError> {
        let mut state = self.state()?;
        state
            .tickets
            .get_mut(&(workspace_id, ticket_id))
            .map(f)
            .ok_or_else(|| InfraError::Database(format!("ticket {ticket_id} not found")))
    }
}

#[async_trait]
impl TicketRepository for InMemoryRepository {
    async fn workspace_settings(&self, workspace_id: WorkspaceId) -> Result<WorkspaceSettings, InfraError> {
        Ok(self
            .state()?
            .settings
            .get(&workspace_id)
            .cloned()
            .unwrap_or_else(|| WorkspaceSettings::new(workspace_id, 0)))
    }

    async fn disable_overflow(&self, workspace_id: WorkspaceId) -> Result<(), InfraError> {
        if let Some(settings) = self.state()?.settings.get_mut(&workspace_id) {
            settings.overflow.enabled = false;
            settings.overflow.category_id = None;
        }
        Ok(())
    }

    async fn clear_archive_channel(&self, workspace_id: WorkspaceId) -> Result<(), InfraError> {
        if let Some(settings) = self.state()?.settings.get_mut(&workspace_id) {
            settings.archive_channel = None;
        }
        Ok(())
    }

    async fn staff_grants(&self, workspace_id: WorkspaceId) -> Result<StaffGrants, InfraError> {
        Ok(self.state()?.grants.get(&workspace_id).cloned().unwrap_or_default())
    }

    async fn teams(&self, workspace_id: WorkspaceId) -> Result<Vec<SupportTeam>, InfraError> {
        Ok(self.state()?.teams.get(&workspace_id).cloned().unwrap_or_default())
    }

    async fn panel(&self, workspace_id: WorkspaceId, panel_id: PanelId) -> Result<Option<Panel>, InfraError> {
        Ok(self.state()?.panels.get(&(workspace_id, panel_id)).cloned())
    }

    async fn count_open_tickets(&self, workspace_id: WorkspaceId, user_id: UserId) -> Result<usize, InfraError> {
        Ok(self
            .state()?
            .tickets
            .values()
            .filter(|t| t.workspace_id == workspace_id && t.opener_id == user_id && t.open)
            .count())
    }

    async fn count_workspace_open(&self, workspace_id: WorkspaceId) -> Result<usize, InfraError> {
        Ok(self
            .state()?
            .tickets
            .values()
            .filter(|t| t.workspace_id == workspace_id && t.open)
            .count())
    }

    async fn count_workspace_total(&self, workspace_id: WorkspaceId) -> Result<usize, InfraError> {
        Ok(self
            .state()?
            .tickets
            .values()
            .filter(|t| t.workspace_id == workspace_id)
            .count())
    }

    async fn create_ticket(&self, new: NewTicket) -> Result<Ticket, InfraError> {
        let mut state = self.state()?;
        let id = state
            .tickets
            .keys()
            .filter(|(ws, _)| *ws == new.workspace_id)
            .map(|(_, id)| *id)
            .max()
            .unwrap_or(0)
            + 1;

        let mut ticket = ticket_fixture(new.workspace_id, id, new.opener_id);
        ticket.panel_id = new.panel_id;
        ticket.is_thread = new.is_thread;
        ticket.permission_settings_id = new.permission_settings_id;
        state.tickets.insert((new.workspace_id, id), ticket.clone());
        Ok(ticket)
    }

    async fn ticket(&self, workspace_id: WorkspaceId, ticket_id: TicketId) -> Result<Option<Ticket>, InfraError> {
        Ok(self.state()?.tickets.get(&(workspace_id, ticket_id)).cloned())
    }

    async fn ticket_by_channel(
        &self,
        workspace_id: WorkspaceId,
        channel_id: ChannelId,
    ) -> Result<Option<Ticket>, InfraError> {
        Ok(self
            .state()?
            .tickets
            .values()
            .find(|t| t.workspace_id == workspace_id && t.channel_id == Some(channel_id))
            .cloned())
    }

    async fn set_channel(
        &self,
        workspace_id: WorkspaceId,
        ticket_id: TicketId,
        channel_id: ChannelId,
    ) -> Result<(), InfraError> {
        self.with_ticket(workspace_id, ticket_id, |t| t.channel_id = Some(channel_id))
    }

    async fn set_claimer(
        &self,
        workspace_id: WorkspaceId,
        ticket_id: TicketId,
        claimer: Option<UserId>,
    ) -> Result<(), InfraError> {
        self.with_ticket(workspace_id, ticket_id, |t| t.claimed_by = claimer)
    }

    async fn close_ticket(
        &self,
        workspace_id: WorkspaceId,
        ticket_id: TicketId,
        metadata: CloseMetadata,
    ) -> Result<bool, InfraError> {
        self.with_ticket(workspace_id, ticket_id, |t| {
            if !t.open {
                return false;
            }
            t.open = false;
            t.close_reason = metadata.reason;
            t.closed_by = metadata.closed_by;
            true
        })
    }

    async fn reopen_ticket(&self, workspace_id: WorkspaceId, ticket_id: TicketId) -> Result<bool, InfraError> {
        self.with_ticket(workspace_id, ticket_id, |t| {
            if t.open {
                return false;
            }
            t.open = true;
            t.close_reason = None;
            t.closed_by = None;
            true
        })
    }

    async fn set_transcript_stored(&self, workspace_id: WorkspaceId, ticket_id: TicketId) -> Result<(), InfraError> {
        self.with_ticket(workspace_id, ticket_id, |t| t.has_transcript = true)
    }

    async fn set_join_message(
        &self,
        workspace_id: WorkspaceId,
        ticket_id: TicketId,
        message_id: Option<MessageId>,
    ) -> Result<(), InfraError> {
        self.with_ticket(workspace_id, ticket_id, |t| t.join_message_id = message_id)
    }

    async fn delete_close_request(&self, workspace_id: WorkspaceId, ticket_id: TicketId) -> Result<(), InfraError> {
        self.state()?.close_requests.remove(&(workspace_id, ticket_id));
        Ok(())
    }

    async fn exclude_from_autoclose(&self, workspace_id: WorkspaceId, ticket_id: TicketId) -> Result<(), InfraError> {
        self.with_ticket(workspace_id, ticket_id, |t| t.autoclose_excluded = true)
    }

    async fn exclude_workspace_from_autoclose(&self, workspace_id: WorkspaceId) -> Result<(), InfraError> {
        self.state()?.autoclose_excluded_workspaces.insert(workspace_id);
        Ok(())
    }
}

// Chat platform

struct ChannelState {
    next_id: u64,
    channels: BTreeMap<ChannelId, Channel>,
    messages: HashMap<ChannelId, Vec<Message>>,
    access: HashMap<ChannelId, Vec<AccessEntry>>,
    thread_members: Vec<(ChannelId, UserId)>,
    deleted: Vec<ChannelId>,
    webhooks: Vec<ChannelId>,
    dm_attempts: Vec<UserId>,
    unreachable_dms: HashSet<UserId>,
    forbidden_history: HashSet<ChannelId>,
    fail_next_create: Option<PlatformError>,
    fail_deletes: Option<PlatformError>,
}

impl Default for ChannelState {
    fn default() -> Self {
        Self {
            next_id: 10_000,
            channels: BTreeMap::new(),
            messages: HashMap::new(),
            access: HashMap::new(),
            thread_members: Vec::new(),
            deleted: Vec::new(),
            webhooks: Vec::new(),
            dm_attempts: Vec::new(),
            unreachable_dms: HashSet::new(),
            forbidden_history: HashSet::new(),
            fail_next_create: None,
            fail_deletes: None,
        }
    }
}

impl ChannelState {
    fn next_id(&mut self) -> u64 {
        self.next_id += 1;
        self.next_id
    }

    fn insert(&mut self, workspace_id: WorkspaceId, kind: ChannelKind, parent_id: Option<ChannelId>, name: &str) -> Channel {
        let channel = Channel {
            id: self.next_id(),
            workspace_id,
            kind,
            parent_id,
            name: name.to_string(),
            archived: false,
            locked: false,
        };
        self.channels.insert(channel.id, channel.clone());
        channel
    }
}

#[derive(Default)]
pub struct FakeChannelApi {
    state: Mutex<ChannelState>,
}

impl FakeChannelApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_category(&self, workspace_id: WorkspaceId, name: &str) -> ChannelId {
        lock(&self.state)
            .insert(workspace_id, ChannelKind::Category, None, name)
            .id
    }

    pub fn add_text_channel(&self, workspace_id: WorkspaceId, parent_id: Option<ChannelId>, name: &str) -> ChannelId {
        lock(&self.state)
            .insert(workspace_id, ChannelKind::Text, parent_id, name)
            .id
    }

    /// Adds `count` unrelated channels under `category`.
    pub fn fill_category(&self, workspace_id: WorkspaceId, category: ChannelId, count: usize) {
        let mut state = lock(&self.state);
        for i in 0..count {
            state.insert(workspace_id, ChannelKind::Text, Some(category), &format!("filler-{i}"));
        }
    }

    /// Simulates someone deleting the channel outside the bot.
    pub fn remove_channel(&self, channel_id: ChannelId) {
        lock(&self.state).channels.remove(&channel_id);
    }

    pub fn channel_snapshot(&self, channel_id: ChannelId) -> Option<Channel> {
        lock(&self.state).channels.get(&channel_id).cloned()
    }

    pub fn channels_in(&self, workspace_id: WorkspaceId) -> Vec<Channel> {
        lock(&self.state)
            .channels
            .values()
            .filter(|c| c.workspace_id == workspace_id)
            .cloned()
            .collect()
    }

    pub fn access_entries(&self, channel_id: ChannelId) -> Vec<AccessEntry> {
        lock(&self.state)
            .access
            .get(&channel_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn messages(&self, channel_id: ChannelId) -> Vec<Message> {
        lock(&self.state)
            .messages
            .get(&channel_id)
            .cloned()
            .unwrap_or_default()
    }

    pub fn seed_messages(&self, channel_id: ChannelId, author_id: UserId, count: usize) {
        let mut state = lock(&self.state);
        for i in 0..count {
            let message = Message {
                id: state.next_id(),
                channel_id,
                author_id,
                content: format!("message {i}"),
                timestamp: Utc::now(),
            };
            state.messages.entry(channel_id).or_default().push(message);
        }
    }

    pub fn thread_members(&self, thread_id: ChannelId) -> Vec<UserId> {
        lock(&self.state)
            .thread_members
            .iter()
            .filter(|(t, _)| *t == thread_id)
            .map(|(_, u)| *u)
            .collect()
    }

    pub fn deleted(&self) -> Vec<ChannelId> {
        lock(&self.state).deleted.clone()
    }

    pub fn webhooks(&self) -> Vec<ChannelId> {
        lock(&self.state).webhooks.clone()
    }

    pub fn dm_attempts(&self, user_id: UserId) -> usize {
        lock(&self.state)
            .dm_attempts
            .iter()
            .filter(|u| **u == user_id)
            .count()
    }

    pub fn block_dms(&self, user_id: UserId) {
        lock(&self.state).unreachable_dms.insert(user_id);
    }

    pub fn forbid_history(&self, channel_id: ChannelId) {
        lock(&self.state).forbidden_history.insert(channel_id);
    }

    pub fn fail_next_create(&self, error: PlatformError) {
        lock(&self.state).fail_next_create = Some(error);
    }

    pub fn fail_deletes(&self, error: PlatformError) {
        lock(&self.state).fail_deletes = Some(error);
    }
}

#[async_trait]
impl ChannelApi for FakeChannelApi {
    async fn workspace(&self, _: &TenantContext, workspace_id: WorkspaceId) -> Result<WorkspaceInfo, PlatformError> {
        Ok(WorkspaceInfo {
            id: workspace_id,
            name: "Test Workspace".to_string(),
            owner_id: 1,
        })
    }

    async fn channel(&self, _: &TenantContext, channel_id: ChannelId) -> Result<Channel, PlatformError> {
        lock(&self.state)
            .channels
            .get(&channel_id)
            .cloned()
            .ok_or_else(not_found)
    }

    async fn list_channels(&self, _: &TenantContext, workspace_id: WorkspaceId) -> Result<Vec<Channel>, PlatformError> {
        Ok(self.channels_in(workspace_id))
    }

    async fn create_channel(
        &self,
        _: &TenantContext,
        workspace_id: WorkspaceId,
        request: CreateChannel,
    ) -> Result<Channel, PlatformError> {
        let mut state = lock(&self.state);
        if let Some(err) = state.fail_next_create.take() {
            return Err(err);
        }
        if let Some(parent) = request.parent_id {
            if !state.channels.contains_key(&parent) {
                return Err(not_found());
            }
        }
        let channel = state.insert(workspace_id, ChannelKind::Text, request.parent_id, &request.name);
        state.access.insert(channel.id, request.access_entries);
        Ok(channel)
    }

    async fn create_thread(
        &self,
        _: &TenantContext,
        workspace_id: WorkspaceId,
        request: CreateThread,
    ) -> Result<Channel, PlatformError> {
        let mut state = lock(&self.state);
        if let Some(err) = state.fail_next_create.take() {
            return Err(err);
        }
        if !state.channels.contains_key(&request.parent_id) {
            return Err(not_found());
        }
        Ok(state.insert(workspace_id, ChannelKind::Thread, Some(request.parent_id), &request.name))
    }

    async fn add_thread_member(&self, _: &TenantContext, thread_id: ChannelId, user_id: UserId) -> Result<(), PlatformError> {
        let mut state = lock(&self.state);
        if !state.channels.contains_key(&thread_id) {
            return Err(not_found());
        }
        state.thread_members.push((thread_id, user_id));
        Ok(())
    }

    async fn modify_channel(
        &self,
        _: &TenantContext,
        channel_id: ChannelId,
        request: ModifyChannel,
    ) -> Result<Channel, PlatformError> {
        let mut state = lock(&self.state);
        let channel = state.channels.get_mut(&channel_id).ok_or_else(not_found)?;
        if let Some(name) = request.name {
            channel.name = name;
        }
        if let Some(archived) = request.archived {
            channel.archived = archived;
        }
        if let Some(locked) = request.locked {
            channel.locked = locked;
        }
        Ok(channel.clone())
    }

    async fn delete_channel(&self, _: &TenantContext, channel_id: ChannelId) -> Result<(), PlatformError> {
        let mut state = lock(&self.state);
        if let Some(err) = state.fail_deletes.clone() {
            return Err(err);
        }
        state.channels.remove(&channel_id).ok_or_else(not_found)?;
        state.deleted.push(channel_id);
        Ok(())
    }

    async fn edit_access_entries(
        &self,
        _: &TenantContext,
        channel_id: ChannelId,
        entries: Vec<AccessEntry>,
    ) -> Result<(), PlatformError> {
        let mut state = lock(&self.state);
        if !state.channels.contains_key(&channel_id) {
            return Err(not_found());
        }
        state.access.insert(channel_id, entries);
        Ok(())
    }

    async fn send_message(
        &self,
        ctx: &TenantContext,
        channel_id: ChannelId,
        body: MessageBody,
    ) -> Result<Message, PlatformError> {
        let mut state = lock(&self.state);
        if !state.channels.contains_key(&channel_id) {
            return Err(not_found());
        }
        let message = Message {
            id: state.next_id(),
            channel_id,
            author_id: ctx.bot_id,
            content: body.content,
            timestamp: Utc::now(),
        };
        state
            .messages
            .entry(channel_id)
            .or_default()
            .push(message.clone());
        Ok(message)
    }

    async fn delete_message(&self, _: &TenantContext, channel_id: ChannelId, message_id: MessageId) -> Result<(), PlatformError> {
        let mut state = lock(&self.state);
        let messages = state.messages.get_mut(&channel_id).ok_or_else(not_found)?;
        let before = messages.len();
        messages.retain(|m| m.id != message_id);
        if messages.len() == before {
            return Err(not_found());
        }
        Ok(())
    }

    async fn messages_before(
        &self,
        _: &TenantContext,
        channel_id: ChannelId,
        before: Option<MessageId>,
        limit: usize,
    ) -> Result<Vec<Message>, PlatformError> {
        let state = lock(&self.state);
        if state.forbidden_history.contains(&channel_id) {
            return Err(forbidden());
        }
        if !state.channels.contains_key(&channel_id) {
            return Err(not_found());
        }
        Ok(state
            .messages
            .get(&channel_id)
            .map(|all| {
                all.iter()
                    .rev()
                    .filter(|m| before.map_or(true, |b| m.id < b))
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn create_dm(&self, _: &TenantContext, user_id: UserId) -> Result<ChannelId, PlatformError> {
        let mut state = lock(&self.state);
        state.dm_attempts.push(user_id);
        if state.unreachable_dms.contains(&user_id) {
            return Err(PlatformError::Api {
                status: 403,
                message: "Cannot send messages to this user".to_string(),
            });
        }
        Ok(state.insert(0, ChannelKind::Text, None, &format!("dm-{user_id}")).id)
    }

    async fn create_webhook(&self, _: &TenantContext, channel_id: ChannelId, _: &str) -> Result<Webhook, PlatformError> {
        let mut state = lock(&self.state);
        if !state.channels.contains_key(&channel_id) {
            return Err(not_found());
        }
        state.webhooks.push(channel_id);
        Ok(Webhook {
            id: state.next_id(),
            token: "webhook-token".to_string(),
        })
    }
}

// Archive

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchivedTranscript {
    pub workspace_id: WorkspaceId,
    pub ticket_id: TicketId,
    pub messages: Vec<Message>,
    pub premium: bool,
}

#[derive(Default)]
pub struct RecordingArchiver {
    stored: Mutex<Vec<ArchivedTranscript>>,
    delay: Option<Duration>,
    failure: Option<ArchiveError>,
}

impl RecordingArchiver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Holds every upload for `delay`, widening race windows in tests.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn failing(mut self, error: ArchiveError) -> Self {
        self.failure = Some(error);
        self
    }

    pub fn stored(&self) -> Vec<ArchivedTranscript> {
        lock(&self.stored).clone()
    }
}

#[async_trait]
impl Archiver for RecordingArchiver {
    async fn store(
        &self,
        messages: Vec<Message>,
        workspace_id: WorkspaceId,
        ticket_id: TicketId,
        premium: bool,
    ) -> Result<(), ArchiveError> {
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        if let Some(err) = &self.failure {
            return Err(err.clone());
        }
        lock(&self.stored).push(ArchivedTranscript {
            workspace_id,
            ticket_id,
            messages,
            premium,
        });
        Ok(())
    }
}

// Tenancy, identity, blacklist

#[derive(Default)]
pub struct StaticDirectory {
    tiers: Mutex<HashMap<WorkspaceId, PremiumTier>>,
    bots: Mutex<HashMap<WorkspaceId, WhitelabelBot>>,
}

impl StaticDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_tier(&self, workspace_id: WorkspaceId, tier: PremiumTier) {
        lock(&self.tiers).insert(workspace_id, tier);
    }

    pub fn set_whitelabel(&self, workspace_id: WorkspaceId, bot: WhitelabelBot) {
        lock(&self.bots).insert(workspace_id, bot);
    }
}

#[async_trait]
impl TenantDirectory for StaticDirectory {
    async fn whitelabel_bot(&self, workspace_id: WorkspaceId) -> Result<Option<WhitelabelBot>, InfraError> {
        Ok(lock(&self.bots).get(&workspace_id).cloned())
    }

    async fn premium_tier(&self, workspace_id: WorkspaceId) -> Result<PremiumTier, InfraError> {
        Ok(lock(&self.tiers).get(&workspace_id).copied().unwrap_or_default())
    }
}

#[derive(Default)]
pub struct StaticIdentity {
    known: HashMap<UserId, VerifiedIdentity>,
}

impl StaticIdentity {
    pub fn with(mut self, user_id: UserId, identity: VerifiedIdentity) -> Self {
        self.known.insert(user_id, identity);
        self
    }
}

#[async_trait]
impl IdentityLookup for StaticIdentity {
    async fn lookup(&self, user_id: UserId) -> Result<Option<VerifiedIdentity>, InfraError> {
        Ok(self.known.get(&user_id).cloned())
    }
}

#[derive(Default)]
pub struct StaticBlacklist {
    current: Mutex<Blacklist>,
}

impl StaticBlacklist {
    pub fn new(blacklist: Blacklist) -> Self {
        Self {
            current: Mutex::new(blacklist),
        }
    }

    pub fn set(&self, blacklist: Blacklist) {
        *lock(&self.current) = blacklist;
    }
}

#[async_trait]
impl BlacklistSource for StaticBlacklist {
    async fn load_blacklist(&self) -> Result<Blacklist, InfraError> {
        Ok(lock(&self.current).clone())
    }
}
