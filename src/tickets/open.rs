use futures::try_join;
use log::{debug, info, warn};
use std::collections::HashMap;

use super::entries::ticket_entries;
use super::{EngineMetrics, Invocation, TicketEngine};
use crate::access::{allowed_groups, panel_access, AllowedStaff, PanelAccess, PermissionLevel};
use crate::channels::{
    Channel, ChannelKind, CreateChannel, CreateThread, MessageBody, Webhook,
};
use crate::placeholders::SubstitutionContext;
use crate::shared::error::{TicketError, ValidationError};
use crate::shared::models::{
    ChannelId, CloseMetadata, GroupId, MessageId, NamingScheme, NewTicket, Panel, PanelId, Ticket,
    WorkspaceId, WorkspaceSettings,
};
use crate::shared::utils::sanitize_channel_name;
use crate::tenant::TenantContext;

const WEBHOOK_NAME: &str = "Tickets";

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct OpenRequest {
    pub panel_id: Option<PanelId>,
    /// Channel the command ran in. Thread tickets hang off it.
    pub source_channel: Option<ChannelId>,
    pub subject: Option<String>,
    pub form_answers: HashMap<String, String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenedTicket {
    pub ticket: Ticket,
    pub channel: Channel,
    pub welcome_message_id: Option<MessageId>,
    pub webhook: Option<Webhook>,
}

/// Where the new conversation goes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Placement {
    /// Standalone channel, inside the category when one is given.
    Channel { category: Option<ChannelId> },
    Thread { parent: ChannelId },
}

impl TicketEngine {
    pub async fn open_ticket(&self, inv: &Invocation, request: OpenRequest) -> Result<OpenedTicket, TicketError> {
        let result = self.open_inner(inv, request).await;
        match &result {
            Ok(opened) => {
                EngineMetrics::inc(&self.metrics.opened);
                info!(
                    "Opened ticket {} in workspace {} for {} (channel {})",
                    opened.ticket.id, inv.workspace_id, inv.actor.user_id, opened.channel.id
                );
            }
            Err(e) => {
                EngineMetrics::inc(&self.metrics.open_rejected);
                self.log_failure("Open", inv, None, e);
            }
        }
        result
    }

    async fn open_inner(&self, inv: &Invocation, request: OpenRequest) -> Result<OpenedTicket, TicketError> {
        let ws = inv.workspace_id;

        if self.blacklist.current().is_blocked(ws, inv.actor.user_id) {
            return Err(ValidationError::Blacklisted.into());
        }

        let (ctx, settings, panel) = try_join!(
            self.tenant(inv),
            self.settings(inv),
            self.load_panel(inv, request.panel_id)
        )?;

        let level = self.actor_level(inv, &settings, &inv.actor).await?;
        let is_staff = level >= PermissionLevel::Support;

        // Checked before a token is taken so an over-limit user costs nothing.
        if !is_staff {
            self.check_ticket_limit(inv, &settings).await?;
        }

        if !self
            .call(inv, "taking open token", self.limiter.try_acquire_open_token(ws))
            .await?
        {
            return Err(ValidationError::RateLimited.into());
        }

        if let Some(panel) = &panel {
            check_panel(panel, ws, &inv.actor.groups)?;
        }

        let placement = if settings.use_threads {
            let parent = request.source_channel.ok_or(ValidationError::NoThreadParent)?;
            Placement::Thread { parent }
        } else {
            let category = self.select_category(inv, &ctx, &settings, panel.as_ref()).await?;
            Placement::Channel { category }
        };

        let staff = self
            .call(
                inv,
                "resolving ticket staff",
                self.access.resolve_allowed_staff(ws, panel.as_ref()),
            )
            .await?;

        let new_ticket = NewTicket {
            workspace_id: ws,
            opener_id: inv.actor.user_id,
            panel_id: panel.as_ref().map(|p| p.id),
            is_thread: matches!(placement, Placement::Thread { .. }),
            permission_settings_id: None,
        };

        // The lease makes the re-count and the insert one step per workspace.
        let ticket = self
            .open_lock
            .scoped(ws, async {
                if !is_staff {
                    self.check_ticket_limit(inv, &settings).await?;
                }
                self.call(inv, "reserving ticket", self.repo.create_ticket(new_ticket))
                    .await
            })
            .await?;
        debug!("Reserved pending ticket {} in workspace {ws}", ticket.id);

        let name = self
            .channel_name(inv, &ctx, &settings, panel.as_ref(), &ticket)
            .await;

        let channel = match self
            .create_conversation(inv, &ctx, placement, &ticket, &staff, name)
            .await
        {
            Ok(channel) => channel,
            Err(e) => {
                self.abandon_pending(inv, &ticket).await;
                return Err(e);
            }
        };

        if let Err(e) = self
            .call(inv, "saving ticket channel", self.repo.set_channel(ws, ticket.id, channel.id))
            .await
        {
            warn!(
                "Channel {} created for ticket {} but not persisted, removing it",
                channel.id, ticket.id
            );
            if let Err(cleanup) = self
                .call(inv, "deleting orphan channel", self.channels.delete_channel(&ctx, channel.id))
                .await
            {
                self.partial_failure("Orphan channel cleanup", inv, ticket.id, &cleanup);
            }
            self.abandon_pending(inv, &ticket).await;
            return Err(e);
        }

        let mut ticket = ticket;
        ticket.channel_id = Some(channel.id);

        let template = panel
            .as_ref()
            .and_then(|p| p.welcome_message.clone())
            .unwrap_or_else(|| settings.welcome_message.clone());
        let substitution = self
            .substitution_context(inv, &ctx, &settings, &ticket, request.form_answers, &template)
            .await;

        let (welcome_message_id, join_message_id, webhook) = futures::join!(
            self.send_welcome(inv, &ctx, &ticket, &template, &substitution, request.subject.as_deref()),
            self.post_join_message(inv, &ctx, &settings, &ticket),
            self.create_relay_webhook(inv, &ctx, &ticket),
        );

        if let Some(message_id) = join_message_id {
            ticket.join_message_id = Some(message_id);
            if let Err(e) = self
                .call(
                    inv,
                    "saving join message",
                    self.repo.set_join_message(ws, ticket.id, Some(message_id)),
                )
                .await
            {
                self.partial_failure("Saving join message", inv, ticket.id, &e);
            }
        }

        Ok(OpenedTicket {
            ticket,
            channel,
            welcome_message_id,
            webhook,
        })
    }

    async fn load_panel(&self, inv: &Invocation, panel_id: Option<PanelId>) -> Result<Option<Panel>, TicketError> {
        let Some(panel_id) = panel_id else {
            return Ok(None);
        };
        self.call(inv, "loading panel", self.repo.panel(inv.workspace_id, panel_id))
            .await?
            .map(Some)
            .ok_or_else(|| ValidationError::PanelNotFound(panel_id).into())
    }

    async fn check_ticket_limit(&self, inv: &Invocation, settings: &WorkspaceSettings) -> Result<(), TicketError> {
        let open = self
            .call(
                inv,
                "counting open tickets",
                self.repo.count_open_tickets(inv.workspace_id, inv.actor.user_id),
            )
            .await?;
        if open >= usize::from(settings.ticket_limit) {
            return Err(ValidationError::TicketLimitReached {
                limit: settings.ticket_limit,
            }
            .into());
        }
        Ok(())
    }

    /// Picks the category for a standalone ticket channel, falling back to
    /// the overflow category when the preferred one is full.
    async fn select_category(
        &self,
        inv: &Invocation,
        ctx: &TenantContext,
        settings: &WorkspaceSettings,
        panel: Option<&Panel>,
    ) -> Result<Option<ChannelId>, TicketError> {
        let ws = inv.workspace_id;
        let channels = self
            .call(inv, "listing channels", self.channels.list_channels(ctx, ws))
            .await?;

        if channels.len() >= self.config.capacity.per_workspace {
            return Err(ValidationError::TooManyChannels.into());
        }

        let preferred = panel
            .and_then(|p| p.category_id)
            .or(settings.default_category);
        let Some(preferred) = preferred else {
            return Ok(None);
        };

        if !channels
            .iter()
            .any(|c| c.id == preferred && c.kind == ChannelKind::Category)
        {
            return Err(ValidationError::CategoryMissing.into());
        }

        let children = |category: ChannelId| {
            channels
                .iter()
                .filter(|c| c.parent_id == Some(category))
                .count()
        };

        if children(preferred) < self.config.capacity.per_category {
            return Ok(Some(preferred));
        }

        if !settings.overflow.enabled {
            return Err(ValidationError::TooManyTickets.into());
        }

        let Some(overflow) = settings.overflow.category_id else {
            debug!("Category {preferred} full, opening outside any category");
            return Ok(None);
        };

        match self
            .call(inv, "fetching overflow category", self.channels.channel(ctx, overflow))
            .await
        {
            Ok(category) if category.kind == ChannelKind::Category => {
                if children(overflow) < self.config.capacity.per_category {
                    Ok(Some(overflow))
                } else {
                    Err(ValidationError::TooManyTickets.into())
                }
            }
            Ok(_) => Err(ValidationError::TooManyTickets.into()),
            Err(TicketError::Platform(e)) if e.is_not_found() => {
                self.drop_overflow_category(inv, ctx, settings, overflow).await;
                Err(ValidationError::TooManyTickets.into())
            }
            Err(e) => Err(e),
        }
    }

    /// The overflow category vanished: clear the reference so later opens do
    /// not keep probing it, and tell the workspace's staff.
    async fn drop_overflow_category(
        &self,
        inv: &Invocation,
        ctx: &TenantContext,
        settings: &WorkspaceSettings,
        overflow: ChannelId,
    ) {
        warn!(
            "Overflow category {overflow} of workspace {} no longer exists, disabling overflow",
            inv.workspace_id
        );
        if let Err(e) = self
            .call(inv, "disabling overflow", self.repo.disable_overflow(inv.workspace_id))
            .await
        {
            warn!("Failed to disable overflow for workspace {}: {e}", inv.workspace_id);
        }

        if let Some(notify) = settings.notification_channel {
            let body = MessageBody::text(
                "The overflow category for tickets was deleted, so overflow has been disabled. \
                 Set a new overflow category to re-enable it.",
            );
            if let Err(e) = self
                .call(inv, "posting overflow notice", self.channels.send_message(ctx, notify, body))
                .await
            {
                warn!("Failed to post overflow notice in workspace {}: {e}", inv.workspace_id);
            }
        }
    }

    async fn channel_name(
        &self,
        inv: &Invocation,
        ctx: &TenantContext,
        settings: &WorkspaceSettings,
        panel: Option<&Panel>,
        ticket: &Ticket,
    ) -> String {
        let fallback = format!("ticket-{}", ticket.id);
        let scheme = panel
            .and_then(|p| p.naming_scheme.clone())
            .unwrap_or_else(|| settings.naming_scheme.clone());

        let raw = match scheme {
            NamingScheme::Id => fallback.clone(),
            NamingScheme::Username => format!("ticket-{}", inv.actor.username),
            NamingScheme::Custom(template) => {
                let substitution = self
                    .substitution_context(inv, ctx, settings, ticket, HashMap::new(), &template)
                    .await;
                self.placeholders.substitute(&template, &substitution).await
            }
        };

        let name = sanitize_channel_name(&raw);
        if name.is_empty() {
            fallback
        } else {
            name
        }
    }

    async fn create_conversation(
        &self,
        inv: &Invocation,
        ctx: &TenantContext,
        placement: Placement,
        ticket: &Ticket,
        staff: &AllowedStaff,
        name: String,
    ) -> Result<Channel, TicketError> {
        let ws = inv.workspace_id;
        match placement {
            Placement::Channel { category } => {
                let request = CreateChannel {
                    name,
                    parent_id: category,
                    topic: Some(format!("Ticket #{} opened by <@{}>", ticket.id, ticket.opener_id)),
                    access_entries: ticket_entries(ws, ctx.bot_id, ticket.opener_id, staff, None),
                };
                self.call(inv, "creating ticket channel", self.channels.create_channel(ctx, ws, request))
                    .await
            }
            Placement::Thread { parent } => {
                let request = CreateThread {
                    parent_id: parent,
                    name,
                    private: true,
                };
                let thread = self
                    .call(inv, "creating ticket thread", self.channels.create_thread(ctx, ws, request))
                    .await?;
                if let Err(e) = self
                    .call(
                        inv,
                        "adding opener to thread",
                        self.channels.add_thread_member(ctx, thread.id, ticket.opener_id),
                    )
                    .await
                {
                    self.partial_failure("Adding opener to thread", inv, ticket.id, &e);
                }
                Ok(thread)
            }
        }
    }

    /// Closes a reservation whose channel never came to be, so it stops
    /// counting against the opener's limit.
    async fn abandon_pending(&self, inv: &Invocation, ticket: &Ticket) {
        let metadata = CloseMetadata {
            reason: Some("Failed to create ticket channel".to_string()),
            closed_by: None,
        };
        if let Err(e) = self
            .call(
                inv,
                "closing pending ticket",
                self.repo.close_ticket(inv.workspace_id, ticket.id, metadata),
            )
            .await
        {
            log::error!(
                "Pending ticket {} in workspace {} could not be closed: {e}",
                ticket.id,
                inv.workspace_id
            );
        }
    }

    pub(crate) async fn substitution_context(
        &self,
        inv: &Invocation,
        ctx: &TenantContext,
        settings: &WorkspaceSettings,
        ticket: &Ticket,
        form_answers: HashMap<String, String>,
        template: &str,
    ) -> SubstitutionContext {
        let workspace_name = if template.contains("%server%") {
            match self
                .call(inv, "fetching workspace", self.channels.workspace(ctx, inv.workspace_id))
                .await
            {
                Ok(info) => info.name,
                Err(e) => {
                    debug!("Workspace name unavailable for placeholders: {e}");
                    String::new()
                }
            }
        } else {
            String::new()
        };

        SubstitutionContext {
            workspace_id: inv.workspace_id,
            workspace_name,
            ticket: ticket.clone(),
            opener_username: inv.actor.username.clone(),
            ticket_limit: settings.ticket_limit,
            form_answers,
        }
    }

    async fn send_welcome(
        &self,
        inv: &Invocation,
        ctx: &TenantContext,
        ticket: &Ticket,
        template: &str,
        substitution: &SubstitutionContext,
        subject: Option<&str>,
    ) -> Option<MessageId> {
        let channel_id = ticket.channel_id?;
        let mut content = self.placeholders.substitute(template, substitution).await;
        if let Some(subject) = subject.filter(|s| !s.trim().is_empty()) {
            content.push_str(&format!("\n\n**Subject:** {subject}"));
        }

        match self
            .call(
                inv,
                "sending welcome message",
                self.channels.send_message(ctx, channel_id, MessageBody::text(content)),
            )
            .await
        {
            Ok(message) => Some(message.id),
            Err(e) => {
                self.partial_failure("Welcome message", inv, ticket.id, &e);
                None
            }
        }
    }

    /// Thread tickets are invisible until joined, so staff get a message in
    /// the notification channel pointing at the thread.
    async fn post_join_message(
        &self,
        inv: &Invocation,
        ctx: &TenantContext,
        settings: &WorkspaceSettings,
        ticket: &Ticket,
    ) -> Option<MessageId> {
        if !ticket.is_thread {
            return None;
        }
        let notify = settings.notification_channel?;
        let thread = ticket.channel_id?;
        let body = MessageBody::text(format!(
            "Ticket #{} was opened by <@{}>: <#{thread}>",
            ticket.id, ticket.opener_id
        ));

        match self
            .call(inv, "posting join message", self.channels.send_message(ctx, notify, body))
            .await
        {
            Ok(message) => Some(message.id),
            Err(e) => {
                self.partial_failure("Join message", inv, ticket.id, &e);
                None
            }
        }
    }

    async fn create_relay_webhook(&self, inv: &Invocation, ctx: &TenantContext, ticket: &Ticket) -> Option<Webhook> {
        if !ctx.premium_tier.is_premium() || ticket.is_thread {
            return None;
        }
        let channel_id = ticket.channel_id?;
        match self
            .call(
                inv,
                "creating relay webhook",
                self.channels.create_webhook(ctx, channel_id, WEBHOOK_NAME),
            )
            .await
        {
            Ok(webhook) => Some(webhook),
            Err(e) => {
                self.partial_failure("Relay webhook", inv, ticket.id, &e);
                None
            }
        }
    }
}

fn check_panel(panel: &Panel, workspace_id: WorkspaceId, actor_groups: &[GroupId]) -> Result<(), ValidationError> {
    if panel.force_disabled {
        return Err(ValidationError::PanelForceDisabled);
    }
    if panel.disabled {
        return Err(ValidationError::PanelDisabled);
    }
    match panel_access(panel, workspace_id, actor_groups) {
        PanelAccess::Allow => Ok(()),
        PanelAccess::Deny { .. } => Err(ValidationError::PanelAccessDenied {
            allowed_groups: allowed_groups(panel),
        }),
    }
}
