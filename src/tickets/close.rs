use log::{debug, info, warn};

use super::{EngineMetrics, Invocation, TicketEngine, TicketRef};
use crate::access::PermissionLevel;
use crate::channels::{Message, MessageBody, ModifyChannel};
use crate::shared::error::{TicketError, ValidationError};
use crate::shared::models::{ChannelId, CloseMetadata, Ticket, TicketId, WorkspaceSettings};
use crate::store::dm_unreachable_key;
use crate::tenant::TenantContext;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseRequest {
    pub target: TicketRef,
    pub reason: Option<String>,
    /// Set by system-initiated closes (auto-close, opener left).
    pub bypass_permission: bool,
}

impl CloseRequest {
    pub fn new(target: TicketRef) -> Self {
        Self {
            target,
            reason: None,
            bypass_permission: false,
        }
    }

    pub fn with_reason(mut self, reason: impl Into<String>) -> Self {
        self.reason = Some(reason.into());
        self
    }

    pub fn bypassing_permission(mut self) -> Self {
        self.bypass_permission = true;
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CloseOutcome {
    pub ticket: Ticket,
    pub transcript_stored: bool,
    /// Thread kept (archived and locked) rather than deleted.
    pub archived: bool,
}

impl TicketEngine {
    pub async fn close_ticket(&self, inv: &Invocation, request: CloseRequest) -> Result<CloseOutcome, TicketError> {
        let result = self.close_inner(inv, request).await;
        match &result {
            Ok(outcome) => {
                EngineMetrics::inc(&self.metrics.closed);
                info!(
                    "Closed ticket {} in workspace {} by {} (transcript: {})",
                    outcome.ticket.id, inv.workspace_id, inv.actor.user_id, outcome.transcript_stored
                );
            }
            Err(e) => self.log_failure("Close", inv, None, e),
        }
        result
    }

    async fn close_inner(&self, inv: &Invocation, request: CloseRequest) -> Result<CloseOutcome, TicketError> {
        let ws = inv.workspace_id;
        let (ctx, settings) = futures::try_join!(self.tenant(inv), self.settings(inv))?;

        let ticket = self.fetch_ticket(inv, request.target).await?;
        if !ticket.open {
            return Err(ValidationError::AlreadyClosed.into());
        }

        if !request.bypass_permission {
            let level = self.actor_level(inv, &settings, &inv.actor).await?;
            let own_ticket = settings.users_can_close && ticket.opener_id == inv.actor.user_id;
            if level < PermissionLevel::Support && !own_ticket {
                return Err(ValidationError::InsufficientPermission {
                    required: PermissionLevel::Support,
                }
                .into());
            }
        }

        // Archived before the row flips; two racing closes can both get here
        // and both archive. Only one wins the close below.
        let mut transcript_stored = false;
        if let (true, Some(channel_id)) = (settings.store_transcripts, ticket.channel_id) {
            let messages = self.collect_transcript(inv, &ctx, ticket.id, channel_id).await?;
            debug!(
                "Archiving {} messages for ticket {} in workspace {ws}",
                messages.len(),
                ticket.id
            );
            self.call(
                inv,
                "archiving transcript",
                self.archiver
                    .store(messages, ws, ticket.id, ctx.premium_tier.is_premium()),
            )
            .await?;
            self.call(
                inv,
                "marking transcript stored",
                self.repo.set_transcript_stored(ws, ticket.id),
            )
            .await?;
            transcript_stored = true;
        }

        let metadata = CloseMetadata {
            reason: request.reason.clone(),
            closed_by: (!inv.is_system()).then_some(inv.actor.user_id),
        };
        let closed = self
            .call(inv, "closing ticket", self.repo.close_ticket(ws, ticket.id, metadata.clone()))
            .await?;
        if !closed {
            return Err(ValidationError::AlreadyClosed.into());
        }

        let mut ticket = ticket;
        ticket.open = false;
        ticket.close_reason = metadata.reason;
        ticket.closed_by = metadata.closed_by;
        ticket.has_transcript = transcript_stored;

        let channel_result = match ticket.channel_id {
            Some(channel_id) => self.retire_channel(inv, &ctx, &ticket, channel_id).await,
            None => Ok(()),
        };

        if let Err(e) = &channel_result {
            warn!(
                "Channel for ticket {} in workspace {ws} could not be removed, excluding from auto-close: {e}",
                ticket.id
            );
            if let Err(e) = self
                .call(inv, "excluding from auto-close", self.repo.exclude_from_autoclose(ws, ticket.id))
                .await
            {
                self.partial_failure("Auto-close exclusion", inv, ticket.id, &e);
            }
            ticket.autoclose_excluded = true;
        }

        futures::join!(
            self.delete_close_request(inv, &ticket),
            self.delete_join_message(inv, &ctx, &settings, &ticket),
            self.post_archive_summary(inv, &ctx, &settings, &ticket),
            self.dm_opener(inv, &ctx, &ticket),
        );

        channel_result?;

        Ok(CloseOutcome {
            archived: ticket.is_thread,
            ticket,
            transcript_stored,
        })
    }

    /// Walks the history backwards from the newest message, one fixed-size
    /// page at a time until a page comes back empty. Returns oldest first.
    async fn collect_transcript(
        &self,
        inv: &Invocation,
        ctx: &TenantContext,
        ticket_id: TicketId,
        channel_id: ChannelId,
    ) -> Result<Vec<Message>, TicketError> {
        let page_size = self.config.close.transcript_page_size;
        let mut before = None;
        let mut messages = Vec::new();

        loop {
            let page = match self
                .call(
                    inv,
                    "fetching transcript page",
                    self.channels.messages_before(ctx, channel_id, before, page_size),
                )
                .await
            {
                Ok(page) => page,
                Err(TicketError::Platform(e)) if e.is_forbidden() => {
                    warn!(
                        "No access to history of ticket {ticket_id} in workspace {}, excluding workspace from auto-close",
                        inv.workspace_id
                    );
                    if let Err(ex) = self
                        .call(
                            inv,
                            "excluding workspace from auto-close",
                            self.repo.exclude_workspace_from_autoclose(inv.workspace_id),
                        )
                        .await
                    {
                        self.partial_failure("Workspace auto-close exclusion", inv, ticket_id, &ex);
                    }
                    return Err(e.into());
                }
                Err(e) => return Err(e),
            };

            let Some(oldest) = page.last() else {
                break;
            };
            before = Some(oldest.id);
            messages.extend(page);
        }

        messages.reverse();
        Ok(messages)
    }

    /// Deletes a standalone channel, or archives and locks a thread. A channel
    /// that is already gone counts as removed.
    async fn retire_channel(
        &self,
        inv: &Invocation,
        ctx: &TenantContext,
        ticket: &Ticket,
        channel_id: ChannelId,
    ) -> Result<(), TicketError> {
        let result = if ticket.is_thread {
            // The platform drops archive requests that land right behind the
            // last message in the thread.
            tokio::time::sleep(self.config.close.thread_archive_delay()).await;
            self.call(
                inv,
                "archiving thread",
                self.channels.modify_channel(ctx, channel_id, ModifyChannel::archive()),
            )
            .await
            .map(|_| ())
        } else {
            self.call(inv, "deleting channel", self.channels.delete_channel(ctx, channel_id))
                .await
        };

        match result {
            Err(TicketError::Platform(e)) if e.is_not_found() => {
                debug!("Channel {channel_id} of ticket {} already gone", ticket.id);
                Ok(())
            }
            other => other,
        }
    }

    async fn delete_close_request(&self, inv: &Invocation, ticket: &Ticket) {
        if let Err(e) = self
            .call(
                inv,
                "deleting close request",
                self.repo.delete_close_request(inv.workspace_id, ticket.id),
            )
            .await
        {
            self.partial_failure("Close request cleanup", inv, ticket.id, &e);
        }
    }

    async fn delete_join_message(
        &self,
        inv: &Invocation,
        ctx: &TenantContext,
        settings: &WorkspaceSettings,
        ticket: &Ticket,
    ) {
        let (Some(message_id), Some(notify)) = (ticket.join_message_id, settings.notification_channel) else {
            return;
        };
        match self
            .call(
                inv,
                "deleting join message",
                self.channels.delete_message(ctx, notify, message_id),
            )
            .await
        {
            Ok(()) => {}
            Err(TicketError::Platform(e)) if e.is_not_found() => {}
            Err(e) => self.partial_failure("Join message cleanup", inv, ticket.id, &e),
        }
        if let Err(e) = self
            .call(
                inv,
                "clearing join message",
                self.repo.set_join_message(inv.workspace_id, ticket.id, None),
            )
            .await
        {
            self.partial_failure("Join message reference cleanup", inv, ticket.id, &e);
        }
    }

    async fn post_archive_summary(
        &self,
        inv: &Invocation,
        ctx: &TenantContext,
        settings: &WorkspaceSettings,
        ticket: &Ticket,
    ) {
        let Some(archive_channel) = settings.archive_channel else {
            return;
        };
        let body = MessageBody::text(close_summary(ticket));
        match self
            .call(
                inv,
                "posting close summary",
                self.channels.send_message(ctx, archive_channel, body),
            )
            .await
        {
            Ok(_) => {}
            Err(TicketError::Platform(e)) if e.is_not_found() => {
                warn!(
                    "Archive channel {archive_channel} of workspace {} was deleted, clearing it",
                    inv.workspace_id
                );
                if let Err(e) = self
                    .call(
                        inv,
                        "clearing archive channel",
                        self.repo.clear_archive_channel(inv.workspace_id),
                    )
                    .await
                {
                    self.partial_failure("Archive channel cleanup", inv, ticket.id, &e);
                }
            }
            Err(e) => self.partial_failure("Close summary", inv, ticket.id, &e),
        }
    }

    /// DMs the opener unless an earlier attempt already found their DMs
    /// closed; a fresh failure is remembered for a while.
    async fn dm_opener(&self, inv: &Invocation, ctx: &TenantContext, ticket: &Ticket) {
        let key = dm_unreachable_key(ticket.opener_id);
        match self.call(inv, "checking DM cache", self.store.is_flagged(&key)).await {
            Ok(true) => {
                debug!("Skipping DM to {}, marked unreachable", ticket.opener_id);
                return;
            }
            Ok(false) => {}
            Err(e) => {
                self.partial_failure("DM cache lookup", inv, ticket.id, &e);
                return;
            }
        }

        let sent = async {
            let dm = self
                .call(inv, "opening DM", self.channels.create_dm(ctx, ticket.opener_id))
                .await?;
            self.call(
                inv,
                "sending close DM",
                self.channels
                    .send_message(ctx, dm, MessageBody::text(close_summary(ticket))),
            )
            .await
        }
        .await;

        if let Err(e) = sent {
            self.partial_failure("Close DM", inv, ticket.id, &e);
            if let Err(e) = self
                .call(
                    inv,
                    "caching DM failure",
                    self.store.flag(&key, self.config.dm_failure_ttl()),
                )
                .await
            {
                self.partial_failure("DM failure cache", inv, ticket.id, &e);
            }
        }
    }
}

fn close_summary(ticket: &Ticket) -> String {
    let closer = ticket
        .closed_by
        .map_or_else(|| "automatically".to_string(), |id| format!("by <@{id}>"));
    let reason = ticket.close_reason.as_deref().unwrap_or("No reason specified");
    let mut summary = format!(
        "Ticket #{} opened by <@{}> was closed {closer}.\nReason: {reason}",
        ticket.id, ticket.opener_id
    );
    if let Some(claimer) = ticket.claimed_by {
        summary.push_str(&format!("\nClaimed by: <@{claimer}>"));
    }
    summary
}
