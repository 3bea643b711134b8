use log::info;

use super::{EngineMetrics, Invocation, TicketEngine, TicketRef};
use crate::access::PermissionLevel;
use crate::channels::{MessageBody, ModifyChannel};
use crate::shared::error::{TicketError, ValidationError};
use crate::shared::models::Ticket;

/// A 404 while touching the thread means it was deleted; callers get the
/// specific outcome rather than a platform error.
fn deleted_as_validation(err: TicketError) -> TicketError {
    match err {
        TicketError::Platform(e) if e.is_not_found() => ValidationError::ChannelDeleted.into(),
        other => other,
    }
}

impl TicketEngine {
    /// Brings an archived thread ticket back to open. Only the opener or
    /// staff may do so. Standalone tickets had their channel deleted on close
    /// and cannot come back.
    pub async fn reopen_ticket(&self, inv: &Invocation, target: TicketRef) -> Result<Ticket, TicketError> {
        let result = self.reopen_inner(inv, target).await;
        match &result {
            Ok(ticket) => {
                EngineMetrics::inc(&self.metrics.reopened);
                info!(
                    "Reopened ticket {} in workspace {} by {}",
                    ticket.id, inv.workspace_id, inv.actor.user_id
                );
            }
            Err(e) => self.log_failure("Reopen", inv, None, e),
        }
        result
    }

    async fn reopen_inner(&self, inv: &Invocation, target: TicketRef) -> Result<Ticket, TicketError> {
        let ws = inv.workspace_id;
        let (ctx, settings) = futures::try_join!(self.tenant(inv), self.settings(inv))?;
        let ticket = self.fetch_ticket(inv, target).await?;

        let level = self.actor_level(inv, &settings, &inv.actor).await?;
        if level < PermissionLevel::Support {
            if inv.actor.user_id != ticket.opener_id {
                return Err(ValidationError::InsufficientPermission {
                    required: PermissionLevel::Support,
                }
                .into());
            }
            let open = self
                .call(
                    inv,
                    "counting open tickets",
                    self.repo.count_open_tickets(ws, ticket.opener_id),
                )
                .await?;
            if open >= usize::from(settings.ticket_limit) {
                return Err(ValidationError::TicketLimitReached {
                    limit: settings.ticket_limit,
                }
                .into());
            }
        }

        if ticket.open {
            return Err(ValidationError::NotClosed.into());
        }
        if !ticket.is_thread {
            return Err(ValidationError::NotThread.into());
        }
        let Some(channel_id) = ticket.channel_id else {
            return Err(ValidationError::ChannelDeleted.into());
        };

        self.call(inv, "fetching ticket thread", self.channels.channel(&ctx, channel_id))
            .await
            .map_err(deleted_as_validation)?;

        self.call(
            inv,
            "unarchiving thread",
            self.channels
                .modify_channel(&ctx, channel_id, ModifyChannel::unarchive()),
        )
        .await
        .map_err(deleted_as_validation)?;

        if !self
            .call(inv, "reopening ticket", self.repo.reopen_ticket(ws, ticket.id))
            .await?
        {
            return Err(ValidationError::NotClosed.into());
        }

        let mut ticket = ticket;
        ticket.open = true;
        ticket.close_reason = None;
        ticket.closed_by = None;

        if let Err(e) = self
            .call(
                inv,
                "adding opener to thread",
                self.channels.add_thread_member(&ctx, channel_id, ticket.opener_id),
            )
            .await
        {
            self.partial_failure("Re-adding opener", inv, ticket.id, &e);
        }

        let body = MessageBody::text(format!("This ticket was reopened by {}", inv.actor.mention()));
        if let Err(e) = self
            .call(inv, "announcing reopen", self.channels.send_message(&ctx, channel_id, body))
            .await
        {
            self.partial_failure("Reopen announcement", inv, ticket.id, &e);
        }

        Ok(ticket)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::error::PlatformError;

    #[test]
    fn test_only_not_found_becomes_channel_deleted() {
        let gone: TicketError = PlatformError::Api {
            status: 404,
            message: "Unknown Channel".to_string(),
        }
        .into();
        assert_eq!(
            deleted_as_validation(gone),
            TicketError::Validation(ValidationError::ChannelDeleted)
        );

        let forbidden: TicketError = PlatformError::Api {
            status: 403,
            message: "Missing Access".to_string(),
        }
        .into();
        assert!(!deleted_as_validation(forbidden).is_validation());
    }
}
