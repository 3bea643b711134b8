use log::{debug, info};

use super::entries::{ticket_entries, ClaimState};
use super::{EngineMetrics, Invocation, TicketEngine, TicketRef};
use crate::access::PermissionLevel;
use crate::channels::MessageBody;
use crate::shared::error::{TicketError, ValidationError};
use crate::shared::models::{Actor, Ticket, UserId, WorkspaceSettings};
use crate::tenant::TenantContext;

impl TicketEngine {
    /// Claims the ticket for the invoking staff member.
    pub async fn claim_ticket(&self, inv: &Invocation, target: TicketRef) -> Result<Ticket, TicketError> {
        let result = self.claim_for(inv, target, None).await;
        self.finish_claim("Claim", inv, &result);
        result
    }

    /// Hands the ticket to `new_claimer`, who must be staff.
    pub async fn transfer_ticket(
        &self,
        inv: &Invocation,
        target: TicketRef,
        new_claimer: &Actor,
    ) -> Result<Ticket, TicketError> {
        let result = self.claim_for(inv, target, Some(new_claimer)).await;
        self.finish_claim("Transfer", inv, &result);
        result
    }

    /// Only the current claimer or an admin may unclaim.
    pub async fn unclaim_ticket(&self, inv: &Invocation, target: TicketRef) -> Result<Ticket, TicketError> {
        let result = self.unclaim_inner(inv, target).await;
        match &result {
            Ok(ticket) => info!(
                "Ticket {} in workspace {} unclaimed by {}",
                ticket.id, inv.workspace_id, inv.actor.user_id
            ),
            Err(e) => self.log_failure("Unclaim", inv, None, e),
        }
        result
    }

    fn finish_claim(&self, op: &str, inv: &Invocation, result: &Result<Ticket, TicketError>) {
        match result {
            Ok(ticket) => {
                EngineMetrics::inc(&self.metrics.claimed);
                info!(
                    "{op}: ticket {} in workspace {} now claimed by {:?}",
                    ticket.id, inv.workspace_id, ticket.claimed_by
                );
            }
            Err(e) => self.log_failure(op, inv, None, e),
        }
    }

    async fn claim_for(
        &self,
        inv: &Invocation,
        target: TicketRef,
        new_claimer: Option<&Actor>,
    ) -> Result<Ticket, TicketError> {
        let (ctx, settings) = futures::try_join!(self.tenant(inv), self.settings(inv))?;
        self.require_level(inv, &settings, PermissionLevel::Support).await?;

        let claimer = match new_claimer {
            Some(actor) => {
                let level = self.actor_level(inv, &settings, actor).await?;
                if level < PermissionLevel::Support {
                    return Err(ValidationError::TargetNotStaff.into());
                }
                actor
            }
            None => &inv.actor,
        };

        let ticket = self.fetch_open_ticket(inv, target).await?;
        let ticket = self
            .apply_claim(inv, &ctx, &settings, ticket, Some(claimer.user_id))
            .await?;

        if new_claimer.is_some() {
            if let Some(channel_id) = ticket.channel_id {
                let body = MessageBody::text(format!(
                    "{} transferred this ticket to {}",
                    inv.actor.mention(),
                    claimer.mention()
                ));
                if let Err(e) = self
                    .call(inv, "announcing transfer", self.channels.send_message(&ctx, channel_id, body))
                    .await
                {
                    self.partial_failure("Transfer announcement", inv, ticket.id, &e);
                }
            }
        }

        Ok(ticket)
    }

    async fn unclaim_inner(&self, inv: &Invocation, target: TicketRef) -> Result<Ticket, TicketError> {
        let (ctx, settings) = futures::try_join!(self.tenant(inv), self.settings(inv))?;
        let level = self.require_level(inv, &settings, PermissionLevel::Support).await?;

        let ticket = self.fetch_open_ticket(inv, target).await?;
        let Some(claimer) = ticket.claimed_by else {
            return Err(ValidationError::NotClaimed.into());
        };
        if claimer != inv.actor.user_id && level < PermissionLevel::Admin {
            return Err(ValidationError::NotClaimer.into());
        }

        self.apply_claim(inv, &ctx, &settings, ticket, None).await
    }

    async fn fetch_open_ticket(&self, inv: &Invocation, target: TicketRef) -> Result<Ticket, TicketError> {
        let ticket = self.fetch_ticket(inv, target).await?;
        if !ticket.open {
            return Err(ValidationError::AlreadyClosed.into());
        }
        Ok(ticket)
    }

    /// Persists the claimer, then rewrites the channel's whole access list
    /// for the new claim state.
    async fn apply_claim(
        &self,
        inv: &Invocation,
        ctx: &TenantContext,
        settings: &WorkspaceSettings,
        mut ticket: Ticket,
        claimer: Option<UserId>,
    ) -> Result<Ticket, TicketError> {
        let ws = inv.workspace_id;
        self.call(inv, "saving claimer", self.repo.set_claimer(ws, ticket.id, claimer))
            .await?;
        ticket.claimed_by = claimer;

        let Some(channel_id) = ticket.channel_id else {
            return Ok(ticket);
        };
        if ticket.is_thread {
            // Private threads have no per-channel access entries.
            debug!("Ticket {} is a thread, access entries unchanged", ticket.id);
            return Ok(ticket);
        }

        let panel = self.ticket_panel(inv, &ticket).await?;
        let staff = self
            .call(
                inv,
                "resolving ticket staff",
                self.access.resolve_allowed_staff(ws, panel.as_ref()),
            )
            .await?;

        let claim = claimer.map(|claimer| ClaimState {
            claimer,
            visibility: settings.claim_visibility,
        });
        let entries = ticket_entries(ws, ctx.bot_id, ticket.opener_id, &staff, claim);

        self.call(
            inv,
            "rewriting access entries",
            self.channels.edit_access_entries(ctx, channel_id, entries),
        )
        .await?;

        Ok(ticket)
    }
}
