use log::info;

use super::{Invocation, TicketEngine, TicketRef};
use crate::access::PermissionLevel;
use crate::channels::{Channel, ModifyChannel};
use crate::shared::error::{TicketError, ValidationError};
use crate::shared::utils::sanitize_channel_name;

pub const MAX_CHANNEL_NAME: usize = 100;

impl TicketEngine {
    /// Renames the ticket's channel. Renames share a small per-channel
    /// bucket because the platform throttles them hard.
    pub async fn rename_ticket(
        &self,
        inv: &Invocation,
        target: TicketRef,
        new_name: &str,
    ) -> Result<Channel, TicketError> {
        let result = self.rename_inner(inv, target, new_name).await;
        match &result {
            Ok(channel) => info!(
                "Renamed channel {} in workspace {} to {}",
                channel.id, inv.workspace_id, channel.name
            ),
            Err(e) => self.log_failure("Rename", inv, None, e),
        }
        result
    }

    async fn rename_inner(&self, inv: &Invocation, target: TicketRef, new_name: &str) -> Result<Channel, TicketError> {
        let trimmed = new_name.trim();
        if trimmed.is_empty() || trimmed.chars().count() > MAX_CHANNEL_NAME {
            return Err(ValidationError::InvalidName {
                max: MAX_CHANNEL_NAME,
            }
            .into());
        }
        let name = sanitize_channel_name(trimmed);
        if name.is_empty() {
            return Err(ValidationError::InvalidName {
                max: MAX_CHANNEL_NAME,
            }
            .into());
        }

        let (ctx, settings) = futures::try_join!(self.tenant(inv), self.settings(inv))?;
        self.require_level(inv, &settings, PermissionLevel::Support).await?;

        let ticket = self.fetch_ticket(inv, target).await?;
        if !ticket.open {
            return Err(ValidationError::AlreadyClosed.into());
        }
        let channel_id = ticket.channel_id.ok_or(ValidationError::NotATicketChannel)?;

        if !self
            .call(
                inv,
                "taking rename token",
                self.limiter.try_acquire_rename_token(channel_id),
            )
            .await?
        {
            return Err(ValidationError::RenameRateLimited.into());
        }

        self.call(
            inv,
            "renaming channel",
            self.channels
                .modify_channel(&ctx, channel_id, ModifyChannel::rename(name)),
        )
        .await
    }
}
