//! Distributed token buckets for ticket opens and channel renames.
//!
//! Each bucket holds `burst` tokens and refills completely once its window
//! expires. An exhausted bucket is a hard reject; callers never queue.

use log::{debug, info};
use std::sync::Arc;

use crate::config::LimitsConfig;
use crate::shared::error::InfraError;
use crate::shared::models::{ChannelId, WorkspaceId};
use crate::store::{open_tokens_key, rename_tokens_key, SharedStore};

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn SharedStore>,
    config: LimitsConfig,
}

impl std::fmt::Debug for RateLimiter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimiter")
            .field("config", &self.config)
            .finish()
    }
}

impl RateLimiter {
    pub fn new(store: Arc<dyn SharedStore>, config: LimitsConfig) -> Self {
        Self { store, config }
    }

    /// Store errors propagate: an unreachable store must never mean
    /// unlimited opens.
    pub async fn try_acquire_open_token(&self, workspace_id: WorkspaceId) -> Result<bool, InfraError> {
        let taken = self
            .store
            .try_consume(
                &open_tokens_key(workspace_id),
                self.config.open_burst,
                self.config.open_window(),
            )
            .await?;

        if !taken {
            info!("Open-ticket bucket exhausted for workspace {workspace_id}");
        }
        Ok(taken)
    }

    pub async fn try_acquire_rename_token(&self, channel_id: ChannelId) -> Result<bool, InfraError> {
        let taken = self
            .store
            .try_consume(
                &rename_tokens_key(channel_id),
                self.config.rename_burst,
                self.config.rename_window(),
            )
            .await?;

        debug!("Rename token for channel {channel_id}: {taken}");
        Ok(taken)
    }
}
