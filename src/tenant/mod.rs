//! Per-request execution context: which credential and rate-limit bucket a
//! workspace's platform calls go through.

use async_trait::async_trait;
use futures::try_join;
use log::debug;
use std::sync::Arc;

use crate::config::TenantConfig;
use crate::shared::error::InfraError;
use crate::shared::models::{PremiumTier, UserId, WorkspaceId};

pub const DEFAULT_BUCKET: &str = "ratelimit:default";

/// Built fresh for every operation. Credentials can change between two
/// requests for the same workspace, so this is never cached.
#[derive(Clone, PartialEq, Eq)]
pub struct TenantContext {
    pub token: String,
    pub bot_id: UserId,
    pub bucket: String,
    pub whitelabel: bool,
    pub premium_tier: PremiumTier,
}

impl std::fmt::Debug for TenantContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TenantContext")
            .field("token", &"<redacted>")
            .field("bot_id", &self.bot_id)
            .field("bucket", &self.bucket)
            .field("whitelabel", &self.whitelabel)
            .field("premium_tier", &self.premium_tier)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WhitelabelBot {
    pub bot_id: UserId,
    pub token: String,
}

#[async_trait]
pub trait TenantDirectory: Send + Sync {
    async fn whitelabel_bot(&self, workspace_id: WorkspaceId) -> Result<Option<WhitelabelBot>, InfraError>;

    async fn premium_tier(&self, workspace_id: WorkspaceId) -> Result<PremiumTier, InfraError>;
}

#[derive(Clone)]
pub struct TenantContextBuilder {
    directory: Arc<dyn TenantDirectory>,
    defaults: TenantConfig,
}

impl TenantContextBuilder {
    pub fn new(directory: Arc<dyn TenantDirectory>, defaults: TenantConfig) -> Self {
        Self {
            directory,
            defaults,
        }
    }

    /// A registered branded bot is used only while the workspace still holds
    /// the whitelabel tier; otherwise calls go through the shared pool.
    pub async fn build(&self, workspace_id: WorkspaceId) -> Result<TenantContext, InfraError> {
        let (bot, tier) = try_join!(
            self.directory.whitelabel_bot(workspace_id),
            self.directory.premium_tier(workspace_id)
        )?;

        let ctx = match bot {
            Some(bot) if tier == PremiumTier::Whitelabel => TenantContext {
                bucket: format!("ratelimit:{}", bot.bot_id),
                token: bot.token,
                bot_id: bot.bot_id,
                whitelabel: true,
                premium_tier: tier,
            },
            _ => TenantContext {
                token: self.defaults.default_token.clone(),
                bot_id: self.defaults.default_bot_id,
                bucket: DEFAULT_BUCKET.to_string(),
                whitelabel: false,
                premium_tier: tier,
            },
        };

        debug!(
            "Tenant context for workspace {workspace_id}: bucket={} whitelabel={}",
            ctx.bucket, ctx.whitelabel
        );
        Ok(ctx)
    }
}
