//! Ticket lifecycle: open, claim, transfer, unclaim, close, reopen, rename.
//!
//! Every entry point re-reads the ticket row before acting; the repository
//! is the system of record and nothing from an earlier step is trusted.
//! Collaborator calls are bounded by the invocation's deadline.

use log::warn;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use crate::access::{AccessResolver, Blacklist, PermissionLevel, SnapshotCache};
use crate::channels::ChannelApi;
use crate::config::EngineConfig;
use crate::limits::{OpenLock, RateLimiter};
use crate::placeholders::PlaceholderEngine;
use crate::shared::error::{TicketError, ValidationError};
use crate::shared::models::{
    Actor, ChannelId, Panel, Ticket, TicketId, UserId, WorkspaceId, WorkspaceSettings,
};
use crate::shared::utils::bounded;
use crate::store::SharedStore;
use crate::tenant::{TenantContext, TenantContextBuilder, TenantDirectory};

pub mod claim;
pub mod close;
pub mod entries;
pub mod open;
pub mod rename;
pub mod reopen;
pub mod repository;

pub use close::{CloseOutcome, CloseRequest};
pub use open::{OpenRequest, OpenedTicket};
pub use repository::{Archiver, TicketRepository};

/// User id recorded for closes the engine performs on its own behalf.
pub const SYSTEM_USER: UserId = 0;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Origin {
    /// A command or button press; someone is waiting for the reply.
    Interactive,
    /// Auto-close, event listeners and other jobs nobody waits on.
    Background,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Invocation {
    pub workspace_id: WorkspaceId,
    pub actor: Actor,
    pub origin: Origin,
}

impl Invocation {
    pub fn interactive(workspace_id: WorkspaceId, actor: Actor) -> Self {
        Self {
            workspace_id,
            actor,
            origin: Origin::Interactive,
        }
    }

    pub fn background(workspace_id: WorkspaceId, actor: Actor) -> Self {
        Self {
            workspace_id,
            actor,
            origin: Origin::Background,
        }
    }

    pub fn system(workspace_id: WorkspaceId) -> Self {
        Self::background(workspace_id, Actor::new(SYSTEM_USER, "system"))
    }

    pub fn is_system(&self) -> bool {
        self.actor.user_id == SYSTEM_USER
    }
}

/// How a command names its ticket: by the channel it was run in, or by id
/// for background jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TicketRef {
    Channel(ChannelId),
    Id(TicketId),
}

#[derive(Debug, Default)]
pub struct EngineMetrics {
    opened: AtomicU64,
    open_rejected: AtomicU64,
    closed: AtomicU64,
    claimed: AtomicU64,
    reopened: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub opened: u64,
    pub open_rejected: u64,
    pub closed: u64,
    pub claimed: u64,
    pub reopened: u64,
}

impl EngineMetrics {
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            opened: self.opened.load(Ordering::Relaxed),
            open_rejected: self.open_rejected.load(Ordering::Relaxed),
            closed: self.closed.load(Ordering::Relaxed),
            claimed: self.claimed.load(Ordering::Relaxed),
            reopened: self.reopened.load(Ordering::Relaxed),
        }
    }

    fn inc(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }
}

pub struct TicketEngine {
    config: EngineConfig,
    repo: Arc<dyn TicketRepository>,
    channels: Arc<dyn ChannelApi>,
    archiver: Arc<dyn Archiver>,
    store: Arc<dyn SharedStore>,
    tenants: TenantContextBuilder,
    limiter: RateLimiter,
    open_lock: OpenLock,
    access: AccessResolver,
    blacklist: Arc<SnapshotCache<Blacklist>>,
    placeholders: PlaceholderEngine,
    metrics: EngineMetrics,
}

impl TicketEngine {
    pub fn new(
        config: EngineConfig,
        repo: Arc<dyn TicketRepository>,
        channels: Arc<dyn ChannelApi>,
        archiver: Arc<dyn Archiver>,
        store: Arc<dyn SharedStore>,
        directory: Arc<dyn TenantDirectory>,
    ) -> Self {
        Self {
            tenants: TenantContextBuilder::new(directory, config.tenant.clone()),
            limiter: RateLimiter::new(Arc::clone(&store), config.limits.clone()),
            open_lock: OpenLock::new(Arc::clone(&store), config.lease.clone()),
            access: AccessResolver::new(Arc::clone(&repo)),
            blacklist: Arc::new(SnapshotCache::new(Blacklist::default())),
            placeholders: PlaceholderEngine::new(Arc::clone(&repo), config.timeouts.placeholder()),
            metrics: EngineMetrics::default(),
            config,
            repo,
            channels,
            archiver,
            store,
        }
    }

    pub fn with_blacklist(mut self, blacklist: Arc<SnapshotCache<Blacklist>>) -> Self {
        self.blacklist = blacklist;
        self
    }

    pub fn with_placeholders(mut self, placeholders: PlaceholderEngine) -> Self {
        self.placeholders = placeholders;
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn metrics(&self) -> MetricsSnapshot {
        self.metrics.snapshot()
    }

    fn deadline(&self, origin: Origin) -> Duration {
        match origin {
            Origin::Interactive => self.config.timeouts.interactive(),
            Origin::Background => self.config.timeouts.background(),
        }
    }

    /// Runs one collaborator call under the invocation's deadline.
    async fn call<T, E, F>(&self, inv: &Invocation, what: &str, fut: F) -> Result<T, TicketError>
    where
        F: Future<Output = Result<T, E>>,
        E: Into<TicketError>,
    {
        bounded(self.deadline(inv.origin), what, fut).await
    }

    async fn tenant(&self, inv: &Invocation) -> Result<TenantContext, TicketError> {
        self.call(inv, "building tenant context", self.tenants.build(inv.workspace_id))
            .await
    }

    async fn settings(&self, inv: &Invocation) -> Result<WorkspaceSettings, TicketError> {
        self.call(
            inv,
            "loading workspace settings",
            self.repo.workspace_settings(inv.workspace_id),
        )
        .await
    }

    async fn actor_level(
        &self,
        inv: &Invocation,
        settings: &WorkspaceSettings,
        actor: &Actor,
    ) -> Result<PermissionLevel, TicketError> {
        self.call(
            inv,
            "resolving permission level",
            self.access
                .resolve_actor_level(inv.workspace_id, settings.owner_id, actor),
        )
        .await
    }

    async fn require_level(
        &self,
        inv: &Invocation,
        settings: &WorkspaceSettings,
        required: PermissionLevel,
    ) -> Result<PermissionLevel, TicketError> {
        let level = self.actor_level(inv, settings, &inv.actor).await?;
        if level < required {
            return Err(ValidationError::InsufficientPermission { required }.into());
        }
        Ok(level)
    }

    /// Always a fresh read; never trusts a ticket handed in by the caller.
    async fn fetch_ticket(&self, inv: &Invocation, target: TicketRef) -> Result<Ticket, TicketError> {
        let ws = inv.workspace_id;
        match target {
            TicketRef::Channel(channel_id) => self
                .call(inv, "loading ticket", self.repo.ticket_by_channel(ws, channel_id))
                .await?
                .ok_or_else(|| ValidationError::NotATicketChannel.into()),
            TicketRef::Id(ticket_id) => self
                .call(inv, "loading ticket", self.repo.ticket(ws, ticket_id))
                .await?
                .ok_or_else(|| ValidationError::TicketNotFound(ticket_id).into()),
        }
    }

    async fn ticket_panel(&self, inv: &Invocation, ticket: &Ticket) -> Result<Option<Panel>, TicketError> {
        match ticket.panel_id {
            Some(panel_id) => {
                self.call(inv, "loading panel", self.repo.panel(inv.workspace_id, panel_id))
                    .await
            }
            None => Ok(None),
        }
    }

    /// Logs a rejected or failed transition with enough context to find the
    /// ticket again.
    fn log_failure(&self, op: &str, inv: &Invocation, ticket_id: Option<TicketId>, err: &TicketError) {
        let ticket = ticket_id.map_or_else(|| "-".to_string(), |id| id.to_string());
        if err.is_validation() {
            log::info!(
                "{op} rejected: workspace={} ticket={ticket} actor={}: {err}",
                inv.workspace_id,
                inv.actor.user_id
            );
        } else {
            log::error!(
                "{op} failed: workspace={} ticket={ticket} actor={}: {err}",
                inv.workspace_id,
                inv.actor.user_id
            );
        }
    }

    /// Best-effort side effects log and carry on.
    fn partial_failure(&self, what: &str, inv: &Invocation, ticket_id: TicketId, err: &TicketError) {
        warn!(
            "{what} failed (non-fatal): workspace={} ticket={ticket_id}: {err}",
            inv.workspace_id
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_system_invocation_runs_in_background() {
        let inv = Invocation::system(9);
        assert!(inv.is_system());
        assert_eq!(inv.origin, Origin::Background);
        assert!(!Invocation::interactive(9, Actor::new(5, "bob")).is_system());
    }

    #[test]
    fn test_metrics_snapshot_reads_counters() {
        let metrics = EngineMetrics::default();
        EngineMetrics::inc(&metrics.opened);
        EngineMetrics::inc(&metrics.opened);
        EngineMetrics::inc(&metrics.closed);

        let snap = metrics.snapshot();
        assert_eq!(snap.opened, 2);
        assert_eq!(snap.closed, 1);
        assert_eq!(snap.reopened, 0);
    }
}
