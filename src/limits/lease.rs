//! Short-TTL lease serialising ticket reservations within one workspace.
//!
//! Only opening takes the lease. Claim and close re-read the ticket row and
//! rely on the repository's state checks instead.

use log::{debug, warn};
use rand::Rng;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};
use uuid::Uuid;

use crate::config::LeaseConfig;
use crate::shared::error::{InfraError, TicketError, ValidationError};
use crate::shared::models::WorkspaceId;
use crate::store::{open_lock_key, SharedStore};

#[derive(Debug)]
pub struct Lease {
    key: String,
    token: String,
    acquired_at: Instant,
}

impl Lease {
    pub fn key(&self) -> &str {
        &self.key
    }
}

#[derive(Clone)]
pub struct OpenLock {
    store: Arc<dyn SharedStore>,
    config: LeaseConfig,
}

impl OpenLock {
    pub fn new(store: Arc<dyn SharedStore>, config: LeaseConfig) -> Self {
        Self { store, config }
    }

    /// Waits at most `max_wait` for the lease. A lease still held after that
    /// is reported as another open in progress.
    pub async fn acquire(&self, workspace_id: WorkspaceId) -> Result<Lease, TicketError> {
        let key = open_lock_key(workspace_id);
        let token = Uuid::new_v4().to_string();
        let deadline = Instant::now() + self.config.max_wait();

        loop {
            if self
                .store
                .set_if_absent(&key, &token, self.config.ttl())
                .await?
            {
                debug!("Acquired {key}");
                return Ok(Lease {
                    key,
                    token,
                    acquired_at: Instant::now(),
                });
            }

            if Instant::now() >= deadline {
                return Err(ValidationError::OpenInProgress.into());
            }

            let jitter = rand::thread_rng().gen_range(0..=self.config.retry_ms / 2);
            let pause = self.config.retry() + Duration::from_millis(jitter);
            tokio::time::sleep(pause.min(deadline.saturating_duration_since(Instant::now()))).await;
        }
    }

    /// Returns false when the lease had already expired or been taken over.
    pub async fn release(&self, lease: Lease) -> Result<bool, InfraError> {
        let released = self.store.delete_if_equals(&lease.key, &lease.token).await?;
        if !released {
            warn!(
                "Lease {} expired after {:?} before release",
                lease.key,
                lease.acquired_at.elapsed()
            );
        }
        Ok(released)
    }

    /// Runs `work` while holding the workspace lease and releases it on every
    /// exit path. A failed release is logged; the TTL reclaims the key.
    ///
    /// `work` is cut off when the TTL runs out, so nothing it does can land
    /// after another worker has taken the lease over.
    pub async fn scoped<T, F>(&self, workspace_id: WorkspaceId, work: F) -> Result<T, TicketError>
    where
        F: Future<Output = Result<T, TicketError>>,
    {
        let lease = self.acquire(workspace_id).await?;
        let result = match tokio::time::timeout(self.config.ttl(), work).await {
            Ok(result) => result,
            Err(_) => {
                warn!(
                    "Work under {} outlived the lease TTL of {:?}",
                    lease.key,
                    self.config.ttl()
                );
                Err(InfraError::Timeout(format!("holding open lease for workspace {workspace_id}")).into())
            }
        };
        if let Err(e) = self.release(lease).await {
            warn!("Failed to release open lease for workspace {workspace_id}: {e}");
        }
        result
    }
}
