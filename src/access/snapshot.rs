//! Read-only snapshots refreshed in the background and swapped whole.
//!
//! Readers take an `Arc` to the current snapshot and keep using it even if a
//! refresh lands meanwhile. Nothing mutates a published snapshot.

use async_trait::async_trait;
use log::{debug, warn};
use std::collections::HashSet;
use std::future::Future;
use std::sync::{Arc, RwLock};
use std::time::Duration;
use tokio::task::JoinHandle;

use crate::shared::error::InfraError;
use crate::shared::models::{UserId, WorkspaceId};

pub struct SnapshotCache<T> {
    current: RwLock<Arc<T>>,
}

impl<T> std::fmt::Debug for SnapshotCache<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SnapshotCache").finish_non_exhaustive()
    }
}

impl<T: Send + Sync + 'static> SnapshotCache<T> {
    pub fn new(initial: T) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
        }
    }

    pub fn current(&self) -> Arc<T> {
        match self.current.read() {
            Ok(guard) => Arc::clone(&guard),
            Err(poisoned) => Arc::clone(&poisoned.into_inner()),
        }
    }

    pub fn replace(&self, next: T) {
        let next = Arc::new(next);
        match self.current.write() {
            Ok(mut guard) => *guard = next,
            Err(poisoned) => *poisoned.into_inner() = next,
        }
    }

    /// Reloads the snapshot every `interval`. A failed load keeps serving the
    /// previous snapshot.
    pub fn spawn_refresher<F, Fut>(self: &Arc<Self>, interval: Duration, load: F) -> JoinHandle<()>
    where
        F: Fn() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, InfraError>> + Send,
    {
        let cache = Arc::clone(self);
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                match load().await {
                    Ok(next) => {
                        cache.replace(next);
                        debug!("Snapshot refreshed");
                    }
                    Err(e) => warn!("Snapshot refresh failed, keeping previous: {e}"),
                }
            }
        })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Blacklist {
    pub workspaces: HashSet<WorkspaceId>,
    pub global_users: HashSet<UserId>,
    pub workspace_users: HashSet<(WorkspaceId, UserId)>,
}

impl Blacklist {
    pub fn is_blocked(&self, workspace_id: WorkspaceId, user_id: UserId) -> bool {
        self.workspaces.contains(&workspace_id)
            || self.global_users.contains(&user_id)
            || self.workspace_users.contains(&(workspace_id, user_id))
    }
}

#[async_trait]
pub trait BlacklistSource: Send + Sync {
    async fn load_blacklist(&self) -> Result<Blacklist, InfraError>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn test_readers_keep_old_snapshot_after_replace() {
        let cache = SnapshotCache::new(vec![1]);
        let before = cache.current();
        cache.replace(vec![1, 2]);

        assert_eq!(*before, vec![1]);
        assert_eq!(*cache.current(), vec![1, 2]);
    }

    #[test]
    fn test_blacklist_scopes() {
        let mut bl = Blacklist::default();
        bl.workspace_users.insert((1, 50));
        bl.global_users.insert(60);
        bl.workspaces.insert(2);

        assert!(bl.is_blocked(1, 50));
        assert!(!bl.is_blocked(3, 50));
        assert!(bl.is_blocked(3, 60));
        assert!(bl.is_blocked(2, 1));
    }

    #[tokio::test]
    async fn test_refresher_swaps_and_survives_failures() {
        let cache = Arc::new(SnapshotCache::new(0usize));
        let calls = Arc::new(AtomicUsize::new(0));

        let counter = Arc::clone(&calls);
        let handle = cache.spawn_refresher(Duration::from_millis(5), move || {
            let counter = Arc::clone(&counter);
            async move {
                let n = counter.fetch_add(1, Ordering::SeqCst);
                if n % 2 == 1 {
                    Err(InfraError::Database("flaky".to_string()))
                } else {
                    Ok(n + 1)
                }
            }
        });

        tokio::time::sleep(Duration::from_millis(60)).await;
        handle.abort();

        assert!(calls.load(Ordering::SeqCst) >= 3);
        assert!(*cache.current() >= 1);
    }
}
