//! Cross-process coordination primitives.
//!
//! The shared store holds the only mutable state shared between workers:
//! rate-limit counters, the open-ticket lease and short-lived markers. Every
//! primitive is a single atomic operation on the store side; nothing here
//! reads a value and writes it back in two round trips.

use async_trait::async_trait;
use std::time::Duration;

use crate::shared::error::InfraError;
use crate::shared::models::{ChannelId, UserId, WorkspaceId};

pub mod memory;
#[cfg(feature = "cache")]
pub mod redis_store;

pub use memory::MemoryStore;
#[cfg(feature = "cache")]
pub use redis_store::RedisStore;

#[async_trait]
pub trait SharedStore: Send + Sync {
    /// Increments the counter at `key` unless it already reached `burst`.
    /// The first increment of a window sets the expiry. Returns whether a
    /// token was taken.
    async fn try_consume(&self, key: &str, burst: u64, window: Duration)
        -> Result<bool, InfraError>;

    /// `SET key value NX PX ttl`. Returns whether the key was written.
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration)
        -> Result<bool, InfraError>;

    /// Deletes `key` only while it still holds `value`.
    async fn delete_if_equals(&self, key: &str, value: &str) -> Result<bool, InfraError>;

    async fn flag(&self, key: &str, ttl: Duration) -> Result<(), InfraError>;

    async fn is_flagged(&self, key: &str) -> Result<bool, InfraError>;
}

pub fn open_tokens_key(workspace_id: WorkspaceId) -> String {
    format!("open-ticket-tokens:{workspace_id}")
}

pub fn open_lock_key(workspace_id: WorkspaceId) -> String {
    format!("open-ticket-lock:{workspace_id}")
}

pub fn rename_tokens_key(channel_id: ChannelId) -> String {
    format!("rename-tokens:{channel_id}")
}

pub fn dm_unreachable_key(user_id: UserId) -> String {
    format!("dm-unreachable:{user_id}")
}
