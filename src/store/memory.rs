use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Mutex;
use std::time::{Duration, Instant};

use super::SharedStore;
use crate::shared::error::InfraError;

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Instant,
}

/// Single-process store. Every primitive runs under one mutex, which gives
/// the same atomicity the Redis scripts give across processes.
#[derive(Debug, Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn with_entries<T>(
        &self,
        f: impl FnOnce(&mut HashMap<String, Entry>) -> T,
    ) -> Result<T, InfraError> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| InfraError::Store("memory store mutex poisoned".to_string()))?;
        let now = Instant::now();
        entries.retain(|_, e| e.expires_at > now);
        Ok(f(&mut entries))
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn try_consume(
        &self,
        key: &str,
        burst: u64,
        window: Duration,
    ) -> Result<bool, InfraError> {
        self.with_entries(|entries| {
            let current = entries
                .get(key)
                .and_then(|e| e.value.parse::<u64>().ok())
                .unwrap_or(0);
            if current >= burst {
                return false;
            }

            match entries.get_mut(key) {
                Some(entry) => entry.value = (current + 1).to_string(),
                None => {
                    entries.insert(
                        key.to_string(),
                        Entry {
                            value: "1".to_string(),
                            expires_at: Instant::now() + window,
                        },
                    );
                }
            }
            true
        })
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, InfraError> {
        self.with_entries(|entries| {
            if entries.contains_key(key) {
                return false;
            }
            entries.insert(
                key.to_string(),
                Entry {
                    value: value.to_string(),
                    expires_at: Instant::now() + ttl,
                },
            );
            true
        })
    }

    async fn delete_if_equals(&self, key: &str, value: &str) -> Result<bool, InfraError> {
        self.with_entries(|entries| match entries.get(key) {
            Some(e) if e.value == value => {
                entries.remove(key);
                true
            }
            _ => false,
        })
    }

    async fn flag(&self, key: &str, ttl: Duration) -> Result<(), InfraError> {
        self.with_entries(|entries| {
            entries.insert(
                key.to_string(),
                Entry {
                    value: "1".to_string(),
                    expires_at: Instant::now() + ttl,
                },
            );
        })
    }

    async fn is_flagged(&self, key: &str) -> Result<bool, InfraError> {
        self.with_entries(|entries| entries.contains_key(key))
    }
}
