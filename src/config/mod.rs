use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

pub const ENV_PREFIX: &str = "TICKETCORE_";

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct EngineConfig {
    pub redis_url: String,
    pub workers: usize,
    pub queue_depth: usize,
    pub limits: LimitsConfig,
    pub lease: LeaseConfig,
    pub capacity: CapacityConfig,
    pub timeouts: TimeoutConfig,
    pub close: CloseConfig,
    pub tenant: TenantConfig,
    /// How long an unreachable DM is remembered, in seconds.
    pub dm_failure_ttl_secs: u64,
    /// Blacklist snapshot refresh interval, in seconds.
    pub blacklist_refresh_secs: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LimitsConfig {
    pub open_burst: u64,
    pub open_window_secs: u64,
    pub rename_burst: u64,
    pub rename_window_secs: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LeaseConfig {
    pub ttl_ms: u64,
    pub max_wait_ms: u64,
    pub retry_ms: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CapacityConfig {
    pub per_category: usize,
    pub per_workspace: usize,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TimeoutConfig {
    pub interactive_ms: u64,
    pub background_ms: u64,
    pub placeholder_ms: u64,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct CloseConfig {
    pub transcript_page_size: usize,
    pub thread_archive_delay_ms: u64,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct TenantConfig {
    pub default_token: String,
    pub default_bot_id: u64,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1/".to_string(),
            workers: 8,
            queue_depth: 1024,
            limits: LimitsConfig::default(),
            lease: LeaseConfig::default(),
            capacity: CapacityConfig::default(),
            timeouts: TimeoutConfig::default(),
            close: CloseConfig::default(),
            tenant: TenantConfig::default(),
            dm_failure_ttl_secs: 6 * 60 * 60,
            blacklist_refresh_secs: 60,
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            open_burst: 10,
            open_window_secs: 60,
            // Platform allows two renames per channel every ten minutes.
            rename_burst: 2,
            rename_window_secs: 600,
        }
    }
}

impl Default for LeaseConfig {
    fn default() -> Self {
        Self {
            ttl_ms: 5_000,
            max_wait_ms: 2_000,
            retry_ms: 50,
        }
    }
}

impl Default for CapacityConfig {
    fn default() -> Self {
        Self {
            per_category: 50,
            per_workspace: 500,
        }
    }
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            interactive_ms: 3_000,
            background_ms: 30_000,
            placeholder_ms: 2_000,
        }
    }
}

impl Default for CloseConfig {
    fn default() -> Self {
        Self {
            transcript_page_size: 100,
            thread_archive_delay_ms: 500,
        }
    }
}

impl LimitsConfig {
    pub fn open_window(&self) -> Duration {
        Duration::from_secs(self.open_window_secs)
    }

    pub fn rename_window(&self) -> Duration {
        Duration::from_secs(self.rename_window_secs)
    }
}

impl LeaseConfig {
    pub fn ttl(&self) -> Duration {
        Duration::from_millis(self.ttl_ms)
    }

    pub fn max_wait(&self) -> Duration {
        Duration::from_millis(self.max_wait_ms)
    }

    pub fn retry(&self) -> Duration {
        Duration::from_millis(self.retry_ms)
    }
}

impl TimeoutConfig {
    pub fn interactive(&self) -> Duration {
        Duration::from_millis(self.interactive_ms)
    }

    pub fn background(&self) -> Duration {
        Duration::from_millis(self.background_ms)
    }

    pub fn placeholder(&self) -> Duration {
        Duration::from_millis(self.placeholder_ms)
    }
}

impl CloseConfig {
    pub fn thread_archive_delay(&self) -> Duration {
        Duration::from_millis(self.thread_archive_delay_ms)
    }
}

impl EngineConfig {
    pub fn dm_failure_ttl(&self) -> Duration {
        Duration::from_secs(self.dm_failure_ttl_secs)
    }

    pub fn blacklist_refresh(&self) -> Duration {
        Duration::from_secs(self.blacklist_refresh_secs)
    }

    /// Defaults, then the optional TOML file, then `TICKETCORE_*` variables
    /// (`__` separates nested keys, e.g. `TICKETCORE_LIMITS__OPEN_BURST`).
    pub fn load(path: Option<&Path>) -> Result<Self, figment::Error> {
        let mut figment = Figment::from(Serialized::defaults(EngineConfig::default()));
        if let Some(path) = path {
            figment = figment.merge(Toml::file(path));
        }
        figment.merge(Env::prefixed(ENV_PREFIX).split("__")).extract()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_round_trip_through_figment() {
        let config = EngineConfig::load(None).unwrap();
        assert_eq!(config.capacity.per_category, 50);
        assert_eq!(config.limits.rename_burst, 2);
        assert_eq!(config.close.transcript_page_size, 100);
    }

    #[test]
    fn test_toml_file_overrides_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "workers = 2\n\n[limits]\nopen_burst = 3\n\n[tenant]\ndefault_bot_id = 42"
        )
        .unwrap();

        let config = EngineConfig::load(Some(file.path())).unwrap();
        assert_eq!(config.workers, 2);
        assert_eq!(config.limits.open_burst, 3);
        assert_eq!(config.limits.open_window_secs, 60);
        assert_eq!(config.tenant.default_bot_id, 42);
    }
}
