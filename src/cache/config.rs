//! Cache configuration.
//!
//! Resolved once at startup from the `[cache]` section of `storefront.toml`.

use std::{str::FromStr, time::Duration};

use serde::Deserialize;
use url::Url;

const DEFAULT_TTL_SECS: u64 = 300;
const DEFAULT_LOCK_TIMEOUT_SECS: u64 = 10;
const DEFAULT_LOCK_RETRIES: u32 = 3;
const DEFAULT_LOCK_RETRY_DELAY_MS: u64 = 100;
const DEFAULT_OPERATION_TIMEOUT_MS: u64 = 2000;

/// Which substrate backs the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Backend {
    Memory,
    Redis,
    Rest,
}

impl Backend {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Memory => "memory",
            Self::Redis => "redis",
            Self::Rest => "rest",
        }
    }
}

impl FromStr for Backend {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "memory" => Ok(Self::Memory),
            "redis" => Ok(Self::Redis),
            "rest" => Ok(Self::Rest),
            other => Err(format!("unknown cache backend `{other}`")),
        }
    }
}

/// How `delete_by_prefix` finds the keys to remove.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PrefixDeletion {
    /// One `KEYS pattern` call.
    Keys,
    /// Cursor walk with `SCAN MATCH`.
    Scan,
    /// Client-maintained key index per scope.
    Index,
}

impl FromStr for PrefixDeletion {
    type Err = String;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "keys" => Ok(Self::Keys),
            "scan" => Ok(Self::Scan),
            "index" => Ok(Self::Index),
            other => Err(format!("unknown prefix deletion strategy `{other}`")),
        }
    }
}

/// Substrate features the client may rely on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Capabilities {
    pub native_ttl: bool,
    pub prefix_deletion: PrefixDeletion,
    pub atomic_locks: bool,
}

impl Capabilities {
    pub fn defaults_for(backend: Backend) -> Self {
        match backend {
            Backend::Memory | Backend::Redis => Self {
                native_ttl: true,
                prefix_deletion: PrefixDeletion::Scan,
                atomic_locks: true,
            },
            Backend::Rest => Self {
                native_ttl: false,
                prefix_deletion: PrefixDeletion::Index,
                atomic_locks: false,
            },
        }
    }

    /// Atomic `SET NX EX` needs native expiry to be safe.
    pub fn uses_atomic_locks(&self) -> bool {
        self.atomic_locks && self.native_ttl
    }
}

/// Runtime cache configuration.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    pub enabled: bool,
    pub backend: Backend,
    pub url: Option<Url>,
    pub token: Option<String>,
    pub default_ttl: Duration,
    pub lock_timeout: Duration,
    pub lock_retries: u32,
    pub lock_retry_delay: Duration,
    pub operation_timeout: Duration,
    pub capabilities: Capabilities,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            backend: Backend::Redis,
            url: None,
            token: None,
            default_ttl: Duration::from_secs(DEFAULT_TTL_SECS),
            lock_timeout: Duration::from_secs(DEFAULT_LOCK_TIMEOUT_SECS),
            lock_retries: DEFAULT_LOCK_RETRIES,
            lock_retry_delay: Duration::from_millis(DEFAULT_LOCK_RETRY_DELAY_MS),
            operation_timeout: Duration::from_millis(DEFAULT_OPERATION_TIMEOUT_MS),
            capabilities: Capabilities::defaults_for(Backend::Redis),
        }
    }
}

impl From<&crate::config::CacheSettings> for CacheConfig {
    fn from(settings: &crate::config::CacheSettings) -> Self {
        let defaults = Capabilities::defaults_for(settings.backend);
        Self {
            enabled: settings.enabled,
            backend: settings.backend,
            url: settings.url.clone(),
            token: settings.token.clone(),
            default_ttl: Duration::from_secs(settings.default_ttl_seconds.get()),
            lock_timeout: Duration::from_secs(settings.lock_timeout_seconds.get()),
            lock_retries: settings.lock_retries.get(),
            lock_retry_delay: Duration::from_millis(settings.lock_retry_delay_ms),
            operation_timeout: Duration::from_millis(settings.operation_timeout_ms.get()),
            capabilities: Capabilities {
                native_ttl: settings.native_ttl.unwrap_or(defaults.native_ttl),
                prefix_deletion: settings
                    .prefix_deletion
                    .unwrap_or(defaults.prefix_deletion),
                atomic_locks: settings.atomic_locks.unwrap_or(defaults.atomic_locks),
            },
        }
    }
}

impl CacheConfig {
    /// In-process cache with the given tuning, mostly for tests.
    pub fn memory() -> Self {
        Self {
            backend: Backend::Memory,
            capabilities: Capabilities::defaults_for(Backend::Memory),
            ..Self::default()
        }
    }

    /// Whether a substrate can be built at all.
    pub fn is_enabled(&self) -> bool {
        self.enabled && (self.backend == Backend::Memory || self.url.is_some())
    }
}
