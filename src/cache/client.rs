//! Capability-aware cache client.
//!
//! Every operation is non-fatal: substrate failures and timeouts are logged,
//! counted and reported as a miss (`None`, `false`, `0`).

use std::collections::BTreeSet;
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant};

use metrics::counter;
use time::OffsetDateTime;
use tokio::sync::Mutex;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::config::{Backend, CacheConfig, Capabilities, PrefixDeletion};
use super::envelope::{Envelope, Opened};
use super::keys::{index_key, is_internal, prefix_pattern, scope_of};
use super::substrate::{
    MemorySubstrate, RedisSubstrate, RestSubstrate, Substrate, SubstrateError,
};

const SOURCE: &str = "storefront::cache::client";
const METRIC_SUBSTRATE_ERROR: &str = "storefront_cache_substrate_error_total";
const SCAN_PAGE_SIZE: usize = 200;
const DELETE_BATCH_SIZE: usize = 500;

/// Shared handle to the cache substrate. Cloning is cheap.
#[derive(Clone)]
pub struct CacheClient {
    inner: Arc<Inner>,
}

struct Inner {
    substrate: Option<Arc<dyn Substrate>>,
    capabilities: Capabilities,
    available: AtomicBool,
    operation_timeout: Duration,
    // Serializes read-modify-write of index entries within this process.
    index_guard: Mutex<()>,
}

impl std::fmt::Debug for CacheClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheClient")
            .field("backend", &self.backend_name())
            .field("capabilities", &self.inner.capabilities)
            .field("available", &self.is_available())
            .finish()
    }
}

impl CacheClient {
    /// A client that never touches a substrate.
    pub fn disabled() -> Self {
        Self {
            inner: Arc::new(Inner {
                substrate: None,
                capabilities: Capabilities::defaults_for(Backend::Memory),
                available: AtomicBool::new(false),
                operation_timeout: Duration::ZERO,
                index_guard: Mutex::new(()),
            }),
        }
    }

    /// Wrap a substrate and probe it once.
    pub async fn connect(
        substrate: Arc<dyn Substrate>,
        capabilities: Capabilities,
        operation_timeout: Duration,
    ) -> Self {
        let client = Self {
            inner: Arc::new(Inner {
                substrate: Some(substrate),
                capabilities,
                available: AtomicBool::new(false),
                operation_timeout,
                index_guard: Mutex::new(()),
            }),
        };
        let available = client.refresh_availability().await;
        info!(
            target = SOURCE,
            backend = client.backend_name(),
            available,
            native_ttl = capabilities.native_ttl,
            prefix_deletion = ?capabilities.prefix_deletion,
            atomic_locks = capabilities.uses_atomic_locks(),
            "cache client ready"
        );
        client
    }

    /// Build the configured substrate. Any setup failure yields a disabled client.
    pub async fn from_config(config: &CacheConfig) -> Self {
        if !config.is_enabled() {
            info!(
                target = SOURCE,
                backend = config.backend.as_str(),
                enabled = config.enabled,
                "cache disabled; serving straight from the store"
            );
            return Self::disabled();
        }

        let substrate: Result<Arc<dyn Substrate>, SubstrateError> = match config.backend {
            Backend::Memory => Ok(Arc::new(MemorySubstrate::new())),
            Backend::Redis => match &config.url {
                Some(url) => {
                    match tokio::time::timeout(
                        config.operation_timeout,
                        RedisSubstrate::connect(url.as_str()),
                    )
                    .await
                    {
                        Ok(result) => result.map(|substrate| Arc::new(substrate) as Arc<dyn Substrate>),
                        Err(_) => Err(SubstrateError::Timeout),
                    }
                }
                None => Err(SubstrateError::Unsupported("connect")),
            },
            Backend::Rest => match &config.url {
                Some(url) => RestSubstrate::new(url.clone(), config.token.as_deref().unwrap_or(""))
                    .map(|substrate| Arc::new(substrate) as Arc<dyn Substrate>),
                None => Err(SubstrateError::Unsupported("connect")),
            },
        };

        match substrate {
            Ok(substrate) => {
                Self::connect(substrate, config.capabilities, config.operation_timeout).await
            }
            Err(err) => {
                error!(
                    target = SOURCE,
                    backend = config.backend.as_str(),
                    error = %err,
                    "cache backend setup failed; continuing without cache"
                );
                Self::disabled()
            }
        }
    }

    pub fn backend_name(&self) -> &'static str {
        self.inner
            .substrate
            .as_ref()
            .map_or("disabled", |substrate| substrate.name())
    }

    pub fn capabilities(&self) -> Capabilities {
        self.inner.capabilities
    }

    pub fn is_available(&self) -> bool {
        self.inner.available.load(Ordering::Acquire)
    }

    /// Re-probe the substrate and record the outcome.
    pub async fn refresh_availability(&self) -> bool {
        let Some(substrate) = self.inner.substrate.as_ref() else {
            return false;
        };
        let alive = self.call("ping", "", substrate.ping()).await.is_some();
        let was = self.inner.available.swap(alive, Ordering::AcqRel);
        if was && !alive {
            warn!(target = SOURCE, backend = substrate.name(), "cache became unavailable");
        } else if !was && alive {
            info!(target = SOURCE, backend = substrate.name(), "cache is available");
        }
        alive
    }

    /// Best-effort liveness probe. Returns false without I/O when unavailable.
    pub async fn ping(&self) -> bool {
        match self.live() {
            Some(substrate) => self.call("ping", "", substrate.ping()).await.is_some(),
            None => false,
        }
    }

    /// Time a single ping, for health reporting.
    pub async fn ping_latency(&self) -> Option<Duration> {
        let started = Instant::now();
        self.ping().await.then(|| started.elapsed())
    }

    pub async fn get(&self, key: &str) -> Option<String> {
        let substrate = self.live()?;
        let raw = self.call("get", key, substrate.get(key)).await??;
        if self.inner.capabilities.native_ttl {
            return Some(raw);
        }

        match Envelope::open(&raw, OffsetDateTime::now_utc()) {
            Opened::Live(value) => Some(value),
            Opened::Expired => {
                self.call("del", key, substrate.del(&[key.to_string()]))
                    .await;
                None
            }
            Opened::Malformed => {
                warn!(target = SOURCE, op = "get", key, "malformed expiry envelope");
                None
            }
        }
    }

    /// Store `value` under `key` for `ttl`. Returns whether the write landed.
    pub async fn set(&self, key: &str, value: &str, ttl: Duration) -> bool {
        let Some(substrate) = self.live() else {
            return false;
        };
        let written = if self.inner.capabilities.native_ttl {
            self.call("set", key, substrate.set_ex(key, value, ttl_secs(ttl)))
                .await
        } else {
            let sealed = Envelope::wrap(value, ttl, OffsetDateTime::now_utc()).seal();
            self.call("set", key, substrate.set(key, &sealed)).await
        };
        if written.is_none() {
            return false;
        }

        if self.inner.capabilities.prefix_deletion == PrefixDeletion::Index && !is_internal(key) {
            self.remember(substrate, key).await;
        }
        true
    }

    /// Remove one key. Returns whether it existed.
    pub async fn delete(&self, key: &str) -> bool {
        let Some(substrate) = self.live() else {
            return false;
        };
        self.call("del", key, substrate.del(&[key.to_string()]))
            .await
            .is_some_and(|removed| removed > 0)
    }

    /// Remove every key starting with `prefix`. Returns how many were removed.
    ///
    /// With the index strategy the prefix must cover the first key segment.
    pub async fn delete_by_prefix(&self, prefix: &str) -> u64 {
        let Some(substrate) = self.live() else {
            return 0;
        };
        match self.inner.capabilities.prefix_deletion {
            PrefixDeletion::Keys => self.delete_matching_keys(substrate, prefix).await,
            PrefixDeletion::Scan => self.delete_scanned(substrate, prefix).await,
            PrefixDeletion::Index => self.delete_indexed(substrate, prefix).await,
        }
    }

    /// Try to take `lock_key` for `timeout`. Returns the holder token on success.
    ///
    /// Without atomic support this is read-then-write and may rarely admit two holders.
    pub async fn try_acquire_lock(&self, lock_key: &str, timeout: Duration) -> Option<String> {
        let substrate = self.live()?;
        let token = Uuid::new_v4().to_string();
        if self.inner.capabilities.uses_atomic_locks() {
            let acquired = self
                .call(
                    "lock",
                    lock_key,
                    substrate.set_nx_ex(lock_key, &token, ttl_secs(timeout)),
                )
                .await
                .unwrap_or(false);
            return acquired.then_some(token);
        }

        if self.get(lock_key).await.is_some() {
            return None;
        }
        self.set(lock_key, &token, timeout).await.then_some(token)
    }

    /// Release `lock_key` if `token` still holds it.
    ///
    /// A lock that expired and was taken by someone else is left alone. The
    /// check and the delete are separate commands.
    pub async fn release_lock(&self, lock_key: &str, token: &str) -> bool {
        match self.get(lock_key).await {
            Some(holder) if holder == token => self.delete(lock_key).await,
            Some(_) => {
                warn!(
                    target = SOURCE,
                    op = "unlock",
                    key = lock_key,
                    "lock expired and passed to another holder; not releasing"
                );
                false
            }
            None => false,
        }
    }

    /// Stop using the substrate. Later calls behave as if the cache were down.
    pub async fn shutdown(&self) {
        if self.inner.available.swap(false, Ordering::AcqRel) {
            info!(target = SOURCE, backend = self.backend_name(), "cache client shut down");
        }
    }

    fn live(&self) -> Option<&Arc<dyn Substrate>> {
        if !self.is_available() {
            return None;
        }
        self.inner.substrate.as_ref()
    }

    async fn call<T>(
        &self,
        op: &'static str,
        key: &str,
        fut: impl Future<Output = Result<T, SubstrateError>>,
    ) -> Option<T> {
        let outcome = match tokio::time::timeout(self.inner.operation_timeout, fut).await {
            Ok(outcome) => outcome,
            Err(_) => Err(SubstrateError::Timeout),
        };
        match outcome {
            Ok(value) => Some(value),
            Err(err) => {
                counter!(METRIC_SUBSTRATE_ERROR, "op" => op).increment(1);
                error!(
                    target = SOURCE,
                    op,
                    key,
                    backend = self.backend_name(),
                    error = %err,
                    "cache operation failed"
                );
                None
            }
        }
    }

    async fn delete_batched(&self, substrate: &Arc<dyn Substrate>, keys: &[String]) -> u64 {
        self.delete_batches(substrate, keys).await.0
    }

    /// Removed count, plus the keys of every batch whose `DEL` failed.
    async fn delete_batches(
        &self,
        substrate: &Arc<dyn Substrate>,
        keys: &[String],
    ) -> (u64, Vec<String>) {
        let mut removed = 0;
        let mut failed = Vec::new();
        for batch in keys.chunks(DELETE_BATCH_SIZE) {
            let first = batch.first().map(String::as_str).unwrap_or_default();
            match self.call("del", first, substrate.del(batch)).await {
                Some(count) => removed += count,
                None => failed.extend_from_slice(batch),
            }
        }
        (removed, failed)
    }

    async fn delete_matching_keys(&self, substrate: &Arc<dyn Substrate>, prefix: &str) -> u64 {
        let pattern = prefix_pattern(prefix);
        let Some(keys) = self.call("keys", prefix, substrate.keys(&pattern)).await else {
            return 0;
        };
        self.delete_batched(substrate, &keys).await
    }

    async fn delete_scanned(&self, substrate: &Arc<dyn Substrate>, prefix: &str) -> u64 {
        let pattern = prefix_pattern(prefix);
        let mut cursor = 0;
        let mut removed = 0;
        loop {
            let Some((next, keys)) = self
                .call("scan", prefix, substrate.scan(cursor, &pattern, SCAN_PAGE_SIZE))
                .await
            else {
                break;
            };
            removed += self.delete_batched(substrate, &keys).await;
            if next == 0 {
                break;
            }
            cursor = next;
        }
        removed
    }

    async fn delete_indexed(&self, substrate: &Arc<dyn Substrate>, prefix: &str) -> u64 {
        let index = index_key(scope_of(prefix));
        let _guard = self.inner.index_guard.lock().await;

        let Some(known) = self.read_index(substrate, &index).await else {
            return 0;
        };
        let (doomed, mut survivors): (Vec<String>, Vec<String>) =
            known.into_iter().partition(|key| key.starts_with(prefix));
        if doomed.is_empty() {
            return 0;
        }

        let (removed, failed) = self.delete_batches(substrate, &doomed).await;
        // Undeleted keys stay indexed so the next invalidation retries them.
        survivors.extend(failed);
        if survivors.is_empty() {
            self.call("del", &index, substrate.del(&[index.clone()]))
                .await;
        } else {
            self.write_index(substrate, &index, survivors.into_iter().collect())
                .await;
        }
        removed
    }

    async fn remember(&self, substrate: &Arc<dyn Substrate>, key: &str) {
        let index = index_key(scope_of(key));
        let _guard = self.inner.index_guard.lock().await;
        let Some(mut known) = self.read_index(substrate, &index).await else {
            return;
        };
        if known.insert(key.to_string()) {
            self.write_index(substrate, &index, known).await;
        }
    }

    /// `None` when the substrate failed; an unreadable entry counts as empty.
    async fn read_index(
        &self,
        substrate: &Arc<dyn Substrate>,
        index: &str,
    ) -> Option<BTreeSet<String>> {
        let raw = self.call("get", index, substrate.get(index)).await?;
        let Some(raw) = raw else {
            return Some(BTreeSet::new());
        };
        match serde_json::from_str::<BTreeSet<String>>(&raw) {
            Ok(keys) => Some(keys),
            Err(err) => {
                warn!(target = SOURCE, key = index, error = %err, "discarding unreadable key index");
                Some(BTreeSet::new())
            }
        }
    }

    async fn write_index(&self, substrate: &Arc<dyn Substrate>, index: &str, keys: BTreeSet<String>) {
        let Ok(raw) = serde_json::to_string(&keys) else {
            return;
        };
        self.call("set", index, substrate.set(index, &raw)).await;
    }
}

/// Whole seconds for a substrate expiry, rounded up and never zero.
fn ttl_secs(ttl: Duration) -> u64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    secs.max(1)
}
