//! Read-through caching with stampede protection.

use std::future::Future;
use std::time::{Duration, Instant};

use metrics::{counter, histogram};
use serde::{Serialize, de::DeserializeOwned};
use tracing::{debug, info, warn};

use super::client::CacheClient;
use super::codec;
use super::config::CacheConfig;
use super::keys::lock_key;

const SOURCE: &str = "storefront::cache::aside";
const METRIC_HIT: &str = "storefront_cache_hit_total";
const METRIC_MISS: &str = "storefront_cache_miss_total";
const METRIC_DECODE_ERROR: &str = "storefront_cache_decode_error_total";
const METRIC_LOCK_CONTENDED: &str = "storefront_cache_lock_contended_total";
const METRIC_INVALIDATED: &str = "storefront_cache_invalidated_total";
const METRIC_LOAD_MS: &str = "storefront_cache_load_ms";

/// Cache-aside orchestration shared by every entity service.
#[derive(Debug, Clone)]
pub struct CacheAside {
    client: CacheClient,
    default_ttl: Duration,
    lock_timeout: Duration,
    lock_retries: u32,
    lock_retry_delay: Duration,
}

impl CacheAside {
    pub fn new(client: CacheClient, config: &CacheConfig) -> Self {
        Self {
            client,
            default_ttl: config.default_ttl,
            lock_timeout: config.lock_timeout,
            lock_retries: config.lock_retries,
            lock_retry_delay: config.lock_retry_delay,
        }
    }

    pub fn client(&self) -> &CacheClient {
        &self.client
    }

    pub fn default_ttl(&self) -> Duration {
        self.default_ttl
    }

    /// Return the cached value for `key`, or compute, store and return it.
    ///
    /// `loader` runs at most once per call. Its error is returned unchanged and
    /// nothing is cached for it. `ttl = None` uses the default TTL.
    pub async fn get_or_compute<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        loader: F,
    ) -> Result<T, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if !self.client.is_available() {
            return loader().await;
        }
        if let Some(hit) = self.lookup(key).await {
            return Ok(hit);
        }
        counter!(METRIC_MISS).increment(1);
        debug!(target = SOURCE, key, "cache miss");

        let lock = lock_key(key);
        let mut guard = None;
        for attempt in 1..=self.lock_retries {
            if let Some(token) = self.client.try_acquire_lock(&lock, self.lock_timeout).await {
                let held = LockGuard::new(self.client.clone(), lock.clone(), token);
                // A concurrent holder may have filled the entry before we got the lock.
                if let Some(hit) = self.lookup(key).await {
                    held.release().await;
                    return Ok(hit);
                }
                guard = Some(held);
                break;
            }

            counter!(METRIC_LOCK_CONTENDED).increment(1);
            debug!(target = SOURCE, key, attempt, "recompute lock busy; waiting");
            tokio::time::sleep(self.lock_retry_delay).await;
            if let Some(hit) = self.lookup(key).await {
                return Ok(hit);
            }
        }

        let result = self.load_and_store(key, ttl, loader).await;
        if let Some(guard) = guard {
            guard.release().await;
        }
        result
    }

    /// Drop every entry under `prefix`. Never fails.
    pub async fn invalidate_prefix(&self, prefix: &str) -> u64 {
        let removed = self.client.delete_by_prefix(prefix).await;
        if removed > 0 {
            counter!(METRIC_INVALIDATED).increment(removed);
            info!(target = SOURCE, prefix, removed, "invalidated cache entries");
        }
        removed
    }

    pub async fn invalidate_key(&self, key: &str) -> bool {
        let removed = self.client.delete(key).await;
        if removed {
            counter!(METRIC_INVALIDATED).increment(1);
            debug!(target = SOURCE, key, "invalidated cache entry");
        }
        removed
    }

    async fn lookup<T: DeserializeOwned>(&self, key: &str) -> Option<T> {
        let payload = self.client.get(key).await?;
        match codec::decode(&payload) {
            Ok(value) => {
                counter!(METRIC_HIT).increment(1);
                Some(value)
            }
            Err(err) => {
                counter!(METRIC_DECODE_ERROR).increment(1);
                warn!(target = SOURCE, key, error = %err, "unreadable cache entry treated as miss");
                None
            }
        }
    }

    async fn load_and_store<T, E, F, Fut>(
        &self,
        key: &str,
        ttl: Option<Duration>,
        loader: F,
    ) -> Result<T, E>
    where
        T: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        let started = Instant::now();
        let value = loader().await?;
        histogram!(METRIC_LOAD_MS).record(started.elapsed().as_secs_f64() * 1000.0);

        match codec::encode(&value) {
            Ok(payload) => {
                self.client
                    .set(key, &payload, ttl.unwrap_or(self.default_ttl))
                    .await;
            }
            Err(err) => {
                warn!(target = SOURCE, key, error = %err, "value not cacheable");
            }
        }
        Ok(value)
    }
}

/// Holds a recompute lock; releases it on drop if not released explicitly.
struct LockGuard {
    client: CacheClient,
    key: String,
    token: String,
    armed: bool,
}

impl LockGuard {
    fn new(client: CacheClient, key: String, token: String) -> Self {
        Self {
            client,
            key,
            token,
            armed: true,
        }
    }

    async fn release(mut self) {
        self.armed = false;
        self.client.release_lock(&self.key, &self.token).await;
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        // Cancelled or panicked holder: release on the runtime, lock expiry covers the rest.
        if let Ok(handle) = tokio::runtime::Handle::try_current() {
            let client = self.client.clone();
            let key = std::mem::take(&mut self.key);
            let token = std::mem::take(&mut self.token);
            handle.spawn(async move {
                client.release_lock(&key, &token).await;
            });
        }
    }
}
