use std::time::{Duration, Instant};

use async_trait::async_trait;
use dashmap::{DashMap, mapref::entry::Entry};

use super::{Substrate, SubstrateError, glob_match};

#[derive(Debug, Clone)]
struct Slot {
    value: String,
    expires_at: Option<Instant>,
}

impl Slot {
    fn is_live(&self, now: Instant) -> bool {
        self.expires_at.is_none_or(|at| now < at)
    }
}

/// In-process substrate for single-node deployments and tests.
#[derive(Debug, Default)]
pub struct MemorySubstrate {
    slots: DashMap<String, Slot>,
}

impl MemorySubstrate {
    pub fn new() -> Self {
        Self::default()
    }

    /// Live keys currently held, internal bookkeeping included.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.slots.iter().filter(|slot| slot.is_live(now)).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn insert(&self, key: &str, value: &str, ttl: Option<Duration>) {
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        self.slots.insert(
            key.to_string(),
            Slot {
                value: value.to_string(),
                expires_at,
            },
        );
    }

    fn matching(&self, pattern: &str) -> Vec<String> {
        let now = Instant::now();
        self.slots.retain(|_, slot| slot.is_live(now));
        let mut keys: Vec<String> = self
            .slots
            .iter()
            .filter(|slot| glob_match(pattern, slot.key()))
            .map(|slot| slot.key().clone())
            .collect();
        keys.sort();
        keys
    }
}

#[async_trait]
impl Substrate for MemorySubstrate {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, SubstrateError> {
        let now = Instant::now();
        match self.slots.get(key) {
            Some(slot) if slot.is_live(now) => return Ok(Some(slot.value.clone())),
            Some(_) => {}
            None => return Ok(None),
        }
        // The read guard is released above; removing while holding it would deadlock the shard.
        self.slots.remove_if(key, |_, slot| !slot.is_live(now));
        Ok(None)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), SubstrateError> {
        self.insert(key, value, None);
        Ok(())
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), SubstrateError> {
        self.insert(key, value, Some(Duration::from_secs(ttl_secs)));
        Ok(())
    }

    async fn set_nx_ex(
        &self,
        key: &str,
        value: &str,
        ttl_secs: u64,
    ) -> Result<bool, SubstrateError> {
        let now = Instant::now();
        let slot = Slot {
            value: value.to_string(),
            expires_at: Some(now + Duration::from_secs(ttl_secs)),
        };
        match self.slots.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_live(now) {
                    return Ok(false);
                }
                occupied.insert(slot);
                Ok(true)
            }
            Entry::Vacant(vacant) => {
                vacant.insert(slot);
                Ok(true)
            }
        }
    }

    async fn del(&self, keys: &[String]) -> Result<u64, SubstrateError> {
        let now = Instant::now();
        let removed = keys
            .iter()
            .filter_map(|key| self.slots.remove(key))
            .filter(|(_, slot)| slot.is_live(now))
            .count();
        Ok(removed as u64)
    }

    async fn scan(
        &self,
        _cursor: u64,
        pattern: &str,
        _count: usize,
    ) -> Result<(u64, Vec<String>), SubstrateError> {
        // COUNT is only a hint; a local map answers the whole walk in one page.
        Ok((0, self.matching(pattern)))
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, SubstrateError> {
        Ok(self.matching(pattern))
    }

    async fn ping(&self) -> Result<(), SubstrateError> {
        Ok(())
    }
}
