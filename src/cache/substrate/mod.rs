//! Raw key-value primitives offered by a cache backend.
//!
//! A substrate only speaks the commands it is given; deciding which of them are
//! safe to rely on is the job of [`crate::cache::Capabilities`].

mod memory;
mod redis_tcp;
mod rest;

use async_trait::async_trait;
use thiserror::Error;

pub use memory::MemorySubstrate;
pub use redis_tcp::RedisSubstrate;
pub use rest::RestSubstrate;

#[derive(Debug, Error)]
pub enum SubstrateError {
    #[error("cache transport failed: {0}")]
    Transport(String),
    #[error("cache protocol error: {0}")]
    Protocol(String),
    #[error("cache command `{0}` is not supported by this backend")]
    Unsupported(&'static str),
    #[error("cache operation timed out")]
    Timeout,
}

/// Primitive command surface of a Redis-compatible store.
#[async_trait]
pub trait Substrate: Send + Sync {
    /// Short backend name for logs and health output.
    fn name(&self) -> &'static str;

    async fn get(&self, key: &str) -> Result<Option<String>, SubstrateError>;

    async fn set(&self, key: &str, value: &str) -> Result<(), SubstrateError>;

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), SubstrateError>;

    /// `SET key value NX EX ttl`. Returns whether the key was written.
    async fn set_nx_ex(&self, key: &str, value: &str, ttl_secs: u64)
    -> Result<bool, SubstrateError>;

    /// Delete keys, returning how many existed.
    async fn del(&self, keys: &[String]) -> Result<u64, SubstrateError>;

    /// One page of a cursor walk. A returned cursor of 0 ends the walk.
    async fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> Result<(u64, Vec<String>), SubstrateError>;

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, SubstrateError>;

    async fn ping(&self) -> Result<(), SubstrateError>;
}

/// Redis glob matching for `KEYS` and `SCAN MATCH`, used by in-process backends.
pub(crate) fn glob_match(pattern: &str, key: &str) -> bool {
    let pattern: Vec<char> = pattern.chars().collect();
    let key: Vec<char> = key.chars().collect();
    glob_match_from(&pattern, &key)
}

fn glob_match_from(pattern: &[char], key: &[char]) -> bool {
    match pattern.split_first() {
        None => key.is_empty(),
        Some(('*', rest)) => (0..=key.len()).any(|skip| glob_match_from(rest, &key[skip..])),
        Some(('?', rest)) => !key.is_empty() && glob_match_from(rest, &key[1..]),
        Some(('[', rest)) => {
            let Some((&first, key_rest)) = key.split_first() else {
                return false;
            };
            let Some(close) = rest.iter().position(|&ch| ch == ']') else {
                return first == '[' && glob_match_from(rest, key_rest);
            };
            let (class, after) = (&rest[..close], &rest[close + 1..]);
            let (negated, class) = match class.split_first() {
                Some(('^', tail)) => (true, tail),
                _ => (false, class),
            };
            class_contains(class, first) != negated && glob_match_from(after, key_rest)
        }
        Some(('\\', rest)) if !rest.is_empty() => {
            key.first() == Some(&rest[0]) && glob_match_from(&rest[1..], &key[1..])
        }
        Some((&literal, rest)) => key.first() == Some(&literal) && glob_match_from(rest, &key[1..]),
    }
}

fn class_contains(class: &[char], ch: char) -> bool {
    let mut idx = 0;
    while idx < class.len() {
        if class[idx] == '\\' && idx + 1 < class.len() {
            if class[idx + 1] == ch {
                return true;
            }
            idx += 2;
        } else if idx + 2 < class.len() && class[idx + 1] == '-' {
            if (class[idx]..=class[idx + 2]).contains(&ch) {
                return true;
            }
            idx += 3;
        } else {
            if class[idx] == ch {
                return true;
            }
            idx += 1;
        }
    }
    false
}
