//! Expiry envelope for substrates without native TTL.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

const MIN_TTL_MS: i64 = 1_000;

fn unix_millis(at: OffsetDateTime) -> i64 {
    i64::try_from(at.unix_timestamp_nanos() / 1_000_000).unwrap_or(i64::MAX)
}

/// Stored form of a value when expiry is emulated client-side.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Envelope {
    pub value: String,
    /// Unix time in milliseconds after which the value is dead.
    pub expires_at: i64,
}

/// Result of opening a stored envelope.
#[derive(Debug, PartialEq, Eq)]
pub enum Opened {
    Live(String),
    Expired,
    Malformed,
}

impl Envelope {
    pub fn wrap(value: &str, ttl: Duration, now: OffsetDateTime) -> Self {
        let ttl_ms = i64::try_from(ttl.as_millis()).unwrap_or(i64::MAX);
        Self {
            value: value.to_string(),
            expires_at: unix_millis(now).saturating_add(ttl_ms.max(MIN_TTL_MS)),
        }
    }

    pub fn is_expired(&self, now: OffsetDateTime) -> bool {
        unix_millis(now) >= self.expires_at
    }

    pub fn seal(&self) -> String {
        // A struct of a string and an integer always serializes.
        serde_json::to_string(self).unwrap_or_default()
    }

    pub fn open(raw: &str, now: OffsetDateTime) -> Opened {
        match serde_json::from_str::<Envelope>(raw) {
            Ok(envelope) if envelope.is_expired(now) => Opened::Expired,
            Ok(envelope) => Opened::Live(envelope.value),
            Err(_) => Opened::Malformed,
        }
    }
}
