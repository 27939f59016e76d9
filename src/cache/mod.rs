//! Cache-aside layer over a Redis-compatible substrate.
//!
//! ```toml
//! [cache]
//! enabled = true
//! backend = "redis"        # memory | redis | rest
//! url = "redis://127.0.0.1:6379"
//! default_ttl_seconds = 300
//! # native_ttl / prefix_deletion / atomic_locks override the backend defaults
//! ```

mod aside;
mod client;
pub mod codec;
mod config;
mod envelope;
pub mod keys;
pub mod substrate;

pub use aside::CacheAside;
pub use client::CacheClient;
pub use codec::CodecError;
pub use config::{Backend, CacheConfig, Capabilities, PrefixDeletion};
pub use envelope::{Envelope, Opened};
pub use keys::KeyBuilder;
pub use substrate::{MemorySubstrate, RedisSubstrate, RestSubstrate, Substrate, SubstrateError};
