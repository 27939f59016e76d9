use async_trait::async_trait;
use redis::{Client, RedisError, aio::ConnectionManager};
use tracing::info;

use super::{Substrate, SubstrateError};

/// Redis over TCP.
///
/// The connection manager re-dials after a dropped connection, so a Redis
/// restart costs the calls in flight rather than the rest of the process.
#[derive(Clone)]
pub struct RedisSubstrate {
    connection: ConnectionManager,
}

impl RedisSubstrate {
    /// Connect to `url` (`redis://` or `rediss://`).
    pub async fn connect(url: &str) -> Result<Self, SubstrateError> {
        let client = Client::open(url).map_err(map_redis_error)?;
        let connection = ConnectionManager::new(client)
            .await
            .map_err(map_redis_error)?;
        info!(target = "storefront::cache::redis", "redis connection established");
        Ok(Self { connection })
    }

    fn connection(&self) -> ConnectionManager {
        self.connection.clone()
    }
}

fn map_redis_error(err: RedisError) -> SubstrateError {
    if err.is_io_error() || err.is_connection_dropped() || err.is_timeout() {
        SubstrateError::Transport(err.to_string())
    } else {
        SubstrateError::Protocol(err.to_string())
    }
}

#[async_trait]
impl Substrate for RedisSubstrate {
    fn name(&self) -> &'static str {
        "redis"
    }

    async fn get(&self, key: &str) -> Result<Option<String>, SubstrateError> {
        redis::cmd("GET")
            .arg(key)
            .query_async::<Option<String>>(&mut self.connection())
            .await
            .map_err(map_redis_error)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), SubstrateError> {
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .query_async::<()>(&mut self.connection())
            .await
            .map_err(map_redis_error)
    }

    async fn set_ex(&self, key: &str, value: &str, ttl_secs: u64) -> Result<(), SubstrateError> {
        redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("EX")
            .arg(ttl_secs.max(1))
            .query_async::<()>(&mut self.connection())
            .await
            .map_err(map_redis_error)
    }

    async fn set_nx_ex(
        &self,
        key: &str,
        value: &str,
        ttl_secs: u64,
    ) -> Result<bool, SubstrateError> {
        let reply = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("EX")
            .arg(ttl_secs.max(1))
            .query_async::<Option<String>>(&mut self.connection())
            .await
            .map_err(map_redis_error)?;
        Ok(reply.is_some())
    }

    async fn del(&self, keys: &[String]) -> Result<u64, SubstrateError> {
        if keys.is_empty() {
            return Ok(0);
        }
        redis::cmd("DEL")
            .arg(keys)
            .query_async::<u64>(&mut self.connection())
            .await
            .map_err(map_redis_error)
    }

    async fn scan(
        &self,
        cursor: u64,
        pattern: &str,
        count: usize,
    ) -> Result<(u64, Vec<String>), SubstrateError> {
        redis::cmd("SCAN")
            .arg(cursor)
            .arg("MATCH")
            .arg(pattern)
            .arg("COUNT")
            .arg(count)
            .query_async::<(u64, Vec<String>)>(&mut self.connection())
            .await
            .map_err(map_redis_error)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, SubstrateError> {
        redis::cmd("KEYS")
            .arg(pattern)
            .query_async::<Vec<String>>(&mut self.connection())
            .await
            .map_err(map_redis_error)
    }

    async fn ping(&self) -> Result<(), SubstrateError> {
        let pong = redis::cmd("PING")
            .query_async::<String>(&mut self.connection())
            .await
            .map_err(map_redis_error)?;
        if pong.eq_ignore_ascii_case("PONG") {
            Ok(())
        } else {
            Err(SubstrateError::Protocol(format!(
                "unexpected PING reply `{pong}`"
            )))
        }
    }
}
