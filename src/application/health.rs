//! Threshold-based health report for the database, its pool and the cache.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::Serialize;
use time::OffsetDateTime;

use crate::application::repos::RepoError;
use crate::cache::CacheClient;

/// Ordered from best to worst; the overall level is the worst component.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum HealthLevel {
    Healthy,
    Warning,
    Degraded,
    Critical,
}

pub fn evaluate(levels: impl IntoIterator<Item = HealthLevel>) -> HealthLevel {
    levels.into_iter().max().unwrap_or(HealthLevel::Healthy)
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Thresholds {
    pub warning: f64,
    pub critical: f64,
}

impl Thresholds {
    pub fn classify(&self, value: f64) -> HealthLevel {
        if value >= self.critical {
            HealthLevel::Critical
        } else if value >= self.warning {
            HealthLevel::Warning
        } else {
            HealthLevel::Healthy
        }
    }
}

pub const DB_LATENCY_MS: Thresholds = Thresholds {
    warning: 100.0,
    critical: 500.0,
};

pub const DB_POOL_UTILIZATION: Thresholds = Thresholds {
    warning: 70.0,
    critical: 90.0,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolStats {
    pub size: u32,
    pub idle: u32,
    pub max_connections: u32,
}

impl PoolStats {
    pub fn utilization_percent(&self) -> f64 {
        if self.max_connections == 0 {
            return 0.0;
        }
        let in_use = self.size.saturating_sub(self.idle);
        f64::from(in_use) / f64::from(self.max_connections) * 100.0
    }
}

#[async_trait]
pub trait DatabaseProbe: Send + Sync {
    async fn ping(&self) -> Result<(), RepoError>;

    fn pool_stats(&self) -> PoolStats;
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthReport {
    pub status: HealthLevel,
    #[serde(with = "time::serde::rfc3339")]
    pub timestamp: OffsetDateTime,
    pub checks: HealthChecks,
}

#[derive(Debug, Clone, Serialize)]
pub struct HealthChecks {
    pub database: DatabaseCheck,
    pub cache: CacheCheck,
    pub db_pool: PoolCheck,
}

#[derive(Debug, Clone, Serialize)]
pub struct DatabaseCheck {
    pub status: &'static str,
    pub health: HealthLevel,
    pub latency_ms: Option<f64>,
    pub thresholds: Thresholds,
}

#[derive(Debug, Clone, Serialize)]
pub struct CacheCheck {
    pub status: &'static str,
    pub health: HealthLevel,
    pub latency_ms: Option<f64>,
    pub backend: &'static str,
}

#[derive(Debug, Clone, Serialize)]
pub struct PoolCheck {
    pub health: HealthLevel,
    pub size: u32,
    pub idle: u32,
    pub max_connections: u32,
    pub utilization_percent: f64,
    pub thresholds: Thresholds,
}

#[derive(Clone)]
pub struct HealthService {
    database: Arc<dyn DatabaseProbe>,
    cache: CacheClient,
}

impl HealthService {
    pub fn new(database: Arc<dyn DatabaseProbe>, cache: CacheClient) -> Self {
        Self { database, cache }
    }

    pub async fn check(&self) -> HealthReport {
        let database = self.check_database().await;
        let cache = self.check_cache().await;
        let db_pool = self.check_pool();

        HealthReport {
            status: evaluate([database.health, cache.health, db_pool.health]),
            timestamp: OffsetDateTime::now_utc(),
            checks: HealthChecks {
                database,
                cache,
                db_pool,
            },
        }
    }

    async fn check_database(&self) -> DatabaseCheck {
        let started = Instant::now();
        match self.database.ping().await {
            Ok(()) => {
                let latency = millis(started.elapsed());
                DatabaseCheck {
                    status: "up",
                    health: DB_LATENCY_MS.classify(latency),
                    latency_ms: Some(latency),
                    thresholds: DB_LATENCY_MS,
                }
            }
            Err(_) => DatabaseCheck {
                status: "down",
                health: HealthLevel::Critical,
                latency_ms: None,
                thresholds: DB_LATENCY_MS,
            },
        }
    }

    async fn check_cache(&self) -> CacheCheck {
        let backend = self.cache.backend_name();
        let latency = if self.cache.refresh_availability().await {
            self.cache.ping_latency().await
        } else {
            None
        };
        match latency {
            Some(latency) => CacheCheck {
                status: "up",
                health: HealthLevel::Healthy,
                latency_ms: Some(millis(latency)),
                backend,
            },
            None => CacheCheck {
                status: "down",
                health: HealthLevel::Degraded,
                latency_ms: None,
                backend,
            },
        }
    }

    fn check_pool(&self) -> PoolCheck {
        let stats = self.database.pool_stats();
        let utilization = stats.utilization_percent();
        PoolCheck {
            health: DB_POOL_UTILIZATION.classify(utilization),
            size: stats.size,
            idle: stats.idle,
            max_connections: stats.max_connections,
            utilization_percent: (utilization * 10.0).round() / 10.0,
            thresholds: DB_POOL_UTILIZATION,
        }
    }
}

fn millis(duration: Duration) -> f64 {
    (duration.as_secs_f64() * 100_000.0).round() / 100.0
}
