//! Postgres-backed repository implementations.

mod lookups;
mod store;
mod tables;
mod util;

pub use store::{PgStore, Table};
pub use util::map_sqlx_error;

use std::sync::Arc;

use async_trait::async_trait;
use sqlx::{
    postgres::{PgPool, PgPoolOptions},
    query,
};

use crate::application::catalog::CatalogStores;
use crate::application::health::{DatabaseProbe, PoolStats};
use crate::application::repos::RepoError;

#[derive(Clone)]
pub struct PostgresRepositories {
    pool: Arc<PgPool>,
}

impl PostgresRepositories {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<PgPool, sqlx::Error> {
        PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
    }

    pub async fn run_migrations(pool: &PgPool) -> Result<(), sqlx::Error> {
        sqlx::migrate!("./migrations")
            .run(pool)
            .await
            .map_err(Into::into)
    }

    pub async fn health_check(&self) -> Result<(), sqlx::Error> {
        query("SELECT 1").execute(self.pool()).await.map(|_| ())
    }

    /// Typed store over one entity table.
    pub fn store<E: Table>(&self) -> PgStore<E> {
        PgStore::new(self.pool.clone())
    }

    pub fn catalog_stores(self: &Arc<Self>) -> CatalogStores {
        CatalogStores {
            categories: Arc::new(self.store()),
            products: Arc::new(self.store()),
            clients: Arc::new(self.store()),
            addresses: Arc::new(self.store()),
            orders: Arc::new(self.store()),
            order_details: Arc::new(self.store()),
            bills: Arc::new(self.store()),
            reviews: Arc::new(self.store()),
            sales_history: self.clone(),
            client_directory: self.clone(),
        }
    }
}

#[async_trait]
impl DatabaseProbe for PostgresRepositories {
    async fn ping(&self) -> Result<(), RepoError> {
        self.health_check().await.map_err(map_sqlx_error)
    }

    fn pool_stats(&self) -> PoolStats {
        PoolStats {
            size: self.pool.size(),
            idle: u32::try_from(self.pool.num_idle()).unwrap_or(u32::MAX),
            max_connections: self.pool.options().get_max_connections(),
        }
    }
}
