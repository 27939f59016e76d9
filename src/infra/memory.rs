//! In-process repositories for single-node runs and tests.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::application::catalog::CatalogStores;
use crate::application::health::{DatabaseProbe, PoolStats};
use crate::application::pagination::PageRequest;
use crate::application::repos::{ClientDirectory, RepoError, SalesHistoryRepo, Store};
use crate::domain::entities::{
    Address, Bill, Category, Client, Entity, Order, OrderDetail, Product, Review,
};

/// Map-backed [`Store`] with sequential ids starting at 1.
pub struct MemoryStore<E> {
    rows: DashMap<i64, E>,
    next_id: AtomicI64,
    reads: AtomicUsize,
}

impl<E> Default for MemoryStore<E> {
    fn default() -> Self {
        Self {
            rows: DashMap::new(),
            next_id: AtomicI64::new(1),
            reads: AtomicUsize::new(0),
        }
    }
}

impl<E: Entity> MemoryStore<E> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of `list`/`get` calls served so far.
    pub fn reads(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Insert without validation, bypassing any cache.
    pub fn insert(&self, draft: E::Draft) -> E {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        let row = E::materialize(id, draft);
        self.rows.insert(id, row.clone());
        row
    }

    fn all_sorted(&self) -> Vec<E> {
        let mut rows: Vec<E> = self.rows.iter().map(|entry| entry.value().clone()).collect();
        rows.sort_by_key(Entity::id);
        rows
    }
}

#[async_trait]
impl<E: Entity> Store<E> for MemoryStore<E> {
    async fn list(&self, page: PageRequest) -> Result<Vec<E>, RepoError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .all_sorted()
            .into_iter()
            .skip(page.skip as usize)
            .take(page.limit as usize)
            .collect())
    }

    async fn get(&self, id: i64) -> Result<Option<E>, RepoError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.rows.get(&id).map(|row| row.value().clone()))
    }

    async fn create(&self, draft: &E::Draft) -> Result<E, RepoError> {
        Ok(self.insert(draft.clone()))
    }

    async fn update(&self, id: i64, draft: &E::Draft) -> Result<Option<E>, RepoError> {
        match self.rows.get_mut(&id) {
            Some(mut row) => {
                *row = E::materialize(id, draft.clone());
                Ok(Some(row.clone()))
            }
            None => Ok(None),
        }
    }

    async fn delete(&self, id: i64) -> Result<bool, RepoError> {
        Ok(self.rows.remove(&id).is_some())
    }
}

/// One [`MemoryStore`] per entity plus the side lookups over them.
#[derive(Default)]
pub struct MemoryCatalog {
    pub categories: Arc<MemoryStore<Category>>,
    pub products: Arc<MemoryStore<Product>>,
    pub clients: Arc<MemoryStore<Client>>,
    pub addresses: Arc<MemoryStore<Address>>,
    pub orders: Arc<MemoryStore<Order>>,
    pub order_details: Arc<MemoryStore<OrderDetail>>,
    pub bills: Arc<MemoryStore<Bill>>,
    pub reviews: Arc<MemoryStore<Review>>,
}

impl MemoryCatalog {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn stores(self: &Arc<Self>) -> CatalogStores {
        CatalogStores {
            categories: self.categories.clone(),
            products: self.products.clone(),
            clients: self.clients.clone(),
            addresses: self.addresses.clone(),
            orders: self.orders.clone(),
            order_details: self.order_details.clone(),
            bills: self.bills.clone(),
            reviews: self.reviews.clone(),
            sales_history: self.clone(),
            client_directory: self.clone(),
        }
    }
}

#[async_trait]
impl SalesHistoryRepo for MemoryCatalog {
    async fn product_has_sales(&self, product_id: i64) -> Result<bool, RepoError> {
        Ok(self
            .order_details
            .rows
            .iter()
            .any(|detail| detail.product_id == product_id))
    }
}

#[async_trait]
impl ClientDirectory for MemoryCatalog {
    async fn find_client_by_email(&self, email: &str) -> Result<Option<Client>, RepoError> {
        Ok(self
            .clients
            .all_sorted()
            .into_iter()
            .find(|client| client.email.eq_ignore_ascii_case(email)))
    }
}

#[async_trait]
impl DatabaseProbe for MemoryCatalog {
    async fn ping(&self) -> Result<(), RepoError> {
        Ok(())
    }

    fn pool_stats(&self) -> PoolStats {
        PoolStats {
            size: 0,
            idle: 0,
            max_connections: 0,
        }
    }
}
