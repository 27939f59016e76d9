//! Per-entity cache policies and the wired set of services.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::application::entity::{
    CachePolicy, DeleteGuard, EntityService, ExistingResolver, ServiceError,
};
use crate::application::repos::{ClientDirectory, SalesHistoryRepo, Store};
use crate::cache::CacheAside;
use crate::domain::entities::{
    Address, Bill, Category, Client, ClientDraft, Order, OrderDetail, Product, Review,
};
use crate::domain::error::DomainError;

pub const CATEGORIES: CachePolicy = CachePolicy {
    scope: "categories",
    ttl: Some(Duration::from_secs(3600)),
};
pub const PRODUCTS: CachePolicy = CachePolicy {
    scope: "products",
    ttl: None,
};
pub const CLIENTS: CachePolicy = CachePolicy {
    scope: "clients",
    ttl: None,
};
pub const ADDRESSES: CachePolicy = CachePolicy {
    scope: "addresses",
    ttl: None,
};
pub const ORDERS: CachePolicy = CachePolicy {
    scope: "orders",
    ttl: None,
};
pub const ORDER_DETAILS: CachePolicy = CachePolicy {
    scope: "order_details",
    ttl: None,
};
pub const BILLS: CachePolicy = CachePolicy {
    scope: "bills",
    ttl: None,
};
pub const REVIEWS: CachePolicy = CachePolicy {
    scope: "reviews",
    ttl: None,
};

/// Refuses to delete a product that appears on any order.
pub struct ProductDeleteGuard {
    sales: Arc<dyn SalesHistoryRepo>,
}

impl ProductDeleteGuard {
    pub fn new(sales: Arc<dyn SalesHistoryRepo>) -> Self {
        Self { sales }
    }
}

#[async_trait]
impl DeleteGuard for ProductDeleteGuard {
    async fn check(&self, id: i64) -> Result<(), ServiceError> {
        if self.sales.product_has_sales(id).await? {
            return Err(DomainError::integrity(format!(
                "product {id} is referenced by existing order details"
            ))
            .into());
        }
        Ok(())
    }
}

/// Creating a client with a known e-mail returns the existing client.
pub struct ClientEmailResolver {
    directory: Arc<dyn ClientDirectory>,
}

impl ClientEmailResolver {
    pub fn new(directory: Arc<dyn ClientDirectory>) -> Self {
        Self { directory }
    }
}

#[async_trait]
impl ExistingResolver<Client> for ClientEmailResolver {
    async fn resolve(&self, draft: &ClientDraft) -> Result<Option<Client>, ServiceError> {
        Ok(self
            .directory
            .find_client_by_email(draft.email.trim())
            .await?)
    }
}

/// Every persistence handle the catalog needs.
#[derive(Clone)]
pub struct CatalogStores {
    pub categories: Arc<dyn Store<Category>>,
    pub products: Arc<dyn Store<Product>>,
    pub clients: Arc<dyn Store<Client>>,
    pub addresses: Arc<dyn Store<Address>>,
    pub orders: Arc<dyn Store<Order>>,
    pub order_details: Arc<dyn Store<OrderDetail>>,
    pub bills: Arc<dyn Store<Bill>>,
    pub reviews: Arc<dyn Store<Review>>,
    pub sales_history: Arc<dyn SalesHistoryRepo>,
    pub client_directory: Arc<dyn ClientDirectory>,
}

#[derive(Clone)]
pub struct CatalogServices {
    pub categories: EntityService<Category>,
    pub products: EntityService<Product>,
    pub clients: EntityService<Client>,
    pub addresses: EntityService<Address>,
    pub orders: EntityService<Order>,
    pub order_details: EntityService<OrderDetail>,
    pub bills: EntityService<Bill>,
    pub reviews: EntityService<Review>,
}

impl CatalogServices {
    pub fn new(stores: CatalogStores, cache: CacheAside) -> Self {
        Self {
            categories: EntityService::new(stores.categories, cache.clone(), CATEGORIES),
            products: EntityService::new(stores.products, cache.clone(), PRODUCTS)
                .with_delete_guard(Arc::new(ProductDeleteGuard::new(stores.sales_history))),
            clients: EntityService::new(stores.clients, cache.clone(), CLIENTS)
                .with_existing_resolver(Arc::new(ClientEmailResolver::new(
                    stores.client_directory,
                ))),
            addresses: EntityService::new(stores.addresses, cache.clone(), ADDRESSES),
            orders: EntityService::new(stores.orders, cache.clone(), ORDERS),
            order_details: EntityService::new(stores.order_details, cache.clone(), ORDER_DETAILS),
            bills: EntityService::new(stores.bills, cache.clone(), BILLS),
            reviews: EntityService::new(stores.reviews, cache, REVIEWS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::application::repos::RepoError;

    #[test]
    fn scopes_are_distinct_and_not_nested() {
        let scopes = [
            CATEGORIES, PRODUCTS, CLIENTS, ADDRESSES, ORDERS, ORDER_DETAILS, BILLS, REVIEWS,
        ]
        .map(|policy| policy.scope);
        for (i, a) in scopes.iter().enumerate() {
            for b in &scopes[i + 1..] {
                assert!(!format!("{a}:").starts_with(&format!("{b}:")));
                assert!(!format!("{b}:").starts_with(&format!("{a}:")));
            }
        }
    }

    struct Sold(bool);

    #[async_trait]
    impl SalesHistoryRepo for Sold {
        async fn product_has_sales(&self, _product_id: i64) -> Result<bool, RepoError> {
            Ok(self.0)
        }
    }

    #[tokio::test]
    async fn delete_guard_vetoes_sold_products() {
        let err = ProductDeleteGuard::new(Arc::new(Sold(true)))
            .check(7)
            .await
            .expect_err("sold product");
        match err {
            ServiceError::Integrity { message } => assert!(message.contains("product 7")),
            other => panic!("unexpected error: {other:?}"),
        }

        assert!(ProductDeleteGuard::new(Arc::new(Sold(false))).check(7).await.is_ok());
    }

    #[test]
    fn only_categories_override_ttl() {
        assert_eq!(CATEGORIES.ttl, Some(Duration::from_secs(3600)));
        assert_eq!(PRODUCTS.ttl, None);
    }
}
