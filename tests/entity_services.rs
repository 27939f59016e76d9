use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use bigdecimal::BigDecimal;
use storefront::application::catalog::CatalogServices;
use storefront::application::entity::ServiceError;
use storefront::application::pagination::PageRequest;
use storefront::cache::{
    CacheAside, CacheClient, CacheConfig, Capabilities, MemorySubstrate, PrefixDeletion,
    Substrate,
};
use storefront::domain::entities::{
    CategoryDraft, ClientDraft, Entity, OrderDetailDraft, OrderDraft, ProductDraft,
};
use storefront::domain::types::{DeliveryMethod, OrderStatus};
use storefront::infra::memory::MemoryCatalog;
use time::macros::datetime;

struct Harness {
    catalog: Arc<MemoryCatalog>,
    services: CatalogServices,
    substrate: Arc<MemorySubstrate>,
}

impl Harness {
    async fn new(capabilities: Capabilities) -> Self {
        let config = CacheConfig {
            capabilities,
            ..CacheConfig::memory()
        };
        let substrate = Arc::new(MemorySubstrate::new());
        let client = CacheClient::connect(
            substrate.clone() as Arc<dyn Substrate>,
            capabilities,
            config.operation_timeout,
        )
        .await;
        let catalog = MemoryCatalog::new();
        let services = CatalogServices::new(catalog.stores(), CacheAside::new(client, &config));
        Self {
            catalog,
            services,
            substrate,
        }
    }

    async fn cached(&self, key: &str) -> bool {
        self.substrate
            .get(key)
            .await
            .expect("memory substrate never fails")
            .is_some()
    }
}

fn descriptors() -> [Capabilities; 2] {
    [
        Capabilities::defaults_for(storefront::cache::Backend::Memory),
        Capabilities {
            native_ttl: false,
            prefix_deletion: PrefixDeletion::Index,
            atomic_locks: false,
        },
    ]
}

fn category(name: &str) -> CategoryDraft {
    CategoryDraft {
        name: name.to_string(),
    }
}

fn product(name: &str, price: &str) -> ProductDraft {
    ProductDraft {
        name: name.to_string(),
        price: BigDecimal::from_str(price).expect("decimal literal"),
        stock: 5,
        category_id: None,
    }
}

fn client(email: &str) -> ClientDraft {
    ClientDraft {
        name: "Grace".to_string(),
        lastname: "Hopper".to_string(),
        email: email.to_string(),
        telephone: None,
    }
}

#[tokio::test]
async fn category_reads_go_through_the_cache() {
    for caps in descriptors() {
        let harness = Harness::new(caps).await;
        for name in ["a", "b", "c", "d", "e"] {
            harness.catalog.categories.insert(category(name));
        }

        let first = harness.services.categories.get(5).await.expect("category 5");
        assert_eq!(first.name, "e");
        assert!(harness.cached("categories:id:id:5").await);

        let second = harness.services.categories.get(5).await.expect("category 5");
        assert_eq!(second, first);
        assert_eq!(harness.catalog.categories.reads(), 1, "{caps:?}");
    }
}

#[tokio::test]
async fn missing_records_are_not_cached() {
    let harness = Harness::new(descriptors()[0]).await;

    for _ in 0..2 {
        let err = harness
            .services
            .categories
            .get(42)
            .await
            .expect_err("nothing stored");
        assert!(matches!(
            err,
            ServiceError::NotFound {
                entity: "category",
                id: 42
            }
        ));
    }
    assert!(!harness.cached("categories:id:id:42").await);
    assert_eq!(harness.catalog.categories.reads(), 2);
}

#[tokio::test]
async fn decimals_survive_the_cache() {
    let harness = Harness::new(descriptors()[0]).await;
    let stored = harness.catalog.products.insert(product("Lamp", "19.99"));

    harness.services.products.get(stored.id).await.expect("miss");
    let cached = harness.services.products.get(stored.id).await.expect("hit");
    assert_eq!(cached.price, BigDecimal::from_str("19.99").expect("decimal"));
    assert_eq!(harness.catalog.products.reads(), 1);
}

#[tokio::test]
async fn create_drops_the_whole_scope() {
    for caps in descriptors() {
        let harness = Harness::new(caps).await;
        let existing = harness.catalog.products.insert(product("Desk", "120"));

        harness
            .services
            .products
            .list(PageRequest::default())
            .await
            .expect("list");
        harness
            .services
            .products
            .get(existing.id)
            .await
            .expect("get");
        assert!(harness.cached("products:id:id:1").await);

        let created = harness
            .services
            .products
            .create(product("Chair", "45.50"))
            .await
            .expect("create");
        assert_eq!(created.id, 2);
        assert!(!harness.cached("products:id:id:1").await, "{caps:?}");
        assert!(
            !harness.cached("products:list:limit:100:skip:0").await,
            "{caps:?}"
        );

        let listed = harness
            .services
            .products
            .list(PageRequest::default())
            .await
            .expect("list");
        assert_eq!(listed.len(), 2);
    }
}

#[tokio::test]
async fn update_drops_the_record_and_every_list_page() {
    for caps in descriptors() {
        let harness = Harness::new(caps).await;
        harness.catalog.categories.insert(category("Books"));
        harness.catalog.categories.insert(category("Music"));

        let services = &harness.services.categories;
        services.get(1).await.expect("get 1");
        services.get(2).await.expect("get 2");
        services.list(PageRequest::new(0, 10)).await.expect("page 1");
        services.list(PageRequest::new(10, 10)).await.expect("page 2");

        let updated = services
            .update(1, category("Films"))
            .await
            .expect("update");
        assert_eq!(updated.name, "Films");

        assert!(!harness.cached("categories:id:id:1").await);
        assert!(harness.cached("categories:id:id:2").await, "{caps:?}");
        assert!(!harness.cached("categories:list:limit:10:skip:0").await);
        assert!(!harness.cached("categories:list:limit:10:skip:10").await);

        let fresh = services.get(1).await.expect("get 1");
        assert_eq!(fresh.name, "Films");
    }
}

#[tokio::test]
async fn update_of_a_missing_record_is_not_found() {
    let harness = Harness::new(descriptors()[0]).await;
    let err = harness
        .services
        .categories
        .update(9, category("Ghost"))
        .await
        .expect_err("missing");
    assert!(matches!(err, ServiceError::NotFound { id: 9, .. }));
}

#[tokio::test]
async fn delete_drops_the_record() {
    for caps in descriptors() {
        let harness = Harness::new(caps).await;
        harness.catalog.categories.insert(category("Toys"));
        let services = &harness.services.categories;

        services.get(1).await.expect("get");
        services.delete(1).await.expect("delete");
        assert!(!harness.cached("categories:id:id:1").await);
        assert!(matches!(
            services.get(1).await,
            Err(ServiceError::NotFound { .. })
        ));
        assert!(matches!(
            services.delete(1).await,
            Err(ServiceError::NotFound { .. })
        ));
    }
}

#[tokio::test]
async fn referenced_product_cannot_be_deleted() {
    let harness = Harness::new(descriptors()[0]).await;
    let lamp = harness.catalog.products.insert(product("Lamp", "30"));
    let order = harness.catalog.orders.insert(OrderDraft {
        date: datetime!(2024-05-01 10:00:00 UTC),
        total: BigDecimal::from(30),
        delivery_method: DeliveryMethod::HomeDelivery,
        status: OrderStatus::Pending,
        client_id: 1,
        bill_id: None,
    });
    harness.catalog.order_details.insert(OrderDetailDraft {
        quantity: 1,
        price: BigDecimal::from(30),
        order_id: order.id,
        product_id: lamp.id,
    });

    harness.services.products.get(lamp.id).await.expect("warm");

    let err = harness
        .services
        .products
        .delete(lamp.id)
        .await
        .expect_err("referenced product");
    assert!(matches!(err, ServiceError::Integrity { .. }));
    assert_eq!(harness.catalog.products.len(), 1);
    assert!(harness.cached("products:id:id:1").await);
}

#[tokio::test]
async fn unreferenced_product_can_be_deleted() {
    let harness = Harness::new(descriptors()[0]).await;
    let lamp = harness.catalog.products.insert(product("Lamp", "30"));
    harness
        .services
        .products
        .delete(lamp.id)
        .await
        .expect("delete");
    assert!(harness.catalog.products.is_empty());
}

#[tokio::test]
async fn existing_email_returns_the_existing_client() {
    let harness = Harness::new(descriptors()[0]).await;
    let services = &harness.services.clients;

    let first = services
        .create(client("grace@navy.mil"))
        .await
        .expect("create");
    services.list(PageRequest::default()).await.expect("warm list");

    let again = services
        .create(client("Grace@Navy.mil"))
        .await
        .expect("resolve existing");
    assert_eq!(again.id(), first.id());
    assert_eq!(harness.catalog.clients.len(), 1);
    assert!(harness.cached("clients:list:limit:100:skip:0").await);
}

#[tokio::test]
async fn invalid_drafts_never_reach_the_store() {
    let harness = Harness::new(descriptors()[0]).await;

    let err = harness
        .services
        .products
        .create(product("Free lunch", "0"))
        .await
        .expect_err("price must be positive");
    assert!(matches!(err, ServiceError::Validation { .. }));

    let err = harness
        .services
        .categories
        .create(category(&"x".repeat(101)))
        .await
        .expect_err("name too long");
    assert!(matches!(err, ServiceError::Validation { .. }));

    assert!(harness.catalog.products.is_empty());
    assert!(harness.catalog.categories.is_empty());
}

#[tokio::test]
async fn disabled_cache_serves_from_the_store() {
    let catalog = MemoryCatalog::new();
    let services = CatalogServices::new(
        catalog.stores(),
        CacheAside::new(CacheClient::disabled(), &CacheConfig::default()),
    );
    catalog.categories.insert(category("Garden"));

    services.categories.get(1).await.expect("get");
    services.categories.get(1).await.expect("get");
    assert_eq!(catalog.categories.reads(), 2);

    let created = services
        .categories
        .create(category("Kitchen"))
        .await
        .expect("create");
    assert_eq!(created.id, 2);
}

#[tokio::test]
async fn category_entries_outlive_the_default_ttl() {
    let config = CacheConfig {
        default_ttl: Duration::from_secs(1),
        ..CacheConfig::memory()
    };
    let substrate = Arc::new(MemorySubstrate::new());
    let client = CacheClient::connect(
        substrate.clone() as Arc<dyn Substrate>,
        config.capabilities,
        config.operation_timeout,
    )
    .await;
    let catalog = MemoryCatalog::new();
    let services = CatalogServices::new(catalog.stores(), CacheAside::new(client, &config));
    catalog.categories.insert(category("Garden"));
    catalog.products.insert(product("Rake", "12"));

    services.categories.get(1).await.expect("category");
    services.products.get(1).await.expect("product");
    tokio::time::sleep(Duration::from_millis(1200)).await;

    services.categories.get(1).await.expect("category");
    services.products.get(1).await.expect("product");
    assert_eq!(catalog.categories.reads(), 1);
    assert_eq!(catalog.products.reads(), 2);
}
