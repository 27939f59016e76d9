use std::str::FromStr;
use std::sync::Arc;

use bigdecimal::BigDecimal;
use sqlx::PgPool;
use storefront::application::pagination::PageRequest;
use storefront::application::repos::{ClientDirectory, RepoError, SalesHistoryRepo, Store};
use storefront::domain::entities::{
    Category, CategoryDraft, Client, ClientDraft, Order, OrderDetail, OrderDetailDraft, OrderDraft,
    Product, ProductDraft,
};
use storefront::domain::types::{DeliveryMethod, OrderStatus};
use storefront::infra::db::PostgresRepositories;
use time::macros::datetime;

fn repositories(pool: PgPool) -> Arc<PostgresRepositories> {
    Arc::new(PostgresRepositories::new(pool))
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL pointing at a disposable Postgres"]
async fn category_crud_round_trip(pool: PgPool) {
    let repos = repositories(pool);
    let store = repos.store::<Category>();

    let books = store
        .create(&CategoryDraft {
            name: "Books".to_string(),
        })
        .await
        .expect("create books");
    store
        .create(&CategoryDraft {
            name: "Music".to_string(),
        })
        .await
        .expect("create music");

    let page = store.list(PageRequest::new(0, 10)).await.expect("list");
    assert_eq!(
        page.iter().map(|c| c.name.as_str()).collect::<Vec<_>>(),
        ["Books", "Music"]
    );
    assert_eq!(store.list(PageRequest::new(1, 10)).await.expect("page 2").len(), 1);

    let renamed = store
        .update(
            books.id,
            &CategoryDraft {
                name: "Films".to_string(),
            },
        )
        .await
        .expect("update")
        .expect("row exists");
    assert_eq!(renamed.name, "Films");
    assert!(
        store
            .update(
                999,
                &CategoryDraft {
                    name: "Ghost".to_string()
                }
            )
            .await
            .expect("update missing")
            .is_none()
    );

    assert!(store.delete(books.id).await.expect("delete"));
    assert!(!store.delete(books.id).await.expect("delete again"));
    assert!(store.get(books.id).await.expect("get").is_none());
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL pointing at a disposable Postgres"]
async fn duplicate_category_name_is_reported(pool: PgPool) {
    let store = repositories(pool).store::<Category>();
    let draft = CategoryDraft {
        name: "Garden".to_string(),
    };
    store.create(&draft).await.expect("first");

    let err = store.create(&draft).await.expect_err("duplicate");
    assert!(matches!(err, RepoError::Duplicate { .. }), "{err:?}");
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL pointing at a disposable Postgres"]
async fn product_prices_keep_their_scale(pool: PgPool) {
    let store = repositories(pool).store::<Product>();
    let created = store
        .create(&ProductDraft {
            name: "Lamp".to_string(),
            price: BigDecimal::from_str("19.99").expect("decimal"),
            stock: 4,
            category_id: None,
        })
        .await
        .expect("create");

    let fetched = store.get(created.id).await.expect("get").expect("row");
    assert_eq!(fetched.price, BigDecimal::from_str("19.99").expect("decimal"));
    assert_eq!(fetched.stock, 4);
}

#[sqlx::test(migrations = "./migrations")]
#[ignore = "requires DATABASE_URL pointing at a disposable Postgres"]
async fn lookups_find_sales_and_clients(pool: PgPool) {
    let repos = repositories(pool);
    let client = repos
        .store::<Client>()
        .create(&ClientDraft {
            name: "Ada".to_string(),
            lastname: "Lovelace".to_string(),
            email: "ada@example.com".to_string(),
            telephone: None,
        })
        .await
        .expect("client");
    let product = repos
        .store::<Product>()
        .create(&ProductDraft {
            name: "Loom".to_string(),
            price: BigDecimal::from(300),
            stock: 1,
            category_id: None,
        })
        .await
        .expect("product");

    assert!(!repos.product_has_sales(product.id).await.expect("no sales"));

    let order = repos
        .store::<Order>()
        .create(&OrderDraft {
            date: datetime!(2024-05-01 10:00:00 UTC),
            total: BigDecimal::from(300),
            delivery_method: DeliveryMethod::OnHand,
            status: OrderStatus::Pending,
            client_id: client.id,
            bill_id: None,
        })
        .await
        .expect("order");
    repos
        .store::<OrderDetail>()
        .create(&OrderDetailDraft {
            quantity: 1,
            price: BigDecimal::from(300),
            order_id: order.id,
            product_id: product.id,
        })
        .await
        .expect("detail");

    assert!(repos.product_has_sales(product.id).await.expect("sales"));

    let found = repos
        .find_client_by_email("ADA@example.com")
        .await
        .expect("lookup")
        .expect("client by email");
    assert_eq!(found.id, client.id);
    assert!(
        repos
            .find_client_by_email("nobody@example.com")
            .await
            .expect("lookup")
            .is_none()
    );
}
