use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;

use axum::{
    Router,
    body::Body,
    http::{Method, Request, StatusCode, header::CONTENT_TYPE, header::RETRY_AFTER},
};
use bigdecimal::BigDecimal;
use http_body_util::BodyExt;
use serde_json::{Value, json};
use storefront::application::catalog::CatalogServices;
use storefront::application::health::HealthService;
use storefront::cache::{CacheAside, CacheClient, CacheConfig};
use storefront::domain::entities::{OrderDetailDraft, ProductDraft};
use storefront::infra::http::{HttpState, RateLimitState, build_router};
use storefront::infra::memory::MemoryCatalog;
use tower::ServiceExt;

async fn app() -> (Router, Arc<MemoryCatalog>) {
    app_with_limit(RateLimitState::default()).await
}

async fn app_with_limit(rate_limit: RateLimitState) -> (Router, Arc<MemoryCatalog>) {
    let config = CacheConfig::memory();
    let client = CacheClient::from_config(&config).await;
    let catalog = MemoryCatalog::new();
    let state = HttpState {
        catalog: CatalogServices::new(catalog.stores(), CacheAside::new(client.clone(), &config)),
        health: HealthService::new(catalog.clone(), client),
        rate_limit,
    };
    (build_router(state), catalog)
}

async fn send(router: &Router, method: Method, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
    let mut request = Request::builder().method(method).uri(uri);
    let body = match body {
        Some(json) => {
            request = request.header(CONTENT_TYPE, "application/json");
            Body::from(json.to_string())
        }
        None => Body::empty(),
    };
    let response = router
        .clone()
        .oneshot(request.body(body).expect("request"))
        .await
        .expect("router is infallible");

    let status = response.status();
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).expect("json body")
    };
    (status, value)
}

#[tokio::test]
async fn create_then_fetch_a_category() {
    let (router, _) = app().await;

    let (status, created) = send(
        &router,
        Method::POST,
        "/categories",
        Some(json!({ "name": "Outdoor" })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(created, json!({ "id": 1, "name": "Outdoor" }));

    let (status, fetched) = send(&router, Method::GET, "/categories/1", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(fetched, created);

    let (status, listed) = send(&router, Method::GET, "/categories?skip=0&limit=10", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(listed, json!([{ "id": 1, "name": "Outdoor" }]));
}

#[tokio::test]
async fn missing_record_returns_a_not_found_body() {
    let (router, _) = app().await;

    let (status, body) = send(&router, Method::GET, "/products/99", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], "not_found");
    assert_eq!(body["error"]["message"], "Resource not found");
    assert_eq!(body["error"]["hint"], "product 99 not found");
}

#[tokio::test]
async fn validation_failures_are_bad_requests() {
    let (router, catalog) = app().await;

    let (status, body) = send(
        &router,
        Method::POST,
        "/reviews",
        Some(json!({ "rating": 7.5, "product_id": 1 })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], "validation_error");
    assert!(catalog.reviews.is_empty());
}

#[tokio::test]
async fn referenced_product_delete_is_a_conflict() {
    let (router, catalog) = app().await;
    let product = catalog.products.insert(ProductDraft {
        name: "Kettle".to_string(),
        price: BigDecimal::from(25),
        stock: 3,
        category_id: None,
    });
    catalog.order_details.insert(OrderDetailDraft {
        quantity: 2,
        price: BigDecimal::from(25),
        order_id: 1,
        product_id: product.id,
    });

    let (status, body) = send(&router, Method::DELETE, "/products/1", None).await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], "integrity_error");
    assert_eq!(catalog.products.len(), 1);
}

#[tokio::test]
async fn update_and_delete_round_trip() {
    let (router, _) = app().await;

    send(
        &router,
        Method::POST,
        "/products",
        Some(json!({ "name": "Mug", "price": 9.5, "stock": 10 })),
    )
    .await;
    let (_, before) = send(&router, Method::GET, "/products/1", None).await;
    assert_eq!(before["price"], json!(9.5));

    let (status, updated) = send(
        &router,
        Method::PUT,
        "/products/1",
        Some(json!({ "name": "Mug", "price": 11.25, "stock": 8 })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(updated["price"], json!(11.25));

    let (_, after) = send(&router, Method::GET, "/products/1", None).await;
    assert_eq!(after["stock"], json!(8));

    let (status, _) = send(&router, Method::DELETE, "/products/1", None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let (status, _) = send(&router, Method::GET, "/products/1", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn list_limit_is_clamped() {
    let (router, catalog) = app().await;
    for name in ["a", "b", "c"] {
        catalog
            .categories
            .insert(storefront::domain::entities::CategoryDraft {
                name: name.to_string(),
            });
    }

    let (status, body) = send(&router, Method::GET, "/categories?limit=0", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body.as_array().map(Vec::len), Some(1));

    let (_, body) = send(&router, Method::GET, "/categories?skip=1", None).await;
    assert_eq!(body.as_array().map(Vec::len), Some(2));
}

#[tokio::test]
async fn health_check_reports_every_component() {
    let (router, _) = app().await;

    let (status, body) = send(&router, Method::GET, "/health_check", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["checks"]["database"]["status"], "up");
    assert_eq!(body["checks"]["cache"]["status"], "up");
    assert_eq!(body["checks"]["cache"]["backend"], "memory");
    assert!(body["timestamp"].is_string());
}

#[tokio::test]
async fn health_check_degrades_without_cache() {
    let catalog = MemoryCatalog::new();
    let client = CacheClient::disabled();
    let state = HttpState {
        catalog: CatalogServices::new(
            catalog.stores(),
            CacheAside::new(client.clone(), &CacheConfig::default()),
        ),
        health: HealthService::new(catalog.clone(), client),
        rate_limit: RateLimitState::default(),
    };
    let router = build_router(state);

    let (status, body) = send(&router, Method::GET, "/health_check", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "degraded");
    assert_eq!(body["checks"]["cache"]["status"], "down");
}

async fn get_from(router: &Router, uri: &str, client: &str) -> axum::response::Response {
    let request = Request::builder()
        .uri(uri)
        .header("x-forwarded-for", client)
        .body(Body::empty())
        .expect("request");
    router
        .clone()
        .oneshot(request)
        .await
        .expect("router is infallible")
}

#[tokio::test]
async fn clients_over_budget_are_throttled() {
    // Slow refill so the 101st request lands inside the window on any machine.
    let limit = NonZeroU32::new(100).expect("non-zero");
    let (router, _) = app_with_limit(RateLimitState::new(limit, Duration::from_secs(3600))).await;

    for _ in 0..100 {
        let response = get_from(&router, "/categories", "203.0.113.7").await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.headers()["x-ratelimit-limit"], "100");
    }

    let response = get_from(&router, "/categories", "203.0.113.7").await;
    assert_eq!(response.status(), StatusCode::TOO_MANY_REQUESTS);
    assert!(response.headers().contains_key(RETRY_AFTER));
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body")
        .to_bytes();
    let body: Value = serde_json::from_slice(&bytes).expect("json body");
    assert_eq!(body["error"]["code"], "rate_limited");

    let other = get_from(&router, "/categories", "203.0.113.8").await;
    assert_eq!(other.status(), StatusCode::OK);
}

#[tokio::test]
async fn responses_carry_a_request_id() {
    let (router, _) = app().await;
    let first = get_from(&router, "/categories", "198.51.100.4").await;
    let second = get_from(&router, "/products/42", "198.51.100.4").await;

    assert_eq!(second.status(), StatusCode::NOT_FOUND);
    let a = first.headers()["x-request-id"].to_str().expect("ascii");
    let b = second.headers()["x-request-id"].to_str().expect("ascii");
    assert_eq!(a.len(), 36);
    assert_ne!(a, b);
}
