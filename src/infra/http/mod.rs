//! JSON transport over the catalog services.

mod error;
mod middleware;

pub use error::{ApiError, ApiErrorBody, ApiErrorMessage, codes};
pub use middleware::{RateLimitState, RequestContext};

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    middleware as axum_middleware,
    response::{IntoResponse, Response},
    routing::get,
};

use crate::application::catalog::CatalogServices;
use crate::application::entity::EntityService;
use crate::application::health::{HealthLevel, HealthService};
use crate::application::pagination::{PageParams, PageRequest};
use crate::domain::entities::Entity;

use middleware::{log_responses, rate_limit, set_request_context};

#[derive(Clone)]
pub struct HttpState {
    pub catalog: CatalogServices,
    pub health: HealthService,
    pub rate_limit: RateLimitState,
}

pub fn build_router(state: HttpState) -> Router {
    let HttpState {
        catalog,
        health,
        rate_limit: limits,
    } = state;

    Router::new()
        .nest("/categories", resource_router(catalog.categories))
        .nest("/products", resource_router(catalog.products))
        .nest("/clients", resource_router(catalog.clients))
        .nest("/addresses", resource_router(catalog.addresses))
        .nest("/orders", resource_router(catalog.orders))
        .nest("/order_details", resource_router(catalog.order_details))
        .nest("/bills", resource_router(catalog.bills))
        .nest("/reviews", resource_router(catalog.reviews))
        .route("/health_check", get(health_check).with_state(health))
        .layer(axum_middleware::from_fn_with_state(limits, rate_limit))
        .layer(axum_middleware::from_fn(log_responses))
        .layer(axum_middleware::from_fn(set_request_context))
}

/// CRUD routes for one entity, mounted under its collection path.
fn resource_router<E: Entity>(service: EntityService<E>) -> Router {
    Router::new()
        .route("/", get(list_records::<E>).post(create_record::<E>))
        .route(
            "/{id}",
            get(get_record::<E>)
                .put(update_record::<E>)
                .delete(delete_record::<E>),
        )
        .with_state(service)
}

async fn list_records<E: Entity>(
    State(service): State<EntityService<E>>,
    Query(params): Query<PageParams>,
) -> Result<Json<Vec<E>>, ApiError> {
    let records = service.list(PageRequest::from(params)).await?;
    Ok(Json(records))
}

async fn get_record<E: Entity>(
    State(service): State<EntityService<E>>,
    Path(id): Path<i64>,
) -> Result<Json<E>, ApiError> {
    Ok(Json(service.get(id).await?))
}

async fn create_record<E: Entity>(
    State(service): State<EntityService<E>>,
    Json(draft): Json<E::Draft>,
) -> Result<impl IntoResponse, ApiError> {
    let record = service.create(draft).await?;
    Ok((StatusCode::CREATED, Json(record)))
}

async fn update_record<E: Entity>(
    State(service): State<EntityService<E>>,
    Path(id): Path<i64>,
    Json(draft): Json<E::Draft>,
) -> Result<Json<E>, ApiError> {
    Ok(Json(service.update(id, draft).await?))
}

async fn delete_record<E: Entity>(
    State(service): State<EntityService<E>>,
    Path(id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    service.delete(id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn health_check(State(health): State<HealthService>) -> Response {
    let report = health.check().await;
    let status = if report.status == HealthLevel::Critical {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    };
    (status, Json(report)).into_response()
}
