use std::net::{IpAddr, Ipv4Addr, SocketAddr};
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    body::Body,
    extract::{ConnectInfo, State},
    http::{HeaderName, HeaderValue, Request, header::RETRY_AFTER},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dashmap::DashMap;
use governor::{
    Quota, RateLimiter,
    clock::{Clock, DefaultClock},
    state::{InMemoryState, NotKeyed},
};
use tracing::{error, warn};
use uuid::Uuid;

use crate::application::error::ErrorReport;

use super::error::ApiError;

const SOURCE: &str = "storefront::http::response";
const REQUEST_ID_HEADER: HeaderName = HeaderName::from_static("x-request-id");
const RATE_LIMIT_HEADER: HeaderName = HeaderName::from_static("x-ratelimit-limit");

/// Per-request facts shared by the logging and rate limiting layers.
#[derive(Debug, Clone)]
pub struct RequestContext {
    pub request_id: String,
    /// First path segment: the collection (`products`, `orders`, ...) or `health_check`.
    pub resource: String,
    pub client_ip: IpAddr,
}

impl RequestContext {
    fn from_request(request: &Request<Body>) -> Self {
        let resource = request
            .uri()
            .path()
            .trim_start_matches('/')
            .split('/')
            .next()
            .unwrap_or_default()
            .to_string();
        Self {
            request_id: Uuid::new_v4().to_string(),
            resource,
            client_ip: client_ip(request),
        }
    }
}

/// Proxy headers first, then the peer address.
fn client_ip(request: &Request<Body>) -> IpAddr {
    let header_ip = |name: &str| {
        request
            .headers()
            .get(name)
            .and_then(|value| value.to_str().ok())
            .and_then(|value| value.split(',').next())
            .and_then(|ip| ip.trim().parse::<IpAddr>().ok())
    };

    header_ip("x-forwarded-for")
        .or_else(|| header_ip("x-real-ip"))
        .or_else(|| {
            request
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.ip())
        })
        .unwrap_or(IpAddr::V4(Ipv4Addr::UNSPECIFIED))
}

pub async fn set_request_context(mut request: Request<Body>, next: Next) -> Response {
    let ctx = RequestContext::from_request(&request);
    request.extensions_mut().insert(ctx.clone());

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&ctx.request_id) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response.extensions_mut().insert(ctx);
    response
}

/// Log failed requests using the [`ErrorReport`] the error response carries.
pub async fn log_responses(request: Request<Body>, next: Next) -> Response {
    let method = request.method().clone();
    let uri = request.uri().clone();
    let start = Instant::now();
    let ctx = request.extensions().get::<RequestContext>().cloned();

    let mut response = next.run(request).await;
    let status = response.status();
    if !(status.is_client_error() || status.is_server_error()) {
        return response;
    }

    let elapsed_ms = start.elapsed().as_millis();
    let report = response.extensions_mut().remove::<ErrorReport>();
    let (source, messages) = match report {
        Some(report) => (report.source, report.messages),
        None => ("unknown", Vec::new()),
    };
    let detail = messages
        .first()
        .cloned()
        .unwrap_or_else(|| "no diagnostic available".to_string());
    let (request_id, resource, client_ip) = match &ctx {
        Some(ctx) => (ctx.request_id.as_str(), ctx.resource.as_str(), Some(ctx.client_ip)),
        None => ("", "", None),
    };

    if status.is_server_error() {
        error!(
            target = SOURCE,
            status = status.as_u16(),
            method = %method,
            resource,
            path = %uri.path(),
            elapsed_ms,
            source,
            detail = %detail,
            chain = ?messages,
            request_id,
            client_ip = ?client_ip,
            "request failed",
        );
    } else {
        warn!(
            target = SOURCE,
            status = status.as_u16(),
            method = %method,
            resource,
            path = %uri.path(),
            query = uri.query().unwrap_or(""),
            elapsed_ms,
            source,
            detail = %detail,
            request_id,
            client_ip = ?client_ip,
            "client request error",
        );
    }

    response
}

type ClientLimiter = RateLimiter<NotKeyed, InMemoryState, DefaultClock>;

/// Fixed request budget per client address.
#[derive(Clone)]
pub struct RateLimitState {
    quota: Quota,
    requests: NonZeroU32,
    limiters: Arc<DashMap<IpAddr, Arc<ClientLimiter>>>,
}

impl RateLimitState {
    /// `requests` per `period`, all of which may be spent at once.
    pub fn new(requests: NonZeroU32, period: Duration) -> Self {
        let quota = Quota::with_period(period / requests.get())
            .unwrap_or_else(|| Quota::per_minute(requests))
            .allow_burst(requests);
        Self {
            quota,
            requests,
            limiters: Arc::new(DashMap::new()),
        }
    }

    fn limiter_for(&self, ip: IpAddr) -> Arc<ClientLimiter> {
        self.limiters
            .entry(ip)
            .or_insert_with(|| Arc::new(RateLimiter::direct(self.quota)))
            .clone()
    }
}

impl Default for RateLimitState {
    /// 100 requests per minute.
    fn default() -> Self {
        Self::new(NonZeroU32::MIN.saturating_add(99), Duration::from_secs(60))
    }
}

pub async fn rate_limit(
    State(state): State<RateLimitState>,
    request: Request<Body>,
    next: Next,
) -> Response {
    let ip = request
        .extensions()
        .get::<RequestContext>()
        .map(|ctx| ctx.client_ip)
        .unwrap_or_else(|| client_ip(&request));

    match state.limiter_for(ip).check() {
        Ok(()) => {
            let mut response = next.run(request).await;
            response
                .headers_mut()
                .insert(RATE_LIMIT_HEADER, HeaderValue::from(state.requests.get()));
            response
        }
        Err(not_until) => {
            let retry_after = not_until
                .wait_time_from(DefaultClock::default().now())
                .as_secs()
                .max(1);
            let mut response = ApiError::too_many_requests(retry_after).into_response();
            response
                .headers_mut()
                .insert(RETRY_AFTER, HeaderValue::from(retry_after));
            response
        }
    }
}
