use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install a global tracing subscriber using the provided logging settings.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .with_target(true)
            .boxed(),
        LogFormat::Compact => fmt::layer().compact().with_target(true).boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| {
            InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
        })
}

/// Register units and help text for the cache metrics. Idempotent.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "storefront_cache_hit_total",
            Unit::Count,
            "Reads served from the cache."
        );
        describe_counter!(
            "storefront_cache_miss_total",
            Unit::Count,
            "Reads that fell through to the store."
        );
        describe_counter!(
            "storefront_cache_decode_error_total",
            Unit::Count,
            "Cached payloads that failed to decode and were treated as misses."
        );
        describe_counter!(
            "storefront_cache_substrate_error_total",
            Unit::Count,
            "Substrate calls that failed or timed out, labelled by operation."
        );
        describe_counter!(
            "storefront_cache_lock_contended_total",
            Unit::Count,
            "Recompute lock attempts that found the lock already held."
        );
        describe_counter!(
            "storefront_cache_invalidated_total",
            Unit::Count,
            "Entries removed by prefix invalidation."
        );
        describe_histogram!(
            "storefront_cache_load_ms",
            Unit::Milliseconds,
            "Loader latency on cache misses in milliseconds."
        );
    });
}
