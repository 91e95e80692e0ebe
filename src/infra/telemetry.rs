use std::sync::Once;

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::cache::METRIC_CACHE_EVICT;
use crate::config::{LogFormat, LoggingSettings};
use crate::pipeline::{
    METRIC_CACHE_HIT, METRIC_CACHE_MISS, METRIC_CACHE_PURGE, METRIC_CACHE_STORE_FAILURE,
    METRIC_GENERATE_MS,
};

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

pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_CACHE_HIT,
            Unit::Count,
            "Total number of requests served from a cached response."
        );
        describe_counter!(
            METRIC_CACHE_MISS,
            Unit::Count,
            "Total number of cacheable requests that ran the pipeline."
        );
        describe_counter!(
            METRIC_CACHE_PURGE,
            Unit::Count,
            "Total number of cached responses removed on request."
        );
        describe_counter!(
            METRIC_CACHE_STORE_FAILURE,
            Unit::Count,
            "Total number of generated responses the backend failed to store."
        );
        describe_counter!(
            METRIC_CACHE_EVICT,
            Unit::Count,
            "Total number of cached responses evicted due to capacity."
        );
        describe_histogram!(
            METRIC_GENERATE_MS,
            Unit::Milliseconds,
            "Pipeline generation latency in milliseconds."
        );
    });
}
