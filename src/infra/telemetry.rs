use std::{io, sync::Once};

use metrics::{Unit, describe_counter, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::application::retrieve::{
    METRIC_CACHE_BYPASS_TOTAL, METRIC_CACHE_ERROR_TOTAL, METRIC_CACHE_HIT_TOTAL,
    METRIC_CACHE_MISS_TOTAL, METRIC_CACHE_POPULATE_TOTAL, METRIC_STORE_EMPTY_TOTAL,
    METRIC_STORE_QUERY_MS,
};
use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Install the global tracing subscriber.
///
/// Events go to stderr; stdout carries command output only. `RUST_LOG`
/// directives refine the configured level.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .with_writer(io::stderr)
            .with_current_span(true)
            .with_span_list(false)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_writer(io::stderr)
            .with_target(false)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
        .try_init()
        .map_err(|err| InfraError::telemetry(format!("tracing subscriber already set: {err}")))
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            METRIC_CACHE_HIT_TOTAL,
            Unit::Count,
            "Total number of retrievals served from the cache."
        );
        describe_counter!(
            METRIC_CACHE_MISS_TOTAL,
            Unit::Count,
            "Total number of cache reads that found no usable entry."
        );
        describe_counter!(
            METRIC_CACHE_BYPASS_TOTAL,
            Unit::Count,
            "Total number of retrievals that skipped the cache read."
        );
        describe_counter!(
            METRIC_CACHE_ERROR_TOTAL,
            Unit::Count,
            "Total number of failed or undecodable cache operations during retrieval."
        );
        describe_counter!(
            METRIC_CACHE_POPULATE_TOTAL,
            Unit::Count,
            "Total number of acknowledged cache writes after a backing-store query."
        );
        describe_counter!(
            METRIC_STORE_EMPTY_TOTAL,
            Unit::Count,
            "Total number of backing-store queries that matched no rows."
        );
        describe_histogram!(
            METRIC_STORE_QUERY_MS,
            Unit::Milliseconds,
            "Backing-store query latency in milliseconds."
        );
    });
}
