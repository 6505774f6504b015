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
///
/// Logs go to stderr; stdout is reserved for command output.
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
            .with_writer(std::io::stderr)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(true)
            .with_writer(std::io::stderr)
            .boxed(),
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

/// Register descriptions for every metric the crate emits.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "fetchbind_cache_hit_total",
            Unit::Count,
            "Total number of cache store lookups that found a value."
        );
        describe_counter!(
            "fetchbind_cache_miss_total",
            Unit::Count,
            "Total number of cache store lookups that found nothing."
        );
        describe_counter!(
            "fetchbind_cache_write_total",
            Unit::Count,
            "Total number of values written into the cache store."
        );
        describe_counter!(
            "fetchbind_cache_write_superseded_total",
            Unit::Count,
            "Total number of cache writes dropped because a newer request already wrote."
        );
        describe_counter!(
            "fetchbind_fetch_failure_total",
            Unit::Count,
            "Total number of failed fetch attempts, labelled by failure kind."
        );
        describe_counter!(
            "fetchbind_fetch_discarded_total",
            Unit::Count,
            "Total number of settlements dropped because the binding moved on or detached."
        );
        describe_histogram!(
            "fetchbind_fetch_ms",
            Unit::Milliseconds,
            "Fetch and decode latency in milliseconds."
        );
    });
}
