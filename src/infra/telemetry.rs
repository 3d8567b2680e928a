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

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "strato_cache_memory_hit_total",
            Unit::Count,
            "Total number of in-process tier hits."
        );
        describe_counter!(
            "strato_cache_memory_miss_total",
            Unit::Count,
            "Total number of in-process tier misses."
        );
        describe_counter!(
            "strato_cache_remote_hit_total",
            Unit::Count,
            "Total number of distributed tier hits."
        );
        describe_counter!(
            "strato_cache_remote_miss_total",
            Unit::Count,
            "Total number of distributed tier misses."
        );
        describe_counter!(
            "strato_cache_remote_error_total",
            Unit::Count,
            "Total number of distributed tier transport errors."
        );
        describe_counter!(
            "strato_alert_raised_total",
            Unit::Count,
            "Total number of threshold alerts raised."
        );
        describe_counter!(
            "strato_alert_resolved_total",
            Unit::Count,
            "Total number of threshold alerts resolved."
        );
        describe_histogram!(
            "strato_cache_response_ms",
            Unit::Milliseconds,
            "End-to-end get-or-compute latency in milliseconds."
        );
        describe_histogram!(
            "strato_remote_op_ms",
            Unit::Milliseconds,
            "Distributed tier operation latency in milliseconds."
        );
    });
}
