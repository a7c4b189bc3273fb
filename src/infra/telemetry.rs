//! Tracing and metrics bootstrap.

use std::path::Path;
use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing::{Subscriber, info};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{self, LogFormat, LoggingSettings, Settings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

/// Load settings and install telemetry from them.
pub fn bootstrap(config_file: Option<&Path>) -> Result<Settings, InfraError> {
    let settings = config::load(config_file)?;
    init(&settings.logging)?;
    info!(
        level = %settings.logging.level,
        cache_enabled = settings.cache.is_enabled(),
        max_notifications_per_channel = settings.notifications.max_notifications_per_channel,
        "Telemetry initialized"
    );
    Ok(settings)
}

/// Install the subscriber from [`subscriber`] as the global default.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();
    subscriber(logging).try_init().map_err(|err| {
        InfraError::telemetry(format!("failed to install tracing subscriber: {err}"))
    })
}

/// Registry with `RUST_LOG` filtering, span traces for errors and a compact
/// or JSON formatter.
///
/// Background flushes and expiry watchers run on runtime workers, so thread
/// ids are part of every line.
pub fn subscriber(logging: &LoggingSettings) -> impl Subscriber + Send + Sync + use<> {
    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    let fmt_layer = match logging.format {
        LogFormat::Json => fmt::layer()
            .json()
            .flatten_event(true)
            .with_current_span(true)
            .with_span_list(false)
            .with_thread_ids(true)
            .boxed(),
        LogFormat::Compact => fmt::layer()
            .compact()
            .with_target(true)
            .with_thread_ids(true)
            .boxed(),
    };

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(fmt_layer)
}

/// Register descriptions for every metric the crate emits. Idempotent.
pub fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        describe_counter!(
            "herald_cache_hit_total",
            Unit::Count,
            "Local cache hits, labelled by namespace."
        );
        describe_counter!(
            "herald_cache_miss_total",
            Unit::Count,
            "Local cache misses, labelled by namespace."
        );
        describe_counter!(
            "herald_cache_evict_total",
            Unit::Count,
            "Local cache evictions due to capacity, labelled by namespace."
        );
        describe_counter!(
            "herald_cache_invalidate_total",
            Unit::Count,
            "Explicit key invalidations and namespace clears, labelled by namespace."
        );
        describe_gauge!(
            "herald_cache_event_queue_len",
            Unit::Count,
            "Current number of pending cache events in the queue."
        );
        describe_histogram!(
            "herald_cache_consume_ms",
            Unit::Milliseconds,
            "Cache consumption latency in milliseconds."
        );
        describe_histogram!(
            "herald_store_call_ms",
            Unit::Milliseconds,
            "Backing store call latency in milliseconds, labelled by store and method."
        );
        describe_counter!(
            "herald_busy_broadcast_failed_total",
            Unit::Count,
            "Busy state broadcasts the cluster transport rejected."
        );
    });
}
