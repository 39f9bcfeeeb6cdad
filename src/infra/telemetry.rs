//! Tracing subscriber setup and metric descriptions.

use std::sync::Once;

use metrics::{Unit, describe_counter, describe_gauge, describe_histogram};
use tracing_error::ErrorLayer;
use tracing_subscriber::{
    EnvFilter, fmt,
    layer::{Layer, SubscriberExt},
    util::SubscriberInitExt,
};

use crate::config::{LogFormat, LoggingSettings};

use super::error::InfraError;

static METRIC_DESCRIPTIONS: Once = Once::new();

enum MetricKind {
    Counter,
    Gauge,
    Histogram,
}

const METRICS: &[(&str, MetricKind, Unit, &str)] = &[
    (
        "tripwire_entity_cache_hit_total",
        MetricKind::Counter,
        Unit::Count,
        "Entity cache reads answered from storage.",
    ),
    (
        "tripwire_entity_cache_miss_total",
        MetricKind::Counter,
        Unit::Count,
        "Entity cache reads that found nothing usable, expired entries included.",
    ),
    (
        "tripwire_entity_cache_expired_total",
        MetricKind::Counter,
        Unit::Count,
        "Entity cache reads that found an entry past its expireAt.",
    ),
    (
        "tripwire_entity_cache_evict_total",
        MetricKind::Counter,
        Unit::Count,
        "Entity cache keys dropped, labelled by reason (capacity or invalidation).",
    ),
    (
        "tripwire_origin_fetch_ms",
        MetricKind::Histogram,
        Unit::Milliseconds,
        "Latency of one batched origin fetch.",
    ),
    (
        "tripwire_page_cache_invalidated_total",
        MetricKind::Counter,
        Unit::Count,
        "Rendered pages dropped by invalidation.",
    ),
    (
        "tripwire_tracker_resolve_ms",
        MetricKind::Histogram,
        Unit::Milliseconds,
        "Time spent resolving one dependency closure.",
    ),
    (
        "tripwire_tracker_closure_size",
        MetricKind::Histogram,
        Unit::Count,
        "Entities per resolved dependency closure.",
    ),
    (
        "tripwire_invalidation_queue_len",
        MetricKind::Gauge,
        Unit::Count,
        "Invalidation requests waiting for the consumer.",
    ),
    (
        "tripwire_invalidation_consume_ms",
        MetricKind::Histogram,
        Unit::Milliseconds,
        "Time spent planning and applying one invalidation batch.",
    ),
    (
        "tripwire_invalidation_fallback_total",
        MetricKind::Counter,
        Unit::Count,
        "Batches invalidated with the conservative plan after closure resolution failed.",
    ),
];

/// Install the global tracing subscriber.
///
/// Logs go to stderr so command output on stdout stays machine-readable.
/// `RUST_LOG` directives refine the configured level.
pub fn init(logging: &LoggingSettings) -> Result<(), InfraError> {
    describe_metrics();

    let env_filter = EnvFilter::builder()
        .with_default_directive(logging.level.into())
        .from_env_lossy();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(ErrorLayer::default())
        .with(output_layer(&logging.format))
        .try_init()
        .map_err(|err| InfraError::telemetry(format!("subscriber already installed: {err}")))
}

fn output_layer<S>(format: &LogFormat) -> Box<dyn Layer<S> + Send + Sync>
where
    S: tracing::Subscriber + for<'a> tracing_subscriber::registry::LookupSpan<'a>,
{
    let layer = fmt::layer().with_target(true).with_writer(std::io::stderr);
    match format {
        LogFormat::Json => layer
            .json()
            .with_current_span(true)
            .with_span_list(true)
            .boxed(),
        LogFormat::Compact => layer.compact().boxed(),
    }
}

fn describe_metrics() {
    METRIC_DESCRIPTIONS.call_once(|| {
        for (name, kind, unit, description) in METRICS {
            match kind {
                MetricKind::Counter => describe_counter!(*name, *unit, *description),
                MetricKind::Gauge => describe_gauge!(*name, *unit, *description),
                MetricKind::Histogram => describe_histogram!(*name, *unit, *description),
            }
        }
    });
}
