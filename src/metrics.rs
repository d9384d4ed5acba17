//! # Monitor Metrics
//!
//! Two paths into OpenTelemetry:
//!
//! - [`MetricsSink`]: the port checks use to report platform measurements (queue depths and
//!   the like). [`OtelMetricsSink`] forwards them to the global meter provider.
//! - Instrument constructors for the monitor's own behavior (tick counts, tick duration,
//!   failed checks, hub deliveries), recorded directly by the orchestrator and the hub.
//!
//! [`init_metrics`] installs an OTLP-exporting meter provider when `TELEMETRY_ENABLED=true`.
//! It has to run before the first instrument is created; without it every instrument is a
//! no-op.
//!
//! ## Configuration
//!
//! - `TELEMETRY_ENABLED=true` - enable export
//! - `OTEL_EXPORTER_OTLP_ENDPOINT` - OTLP endpoint (default: http://localhost:4317)
//! - `OTEL_SERVICE_NAME` - service name resource attribute

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::KeyValue;
use opentelemetry_otlp::{MetricExporter, WithExportConfig};
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::{runtime, Resource};
use std::collections::BTreeMap;
use std::sync::OnceLock;
use std::time::Duration;
use tracing::{debug, info, warn};

static MONITOR_METER: OnceLock<Meter> = OnceLock::new();
static METER_PROVIDER: OnceLock<Option<SdkMeterProvider>> = OnceLock::new();

const EXPORT_INTERVAL_SECONDS: u64 = 60;

fn meter() -> &'static Meter {
    MONITOR_METER.get_or_init(|| opentelemetry::global::meter_provider().meter("platform-monitor"))
}

#[derive(Debug, Clone)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub service_name: String,
    pub service_version: String,
    pub deployment_environment: String,
    pub otlp_endpoint: String,
    pub export_interval: Duration,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: std::env::var("TELEMETRY_ENABLED")
                .map(|v| v.eq_ignore_ascii_case("true"))
                .unwrap_or(false),
            service_name: std::env::var("OTEL_SERVICE_NAME")
                .unwrap_or_else(|_| "platform-monitor".to_string()),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            deployment_environment: crate::logging::get_environment(),
            otlp_endpoint: std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
                .unwrap_or_else(|_| "http://localhost:4317".to_string()),
            export_interval: Duration::from_secs(EXPORT_INTERVAL_SECONDS),
        }
    }
}

fn build_meter_provider(
    config: &MetricsConfig,
) -> Result<SdkMeterProvider, Box<dyn std::error::Error>> {
    let resource = Resource::new(vec![
        KeyValue::new("service.name", config.service_name.clone()),
        KeyValue::new("service.version", config.service_version.clone()),
        KeyValue::new(
            "deployment.environment",
            config.deployment_environment.clone(),
        ),
    ]);

    let exporter = MetricExporter::builder()
        .with_tonic()
        .with_endpoint(config.otlp_endpoint.clone())
        .build()?;

    let reader = PeriodicReader::builder(exporter, runtime::Tokio)
        .with_interval(config.export_interval)
        .build();

    Ok(SdkMeterProvider::builder()
        .with_reader(reader)
        .with_resource(resource)
        .build())
}

/// Install the global meter provider; later calls are no-ops
///
/// Returns whether metrics are being exported. Must run inside the Tokio runtime.
pub fn init_metrics() -> bool {
    METER_PROVIDER
        .get_or_init(|| {
            let config = MetricsConfig::default();
            if !config.enabled {
                debug!("Metrics export disabled (TELEMETRY_ENABLED is not true)");
                return None;
            }
            match build_meter_provider(&config) {
                Ok(provider) => {
                    opentelemetry::global::set_meter_provider(provider.clone());
                    info!(
                        service_name = %config.service_name,
                        otlp_endpoint = %config.otlp_endpoint,
                        export_interval_seconds = config.export_interval.as_secs(),
                        "OpenTelemetry metrics initialized"
                    );
                    Some(provider)
                }
                Err(e) => {
                    warn!(error = %e, "Failed to initialize OpenTelemetry metrics, export disabled");
                    None
                }
            }
        })
        .is_some()
}

/// Flush pending measurements and stop the exporter
pub fn shutdown_metrics() {
    if let Some(Some(provider)) = METER_PROVIDER.get() {
        if let Err(e) = provider.shutdown() {
            warn!(error = %e, "Failed to flush metrics on shutdown");
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricKind {
    Gauge,
    Counter,
    Histogram,
}

/// One measurement reported by a check
#[derive(Debug, Clone, PartialEq)]
pub struct Metric {
    pub source: String,
    pub name: String,
    pub value: f64,
    pub kind: MetricKind,
    pub tags: BTreeMap<String, String>,
    pub timestamp: DateTime<Utc>,
}

impl Metric {
    pub fn gauge(source: impl Into<String>, name: impl Into<String>, value: f64) -> Self {
        Self {
            source: source.into(),
            name: name.into(),
            value,
            kind: MetricKind::Gauge,
            tags: BTreeMap::new(),
            timestamp: Utc::now(),
        }
    }

    pub fn with_tag(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.tags.insert(key.into(), value.into());
        self
    }

    pub fn tag(&self, key: &str) -> Option<&str> {
        self.tags.get(key).map(String::as_str)
    }
}

/// Destination for measurements reported by checks
pub trait MetricsSink: Send + Sync {
    fn record(&self, metric: Metric);
}

/// Forwards check measurements to the global OpenTelemetry meter provider
///
/// OpenTelemetry stamps measurements when it collects them, so the reported timestamp is
/// used to order gauge readings instead: a reading older than the last one recorded for the
/// same series is dropped rather than overwriting it.
#[derive(Debug, Default)]
pub struct OtelMetricsSink {
    latest: DashMap<String, DateTime<Utc>>,
}

impl OtelMetricsSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// `name{k=v,...}`; tags are already sorted
    fn series_key(metric: &Metric) -> String {
        let tags: Vec<String> = metric
            .tags
            .iter()
            .map(|(key, value)| format!("{key}={value}"))
            .collect();
        format!("{}:{}{{{}}}", metric.source, metric.name, tags.join(","))
    }

    /// Gauges only move forward in time; counters and histograms always accumulate
    fn accepts(&self, metric: &Metric) -> bool {
        if metric.kind != MetricKind::Gauge {
            return true;
        }
        let mut latest = self
            .latest
            .entry(Self::series_key(metric))
            .or_insert(metric.timestamp);
        if metric.timestamp < *latest {
            return false;
        }
        *latest = metric.timestamp;
        true
    }
}

impl MetricsSink for OtelMetricsSink {
    fn record(&self, metric: Metric) {
        if !self.accepts(&metric) {
            debug!(name = %metric.name, timestamp = %metric.timestamp, "Dropping out-of-order gauge reading");
            return;
        }

        let attributes: Vec<KeyValue> = std::iter::once(KeyValue::new("source", metric.source))
            .chain(
                metric
                    .tags
                    .into_iter()
                    .map(|(key, value)| KeyValue::new(key, value)),
            )
            .collect();

        match metric.kind {
            MetricKind::Gauge => meter()
                .f64_gauge(metric.name)
                .build()
                .record(metric.value, &attributes),
            MetricKind::Counter => meter()
                .f64_counter(metric.name)
                .build()
                .add(metric.value, &attributes),
            MetricKind::Histogram => meter()
                .f64_histogram(metric.name)
                .build()
                .record(metric.value, &attributes),
        }
    }
}

/// Completed orchestrator ticks
///
/// Labels:
/// - state: Healthy, Degraded, Unhealthy
pub fn health_ticks_total() -> Counter<u64> {
    meter()
        .u64_counter("monitor.health.ticks.total")
        .with_description("Total number of health check ticks completed")
        .build()
}

/// Wall-clock duration of one tick in milliseconds
pub fn health_tick_duration() -> Histogram<f64> {
    meter()
        .f64_histogram("monitor.health.tick.duration")
        .with_description("Duration of one health check tick in milliseconds")
        .with_unit("ms")
        .build()
}

/// Checks that raised, panicked or timed out instead of returning a result
///
/// Labels:
/// - check: check description
pub fn check_failures_total() -> Counter<u64> {
    meter()
        .u64_counter("monitor.health.check_failures.total")
        .with_description("Total number of checks that failed to produce a result")
        .build()
}

/// Frames written to live subscribers
pub fn hub_frames_delivered_total() -> Counter<u64> {
    meter()
        .u64_counter("monitor.hub.frames_delivered.total")
        .with_description("Total number of event frames delivered to subscribers")
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_metric_builder() {
        let metric = Metric::gauge("monitor", "gauge.action_queue.queue_size", 12.0)
            .with_tag("queue_name", "transform");
        assert_eq!(metric.kind, MetricKind::Gauge);
        assert_eq!(metric.tag("queue_name"), Some("transform"));
        assert_eq!(metric.tag("missing"), None);
    }

    #[test]
    fn test_otel_sink_without_provider_is_noop() {
        let sink = OtelMetricsSink::new();
        sink.record(Metric::gauge("monitor", "gauge.test", 1.0).with_tag("k", "v"));
        health_ticks_total().add(1, &[KeyValue::new("state", "Healthy")]);
        health_tick_duration().record(1.5, &[]);
    }

    #[test]
    fn test_older_gauge_readings_are_dropped() {
        let sink = OtelMetricsSink::new();
        let now = Utc::now();
        let reading = |value: f64, at: DateTime<Utc>| {
            let mut metric = Metric::gauge("monitor", "gauge.action_queue.queue_size", value)
                .with_tag("queue_name", "transform");
            metric.timestamp = at;
            metric
        };

        assert!(sink.accepts(&reading(3.0, now)));
        assert!(!sink.accepts(&reading(9.0, now - chrono::Duration::seconds(5))));
        assert!(sink.accepts(&reading(4.0, now + chrono::Duration::seconds(5))));

        // other series are ordered independently
        let mut other = reading(1.0, now - chrono::Duration::seconds(60));
        other.tags.insert("queue_name".to_string(), "egress".to_string());
        assert!(sink.accepts(&other));
    }

    #[test]
    fn test_counters_are_never_dropped() {
        let sink = OtelMetricsSink::new();
        let mut metric = Metric::gauge("monitor", "counter.test", 1.0);
        metric.kind = MetricKind::Counter;
        let older = Metric {
            timestamp: metric.timestamp - chrono::Duration::seconds(10),
            ..metric.clone()
        };
        assert!(sink.accepts(&metric));
        assert!(sink.accepts(&older));
    }

    #[test]
    fn test_metrics_disabled_by_default() {
        if std::env::var("TELEMETRY_ENABLED").is_err() {
            assert!(!MetricsConfig::default().enabled);
        }
    }
}
