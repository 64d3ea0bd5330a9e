//! Metrics collection for push-relay-service.

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use prometheus::{IntCounterVec, Opts, Registry};
use std::sync::OnceLock;

pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
pub static PROMETHEUS_REGISTRY: OnceLock<Registry> = OnceLock::new();
pub static RELAY_DISPATCH_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static PROVIDER_CALLS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

/// Initialize metrics collection. Call once at process start.
pub fn init_metrics() {
    let builder = PrometheusBuilder::new();
    let handle = builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    if METRICS_HANDLE.set(handle).is_err() {
        panic!("failed to set metrics handle: already initialized");
    }

    let registry = Registry::new();

    let dispatch_counter = IntCounterVec::new(
        Opts::new(
            "relay_dispatch_total",
            "Relay dispatches by target kind and status",
        ),
        &["target", "status"],
    )
    .expect("Failed to create relay_dispatch_total metric");

    let provider_calls_counter = IntCounterVec::new(
        Opts::new(
            "relay_provider_calls_total",
            "Provider API calls by provider and status",
        ),
        &["provider", "status"],
    )
    .expect("Failed to create relay_provider_calls_total metric");

    registry
        .register(Box::new(dispatch_counter.clone()))
        .expect("Failed to register relay_dispatch_total");
    registry
        .register(Box::new(provider_calls_counter.clone()))
        .expect("Failed to register relay_provider_calls_total");

    PROMETHEUS_REGISTRY
        .set(registry)
        .expect("Failed to set prometheus registry");
    RELAY_DISPATCH_TOTAL
        .set(dispatch_counter)
        .expect("Failed to set relay_dispatch_total");
    PROVIDER_CALLS_TOTAL
        .set(provider_calls_counter)
        .expect("Failed to set relay_provider_calls_total");
}

/// Get metrics output in Prometheus text format.
pub fn get_metrics() -> String {
    let mut output = METRICS_HANDLE
        .get()
        .map(|handle| handle.render())
        .unwrap_or_else(|| "# Metrics recorder not initialized\n".to_string());

    if let Some(registry) = PROMETHEUS_REGISTRY.get() {
        use prometheus::Encoder;
        let encoder = prometheus::TextEncoder::new();
        let metric_families = registry.gather();
        let mut buffer = Vec::new();
        encoder.encode(&metric_families, &mut buffer).ok();
        if let Ok(custom_metrics) = String::from_utf8(buffer) {
            output.push_str(&custom_metrics);
        }
    }

    output
}

/// Record one dispatch through the relay endpoint.
pub fn record_dispatch(target: &str, status: &str) {
    if let Some(counter) = RELAY_DISPATCH_TOTAL.get() {
        counter.with_label_values(&[target, status]).inc();
    }
}

/// Record a provider API call.
pub fn record_provider_call(provider: &str, status: &str) {
    if let Some(counter) = PROVIDER_CALLS_TOTAL.get() {
        counter.with_label_values(&[provider, status]).inc();
    }
}
