use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use prometheus::{IntCounterVec, Opts, Registry};
use std::sync::OnceLock;

pub static METRICS_HANDLE: OnceLock<PrometheusHandle> = OnceLock::new();
pub static PROMETHEUS_REGISTRY: OnceLock<Registry> = OnceLock::new();
pub static WEBHOOKS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();
pub static PAYMENT_INITIATIONS_TOTAL: OnceLock<IntCounterVec> = OnceLock::new();

pub fn init_metrics() {
    let builder = PrometheusBuilder::new();
    let handle = builder
        .install_recorder()
        .expect("failed to install Prometheus recorder");

    if METRICS_HANDLE.set(handle).is_err() {
        panic!("failed to set metrics handle: already initialized");
    }

    let registry = Registry::new();

    let webhooks_counter = IntCounterVec::new(
        Opts::new(
            "payment_webhooks_total",
            "Provider webhooks received, by reconciliation outcome",
        ),
        &["outcome"],
    )
    .expect("Failed to create payment_webhooks_total metric");

    let initiations_counter = IntCounterVec::new(
        Opts::new(
            "payment_initiations_total",
            "Payment initiations by target kind and result",
        ),
        &["target", "result"],
    )
    .expect("Failed to create payment_initiations_total metric");

    registry
        .register(Box::new(webhooks_counter.clone()))
        .expect("Failed to register payment_webhooks_total");
    registry
        .register(Box::new(initiations_counter.clone()))
        .expect("Failed to register payment_initiations_total");

    PROMETHEUS_REGISTRY
        .set(registry)
        .expect("Failed to set prometheus registry");
    WEBHOOKS_TOTAL
        .set(webhooks_counter)
        .expect("Failed to set payment_webhooks_total");
    PAYMENT_INITIATIONS_TOTAL
        .set(initiations_counter)
        .expect("Failed to set payment_initiations_total");
}

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

/// Count a webhook by how reconciliation ended.
pub fn record_webhook(outcome: &str) {
    if let Some(counter) = WEBHOOKS_TOTAL.get() {
        counter.with_label_values(&[outcome]).inc();
    }
}

/// Count a payment initiation for an order or booking.
pub fn record_initiation(target: &str, result: &str) {
    if let Some(counter) = PAYMENT_INITIATIONS_TOTAL.get() {
        counter.with_label_values(&[target, result]).inc();
    }
}
