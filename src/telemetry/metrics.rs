use anyhow::Result;
use opentelemetry::metrics::MeterProvider;
use opentelemetry_prometheus::exporter;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use prometheus::{Encoder, Registry, TextEncoder};
use std::sync::{Arc, Mutex};
use tracing::{info, warn};

/// Process-wide metrics. [`counters`] binds to the first meter provider it
/// sees, so there is exactly one registry to render.
static GLOBAL: Mutex<Option<Arc<Metrics>>> = Mutex::new(None);

/// OTEL metrics with a Prometheus exporter
///
/// Lives for the whole process; the pull exporter holds nothing to flush.
pub struct Metrics {
    registry: Registry,
}

impl std::fmt::Debug for Metrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Metrics").finish_non_exhaustive()
    }
}

impl Metrics {
    /// Process-wide metrics, built with the OTEL → Prometheus pipeline and
    /// the crate's instruments on first use.
    pub fn global() -> Result<Arc<Self>> {
        let mut slot = GLOBAL.lock().unwrap_or_else(|e| e.into_inner());
        if let Some(metrics) = slot.as_ref() {
            return Ok(metrics.clone());
        }

        let metrics = Arc::new(Self::build()?);
        *slot = Some(metrics.clone());
        Ok(metrics)
    }

    fn build() -> Result<Self> {
        let registry = Registry::new();

        let exporter = exporter().with_registry(registry.clone()).build()?;

        let meter_provider = SdkMeterProvider::builder().with_reader(exporter).build();

        counters::init(&meter_provider.meter("smsdesk"));
        opentelemetry::global::set_meter_provider(meter_provider);

        info!("OTEL metrics configured with Prometheus exporter");

        Ok(Self { registry })
    }

    /// Render metrics in Prometheus text format
    pub fn render(&self) -> String {
        let encoder = TextEncoder::new();
        let metric_families = self.registry.gather();

        let mut buffer = Vec::new();
        if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
            warn!(error = %e, "failed to encode metrics");
            return String::new();
        }

        String::from_utf8_lossy(&buffer).into_owned()
    }
}

/// Service metrics with smsdesk_* prefix.
///
/// Recording functions are no-ops until [`init`] has run, so library code
/// can record unconditionally.
pub mod counters {
    use opentelemetry::metrics::{Counter, Gauge, Histogram};
    use opentelemetry::KeyValue;
    use std::sync::OnceLock;

    // ============================================================================
    // GATEWAY METRICS
    // ============================================================================

    static GATEWAY_REQUESTS_TOTAL: OnceLock<Counter<u64>> = OnceLock::new();
    static GATEWAY_REQUEST_DURATION: OnceLock<Histogram<f64>> = OnceLock::new();
    static GATEWAY_RECORDS_DROPPED_TOTAL: OnceLock<Counter<u64>> = OnceLock::new();

    // ============================================================================
    // FETCH / CACHE METRICS
    // ============================================================================

    static PAGES_FETCHED_TOTAL: OnceLock<Counter<u64>> = OnceLock::new();
    static CACHE_REFRESHES_TOTAL: OnceLock<Counter<u64>> = OnceLock::new();
    static CACHE_RECORDS: OnceLock<Gauge<i64>> = OnceLock::new();

    // ============================================================================
    // API METRICS
    // ============================================================================

    static LIST_REQUESTS_TOTAL: OnceLock<Counter<u64>> = OnceLock::new();
    static SMS_SENT_TOTAL: OnceLock<Counter<u64>> = OnceLock::new();

    /// Register all instruments on `meter`. Later calls are ignored.
    pub fn init(meter: &opentelemetry::metrics::Meter) {
        let _ = GATEWAY_REQUESTS_TOTAL.set(
            meter
                .u64_counter("smsdesk_gateway_requests_total")
                .with_description("Gateway requests by operation and result")
                .build(),
        );
        let _ = GATEWAY_REQUEST_DURATION.set(
            meter
                .f64_histogram("smsdesk_gateway_request_duration_seconds")
                .with_description("Gateway request latency")
                .build(),
        );
        let _ = GATEWAY_RECORDS_DROPPED_TOTAL.set(
            meter
                .u64_counter("smsdesk_gateway_records_dropped_total")
                .with_description("Wire records dropped for missing number or timestamp")
                .build(),
        );

        let _ = PAGES_FETCHED_TOTAL.set(
            meter
                .u64_counter("smsdesk_pages_fetched_total")
                .with_description("History pages fetched by direction")
                .build(),
        );
        let _ = CACHE_REFRESHES_TOTAL.set(
            meter
                .u64_counter("smsdesk_cache_refreshes_total")
                .with_description("Cache refreshes by direction and result")
                .build(),
        );
        let _ = CACHE_RECORDS.set(
            meter
                .i64_gauge("smsdesk_cache_records")
                .with_description("Records held in the cache per direction")
                .build(),
        );

        let _ = LIST_REQUESTS_TOTAL.set(
            meter
                .u64_counter("smsdesk_list_requests_total")
                .with_description("History list requests by endpoint and source")
                .build(),
        );
        let _ = SMS_SENT_TOTAL.set(
            meter
                .u64_counter("smsdesk_sms_sent_total")
                .with_description("Per-recipient sends by result")
                .build(),
        );
    }

    pub fn gateway_request(operation: &str, result: &str, duration_secs: f64) {
        if let Some(c) = GATEWAY_REQUESTS_TOTAL.get() {
            c.add(1, &[kv("operation", operation), kv("result", result)]);
        }
        if let Some(h) = GATEWAY_REQUEST_DURATION.get() {
            h.record(duration_secs, &[kv("operation", operation)]);
        }
    }

    pub fn gateway_records_dropped(direction: &str, count: u64) {
        if let Some(c) = GATEWAY_RECORDS_DROPPED_TOTAL.get() {
            c.add(count, &[kv("direction", direction)]);
        }
    }

    pub fn page_fetched(direction: &str) {
        if let Some(c) = PAGES_FETCHED_TOTAL.get() {
            c.add(1, &[kv("direction", direction)]);
        }
    }

    pub fn cache_refresh(direction: &str, result: &str) {
        if let Some(c) = CACHE_REFRESHES_TOTAL.get() {
            c.add(1, &[kv("direction", direction), kv("result", result)]);
        }
    }

    pub fn cache_records_set(direction: &str, count: i64) {
        if let Some(g) = CACHE_RECORDS.get() {
            g.record(count, &[kv("direction", direction)]);
        }
    }

    pub fn list_request(endpoint: &str, source: &str) {
        if let Some(c) = LIST_REQUESTS_TOTAL.get() {
            c.add(1, &[kv("endpoint", endpoint), kv("source", source)]);
        }
    }

    pub fn sms_sent(result: &str) {
        if let Some(c) = SMS_SENT_TOTAL.get() {
            c.add(1, &[kv("result", result)]);
        }
    }

    fn kv(key: &'static str, value: &str) -> KeyValue {
        KeyValue::new(key, value.to_string())
    }
}
