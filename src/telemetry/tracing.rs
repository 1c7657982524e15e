use anyhow::Result;
use opentelemetry::trace::TracerProvider;
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{
    runtime,
    trace::{RandomIdGenerator, Sampler, Tracer},
    Resource,
};
use opentelemetry::KeyValue;
use tracing::info;
use tracing_opentelemetry::OpenTelemetryLayer;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

use crate::config::TelemetryConfig;

/// Tracing configuration
#[derive(Debug, Clone)]
pub struct TracingConfig {
    /// Service name
    pub service_name: String,

    /// Log level
    pub log_level: String,

    /// JSON log format
    pub json_logs: bool,

    /// OTLP endpoint (if set, enables OTEL export)
    pub otlp_endpoint: Option<String>,

    /// Sample rate (0.0 - 1.0)
    pub sample_rate: f64,
}

impl From<&TelemetryConfig> for TracingConfig {
    fn from(config: &TelemetryConfig) -> Self {
        Self {
            log_level: config.log_level.clone(),
            json_logs: config.json_logs,
            otlp_endpoint: config.otlp_endpoint.clone(),
            sample_rate: config.trace_sample_rate,
            ..Self::default()
        }
    }
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            service_name: "smsdesk".to_string(),
            log_level: "info".to_string(),
            json_logs: false,
            otlp_endpoint: None,
            sample_rate: 1.0,
        }
    }
}

/// Initialize tracing with optional OTEL export
pub fn init_tracing(config: &TracingConfig) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directives(&config.log_level)));

    let otel_layer = match config.otlp_endpoint {
        Some(ref endpoint) => Some(OpenTelemetryLayer::new(init_otlp_tracer(config, endpoint)?)),
        None => None,
    };

    // Option<Layer> is a no-op layer when None
    let subscriber = tracing_subscriber::registry().with(env_filter).with(otel_layer);

    if config.json_logs {
        let fmt_layer = fmt::layer()
            .json()
            .with_span_events(FmtSpan::CLOSE)
            .with_current_span(true)
            .with_target(true);
        subscriber.with(fmt_layer).try_init()?;
    } else {
        let fmt_layer = fmt::layer()
            .pretty()
            .with_span_events(FmtSpan::CLOSE)
            .with_target(true);
        subscriber.with(fmt_layer).try_init()?;
    }

    info!(
        service = %config.service_name,
        log_level = %config.log_level,
        json_logs = config.json_logs,
        otlp = config.otlp_endpoint.is_some(),
        "tracing initialized"
    );

    Ok(())
}

/// Initialize OTLP tracer
fn init_otlp_tracer(config: &TracingConfig, endpoint: &str) -> Result<Tracer> {
    let resource = Resource::new([
        KeyValue::new("service.name", config.service_name.clone()),
        KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
    ]);

    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(endpoint)
        .build()?;

    let provider = opentelemetry_sdk::trace::TracerProvider::builder()
        .with_batch_exporter(exporter, runtime::Tokio)
        .with_sampler(sampler_for(config.sample_rate))
        .with_id_generator(RandomIdGenerator::default())
        .with_resource(resource)
        .build();

    let tracer = provider.tracer("smsdesk");
    opentelemetry::global::set_tracer_provider(provider);

    Ok(tracer)
}

/// Filter used when `RUST_LOG` is unset.
///
/// The gateway client's connection pool logs every request at debug, so the
/// HTTP stack stays at warn unless asked for explicitly.
fn default_directives(level: &str) -> String {
    format!("{},hyper=warn,hyper_util=warn,reqwest=warn,h2=warn", level)
}

fn sampler_for(rate: f64) -> Sampler {
    if rate >= 1.0 {
        Sampler::AlwaysOn
    } else if rate <= 0.0 {
        Sampler::AlwaysOff
    } else {
        Sampler::TraceIdRatioBased(rate)
    }
}

/// Shutdown tracing (flush pending spans)
pub fn shutdown_tracing() {
    opentelemetry::global::shutdown_tracer_provider();
    info!("tracing shutdown complete");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_from_telemetry_config() {
        let telemetry = TelemetryConfig {
            log_level: "debug".to_string(),
            json_logs: true,
            otlp_endpoint: None,
            trace_sample_rate: 0.25,
        };

        let config = TracingConfig::from(&telemetry);
        assert_eq!(config.service_name, "smsdesk");
        assert_eq!(config.log_level, "debug");
        assert!(config.json_logs);
        assert_eq!(config.sample_rate, 0.25);
    }

    #[test]
    fn test_default_directives_quiet_http_stack() {
        let directives = default_directives("debug");
        assert!(directives.starts_with("debug,"));
        assert!(directives.contains("reqwest=warn"));
        assert!(EnvFilter::try_new(&directives).is_ok());
    }

    #[test]
    fn test_sampler_for_rate() {
        assert!(matches!(sampler_for(1.0), Sampler::AlwaysOn));
        assert!(matches!(sampler_for(0.0), Sampler::AlwaysOff));
        assert!(matches!(sampler_for(0.1), Sampler::TraceIdRatioBased(r) if r == 0.1));
    }
}
