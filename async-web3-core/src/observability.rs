//! OpenTelemetry and tracing bootstrap
//!
//! The client instruments itself with `tracing` spans/events and, when a
//! `ClientMetrics` instance is attached, OpenTelemetry instruments. Neither
//! goes anywhere until the application installs a subscriber and providers.
//! `init_observability` does both in one call:
//!
//! - a tracer provider exporting spans over OTLP/gRPC
//! - a meter provider exporting metrics every 30 seconds over OTLP/gRPC
//! - a `tracing-subscriber` registry with an `EnvFilter`, the OpenTelemetry
//!   layer and a JSON fmt layer
//!
//! ```rust,no_run
//! use async_web3_core::ObservabilityConfig;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = ObservabilityConfig::new("block-watcher")
//!         .with_endpoint("http://localhost:4317")
//!         .with_log_level("debug");
//!
//!     async_web3_core::init_observability(config).expect("Failed to init observability");
//!     // ... run the application ...
//!     async_web3_core::shutdown_observability();
//! }
//! ```
//!
//! # Environment Variables
//!
//! - `OTEL_EXPORTER_OTLP_ENDPOINT`: collector endpoint
//! - `RUST_LOG`: log filter (takes precedence over `log_level`)

use opentelemetry::trace::TracerProvider as _;
use opentelemetry::{global, KeyValue};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::metrics::{PeriodicReader, SdkMeterProvider};
use opentelemetry_sdk::trace::{Sampler, SdkTracerProvider};
use opentelemetry_sdk::Resource;
use opentelemetry_semantic_conventions::resource::SERVICE_VERSION;
use std::sync::Mutex;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Interval between metric exports
const METRICS_EXPORT_INTERVAL: Duration = Duration::from_secs(30);

/// Observability configuration
///
/// # Defaults
///
/// - Service name: "async-web3"
/// - Service version: the crate version
/// - OTLP endpoint: `$OTEL_EXPORTER_OTLP_ENDPOINT` or "http://localhost:4317"
/// - Traces, metrics and logs enabled
/// - Log level: `$RUST_LOG` or "info"
///
/// ```rust
/// use async_web3_core::ObservabilityConfig;
///
/// let config = ObservabilityConfig::new("indexer")
///     .with_endpoint("http://collector:4317")
///     .with_metrics(false);
/// assert!(!config.enable_metrics);
/// ```
#[derive(Debug, Clone)]
pub struct ObservabilityConfig {
    /// Service name attached to every span and metric
    pub service_name: String,
    /// Service version attached to every span and metric
    pub service_version: String,
    /// OTLP gRPC endpoint of the collector
    pub otlp_endpoint: String,
    /// Export spans
    pub enable_traces: bool,
    /// Export metrics
    pub enable_metrics: bool,
    /// Emit JSON logs on stdout
    pub enable_logs: bool,
    /// `EnvFilter` directive used when `RUST_LOG` is unset
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            service_name: "async-web3".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            otlp_endpoint: std::env::var("OTEL_EXPORTER_OTLP_ENDPOINT")
                .unwrap_or_else(|_| "http://localhost:4317".to_string()),
            enable_traces: true,
            enable_metrics: true,
            enable_logs: true,
            log_level: std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string()),
        }
    }
}

impl ObservabilityConfig {
    /// Create a configuration with a custom service name
    pub fn new(service_name: impl Into<String>) -> Self {
        Self {
            service_name: service_name.into(),
            ..Default::default()
        }
    }

    /// Set the OTLP collector endpoint
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.otlp_endpoint = endpoint.into();
        self
    }

    /// Set the log level filter
    pub fn with_log_level(mut self, level: impl Into<String>) -> Self {
        self.log_level = level.into();
        self
    }

    /// Set the service version
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.service_version = version.into();
        self
    }

    /// Enable or disable span export
    pub fn with_traces(mut self, enable: bool) -> Self {
        self.enable_traces = enable;
        self
    }

    /// Enable or disable metric export
    pub fn with_metrics(mut self, enable: bool) -> Self {
        self.enable_metrics = enable;
        self
    }

    /// Enable or disable the stdout JSON log layer
    pub fn with_logs(mut self, enable: bool) -> Self {
        self.enable_logs = enable;
        self
    }

    fn resource(&self) -> Resource {
        Resource::builder()
            .with_service_name(self.service_name.clone())
            .with_attributes([
                KeyValue::new(SERVICE_VERSION, self.service_version.clone()),
                KeyValue::new("rpc.system", "jsonrpc"),
            ])
            .build()
    }
}

type InitResult<T> = std::result::Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Providers installed by `init_observability`, kept for shutdown
#[derive(Default)]
struct Providers {
    tracer: Option<SdkTracerProvider>,
    meter: Option<SdkMeterProvider>,
}

static INSTALLED: Mutex<Option<Providers>> = Mutex::new(None);

/// Install providers and the tracing subscriber
///
/// Call once at startup. A second call fails (the global subscriber is
/// already set) instead of panicking.
pub fn init_observability(config: ObservabilityConfig) -> InitResult<()> {
    let resource = config.resource();
    let mut providers = Providers::default();

    let tracer = if config.enable_traces {
        let provider = span_pipeline(&config, resource.clone())?;
        // The otel layer needs its tracer before the provider goes global.
        let tracer = provider.tracer(config.service_name.clone());
        global::set_tracer_provider(provider.clone());
        providers.tracer = Some(provider);
        Some(tracer)
    } else {
        None
    };

    if config.enable_metrics {
        let provider = metric_pipeline(&config, resource)?;
        global::set_meter_provider(provider.clone());
        providers.meter = Some(provider);
    }

    let env_filter =
        EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&config.log_level))?;
    let telemetry_layer = tracer.map(|tracer| tracing_opentelemetry::layer().with_tracer(tracer));
    let fmt_layer = config.enable_logs.then(|| {
        tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_line_number(true)
            .json()
    });

    tracing_subscriber::registry()
        .with(telemetry_layer)
        .with(env_filter)
        .with(fmt_layer)
        .try_init()?;

    if let Ok(mut installed) = INSTALLED.lock() {
        *installed = Some(providers);
    }

    tracing::info!(
        service_name = %config.service_name,
        otlp_endpoint = %config.otlp_endpoint,
        traces = config.enable_traces,
        metrics = config.enable_metrics,
        "Observability initialized"
    );
    Ok(())
}

fn span_pipeline(config: &ObservabilityConfig, resource: Resource) -> InitResult<SdkTracerProvider> {
    let exporter = opentelemetry_otlp::SpanExporter::builder()
        .with_tonic()
        .with_endpoint(config.otlp_endpoint.clone())
        .build()?;

    Ok(SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(resource)
        .with_sampler(Sampler::ParentBased(Box::new(Sampler::AlwaysOn)))
        .build())
}

fn metric_pipeline(config: &ObservabilityConfig, resource: Resource) -> InitResult<SdkMeterProvider> {
    let exporter = opentelemetry_otlp::MetricExporter::builder()
        .with_tonic()
        .with_endpoint(config.otlp_endpoint.clone())
        .build()?;

    let reader = PeriodicReader::builder(exporter)
        .with_interval(METRICS_EXPORT_INTERVAL)
        .build();

    Ok(SdkMeterProvider::builder()
        .with_reader(reader)
        .with_resource(resource)
        .build())
}

/// Flush pending spans and metrics, then shut the providers down
///
/// No-op when `init_observability` never ran or exported nothing.
pub fn shutdown_observability() {
    let providers = match INSTALLED.lock() {
        Ok(mut installed) => installed.take(),
        Err(_) => None,
    };
    let Some(providers) = providers else {
        return;
    };

    tracing::info!("Shutting down observability");
    if let Some(tracer) = providers.tracer {
        if let Err(e) = tracer.shutdown() {
            tracing::warn!(error = %e, "Tracer provider shutdown failed");
        }
    }
    if let Some(meter) = providers.meter {
        if let Err(e) = meter.shutdown() {
            tracing::warn!(error = %e, "Meter provider shutdown failed");
        }
    }
}
