//! Process-level logging and metrics setup.
//!
//! Nothing here runs implicitly: the hosting application calls
//! [`init_logging`] and, if it wants metrics, [`init_telemetry`] once at
//! startup.

use crate::error::TelemetryError;
use opentelemetry::global;
use opentelemetry_sdk::metrics::MeterProvider;
use prometheus::{Encoder, Registry, TextEncoder};
use tracing::{info, Level};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::EnvFilter;

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` overrides `level`. Output goes to stderr with thread names,
/// so stdout stays free for command output.
pub fn init_logging(level: Level) -> Result<(), TelemetryError> {
    let filter = EnvFilter::builder()
        .with_default_directive(LevelFilter::from_level(level).into())
        .from_env_lossy();

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| TelemetryError::LoggingInit(e.to_string()))
}

pub struct TelemetryConfig {
    pub enable_metrics: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            enable_metrics: true,
        }
    }
}

/// Owns the meter provider and the registry metrics are exported to.
pub struct TelemetryService {
    registry: Registry,
    provider: Option<MeterProvider>,
}

impl TelemetryService {
    pub fn new(config: TelemetryConfig) -> Result<Self, TelemetryError> {
        let registry = Registry::new();

        let provider = if config.enable_metrics {
            let exporter = opentelemetry_prometheus::exporter()
                .with_registry(registry.clone())
                .build()
                .map_err(|e| TelemetryError::MetricsInit(e.to_string()))?;
            let provider = MeterProvider::builder().with_reader(exporter).build();
            global::set_meter_provider(provider.clone());
            Some(provider)
        } else {
            info!("Metrics collection disabled");
            None
        };

        Ok(Self { registry, provider })
    }

    pub fn metrics_enabled(&self) -> bool {
        self.provider.is_some()
    }

    /// Current metrics in the Prometheus text exposition format.
    pub fn render(&self) -> Result<String, TelemetryError> {
        let mut buffer = Vec::new();
        TextEncoder::new()
            .encode(&self.registry.gather(), &mut buffer)
            .map_err(|e| TelemetryError::Export(e.to_string()))?;
        String::from_utf8(buffer).map_err(|e| TelemetryError::Export(e.to_string()))
    }

    pub fn shutdown(self) -> Result<(), TelemetryError> {
        if let Some(provider) = self.provider {
            provider
                .shutdown()
                .map_err(|e| TelemetryError::Export(e.to_string()))?;
        }
        Ok(())
    }
}

// Convenience function to initialize telemetry with default configuration
pub fn init_telemetry() -> Result<TelemetryService, TelemetryError> {
    init_telemetry_with_config(TelemetryConfig::default())
}

pub fn init_telemetry_with_config(config: TelemetryConfig) -> Result<TelemetryService, TelemetryError> {
    let service = TelemetryService::new(config)?;

    // Instruments are bound to whichever provider is global at first use.
    crate::metrics::Metrics::init();

    info!("OpenTelemetry telemetry initialized");
    Ok(service)
}
