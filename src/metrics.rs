use opentelemetry::metrics::{Counter, Histogram};
use opentelemetry::{global, KeyValue};
use std::sync::OnceLock;
use std::time::Instant;

/// OpenTelemetry metrics for storage observability.
///
/// Tracks handle construction, storage operations and their errors.
/// Singleton instance accessed via `Metrics::get()`; until a meter provider
/// is installed the instruments are no-ops.
pub struct Metrics {
    pub handles_opened_total: Counter<u64>,
    pub storage_operations_total: Counter<u64>,
    pub storage_operation_duration: Histogram<f64>,
    pub storage_errors_total: Counter<u64>,
}

static METRICS: OnceLock<Metrics> = OnceLock::new();

impl Metrics {
    pub fn init() -> &'static Self {
        METRICS.get_or_init(|| {
            let meter = global::meter("lsh-store");

            Metrics {
                handles_opened_total: meter
                    .u64_counter("lsh_store_handles_opened_total")
                    .with_description("Total number of storage handles opened")
                    .init(),

                storage_operations_total: meter
                    .u64_counter("lsh_store_operations_total")
                    .with_description("Total number of storage operations")
                    .init(),

                storage_operation_duration: meter
                    .f64_histogram("lsh_store_operation_duration_seconds")
                    .with_description("Storage operation duration in seconds")
                    .init(),

                storage_errors_total: meter
                    .u64_counter("lsh_store_errors_total")
                    .with_description("Total number of storage errors")
                    .init(),
            }
        })
    }

    pub fn get() -> &'static Self {
        Self::init()
    }

    pub fn record_handle_opened(&self, backend: &str) {
        self.handles_opened_total
            .add(1, &[KeyValue::new("backend", backend.to_string())]);
    }

    pub fn record_storage_operation(&self, operation: &str, backend: &str, duration: f64) {
        let labels = &[
            KeyValue::new("operation", operation.to_string()),
            KeyValue::new("backend", backend.to_string()),
        ];
        self.storage_operations_total.add(1, labels);
        self.storage_operation_duration.record(duration, labels);
    }

    pub fn record_storage_error(&self, operation: &str, backend: &str, error_type: &str) {
        let labels = &[
            KeyValue::new("operation", operation.to_string()),
            KeyValue::new("backend", backend.to_string()),
            KeyValue::new("error_type", error_type.to_string()),
        ];
        self.storage_errors_total.add(1, labels);
    }
}

// Timer utility for measuring durations
pub struct Timer {
    start: Instant,
}

impl Default for Timer {
    fn default() -> Self {
        Self::new()
    }
}

impl Timer {
    pub fn new() -> Self {
        Self {
            start: Instant::now(),
        }
    }

    pub fn elapsed_seconds(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}
