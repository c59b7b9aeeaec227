//! Metrics for blob operations.
//!
//! Every series carries `op` and `backend` labels; the error counter adds
//! the error `kind`.

use std::time::Instant;

use opentelemetry::{
    KeyValue,
    metrics::{Counter, Histogram, Meter},
};

use crate::BlobError;

/// Instruments recorded by the [`Blobs`](crate::Blobs) facade.
#[derive(Clone)]
pub struct BlobMetrics {
    /// Operation latency in seconds.
    pub operations: Histogram<f64>,

    /// Failed operations.
    pub errors: Counter<u64>,

    /// Payload bytes accepted by successful writes.
    pub bytes_written: Counter<u64>,
}

impl BlobMetrics {
    pub fn new(meter: &Meter) -> Self {
        let operations = meter
            .f64_histogram("blob_storage_operation_duration_seconds")
            .with_description("Duration of blob storage operations in seconds")
            .build();

        let errors = meter
            .u64_counter("blob_storage_errors_total")
            .with_description("Total number of blob storage errors")
            .build();

        let bytes_written = meter
            .u64_counter("blob_storage_bytes_written_total")
            .with_description("Total number of payload bytes written")
            .build();

        Self {
            operations,
            errors,
            bytes_written,
        }
    }

    pub(crate) fn labels(op: &'static str, backend: &'static str) -> [KeyValue; 2] {
        [KeyValue::new("op", op), KeyValue::new("backend", backend)]
    }

    pub(crate) fn record_error(&self, labels: &[KeyValue], err: &BlobError) {
        let mut labels = labels.to_vec();
        labels.push(KeyValue::new("kind", err.kind()));
        self.errors.add(1, &labels);
    }

    pub(crate) fn record_written(&self, labels: &[KeyValue], bytes: u64) {
        self.bytes_written.add(bytes, labels);
    }
}

/// Records the elapsed time into a histogram when dropped, so early returns
/// are measured too.
pub struct Timer {
    start: Instant,
    histogram: Histogram<f64>,
    labels: Vec<KeyValue>,
}

impl Timer {
    pub fn start_with_labels(histogram: &Histogram<f64>, labels: &[KeyValue]) -> Self {
        Self {
            start: Instant::now(),
            histogram: histogram.clone(),
            labels: labels.to_vec(),
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        self.histogram
            .record(self.start.elapsed().as_secs_f64(), &self.labels);
    }
}
