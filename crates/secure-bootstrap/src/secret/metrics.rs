//! Provider usage metrics.
//!
//! Instruments are created on the global meter, so they export through
//! whatever pipeline telemetry init installed (or nowhere). Running totals
//! are mirrored in atomics for the health endpoint.

use std::{
    sync::atomic::{AtomicU64, Ordering},
    time::Duration,
};

use opentelemetry::{
    global,
    metrics::{Counter, Histogram, Unit},
    KeyValue,
};

const METER_NAME: &str = "secure-bootstrap";

/// Point-in-time copy of the provider totals.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub secrets_requested: u64,
    pub secrets_stored: u64,
}

pub struct ProviderMetrics {
    requested: Counter<u64>,
    stored: Counter<u64>,
    retrieve_duration: Histogram<f64>,
    attributes: Vec<KeyValue>,
    requested_total: AtomicU64,
    stored_total: AtomicU64,
}

impl ProviderMetrics {
    pub fn new(service_key: &str) -> Self {
        let meter = global::meter(METER_NAME);
        Self {
            requested: meter
                .u64_counter("secrets_requested")
                .with_description("Secret retrievals requested from the provider")
                .init(),
            stored: meter
                .u64_counter("secrets_stored")
                .with_description("Secret writes requested from the provider")
                .init(),
            retrieve_duration: meter
                .f64_histogram("secret_retrieve_duration_seconds")
                .with_description("Time spent serving a secret retrieval")
                .with_unit(Unit::new("s"))
                .init(),
            attributes: vec![KeyValue::new("service", service_key.to_owned())],
            requested_total: AtomicU64::new(0),
            stored_total: AtomicU64::new(0),
        }
    }

    pub fn secret_requested(&self) {
        self.requested.add(1, &self.attributes);
        self.requested_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn secret_stored(&self) {
        self.stored.add(1, &self.attributes);
        self.stored_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_retrieve(&self, elapsed: Duration) {
        self.retrieve_duration
            .record(elapsed.as_secs_f64(), &self.attributes);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            secrets_requested: self.requested_total.load(Ordering::Relaxed),
            secrets_stored: self.stored_total.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_tracks_counts() {
        let metrics = ProviderMetrics::new("core-data");
        metrics.secret_requested();
        metrics.secret_requested();
        metrics.secret_stored();
        metrics.record_retrieve(Duration::from_millis(3));

        assert_eq!(
            metrics.snapshot(),
            MetricsSnapshot {
                secrets_requested: 2,
                secrets_stored: 1,
            }
        );
    }
}
