//! Concurrent engine counters and gauges.
//!
//! All counters are monotonic except through [`EngineMetrics::reset`].
//! Exporting this state (JMX, Prometheus, health endpoints) is the host's
//! concern; the engine only maintains it.

use chrono::Utc;
use once_cell::sync::Lazy;
use serde::Serialize;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

static GLOBAL: Lazy<EngineMetrics> = Lazy::new(EngineMetrics::new);

#[derive(Debug, Default)]
pub struct EngineMetrics {
    records_processed: AtomicU64,
    records_failed: AtomicU64,
    records_skipped: AtomicU64,
    mapping_misses: AtomicU64,
    required_field_misses: AtomicU64,
    encrypt_calls: AtomicU64,
    mask_calls: AtomicU64,
    reload_successes: AtomicU64,
    reload_failures: AtomicU64,
    last_latency_micros: AtomicU64,
    max_latency_micros: AtomicU64,
    last_reload_unix_ms: AtomicU64,
}

/// Point-in-time copy of all metric values
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MetricsSnapshot {
    pub records_processed: u64,
    pub records_failed: u64,
    pub records_skipped: u64,
    pub mapping_misses: u64,
    pub required_field_misses: u64,
    pub encrypt_calls: u64,
    pub mask_calls: u64,
    pub reload_successes: u64,
    pub reload_failures: u64,
    pub last_latency_micros: u64,
    pub max_latency_micros: u64,
    pub last_reload_unix_ms: u64,
}

impl EngineMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// The process-wide metrics instance
    pub fn global() -> &'static EngineMetrics {
        &GLOBAL
    }

    pub fn record_success(&self, latency: Duration) {
        let micros = latency.as_micros() as u64;
        self.records_processed.fetch_add(1, Ordering::Relaxed);
        self.last_latency_micros.store(micros, Ordering::Relaxed);
        self.max_latency_micros.fetch_max(micros, Ordering::Relaxed);
    }

    pub fn record_failure(&self) {
        self.records_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_skipped(&self) {
        self.records_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_mapping_miss(&self) {
        self.mapping_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_required_field_miss(&self) {
        self.required_field_misses.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_encrypt_call(&self) {
        self.encrypt_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_mask_call(&self) {
        self.mask_calls.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_reload_success(&self) {
        self.reload_successes.fetch_add(1, Ordering::Relaxed);
        self.last_reload_unix_ms
            .store(Utc::now().timestamp_millis() as u64, Ordering::Relaxed);
    }

    pub fn record_reload_failure(&self) {
        self.reload_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            records_processed: self.records_processed.load(Ordering::Relaxed),
            records_failed: self.records_failed.load(Ordering::Relaxed),
            records_skipped: self.records_skipped.load(Ordering::Relaxed),
            mapping_misses: self.mapping_misses.load(Ordering::Relaxed),
            required_field_misses: self.required_field_misses.load(Ordering::Relaxed),
            encrypt_calls: self.encrypt_calls.load(Ordering::Relaxed),
            mask_calls: self.mask_calls.load(Ordering::Relaxed),
            reload_successes: self.reload_successes.load(Ordering::Relaxed),
            reload_failures: self.reload_failures.load(Ordering::Relaxed),
            last_latency_micros: self.last_latency_micros.load(Ordering::Relaxed),
            max_latency_micros: self.max_latency_micros.load(Ordering::Relaxed),
            last_reload_unix_ms: self.last_reload_unix_ms.load(Ordering::Relaxed),
        }
    }

    /// Reset every value to zero
    pub fn reset(&self) {
        self.records_processed.store(0, Ordering::Relaxed);
        self.records_failed.store(0, Ordering::Relaxed);
        self.records_skipped.store(0, Ordering::Relaxed);
        self.mapping_misses.store(0, Ordering::Relaxed);
        self.required_field_misses.store(0, Ordering::Relaxed);
        self.encrypt_calls.store(0, Ordering::Relaxed);
        self.mask_calls.store(0, Ordering::Relaxed);
        self.reload_successes.store(0, Ordering::Relaxed);
        self.reload_failures.store(0, Ordering::Relaxed);
        self.last_latency_micros.store(0, Ordering::Relaxed);
        self.max_latency_micros.store(0, Ordering::Relaxed);
        self.last_reload_unix_ms.store(0, Ordering::Relaxed);
    }
}
