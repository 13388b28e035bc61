//! Observability and Metrics
//!
//! Process-wide counters for job calls, wire traffic and result files.
//!
//! Uses atomic counters for thread-safe metrics collection.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::{debug, info};

/// Global metrics collector for job calls
#[derive(Debug)]
pub struct Metrics {
    /// Total calls started
    pub calls_total: AtomicU64,
    /// Calls that completed with return code 0
    pub calls_succeeded: AtomicU64,
    /// Calls that completed with a non-zero return code
    pub calls_remote_failed: AtomicU64,
    /// Calls that failed locally or on the wire
    pub calls_failed: AtomicU64,
    /// Total bytes written, digest trailers included
    pub bytes_sent: AtomicU64,
    /// Total bytes read from verified responses
    pub bytes_received: AtomicU64,
    /// Attached files streamed to servers
    pub files_sent: AtomicU64,
    /// Result files spooled to disk
    pub files_spooled: AtomicU64,
    /// Result files held in memory
    pub files_buffered: AtomicU64,
    /// Responses rejected by the digest check
    pub digest_mismatches: AtomicU64,
    /// Wall time spent inside finished calls, in microseconds
    pub call_micros_total: AtomicU64,
    /// Start time for uptime calculation
    start_time: Instant,
}

impl Metrics {
    /// Create a new metrics collector
    pub fn new() -> Self {
        Self {
            calls_total: AtomicU64::new(0),
            calls_succeeded: AtomicU64::new(0),
            calls_remote_failed: AtomicU64::new(0),
            calls_failed: AtomicU64::new(0),
            bytes_sent: AtomicU64::new(0),
            bytes_received: AtomicU64::new(0),
            files_sent: AtomicU64::new(0),
            files_spooled: AtomicU64::new(0),
            files_buffered: AtomicU64::new(0),
            digest_mismatches: AtomicU64::new(0),
            call_micros_total: AtomicU64::new(0),
            start_time: Instant::now(),
        }
    }

    pub fn call_started(&self) {
        self.calls_total.fetch_add(1, Ordering::Relaxed);
    }

    pub fn call_succeeded(&self) {
        self.calls_succeeded.fetch_add(1, Ordering::Relaxed);
    }

    pub fn call_remote_failed(&self) {
        self.calls_remote_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn call_failed(&self) {
        self.calls_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn bytes_sent(&self, byte_count: u64) {
        self.bytes_sent.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn bytes_received(&self, byte_count: u64) {
        self.bytes_received.fetch_add(byte_count, Ordering::Relaxed);
    }

    pub fn file_sent(&self) {
        self.files_sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn file_spooled(&self) {
        self.files_spooled.fetch_add(1, Ordering::Relaxed);
    }

    pub fn file_buffered(&self) {
        self.files_buffered.fetch_add(1, Ordering::Relaxed);
    }

    pub fn digest_mismatch(&self) {
        self.digest_mismatches.fetch_add(1, Ordering::Relaxed);
    }

    pub fn call_time(&self, elapsed: Duration) {
        let micros = u64::try_from(elapsed.as_micros()).unwrap_or(u64::MAX);
        self.call_micros_total.fetch_add(micros, Ordering::Relaxed);
    }

    /// Get current metrics snapshot
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            calls_total: self.calls_total.load(Ordering::Relaxed),
            calls_succeeded: self.calls_succeeded.load(Ordering::Relaxed),
            calls_remote_failed: self.calls_remote_failed.load(Ordering::Relaxed),
            calls_failed: self.calls_failed.load(Ordering::Relaxed),
            bytes_sent: self.bytes_sent.load(Ordering::Relaxed),
            bytes_received: self.bytes_received.load(Ordering::Relaxed),
            files_sent: self.files_sent.load(Ordering::Relaxed),
            files_spooled: self.files_spooled.load(Ordering::Relaxed),
            files_buffered: self.files_buffered.load(Ordering::Relaxed),
            digest_mismatches: self.digest_mismatches.load(Ordering::Relaxed),
            call_micros_total: self.call_micros_total.load(Ordering::Relaxed),
            uptime_seconds: self.start_time.elapsed().as_secs(),
        }
    }

    /// Log current metrics
    pub fn log_metrics(&self) {
        let snapshot = self.snapshot();
        info!(
            calls_total = snapshot.calls_total,
            calls_succeeded = snapshot.calls_succeeded,
            calls_remote_failed = snapshot.calls_remote_failed,
            calls_failed = snapshot.calls_failed,
            bytes_sent = snapshot.bytes_sent,
            bytes_received = snapshot.bytes_received,
            files_sent = snapshot.files_sent,
            files_spooled = snapshot.files_spooled,
            files_buffered = snapshot.files_buffered,
            digest_mismatches = snapshot.digest_mismatches,
            mean_call_micros = snapshot.mean_call_micros().unwrap_or(0),
            uptime_seconds = snapshot.uptime_seconds,
            "Job metrics snapshot"
        );
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Self::new()
    }
}

/// Snapshot of metrics at a point in time
#[derive(Debug, Clone)]
pub struct MetricsSnapshot {
    pub calls_total: u64,
    pub calls_succeeded: u64,
    pub calls_remote_failed: u64,
    pub calls_failed: u64,
    pub bytes_sent: u64,
    pub bytes_received: u64,
    pub files_sent: u64,
    pub files_spooled: u64,
    pub files_buffered: u64,
    pub digest_mismatches: u64,
    pub call_micros_total: u64,
    pub uptime_seconds: u64,
}

impl MetricsSnapshot {
    /// Calls that ran to an outcome, whatever it was
    pub fn calls_finished(&self) -> u64 {
        self.calls_succeeded + self.calls_remote_failed + self.calls_failed
    }

    /// Average wall time per finished call
    pub fn mean_call_micros(&self) -> Option<u64> {
        self.call_micros_total.checked_div(self.calls_finished())
    }
}

static METRICS: once_cell::sync::Lazy<Metrics> = once_cell::sync::Lazy::new(Metrics::new);

/// Get the global metrics instance
pub fn global_metrics() -> &'static Metrics {
    &METRICS
}

/// Logs the duration of an operation when dropped
pub struct Timer {
    start: Instant,
    operation: &'static str,
    records_call: bool,
}

impl Timer {
    pub fn start(operation: &'static str) -> Self {
        Self {
            start: Instant::now(),
            operation,
            records_call: false,
        }
    }

    /// Timer for one job call; its duration also feeds `call_micros_total`
    pub fn call() -> Self {
        Self {
            start: Instant::now(),
            operation: "job_call",
            records_call: true,
        }
    }
}

impl Drop for Timer {
    fn drop(&mut self) {
        let duration = self.start.elapsed();
        if self.records_call {
            global_metrics().call_time(duration);
        }
        debug!(
            operation = self.operation,
            duration_ms = duration.as_millis(),
            "Operation completed"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_accumulate() {
        let metrics = Metrics::new();
        metrics.call_started();
        metrics.call_started();
        metrics.call_succeeded();
        metrics.call_remote_failed();
        metrics.bytes_sent(100);
        metrics.bytes_sent(28);
        metrics.file_spooled();
        metrics.digest_mismatch();

        let snap = metrics.snapshot();
        assert_eq!(snap.calls_total, 2);
        assert_eq!(snap.calls_succeeded, 1);
        assert_eq!(snap.calls_remote_failed, 1);
        assert_eq!(snap.calls_failed, 0);
        assert_eq!(snap.bytes_sent, 128);
        assert_eq!(snap.files_spooled, 1);
        assert_eq!(snap.files_buffered, 0);
        assert_eq!(snap.digest_mismatches, 1);
    }

    #[test]
    fn test_mean_call_time() {
        let metrics = Metrics::new();
        assert_eq!(metrics.snapshot().mean_call_micros(), None);

        metrics.call_succeeded();
        metrics.call_failed();
        metrics.call_time(Duration::from_micros(300));
        metrics.call_time(Duration::from_micros(100));

        let snap = metrics.snapshot();
        assert_eq!(snap.calls_finished(), 2);
        assert_eq!(snap.mean_call_micros(), Some(200));
    }
}
