//! Engine metrics
//!
//! A single mutex guards the counters; updates are short. Readers take a
//! snapshot. Invariants: `total_syncs = successful_syncs + failed_syncs`;
//! `average_speed` is the cumulative mean of per-successful-sync speeds.

use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};

use driftsync_core::ports::strategy::SyncResult;

/// Point-in-time view of the engine metrics
#[derive(Debug, Clone, serde::Serialize)]
pub struct MetricsSnapshot {
    pub total_syncs: u64,
    pub successful_syncs: u64,
    pub failed_syncs: u64,
    pub total_files: u64,
    pub total_bytes: u64,
    /// Wall-clock duration of the last sync
    pub last_sync_duration: Duration,
    /// Throughput of the last successful sync in MB/s
    pub current_speed: f64,
    /// Cumulative mean throughput over successful syncs in MB/s
    pub average_speed: f64,
    /// Files in the operation currently running
    pub current_files: u64,
    /// Bytes in the operation currently running
    pub current_bytes: u64,
    pub start_time: DateTime<Utc>,
}

impl MetricsSnapshot {
    fn new() -> Self {
        Self {
            total_syncs: 0,
            successful_syncs: 0,
            failed_syncs: 0,
            total_files: 0,
            total_bytes: 0,
            last_sync_duration: Duration::ZERO,
            current_speed: 0.0,
            average_speed: 0.0,
            current_files: 0,
            current_bytes: 0,
            start_time: Utc::now(),
        }
    }
}

/// Guarded engine metrics
pub struct SyncMetrics {
    inner: Mutex<MetricsSnapshot>,
}

impl Default for SyncMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl SyncMetrics {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(MetricsSnapshot::new()),
        }
    }

    /// Records a successful sync and folds its speed into the running
    /// average
    pub fn record_success(&self, result: &SyncResult) {
        let mut m = self.inner.lock().unwrap();

        m.total_syncs += 1;
        m.successful_syncs += 1;
        m.total_files += result.files_processed;
        m.total_bytes += result.bytes_transferred;

        let duration = result
            .duration()
            .and_then(|d| d.to_std().ok())
            .unwrap_or(Duration::ZERO);
        m.last_sync_duration = duration;

        if duration > Duration::ZERO {
            let mbps =
                result.bytes_transferred as f64 / (1024.0 * 1024.0) / duration.as_secs_f64();
            m.current_speed = mbps;
            if m.successful_syncs == 1 {
                m.average_speed = mbps;
            } else {
                let n = m.successful_syncs as f64;
                m.average_speed = (m.average_speed * (n - 1.0) + mbps) / n;
            }
        }

        m.current_files = 0;
        m.current_bytes = 0;
    }

    /// Records a failed sync
    pub fn record_failure(&self) {
        let mut m = self.inner.lock().unwrap();
        m.total_syncs += 1;
        m.failed_syncs += 1;
        m.current_files = 0;
        m.current_bytes = 0;
    }

    /// Sets the in-flight operation counters
    pub fn set_current(&self, files: u64, bytes: u64) {
        let mut m = self.inner.lock().unwrap();
        m.current_files = files;
        m.current_bytes = bytes;
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        self.inner.lock().unwrap().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn finished_result(bytes: u64) -> SyncResult {
        let mut result = SyncResult::started();
        result.files_processed = 2;
        result.bytes_transferred = bytes;
        // Force a measurable duration
        result.start_time = Utc::now() - chrono::Duration::seconds(1);
        result.finish();
        result
    }

    #[test]
    fn test_totals_invariant() {
        let metrics = SyncMetrics::new();
        metrics.record_success(&finished_result(1024));
        metrics.record_success(&finished_result(2048));
        metrics.record_failure();

        let snap = metrics.snapshot();
        assert_eq!(snap.total_syncs, snap.successful_syncs + snap.failed_syncs);
        assert_eq!(snap.successful_syncs, 2);
        assert_eq!(snap.failed_syncs, 1);
        assert_eq!(snap.total_files, 4);
        assert_eq!(snap.total_bytes, 3072);
    }

    #[test]
    fn test_average_speed_is_cumulative_mean() {
        let metrics = SyncMetrics::new();

        metrics.record_success(&finished_result(1024 * 1024)); // ~1 MB/s
        let first = metrics.snapshot();
        assert!((first.average_speed - first.current_speed).abs() < 1e-9);

        metrics.record_success(&finished_result(3 * 1024 * 1024)); // ~3 MB/s
        let second = metrics.snapshot();

        let expected = (first.current_speed + second.current_speed) / 2.0;
        assert!((second.average_speed - expected).abs() < 0.2);
    }

    #[test]
    fn test_failure_does_not_touch_speeds() {
        let metrics = SyncMetrics::new();
        metrics.record_success(&finished_result(1024 * 1024));
        let before = metrics.snapshot();

        metrics.record_failure();
        let after = metrics.snapshot();

        assert_eq!(after.average_speed, before.average_speed);
        assert_eq!(after.total_files, before.total_files);
        assert_eq!(after.failed_syncs, 1);
    }

    #[test]
    fn test_current_counters_cleared_on_completion() {
        let metrics = SyncMetrics::new();
        metrics.set_current(10, 1000);
        assert_eq!(metrics.snapshot().current_files, 10);

        metrics.record_success(&finished_result(1));
        assert_eq!(metrics.snapshot().current_files, 0);
        assert_eq!(metrics.snapshot().current_bytes, 0);
    }
}
