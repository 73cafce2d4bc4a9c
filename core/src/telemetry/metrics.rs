use std::sync::Mutex;

/// Channel counters shared across scans.
pub struct MetricsRecorder {
    inner: Mutex<Metrics>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub processed: usize,
    pub failed: usize,
    pub degraded: usize,
    pub points_removed: usize,
}

#[derive(Default)]
struct Metrics {
    processed: usize,
    failed: usize,
    degraded: usize,
    points_removed: usize,
}

impl MetricsRecorder {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(Metrics::default()),
        }
    }

    pub fn record_processed(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.processed += 1;
        }
    }

    pub fn record_failed(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.failed += 1;
        }
    }

    pub fn record_degraded(&self) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.degraded += 1;
        }
    }

    pub fn record_points_removed(&self, count: usize) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.points_removed += count;
        }
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        if let Ok(metrics) = self.inner.lock() {
            MetricsSnapshot {
                processed: metrics.processed,
                failed: metrics.failed,
                degraded: metrics.degraded,
                points_removed: metrics.points_removed,
            }
        } else {
            MetricsSnapshot::default()
        }
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}
