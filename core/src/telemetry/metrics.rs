use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Mutex;

/// Counters shared by the batch workers.
pub struct MetricsRecorder {
    inner: Mutex<Metrics>,
}

#[derive(Debug, Clone, Default, Serialize, PartialEq, Eq)]
pub struct Metrics {
    pub processed: usize,
    pub failed: usize,
    pub rejected: usize,
    pub stacked: usize,
    pub failures_by_kind: BTreeMap<String, usize>,
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

    pub fn record_error(&self, kind: &str) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.failed += 1;
            *metrics.failures_by_kind.entry(kind.to_string()).or_insert(0) += 1;
        }
    }

    pub fn record_stack(&self, rejected: usize) {
        if let Ok(mut metrics) = self.inner.lock() {
            metrics.stacked += 1;
            metrics.rejected += rejected;
        }
    }

    pub fn snapshot(&self) -> Metrics {
        if let Ok(metrics) = self.inner.lock() {
            metrics.clone()
        } else {
            Metrics::default()
        }
    }
}

impl Default for MetricsRecorder {
    fn default() -> Self {
        Self::new()
    }
}
