//! Prometheus metrics for the batch queue

use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Registry};
use std::sync::Arc;

/// Queue metrics, registered in a per-queue registry
#[derive(Clone)]
pub struct QueueMetrics {
    /// Requests enqueued
    pub requests_enqueued: IntCounter,

    /// Items committed to the ledger
    pub items_committed: IntCounter,

    /// Items that failed
    pub items_failed: IntCounter,

    /// Batches processed
    pub batches_processed: IntCounter,

    /// Current pending depth
    pub pending_depth: IntGauge,

    /// Batch processing time
    pub batch_duration: Histogram,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl std::fmt::Debug for QueueMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueMetrics")
            .field("requests_enqueued", &self.requests_enqueued.get())
            .field("items_committed", &self.items_committed.get())
            .field("items_failed", &self.items_failed.get())
            .field("batches_processed", &self.batches_processed.get())
            .field("pending_depth", &self.pending_depth.get())
            .finish_non_exhaustive()
    }
}

impl QueueMetrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let requests_enqueued =
            IntCounter::new("mint_requests_enqueued_total", "Mint requests enqueued")?;
        registry.register(Box::new(requests_enqueued.clone()))?;

        let items_committed =
            IntCounter::new("mint_items_committed_total", "Batch items committed to the ledger")?;
        registry.register(Box::new(items_committed.clone()))?;

        let items_failed = IntCounter::new("mint_items_failed_total", "Batch items that failed")?;
        registry.register(Box::new(items_failed.clone()))?;

        let batches_processed =
            IntCounter::new("mint_batches_processed_total", "Batch jobs processed")?;
        registry.register(Box::new(batches_processed.clone()))?;

        let pending_depth = IntGauge::new("mint_pending_depth", "Requests waiting to be drained")?;
        registry.register(Box::new(pending_depth.clone()))?;

        let batch_duration = Histogram::with_opts(
            HistogramOpts::new("mint_batch_duration_seconds", "Batch processing time")
                .buckets(vec![0.001, 0.005, 0.010, 0.050, 0.100, 0.250, 0.500, 1.0, 5.0]),
        )?;
        registry.register(Box::new(batch_duration.clone()))?;

        Ok(Self {
            requests_enqueued,
            items_committed,
            items_failed,
            batches_processed,
            pending_depth,
            batch_duration,
            registry,
        })
    }

    /// Record a processed batch
    pub fn record_batch(&self, committed: usize, failed: usize, duration_seconds: f64) {
        self.items_committed.inc_by(committed as u64);
        self.items_failed.inc_by(failed as u64);
        self.batches_processed.inc();
        self.batch_duration.observe(duration_seconds);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_batch() {
        let metrics = QueueMetrics::new().unwrap();
        metrics.record_batch(9, 1, 0.02);
        assert_eq!(metrics.items_committed.get(), 9);
        assert_eq!(metrics.items_failed.get(), 1);
        assert_eq!(metrics.batches_processed.get(), 1);
        assert_eq!(metrics.registry().gather().len(), 6);
        assert!(format!("{:?}", metrics).contains("items_committed: 9"));
    }
}
