//! Metrics collection for observability
//!
//! This module provides Prometheus metrics for monitoring the ledger.
//!
//! # Metrics
//!
//! - `ledger_entries_total` - Total number of entries appended
//! - `ledger_digests_total` - Total number of sealed batch digests
//! - `ledger_append_duration_seconds` - Histogram of append latencies
//! - `ledger_chain_breaks` - Broken links seen by the last integrity check
//!
//! Each [`LedgerMetrics`] owns its registry, so several ledgers can live in
//! one process without name collisions.

use prometheus::{Histogram, HistogramOpts, IntCounter, IntGauge, Registry};
use std::sync::Arc;

/// Metrics collector
#[derive(Clone)]
pub struct LedgerMetrics {
    /// Total entries appended
    pub entries_total: IntCounter,

    /// Total digests sealed
    pub digests_total: IntCounter,

    /// Append duration histogram
    pub append_duration: Histogram,

    /// Chain breaks found by the most recent verification
    pub chain_breaks: IntGauge,

    /// Prometheus registry
    pub registry: Arc<Registry>,
}

impl std::fmt::Debug for LedgerMetrics {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerMetrics")
            .field("entries_total", &self.entries_total.get())
            .field("digests_total", &self.digests_total.get())
            .field("chain_breaks", &self.chain_breaks.get())
            .finish_non_exhaustive()
    }
}

impl LedgerMetrics {
    /// Create new metrics collector
    pub fn new() -> prometheus::Result<Self> {
        let registry = Arc::new(Registry::new());

        let entries_total =
            IntCounter::new("ledger_entries_total", "Total number of entries appended")?;
        registry.register(Box::new(entries_total.clone()))?;

        let digests_total =
            IntCounter::new("ledger_digests_total", "Total number of sealed batch digests")?;
        registry.register(Box::new(digests_total.clone()))?;

        let append_duration = Histogram::with_opts(
            HistogramOpts::new(
                "ledger_append_duration_seconds",
                "Histogram of append latencies",
            )
            .buckets(vec![0.0001, 0.0005, 0.001, 0.005, 0.010, 0.050, 0.100, 0.500]),
        )?;
        registry.register(Box::new(append_duration.clone()))?;

        let chain_breaks = IntGauge::new(
            "ledger_chain_breaks",
            "Broken links found by the most recent integrity check",
        )?;
        registry.register(Box::new(chain_breaks.clone()))?;

        Ok(Self {
            entries_total,
            digests_total,
            append_duration,
            chain_breaks,
            registry,
        })
    }

    /// Record entry append
    pub fn record_append(&self, duration_seconds: f64) {
        self.entries_total.inc();
        self.append_duration.observe(duration_seconds);
    }

    /// Record digest creation
    pub fn record_seal(&self) {
        self.digests_total.inc();
    }

    /// Record the outcome of an integrity check
    pub fn record_integrity(&self, breaks: usize) {
        self.chain_breaks.set(breaks as i64);
    }

    /// Get metrics registry
    pub fn registry(&self) -> &Registry {
        &self.registry
    }
}
