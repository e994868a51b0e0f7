//! Best-effort delivery of committed entries

use async_trait::async_trait;
use ledger_core::LedgerEntry;
use std::sync::Arc;
use thiserror::Error;

use crate::types::DeliveryFailure;

/// Delivery failure reported by a sink
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{0}")]
pub struct SinkError(pub String);

/// Destination for committed ledger entries
#[async_trait]
pub trait DeliverySink: Send + Sync {
    /// Destination name
    fn name(&self) -> &str;

    /// Deliver one entry
    async fn deliver(&self, entry: &LedgerEntry) -> Result<(), SinkError>;
}

/// Sink that only logs
#[derive(Debug, Clone)]
pub struct TracingSink {
    name: String,
}

impl TracingSink {
    /// Create sink
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl DeliverySink for TracingSink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn deliver(&self, entry: &LedgerEntry) -> Result<(), SinkError> {
        tracing::info!(
            destination = %self.name,
            index = entry.index,
            token_id = %entry.token_id,
            "Delivered ledger entry"
        );
        Ok(())
    }
}

/// Deliver to every sink, collecting failures instead of stopping
pub async fn fan_out(sinks: &[Arc<dyn DeliverySink>], entry: &LedgerEntry) -> Vec<DeliveryFailure> {
    let mut failures = Vec::new();

    for sink in sinks {
        if let Err(e) = sink.deliver(entry).await {
            tracing::warn!(
                "Delivery of entry {} to '{}' failed: {}",
                entry.index,
                sink.name(),
                e
            );
            failures.push(DeliveryFailure {
                destination: sink.name().to_string(),
                entry_index: entry.index,
                reason: e.to_string(),
            });
        }
    }

    failures
}
