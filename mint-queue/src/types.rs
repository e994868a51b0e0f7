//! Core types for the mint queue

use chrono::{DateTime, Utc};
use ledger_core::{LedgerEntry, Token};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::time::Duration;
use uuid::Uuid;

use crate::{Error, Result};

/// Mint request lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Waiting in the pending sequence
    Queued,
    /// Drained into the in-flight job
    Processing,
    /// Token created and appended to the ledger
    Committed,
    /// Creation or append failed
    Failed,
}

impl RequestStatus {
    /// Whether no further transitions are allowed
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Committed | RequestStatus::Failed)
    }

    fn can_become(&self, to: RequestStatus) -> bool {
        matches!(
            (self, to),
            (RequestStatus::Queued, RequestStatus::Processing)
                | (RequestStatus::Processing, RequestStatus::Committed)
                | (RequestStatus::Processing, RequestStatus::Failed)
        )
    }
}

impl fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RequestStatus::Queued => "queued",
            RequestStatus::Processing => "processing",
            RequestStatus::Committed => "committed",
            RequestStatus::Failed => "failed",
        };
        write!(f, "{}", name)
    }
}

/// What the token factory needs to create a token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenSpec {
    /// Token type (catalog key)
    pub token_type: String,

    /// Owner
    pub owner: String,

    /// Token value
    pub amount: Decimal,

    /// Free-form metadata
    pub metadata: BTreeMap<String, String>,
}

/// Request to mint one token
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MintRequest {
    /// Request ID
    pub request_id: Uuid,

    /// Token type
    pub token_type: String,

    /// Owner
    pub owner: String,

    /// Amount
    pub amount: Decimal,

    /// Free-form metadata
    pub metadata: BTreeMap<String, String>,

    /// Creation time
    pub queued_at: DateTime<Utc>,

    /// Lifecycle status
    status: RequestStatus,
}

impl MintRequest {
    /// New queued request
    pub fn new(token_type: impl Into<String>, owner: impl Into<String>, amount: Decimal) -> Self {
        Self {
            request_id: Uuid::now_v7(),
            token_type: token_type.into(),
            owner: owner.into(),
            amount,
            metadata: BTreeMap::new(),
            queued_at: Utc::now(),
            status: RequestStatus::Queued,
        }
    }

    /// Attach a metadata entry
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Current status
    pub fn status(&self) -> RequestStatus {
        self.status
    }

    /// Move to the next lifecycle status
    pub fn transition(&mut self, to: RequestStatus) -> Result<()> {
        if !self.status.can_become(to) {
            return Err(Error::InvalidTransition {
                request_id: self.request_id,
                from: self.status,
                to,
            });
        }
        self.status = to;
        Ok(())
    }

    /// Put the request back into the queued state
    ///
    /// A retried request may come back with a terminal status; it starts a
    /// fresh attempt from `Queued`.
    pub(crate) fn requeue(&mut self) {
        self.status = RequestStatus::Queued;
    }

    /// Reject malformed requests before they are queued
    pub fn validate(&self) -> Result<()> {
        if self.token_type.trim().is_empty() {
            return Err(Error::Validation("token type is empty".to_string()));
        }
        if self.owner.trim().is_empty() {
            return Err(Error::Validation("owner is empty".to_string()));
        }
        if self.amount <= Decimal::ZERO {
            return Err(Error::Validation(format!(
                "amount must be positive, got {}",
                self.amount
            )));
        }
        Ok(())
    }

    /// Factory input for this request
    pub fn spec(&self) -> TokenSpec {
        TokenSpec {
            token_type: self.token_type.clone(),
            owner: self.owner.clone(),
            amount: self.amount,
            metadata: self.metadata.clone(),
        }
    }
}

/// Where an enqueued request landed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct EnqueueReceipt {
    /// Request ID
    pub request_id: Uuid,

    /// 1-based position in the pending sequence at insertion time
    pub position: usize,

    /// Rough wait until the request's batch is processed
    pub estimated_wait: Duration,
}

/// Requests drained for processing as one unit
///
/// Not `Clone`: a drained job is processed at most once.
#[derive(Debug)]
pub struct BatchJob {
    batch_id: Uuid,
    items: Vec<MintRequest>,
    started_at: DateTime<Utc>,
}

impl BatchJob {
    pub(crate) fn new(items: Vec<MintRequest>) -> Self {
        Self {
            batch_id: Uuid::now_v7(),
            items,
            started_at: Utc::now(),
        }
    }

    /// Batch ID
    pub fn batch_id(&self) -> Uuid {
        self.batch_id
    }

    /// Items in enqueue order
    pub fn items(&self) -> &[MintRequest] {
        &self.items
    }

    /// Number of items
    pub fn len(&self) -> usize {
        self.items.len()
    }

    /// Whether the job has no items
    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Drain time
    pub fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub(crate) fn into_items(self) -> Vec<MintRequest> {
        self.items
    }

    #[cfg(test)]
    pub(crate) fn duplicate(&self) -> Self {
        Self {
            batch_id: self.batch_id,
            items: self.items.clone(),
            started_at: self.started_at,
        }
    }
}

/// A request that made it into the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommittedMint {
    /// 1-based position within the batch
    pub position: usize,

    /// Request ID
    pub request_id: Uuid,

    /// Created token
    pub token: Token,

    /// Resulting ledger entry
    pub entry: LedgerEntry,
}

/// A request that failed inside a batch
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MintFailure {
    /// 1-based position within the batch
    pub position: usize,

    /// Request ID
    pub request_id: Uuid,

    /// Why it failed
    pub reason: String,
}

/// A best-effort delivery that did not go through
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeliveryFailure {
    /// Sink name
    pub destination: String,

    /// Ledger index that was being delivered
    pub entry_index: u64,

    /// Why it failed
    pub reason: String,
}

/// Outcome of processing one batch job
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchResult {
    /// Batch ID
    pub batch_id: Uuid,

    /// Committed items, in batch order
    pub committed_tokens: Vec<CommittedMint>,

    /// Failed items, in batch order
    pub failures: Vec<MintFailure>,

    /// Sink deliveries that failed; never affects item status
    pub delivery_failures: Vec<DeliveryFailure>,

    /// Every item with its terminal status
    pub requests: Vec<MintRequest>,

    /// Drain time
    pub started_at: DateTime<Utc>,

    /// Completion time
    pub finished_at: DateTime<Utc>,
}

impl BatchResult {
    /// Items in the batch
    pub fn total(&self) -> usize {
        self.committed_tokens.len() + self.failures.len()
    }
}

/// Result of clearing the pending sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ClearOutcome {
    /// Pending items dropped
    pub cleared_count: usize,
}
