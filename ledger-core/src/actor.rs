//! Actor-based concurrency for the ledger
//!
//! This module implements the single-writer pattern using Tokio actors:
//! - One task owns the [`Chain`]; appends can never race on the head hash
//! - Seal check-and-create runs inside the same task, so a range is never
//!   sealed twice
//! - Bounded mailbox gives callers backpressure
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │      Batch queue / pipeline / any other caller        │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │               LedgerHandle (Clone)                    │
//! │         Sends messages to actor mailbox              │
//! └─────────────────────┬────────────────────────────────┘
//!                       │
//!                       │ mpsc::channel (bounded)
//!                       ▼
//! ┌──────────────────────────────────────────────────────┐
//! │              LedgerActor (Single Task)                │
//! │   Chain::append → Chain::seal_pending (atomic)        │
//! └───────────────────────────────────────────────────────┘
//! ```

use crate::chain::{Appended, Chain};
use crate::export::LedgerExport;
use crate::metrics::LedgerMetrics;
use crate::types::{
    BatchDigest, ContentMismatch, DigestMismatch, IntegrityReport, LedgerEntry, LedgerQuery, LedgerStats, Token,
};
use crate::{Error, Result};
use std::time::Instant;
use tokio::sync::{mpsc, oneshot};

/// Message sent to the ledger actor
pub enum LedgerMessage {
    /// Append a token
    Append {
        token: Token,
        response: oneshot::Sender<Result<Appended>>,
    },

    /// Run the seal check explicitly
    SealPending {
        response: oneshot::Sender<Option<BatchDigest>>,
    },

    /// Get entry by index
    GetEntry {
        index: u64,
        response: oneshot::Sender<Result<LedgerEntry>>,
    },

    /// Filter entries
    Query {
        query: LedgerQuery,
        response: oneshot::Sender<Vec<LedgerEntry>>,
    },

    /// List digests
    Digests {
        response: oneshot::Sender<Vec<BatchDigest>>,
    },

    /// Walk the chain
    VerifyIntegrity {
        response: oneshot::Sender<IntegrityReport>,
    },

    /// Recompute digests
    VerifyDigests {
        response: oneshot::Sender<Vec<DigestMismatch>>,
    },

    /// Re-hash entry content
    VerifyContent {
        response: oneshot::Sender<Vec<ContentMismatch>>,
    },

    /// Aggregate statistics
    Stats {
        response: oneshot::Sender<LedgerStats>,
    },

    /// Full snapshot
    Export {
        response: oneshot::Sender<LedgerExport>,
    },

    /// Shutdown actor
    Shutdown,
}

/// Actor that owns the chain
pub struct LedgerActor {
    /// The only copy of the chain
    chain: Chain,

    /// Mailbox for incoming messages
    mailbox: mpsc::Receiver<LedgerMessage>,

    /// Shared metrics
    metrics: LedgerMetrics,
}

impl std::fmt::Debug for LedgerActor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LedgerActor")
            .field("chain", &self.chain)
            .finish_non_exhaustive()
    }
}

impl LedgerActor {
    /// Create new actor
    pub fn new(chain: Chain, mailbox: mpsc::Receiver<LedgerMessage>, metrics: LedgerMetrics) -> Self {
        Self {
            chain,
            mailbox,
            metrics,
        }
    }

    /// Run the actor event loop
    pub async fn run(mut self) {
        while let Some(msg) = self.mailbox.recv().await {
            if let LedgerMessage::Shutdown = msg {
                break;
            }
            self.handle_message(msg);
        }

        tracing::info!(
            "Ledger actor stopped at {} entries, {} digests",
            self.chain.len(),
            self.chain.digests().len()
        );
    }

    /// Handle a single message
    fn handle_message(&mut self, msg: LedgerMessage) {
        match msg {
            LedgerMessage::Append { token, response } => {
                let started = Instant::now();
                let result = self.chain.append(&token);

                match &result {
                    Ok(appended) => {
                        self.metrics
                            .record_append(started.elapsed().as_secs_f64());
                        tracing::debug!(
                            "Appended token {} at index {}",
                            appended.entry.token_id,
                            appended.entry.index
                        );
                        if let Some(digest) = &appended.digest {
                            self.metrics.record_seal();
                            tracing::info!(
                                "Sealed entries [{}, {}] under digest {} ({})",
                                digest.range_start,
                                digest.range_end,
                                digest.digest_id,
                                digest.digest_hash
                            );
                        }
                    }
                    Err(e) => tracing::warn!("Rejected append of token {}: {}", token.id, e),
                }

                let _ = response.send(result);
            }

            LedgerMessage::SealPending { response } => {
                let digest = self.chain.seal_pending();
                if digest.is_some() {
                    self.metrics.record_seal();
                }
                let _ = response.send(digest);
            }

            LedgerMessage::GetEntry { index, response } => {
                let result = self
                    .chain
                    .entry(index)
                    .cloned()
                    .ok_or(Error::EntryNotFound(index));
                let _ = response.send(result);
            }

            LedgerMessage::Query { query, response } => {
                let _ = response.send(self.chain.query(&query));
            }

            LedgerMessage::Digests { response } => {
                let _ = response.send(self.chain.digests().to_vec());
            }

            LedgerMessage::VerifyIntegrity { response } => {
                let report = self.chain.verify_integrity();
                self.metrics.record_integrity(report.errors.len());
                let _ = response.send(report);
            }

            LedgerMessage::VerifyDigests { response } => {
                let public_key = self.chain.public_key();
                let _ = response.send(self.chain.verify_digests(public_key.as_ref()));
            }

            LedgerMessage::VerifyContent { response } => {
                let _ = response.send(self.chain.verify_content());
            }

            LedgerMessage::Stats { response } => {
                let _ = response.send(self.chain.stats());
            }

            LedgerMessage::Export { response } => {
                let _ = response.send(self.chain.export());
            }

            LedgerMessage::Shutdown => {
                // Handled in run loop
            }
        }
    }
}

/// Handle for sending messages to the actor
#[derive(Clone, Debug)]
pub struct LedgerHandle {
    sender: mpsc::Sender<LedgerMessage>,
}

impl LedgerHandle {
    /// Create new handle
    pub fn new(sender: mpsc::Sender<LedgerMessage>) -> Self {
        Self { sender }
    }

    /// Send a request and wait for the reply
    async fn call<T>(
        &self,
        build: impl FnOnce(oneshot::Sender<T>) -> LedgerMessage,
    ) -> Result<T> {
        let (tx, rx) = oneshot::channel();
        self.sender
            .send(build(tx))
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;

        rx.await
            .map_err(|_| Error::Concurrency("Response channel closed".to_string()))
    }

    /// Append a token
    pub async fn append(&self, token: Token) -> Result<Appended> {
        self.call(|response| LedgerMessage::Append { token, response })
            .await?
    }

    /// Run the seal check
    pub async fn seal_pending(&self) -> Result<Option<BatchDigest>> {
        self.call(|response| LedgerMessage::SealPending { response })
            .await
    }

    /// Get entry by index
    pub async fn get_entry(&self, index: u64) -> Result<LedgerEntry> {
        self.call(|response| LedgerMessage::GetEntry { index, response })
            .await?
    }

    /// Filter entries
    pub async fn query(&self, query: LedgerQuery) -> Result<Vec<LedgerEntry>> {
        self.call(|response| LedgerMessage::Query { query, response })
            .await
    }

    /// List digests
    pub async fn digests(&self) -> Result<Vec<BatchDigest>> {
        self.call(|response| LedgerMessage::Digests { response }).await
    }

    /// Walk the chain
    pub async fn verify_integrity(&self) -> Result<IntegrityReport> {
        self.call(|response| LedgerMessage::VerifyIntegrity { response })
            .await
    }

    /// Recompute digests
    pub async fn verify_digests(&self) -> Result<Vec<DigestMismatch>> {
        self.call(|response| LedgerMessage::VerifyDigests { response })
            .await
    }

    /// Re-hash every entry from its content
    pub async fn verify_content(&self) -> Result<Vec<ContentMismatch>> {
        self.call(|response| LedgerMessage::VerifyContent { response })
            .await
    }

    /// Aggregate statistics
    pub async fn stats(&self) -> Result<LedgerStats> {
        self.call(|response| LedgerMessage::Stats { response }).await
    }

    /// Full snapshot
    pub async fn export(&self) -> Result<LedgerExport> {
        self.call(|response| LedgerMessage::Export { response }).await
    }

    /// Shutdown actor
    pub async fn shutdown(&self) -> Result<()> {
        self.sender
            .send(LedgerMessage::Shutdown)
            .await
            .map_err(|_| Error::Concurrency("Actor mailbox closed".to_string()))?;
        Ok(())
    }
}

/// Spawn the ledger actor
pub fn spawn_ledger_actor(
    chain: Chain,
    metrics: LedgerMetrics,
    mailbox_capacity: usize,
) -> LedgerHandle {
    let (tx, rx) = mpsc::channel(mailbox_capacity.max(1));
    let actor = LedgerActor::new(chain, rx, metrics);

    tokio::spawn(async move {
        actor.run().await;
    });

    LedgerHandle::new(tx)
}
