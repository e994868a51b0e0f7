//! Main ledger orchestration layer
//!
//! This module ties together the chain, crypto, and actor components
//! into a high-level API for appending tokens and auditing the chain.
//!
//! # Example
//!
//! ```no_run
//! use ledger_core::{Config, Ledger};
//!
//! #[tokio::main]
//! async fn main() -> ledger_core::Result<()> {
//!     let ledger = Ledger::open(Config::default()).await?;
//!
//!     // let entry = ledger.append(token).await?;
//!     let report = ledger.verify_integrity().await?;
//!     assert!(report.valid);
//!
//!     ledger.shutdown().await
//! }
//! ```

use crate::{
    actor::{spawn_ledger_actor, LedgerHandle},
    chain::Chain,
    crypto::KeyPair,
    export::LedgerExport,
    metrics::LedgerMetrics,
    types::{
        BatchDigest, ContentMismatch, DigestMismatch, IntegrityReport, LedgerEntry, LedgerQuery, LedgerStats,
        Token,
    },
    Config, Result,
};
use std::time::Instant;

/// Main ledger interface
#[derive(Clone)]
pub struct Ledger {
    /// Actor handle (all reads and writes go through the single writer)
    handle: LedgerHandle,

    /// Metrics shared with the actor
    metrics: LedgerMetrics,

    /// Digest signing key, if signing is enabled
    public_key: Option<[u8; 32]>,

    /// Configuration
    config: Config,
}

impl std::fmt::Debug for Ledger {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Ledger")
            .field("handle", &self.handle)
            .field("signed", &self.public_key.is_some())
            .field("config", &self.config)
            .finish()
    }
}

impl Ledger {
    /// Open an empty ledger with configuration
    pub async fn open(config: Config) -> Result<Self> {
        config.validate()?;

        let mut chain = Chain::new(&config.ledger);
        if config.ledger.sign_digests {
            chain = chain.with_keypair(KeyPair::generate());
        }

        Self::from_chain(chain, config)
    }

    /// Spawn the writer actor around a prepared chain
    ///
    /// Must be called from within a Tokio runtime.
    pub fn from_chain(chain: Chain, config: Config) -> Result<Self> {
        let metrics = LedgerMetrics::new()?;
        let public_key = chain.public_key();

        tracing::info!(
            "Opening ledger (hash: {}, seal interval: {}, signed digests: {})",
            chain.hash_algorithm(),
            config.ledger.seal_interval,
            public_key.is_some()
        );

        let handle = spawn_ledger_actor(chain, metrics.clone(), config.ledger.mailbox_capacity);

        Ok(Self {
            handle,
            metrics,
            public_key,
            config,
        })
    }

    /// Append an immutable token as the next entry
    ///
    /// Fails with [`crate::Error::NotImmutable`] if the token is not frozen.
    pub async fn append(&self, token: Token) -> Result<LedgerEntry> {
        let started = Instant::now();
        let appended = self.handle.append(token).await?;
        tracing::trace!(
            "Append round-trip {:?} for index {}",
            started.elapsed(),
            appended.entry.index
        );
        Ok(appended.entry)
    }

    /// Explicit seal check; returns the digest if one was created
    pub async fn seal_pending(&self) -> Result<Option<BatchDigest>> {
        self.handle.seal_pending().await
    }

    /// Get entry by index
    pub async fn get_entry(&self, index: u64) -> Result<LedgerEntry> {
        self.handle.get_entry(index).await
    }

    /// Entries matching every present filter
    pub async fn query(&self, query: LedgerQuery) -> Result<Vec<LedgerEntry>> {
        self.handle.query(query).await
    }

    /// All digests, oldest first
    pub async fn digests(&self) -> Result<Vec<BatchDigest>> {
        self.handle.digests().await
    }

    /// Walk the chain and report every broken link
    pub async fn verify_integrity(&self) -> Result<IntegrityReport> {
        let report = self.handle.verify_integrity().await?;
        if !report.valid {
            tracing::error!(
                "Chain integrity check failed: {} broken link(s) in {} entries",
                report.errors.len(),
                report.verified_count
            );
        }
        Ok(report)
    }

    /// Recompute every digest and check signatures
    pub async fn verify_digests(&self) -> Result<Vec<DigestMismatch>> {
        self.handle.verify_digests().await
    }

    /// Re-hash every entry from its content fields
    pub async fn verify_content(&self) -> Result<Vec<ContentMismatch>> {
        let mismatches = self.handle.verify_content().await?;
        if !mismatches.is_empty() {
            tracing::error!(
                "Content check failed: {} entries do not match their hash",
                mismatches.len()
            );
        }
        Ok(mismatches)
    }

    /// Aggregate statistics
    pub async fn stats(&self) -> Result<LedgerStats> {
        self.handle.stats().await
    }

    /// Snapshot sufficient to rebuild and verify the chain independently
    pub async fn export_ledger(&self) -> Result<LedgerExport> {
        self.handle.export().await
    }

    /// Handle for callers that only need raw actor access
    pub fn handle(&self) -> LedgerHandle {
        self.handle.clone()
    }

    /// Metrics collector
    pub fn metrics(&self) -> &LedgerMetrics {
        &self.metrics
    }

    /// Digest signing key
    pub fn public_key(&self) -> Option<[u8; 32]> {
        self.public_key
    }

    /// Configuration
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Shutdown ledger
    pub async fn shutdown(&self) -> Result<()> {
        self.handle.shutdown().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::OwnerId;
    use crate::Error;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn token(owner: &str, token_type: &str) -> Token {
        Token {
            id: Uuid::now_v7(),
            token_type: token_type.to_string(),
            owner: OwnerId::new(owner),
            value: Decimal::new(2500, 2),
            timestamp: Utc::now(),
            immutable: true,
            metadata: BTreeMap::new(),
        }
    }

    async fn create_test_ledger(seal_interval: u64) -> Ledger {
        let mut config = Config::default();
        config.ledger.seal_interval = seal_interval;
        Ledger::open(config).await.unwrap()
    }

    #[tokio::test]
    async fn test_ledger_open() {
        let ledger = create_test_ledger(100).await;
        let stats = ledger.stats().await.unwrap();
        assert_eq!(stats.total_entries, 0);
        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let mut config = Config::default();
        config.ledger.seal_interval = 0;
        assert!(matches!(Ledger::open(config).await, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_append_and_query() {
        let ledger = create_test_ledger(100).await;

        ledger.append(token("alice", "gold")).await.unwrap();
        ledger.append(token("bob", "silver")).await.unwrap();
        let third = ledger.append(token("alice", "silver")).await.unwrap();

        assert_eq!(third.index, 2);
        let silver_alice = ledger
            .query(LedgerQuery::all().owner("alice").token_type("silver"))
            .await
            .unwrap();
        assert_eq!(silver_alice, vec![third]);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_mutable_token_rejected() {
        let ledger = create_test_ledger(100).await;

        let mut t = token("alice", "gold");
        t.immutable = false;
        let result = ledger.append(t).await;
        assert!(matches!(result, Err(Error::NotImmutable { .. })));

        // The rejection does not consume an index
        let entry = ledger.append(token("alice", "gold")).await.unwrap();
        assert_eq!(entry.index, 0);

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_signed_digests() {
        let mut config = Config::default();
        config.ledger.seal_interval = 2;
        config.ledger.sign_digests = true;
        let ledger = Ledger::open(config).await.unwrap();

        for _ in 0..4 {
            ledger.append(token("alice", "gold")).await.unwrap();
        }

        let digests = ledger.digests().await.unwrap();
        assert_eq!(digests.len(), 2);
        assert!(digests.iter().all(|d| d.signature.is_some()));
        assert!(ledger.public_key().is_some());
        assert!(ledger.verify_digests().await.unwrap().is_empty());
        assert!(ledger.verify_content().await.unwrap().is_empty());

        let export = ledger.export_ledger().await.unwrap();
        assert!(export.public_key.is_some());
        assert!(export.verify_digests().unwrap().is_empty());

        ledger.shutdown().await.unwrap();
    }

    #[tokio::test]
    async fn test_integrity_metric_updated() {
        let ledger = create_test_ledger(100).await;
        ledger.append(token("alice", "gold")).await.unwrap();

        let report = ledger.verify_integrity().await.unwrap();
        assert!(report.valid);
        assert_eq!(ledger.metrics().chain_breaks.get(), 0);
        assert_eq!(ledger.metrics().entries_total.get(), 1);

        ledger.shutdown().await.unwrap();
    }
}
