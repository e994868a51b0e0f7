//! Hash chain and range sealing
//!
//! [`Chain`] is the synchronous core of the ledger. It is owned by exactly one
//! writer (the actor in [`crate::actor`]); nothing here is shared.
//!
//! # Invariants
//!
//! - `entries[i].index == i` (dense, 0-based)
//! - `entries[i].previous_hash == entries[i - 1].hash`, and
//!   `entries[0].previous_hash == GENESIS_HASH`
//! - Digests cover contiguous, non-overlapping ranges of exactly
//!   `seal_interval` entries, starting at index 0
//! - Content fields are written once, by [`Chain::append`]

use crate::{
    config::LedgerConfig,
    crypto::{self, EntryHasher, KeyPair},
    export::{LedgerExport, EXPORT_VERSION},
    types::{
        BatchDigest, ChainBreak, ChainHash, ContentMismatch, DigestMismatch, IntegrityReport,
        LedgerEntry, LedgerQuery, LedgerStats, Token, GENESIS_HASH,
    },
    Error, Result,
};
use chrono::Utc;
use rust_decimal::Decimal;
use std::collections::HashSet;
use uuid::Uuid;

/// Outcome of a single append
#[derive(Debug, Clone, PartialEq)]
pub struct Appended {
    /// The new entry (already sealed if the append closed a range)
    pub entry: LedgerEntry,

    /// Digest created by this append, if any
    pub digest: Option<BatchDigest>,
}

/// Append-only hash chain with periodic sealing
pub struct Chain {
    entries: Vec<LedgerEntry>,
    digests: Vec<BatchDigest>,
    seal_interval: u64,
    hasher: Box<dyn EntryHasher>,
    keypair: Option<KeyPair>,
}

impl std::fmt::Debug for Chain {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chain")
            .field("entries", &self.entries.len())
            .field("digests", &self.digests.len())
            .field("seal_interval", &self.seal_interval)
            .field("hash_algorithm", &self.hasher.algorithm())
            .field("signed", &self.keypair.is_some())
            .finish()
    }
}

impl Chain {
    /// Create an empty chain
    pub fn new(config: &LedgerConfig) -> Self {
        Self {
            entries: Vec::new(),
            digests: Vec::new(),
            seal_interval: config.seal_interval.max(1),
            hasher: config.hash_algorithm.hasher(),
            keypair: None,
        }
    }

    /// Replace the content hasher
    pub fn with_hasher(mut self, hasher: Box<dyn EntryHasher>) -> Self {
        self.hasher = hasher;
        self
    }

    /// Sign every new digest with this key
    pub fn with_keypair(mut self, keypair: KeyPair) -> Self {
        self.keypair = Some(keypair);
        self
    }

    /// Public key used for digest signatures
    pub fn public_key(&self) -> Option<[u8; 32]> {
        self.keypair.as_ref().map(KeyPair::public_key)
    }

    /// Name of the content hash algorithm
    pub fn hash_algorithm(&self) -> &'static str {
        self.hasher.algorithm()
    }

    /// Number of entries
    pub fn len(&self) -> u64 {
        self.entries.len() as u64
    }

    /// Check if chain is empty
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Hash of the newest entry, or genesis
    pub fn head_hash(&self) -> ChainHash {
        self.entries.last().map_or(GENESIS_HASH, |e| e.hash)
    }

    /// Append a token as the next chain entry
    ///
    /// This is the only path that writes entry content. A range seal is
    /// attempted right after the entry lands.
    pub fn append(&mut self, token: &Token) -> Result<Appended> {
        if !token.immutable {
            return Err(Error::NotImmutable { token_id: token.id });
        }

        let index = self.len();
        let hash = crypto::hash_content(
            self.hasher.as_ref(),
            &token.id,
            &token.token_type,
            &token.owner,
            &token.value,
            &token.timestamp,
        )?;
        let previous_hash = self.head_hash();

        self.entries.push(LedgerEntry {
            index,
            token_id: token.id,
            token_type: token.token_type.clone(),
            owner: token.owner.clone(),
            value: token.value,
            timestamp: token.timestamp,
            hash,
            previous_hash,
            sealed: false,
            batch_digest_id: None,
        });

        let digest = self.seal_pending();
        let entry = self.entries[index as usize].clone();

        Ok(Appended { entry, digest })
    }

    /// First index not yet covered by a digest
    fn sealed_upto(&self) -> u64 {
        self.digests.last().map_or(0, |d| d.range_end + 1)
    }

    /// Seal the next range if `seal_interval` unsealed entries are waiting
    ///
    /// Idempotent: at a given chain length, at most one digest is created for
    /// a range no matter how often this is called.
    pub fn seal_pending(&mut self) -> Option<BatchDigest> {
        let range_start = self.sealed_upto();
        if self.len() - range_start < self.seal_interval {
            return None;
        }
        let range_end = range_start + self.seal_interval - 1;

        let range = &self.entries[range_start as usize..=range_end as usize];
        let digest_hash = crypto::digest_hash(self.hasher.as_ref(), range.iter().map(|e| &e.hash));
        let signature = self.keypair.as_ref().map(|kp| kp.sign(&digest_hash));

        let digest = BatchDigest {
            digest_id: Uuid::now_v7(),
            range_start,
            range_end,
            digest_hash,
            created_at: Utc::now(),
            signature,
        };

        for entry in &mut self.entries[range_start as usize..=range_end as usize] {
            entry.mark_sealed(digest.digest_id);
        }
        self.digests.push(digest.clone());

        Some(digest)
    }

    /// Walk every link of the chain
    pub fn verify_integrity(&self) -> IntegrityReport {
        verify_chain(&self.entries)
    }

    /// Recompute digests and check signatures (when a key is given)
    pub fn verify_digests(&self, public_key: Option<&[u8; 32]>) -> Vec<DigestMismatch> {
        verify_digests(&self.entries, &self.digests, self.hasher.as_ref(), public_key)
    }

    /// Recompute every entry hash from its content
    pub fn verify_content(&self) -> Vec<ContentMismatch> {
        verify_content(&self.entries, self.hasher.as_ref())
    }

    /// Entry at `index`
    pub fn entry(&self, index: u64) -> Option<&LedgerEntry> {
        self.entries.get(index as usize)
    }

    /// Entries matching every present filter, in index order
    pub fn query(&self, query: &LedgerQuery) -> Vec<LedgerEntry> {
        let start = query.from_index.unwrap_or(0).min(self.len()) as usize;
        let end = query
            .to_index
            .map_or(self.len(), |to| to.saturating_add(1).min(self.len())) as usize;
        if start >= end {
            return Vec::new();
        }

        self.entries[start..end]
            .iter()
            .filter(|e| query.matches(e))
            .cloned()
            .collect()
    }

    /// All digests, oldest first
    pub fn digests(&self) -> &[BatchDigest] {
        &self.digests
    }

    /// Aggregate statistics
    pub fn stats(&self) -> LedgerStats {
        let owners: HashSet<_> = self.entries.iter().map(|e| &e.owner).collect();
        LedgerStats {
            total_entries: self.len(),
            sealed_entries: self.sealed_upto(),
            digest_count: self.digests.len() as u64,
            total_value: self.entries.iter().map(|e| e.value).sum::<Decimal>(),
            distinct_owners: owners.len() as u64,
            head_hash: self.head_hash(),
        }
    }

    /// Snapshot sufficient to rebuild and independently verify the chain
    pub fn export(&self) -> LedgerExport {
        LedgerExport {
            version: EXPORT_VERSION.to_string(),
            exported_at: Utc::now(),
            hash_algorithm: self.hash_algorithm().to_string(),
            public_key: self.public_key().map(hex::encode),
            entries: self.entries.clone(),
            digests: self.digests.clone(),
            stats: self.stats(),
        }
    }
}

/// Check `previous_hash` continuity for every entry from index 1
///
/// Collects every break rather than stopping at the first one.
pub fn verify_chain(entries: &[LedgerEntry]) -> IntegrityReport {
    let errors: Vec<ChainBreak> = entries
        .windows(2)
        .filter(|pair| pair[1].previous_hash != pair[0].hash)
        .map(|pair| ChainBreak {
            index: pair[1].index,
            expected: pair[0].hash,
            actual: pair[1].previous_hash,
        })
        .collect();

    for err in &errors {
        tracing::warn!(
            "Chain break at index {}: expected {}, found {}",
            err.index,
            err.expected,
            err.actual
        );
    }

    IntegrityReport {
        valid: errors.is_empty(),
        verified_count: entries.len() as u64,
        errors,
    }
}

fn rehash(hasher: &dyn EntryHasher, entry: &LedgerEntry) -> Result<ChainHash> {
    crypto::hash_content(
        hasher,
        &entry.token_id,
        &entry.token_type,
        &entry.owner,
        &entry.value,
        &entry.timestamp,
    )
}

/// Recompute each entry's hash from its content fields
///
/// Link checks alone miss an edited owner or value when the stored hash is
/// left in place; this catches it.
pub fn verify_content(entries: &[LedgerEntry], hasher: &dyn EntryHasher) -> Vec<ContentMismatch> {
    entries
        .iter()
        .filter_map(|entry| {
            let recomputed = rehash(hasher, entry).ok();
            if recomputed == Some(entry.hash) {
                return None;
            }
            tracing::warn!("Entry {} content does not match its hash", entry.index);
            Some(ContentMismatch {
                index: entry.index,
                stored: entry.hash,
                recomputed,
            })
        })
        .collect()
}

/// Recompute each digest over its range and check its signature
///
/// Every entry in a sealed range is also re-hashed from its content.
pub fn verify_digests(
    entries: &[LedgerEntry],
    digests: &[BatchDigest],
    hasher: &dyn EntryHasher,
    public_key: Option<&[u8; 32]>,
) -> Vec<DigestMismatch> {
    let mut mismatches = Vec::new();

    for digest in digests {
        let mismatch = |reason: String| DigestMismatch {
            digest_id: digest.digest_id,
            reason,
        };

        if digest.range_end < digest.range_start || digest.range_end as usize >= entries.len() {
            mismatches.push(mismatch(format!(
                "range [{}, {}] outside chain of {} entries",
                digest.range_start,
                digest.range_end,
                entries.len()
            )));
            continue;
        }

        let range = &entries[digest.range_start as usize..=digest.range_end as usize];
        for entry in range {
            match rehash(hasher, entry) {
                Ok(hash) if hash == entry.hash => {}
                Ok(_) => mismatches.push(mismatch(format!(
                    "entry {} content does not match its hash",
                    entry.index
                ))),
                Err(e) => mismatches.push(mismatch(format!("entry {}: {}", entry.index, e))),
            }
        }

        let recomputed = crypto::digest_hash(hasher, range.iter().map(|e| &e.hash));
        if recomputed != digest.digest_hash {
            mismatches.push(mismatch(format!(
                "digest hash mismatch: expected {}, recomputed {}",
                digest.digest_hash, recomputed
            )));
        }

        if let Some(entry) = range
            .iter()
            .find(|e| !e.sealed || e.batch_digest_id != Some(digest.digest_id))
        {
            mismatches.push(mismatch(format!(
                "entry {} not marked sealed by this digest",
                entry.index
            )));
        }

        if let Some(key) = public_key {
            match &digest.signature {
                Some(signature) => {
                    if let Err(e) = crypto::verify_signature(&digest.digest_hash, signature, key) {
                        mismatches.push(mismatch(e.to_string()));
                    }
                }
                None => mismatches.push(mismatch("digest is not signed".to_string())),
            }
        }
    }

    mismatches
}
