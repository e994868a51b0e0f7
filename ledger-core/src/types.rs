//! Core types for the ledger
//!
//! All types are designed for:
//! - Deterministic serialization (bincode for hashing, JSON for export)
//! - Exact arithmetic (Decimal for token value)
//! - Hex-encoded hashes on the wire

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use uuid::Uuid;

/// Hash value of the entry preceding index 0
pub const GENESIS_HASH: ChainHash = ChainHash([0u8; 32]);

/// Hex (de)serialization for fixed-size byte arrays
mod hex_array {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer, const N: usize>(
        bytes: &[u8; N],
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&hex::encode(bytes))
    }

    pub fn deserialize<'de, D: Deserializer<'de>, const N: usize>(
        deserializer: D,
    ) -> Result<[u8; N], D::Error> {
        let encoded = String::deserialize(deserializer)?;
        let bytes = hex::decode(&encoded).map_err(D::Error::custom)?;
        bytes.try_into().map_err(|raw: Vec<u8>| {
            D::Error::custom(format!("expected {} bytes, got {}", N, raw.len()))
        })
    }
}

/// 32-byte content hash used for chain links and digests
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChainHash(#[serde(with = "hex_array")] [u8; 32]);

impl ChainHash {
    /// Wrap raw hash bytes
    pub fn from_bytes(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Raw hash bytes
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    /// Parse from a 64-character hex string
    pub fn from_hex(encoded: &str) -> crate::Result<Self> {
        let bytes = hex::decode(encoded).map_err(|e| crate::Error::Encoding(e.to_string()))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| crate::Error::Encoding(format!("hash must be 32 bytes: {}", encoded)))?;
        Ok(Self(bytes))
    }

    /// Lowercase hex form
    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }
}

impl fmt::Display for ChainHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for ChainHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ChainHash({})", self.to_hex())
    }
}

/// Ed25519 signature over a digest hash
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestSignature(#[serde(with = "hex_array")] [u8; 64]);

impl DigestSignature {
    /// Create from bytes
    pub fn from_bytes(bytes: [u8; 64]) -> Self {
        Self(bytes)
    }

    /// Get bytes
    pub fn as_bytes(&self) -> &[u8; 64] {
        &self.0
    }
}

/// Token owner identifier
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct OwnerId(String);

impl OwnerId {
    /// Create new owner ID
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get as string
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for OwnerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Token produced by the token-creation collaborator
///
/// The ledger only reads these fields; it never creates tokens itself.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    /// Token ID
    pub id: Uuid,

    /// Token type identifier (catalog key)
    pub token_type: String,

    /// Owner
    pub owner: OwnerId,

    /// Token value
    pub value: Decimal,

    /// Creation timestamp
    pub timestamp: DateTime<Utc>,

    /// Producer guarantees the record is frozen
    pub immutable: bool,

    /// Free-form metadata (not hashed)
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// One link of the hash chain
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerEntry {
    /// Dense 0-based position
    pub index: u64,

    /// Token ID
    pub token_id: Uuid,

    /// Token type
    pub token_type: String,

    /// Owner
    pub owner: OwnerId,

    /// Token value
    pub value: Decimal,

    /// Token timestamp (hashed with nanosecond precision)
    pub timestamp: DateTime<Utc>,

    /// Content hash
    pub hash: ChainHash,

    /// Hash of entry `index - 1`, or [`GENESIS_HASH`]
    pub previous_hash: ChainHash,

    /// Set once when the containing range is sealed
    pub sealed: bool,

    /// Digest that sealed this entry
    pub batch_digest_id: Option<Uuid>,
}

impl LedgerEntry {
    /// Timestamp as nanoseconds since Unix epoch
    ///
    /// Fails with [`crate::Error::Encoding`] outside roughly 1677-2262.
    pub fn timestamp_nanos(&self) -> crate::Result<i64> {
        crate::crypto::timestamp_nanos(&self.timestamp)
    }

    /// Record the sealing digest; returns false if already sealed
    pub(crate) fn mark_sealed(&mut self, digest_id: Uuid) -> bool {
        if self.sealed {
            return false;
        }
        self.sealed = true;
        self.batch_digest_id = Some(digest_id);
        true
    }
}

/// Summary hash over a sealed range of entries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BatchDigest {
    /// Unique digest ID
    pub digest_id: Uuid,

    /// First sealed index (inclusive)
    pub range_start: u64,

    /// Last sealed index (inclusive)
    pub range_end: u64,

    /// Hash over the concatenated entry hashes of the range
    pub digest_hash: ChainHash,

    /// Creation timestamp
    pub created_at: DateTime<Utc>,

    /// Signature over `digest_hash`, when a signing key is configured
    pub signature: Option<DigestSignature>,
}

impl BatchDigest {
    /// Number of entries covered
    pub fn entry_count(&self) -> u64 {
        self.range_end - self.range_start + 1
    }

    /// Whether `index` falls inside this digest's range
    pub fn covers(&self, index: u64) -> bool {
        index >= self.range_start && index <= self.range_end
    }
}

/// A broken link found while walking the chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainBreak {
    /// Index of the entry whose `previous_hash` does not match
    pub index: u64,

    /// Hash of entry `index - 1`
    pub expected: ChainHash,

    /// `previous_hash` actually stored at `index`
    pub actual: ChainHash,
}

/// Result of walking the chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntegrityReport {
    /// True iff no break was found
    pub valid: bool,

    /// Number of entries examined
    pub verified_count: u64,

    /// Every broken link, in index order
    pub errors: Vec<ChainBreak>,
}

/// A digest whose stored hash or signature does not check out
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DigestMismatch {
    /// Digest ID
    pub digest_id: Uuid,

    /// What went wrong
    pub reason: String,
}

/// An entry whose stored hash does not match its content fields
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContentMismatch {
    /// Entry index
    pub index: u64,

    /// Hash stored on the entry
    pub stored: ChainHash,

    /// Hash recomputed from content; `None` if the content cannot be encoded
    pub recomputed: Option<ChainHash>,
}

/// Conjunctive entry filter; absent fields match everything
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LedgerQuery {
    /// Owner filter
    pub owner: Option<OwnerId>,

    /// Token type filter
    pub token_type: Option<String>,

    /// Lowest index (inclusive)
    pub from_index: Option<u64>,

    /// Highest index (inclusive)
    pub to_index: Option<u64>,
}

impl LedgerQuery {
    /// Match everything
    pub fn all() -> Self {
        Self::default()
    }

    /// Restrict to one owner
    pub fn owner(mut self, owner: impl Into<String>) -> Self {
        self.owner = Some(OwnerId::new(owner));
        self
    }

    /// Restrict to one token type
    pub fn token_type(mut self, token_type: impl Into<String>) -> Self {
        self.token_type = Some(token_type.into());
        self
    }

    /// Restrict to `[from, to]`
    pub fn range(mut self, from: u64, to: u64) -> Self {
        self.from_index = Some(from);
        self.to_index = Some(to);
        self
    }

    /// Check a single entry against every present filter
    pub fn matches(&self, entry: &LedgerEntry) -> bool {
        self.owner.as_ref().map_or(true, |o| &entry.owner == o)
            && self
                .token_type
                .as_ref()
                .map_or(true, |t| &entry.token_type == t)
            && self.from_index.map_or(true, |from| entry.index >= from)
            && self.to_index.map_or(true, |to| entry.index <= to)
    }
}

/// Aggregate view of the ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerStats {
    /// Entries appended
    pub total_entries: u64,

    /// Entries covered by a digest
    pub sealed_entries: u64,

    /// Digests created
    pub digest_count: u64,

    /// Sum of entry values
    pub total_value: Decimal,

    /// Number of distinct owners
    pub distinct_owners: u64,

    /// Hash of the newest entry (genesis when empty)
    pub head_hash: ChainHash,
}
