//! Ledger export snapshots
//!
//! An export carries everything needed to verify the chain away from the
//! live ledger: entries, digests, the hash algorithm, and the digest signing
//! key (if any).

use crate::{
    chain,
    crypto::HashAlgorithm,
    types::{
        BatchDigest, ContentMismatch, DigestMismatch, IntegrityReport, LedgerEntry, LedgerStats,
    },
    Error, Result,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Current export format version
pub const EXPORT_VERSION: &str = "1.0";

/// Snapshot of the full ledger
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerExport {
    /// Export format version
    pub version: String,

    /// Snapshot time
    pub exported_at: DateTime<Utc>,

    /// Content hash algorithm name
    pub hash_algorithm: String,

    /// Hex-encoded digest signing key
    pub public_key: Option<String>,

    /// Every entry, in index order
    pub entries: Vec<LedgerEntry>,

    /// Every digest, oldest first
    pub digests: Vec<BatchDigest>,

    /// Aggregate statistics at snapshot time
    pub stats: LedgerStats,
}

impl LedgerExport {
    /// Re-walk the exported chain
    pub fn verify(&self) -> IntegrityReport {
        chain::verify_chain(&self.entries)
    }

    /// Recompute every entry hash from its content fields
    pub fn verify_content(&self) -> Result<Vec<ContentMismatch>> {
        let algorithm = self.algorithm()?;
        Ok(chain::verify_content(
            &self.entries,
            algorithm.hasher().as_ref(),
        ))
    }

    /// Recompute exported digests (and signatures, when a key was exported)
    ///
    /// Entries inside sealed ranges are re-hashed from their content too.
    pub fn verify_digests(&self) -> Result<Vec<DigestMismatch>> {
        let algorithm = self.algorithm()?;

        let public_key = match &self.public_key {
            Some(encoded) => {
                let bytes = hex::decode(encoded).map_err(|e| Error::Encoding(e.to_string()))?;
                let key: [u8; 32] = bytes
                    .try_into()
                    .map_err(|_| Error::Encoding("public key must be 32 bytes".to_string()))?;
                Some(key)
            }
            None => None,
        };

        Ok(chain::verify_digests(
            &self.entries,
            &self.digests,
            algorithm.hasher().as_ref(),
            public_key.as_ref(),
        ))
    }

    fn algorithm(&self) -> Result<HashAlgorithm> {
        HashAlgorithm::from_name(&self.hash_algorithm).ok_or_else(|| {
            Error::Encoding(format!("Unknown hash algorithm: {}", self.hash_algorithm))
        })
    }

    /// Serialize to pretty JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Parse from JSON
    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Chain;
    use crate::config::LedgerConfig;
    use crate::crypto::KeyPair;
    use crate::types::{OwnerId, Token, GENESIS_HASH};
    use rust_decimal::Decimal;
    use std::collections::BTreeMap;
    use uuid::Uuid;

    fn filled_chain(count: i64, seal_interval: u64) -> Chain {
        let mut chain = Chain::new(&LedgerConfig {
            seal_interval,
            ..LedgerConfig::default()
        })
        .with_keypair(KeyPair::from_seed(&[3u8; 32]));

        for i in 0..count {
            chain
                .append(&Token {
                    id: Uuid::now_v7(),
                    token_type: "gold".to_string(),
                    owner: OwnerId::new(format!("owner-{}", i % 3)),
                    value: Decimal::new(i * 125, 2),
                    timestamp: Utc::now(),
                    immutable: true,
                    metadata: BTreeMap::new(),
                })
                .unwrap();
        }
        chain
    }

    #[test]
    fn test_json_roundtrip_preserves_verification() {
        let chain = filled_chain(12, 5);
        let export = chain.export();

        let parsed = LedgerExport::from_json(&export.to_json().unwrap()).unwrap();
        assert_eq!(parsed, export);
        assert_eq!(parsed.verify(), chain.verify_integrity());
        assert!(parsed.verify_digests().unwrap().is_empty());
    }

    #[test]
    fn test_tampered_export_detected() {
        let mut export = filled_chain(6, 5).export();
        export.entries[3].previous_hash = GENESIS_HASH;

        let report = export.verify();
        assert!(!report.valid);
        assert_eq!(report.errors.len(), 1);
        assert_eq!(report.errors[0].index, 3);
    }

    #[test]
    fn test_edited_owner_and_value_detected() {
        let export = filled_chain(4, 2).export();
        let mut json: serde_json::Value = serde_json::from_str(&export.to_json().unwrap()).unwrap();
        json["entries"][2]["owner"] = "mallory".into();
        json["entries"][2]["value"] = "1000000".into();
        let edited = LedgerExport::from_json(&json.to_string()).unwrap();

        assert!(edited.verify().valid);

        let content = edited.verify_content().unwrap();
        assert_eq!(content.len(), 1);
        assert_eq!(content[0].index, 2);

        let digests = edited.verify_digests().unwrap();
        assert_eq!(digests.len(), 1);
        assert_eq!(digests[0].digest_id, edited.digests[1].digest_id);

        assert!(export.verify_content().unwrap().is_empty());
    }

    #[test]
    fn test_unknown_algorithm_rejected() {
        let mut export = filled_chain(1, 5).export();
        export.hash_algorithm = "md5".to_string();
        assert!(export.verify_digests().is_err());
        assert!(export.verify_content().is_err());
    }
}
