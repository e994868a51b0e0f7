//! Cryptographic operations for the ledger
//!
//! This module provides:
//! - Pluggable content hashing ([`EntryHasher`]) with SHA-256 and BLAKE3 backends
//! - Canonical entry content bytes for the chain hash
//! - Range digests over concatenated entry hashes
//! - Ed25519 key pairs for optional digest signing
//!
//! The chain and digests give tamper *evidence* inside the process; they are
//! not a security boundary unless digests are signed with a protected key.

use crate::types::{ChainHash, DigestSignature, OwnerId};
use crate::{Error, Result};
use chrono::{DateTime, Utc};
use ed25519_dalek::{Signature as DalekSignature, Signer, SigningKey, Verifier, VerifyingKey};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use uuid::Uuid;

/// Deterministic, collision-resistant hash used for entries and digests
pub trait EntryHasher: Send + Sync {
    /// Short algorithm name (used in exports and logs)
    fn algorithm(&self) -> &'static str;

    /// Hash arbitrary bytes
    fn hash(&self, data: &[u8]) -> [u8; 32];
}

/// SHA-256 hasher (default)
#[derive(Debug, Clone, Copy, Default)]
pub struct Sha256Hasher;

impl EntryHasher for Sha256Hasher {
    fn algorithm(&self) -> &'static str {
        "sha256"
    }

    fn hash(&self, data: &[u8]) -> [u8; 32] {
        let mut hasher = Sha256::new();
        hasher.update(data);
        hasher.finalize().into()
    }
}

/// BLAKE3 hasher
#[derive(Debug, Clone, Copy, Default)]
pub struct Blake3Hasher;

impl EntryHasher for Blake3Hasher {
    fn algorithm(&self) -> &'static str {
        "blake3"
    }

    fn hash(&self, data: &[u8]) -> [u8; 32] {
        *blake3::hash(data).as_bytes()
    }
}

/// Supported hash algorithms (configuration form of [`EntryHasher`])
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HashAlgorithm {
    /// SHA-256
    #[default]
    Sha256,
    /// BLAKE3
    Blake3,
}

impl HashAlgorithm {
    /// Build the matching hasher
    pub fn hasher(&self) -> Box<dyn EntryHasher> {
        match self {
            HashAlgorithm::Sha256 => Box::new(Sha256Hasher),
            HashAlgorithm::Blake3 => Box::new(Blake3Hasher),
        }
    }

    /// Parse from a config string
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "sha256" | "sha-256" => Some(HashAlgorithm::Sha256),
            "blake3" => Some(HashAlgorithm::Blake3),
            _ => None,
        }
    }
}

/// Hashed fields of an entry, in hashing order
#[derive(Serialize)]
struct EntryContent<'a> {
    token_id: &'a Uuid,
    token_type: &'a str,
    owner: &'a str,
    value: &'a Decimal,
    timestamp_nanos: i64,
}

/// Nanoseconds since the Unix epoch, the hashed form of a timestamp
pub fn timestamp_nanos(timestamp: &DateTime<Utc>) -> Result<i64> {
    timestamp.timestamp_nanos_opt().ok_or_else(|| {
        Error::Encoding(format!(
            "timestamp {} is outside the nanosecond range",
            timestamp
        ))
    })
}

/// Canonical bytes of `tokenId ∥ type ∥ owner ∥ value ∥ timestamp`
///
/// bincode length-prefixes strings, so field boundaries are unambiguous.
pub fn content_bytes(
    token_id: &Uuid,
    token_type: &str,
    owner: &OwnerId,
    value: &Decimal,
    timestamp: &DateTime<Utc>,
) -> Result<Vec<u8>> {
    let content = EntryContent {
        token_id,
        token_type,
        owner: owner.as_str(),
        value,
        timestamp_nanos: timestamp_nanos(timestamp)?,
    };
    Ok(bincode::serialize(&content)?)
}

/// Hash the content fields of an entry
pub fn hash_content(
    hasher: &dyn EntryHasher,
    token_id: &Uuid,
    token_type: &str,
    owner: &OwnerId,
    value: &Decimal,
    timestamp: &DateTime<Utc>,
) -> Result<ChainHash> {
    let bytes = content_bytes(token_id, token_type, owner, value, timestamp)?;
    Ok(ChainHash::from_bytes(hasher.hash(&bytes)))
}

/// Digest over the concatenation of a range's entry hashes
pub fn digest_hash<'a>(
    hasher: &dyn EntryHasher,
    hashes: impl IntoIterator<Item = &'a ChainHash>,
) -> ChainHash {
    let mut buffer = Vec::new();
    for hash in hashes {
        buffer.extend_from_slice(hash.as_bytes());
    }
    ChainHash::from_bytes(hasher.hash(&buffer))
}

/// Ed25519 key pair for signing digests
#[derive(Debug)]
pub struct KeyPair {
    signing_key: SigningKey,
    verifying_key: VerifyingKey,
}

impl KeyPair {
    /// Generate a new random key pair
    pub fn generate() -> Self {
        Self::from_seed(&rand::random::<[u8; 32]>())
    }

    /// Create from seed (32 bytes) - deterministic generation
    pub fn from_seed(seed: &[u8; 32]) -> Self {
        let signing_key = SigningKey::from_bytes(seed);
        let verifying_key = signing_key.verifying_key();

        Self {
            signing_key,
            verifying_key,
        }
    }

    /// Get public key bytes
    pub fn public_key(&self) -> [u8; 32] {
        self.verifying_key.to_bytes()
    }

    /// Sign a digest hash
    pub fn sign(&self, hash: &ChainHash) -> DigestSignature {
        let signature = self.signing_key.sign(hash.as_bytes());
        DigestSignature::from_bytes(signature.to_bytes())
    }
}

/// Verify a digest signature against a public key
pub fn verify_signature(
    hash: &ChainHash,
    signature: &DigestSignature,
    public_key: &[u8; 32],
) -> Result<()> {
    let verifying_key = VerifyingKey::from_bytes(public_key)
        .map_err(|e| Error::SignatureError(format!("Invalid public key: {}", e)))?;
    let dalek_sig = DalekSignature::from_bytes(signature.as_bytes());

    verifying_key
        .verify(hash.as_bytes(), &dalek_sig)
        .map_err(|e| Error::SignatureError(format!("Verification failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn sample_content(hasher: &dyn EntryHasher, owner: &str) -> ChainHash {
        let token_id = Uuid::from_u128(42);
        let timestamp = DateTime::from_timestamp_nanos(1_700_000_000_000_000_000);
        hash_content(
            hasher,
            &token_id,
            "gold",
            &OwnerId::new(owner),
            &Decimal::new(1050, 2),
            &timestamp,
        )
        .unwrap()
    }

    #[test]
    fn test_content_hash_deterministic() {
        assert_eq!(
            sample_content(&Sha256Hasher, "alice"),
            sample_content(&Sha256Hasher, "alice")
        );
    }

    #[test]
    fn test_timestamp_outside_nanosecond_range() {
        let late = Utc.with_ymd_and_hms(2300, 1, 1, 0, 0, 0).unwrap();
        assert!(matches!(timestamp_nanos(&late), Err(Error::Encoding(_))));
        assert!(matches!(
            content_bytes(&Uuid::from_u128(1), "gold", &OwnerId::new("a"), &Decimal::ONE, &late),
            Err(Error::Encoding(_))
        ));

        let epoch = DateTime::from_timestamp_nanos(0);
        assert_eq!(timestamp_nanos(&epoch).unwrap(), 0);
    }

    #[test]
    fn test_content_hash_depends_on_fields() {
        assert_ne!(
            sample_content(&Sha256Hasher, "alice"),
            sample_content(&Sha256Hasher, "bob")
        );
    }

    #[test]
    fn test_field_boundaries_unambiguous() {
        let token_id = Uuid::from_u128(1);
        let now = Utc::now();
        let a = content_bytes(&token_id, "ab", &OwnerId::new("c"), &Decimal::ONE, &now).unwrap();
        let b = content_bytes(&token_id, "a", &OwnerId::new("bc"), &Decimal::ONE, &now).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_algorithms_differ() {
        assert_ne!(
            sample_content(&Sha256Hasher, "alice"),
            sample_content(&Blake3Hasher, "alice")
        );
        assert_eq!(HashAlgorithm::Blake3.hasher().algorithm(), "blake3");
        assert_eq!(HashAlgorithm::from_name("SHA256"), Some(HashAlgorithm::Sha256));
        assert_eq!(HashAlgorithm::from_name("md5"), None);
    }

    #[test]
    fn test_digest_hash_is_hash_of_concatenation() {
        let h1 = ChainHash::from_bytes([1u8; 32]);
        let h2 = ChainHash::from_bytes([2u8; 32]);

        let mut concatenated = Vec::new();
        concatenated.extend_from_slice(&[1u8; 32]);
        concatenated.extend_from_slice(&[2u8; 32]);

        assert_eq!(
            digest_hash(&Sha256Hasher, [&h1, &h2]),
            ChainHash::from_bytes(Sha256Hasher.hash(&concatenated))
        );
        assert_ne!(
            digest_hash(&Sha256Hasher, [&h1, &h2]),
            digest_hash(&Sha256Hasher, [&h2, &h1])
        );
    }

    #[test]
    fn test_keypair_from_seed() {
        let seed = [42u8; 32];
        assert_eq!(
            KeyPair::from_seed(&seed).public_key(),
            KeyPair::from_seed(&seed).public_key()
        );
    }

    #[test]
    fn test_sign_and_verify_digest() {
        let keypair = KeyPair::generate();
        let hash = ChainHash::from_bytes([7u8; 32]);
        let signature = keypair.sign(&hash);

        assert!(verify_signature(&hash, &signature, &keypair.public_key()).is_ok());

        let other = ChainHash::from_bytes([8u8; 32]);
        assert!(verify_signature(&other, &signature, &keypair.public_key()).is_err());

        let wrong_key = KeyPair::generate().public_key();
        assert!(verify_signature(&hash, &signature, &wrong_key).is_err());
    }
}
