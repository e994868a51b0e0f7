//! Mintgate Ledger Core
//!
//! Append-only, hash-chained token ledger with periodic range sealing.
//!
//! # Architecture
//!
//! - **Hash Chain**: Every entry commits to its predecessor's hash
//! - **Single Writer**: One actor task owns the chain, so appends and seals never race
//! - **Sealing**: Every `seal_interval` entries are summarized under one batch digest
//! - **Pluggable Hashing**: SHA-256 by default, BLAKE3 optional
//!
//! # Invariants
//!
//! - Dense indices: entry `i` is the `i`-th append
//! - Continuity: `entries[i].previous_hash == entries[i - 1].hash`
//! - Append-only: content fields never change after append
//! - Seal-once: each range gets exactly one digest
//!
//! Corruption is only ever detected ([`Ledger::verify_integrity`]), never repaired.

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod actor;
pub mod chain;
pub mod config;
pub mod crypto;
pub mod error;
pub mod export;
pub mod ledger;
pub mod metrics;
pub mod types;

// Re-exports
pub use chain::{verify_chain, verify_content, Appended, Chain};
pub use config::Config;
pub use error::{Error, Result};
pub use export::LedgerExport;
pub use ledger::Ledger;
pub use types::{
    BatchDigest, ChainBreak, ChainHash, ContentMismatch, DigestMismatch, IntegrityReport,
    LedgerEntry, LedgerQuery, LedgerStats, OwnerId, Token, GENESIS_HASH,
};
