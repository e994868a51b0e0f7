//! Configuration for the ledger

use crate::crypto::HashAlgorithm;
use serde::{Deserialize, Serialize};

/// Ledger configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Chain configuration
    pub ledger: LedgerConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            service_name: "ledger-core".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            ledger: LedgerConfig::default(),
        }
    }
}

/// Chain and sealing configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LedgerConfig {
    /// Seal a digest every N appended entries
    pub seal_interval: u64,

    /// Content hash algorithm
    pub hash_algorithm: HashAlgorithm,

    /// Writer actor mailbox capacity (backpressure bound)
    pub mailbox_capacity: usize,

    /// Sign each digest with a generated Ed25519 key
    pub sign_digests: bool,
}

impl Default for LedgerConfig {
    fn default() -> Self {
        Self {
            seal_interval: 100,
            hash_algorithm: HashAlgorithm::Sha256,
            mailbox_capacity: 1000,
            sign_digests: false,
        }
    }
}

impl Config {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| crate::Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> crate::Result<Self> {
        let mut config = Config::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay `LEDGER_*` environment variables onto this config
    pub fn apply_env(&mut self) -> crate::Result<()> {
        if let Ok(interval) = std::env::var("LEDGER_SEAL_INTERVAL") {
            self.ledger.seal_interval = interval.parse().map_err(|e| {
                crate::Error::Config(format!("Invalid LEDGER_SEAL_INTERVAL '{}': {}", interval, e))
            })?;
        }

        if let Ok(name) = std::env::var("LEDGER_HASH_ALGORITHM") {
            self.ledger.hash_algorithm = HashAlgorithm::from_name(&name).ok_or_else(|| {
                crate::Error::Config(format!("Unknown hash algorithm: {}", name))
            })?;
        }

        if let Ok(flag) = std::env::var("LEDGER_SIGN_DIGESTS") {
            self.ledger.sign_digests = matches!(flag.as_str(), "1" | "true" | "yes");
        }

        Ok(())
    }

    /// Reject values the chain cannot operate with
    pub fn validate(&self) -> crate::Result<()> {
        if self.ledger.seal_interval == 0 {
            return Err(crate::Error::Config(
                "seal_interval must be at least 1".to_string(),
            ));
        }
        if self.ledger.mailbox_capacity == 0 {
            return Err(crate::Error::Config(
                "mailbox_capacity must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}
