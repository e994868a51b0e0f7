//! Configuration for the mint queue and the assembled pipeline

use admission_control::AdmissionConfig;
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Pipeline configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Service name
    pub service_name: String,

    /// Service version
    pub service_version: String,

    /// Admission controller settings
    pub admission: AdmissionConfig,

    /// Ledger settings
    pub ledger: ledger_core::Config,

    /// Batch queue settings
    pub queue: QueueConfig,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            service_name: "mint-pipeline".to_string(),
            service_version: env!("CARGO_PKG_VERSION").to_string(),
            admission: AdmissionConfig::default(),
            ledger: ledger_core::Config::default(),
            queue: QueueConfig::default(),
        }
    }
}

/// Batch queue configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QueueConfig {
    /// Items per drained batch
    pub batch_size: usize,

    /// Pending depth that triggers automatic processing
    pub min_auto_batch: usize,

    /// Expected processing time of one batch (ms), used for wait estimates
    pub estimated_batch_ms: u64,

    /// Token creation timeout per item (ms)
    pub item_timeout_ms: u64,

    /// Refuse admission while abuse is detected
    pub honor_abuse_signals: bool,

    /// Automatic processing poll interval (ms)
    pub auto_process_interval_ms: u64,
}

impl Default for QueueConfig {
    fn default() -> Self {
        Self {
            batch_size: 10,
            min_auto_batch: 10,
            estimated_batch_ms: 250,
            item_timeout_ms: 2000,
            honor_abuse_signals: true,
            auto_process_interval_ms: 500,
        }
    }
}

impl QueueConfig {
    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.batch_size == 0 {
            return Err(Error::Config("batch_size must be > 0".to_string()));
        }
        if self.min_auto_batch == 0 {
            return Err(Error::Config("min_auto_batch must be > 0".to_string()));
        }
        if self.item_timeout_ms == 0 || self.auto_process_interval_ms == 0 {
            return Err(Error::Config(
                "item_timeout_ms and auto_process_interval_ms must be > 0".to_string(),
            ));
        }
        Ok(())
    }
}

impl PipelineConfig {
    /// Load from file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: PipelineConfig = toml::from_str(&content)
            .map_err(|e| Error::Config(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load from environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = PipelineConfig::default();

        if let Ok(size) = std::env::var("MINT_BATCH_SIZE") {
            config.queue.batch_size = size
                .parse()
                .map_err(|e| Error::Config(format!("Invalid MINT_BATCH_SIZE '{}': {}", size, e)))?;
        }

        if let Ok(min) = std::env::var("MINT_MIN_AUTO_BATCH") {
            config.queue.min_auto_batch = min
                .parse()
                .map_err(|e| Error::Config(format!("Invalid MINT_MIN_AUTO_BATCH '{}': {}", min, e)))?;
        }

        if let Ok(honor) = std::env::var("MINT_HONOR_ABUSE_SIGNALS") {
            config.queue.honor_abuse_signals = honor.parse().map_err(|e| {
                Error::Config(format!("Invalid MINT_HONOR_ABUSE_SIGNALS '{}': {}", honor, e))
            })?;
        }

        config.admission.apply_env()?;
        config.ledger.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.admission.validate()?;
        self.ledger.validate()?;
        self.queue.validate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = PipelineConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.queue.batch_size, 10);
        assert_eq!(config.ledger.ledger.seal_interval, 100);
        assert_eq!(config.admission.threshold, 100.0);
    }

    #[test]
    fn test_zero_batch_size_rejected() {
        let mut config = PipelineConfig::default();
        config.queue.batch_size = 0;
        assert!(matches!(config.validate(), Err(Error::Config(_))));
    }

    #[test]
    fn test_nested_sections_validated() {
        let mut config = PipelineConfig::default();
        config.admission.max_charge = 1.0;
        assert!(matches!(config.validate(), Err(Error::Admission(_))));

        let mut config = PipelineConfig::default();
        config.ledger.ledger.seal_interval = 0;
        assert!(matches!(config.validate(), Err(Error::Ledger(_))));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
service_name = "mint-test"

[admission]
threshold = 50.0

[ledger.ledger]
seal_interval = 5
hash_algorithm = "blake3"

[queue]
batch_size = 4
honor_abuse_signals = false
"#
        )
        .unwrap();

        let config = PipelineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.service_name, "mint-test");
        assert_eq!(config.admission.threshold, 50.0);
        assert_eq!(config.ledger.ledger.seal_interval, 5);
        assert_eq!(config.queue.batch_size, 4);
        assert!(!config.queue.honor_abuse_signals);
        assert_eq!(config.queue.min_auto_batch, 10);
    }
}
