//! Admission controller configuration

use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Charge accumulation and abuse detection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AdmissionConfig {
    /// Charge gained per unit of activity intensity
    pub charge_rate: f64,

    /// Charge required before a mint may be admitted
    pub threshold: f64,

    /// Upper bound of the charge
    pub max_charge: f64,

    /// Charge consumed by one successful discharge
    pub discharge_amount: f64,

    /// Trailing activity history size (oldest evicted first)
    pub history_capacity: usize,

    /// Number of trailing events inspected by abuse detection
    pub abuse_window: usize,

    /// Window span below which activity counts as rapid-fire (ms)
    pub rapid_fire_window_ms: i64,

    /// Trailing run of one activity kind that counts as repetitive
    pub repetitive_min_run: usize,

    /// Suggested throttle after rapid-fire activity (ms)
    pub throttle_cooldown_ms: u64,

    /// Fraction of charge lost per idle tick
    pub idle_decay_rate: f64,

    /// Idle decay tick interval (ms)
    pub idle_decay_interval_ms: u64,
}

impl Default for AdmissionConfig {
    fn default() -> Self {
        Self {
            charge_rate: 1.0,
            threshold: 100.0,
            max_charge: 1000.0,
            discharge_amount: 20.0,
            history_capacity: 100,
            abuse_window: 10,
            rapid_fire_window_ms: 1000,
            repetitive_min_run: 8,
            throttle_cooldown_ms: 5000,
            idle_decay_rate: 0.05,
            idle_decay_interval_ms: 1000,
        }
    }
}

impl AdmissionConfig {
    /// Load from a TOML file
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: AdmissionConfig = toml::from_str(&content)
            .map_err(|e| Error::InvalidConfig(format!("Failed to parse config: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Defaults overlaid with `ADMISSION_*` environment variables
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();
        config.apply_env()?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay `ADMISSION_*` environment variables onto this config
    pub fn apply_env(&mut self) -> Result<()> {
        fn parse<T: std::str::FromStr>(name: &str, target: &mut T) -> Result<()>
        where
            T::Err: std::fmt::Display,
        {
            if let Ok(raw) = std::env::var(name) {
                *target = raw
                    .parse()
                    .map_err(|e| Error::InvalidConfig(format!("Invalid {} '{}': {}", name, raw, e)))?;
            }
            Ok(())
        }

        parse("ADMISSION_CHARGE_RATE", &mut self.charge_rate)?;
        parse("ADMISSION_THRESHOLD", &mut self.threshold)?;
        parse("ADMISSION_MAX_CHARGE", &mut self.max_charge)?;
        parse("ADMISSION_DISCHARGE_AMOUNT", &mut self.discharge_amount)?;
        Ok(())
    }

    /// Reject settings the controller cannot honor
    pub fn validate(&self) -> Result<()> {
        let finite_non_negative = |v: f64| v.is_finite() && v >= 0.0;

        if !(self.threshold.is_finite() && self.threshold > 0.0) {
            return Err(Error::InvalidConfig(format!(
                "threshold must be positive, got {}",
                self.threshold
            )));
        }
        if !self.max_charge.is_finite() || self.max_charge < self.threshold {
            return Err(Error::InvalidConfig(format!(
                "max_charge {} must be at least threshold {}",
                self.max_charge, self.threshold
            )));
        }
        if !finite_non_negative(self.charge_rate) || !finite_non_negative(self.discharge_amount) {
            return Err(Error::InvalidConfig(
                "charge_rate and discharge_amount must be finite and non-negative".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.idle_decay_rate) {
            return Err(Error::InvalidConfig(format!(
                "idle_decay_rate must be within [0, 1], got {}",
                self.idle_decay_rate
            )));
        }
        if self.abuse_window < 2 || self.history_capacity < self.abuse_window {
            return Err(Error::InvalidConfig(format!(
                "history_capacity {} must hold the abuse window {} (>= 2)",
                self.history_capacity, self.abuse_window
            )));
        }
        if self.repetitive_min_run == 0 || self.repetitive_min_run > self.abuse_window {
            return Err(Error::InvalidConfig(format!(
                "repetitive_min_run must be within [1, {}]",
                self.abuse_window
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config_valid() {
        let config = AdmissionConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.threshold, 100.0);
        assert_eq!(config.history_capacity, 100);
    }

    #[test]
    fn test_max_below_threshold_rejected() {
        let config = AdmissionConfig {
            max_charge: 50.0,
            ..AdmissionConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_window_larger_than_history_rejected() {
        let config = AdmissionConfig {
            history_capacity: 5,
            ..AdmissionConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "threshold = 40.0\ndischarge_amount = 5.0").unwrap();

        let config = AdmissionConfig::from_file(file.path()).unwrap();
        assert_eq!(config.threshold, 40.0);
        assert_eq!(config.discharge_amount, 5.0);
        assert_eq!(config.max_charge, 1000.0);
    }
}
