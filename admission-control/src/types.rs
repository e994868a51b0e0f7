//! Core types for admission control

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// A single observed unit of user activity
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ActivityEvent {
    /// Activity kind (e.g. "click", "scroll")
    pub kind: String,

    /// Non-negative activity weight
    pub intensity: f64,

    /// When the activity was observed
    pub observed_at: DateTime<Utc>,
}

/// Snapshot of the controller's charge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChargeState {
    /// Current charge, always within `[0, max_charge]`
    pub charge: f64,

    /// Admission threshold
    pub threshold: f64,

    /// Upper bound of the charge
    pub max_charge: f64,

    /// Last successful discharge
    pub last_discharge_at: Option<DateTime<Utc>>,
}

impl ChargeState {
    /// Whether the charge admits a mint
    pub fn can_mint(&self) -> bool {
        self.charge >= self.threshold
    }
}

/// Result of registering activity
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ActivityOutcome {
    /// Charge after the activity was applied
    pub charge: f64,

    /// Whether the new charge admits a mint
    pub can_mint: bool,
}

/// Successful discharge
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Discharge {
    /// Charge remaining after the discharge
    pub charge: f64,

    /// When the discharge happened
    pub timestamp: DateTime<Utc>,
}

/// Detected abuse pattern
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AbusePattern {
    /// Burst of events in a very short span
    RapidFire,
    /// Same activity kind repeated
    Repetitive,
}

impl std::fmt::Display for AbusePattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AbusePattern::RapidFire => write!(f, "rapid_fire"),
            AbusePattern::Repetitive => write!(f, "repetitive"),
        }
    }
}

/// Action recommended to the caller
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "action")]
pub enum RecommendedAction {
    /// Hold off admissions for the cooldown
    Throttle {
        /// Suggested cooldown
        #[serde(with = "duration_ms")]
        cooldown: Duration,
    },
    /// Require different activity kinds before admitting again
    RequireVariety,
}

/// Advisory abuse detection result
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AbuseReport {
    /// Whether any pattern matched
    pub abuse_detected: bool,

    /// Matched pattern
    pub pattern: Option<AbusePattern>,

    /// What the caller should do about it
    pub recommended_action: Option<RecommendedAction>,
}

impl AbuseReport {
    /// Report with no findings
    pub fn clean() -> Self {
        Self {
            abuse_detected: false,
            pattern: None,
            recommended_action: None,
        }
    }

    /// Report for a matched pattern
    pub fn detected(pattern: AbusePattern, action: RecommendedAction) -> Self {
        Self {
            abuse_detected: true,
            pattern: Some(pattern),
            recommended_action: Some(action),
        }
    }
}

mod duration_ms {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}
