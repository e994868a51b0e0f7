//! Charge accumulator and abuse detector
//!
//! One controller owns one [`ChargeState`] and its trailing activity history.
//! All reads and writes go through a single mutex, so concurrent activity
//! sources never observe a torn update.

use crate::{
    config::AdmissionConfig,
    history::ActivityHistory,
    types::{
        AbusePattern, AbuseReport, ActivityEvent, ActivityOutcome, ChargeState, Discharge,
        RecommendedAction,
    },
    Error, Result,
};
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

struct Inner {
    charge: f64,
    last_discharge_at: Option<DateTime<Utc>>,
    last_activity_at: Option<DateTime<Utc>>,
    history: ActivityHistory,
}

/// Admission controller gating mints behind an accumulated charge
pub struct AdmissionController {
    config: AdmissionConfig,
    inner: Mutex<Inner>,
}

impl std::fmt::Debug for AdmissionController {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdmissionController")
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}

impl AdmissionController {
    /// Create a controller with zero charge
    pub fn new(config: AdmissionConfig) -> Result<Self> {
        config.validate()?;
        let history = ActivityHistory::new(config.history_capacity);
        Ok(Self {
            config,
            inner: Mutex::new(Inner {
                charge: 0.0,
                last_discharge_at: None,
                last_activity_at: None,
                history,
            }),
        })
    }

    /// Configuration
    pub fn config(&self) -> &AdmissionConfig {
        &self.config
    }

    /// Register activity observed now
    pub fn register_activity(&self, kind: impl Into<String>, intensity: f64) -> ActivityOutcome {
        self.register_activity_at(kind, intensity, Utc::now())
    }

    /// Register activity with an explicit observation time
    ///
    /// Never fails. Negative or non-finite intensity counts as zero.
    pub fn register_activity_at(
        &self,
        kind: impl Into<String>,
        intensity: f64,
        observed_at: DateTime<Utc>,
    ) -> ActivityOutcome {
        let kind = kind.into();
        let intensity = if intensity.is_finite() && intensity >= 0.0 {
            intensity
        } else {
            warn!("Ignoring invalid intensity {} for activity '{}'", intensity, kind);
            0.0
        };

        let mut inner = self.inner.lock();
        inner.charge = self.clamp(inner.charge + intensity * self.config.charge_rate);
        inner.last_activity_at = Some(observed_at);
        inner.history.push(ActivityEvent {
            kind,
            intensity,
            observed_at,
        });

        ActivityOutcome {
            charge: inner.charge,
            can_mint: inner.charge >= self.config.threshold,
        }
    }

    /// Whether the current charge admits a mint
    pub fn can_mint(&self) -> bool {
        self.inner.lock().charge >= self.config.threshold
    }

    /// Spend `discharge_amount` of charge to admit one mint
    pub fn attempt_discharge(&self) -> Result<Discharge> {
        let mut inner = self.inner.lock();

        if inner.charge < self.config.threshold {
            let needed = self.config.threshold - inner.charge;
            debug!(
                "Discharge rejected: charge {:.2} below threshold {:.2}",
                inner.charge, self.config.threshold
            );
            return Err(Error::InsufficientCharge {
                charge: inner.charge,
                threshold: self.config.threshold,
                needed,
            });
        }

        let timestamp = Utc::now();
        inner.charge = (inner.charge - self.config.discharge_amount).max(0.0);
        inner.last_discharge_at = Some(timestamp);

        info!("Discharged {:.2}, charge now {:.2}", self.config.discharge_amount, inner.charge);

        Ok(Discharge {
            charge: inner.charge,
            timestamp,
        })
    }

    /// Lose a fraction of the charge; `rate` is clamped to `[0, 1]`
    pub fn decay(&self, rate: f64) -> f64 {
        let rate = if rate.is_nan() { 0.0 } else { rate.clamp(0.0, 1.0) };
        let mut inner = self.inner.lock();
        inner.charge = self.clamp(inner.charge - inner.charge * rate);
        inner.charge
    }

    /// Raise the charge directly, bypassing accumulation
    pub fn boost(&self, amount: f64) -> f64 {
        let amount = if amount.is_finite() { amount.max(0.0) } else { 0.0 };
        let mut inner = self.inner.lock();
        inner.charge = self.clamp(inner.charge + amount);
        info!("Charge boosted by {:.2} to {:.2}", amount, inner.charge);
        inner.charge
    }

    /// Inspect the trailing history for abuse patterns
    ///
    /// Advisory only: nothing here blocks further activity.
    pub fn detect_abuse(&self) -> AbuseReport {
        let inner = self.inner.lock();
        let window = self.config.abuse_window;

        let Some(span_ms) = inner.history.tail_span_ms(window) else {
            return AbuseReport::clean();
        };

        if span_ms < self.config.rapid_fire_window_ms {
            warn!("Rapid-fire activity: {} events in {}ms", window, span_ms);
            return AbuseReport::detected(
                AbusePattern::RapidFire,
                RecommendedAction::Throttle {
                    cooldown: Duration::from_millis(self.config.throttle_cooldown_ms),
                },
            );
        }

        let run = inner.history.trailing_run(window);
        if run >= self.config.repetitive_min_run {
            warn!("Repetitive activity: last {} events share one kind", run);
            return AbuseReport::detected(AbusePattern::Repetitive, RecommendedAction::RequireVariety);
        }

        AbuseReport::clean()
    }

    /// Snapshot of the charge
    pub fn state(&self) -> ChargeState {
        let inner = self.inner.lock();
        ChargeState {
            charge: inner.charge,
            threshold: self.config.threshold,
            max_charge: self.config.max_charge,
            last_discharge_at: inner.last_discharge_at,
        }
    }

    /// Number of retained activity events
    pub fn history_len(&self) -> usize {
        self.inner.lock().history.len()
    }

    /// Apply one idle tick: decay only if no activity arrived within `idle_for`
    fn decay_if_idle(&self, idle_for: Duration, rate: f64) -> Option<f64> {
        let idle = {
            let inner = self.inner.lock();
            let cutoff = Utc::now()
                - chrono::Duration::from_std(idle_for).unwrap_or_else(|_| chrono::Duration::zero());
            inner.last_activity_at.map_or(true, |at| at < cutoff) && inner.charge > 0.0
        };
        idle.then(|| self.decay(rate))
    }

    fn clamp(&self, charge: f64) -> f64 {
        charge.clamp(0.0, self.config.max_charge)
    }
}

/// Start a background task that decays idle charge on every tick
///
/// Abort the returned handle to stop decaying.
pub fn spawn_idle_decay(
    controller: Arc<AdmissionController>,
    interval: Duration,
    rate: f64,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        // First tick completes immediately
        ticker.tick().await;

        loop {
            ticker.tick().await;
            if let Some(charge) = controller.decay_if_idle(interval, rate) {
                debug!("Idle decay applied, charge now {:.2}", charge);
            }
        }
    })
}
