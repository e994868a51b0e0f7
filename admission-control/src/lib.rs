//! Mintgate Admission Control
//!
//! Gates mint admission behind an accumulated activity charge and flags
//! burst or repetitive activity.
//!
//! - Charge grows with activity (`intensity × charge_rate`) and is clamped to `[0, max_charge]`
//! - A mint is admitted once charge reaches the threshold; admission discharges a fixed amount
//! - Abuse detection is advisory: callers decide whether to honor it

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod config;
pub mod controller;
pub mod error;
pub mod history;
pub mod types;

pub use config::AdmissionConfig;
pub use controller::{spawn_idle_decay, AdmissionController};
pub use error::{Error, Result};
pub use types::*;
