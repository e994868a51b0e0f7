//! Mintgate Mint Queue
//!
//! Batches admitted mint requests and commits them to the hash-chained ledger.
//!
//! # Flow
//!
//! 1. **Admission**: activity charges the [`admission_control::AdmissionController`];
//!    a mint request is admitted by discharging it
//! 2. **Queueing**: admitted requests wait in FIFO order in the [`BatchQueue`]
//! 3. **Processing**: one drained [`BatchJob`] at a time; each item is created by a
//!    [`TokenFactory`] and appended to the [`ledger_core::Ledger`]
//! 4. **Fan-out**: committed entries are delivered best-effort to every [`DeliverySink`]
//!
//! Per-item failures are isolated in [`BatchResult::failures`]; they never abort a batch.

#![forbid(unsafe_code)]
#![warn(
    missing_docs,
    rust_2018_idioms,
    missing_debug_implementations,
    clippy::all
)]

pub mod collaborator;
pub mod config;
pub mod error;
pub mod metrics;
pub mod pipeline;
pub mod queue;
pub mod sinks;
pub mod types;

// Re-exports
pub use collaborator::{
    CatalogTokenFactory, StaticCatalog, TokenCatalog, TokenFactory, TokenTypeInfo,
    ValidationError,
};
pub use config::{PipelineConfig, QueueConfig};
pub use error::{Error, Result};
pub use pipeline::{BackgroundTasks, MintPipeline};
pub use queue::{spawn_auto_process, BatchQueue};
pub use sinks::{DeliverySink, SinkError, TracingSink};
pub use types::*;
