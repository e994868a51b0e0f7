//! Admission → queue → ledger wiring
//!
//! # Example
//!
//! ```no_run
//! use mint_queue::{CatalogTokenFactory, MintPipeline, MintRequest, PipelineConfig, StaticCatalog};
//! use rust_decimal::Decimal;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> mint_queue::Result<()> {
//!     let factory = Arc::new(CatalogTokenFactory::new(Arc::new(StaticCatalog::standard())));
//!     let pipeline = MintPipeline::new(PipelineConfig::default(), factory, Vec::new()).await?;
//!
//!     pipeline.register_activity("click", 100.0);
//!     let receipt = pipeline.request_mint(MintRequest::new("gold", "alice", Decimal::ONE))?;
//!     println!("queued at position {}", receipt.position);
//!
//!     pipeline.queue().process_all().await?;
//!     pipeline.shutdown().await
//! }
//! ```

use crate::{
    collaborator::TokenFactory,
    config::PipelineConfig,
    queue::{spawn_auto_process, BatchQueue},
    sinks::DeliverySink,
    types::{EnqueueReceipt, MintRequest},
    Error, Result,
};
use admission_control::{spawn_idle_decay, ActivityOutcome, AdmissionController};
use ledger_core::Ledger;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;

/// Admission controller, batch queue and ledger behind one handle
#[derive(Debug)]
pub struct MintPipeline {
    controller: Arc<AdmissionController>,
    queue: Arc<BatchQueue>,
    ledger: Ledger,
    config: PipelineConfig,
}

/// Background loops started by [`MintPipeline::start_background_tasks`]
#[derive(Debug)]
pub struct BackgroundTasks {
    shutdown: watch::Sender<bool>,
    auto_process: Option<JoinHandle<()>>,
    idle_decay: Option<JoinHandle<()>>,
}

impl BackgroundTasks {
    /// Stop every loop immediately
    ///
    /// A batch cut off here returns its unstarted items to the queue.
    pub fn abort(&self) {
        self.shutdown.send_replace(true);
        for handle in self.auto_process.iter().chain(self.idle_decay.iter()) {
            handle.abort();
        }
    }

    /// Stop every loop and wait until none is running
    ///
    /// The auto-process loop finishes the batch it is working on first.
    pub async fn stop(mut self) {
        self.shutdown.send_replace(true);

        if let Some(handle) = self.idle_decay.take() {
            handle.abort();
            join_background(handle).await;
        }
        if let Some(handle) = self.auto_process.take() {
            join_background(handle).await;
        }
    }
}

async fn join_background(handle: JoinHandle<()>) {
    if let Err(e) = handle.await {
        if !e.is_cancelled() {
            tracing::error!("Background task failed: {}", e);
        }
    }
}

impl Drop for BackgroundTasks {
    fn drop(&mut self) {
        self.abort();
    }
}

impl MintPipeline {
    /// Open the ledger and assemble the pipeline
    pub async fn new(
        config: PipelineConfig,
        factory: Arc<dyn TokenFactory>,
        sinks: Vec<Arc<dyn DeliverySink>>,
    ) -> Result<Self> {
        config.validate()?;

        let controller = Arc::new(AdmissionController::new(config.admission.clone())?);
        let ledger = Ledger::open(config.ledger.clone()).await?;

        let queue = sinks.into_iter().fold(
            BatchQueue::new(config.queue.clone(), factory, ledger.clone())?,
            BatchQueue::with_sink,
        );

        tracing::info!(
            "{} v{} ready (threshold {}, batch size {})",
            config.service_name,
            config.service_version,
            config.admission.threshold,
            config.queue.batch_size
        );

        Ok(Self {
            controller,
            queue: Arc::new(queue),
            ledger,
            config,
        })
    }

    /// Feed one activity event to the admission controller
    pub fn register_activity(&self, kind: impl Into<String>, intensity: f64) -> ActivityOutcome {
        self.controller.register_activity(kind, intensity)
    }

    /// Admit and enqueue a mint request
    ///
    /// Rejections leave the queue untouched:
    /// - malformed request → [`Error::Validation`]
    /// - abuse detected (when honored) → [`Error::AbuseSuspected`]
    /// - charge below threshold → [`Error::Admission`]
    pub fn request_mint(&self, request: MintRequest) -> Result<EnqueueReceipt> {
        request.validate()?;

        if self.config.queue.honor_abuse_signals {
            let report = self.controller.detect_abuse();
            if let Some(pattern) = report.pattern {
                tracing::warn!("Mint {} refused: {} activity", request.request_id, pattern);
                return Err(Error::AbuseSuspected {
                    pattern,
                    action: report.recommended_action,
                });
            }
        }

        let discharge = self.controller.attempt_discharge()?;
        tracing::debug!(
            "Admitted {} ({} {} for {}), charge left {:.2}",
            request.request_id,
            request.amount,
            request.token_type,
            request.owner,
            discharge.charge
        );

        Ok(self.queue.enqueue(request))
    }

    /// Start the auto-process and idle-decay loops
    pub fn start_background_tasks(&self) -> BackgroundTasks {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let auto = spawn_auto_process(
            self.queue.clone(),
            Duration::from_millis(self.config.queue.auto_process_interval_ms),
            shutdown_rx,
        );
        let decay = spawn_idle_decay(
            self.controller.clone(),
            Duration::from_millis(self.config.admission.idle_decay_interval_ms),
            self.config.admission.idle_decay_rate,
        );

        BackgroundTasks {
            shutdown,
            auto_process: Some(auto),
            idle_decay: Some(decay),
        }
    }

    /// Admission controller
    pub fn controller(&self) -> &Arc<AdmissionController> {
        &self.controller
    }

    /// Batch queue
    pub fn queue(&self) -> &Arc<BatchQueue> {
        &self.queue
    }

    /// Ledger
    pub fn ledger(&self) -> &Ledger {
        &self.ledger
    }

    /// Configuration
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Shutdown pipeline
    pub async fn shutdown(&self) -> Result<()> {
        tracing::info!("Shutting down {}", self.config.service_name);
        self.ledger.shutdown().await?;
        Ok(())
    }
}
