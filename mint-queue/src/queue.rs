//! Batch queue
//!
//! Pending requests are drained in FIFO groups. At most one drained job may
//! be outstanding; `drain` while a job is in flight is rejected, not queued.
//!
//! # Processing
//!
//! Items of a job are processed strictly in order:
//! 1. Ask the [`TokenFactory`] for a token (bounded by `item_timeout_ms`)
//! 2. Append the token to the ledger
//! 3. Fan the entry out to every [`DeliverySink`]
//!
//! Any failure in steps 1-2 fails that item only. Step 3 never fails an item.
//!
//! If a `process_batch` future is dropped mid-batch, items not yet started go
//! back to the front of the pending sequence.

use crate::{
    collaborator::TokenFactory,
    config::QueueConfig,
    metrics::QueueMetrics,
    sinks::{fan_out, DeliverySink},
    types::*,
    Error, Result,
};
use chrono::{DateTime, Utc};
use ledger_core::Ledger;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use uuid::Uuid;

/// Lifecycle of the outstanding job
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum InFlight {
    /// Handed out by `drain`, not yet claimed
    Drained(Uuid),
    /// Claimed by a `process_batch` call
    Processing(Uuid),
}

impl InFlight {
    fn batch_id(self) -> Uuid {
        match self {
            InFlight::Drained(id) | InFlight::Processing(id) => id,
        }
    }
}

#[derive(Default)]
struct QueueState {
    pending: VecDeque<MintRequest>,
    in_flight: Option<InFlight>,
}

/// A claimed job's items that have not been settled yet
///
/// Dropping it frees the in-flight slot and returns unstarted items to the
/// front of the pending sequence. An item cut off mid-processing may already
/// be in the ledger, so it is counted as failed rather than retried.
struct ClaimedJob<'a> {
    queue: &'a BatchQueue,
    batch_id: Uuid,
    remaining: VecDeque<MintRequest>,
    current: Option<Uuid>,
}

impl Drop for ClaimedJob<'_> {
    fn drop(&mut self) {
        if let Some(request_id) = self.current.take() {
            tracing::warn!(
                "Batch {} interrupted during {}; ledger outcome unknown, counted as failed",
                self.batch_id,
                request_id
            );
            self.queue.metrics.items_failed.inc();
        }

        let returned = self.remaining.len();
        {
            let mut state = self.queue.state.lock();
            while let Some(mut item) = self.remaining.pop_back() {
                item.requeue();
                state.pending.push_front(item);
            }
            state.in_flight = None;
            self.queue
                .metrics
                .pending_depth
                .set(state.pending.len() as i64);
        }

        if returned > 0 {
            tracing::warn!(
                "Batch {} interrupted, {} unprocessed item(s) returned to the queue",
                self.batch_id,
                returned
            );
        }
    }
}

/// FIFO batch queue feeding the ledger
pub struct BatchQueue {
    config: QueueConfig,
    state: Mutex<QueueState>,
    factory: Arc<dyn TokenFactory>,
    ledger: Ledger,
    sinks: Vec<Arc<dyn DeliverySink>>,
    metrics: QueueMetrics,
}

impl std::fmt::Debug for BatchQueue {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("BatchQueue")
            .field("config", &self.config)
            .field("pending", &state.pending.len())
            .field("in_flight", &state.in_flight)
            .field("sinks", &self.sinks.len())
            .finish()
    }
}

impl BatchQueue {
    /// Create new queue
    pub fn new(config: QueueConfig, factory: Arc<dyn TokenFactory>, ledger: Ledger) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            state: Mutex::new(QueueState::default()),
            factory,
            ledger,
            sinks: Vec::new(),
            metrics: QueueMetrics::new()?,
        })
    }

    /// Register a delivery sink
    pub fn with_sink(mut self, sink: Arc<dyn DeliverySink>) -> Self {
        self.sinks.push(sink);
        self
    }

    /// Append a request to the pending sequence
    ///
    /// A request resubmitted from an earlier [`BatchResult`] starts over as
    /// `Queued`.
    pub fn enqueue(&self, mut request: MintRequest) -> EnqueueReceipt {
        if request.status() != RequestStatus::Queued {
            tracing::debug!(
                "Resubmitting {} (was {})",
                request.request_id,
                request.status()
            );
            request.requeue();
        }

        let request_id = request.request_id;
        let position = {
            let mut state = self.state.lock();
            state.pending.push_back(request);
            state.pending.len()
        };

        self.metrics.requests_enqueued.inc();
        self.metrics.pending_depth.set(position as i64);

        let batches_ahead = position.div_ceil(self.config.batch_size) as u64;
        let estimated_wait = Duration::from_millis(batches_ahead * self.config.estimated_batch_ms);

        tracing::debug!("Enqueued {} at position {}", request_id, position);

        EnqueueReceipt {
            request_id,
            position,
            estimated_wait,
        }
    }

    /// Take up to `max_size` requests from the front as one job
    ///
    /// Returns `Ok(None)` when nothing is pending. On error the pending
    /// sequence is left untouched.
    pub fn drain(&self, max_size: usize) -> Result<Option<BatchJob>> {
        let mut state = self.state.lock();

        if let Some(in_flight) = state.in_flight {
            return Err(Error::BatchInFlight {
                batch_id: in_flight.batch_id(),
            });
        }
        if state.pending.is_empty() || max_size == 0 {
            return Ok(None);
        }

        let count = max_size.min(state.pending.len());
        if let Some(item) = state
            .pending
            .iter()
            .take(count)
            .find(|r| r.status() != RequestStatus::Queued)
        {
            return Err(Error::InvalidTransition {
                request_id: item.request_id,
                from: item.status(),
                to: RequestStatus::Processing,
            });
        }

        let mut items: Vec<MintRequest> = state.pending.drain(..count).collect();
        for item in &mut items {
            self.settle(item, RequestStatus::Processing);
        }

        let job = BatchJob::new(items);
        state.in_flight = Some(InFlight::Drained(job.batch_id()));
        self.metrics.pending_depth.set(state.pending.len() as i64);

        tracing::info!(
            "Drained batch {} with {} item(s), {} still pending",
            job.batch_id(),
            job.len(),
            state.pending.len()
        );

        Ok(Some(job))
    }

    /// Process every item of the in-flight job and release the slot
    pub async fn process_batch(&self, job: BatchJob) -> Result<BatchResult> {
        let batch_id = job.batch_id();
        self.claim(batch_id)?;

        let started_at = job.started_at();
        let mut claimed = ClaimedJob {
            queue: self,
            batch_id,
            remaining: job.into_items().into(),
            current: None,
        };

        let started = Instant::now();
        let result = self.run_job(&mut claimed, started_at).await;
        drop(claimed);

        self.metrics.record_batch(
            result.committed_tokens.len(),
            result.failures.len(),
            started.elapsed().as_secs_f64(),
        );

        tracing::info!(
            "Batch {} done: {} committed, {} failed",
            result.batch_id,
            result.committed_tokens.len(),
            result.failures.len()
        );

        Ok(result)
    }

    /// Move the drained job to processing; only one caller wins
    fn claim(&self, batch_id: Uuid) -> Result<()> {
        let mut state = self.state.lock();
        let current = state.in_flight;
        match current {
            Some(InFlight::Drained(id)) if id == batch_id => {
                state.in_flight = Some(InFlight::Processing(id));
                Ok(())
            }
            Some(InFlight::Processing(id)) if id == batch_id => {
                Err(Error::BatchAlreadyClaimed { batch_id })
            }
            _ => Err(Error::UnknownBatch { batch_id }),
        }
    }

    async fn run_job(&self, claimed: &mut ClaimedJob<'_>, started_at: DateTime<Utc>) -> BatchResult {
        let batch_id = claimed.batch_id;
        let timeout = Duration::from_millis(self.config.item_timeout_ms);

        let mut committed_tokens = Vec::new();
        let mut failures = Vec::new();
        let mut delivery_failures = Vec::new();
        let mut requests = Vec::with_capacity(claimed.remaining.len());
        let mut position = 0;

        while let Some(mut item) = claimed.remaining.pop_front() {
            position += 1;
            claimed.current = Some(item.request_id);
            let spec = item.spec();

            let outcome = match tokio::time::timeout(timeout, self.factory.create_token(&spec)).await {
                Err(_) => Err(format!("token creation timed out after {}ms", timeout.as_millis())),
                Ok(Err(e)) => Err(format!("validation failed: {}", e)),
                Ok(Ok(token)) => match self.ledger.append(token.clone()).await {
                    Ok(entry) => Ok((token, entry)),
                    Err(e) => Err(format!("ledger append failed: {}", e)),
                },
            };

            match outcome {
                Ok((token, entry)) => {
                    self.settle(&mut item, RequestStatus::Committed);
                    claimed.current = None;
                    delivery_failures.extend(fan_out(&self.sinks, &entry).await);
                    committed_tokens.push(CommittedMint {
                        position,
                        request_id: item.request_id,
                        token,
                        entry,
                    });
                }
                Err(reason) => {
                    tracing::warn!(
                        "Batch {} item {} ({}) failed: {}",
                        batch_id,
                        position,
                        item.request_id,
                        reason
                    );
                    self.settle(&mut item, RequestStatus::Failed);
                    claimed.current = None;
                    failures.push(MintFailure {
                        position,
                        request_id: item.request_id,
                        reason,
                    });
                }
            }

            requests.push(item);
        }

        BatchResult {
            batch_id,
            committed_tokens,
            failures,
            delivery_failures,
            requests,
            started_at,
            finished_at: Utc::now(),
        }
    }

    fn settle(&self, item: &mut MintRequest, to: RequestStatus) {
        // Transitions here follow a checked status, so this only fires on a logic error
        if let Err(e) = item.transition(to) {
            tracing::error!("{}", e);
        }
    }

    /// Drain and process one batch once enough requests are pending
    pub async fn auto_process(&self) -> Result<Option<BatchResult>> {
        if self.pending_len() < self.config.min_auto_batch {
            return Ok(None);
        }
        match self.drain(self.config.batch_size)? {
            Some(job) => self.process_batch(job).await.map(Some),
            None => Ok(None),
        }
    }

    /// Drain and process everything pending as one job
    pub async fn process_all(&self) -> Result<Option<BatchResult>> {
        match self.drain(usize::MAX)? {
            Some(job) => self.process_batch(job).await.map(Some),
            None => Ok(None),
        }
    }

    /// Drop all pending requests; an in-flight job is unaffected
    pub fn clear(&self) -> ClearOutcome {
        let cleared_count = {
            let mut state = self.state.lock();
            let count = state.pending.len();
            state.pending.clear();
            count
        };
        self.metrics.pending_depth.set(0);
        tracing::info!("Cleared {} pending request(s)", cleared_count);
        ClearOutcome { cleared_count }
    }

    /// Requests waiting to be drained
    pub fn pending_len(&self) -> usize {
        self.state.lock().pending.len()
    }

    /// ID of the outstanding job, drained or being processed
    pub fn in_flight(&self) -> Option<Uuid> {
        self.state.lock().in_flight.map(InFlight::batch_id)
    }

    /// Configuration
    pub fn config(&self) -> &QueueConfig {
        &self.config
    }

    /// Metrics collector
    pub fn metrics(&self) -> &QueueMetrics {
        &self.metrics
    }
}

/// Poll `auto_process` on a fixed interval until `shutdown` turns true
///
/// The signal is only observed between batches, so a batch that has started
/// always runs to completion. Dropping the sender also stops the loop.
pub fn spawn_auto_process(
    queue: Arc<BatchQueue>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);

        loop {
            if *shutdown.borrow() {
                break;
            }

            tokio::select! {
                _ = ticker.tick() => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            }

            match queue.auto_process().await {
                Ok(Some(result)) => tracing::debug!(
                    "Auto-processed batch {} ({} item(s))",
                    result.batch_id,
                    result.total()
                ),
                Ok(None) => {}
                Err(Error::BatchInFlight { batch_id }) => {
                    tracing::debug!("Auto-process skipped, batch {} in flight", batch_id)
                }
                Err(e) => tracing::error!("Auto-process failed: {}", e),
            }
        }

        tracing::debug!("Auto-process loop stopped");
    })
}
