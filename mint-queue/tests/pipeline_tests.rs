//! End-to-end tests: admission, batching and ledger together

use async_trait::async_trait;
use ledger_core::{LedgerEntry, Token};
use mint_queue::{
    spawn_auto_process, BatchQueue, CatalogTokenFactory, DeliverySink, Error, MintPipeline,
    MintRequest, PipelineConfig, QueueConfig, RequestStatus, SinkError, StaticCatalog,
    TokenFactory, TokenSpec, ValidationError,
};
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn catalog_factory() -> Arc<dyn TokenFactory> {
    Arc::new(CatalogTokenFactory::new(Arc::new(StaticCatalog::standard())))
}

async fn open_ledger() -> ledger_core::Ledger {
    ledger_core::Ledger::open(ledger_core::Config::default())
        .await
        .unwrap()
}

fn request(n: usize) -> MintRequest {
    MintRequest::new("gold", format!("owner-{}", n % 3), Decimal::from(n as i64 + 1))
}

/// Factory that stalls on one token type
struct SlowFactory {
    inner: Arc<dyn TokenFactory>,
}

#[async_trait]
impl TokenFactory for SlowFactory {
    async fn create_token(&self, spec: &TokenSpec) -> Result<Token, ValidationError> {
        if spec.token_type == "silver" {
            tokio::time::sleep(Duration::from_secs(5)).await;
        }
        self.inner.create_token(spec).await
    }
}

/// Factory that takes a fixed time per token
struct PacedFactory {
    inner: Arc<dyn TokenFactory>,
    delay: Duration,
}

#[async_trait]
impl TokenFactory for PacedFactory {
    async fn create_token(&self, spec: &TokenSpec) -> Result<Token, ValidationError> {
        tokio::time::sleep(self.delay).await;
        self.inner.create_token(spec).await
    }
}

fn paced_factory(millis: u64) -> Arc<dyn TokenFactory> {
    Arc::new(PacedFactory {
        inner: catalog_factory(),
        delay: Duration::from_millis(millis),
    })
}

/// Sink that always fails and counts attempts
#[derive(Default)]
struct BrokenSink {
    attempts: AtomicUsize,
}

#[async_trait]
impl DeliverySink for BrokenSink {
    fn name(&self) -> &str {
        "broken"
    }

    async fn deliver(&self, _entry: &LedgerEntry) -> Result<(), SinkError> {
        self.attempts.fetch_add(1, Ordering::SeqCst);
        Err(SinkError("destination unreachable".to_string()))
    }
}

/// 12 queued, 10 drained, item #4 fails validation: 9 commits, 1 failure
#[tokio::test]
async fn test_partial_batch_failure_is_isolated() {
    let ledger = open_ledger().await;
    let queue = BatchQueue::new(QueueConfig::default(), catalog_factory(), ledger.clone()).unwrap();

    let mut ids = Vec::new();
    for n in 0..12 {
        let req = if n == 3 {
            MintRequest::new("platinum", "mallory", Decimal::ONE)
        } else {
            request(n)
        };
        ids.push(queue.enqueue(req).request_id);
    }

    let job = queue.drain(10).unwrap().unwrap();
    assert_eq!(job.len(), 10);
    assert_eq!(queue.pending_len(), 2);

    let result = queue.process_batch(job).await.unwrap();
    assert_eq!(result.committed_tokens.len(), 9);
    assert_eq!(result.failures.len(), 1);

    let failure = &result.failures[0];
    assert_eq!(failure.position, 4);
    assert_eq!(failure.request_id, ids[3]);
    assert!(failure.reason.contains("platinum"));

    // Remaining items committed in order, with dense ledger indices
    let committed_ids: Vec<_> = result.committed_tokens.iter().map(|c| c.request_id).collect();
    let expected: Vec<_> = ids[..10].iter().copied().filter(|id| *id != ids[3]).collect();
    assert_eq!(committed_ids, expected);
    let indices: Vec<u64> = result.committed_tokens.iter().map(|c| c.entry.index).collect();
    assert_eq!(indices, (0..9).collect::<Vec<_>>());

    assert!(result.requests.iter().all(|r| r.status().is_terminal()));
    assert_eq!(
        result
            .requests
            .iter()
            .filter(|r| r.status() == RequestStatus::Failed)
            .count(),
        1
    );

    assert_eq!(ledger.stats().await.unwrap().total_entries, 9);
    assert!(ledger.verify_integrity().await.unwrap().valid);
    assert_eq!(queue.metrics().items_committed.get(), 9);
    assert_eq!(queue.metrics().items_failed.get(), 1);

    ledger.shutdown().await.unwrap();
}

/// A second drain while a job is outstanding is rejected, then allowed again
#[tokio::test]
async fn test_batch_in_flight_backpressure() {
    let ledger = open_ledger().await;
    let queue = BatchQueue::new(QueueConfig::default(), catalog_factory(), ledger.clone()).unwrap();
    for n in 0..15 {
        queue.enqueue(request(n));
    }

    let job = queue.drain(10).unwrap().unwrap();
    assert!(matches!(queue.drain(10), Err(Error::BatchInFlight { .. })));
    assert!(matches!(queue.auto_process().await, Err(Error::BatchInFlight { .. })));

    queue.process_batch(job).await.unwrap();
    let next = queue.drain(10).unwrap().unwrap();
    assert_eq!(next.len(), 5);

    ledger.shutdown().await.unwrap();
}

/// A stalled token creation times out and fails only that item
#[tokio::test]
async fn test_item_timeout_is_a_failure() {
    let ledger = open_ledger().await;
    let config = QueueConfig {
        item_timeout_ms: 50,
        ..QueueConfig::default()
    };
    let factory = Arc::new(SlowFactory {
        inner: catalog_factory(),
    });
    let queue = BatchQueue::new(config, factory, ledger.clone()).unwrap();

    queue.enqueue(request(0));
    queue.enqueue(MintRequest::new("silver", "bob", Decimal::ONE));
    queue.enqueue(request(2));

    let result = queue.process_all().await.unwrap().unwrap();
    assert_eq!(result.committed_tokens.len(), 2);
    assert_eq!(result.failures.len(), 1);
    assert_eq!(result.failures[0].position, 2);
    assert!(result.failures[0].reason.contains("timed out"));
    assert!(queue.in_flight().is_none());

    ledger.shutdown().await.unwrap();
}

/// A ledger that stopped accepting appends fails items, not the batch
#[tokio::test]
async fn test_ledger_failure_is_per_item() {
    let ledger = open_ledger().await;
    let queue = BatchQueue::new(QueueConfig::default(), catalog_factory(), ledger.clone()).unwrap();
    for n in 0..3 {
        queue.enqueue(request(n));
    }

    ledger.shutdown().await.unwrap();

    let result = queue.process_all().await.unwrap().unwrap();
    assert!(result.committed_tokens.is_empty());
    assert_eq!(result.failures.len(), 3);
    assert!(result
        .failures
        .iter()
        .all(|f| f.reason.starts_with("ledger append failed")));
    assert!(queue.in_flight().is_none());
}

/// Sink failures are reported but never change item status
#[tokio::test]
async fn test_delivery_failures_are_best_effort() {
    let ledger = open_ledger().await;
    let sink = Arc::new(BrokenSink::default());
    let queue = BatchQueue::new(QueueConfig::default(), catalog_factory(), ledger.clone())
        .unwrap()
        .with_sink(sink.clone());

    for n in 0..4 {
        queue.enqueue(request(n));
    }
    let result = queue.process_all().await.unwrap().unwrap();

    assert_eq!(result.committed_tokens.len(), 4);
    assert!(result.failures.is_empty());
    assert_eq!(result.delivery_failures.len(), 4);
    assert!(result
        .delivery_failures
        .iter()
        .all(|d| d.destination == "broken"));
    assert_eq!(sink.attempts.load(Ordering::SeqCst), 4);

    ledger.shutdown().await.unwrap();
}

/// Charge gates admission; each admission discharges
#[tokio::test]
async fn test_pipeline_admission() {
    let pipeline = MintPipeline::new(PipelineConfig::default(), catalog_factory(), Vec::new())
        .await
        .unwrap();

    let err = pipeline
        .request_mint(MintRequest::new("gold", "alice", Decimal::ONE))
        .unwrap_err();
    match err {
        Error::Admission(admission_control::Error::InsufficientCharge { needed, .. }) => {
            assert_eq!(needed, 100.0)
        }
        other => panic!("unexpected: {:?}", other),
    }
    assert_eq!(pipeline.queue().pending_len(), 0);

    let outcome = pipeline.register_activity("click", 100.0);
    assert!(outcome.can_mint);

    let receipt = pipeline
        .request_mint(MintRequest::new("gold", "alice", Decimal::ONE))
        .unwrap();
    assert_eq!(receipt.position, 1);
    assert_eq!(pipeline.controller().state().charge, 80.0);

    // Malformed requests never touch the charge
    assert!(matches!(
        pipeline.request_mint(MintRequest::new("gold", "", Decimal::ONE)),
        Err(Error::Validation(_))
    ));
    assert_eq!(pipeline.controller().state().charge, 80.0);

    pipeline.shutdown().await.unwrap();
}

/// Abuse signals block admission when honored
#[tokio::test]
async fn test_pipeline_honors_abuse_signals() {
    let pipeline = MintPipeline::new(PipelineConfig::default(), catalog_factory(), Vec::new())
        .await
        .unwrap();

    // Ten events in a burst
    for _ in 0..10 {
        pipeline.register_activity("click", 20.0);
    }

    let err = pipeline
        .request_mint(MintRequest::new("gold", "alice", Decimal::ONE))
        .unwrap_err();
    assert!(matches!(
        err,
        Error::AbuseSuspected {
            pattern: admission_control::AbusePattern::RapidFire,
            ..
        }
    ));
    assert_eq!(pipeline.controller().state().charge, 200.0);

    pipeline.shutdown().await.unwrap();

    // The same burst is admitted when signals are ignored
    let mut config = PipelineConfig::default();
    config.queue.honor_abuse_signals = false;
    let pipeline = MintPipeline::new(config, catalog_factory(), Vec::new())
        .await
        .unwrap();
    for _ in 0..10 {
        pipeline.register_activity("click", 20.0);
    }
    assert!(pipeline
        .request_mint(MintRequest::new("gold", "alice", Decimal::ONE))
        .is_ok());

    pipeline.shutdown().await.unwrap();
}

/// The auto-process loop drains once the minimum batch is pending
#[tokio::test]
async fn test_background_auto_process() {
    let mut config = PipelineConfig::default();
    config.queue.auto_process_interval_ms = 20;
    config.queue.honor_abuse_signals = false;
    let pipeline = MintPipeline::new(config, catalog_factory(), Vec::new())
        .await
        .unwrap();
    let tasks = pipeline.start_background_tasks();

    pipeline.controller().boost(1000.0);
    for n in 0..10 {
        pipeline.request_mint(request(n)).unwrap();
    }

    let mut committed = 0;
    for _ in 0..100 {
        committed = pipeline.ledger().stats().await.unwrap().total_entries;
        if committed == 10 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(committed, 10);
    assert_eq!(pipeline.queue().pending_len(), 0);

    tasks.stop().await;
    pipeline.shutdown().await.unwrap();
}

/// Aborting the loop mid-batch puts unstarted items back in the queue
#[tokio::test(start_paused = true)]
async fn test_aborted_auto_process_keeps_every_request() {
    let ledger = open_ledger().await;
    let queue = Arc::new(
        BatchQueue::new(QueueConfig::default(), paced_factory(30), ledger.clone()).unwrap(),
    );
    let ids: Vec<_> = (0..10).map(|n| queue.enqueue(request(n)).request_id).collect();

    let (_shutdown, shutdown_rx) = tokio::sync::watch::channel(false);
    let handle = spawn_auto_process(queue.clone(), Duration::from_millis(500), shutdown_rx);
    tokio::time::sleep(Duration::from_millis(100)).await;
    handle.abort();
    assert!(handle.await.unwrap_err().is_cancelled());

    let committed = ledger.stats().await.unwrap().total_entries as usize;
    let interrupted = queue.metrics().items_failed.get() as usize;
    let pending = queue.pending_len();
    assert!(committed > 0);
    assert!(pending > 0);
    assert!(interrupted <= 1);
    assert_eq!(committed + interrupted + pending, 10);
    assert!(queue.in_flight().is_none());
    assert_eq!(queue.metrics().pending_depth.get() as usize, pending);

    // Returned items keep their order and go through on the next batch
    let result = queue.process_all().await.unwrap().unwrap();
    assert!(result.failures.is_empty());
    let retried: Vec<_> = result.committed_tokens.iter().map(|c| c.request_id).collect();
    assert_eq!(retried, &ids[10 - pending..]);
    assert_eq!(
        ledger.stats().await.unwrap().total_entries as usize,
        10 - interrupted
    );

    ledger.shutdown().await.unwrap();
}

/// A graceful stop lets the running batch finish
#[tokio::test(start_paused = true)]
async fn test_background_stop_finishes_running_batch() {
    let mut config = PipelineConfig::default();
    config.queue.auto_process_interval_ms = 20;
    config.queue.honor_abuse_signals = false;
    let pipeline = MintPipeline::new(config, paced_factory(30), Vec::new())
        .await
        .unwrap();
    let tasks = pipeline.start_background_tasks();

    pipeline.controller().boost(1000.0);
    for n in 0..10 {
        pipeline.request_mint(request(n)).unwrap();
    }

    tokio::time::sleep(Duration::from_millis(50)).await;
    assert!(pipeline.queue().in_flight().is_some());
    tasks.stop().await;

    assert_eq!(pipeline.ledger().stats().await.unwrap().total_entries, 10);
    assert_eq!(pipeline.queue().pending_len(), 0);
    assert!(pipeline.queue().in_flight().is_none());
    assert_eq!(pipeline.queue().metrics().items_failed.get(), 0);

    pipeline.shutdown().await.unwrap();
}
