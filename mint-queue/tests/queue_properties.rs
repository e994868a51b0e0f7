//! Property-based tests for queue ordering
//!
//! - FIFO: across any sequence of drain sizes, commits follow enqueue order
//! - Accounting: every drained item ends committed or failed, exactly once

use mint_queue::{BatchQueue, CatalogTokenFactory, MintRequest, QueueConfig, StaticCatalog};
use proptest::prelude::*;
use rust_decimal::Decimal;
use std::sync::Arc;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(32))]

    /// Property: ledger order equals enqueue order for valid requests
    #[test]
    fn prop_fifo_across_batches(
        count in 1usize..40,
        drain_sizes in prop::collection::vec(1usize..12, 1..20),
        invalid in prop::collection::btree_set(0usize..40, 0..6),
    ) {
        let rt = runtime();
        rt.block_on(async {
            let ledger = ledger_core::Ledger::open(ledger_core::Config::default()).await.unwrap();
            let factory = Arc::new(CatalogTokenFactory::new(Arc::new(StaticCatalog::standard())));
            let queue = BatchQueue::new(QueueConfig::default(), factory, ledger.clone()).unwrap();

            let mut valid_ids = Vec::new();
            for n in 0..count {
                let token_type = if invalid.contains(&n) { "unknown" } else { "gold" };
                let receipt = queue.enqueue(MintRequest::new(token_type, "alice", Decimal::ONE));
                prop_assert_eq!(receipt.position, n + 1);
                if !invalid.contains(&n) {
                    valid_ids.push(receipt.request_id);
                }
            }

            let mut committed = Vec::new();
            let mut failed = 0;
            for size in drain_sizes.iter().cycle() {
                let Some(job) = queue.drain(*size).unwrap() else { break };
                prop_assert!(job.len() <= *size);
                let result = queue.process_batch(job).await.unwrap();
                committed.extend(result.committed_tokens.iter().map(|c| c.request_id));
                failed += result.failures.len();
            }

            prop_assert_eq!(committed.len() + failed, count);
            prop_assert_eq!(&committed, &valid_ids);

            let entries = ledger.query(ledger_core::LedgerQuery::all()).await.unwrap();
            prop_assert_eq!(entries.len(), valid_ids.len());
            prop_assert!(ledger.verify_integrity().await.unwrap().valid);

            ledger.shutdown().await.unwrap();
            Ok(())
        })?;
    }
}
