//! Mint pipeline binary
//!
//! Runs a short scripted workload through admission, batching and the ledger,
//! then prints ledger stats and the integrity report as JSON.
//!
//! Usage: `mint-pipeline [config.toml]`

use anyhow::Context;
use chrono::{Duration, Utc};
use mint_queue::{
    CatalogTokenFactory, DeliverySink, MintPipeline, MintRequest, PipelineConfig, StaticCatalog,
    TracingSink,
};
use rust_decimal::Decimal;
use std::sync::Arc;

const ACTIVITY_KINDS: [&str; 3] = ["click", "scroll", "hover"];
const OWNERS: [&str; 4] = ["alice", "bob", "carol", "dave"];

fn init_tracing() {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    if std::env::var("MINT_LOG_FORMAT").as_deref() == Ok("json") {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = match std::env::args().nth(1) {
        Some(path) => PipelineConfig::from_file(&path)
            .with_context(|| format!("loading config from {}", path))?,
        None => PipelineConfig::from_env().context("loading config from environment")?,
    };

    tracing::info!("Starting {}", config.service_name);

    let factory = Arc::new(CatalogTokenFactory::new(Arc::new(StaticCatalog::standard())));
    let sinks: Vec<Arc<dyn DeliverySink>> = vec![
        Arc::new(TracingSink::new("primary")),
        Arc::new(TracingSink::new("replica")),
    ];
    let pipeline = MintPipeline::new(config, factory, sinks).await?;
    let background = pipeline.start_background_tasks();

    // Varied, spaced-out activity so abuse detection stays quiet
    let start = Utc::now();
    let mut admitted = 0usize;
    for i in 0..24i64 {
        for (k, kind) in ACTIVITY_KINDS.iter().enumerate() {
            let observed_at = start + Duration::milliseconds((i * 3 + k as i64) * 400);
            pipeline
                .controller()
                .register_activity_at(*kind, 40.0, observed_at);
        }

        // Every seventh request names a type the catalog does not know
        let token_type = if i % 7 == 6 { "platinum" } else { "gold" };
        let owner = OWNERS[i as usize % OWNERS.len()];
        let request = MintRequest::new(token_type, owner, Decimal::new(100 + i, 2))
            .with_metadata("script_step", i.to_string());

        match pipeline.request_mint(request) {
            Ok(receipt) => {
                admitted += 1;
                tracing::info!(
                    "Request {} queued at position {} (wait ~{:?})",
                    receipt.request_id,
                    receipt.position,
                    receipt.estimated_wait
                );
            }
            Err(e) => tracing::warn!("Request rejected: {}", e),
        }
    }

    background.stop().await;

    // Flush whatever the auto-process loop has not picked up
    while let Some(result) = pipeline.queue().process_all().await? {
        tracing::info!(
            "Batch {}: {} committed, {} failed",
            result.batch_id,
            result.committed_tokens.len(),
            result.failures.len()
        );
        for failure in &result.failures {
            tracing::warn!("  item {} failed: {}", failure.position, failure.reason);
        }
    }

    let stats = pipeline.ledger().stats().await?;
    let report = pipeline.ledger().verify_integrity().await?;
    let digest_problems = pipeline.ledger().verify_digests().await?;
    let content_problems = pipeline.ledger().verify_content().await?;

    println!(
        "{}",
        serde_json::to_string_pretty(&serde_json::json!({
            "admitted": admitted,
            "stats": stats,
            "integrity": report,
            "digest_mismatches": digest_problems,
            "content_mismatches": content_problems,
        }))?
    );

    pipeline.shutdown().await?;
    Ok(())
}
