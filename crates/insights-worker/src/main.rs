//! Recall Insights Worker
//!
//! Background companion to the gateway. Each cycle:
//! 1. Backfills missing conversation embeddings
//! 2. Screens newly saved conversations for contradictions with older memory
//! 3. Generates the weekly digest when one is due
//!
//! A failed sub-step is logged and never aborts the loop; repeated full-cycle
//! failures pause the worker briefly before it resumes.

mod backfill;
mod contradictions;
mod digest;

use crate::backfill::EmbeddingBackfill;
use crate::contradictions::ContradictionScreen;
use crate::digest::DigestGenerator;
use chrono::{DateTime, Local, Utc};
use recall_common::{
    config::AppConfig,
    db::{DbPool, Repository},
    embeddings::create_embedder,
    metrics, VERSION,
};
use tracing::{error, info, warn, Level};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load environment variables
    dotenvy::dotenv().ok();

    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(Level::INFO)
        .with_target(true)
        .json()
        .init();

    info!("Starting Recall Insights Worker v{}", VERSION);

    // Load configuration
    let config = AppConfig::load().map_err(|e| {
        tracing::error!(error = %e, "Failed to load configuration");
        e
    })?;

    // Initialize metrics
    metrics::register_metrics();

    // Initialize database connection
    info!("Connecting to database...");
    let db = DbPool::new(&config.database).await?;
    let repository = Repository::new(db);

    // Initialize embedder
    let embedder = create_embedder(&config.embedding);
    info!(
        model = %embedder.model_name(),
        dimension = embedder.dimension(),
        "Embedder initialized"
    );

    let backfill = EmbeddingBackfill::new(
        repository.clone(),
        embedder.clone(),
        config.insights.backfill_batch_size,
    );
    let digests = DigestGenerator::new(repository.clone(), config.insights.clone());
    let screen = ContradictionScreen::new(
        repository.clone(),
        embedder.clone(),
        config.insights.clone(),
    );

    // One-shot mode: run a single backfill pass and exit
    let args: Vec<String> = std::env::args().collect();

    if args.len() > 1 && args[1] == "backfill" {
        info!("Running one-shot backfill...");

        match backfill.run_once().await {
            Ok(updated) => {
                println!("Backfilled {} conversation embeddings", updated);
            }
            Err(e) => {
                error!(error = %e, "Backfill failed");
                eprintln!("Error: {}", e);
                std::process::exit(1);
            }
        }

        return Ok(());
    }

    // Service mode: run cycles until shutdown
    let cycle = std::time::Duration::from_secs(config.insights.cycle_interval_secs);
    info!(interval_secs = cycle.as_secs(), "Insights worker ready");

    let mut last_screened_at = Utc::now();

    // Circuit breaker state
    let mut consecutive_failures = 0;
    const MAX_FAILURES: u32 = 5;
    const CIRCUIT_BREAK_DURATION: std::time::Duration = std::time::Duration::from_secs(30);

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Shutdown signal received");
                break;
            }
            _ = tokio::time::sleep(cycle) => {
                match run_cycle(&backfill, &screen, &digests, &repository, &mut last_screened_at).await {
                    Ok(()) => {
                        consecutive_failures = 0;
                    }
                    Err(e) => {
                        consecutive_failures += 1;
                        error!(
                            error = %e,
                            failures = consecutive_failures,
                            "Worker cycle failed"
                        );
                    }
                }

                if consecutive_failures >= MAX_FAILURES {
                    warn!(
                        failures = consecutive_failures,
                        "Circuit breaker open, pausing..."
                    );
                    tokio::time::sleep(CIRCUIT_BREAK_DURATION).await;
                    consecutive_failures = 0;
                    info!("Circuit breaker reset, resuming...");
                }
            }
        }
    }

    info!("Insights worker shutting down");
    Ok(())
}

/// One worker cycle. Every sub-step runs even when an earlier one fails;
/// the cycle reports failure if any sub-step failed.
async fn run_cycle(
    backfill: &EmbeddingBackfill,
    screen: &ContradictionScreen,
    digests: &DigestGenerator,
    repository: &Repository,
    last_screened_at: &mut DateTime<Utc>,
) -> anyhow::Result<()> {
    let cycle_start = Utc::now();
    let mut failed = false;

    // 1. Embedding backfill
    if let Err(e) = backfill.run_once().await {
        error!(error = %e, "Backfill step failed");
        failed = true;
    }

    // 2. Contradiction screening over conversations saved since last cycle
    match repository.conversations_since(*last_screened_at).await {
        Ok(new_conversations) => {
            for conversation in &new_conversations {
                if let Err(e) = screen.screen(conversation, cycle_start).await {
                    error!(
                        conversation = %conversation.id,
                        error = %e,
                        "Contradiction screening failed"
                    );
                    failed = true;
                }
            }
            *last_screened_at = cycle_start;
        }
        Err(e) => {
            error!(error = %e, "Could not fetch new conversations for screening");
            failed = true;
        }
    }

    // 3. Weekly digest
    match digests.is_due(Local::now().fixed_offset()).await {
        Ok(true) => {
            if let Err(e) = digests.generate(cycle_start).await {
                error!(error = %e, "Digest generation failed");
                failed = true;
            }
        }
        Ok(false) => {}
        Err(e) => {
            error!(error = %e, "Digest due-check failed");
            failed = true;
        }
    }

    if failed {
        anyhow::bail!("one or more worker steps failed");
    }

    Ok(())
}
