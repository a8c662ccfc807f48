//! # mfg_radar
//!
//! A manufacturing-intelligence pipeline that collects robotics and
//! manufacturing news, patents, and academic papers from the public web,
//! filters them by keyword relevance, deduplicates against history, pushes
//! digests to a chat webhook, and renders a static browsing site.
//!
//! ## Usage
//!
//! ```sh
//! mfg_radar --task news
//! mfg_radar --task papers-patents --dry-run
//! mfg_radar --task all
//! ```
//!
//! ## Architecture
//!
//! Each run is a sequential pipeline per record kind:
//! 1. **Crawl**: fetch raw records from the configured sources
//! 2. **Filter**: score against keyword lists, drop low-relevance records
//! 3. **Enrich**: fold extracted company names into the keyword sets
//! 4. **Deduplicate**: drop records already seen in the batch or the store
//! 5. **Persist**: insert into SQLite, one record at a time
//! 6. **Deliver**: send the unsent backlog to the webhook, mark sent
//!
//! A failure in one task is logged and reported best-effort through the
//! webhook; it never crashes the process or blocks the other tasks.

use clap::Parser;
use std::error::Error;
use tracing::{error, info, instrument};
use tracing_subscriber::{EnvFilter, fmt as tfmt};

mod cli;
mod config;
mod crawlers;
mod filters;
mod models;
mod notify;
mod pipeline;
mod site;
mod store;
mod utils;

use cli::{Cli, Task};
use config::{KeywordsConfig, SourcesConfig};
use notify::WebhookNotifier;
use pipeline::RunOptions;
use store::Database;

#[tokio::main]
#[instrument]
async fn main() -> Result<(), Box<dyn Error>> {
    // --- Tracing init ---
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tfmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_file(false)
        .with_line_number(false)
        .with_timer(tracing_subscriber::fmt::time::UtcTime::rfc_3339())
        .init();

    let start_time = std::time::Instant::now();
    info!("mfg_radar starting up");

    let args = Cli::parse();

    // --- Configuration ---
    let keywords = KeywordsConfig::load(&args.config_dir.join("keywords.yaml"))?;
    let sources = SourcesConfig::load(&args.config_dir.join("sources.yaml"))?;
    info!(
        config_dir = %args.config_dir.display(),
        news_terms = keywords.flattened_news_keywords().len(),
        patent_terms = keywords.patents.len(),
        paper_terms = keywords.papers.len(),
        "Loaded configuration"
    );

    // --- Store and notifier ---
    let db = Database::open(&args.db_path).await?;
    let notifier = WebhookNotifier::new(args.webhook_url.clone());

    if args.test_webhook {
        info!("Testing webhook connection");
        match notifier.send_text("🤖 mfg_radar 测试消息").await {
            Ok(()) => info!("Webhook test successful"),
            Err(e) => error!(error = %e, "Webhook test failed"),
        }
        return Ok(());
    }

    let options = RunOptions {
        dry_run: args.dry_run,
        test: args.test,
    };

    // --- Task dispatch ---
    // Each task is isolated: a failure is logged and reported best-effort,
    // and the remaining tasks still run.
    if matches!(args.task, Task::News | Task::All) {
        if let Err(e) = pipeline::run_news(&db, &notifier, &keywords, &sources, options).await {
            error!(error = %e, "News run failed");
            notifier.send_error(&e.to_string(), "news crawling").await;
        }
    }

    if matches!(args.task, Task::PapersPatents | Task::All) {
        if let Err(e) =
            pipeline::run_papers_and_patents(&db, &notifier, &keywords, &sources, options).await
        {
            error!(error = %e, "Papers & patents run failed");
            notifier.send_error(&e.to_string(), "papers & patents crawling").await;
        }
    }

    if matches!(args.task, Task::Site | Task::All) {
        if let Err(e) = pipeline::run_site_update(&db, &args.site_output_dir).await {
            error!(error = %e, "Site update failed");
        }
    }

    let elapsed = start_time.elapsed();
    info!(
        ?elapsed,
        secs = elapsed.as_secs(),
        millis = elapsed.subsec_millis(),
        "Execution complete"
    );
    Ok(())
}
