//! Run orchestration: crawl → filter → enrich → dedupe → persist → deliver.
//!
//! Each record kind runs the same sequential composition. There is no
//! cross-stage retry coordination: a record that fails to persist is
//! recorded in the batch report and skipped, and a failed delivery leaves
//! every record unsent so the next scheduled run retries the backlog.
//!
//! Two switches alter a run:
//! - `dry_run` stops after deduplication and only logs what would happen;
//! - `test` persists records but never touches the webhook.

use std::error::Error;

use chrono::Utc;
use tracing::{error, info, instrument, warn};

use crate::config::{KeywordsConfig, SourcesConfig};
use crate::crawlers;
use crate::filters::dedup::Deduplicator;
use crate::filters::enrich::ContentEnricher;
use crate::filters::keyword::KeywordFilter;
use crate::models::{NewsItem, PaperItem, PatentItem};
use crate::notify::WebhookNotifier;
use crate::store::{Database, StoreError};
use crate::utils::truncate_for_log;

/// How many of the flattened news keywords are handed to search-style
/// news sources.
const NEWS_CRAWL_KEYWORDS: usize = 10;

/// Mode switches for a single run.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Stop after deduplication; nothing is persisted or delivered.
    pub dry_run: bool,
    /// Persist records but skip webhook delivery.
    pub test: bool,
}

/// Per-record persistence outcomes for one batch.
///
/// A bad record never aborts the batch; it lands in `duplicates` or
/// `failures` instead and the loop continues.
#[derive(Debug, Default)]
pub struct IngestReport {
    pub inserted: usize,
    pub duplicates: Vec<String>,
    /// `(identity, reason)` for records the store rejected.
    pub failures: Vec<(String, String)>,
}

impl IngestReport {
    fn note(&mut self, identity: &str, result: Result<i64, StoreError>) {
        match result {
            Ok(_) => self.inserted += 1,
            Err(StoreError::Duplicate { identity }) => {
                warn!(%identity, "Record already exists, skipping");
                self.duplicates.push(identity);
            }
            Err(e) => {
                error!(identity, error = %e, "Failed to persist record");
                self.failures.push((identity.to_string(), e.to_string()));
            }
        }
    }

    fn log(&self, kind: &str) {
        info!(
            kind,
            inserted = self.inserted,
            duplicates = self.duplicates.len(),
            failures = self.failures.len(),
            "Persisted batch"
        );
    }
}

/// Crawl, process, persist, and deliver news.
#[instrument(level = "info", skip_all)]
pub async fn run_news(
    db: &Database,
    notifier: &WebhookNotifier,
    keywords: &KeywordsConfig,
    sources: &SourcesConfig,
    options: RunOptions,
) -> Result<(), Box<dyn Error>> {
    info!("=== Starting news run ===");

    let filter = KeywordFilter::new(keywords);
    let enricher = ContentEnricher::new(keywords);
    let all_keywords = keywords.flattened_news_keywords();
    let crawl_keywords = &all_keywords[..all_keywords.len().min(NEWS_CRAWL_KEYWORDS)];

    let crawled = crawlers::news::crawl(&sources.news_sources, crawl_keywords).await;
    info!(count = crawled.len(), "Crawled news");
    if crawled.is_empty() {
        warn!("No news items crawled");
        return Ok(());
    }

    let filtered = filter.filter_news(crawled);
    if filtered.is_empty() {
        warn!("No news items passed the keyword filter");
        return Ok(());
    }

    let enriched: Vec<NewsItem> = filtered
        .into_iter()
        .map(|news| enricher.enrich_news(news))
        .collect();

    let unique = Deduplicator::new(db).dedupe_news(enriched).await?;
    info!(count = unique.len(), "News after deduplication");
    if unique.is_empty() {
        info!("No new news items to add");
        return Ok(());
    }

    if options.dry_run {
        info!("DRY RUN: would persist and deliver the following news:");
        for news in unique.iter().take(3) {
            info!(title = %news.title, "  - candidate");
        }
        return Ok(());
    }

    let report = persist_news(db, &unique).await;
    report.log("news");

    if !options.test {
        deliver_news(db, notifier, keywords.delivery.news_per_week).await?;
    }
    Ok(())
}

/// Crawl, process, persist, and deliver papers and patents.
#[instrument(level = "info", skip_all)]
pub async fn run_papers_and_patents(
    db: &Database,
    notifier: &WebhookNotifier,
    keywords: &KeywordsConfig,
    sources: &SourcesConfig,
    options: RunOptions,
) -> Result<(), Box<dyn Error>> {
    info!("=== Starting papers & patents run ===");

    let filter = KeywordFilter::new(keywords);
    let enricher = ContentEnricher::new(keywords);
    let dedup = Deduplicator::new(db);

    let crawled_papers = crawlers::papers::crawl(&sources.paper_sources, &keywords.papers).await;
    info!(count = crawled_papers.len(), "Crawled papers");
    let unique_papers = {
        let filtered = filter.filter_papers(crawled_papers);
        let enriched: Vec<PaperItem> = filtered
            .into_iter()
            .map(|paper| enricher.enrich_paper(paper))
            .collect();
        dedup.dedupe_papers(enriched).await?
    };
    info!(count = unique_papers.len(), "Papers after filtering and deduplication");

    let crawled_patents =
        crawlers::patents::crawl(&sources.patent_sources, &keywords.patents).await;
    info!(count = crawled_patents.len(), "Crawled patents");
    let unique_patents = {
        let filtered = filter.filter_patents(crawled_patents);
        let enriched: Vec<PatentItem> = filtered
            .into_iter()
            .map(|patent| enricher.enrich_patent(patent))
            .collect();
        dedup.dedupe_patents(enriched).await?
    };
    info!(count = unique_patents.len(), "Patents after filtering and deduplication");

    if options.dry_run {
        info!(
            papers = unique_papers.len(),
            patents = unique_patents.len(),
            "DRY RUN: would persist and deliver papers and patents"
        );
        return Ok(());
    }

    if !unique_papers.is_empty() {
        persist_papers(db, &unique_papers).await.log("papers");
    }
    if !unique_patents.is_empty() {
        persist_patents(db, &unique_patents).await.log("patents");
    }

    if !options.test {
        deliver_papers_and_patents(
            db,
            notifier,
            keywords.delivery.papers_per_week,
            keywords.delivery.patents_per_week,
        )
        .await?;
    }
    Ok(())
}

/// Regenerate the static site from the store.
#[instrument(level = "info", skip_all)]
pub async fn run_site_update(
    db: &Database,
    output_dir: &std::path::Path,
) -> Result<(), Box<dyn Error>> {
    info!("=== Updating site ===");
    crate::site::SiteGenerator::new(db, output_dir).generate_all().await
}

pub(crate) async fn persist_news(db: &Database, items: &[NewsItem]) -> IngestReport {
    let mut report = IngestReport::default();
    for news in items {
        report.note(&news.url, db.insert_news(news).await);
    }
    report
}

pub(crate) async fn persist_patents(db: &Database, items: &[PatentItem]) -> IngestReport {
    let mut report = IngestReport::default();
    for patent in items {
        report.note(&patent.application_no, db.insert_patent(patent).await);
    }
    report
}

pub(crate) async fn persist_papers(db: &Database, items: &[PaperItem]) -> IngestReport {
    let mut report = IngestReport::default();
    for paper in items {
        report.note(&paper.source_id, db.insert_paper(paper).await);
    }
    report
}

/// Send the unsent news backlog (up to the weekly cap) and mark delivered
/// rows as sent. A failed delivery marks nothing.
pub(crate) async fn deliver_news(
    db: &Database,
    notifier: &WebhookNotifier,
    cap: i64,
) -> Result<(), StoreError> {
    let unsent = db.unsent_news(cap).await?;
    if unsent.is_empty() {
        info!("No unsent news to deliver");
        return Ok(());
    }

    match notifier.send_news_batch(&unsent).await {
        Ok(()) => {
            let ids: Vec<i64> = unsent.iter().filter_map(|news| news.id).collect();
            db.mark_news_sent(&ids, Utc::now()).await?;
            info!(count = unsent.len(), "Delivered news digest");
        }
        Err(e) => {
            error!(error = %truncate_for_log(&e.to_string(), 300), "News delivery failed; nothing marked sent");
        }
    }
    Ok(())
}

/// Send the unsent papers and patents backlog in one combined card. Both
/// kinds share a single delivery timestamp on success.
pub(crate) async fn deliver_papers_and_patents(
    db: &Database,
    notifier: &WebhookNotifier,
    papers_cap: i64,
    patents_cap: i64,
) -> Result<(), StoreError> {
    let unsent_papers = db.unsent_papers(papers_cap).await?;
    let unsent_patents = db.unsent_patents(patents_cap).await?;
    if unsent_papers.is_empty() && unsent_patents.is_empty() {
        info!("No unsent papers or patents to deliver");
        return Ok(());
    }

    match notifier
        .send_papers_and_patents(&unsent_papers, &unsent_patents)
        .await
    {
        Ok(()) => {
            let sent_at = Utc::now();
            let paper_ids: Vec<i64> = unsent_papers.iter().filter_map(|p| p.id).collect();
            let patent_ids: Vec<i64> = unsent_patents.iter().filter_map(|p| p.id).collect();
            db.mark_papers_sent(&paper_ids, sent_at).await?;
            db.mark_patents_sent(&patent_ids, sent_at).await?;
            info!(
                papers = unsent_papers.len(),
                patents = unsent_patents.len(),
                "Delivered papers & patents digest"
            );
        }
        Err(e) => {
            error!(error = %truncate_for_log(&e.to_string(), 300), "Papers/patents delivery failed; nothing marked sent");
        }
    }
    Ok(())
}
