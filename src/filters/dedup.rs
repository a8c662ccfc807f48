//! Deduplication against the current batch and against storage.
//!
//! A record is novel when its identity has not been seen earlier in the
//! same batch and is not already persisted. The check is a stable filter:
//! input order is preserved, and when two records in a batch share an
//! identity the first one encountered wins.
//!
//! The store side of the check goes through the [`SeenStore`] trait so the
//! core stays testable without a database. Each record costs one existence
//! query; batches are tens of records, so no caching or batching is done.

use tracing::{debug, info, warn};

use crate::models::{NewsItem, PaperItem, PatentItem};
use crate::store::StoreError;

/// Per-kind identity existence checks, implemented by the SQLite store
/// and by in-memory fakes in tests.
pub trait SeenStore {
    async fn news_exists(&self, url: &str) -> Result<bool, StoreError>;
    async fn patent_exists(&self, application_no: &str) -> Result<bool, StoreError>;
    async fn paper_exists(&self, source_id: &str) -> Result<bool, StoreError>;
}

/// Drops records whose identity is already known.
pub struct Deduplicator<'a, S> {
    store: &'a S,
}

impl<'a, S: SeenStore> Deduplicator<'a, S> {
    pub fn new(store: &'a S) -> Self {
        Self { store }
    }

    /// Deduplicate news by URL.
    pub async fn dedupe_news(&self, items: Vec<NewsItem>) -> Result<Vec<NewsItem>, StoreError> {
        let total = items.len();
        let mut seen = std::collections::HashSet::new();
        let mut unique = Vec::new();

        for news in items {
            if seen.contains(&news.url) {
                debug!(url = %news.url, "Skipping duplicate URL in batch");
                continue;
            }
            if self.store.news_exists(&news.url).await? {
                debug!(url = %news.url, "Skipping URL already in store");
                continue;
            }
            seen.insert(news.url.clone());
            unique.push(news);
        }

        log_removed("news", total, unique.len());
        Ok(unique)
    }

    /// Deduplicate patents by application number.
    pub async fn dedupe_patents(
        &self,
        items: Vec<PatentItem>,
    ) -> Result<Vec<PatentItem>, StoreError> {
        let total = items.len();
        let mut seen = std::collections::HashSet::new();
        let mut unique = Vec::new();

        for patent in items {
            if seen.contains(&patent.application_no) {
                debug!(application_no = %patent.application_no, "Skipping duplicate application number in batch");
                continue;
            }
            if self.store.patent_exists(&patent.application_no).await? {
                debug!(application_no = %patent.application_no, "Skipping patent already in store");
                continue;
            }
            seen.insert(patent.application_no.clone());
            unique.push(patent);
        }

        log_removed("patents", total, unique.len());
        Ok(unique)
    }

    /// Deduplicate papers by source id. A paper without a source id is
    /// always dropped: papers have no synthetic identity fallback.
    pub async fn dedupe_papers(
        &self,
        items: Vec<PaperItem>,
    ) -> Result<Vec<PaperItem>, StoreError> {
        let total = items.len();
        let mut seen = std::collections::HashSet::new();
        let mut unique = Vec::new();

        for paper in items {
            if paper.source_id.is_empty() {
                warn!(title = %paper.title, "Dropping paper without a source id");
                continue;
            }
            if seen.contains(&paper.source_id) {
                debug!(source_id = %paper.source_id, "Skipping duplicate source id in batch");
                continue;
            }
            if self.store.paper_exists(&paper.source_id).await? {
                debug!(source_id = %paper.source_id, "Skipping paper already in store");
                continue;
            }
            seen.insert(paper.source_id.clone());
            unique.push(paper);
        }

        log_removed("papers", total, unique.len());
        Ok(unique)
    }
}

fn log_removed(kind: &str, total: usize, kept: usize) {
    if kept < total {
        info!(kind, removed = total - kept, kept, "Removed duplicates");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[derive(Default)]
    struct FakeSeen {
        news: HashSet<String>,
        patents: HashSet<String>,
        papers: HashSet<String>,
    }

    impl SeenStore for FakeSeen {
        async fn news_exists(&self, url: &str) -> Result<bool, StoreError> {
            Ok(self.news.contains(url))
        }
        async fn patent_exists(&self, application_no: &str) -> Result<bool, StoreError> {
            Ok(self.patents.contains(application_no))
        }
        async fn paper_exists(&self, source_id: &str) -> Result<bool, StoreError> {
            Ok(self.papers.contains(source_id))
        }
    }

    fn news(url: &str) -> NewsItem {
        NewsItem::new(format!("title {url}"), url, "s")
    }

    #[tokio::test]
    async fn test_batch_dedup_keeps_first_and_preserves_order() {
        let store = FakeSeen::default();
        let dedup = Deduplicator::new(&store);

        let a = news("ua");
        let mut b = news("ub");
        b.title = "first b".to_string();
        let mut c = news("ub");
        c.title = "second b".to_string();

        let out = dedup.dedupe_news(vec![a, b, c]).await.unwrap();
        assert_eq!(out.len(), 2);
        assert_eq!(out[0].url, "ua");
        assert_eq!(out[1].url, "ub");
        assert_eq!(out[1].title, "first b");
    }

    #[tokio::test]
    async fn test_store_dedup_drops_known_identity() {
        let mut store = FakeSeen::default();
        store.news.insert("u1".to_string());
        let dedup = Deduplicator::new(&store);

        let out = dedup.dedupe_news(vec![news("u0"), news("u1"), news("u2")]).await.unwrap();
        let urls: Vec<&str> = out.iter().map(|n| n.url.as_str()).collect();
        assert_eq!(urls, vec!["u0", "u2"]);
    }

    #[tokio::test]
    async fn test_empty_store_passes_batch_through() {
        let store = FakeSeen::default();
        let dedup = Deduplicator::new(&store);
        let out = dedup.dedupe_news(vec![news("u1")]).await.unwrap();
        assert_eq!(out.len(), 1);
    }

    #[tokio::test]
    async fn test_patent_dedup_by_application_no() {
        let mut store = FakeSeen::default();
        store.patents.insert("CN1A".to_string());
        let dedup = Deduplicator::new(&store);

        let known = PatentItem::new("known", "CN1A");
        let fresh = PatentItem::new("fresh", "CN2A");
        let out = dedup.dedupe_patents(vec![known, fresh]).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].application_no, "CN2A");
    }

    #[tokio::test]
    async fn test_synthetic_patent_identities_collide_by_title() {
        let store = FakeSeen::default();
        let dedup = Deduplicator::new(&store);

        let no = PatentItem::fallback_application_no("一种焊接方法");
        let first = PatentItem::new("一种焊接方法", no.clone());
        let second = PatentItem::new("一种焊接方法", no);
        let out = dedup.dedupe_patents(vec![first, second]).await.unwrap();
        assert_eq!(out.len(), 1);
    }

    #[tokio::test]
    async fn test_paper_without_source_id_always_dropped() {
        let store = FakeSeen::default();
        let dedup = Deduplicator::new(&store);

        let anon = PaperItem::new("no id yet", "");
        let named = PaperItem::new("has id", "2401.00001");
        let out = dedup.dedupe_papers(vec![anon, named]).await.unwrap();
        assert_eq!(out.len(), 1);
        assert_eq!(out[0].source_id, "2401.00001");
    }

    #[tokio::test]
    async fn test_paper_dedup_against_store() {
        let mut store = FakeSeen::default();
        store.papers.insert("2401.00001".to_string());
        let dedup = Deduplicator::new(&store);

        let out = dedup
            .dedupe_papers(vec![PaperItem::new("seen", "2401.00001")])
            .await
            .unwrap();
        assert!(out.is_empty());
    }
}
