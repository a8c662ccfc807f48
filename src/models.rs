//! Data models for collected records.
//!
//! This module defines the three record kinds that flow through the
//! pipeline:
//! - [`NewsItem`]: a news article, identified by its URL
//! - [`PatentItem`]: a patent, identified by its application number
//! - [`PaperItem`]: an academic paper, identified by its source id
//!
//! Records are created by the crawlers, transformed by the filters, and
//! persisted by the store. After persistence the only permitted mutation is
//! marking a record as sent.
//!
//! Keywords are held in a [`BTreeSet`] so the collection is duplicate-free
//! and order-insensitive in memory, while serializing to a deterministic
//! (sorted) list at storage and wire boundaries.

use std::collections::BTreeSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// A news article.
///
/// The `url` is the record's identity: it must be non-empty and globally
/// unique before the record can be persisted. `score` and `keywords` are
/// assigned by the keyword filter; both start empty on a freshly crawled
/// record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewsItem {
    /// Database row id, absent until the record is persisted.
    pub id: Option<i64>,
    /// The article headline.
    pub title: String,
    /// The article URL. Identity field: unique per record.
    pub url: String,
    /// Human-readable name of the source the article came from.
    pub source: String,
    /// Publish date as reported by the source, in whatever format it uses.
    pub publish_date: Option<String>,
    /// Short summary; synthesized from the title when the source has none.
    pub summary: String,
    /// Full article content, when the crawler captured it.
    pub content: Option<String>,
    /// Matched keywords plus extracted company names.
    pub keywords: BTreeSet<String>,
    /// Number of distinct keywords matched in title + summary.
    pub score: i64,
    /// Whether this record was part of a confirmed webhook delivery.
    pub is_sent: bool,
    /// Set together with `is_sent` on confirmed delivery.
    pub sent_date: Option<DateTime<Utc>>,
    /// When the record was first created by a crawler.
    pub created_at: DateTime<Utc>,
}

impl NewsItem {
    /// Create a fresh, unscored news record.
    pub fn new(title: impl Into<String>, url: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            id: None,
            title: title.into(),
            url: url.into(),
            source: source.into(),
            publish_date: None,
            summary: String::new(),
            content: None,
            keywords: BTreeSet::new(),
            score: 0,
            is_sent: false,
            sent_date: None,
            created_at: Utc::now(),
        }
    }
}

/// A patent record.
///
/// Identified by `application_no`. When a source yields no extractable
/// number, [`PatentItem::fallback_application_no`] derives a synthetic one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatentItem {
    pub id: Option<i64>,
    pub title: String,
    /// Identity field. May be a synthetic `TEMP_` fallback.
    pub application_no: String,
    pub publication_no: String,
    pub application_date: Option<String>,
    pub publication_date: Option<String>,
    pub applicant: String,
    pub inventor: String,
    pub abstract_text: String,
    pub keywords: BTreeSet<String>,
    pub is_sent: bool,
    pub sent_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl PatentItem {
    /// Create a fresh patent record.
    pub fn new(title: impl Into<String>, application_no: impl Into<String>) -> Self {
        Self {
            id: None,
            title: title.into(),
            application_no: application_no.into(),
            publication_no: String::new(),
            application_date: None,
            publication_date: None,
            applicant: String::new(),
            inventor: String::new(),
            abstract_text: String::new(),
            keywords: BTreeSet::new(),
            is_sent: false,
            sent_date: None,
            created_at: Utc::now(),
        }
    }

    /// Derive a synthetic application number from a patent title.
    ///
    /// Used when a source result carries no recognizable application
    /// number. The value is the first 8 bytes of SHA-256 of the title,
    /// reduced mod 10^10 and zero-padded: `TEMP_0123456789`.
    ///
    /// The derivation is deterministic across runs, so two patents with
    /// identical titles and no real number receive the same identity and
    /// deduplicate as one record. That collision is intentional: a titleless
    /// duplicate beats an ever-growing pile of the same patent.
    pub fn fallback_application_no(title: &str) -> String {
        let digest = Sha256::digest(title.as_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest[..8]);
        let n = u64::from_be_bytes(prefix) % 10_000_000_000;
        format!("TEMP_{n:010}")
    }
}

/// An academic paper record, identified by its source-assigned id
/// (for arXiv, the arXiv id). Papers have no synthetic identity fallback:
/// a paper without a `source_id` is dropped during deduplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PaperItem {
    pub id: Option<i64>,
    pub title: String,
    /// Translated title, filled by a future enrichment step.
    pub title_zh: Option<String>,
    /// Author names joined as free text.
    pub authors: String,
    pub abstract_text: String,
    /// Translated abstract, filled by a future enrichment step.
    pub abstract_zh: Option<String>,
    pub pdf_url: String,
    /// Identity field: the source catalog id, e.g. `2405.01234v1`.
    pub source_id: String,
    pub publish_date: Option<String>,
    pub keywords: BTreeSet<String>,
    pub is_sent: bool,
    pub sent_date: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl PaperItem {
    /// Create a fresh paper record.
    pub fn new(title: impl Into<String>, source_id: impl Into<String>) -> Self {
        Self {
            id: None,
            title: title.into(),
            title_zh: None,
            authors: String::new(),
            abstract_text: String::new(),
            abstract_zh: None,
            pdf_url: String::new(),
            source_id: source_id.into(),
            publish_date: None,
            keywords: BTreeSet::new(),
            is_sent: false,
            sent_date: None,
            created_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_news_item_starts_unscored_and_unsent() {
        let news = NewsItem::new("New Robot Unveiled", "https://example.com/a1", "Example Wire");
        assert_eq!(news.score, 0);
        assert!(news.keywords.is_empty());
        assert!(!news.is_sent);
        assert!(news.sent_date.is_none());
        assert!(news.id.is_none());
    }

    #[test]
    fn test_keywords_are_set_valued() {
        let mut news = NewsItem::new("t", "u", "s");
        news.keywords.insert("robot".to_string());
        news.keywords.insert("robot".to_string());
        news.keywords.insert("cnc".to_string());
        assert_eq!(news.keywords.len(), 2);
    }

    #[test]
    fn test_keywords_serialize_sorted() {
        let mut news = NewsItem::new("t", "u", "s");
        news.keywords.insert("welding".to_string());
        news.keywords.insert("agv".to_string());
        news.keywords.insert("robot".to_string());
        let json = serde_json::to_string(&news.keywords).unwrap();
        assert_eq!(json, r#"["agv","robot","welding"]"#);
    }

    #[test]
    fn test_fallback_application_no_is_deterministic() {
        let a = PatentItem::fallback_application_no("一种焊接机器人控制方法");
        let b = PatentItem::fallback_application_no("一种焊接机器人控制方法");
        assert_eq!(a, b);
    }

    #[test]
    fn test_fallback_application_no_format() {
        let no = PatentItem::fallback_application_no("Some patent title");
        assert!(no.starts_with("TEMP_"));
        let digits = &no["TEMP_".len()..];
        assert_eq!(digits.len(), 10);
        assert!(digits.chars().all(|c| c.is_ascii_digit()));
    }

    #[test]
    fn test_fallback_application_no_differs_by_title() {
        let a = PatentItem::fallback_application_no("Title A");
        let b = PatentItem::fallback_application_no("Title B");
        assert_ne!(a, b);
    }

    #[test]
    fn test_paper_roundtrip() {
        let mut paper = PaperItem::new("Grasp Planning Survey", "2405.01234v1");
        paper.authors = "A. Author, B. Author".to_string();
        paper.pdf_url = "http://arxiv.org/pdf/2405.01234v1.pdf".to_string();
        let json = serde_json::to_string(&paper).unwrap();
        let back: PaperItem = serde_json::from_str(&json).unwrap();
        assert_eq!(back.source_id, "2405.01234v1");
        assert_eq!(back.authors, paper.authors);
    }
}
