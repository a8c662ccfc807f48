//! SQLite persistence for collected records.
//!
//! One table per record kind, each with a UNIQUE identity column (`url`,
//! `application_no`, `source_id`). Keywords are stored as a JSON array —
//! sorted, since they come from a `BTreeSet` — and `is_sent`/`sent_date`
//! track delivery state. Tables are created on open.
//!
//! Queries are built with runtime-bound `sqlx::query` so the crate compiles
//! without a live database.

use std::collections::BTreeSet;
use std::path::Path;

use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions, SqliteRow};
use thiserror::Error;
use tracing::{info, instrument};

use crate::filters::dedup::SeenStore;
use crate::models::{NewsItem, PaperItem, PatentItem};

/// Errors raised by store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The record's identity already exists in its table.
    #[error("duplicate identity: {identity}")]
    Duplicate { identity: String },

    #[error("database error")]
    Database(#[from] sqlx::Error),

    /// The keywords column did not hold a valid JSON array.
    #[error("invalid keywords column")]
    Keywords(#[from] serde_json::Error),

    #[error("could not create database directory {path}")]
    CreateDir {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS news (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        url TEXT UNIQUE NOT NULL,
        source TEXT NOT NULL,
        publish_date TEXT,
        summary TEXT NOT NULL,
        content TEXT,
        keywords TEXT NOT NULL,
        score INTEGER NOT NULL DEFAULT 0,
        is_sent BOOLEAN NOT NULL DEFAULT 0,
        sent_date TEXT,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS patents (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        application_no TEXT UNIQUE NOT NULL,
        publication_no TEXT NOT NULL,
        application_date TEXT,
        publication_date TEXT,
        applicant TEXT NOT NULL,
        inventor TEXT NOT NULL,
        abstract_text TEXT NOT NULL,
        keywords TEXT NOT NULL,
        is_sent BOOLEAN NOT NULL DEFAULT 0,
        sent_date TEXT,
        created_at TEXT NOT NULL
    )",
    "CREATE TABLE IF NOT EXISTS papers (
        id INTEGER PRIMARY KEY AUTOINCREMENT,
        title TEXT NOT NULL,
        title_zh TEXT,
        authors TEXT NOT NULL,
        abstract_text TEXT NOT NULL,
        abstract_zh TEXT,
        pdf_url TEXT NOT NULL,
        source_id TEXT UNIQUE NOT NULL,
        publish_date TEXT,
        keywords TEXT NOT NULL,
        is_sent BOOLEAN NOT NULL DEFAULT 0,
        sent_date TEXT,
        created_at TEXT NOT NULL
    )",
    "CREATE INDEX IF NOT EXISTS idx_news_url ON news(url)",
    "CREATE INDEX IF NOT EXISTS idx_news_is_sent ON news(is_sent)",
    "CREATE INDEX IF NOT EXISTS idx_patents_application_no ON patents(application_no)",
    "CREATE INDEX IF NOT EXISTS idx_patents_is_sent ON patents(is_sent)",
    "CREATE INDEX IF NOT EXISTS idx_papers_source_id ON papers(source_id)",
    "CREATE INDEX IF NOT EXISTS idx_papers_is_sent ON papers(is_sent)",
];

/// Handle to the SQLite database.
#[derive(Debug, Clone)]
pub struct Database {
    pool: SqlitePool,
}

impl Database {
    /// Open (creating if missing) the database file and ensure the schema.
    #[instrument(level = "info", skip_all, fields(path = %path.display()))]
    pub async fn open(path: &Path) -> Result<Self, StoreError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| StoreError::CreateDir {
                    path: parent.display().to_string(),
                    source,
                })?;
            }
        }
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;
        let db = Self { pool };
        db.migrate().await?;
        info!("Database ready");
        Ok(db)
    }

    /// Open an in-memory database. A single pooled connection keeps the
    /// database alive for the handle's lifetime.
    pub async fn open_in_memory() -> Result<Self, StoreError> {
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .connect("sqlite::memory:")
            .await?;
        let db = Self { pool };
        db.migrate().await?;
        Ok(db)
    }

    async fn migrate(&self) -> Result<(), StoreError> {
        for statement in SCHEMA {
            sqlx::query(statement).execute(&self.pool).await?;
        }
        Ok(())
    }

    /// Insert a news record, returning its row id.
    pub async fn insert_news(&self, news: &NewsItem) -> Result<i64, StoreError> {
        let keywords = encode_keywords(&news.keywords)?;
        let result = sqlx::query(
            "INSERT INTO news
                (title, url, source, publish_date, summary, content, keywords,
                 score, is_sent, sent_date, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&news.title)
        .bind(&news.url)
        .bind(&news.source)
        .bind(&news.publish_date)
        .bind(&news.summary)
        .bind(&news.content)
        .bind(keywords)
        .bind(news.score)
        .bind(news.is_sent)
        .bind(news.sent_date)
        .bind(news.created_at)
        .execute(&self.pool)
        .await;
        map_insert(result, &news.url)
    }

    /// Insert a patent record, returning its row id.
    pub async fn insert_patent(&self, patent: &PatentItem) -> Result<i64, StoreError> {
        let keywords = encode_keywords(&patent.keywords)?;
        let result = sqlx::query(
            "INSERT INTO patents
                (title, application_no, publication_no, application_date,
                 publication_date, applicant, inventor, abstract_text, keywords,
                 is_sent, sent_date, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&patent.title)
        .bind(&patent.application_no)
        .bind(&patent.publication_no)
        .bind(&patent.application_date)
        .bind(&patent.publication_date)
        .bind(&patent.applicant)
        .bind(&patent.inventor)
        .bind(&patent.abstract_text)
        .bind(keywords)
        .bind(patent.is_sent)
        .bind(patent.sent_date)
        .bind(patent.created_at)
        .execute(&self.pool)
        .await;
        map_insert(result, &patent.application_no)
    }

    /// Insert a paper record, returning its row id.
    pub async fn insert_paper(&self, paper: &PaperItem) -> Result<i64, StoreError> {
        let keywords = encode_keywords(&paper.keywords)?;
        let result = sqlx::query(
            "INSERT INTO papers
                (title, title_zh, authors, abstract_text, abstract_zh, pdf_url,
                 source_id, publish_date, keywords, is_sent, sent_date, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&paper.title)
        .bind(&paper.title_zh)
        .bind(&paper.authors)
        .bind(&paper.abstract_text)
        .bind(&paper.abstract_zh)
        .bind(&paper.pdf_url)
        .bind(&paper.source_id)
        .bind(&paper.publish_date)
        .bind(keywords)
        .bind(paper.is_sent)
        .bind(paper.sent_date)
        .bind(paper.created_at)
        .execute(&self.pool)
        .await;
        map_insert(result, &paper.source_id)
    }

    /// Unsent news, newest first, up to `limit`.
    pub async fn unsent_news(&self, limit: i64) -> Result<Vec<NewsItem>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM news WHERE is_sent = 0 ORDER BY created_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(news_from_row).collect()
    }

    /// Unsent patents, newest first, up to `limit`.
    pub async fn unsent_patents(&self, limit: i64) -> Result<Vec<PatentItem>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM patents WHERE is_sent = 0 ORDER BY created_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(patent_from_row).collect()
    }

    /// Unsent papers, newest first, up to `limit`.
    pub async fn unsent_papers(&self, limit: i64) -> Result<Vec<PaperItem>, StoreError> {
        let rows = sqlx::query(
            "SELECT * FROM papers WHERE is_sent = 0 ORDER BY created_at DESC LIMIT ?",
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(paper_from_row).collect()
    }

    /// Mark news rows as sent with a shared delivery timestamp.
    pub async fn mark_news_sent(
        &self,
        ids: &[i64],
        sent_date: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.mark_sent("news", ids, sent_date).await
    }

    /// Mark patent rows as sent with a shared delivery timestamp.
    pub async fn mark_patents_sent(
        &self,
        ids: &[i64],
        sent_date: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.mark_sent("patents", ids, sent_date).await
    }

    /// Mark paper rows as sent with a shared delivery timestamp.
    pub async fn mark_papers_sent(
        &self,
        ids: &[i64],
        sent_date: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        self.mark_sent("papers", ids, sent_date).await
    }

    async fn mark_sent(
        &self,
        table: &str,
        ids: &[i64],
        sent_date: DateTime<Utc>,
    ) -> Result<(), StoreError> {
        if ids.is_empty() {
            return Ok(());
        }
        let placeholders = vec!["?"; ids.len()].join(",");
        let sql =
            format!("UPDATE {table} SET is_sent = 1, sent_date = ? WHERE id IN ({placeholders})");
        let mut query = sqlx::query(&sql).bind(sent_date);
        for id in ids {
            query = query.bind(*id);
        }
        query.execute(&self.pool).await?;
        info!(table, count = ids.len(), "Marked records as sent");
        Ok(())
    }

    /// Most recent news, up to `limit` (for the site generator).
    pub async fn all_news(&self, limit: i64) -> Result<Vec<NewsItem>, StoreError> {
        let rows = sqlx::query("SELECT * FROM news ORDER BY created_at DESC LIMIT ?")
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(news_from_row).collect()
    }

    /// Most recent patents, up to `limit`.
    pub async fn all_patents(&self, limit: i64) -> Result<Vec<PatentItem>, StoreError> {
        let rows = sqlx::query("SELECT * FROM patents ORDER BY created_at DESC LIMIT ?")
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(patent_from_row).collect()
    }

    /// Most recent papers, up to `limit`.
    pub async fn all_papers(&self, limit: i64) -> Result<Vec<PaperItem>, StoreError> {
        let rows = sqlx::query("SELECT * FROM papers ORDER BY created_at DESC LIMIT ?")
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(paper_from_row).collect()
    }
}

impl SeenStore for Database {
    async fn news_exists(&self, url: &str) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 FROM news WHERE url = ?")
            .bind(url)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn patent_exists(&self, application_no: &str) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 FROM patents WHERE application_no = ?")
            .bind(application_no)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }

    async fn paper_exists(&self, source_id: &str) -> Result<bool, StoreError> {
        let row = sqlx::query("SELECT 1 FROM papers WHERE source_id = ?")
            .bind(source_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.is_some())
    }
}

fn map_insert(
    result: Result<sqlx::sqlite::SqliteQueryResult, sqlx::Error>,
    identity: &str,
) -> Result<i64, StoreError> {
    match result {
        Ok(done) => Ok(done.last_insert_rowid()),
        Err(sqlx::Error::Database(db)) if db.is_unique_violation() => {
            Err(StoreError::Duplicate {
                identity: identity.to_string(),
            })
        }
        Err(e) => Err(e.into()),
    }
}

fn encode_keywords(keywords: &BTreeSet<String>) -> Result<String, StoreError> {
    Ok(serde_json::to_string(keywords)?)
}

fn decode_keywords(raw: &str) -> Result<BTreeSet<String>, StoreError> {
    Ok(serde_json::from_str(raw)?)
}

fn news_from_row(row: &SqliteRow) -> Result<NewsItem, StoreError> {
    let keywords: String = row.try_get("keywords")?;
    Ok(NewsItem {
        id: Some(row.try_get("id")?),
        title: row.try_get("title")?,
        url: row.try_get("url")?,
        source: row.try_get("source")?,
        publish_date: row.try_get("publish_date")?,
        summary: row.try_get("summary")?,
        content: row.try_get("content")?,
        keywords: decode_keywords(&keywords)?,
        score: row.try_get("score")?,
        is_sent: row.try_get("is_sent")?,
        sent_date: row.try_get("sent_date")?,
        created_at: row.try_get("created_at")?,
    })
}

fn patent_from_row(row: &SqliteRow) -> Result<PatentItem, StoreError> {
    let keywords: String = row.try_get("keywords")?;
    Ok(PatentItem {
        id: Some(row.try_get("id")?),
        title: row.try_get("title")?,
        application_no: row.try_get("application_no")?,
        publication_no: row.try_get("publication_no")?,
        application_date: row.try_get("application_date")?,
        publication_date: row.try_get("publication_date")?,
        applicant: row.try_get("applicant")?,
        inventor: row.try_get("inventor")?,
        abstract_text: row.try_get("abstract_text")?,
        keywords: decode_keywords(&keywords)?,
        is_sent: row.try_get("is_sent")?,
        sent_date: row.try_get("sent_date")?,
        created_at: row.try_get("created_at")?,
    })
}

fn paper_from_row(row: &SqliteRow) -> Result<PaperItem, StoreError> {
    let keywords: String = row.try_get("keywords")?;
    Ok(PaperItem {
        id: Some(row.try_get("id")?),
        title: row.try_get("title")?,
        title_zh: row.try_get("title_zh")?,
        authors: row.try_get("authors")?,
        abstract_text: row.try_get("abstract_text")?,
        abstract_zh: row.try_get("abstract_zh")?,
        pdf_url: row.try_get("pdf_url")?,
        source_id: row.try_get("source_id")?,
        publish_date: row.try_get("publish_date")?,
        keywords: decode_keywords(&keywords)?,
        is_sent: row.try_get("is_sent")?,
        sent_date: row.try_get("sent_date")?,
        created_at: row.try_get("created_at")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn news_at(url: &str, secs: i64) -> NewsItem {
        let mut news = NewsItem::new(format!("title {url}"), url, "Test Wire");
        news.created_at = Utc.timestamp_opt(secs, 0).unwrap();
        news
    }

    #[tokio::test]
    async fn test_insert_and_exists() {
        let db = Database::open_in_memory().await.unwrap();
        let id = db.insert_news(&news_at("u1", 1)).await.unwrap();
        assert!(id > 0);
        assert!(db.news_exists("u1").await.unwrap());
        assert!(!db.news_exists("u2").await.unwrap());
    }

    #[tokio::test]
    async fn test_duplicate_identity_is_typed_error() {
        let db = Database::open_in_memory().await.unwrap();
        db.insert_news(&news_at("u1", 1)).await.unwrap();
        let err = db.insert_news(&news_at("u1", 2)).await.unwrap_err();
        match err {
            StoreError::Duplicate { identity } => assert_eq!(identity, "u1"),
            other => panic!("expected Duplicate, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_keywords_roundtrip_as_sorted_set() {
        let db = Database::open_in_memory().await.unwrap();
        let mut news = news_at("u1", 1);
        news.keywords = ["welding".to_string(), "agv".to_string()].into_iter().collect();
        db.insert_news(&news).await.unwrap();

        let stored = db.all_news(10).await.unwrap();
        assert_eq!(stored.len(), 1);
        assert_eq!(
            stored[0].keywords.iter().collect::<Vec<_>>(),
            vec!["agv", "welding"]
        );
    }

    #[tokio::test]
    async fn test_unsent_newest_first_with_limit() {
        let db = Database::open_in_memory().await.unwrap();
        for (url, secs) in [("u1", 10), ("u2", 30), ("u3", 20)] {
            db.insert_news(&news_at(url, secs)).await.unwrap();
        }
        let unsent = db.unsent_news(2).await.unwrap();
        let urls: Vec<&str> = unsent.iter().map(|n| n.url.as_str()).collect();
        assert_eq!(urls, vec!["u2", "u3"]);
    }

    #[tokio::test]
    async fn test_mark_sent_removes_from_backlog() {
        let db = Database::open_in_memory().await.unwrap();
        let id1 = db.insert_news(&news_at("u1", 1)).await.unwrap();
        db.insert_news(&news_at("u2", 2)).await.unwrap();

        let sent_at = Utc.timestamp_opt(100, 0).unwrap();
        db.mark_news_sent(&[id1], sent_at).await.unwrap();

        let unsent = db.unsent_news(10).await.unwrap();
        assert_eq!(unsent.len(), 1);
        assert_eq!(unsent[0].url, "u2");

        let all = db.all_news(10).await.unwrap();
        let sent = all.iter().find(|n| n.url == "u1").unwrap();
        assert!(sent.is_sent);
        assert_eq!(sent.sent_date, Some(sent_at));
    }

    #[tokio::test]
    async fn test_patent_and_paper_roundtrip() {
        let db = Database::open_in_memory().await.unwrap();

        let mut patent = PatentItem::new("一种上料机构", "CN202310000001A");
        patent.applicant = "某科技".to_string();
        patent.abstract_text = "abstract".to_string();
        db.insert_patent(&patent).await.unwrap();
        assert!(db.patent_exists("CN202310000001A").await.unwrap());

        let mut paper = PaperItem::new("Grasping Survey", "2401.00001v1");
        paper.authors = "A, B".to_string();
        paper.pdf_url = "http://arxiv.org/pdf/2401.00001v1.pdf".to_string();
        db.insert_paper(&paper).await.unwrap();
        assert!(db.paper_exists("2401.00001v1").await.unwrap());

        let patents = db.all_patents(10).await.unwrap();
        assert_eq!(patents[0].applicant, "某科技");
        let papers = db.all_papers(10).await.unwrap();
        assert_eq!(papers[0].pdf_url, "http://arxiv.org/pdf/2401.00001v1.pdf");
    }

    #[tokio::test]
    async fn test_mark_sent_with_no_ids_is_noop() {
        let db = Database::open_in_memory().await.unwrap();
        db.mark_news_sent(&[], Utc::now()).await.unwrap();
    }
}
