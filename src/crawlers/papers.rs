//! Paper crawler for the arXiv Atom API.
//!
//! Builds one query per enabled source (keywords OR-ed together, optionally
//! narrowed by category), sorted by submission date descending, and parses
//! the Atom response into paper records. Entries that lack a title or an
//! arXiv id are skipped.

use quick_xml::Reader;
use quick_xml::events::{BytesStart, Event};
use tracing::{error, info, instrument};

use crate::config::PaperSource;
use crate::crawlers::{fetch_text, http_client};
use crate::models::PaperItem;

const ARXIV_API_URL: &str = "http://export.arxiv.org/api/query";
const MAX_QUERY_KEYWORDS: usize = 5;

/// Crawl all enabled paper sources.
#[instrument(level = "info", skip_all, fields(sources = sources.len()))]
pub async fn crawl(sources: &[PaperSource], keywords: &[String]) -> Vec<PaperItem> {
    let client = http_client();
    let mut all_papers = Vec::new();

    for source in sources {
        if !source.enabled {
            info!(name = %source.name, "Skipping disabled paper source");
            continue;
        }
        if keywords.is_empty() {
            info!(name = %source.name, "No paper keywords configured, skipping");
            continue;
        }

        let query = build_query(keywords, &source.categories);
        let url = format!(
            "{ARXIV_API_URL}?search_query={}&start=0&max_results={}&sortBy=submittedDate&sortOrder=descending",
            query.replace(' ', "+"),
            source.max_results,
        );
        info!(name = %source.name, %query, "Querying paper source");

        let Some(xml) = fetch_text(&client, &url).await else {
            continue;
        };
        let papers = parse_feed(&xml);
        info!(count = papers.len(), name = %source.name, "Crawled papers from source");
        all_papers.extend(papers);
    }

    all_papers
}

/// Build an arXiv search query: OR-ed keywords, AND-ed with OR-ed
/// categories when any are configured. Keywords are percent-encoded;
/// the boolean structure stays literal.
fn build_query(keywords: &[String], categories: &[String]) -> String {
    let keyword_query = keywords
        .iter()
        .take(MAX_QUERY_KEYWORDS)
        .map(|kw| format!("all:{}", urlencoding::encode(kw)))
        .collect::<Vec<_>>()
        .join(" OR ");

    if categories.is_empty() {
        keyword_query
    } else {
        let category_query = categories
            .iter()
            .map(|cat| format!("cat:{cat}"))
            .collect::<Vec<_>>()
            .join(" OR ");
        format!("({keyword_query}) AND ({category_query})")
    }
}

#[derive(Default)]
struct EntryDraft {
    id: String,
    title: String,
    summary: String,
    published: String,
    authors: Vec<String>,
    pdf_url: Option<String>,
}

impl EntryDraft {
    fn note_link(&mut self, element: &BytesStart) {
        let mut href = None;
        let mut is_pdf = false;
        for attr in element.attributes().flatten() {
            match attr.key.local_name().as_ref() {
                b"href" => href = attr.unescape_value().ok().map(|v| v.into_owned()),
                b"title" => {
                    is_pdf = attr.unescape_value().map(|v| v == "pdf").unwrap_or(false);
                }
                _ => {}
            }
        }
        if is_pdf {
            if let Some(href) = href {
                self.pdf_url = Some(href);
            }
        }
    }

    fn into_paper(self) -> Option<PaperItem> {
        let source_id = self
            .id
            .split_once("/abs/")
            .map(|(_, id)| id.trim().to_string())
            .unwrap_or_default();
        let title = normalize_whitespace(&self.title);
        if title.is_empty() || source_id.is_empty() {
            return None;
        }

        let mut paper = PaperItem::new(title, source_id.clone());
        paper.authors = self.authors.join(", ");
        paper.abstract_text = normalize_whitespace(&self.summary);
        paper.publish_date = self.published.get(0..10).map(|s| s.to_string());
        paper.pdf_url = self
            .pdf_url
            .unwrap_or_else(|| format!("http://arxiv.org/pdf/{source_id}.pdf"));
        Some(paper)
    }
}

/// Parse an arXiv Atom feed into paper records.
fn parse_feed(xml: &str) -> Vec<PaperItem> {
    let mut reader = Reader::from_str(xml);
    let mut papers = Vec::new();
    let mut entry: Option<EntryDraft> = None;
    let mut path: Vec<String> = Vec::new();

    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).into_owned();
                if name == "entry" {
                    entry = Some(EntryDraft::default());
                } else if name == "link" {
                    if let Some(draft) = entry.as_mut() {
                        draft.note_link(&e);
                    }
                }
                path.push(name);
            }
            Ok(Event::Empty(e)) => {
                if e.local_name().as_ref() == b"link" {
                    if let Some(draft) = entry.as_mut() {
                        draft.note_link(&e);
                    }
                }
            }
            Ok(Event::Text(t)) => {
                let Some(draft) = entry.as_mut() else { continue };
                let Some(tag) = path.last() else { continue };
                let text = match t.xml_content() {
                    Ok(text) => text.into_owned(),
                    Err(_) => continue,
                };
                match tag.as_str() {
                    "title" => draft.title.push_str(&text),
                    "id" => draft.id.push_str(&text),
                    "summary" => draft.summary.push_str(&text),
                    "published" => draft.published.push_str(&text),
                    "name" if path.iter().any(|p| p == "author") => {
                        let name = text.trim().to_string();
                        if !name.is_empty() {
                            draft.authors.push(name);
                        }
                    }
                    _ => {}
                }
            }
            Ok(Event::End(e)) => {
                if e.local_name().as_ref() == b"entry" {
                    if let Some(paper) = entry.take().and_then(EntryDraft::into_paper) {
                        papers.push(paper);
                    }
                }
                path.pop();
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                error!(error = %e, "Failed to parse Atom feed");
                break;
            }
            Ok(_) => {}
        }
    }

    papers
}

fn normalize_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const FEED: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<feed xmlns="http://www.w3.org/2005/Atom">
  <title>ArXiv Query Results</title>
  <id>http://arxiv.org/api/feedid</id>
  <entry>
    <id>http://arxiv.org/abs/2405.01234v1</id>
    <title>Learning Robotic
      Grasping at Scale</title>
    <summary>We study grasp
      synthesis for bin picking.</summary>
    <published>2024-05-02T17:59:59Z</published>
    <author><name>Ada Lovelace</name></author>
    <author><name>Grace Hopper</name></author>
    <link href="http://arxiv.org/abs/2405.01234v1" rel="alternate" type="text/html"/>
    <link title="pdf" href="http://arxiv.org/pdf/2405.01234v1" rel="related" type="application/pdf"/>
  </entry>
  <entry>
    <id>http://arxiv.org/abs/2405.09999v2</id>
    <title>Untitled Benchmarks for Welding Robots</title>
    <summary>Abstract text.</summary>
    <published>2024-05-10T00:00:00Z</published>
    <author><name>Solo Author</name></author>
  </entry>
  <entry>
    <id>http://arxiv.org/api/not-a-paper</id>
    <title>Broken entry</title>
  </entry>
</feed>"#;

    #[test]
    fn test_parse_feed_extracts_entries() {
        let papers = parse_feed(FEED);
        assert_eq!(papers.len(), 2);
        assert_eq!(papers[0].source_id, "2405.01234v1");
        assert_eq!(papers[0].title, "Learning Robotic Grasping at Scale");
        assert_eq!(papers[0].authors, "Ada Lovelace, Grace Hopper");
        assert_eq!(papers[0].publish_date.as_deref(), Some("2024-05-02"));
        assert_eq!(papers[0].pdf_url, "http://arxiv.org/pdf/2405.01234v1");
    }

    #[test]
    fn test_missing_pdf_link_is_constructed() {
        let papers = parse_feed(FEED);
        assert_eq!(papers[1].pdf_url, "http://arxiv.org/pdf/2405.09999v2.pdf");
    }

    #[test]
    fn test_entry_without_abs_id_is_skipped() {
        let papers = parse_feed(FEED);
        assert!(papers.iter().all(|p| p.title != "Broken entry"));
    }

    #[test]
    fn test_build_query_keywords_only() {
        let keywords = vec!["robot".to_string(), "bin picking".to_string()];
        assert_eq!(
            build_query(&keywords, &[]),
            "all:robot OR all:bin%20picking"
        );
    }

    #[test]
    fn test_build_query_with_categories() {
        let keywords = vec!["grasping".to_string()];
        let categories = vec!["cs.RO".to_string(), "cs.CV".to_string()];
        assert_eq!(
            build_query(&keywords, &categories),
            "(all:grasping) AND (cat:cs.RO OR cat:cs.CV)"
        );
    }

    #[test]
    fn test_build_query_caps_keywords() {
        let keywords: Vec<String> = (0..8).map(|i| format!("k{i}")).collect();
        let query = build_query(&keywords, &[]);
        assert_eq!(query.matches("all:").count(), MAX_QUERY_KEYWORDS);
    }
}
