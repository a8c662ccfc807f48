//! News crawler for configured HTML listing pages.
//!
//! Sources whose `search_url` carries a `{keyword}` placeholder are queried
//! once per keyword (bounded); plain sources get their listing page fetched
//! once and the latest entries parsed out with CSS selectors.

use futures::stream::{self, StreamExt};
use scraper::{ElementRef, Html, Selector};
use tracing::{info, instrument, warn};
use url::Url;

use crate::config::NewsSource;
use crate::crawlers::{fetch_text, http_client};
use crate::filters::enrich::summarize;
use crate::models::NewsItem;

const MAX_ITEMS_PER_PAGE: usize = 20;
const MAX_SEARCH_KEYWORDS: usize = 5;
const SUMMARY_MAX_LEN: usize = 150;

/// Crawl all enabled news sources.
#[instrument(level = "info", skip_all, fields(sources = sources.len()))]
pub async fn crawl(sources: &[NewsSource], keywords: &[String]) -> Vec<NewsItem> {
    let client = http_client();
    let mut all_news = Vec::new();

    for source in sources {
        if !source.enabled {
            info!(name = %source.name, "Skipping disabled news source");
            continue;
        }
        info!(name = %source.name, "Crawling news source");

        let listing = source.search_url.as_deref().unwrap_or(&source.base_url);
        let pages: Vec<String> = if listing.contains("{keyword}") {
            stream::iter(keywords.iter().take(MAX_SEARCH_KEYWORDS))
                .then(|keyword| {
                    let url = listing.replace("{keyword}", &urlencoding::encode(keyword));
                    let client = &client;
                    async move { fetch_text(client, &url).await }
                })
                .filter_map(std::future::ready)
                .collect()
                .await
        } else {
            fetch_text(&client, listing).await.into_iter().collect()
        };

        let mut count = 0usize;
        for html in pages {
            let items = parse_listing(&html, &source.name, &source.base_url);
            count += items.len();
            all_news.extend(items);
        }
        info!(count, name = %source.name, "Crawled news from source");
    }

    all_news
}

/// Parse a listing page into news records.
fn parse_listing(html: &str, source_name: &str, base_url: &str) -> Vec<NewsItem> {
    let document = Html::parse_document(html);
    let container_selector =
        Selector::parse("article, .news-item, .article, .post, .item, li.news, .list-item")
            .unwrap();

    let mut items = Vec::new();
    for element in document.select(&container_selector).take(MAX_ITEMS_PER_PAGE) {
        match parse_entry(element, source_name, base_url) {
            Some(news) => items.push(news),
            None => warn!(source = source_name, "Skipping unparseable listing entry"),
        }
    }
    items
}

/// Parse one listing entry. Returns `None` when no usable title/link pair
/// can be extracted.
fn parse_entry(element: ElementRef, source_name: &str, base_url: &str) -> Option<NewsItem> {
    let title_selector = Selector::parse("h1, h2, h3, h4, a").unwrap();
    let link_selector = Selector::parse("a[href]").unwrap();
    let summary_selector = Selector::parse(".summary, .desc, .description, .excerpt, p").unwrap();
    let date_selector = Selector::parse("time, .date, .time, .publish-time").unwrap();

    let title_element = element.select(&title_selector).next()?;
    let title = collect_text(title_element);
    if title.is_empty() {
        return None;
    }

    let href = title_element
        .value()
        .attr("href")
        .or_else(|| {
            element
                .select(&link_selector)
                .next()
                .and_then(|a| a.value().attr("href"))
        })?
        .to_string();
    let url = resolve_url(base_url, &href)?;

    let raw_summary = element
        .select(&summary_selector)
        .next()
        .map(collect_text)
        .unwrap_or_default();

    let publish_date = element.select(&date_selector).next().and_then(|el| {
        let text = collect_text(el);
        if !text.is_empty() {
            Some(text)
        } else {
            el.value().attr("datetime").map(|s| s.to_string())
        }
    });

    let mut news = NewsItem::new(title.clone(), url, source_name);
    news.summary = summarize(&title, &raw_summary, SUMMARY_MAX_LEN);
    news.publish_date = publish_date;
    Some(news)
}

fn collect_text(element: ElementRef) -> String {
    element.text().collect::<Vec<_>>().join(" ").trim().to_string()
}

/// Resolve a possibly-relative href against the source base URL.
fn resolve_url(base_url: &str, href: &str) -> Option<String> {
    if href.starts_with("http://") || href.starts_with("https://") {
        return Some(href.to_string());
    }
    let base = Url::parse(base_url).ok()?;
    base.join(href).ok().map(|u| u.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const LISTING: &str = r#"
        <html><body>
          <article>
            <h3><a href="/2025/robot-arm">Robot arm ships to plants</a></h3>
            <p class="summary">A six-axis arm entered mass production this week at several plants.</p>
            <span class="date">2025-08-01</span>
          </article>
          <article>
            <h3><a href="https://other.example.com/full">Absolute link story</a></h3>
          </article>
          <article><p>no link here</p></article>
        </body></html>
    "#;

    #[test]
    fn test_parse_listing_resolves_relative_urls() {
        let items = parse_listing(LISTING, "Example Wire", "https://news.example.com");
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].url, "https://news.example.com/2025/robot-arm");
        assert_eq!(items[0].source, "Example Wire");
        assert_eq!(items[0].publish_date.as_deref(), Some("2025-08-01"));
    }

    #[test]
    fn test_parse_listing_keeps_absolute_urls() {
        let items = parse_listing(LISTING, "Example Wire", "https://news.example.com");
        assert_eq!(items[1].url, "https://other.example.com/full");
    }

    #[test]
    fn test_summary_falls_back_to_title() {
        let items = parse_listing(LISTING, "Example Wire", "https://news.example.com");
        // first entry has a real summary, second falls back to its title
        assert!(items[0].summary.starts_with("A six-axis arm"));
        assert_eq!(items[1].summary, "Absolute link story");
    }

    #[test]
    fn test_unparseable_entries_are_skipped() {
        let items = parse_listing("<div class=\"item\"><p>text only</p></div>", "S", "https://x.example");
        assert!(items.is_empty());
    }
}
