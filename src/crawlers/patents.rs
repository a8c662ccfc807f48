//! Patent crawler for keyword-search result pages.
//!
//! Each enabled source is queried once per keyword (bounded). Result blocks
//! are parsed for title, abstract, applicant, and dates; the application
//! number is recognized by regex, with a deterministic synthetic fallback
//! when a result exposes none.

use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use tracing::{info, instrument};

use crate::config::PatentSource;
use crate::crawlers::{fetch_text, http_client};
use crate::models::PatentItem;

const MAX_SEARCH_KEYWORDS: usize = 3;
const MAX_RESULTS_PER_KEYWORD: usize = 10;

// CN application numbers, labeled numbers (申请号/公开号/公告号), or a bare
// long digit run, tried in that order.
static CN_NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"CN\d{12,}[A-Z]?").unwrap());
static LABELED_NUMBER_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[申请公开公告]号[：:]\s*([A-Z]{2}\d+[A-Z]?)").unwrap());
static BARE_NUMBER_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\b\d{15,}\b").unwrap());

static APPLICANT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"申请人[：:]\s*([^，,;；\n]+)").unwrap());
static DATE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\d{4}[-年]\d{1,2}[-月]\d{1,2}").unwrap());

/// Crawl all enabled patent sources.
#[instrument(level = "info", skip_all, fields(sources = sources.len()))]
pub async fn crawl(sources: &[PatentSource], keywords: &[String]) -> Vec<PatentItem> {
    let client = http_client();
    let mut all_patents = Vec::new();

    for source in sources {
        if !source.enabled {
            info!(name = %source.name, "Skipping disabled patent source");
            continue;
        }
        info!(name = %source.name, "Crawling patent source");

        let mut count = 0usize;
        for keyword in keywords.iter().take(MAX_SEARCH_KEYWORDS) {
            let url = source
                .search_url
                .replace("{keyword}", &urlencoding::encode(keyword));
            let Some(html) = fetch_text(&client, &url).await else {
                continue;
            };
            let patents = parse_results(&html);
            count += patents.len();
            all_patents.extend(patents);
        }
        info!(count, name = %source.name, "Crawled patents from source");
    }

    all_patents
}

/// Parse a search result page into patent records.
fn parse_results(html: &str) -> Vec<PatentItem> {
    let document = Html::parse_document(html);
    let result_selector = Selector::parse(".result, .c-result").unwrap();

    document
        .select(&result_selector)
        .take(MAX_RESULTS_PER_KEYWORD)
        .filter_map(parse_result)
        .collect()
}

fn parse_result(result: ElementRef) -> Option<PatentItem> {
    let title_selector = Selector::parse("h3, .t, .title, a").unwrap();
    let abstract_selector = Selector::parse(".c-abstract, .abstract").unwrap();
    let meta_selector = Selector::parse(".meta, .c-row").unwrap();

    let title = result.select(&title_selector).next().map(collect_text)?;
    if title.is_empty() {
        return None;
    }

    let abstract_text = result
        .select(&abstract_selector)
        .next()
        .map(collect_text)
        .unwrap_or_default();

    let full_text = collect_text(result);
    let application_no = extract_application_no(&full_text)
        .unwrap_or_else(|| PatentItem::fallback_application_no(&title));

    let mut patent = PatentItem::new(title, application_no);
    patent.abstract_text = abstract_text;

    if let Some(meta_text) = result.select(&meta_selector).next().map(collect_text) {
        if let Some(captures) = APPLICANT_RE.captures(&meta_text) {
            patent.applicant = captures[1].trim().to_string();
        }
        if let Some(mat) = DATE_RE.find(&meta_text) {
            patent.application_date = Some(mat.as_str().to_string());
        }
    }

    Some(patent)
}

/// Pull an application number out of a result's text, if one is present.
fn extract_application_no(text: &str) -> Option<String> {
    if let Some(mat) = CN_NUMBER_RE.find(text) {
        return Some(mat.as_str().to_string());
    }
    if let Some(captures) = LABELED_NUMBER_RE.captures(text) {
        return Some(captures[1].to_string());
    }
    BARE_NUMBER_RE.find(text).map(|m| m.as_str().to_string())
}

fn collect_text(element: ElementRef) -> String {
    element.text().collect::<Vec<_>>().join(" ").trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_cn_application_number() {
        let text = "一种焊接机器人 CN202310123456A 申请人：某公司";
        assert_eq!(
            extract_application_no(text).as_deref(),
            Some("CN202310123456A")
        );
    }

    #[test]
    fn test_extract_labeled_number() {
        let text = "申请号：US2023123456A";
        assert_eq!(extract_application_no(text).as_deref(), Some("US2023123456A"));
    }

    #[test]
    fn test_extract_bare_long_number() {
        assert_eq!(
            extract_application_no("ref 202310123456789 end").as_deref(),
            Some("202310123456789")
        );
        assert_eq!(extract_application_no("no number here"), None);
    }

    #[test]
    fn test_parse_result_with_number_and_meta() {
        let html = r#"
            <div class="result">
              <h3 class="t">一种上料机构</h3>
              <p class="c-abstract">本发明公开了一种上料机构 CN202310123456A</p>
              <div class="meta">申请人：深圳某科技，申请日 2023-04-01</div>
            </div>
        "#;
        let patents = parse_results(html);
        assert_eq!(patents.len(), 1);
        assert_eq!(patents[0].application_no, "CN202310123456A");
        assert_eq!(patents[0].applicant, "深圳某科技");
        assert_eq!(patents[0].application_date.as_deref(), Some("2023-04-01"));
        assert!(patents[0].abstract_text.contains("上料机构"));
    }

    #[test]
    fn test_parse_result_without_number_gets_fallback() {
        let html = r#"<div class="result"><h3>一种未编号的专利</h3></div>"#;
        let patents = parse_results(html);
        assert_eq!(patents.len(), 1);
        assert_eq!(
            patents[0].application_no,
            PatentItem::fallback_application_no("一种未编号的专利")
        );
    }

    #[test]
    fn test_identical_titles_share_fallback_identity() {
        let html = r#"
            <div class="result"><h3>重复标题</h3></div>
            <div class="c-result"><h3>重复标题</h3></div>
        "#;
        let patents = parse_results(html);
        assert_eq!(patents.len(), 2);
        assert_eq!(patents[0].application_no, patents[1].application_no);
    }
}
