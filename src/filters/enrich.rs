//! Company-name extraction and record enrichment.
//!
//! Two extraction strategies run over the same text and their results are
//! unioned:
//!
//! 1. case-insensitive substring match against the configured
//!    known-companies list;
//! 2. a regex scan for 2-10 CJK characters immediately followed by a
//!    business-entity suffix (科技, 智能, 机器人, 汽车, 制造, 集团, 公司).
//!
//! Extracted names are folded into the record's set-valued keywords, so
//! re-running enrichment on an already-enriched record changes nothing.
//! Enrichment never fails: text with no matches leaves the record as-is.

use std::collections::BTreeSet;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::KeywordsConfig;
use crate::models::{NewsItem, PaperItem, PatentItem};

static COMPANY_SUFFIX_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\u{4e00}-\u{9fa5}]{2,10}(?:科技|智能|机器人|汽车|制造|集团|公司)")
        .unwrap()
});

/// Extracts company mentions and merges them into record keywords.
#[derive(Debug, Clone)]
pub struct ContentEnricher {
    companies: Vec<String>,
}

impl ContentEnricher {
    pub fn new(config: &KeywordsConfig) -> Self {
        Self {
            companies: config.companies.clone(),
        }
    }

    /// Extract company names from free text using both strategies.
    pub fn extract_companies(&self, text: &str) -> BTreeSet<String> {
        let mut found = BTreeSet::new();
        let text_lower = text.to_lowercase();

        for company in &self.companies {
            if text_lower.contains(&company.to_lowercase()) {
                found.insert(company.clone());
            }
        }
        for mat in COMPANY_SUFFIX_RE.find_iter(text) {
            found.insert(mat.as_str().to_string());
        }
        found
    }

    /// Merge companies found in title + summary into a news record's
    /// keyword set.
    pub fn enrich_news(&self, mut news: NewsItem) -> NewsItem {
        let text = format!("{} {}", news.title, news.summary);
        news.keywords.extend(self.extract_companies(&text));
        news
    }

    /// Merge companies found in the applicant field into a patent record's
    /// keyword set.
    pub fn enrich_patent(&self, mut patent: PatentItem) -> PatentItem {
        if !patent.applicant.is_empty() {
            let companies = self.extract_companies(&patent.applicant);
            patent.keywords.extend(companies);
        }
        patent
    }

    /// Paper normalizer. Currently a pass-through; reserved for future
    /// translation/summary enrichment.
    pub fn enrich_paper(&self, paper: PaperItem) -> PaperItem {
        paper
    }
}

/// Build a short summary from content, falling back to the title when the
/// content is missing or trivially short. Truncation is by characters, not
/// bytes, so CJK text is never split mid-character.
pub fn summarize(title: &str, content: &str, max_len: usize) -> String {
    if content.chars().count() > 20 {
        let mut summary: String = content.chars().take(max_len).collect();
        if content.chars().count() > max_len {
            summary.push_str("...");
        }
        summary
    } else {
        title.to_string()
    }
}
