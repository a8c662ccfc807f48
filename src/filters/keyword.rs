//! Keyword scoring and relevance filtering.
//!
//! Matching is case-insensitive substring containment over the record's
//! title plus summary/abstract. It is deliberately not token-boundary
//! aware: a short term can match inside a longer unrelated word. That
//! heuristic is part of the scoring contract (scores must stay comparable
//! with history), so it is preserved here rather than "fixed".

use std::collections::BTreeSet;

use tracing::{debug, info};

use crate::config::KeywordsConfig;
use crate::models::{NewsItem, PaperItem, PatentItem};

/// Scores records against the configured keyword lists and retains the
/// ones above the per-kind threshold.
///
/// Filtering is destructive by contract: a retained record's `keywords`
/// field is overwritten with exactly the matched subset, and news records
/// get their `score` set to the distinct-match count.
#[derive(Debug, Clone)]
pub struct KeywordFilter {
    news_keywords: Vec<String>,
    news_categories: std::collections::BTreeMap<String, Vec<String>>,
    patent_keywords: Vec<String>,
    paper_keywords: Vec<String>,
    news_threshold: i64,
    patent_threshold: i64,
    paper_threshold: i64,
}

impl KeywordFilter {
    pub fn new(config: &KeywordsConfig) -> Self {
        Self {
            news_keywords: config.flattened_news_keywords(),
            news_categories: config.news.clone(),
            patent_keywords: config.patents.clone(),
            paper_keywords: config.papers.clone(),
            news_threshold: config.settings.news_threshold,
            patent_threshold: config.settings.patent_threshold,
            paper_threshold: config.settings.paper_threshold,
        }
    }

    /// Count which of `keywords` occur (case-insensitively) in `content`.
    ///
    /// Returns the distinct-match count and the matched terms in their
    /// original casing.
    pub fn match_keywords(content: &str, keywords: &[String]) -> (i64, Vec<String>) {
        let content = content.to_lowercase();
        let mut matched = Vec::new();
        for keyword in keywords {
            if content.contains(&keyword.to_lowercase()) {
                matched.push(keyword.clone());
            }
        }
        (matched.len() as i64, matched)
    }

    /// Filter news by the flattened news keyword list.
    pub fn filter_news(&self, items: Vec<NewsItem>) -> Vec<NewsItem> {
        let total = items.len();
        let retained: Vec<NewsItem> = items
            .into_iter()
            .filter_map(|mut news| {
                let corpus = format!("{} {}", news.title, news.summary);
                let (score, matched) = Self::match_keywords(&corpus, &self.news_keywords);
                if score >= self.news_threshold {
                    debug!(title = %news.title, score, "News matched");
                    news.score = score;
                    news.keywords = matched.into_iter().collect::<BTreeSet<_>>();
                    Some(news)
                } else {
                    None
                }
            })
            .collect();
        info!(retained = retained.len(), total, "Filtered news");
        retained
    }

    /// Filter news against a single category's terms (threshold 1).
    pub fn filter_news_by_category(&self, items: Vec<NewsItem>, category: &str) -> Vec<NewsItem> {
        let Some(terms) = self.news_categories.get(category) else {
            tracing::warn!(category, "Unknown news keyword category");
            return Vec::new();
        };
        let retained: Vec<NewsItem> = items
            .into_iter()
            .filter_map(|mut news| {
                let corpus = format!("{} {}", news.title, news.summary);
                let (score, matched) = Self::match_keywords(&corpus, terms);
                if score > 0 {
                    news.score = score;
                    news.keywords = matched.into_iter().collect::<BTreeSet<_>>();
                    Some(news)
                } else {
                    None
                }
            })
            .collect();
        info!(retained = retained.len(), category, "Filtered news by category");
        retained
    }

    /// Filter patents by the patent keyword list.
    pub fn filter_patents(&self, items: Vec<PatentItem>) -> Vec<PatentItem> {
        let total = items.len();
        let retained: Vec<PatentItem> = items
            .into_iter()
            .filter_map(|mut patent| {
                let corpus = format!("{} {}", patent.title, patent.abstract_text);
                let (score, matched) = Self::match_keywords(&corpus, &self.patent_keywords);
                if score >= self.patent_threshold {
                    debug!(title = %patent.title, score, "Patent matched");
                    patent.keywords = matched.into_iter().collect::<BTreeSet<_>>();
                    Some(patent)
                } else {
                    None
                }
            })
            .collect();
        info!(retained = retained.len(), total, "Filtered patents");
        retained
    }

    /// Filter papers by the paper keyword list.
    pub fn filter_papers(&self, items: Vec<PaperItem>) -> Vec<PaperItem> {
        let total = items.len();
        let retained: Vec<PaperItem> = items
            .into_iter()
            .filter_map(|mut paper| {
                let corpus = format!("{} {}", paper.title, paper.abstract_text);
                let (score, matched) = Self::match_keywords(&corpus, &self.paper_keywords);
                if score >= self.paper_threshold {
                    debug!(title = %paper.title, score, "Paper matched");
                    paper.keywords = matched.into_iter().collect::<BTreeSet<_>>();
                    Some(paper)
                } else {
                    None
                }
            })
            .collect();
        info!(retained = retained.len(), total, "Filtered papers");
        retained
    }
}

/// Order news by `(score desc, created_at desc)` and keep the top `n`.
/// Ties on score break toward the newest record.
pub fn top_scored(mut items: Vec<NewsItem>, n: usize) -> Vec<NewsItem> {
    items.sort_by(|a, b| (b.score, b.created_at).cmp(&(a.score, a.created_at)));
    items.truncate(n);
    items
}

/// Count keyword occurrences across a batch, most frequent first.
/// Ties break alphabetically so the output is deterministic.
pub fn keyword_statistics<'a, I>(keyword_sets: I) -> Vec<(String, usize)>
where
    I: IntoIterator<Item = &'a BTreeSet<String>>,
{
    let mut counts: std::collections::BTreeMap<&str, usize> = std::collections::BTreeMap::new();
    for set in keyword_sets {
        for keyword in set {
            *counts.entry(keyword.as_str()).or_insert(0) += 1;
        }
    }
    let mut stats: Vec<(String, usize)> =
        counts.into_iter().map(|(k, c)| (k.to_string(), c)).collect();
    stats.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    stats
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn filter_with(news: &[&str], threshold: i64) -> KeywordFilter {
        let mut config = KeywordsConfig::default();
        config
            .news
            .insert("test".to_string(), news.iter().map(|s| s.to_string()).collect());
        config.patents = news.iter().map(|s| s.to_string()).collect();
        config.papers = news.iter().map(|s| s.to_string()).collect();
        config.settings.news_threshold = threshold;
        config.settings.patent_threshold = threshold;
        config.settings.paper_threshold = threshold;
        KeywordFilter::new(&config)
    }

    fn news(title: &str, url: &str) -> NewsItem {
        NewsItem::new(title, url, "Test Wire")
    }

    #[test]
    fn test_match_is_case_insensitive_substring() {
        let keywords = vec!["Robot".to_string(), "CNC".to_string()];
        let (score, matched) = KeywordFilter::match_keywords("new ROBOTICS lab", &keywords);
        // substring containment: "robot" matches inside "robotics"
        assert_eq!(score, 1);
        assert_eq!(matched, vec!["Robot"]);
    }

    #[test]
    fn test_retention_iff_distinct_matches_reach_threshold() {
        let filter = filter_with(&["robot", "welding"], 2);
        let both = news("Welding robot ships", "u1");
        let one = news("Welding torch recall", "u2");
        let retained = filter.filter_news(vec![both, one]);
        assert_eq!(retained.len(), 1);
        assert_eq!(retained[0].url, "u1");
        assert_eq!(retained[0].score, 2);
    }

    #[test]
    fn test_keywords_overwritten_with_matched_subset() {
        let filter = filter_with(&["robot"], 1);
        let mut item = news("New Robot Unveiled", "u1");
        // pre-existing keyword metadata is discarded by filtering
        item.keywords.insert("stale".to_string());
        let retained = filter.filter_news(vec![item]);
        let expected: BTreeSet<String> = ["robot".to_string()].into_iter().collect();
        assert_eq!(retained[0].keywords, expected);
    }

    #[test]
    fn test_end_to_end_scenario_from_contract() {
        let filter = filter_with(&["robot"], 1);
        let a = {
            let mut n = news("New Robot Unveiled", "u1");
            n.summary = String::new();
            n
        };
        let b = news("Weather report", "u2");
        let retained = filter.filter_news(vec![a, b]);
        assert_eq!(retained.len(), 1);
        assert_eq!(retained[0].url, "u1");
        assert_eq!(retained[0].score, 1);
        assert_eq!(
            retained[0].keywords.iter().collect::<Vec<_>>(),
            vec!["robot"]
        );
    }

    #[test]
    fn test_filter_patents_matches_abstract() {
        let filter = filter_with(&["servo"], 1);
        let mut patent = PatentItem::new("Control apparatus", "CN202310000001A");
        patent.abstract_text = "A servo drive for industrial use".to_string();
        let retained = filter.filter_patents(vec![patent]);
        assert_eq!(retained.len(), 1);
        assert!(retained[0].keywords.contains("servo"));
    }

    #[test]
    fn test_filter_papers_drops_unmatched() {
        let filter = filter_with(&["grasping"], 1);
        let paper = PaperItem::new("A survey of sorting networks", "1234.5678");
        assert!(filter.filter_papers(vec![paper]).is_empty());
    }

    #[test]
    fn test_filter_by_category_uses_only_that_category() {
        let mut config = KeywordsConfig::default();
        config
            .news
            .insert("robotics".to_string(), vec!["robot".to_string()]);
        config
            .news
            .insert("ai_tech".to_string(), vec!["neural".to_string()]);
        let filter = KeywordFilter::new(&config);

        let items = vec![news("Neural nets advance", "u1"), news("Robot arm demo", "u2")];
        let retained = filter.filter_news_by_category(items, "robotics");
        assert_eq!(retained.len(), 1);
        assert_eq!(retained[0].url, "u2");
    }

    #[test]
    fn test_filter_by_unknown_category_is_empty() {
        let filter = filter_with(&["robot"], 1);
        assert!(filter
            .filter_news_by_category(vec![news("Robot", "u1")], "nope")
            .is_empty());
    }

    #[test]
    fn test_top_scored_orders_by_score_then_recency() {
        let at = |secs: i64| Utc.timestamp_opt(secs, 0).unwrap();
        let mut a = news("A", "ua");
        a.score = 2;
        a.created_at = at(5);
        let mut b = news("B", "ub");
        b.score = 3;
        b.created_at = at(1);
        let mut c = news("C", "uc");
        c.score = 3;
        c.created_at = at(9);

        let top = top_scored(vec![a, b, c], 2);
        assert_eq!(top.len(), 2);
        assert_eq!(top[0].url, "uc");
        assert_eq!(top[1].url, "ub");
    }

    #[test]
    fn test_keyword_statistics_sorted_by_count() {
        let mut a = news("A", "ua");
        a.keywords = ["robot".to_string(), "agv".to_string()].into_iter().collect();
        let mut b = news("B", "ub");
        b.keywords = ["robot".to_string()].into_iter().collect();

        let stats = keyword_statistics([&a.keywords, &b.keywords]);
        assert_eq!(
            stats,
            vec![("robot".to_string(), 2), ("agv".to_string(), 1)]
        );
    }
}
