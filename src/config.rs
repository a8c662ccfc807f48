//! Typed configuration loaded from YAML files.
//!
//! Two files live in the config directory:
//! - `keywords.yaml`: keyword lists per record kind (news terms are grouped
//!   into named categories), the known-companies list, filter thresholds,
//!   and weekly delivery caps
//! - `sources.yaml`: the crawl targets per record kind
//!
//! Everything is deserialized into structs with named, typed fields and
//! validated once at load time, so the rest of the pipeline never has to
//! defend against missing keys or malformed values.

use std::collections::BTreeMap;
use std::path::Path;

use itertools::Itertools;
use serde::Deserialize;
use thiserror::Error;
use tracing::warn;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse {path}")]
    Parse {
        path: String,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("empty keyword term in `{section}`")]
    EmptyTerm { section: String },

    #[error("threshold `{name}` must be >= 1 (got {value})")]
    Threshold { name: &'static str, value: i64 },

    #[error("delivery cap `{name}` must be >= 1 (got {value})")]
    DeliveryCap { name: &'static str, value: i64 },

    #[error("source `{name}` has an empty `{field}`")]
    SourceField { name: String, field: &'static str },
}

/// Minimum distinct-keyword match counts per record kind.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    pub news_threshold: i64,
    pub patent_threshold: i64,
    pub paper_threshold: i64,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            news_threshold: 1,
            patent_threshold: 1,
            paper_threshold: 1,
        }
    }
}

/// Weekly delivery caps: how many unsent records of each kind a single
/// digest may carry.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeliverySettings {
    pub news_per_week: i64,
    pub papers_per_week: i64,
    pub patents_per_week: i64,
}

impl Default for DeliverySettings {
    fn default() -> Self {
        Self {
            news_per_week: 3,
            papers_per_week: 4,
            patents_per_week: 5,
        }
    }
}

/// Keyword configuration: terms, companies, thresholds, caps.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct KeywordsConfig {
    /// News terms grouped into named categories (e.g. `robotics`, `ai_tech`).
    #[serde(default)]
    pub news: BTreeMap<String, Vec<String>>,
    #[serde(default)]
    pub patents: Vec<String>,
    #[serde(default)]
    pub papers: Vec<String>,
    /// Known company names for the entity enricher.
    #[serde(default)]
    pub companies: Vec<String>,
    #[serde(default)]
    pub settings: FilterSettings,
    #[serde(default)]
    pub delivery: DeliverySettings,
}

impl KeywordsConfig {
    /// Load and validate the keywords file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mut config: Self =
            serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse from a YAML string and validate. Load path for tests.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let mut config: Self = serde_yaml::from_str(yaml).map_err(|source| ConfigError::Parse {
            path: "<inline>".to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// All news terms across categories, category by category, duplicates
    /// removed. This is the list the news filter scores against.
    pub fn flattened_news_keywords(&self) -> Vec<String> {
        dedupe_terms(self.news.values().flatten().cloned().collect())
    }

    fn validate(&mut self) -> Result<(), ConfigError> {
        for (category, terms) in &self.news {
            check_terms(&format!("news.{category}"), terms)?;
        }
        check_terms("patents", &self.patents)?;
        check_terms("papers", &self.papers)?;
        check_terms("companies", &self.companies)?;

        self.patents = dedupe_terms(std::mem::take(&mut self.patents));
        self.papers = dedupe_terms(std::mem::take(&mut self.papers));
        self.companies = dedupe_terms(std::mem::take(&mut self.companies));
        for terms in self.news.values_mut() {
            *terms = dedupe_terms(std::mem::take(terms));
        }

        for (name, value) in [
            ("news_threshold", self.settings.news_threshold),
            ("patent_threshold", self.settings.patent_threshold),
            ("paper_threshold", self.settings.paper_threshold),
        ] {
            if value < 1 {
                return Err(ConfigError::Threshold { name, value });
            }
        }
        for (name, value) in [
            ("news_per_week", self.delivery.news_per_week),
            ("papers_per_week", self.delivery.papers_per_week),
            ("patents_per_week", self.delivery.patents_per_week),
        ] {
            if value < 1 {
                return Err(ConfigError::DeliveryCap { name, value });
            }
        }
        Ok(())
    }
}

fn check_terms(section: &str, terms: &[String]) -> Result<(), ConfigError> {
    if terms.iter().any(|t| t.trim().is_empty()) {
        return Err(ConfigError::EmptyTerm {
            section: section.to_string(),
        });
    }
    Ok(())
}

/// Remove exact duplicates while preserving first-seen order.
fn dedupe_terms(terms: Vec<String>) -> Vec<String> {
    let before = terms.len();
    let deduped: Vec<String> = terms.into_iter().unique().collect();
    if deduped.len() < before {
        warn!(removed = before - deduped.len(), "Dropped duplicate keyword terms");
    }
    deduped
}

/// An HTML news source. `search_url` overrides `base_url` as the listing
/// page to fetch.
#[derive(Debug, Clone, Deserialize)]
pub struct NewsSource {
    pub name: String,
    pub base_url: String,
    #[serde(default)]
    pub search_url: Option<String>,
    #[serde(default)]
    pub enabled: bool,
}

/// A patent search source. `search_url` must contain a `{keyword}`
/// placeholder.
#[derive(Debug, Clone, Deserialize)]
pub struct PatentSource {
    pub name: String,
    pub base_url: String,
    pub search_url: String,
    #[serde(default)]
    pub enabled: bool,
}

/// A paper source (currently arXiv). `categories` narrows the query,
/// e.g. `cs.RO`, `cs.CV`.
#[derive(Debug, Clone, Deserialize)]
pub struct PaperSource {
    pub name: String,
    #[serde(default)]
    pub categories: Vec<String>,
    #[serde(default = "default_max_results")]
    pub max_results: usize,
    #[serde(default)]
    pub enabled: bool,
}

fn default_max_results() -> usize {
    20
}

/// Crawl target configuration.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SourcesConfig {
    #[serde(default)]
    pub news_sources: Vec<NewsSource>,
    #[serde(default)]
    pub patent_sources: Vec<PatentSource>,
    #[serde(default)]
    pub paper_sources: Vec<PaperSource>,
}

impl SourcesConfig {
    /// Load and validate the sources file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = serde_yaml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path.display().to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Parse from a YAML string and validate. Load path for tests.
    pub fn parse(yaml: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_yaml::from_str(yaml).map_err(|source| ConfigError::Parse {
            path: "<inline>".to_string(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        for source in &self.news_sources {
            if source.name.trim().is_empty() {
                return Err(ConfigError::SourceField {
                    name: source.base_url.clone(),
                    field: "name",
                });
            }
            if source.base_url.trim().is_empty() {
                return Err(ConfigError::SourceField {
                    name: source.name.clone(),
                    field: "base_url",
                });
            }
        }
        for source in &self.patent_sources {
            if source.search_url.trim().is_empty() {
                return Err(ConfigError::SourceField {
                    name: source.name.clone(),
                    field: "search_url",
                });
            }
        }
        for source in &self.paper_sources {
            if source.name.trim().is_empty() {
                return Err(ConfigError::SourceField {
                    name: "<paper source>".to_string(),
                    field: "name",
                });
            }
        }
        Ok(())
    }
}
