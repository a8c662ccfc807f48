//! Webhook notifier for digest delivery.
//!
//! Batches are rendered into interactive "card" payloads and POSTed to the
//! configured chat webhook. A delivery counts as successful only when the
//! HTTP request succeeds AND the response body reports `code == 0` (or
//! `StatusCode == 0`); anything else leaves the batch unsent so the next
//! run retries it. The webhook reports success or failure for the whole
//! batch, never per item.
//!
//! Card builders are pure functions over record slices, so they are
//! testable without any network.

use chrono::Utc;
use serde_json::{Value, json};
use thiserror::Error;
use tracing::{error, info, instrument, warn};

use crate::models::{NewsItem, PaperItem, PatentItem};

const SUMMARY_CLIP: usize = 180;
const ABSTRACT_CLIP: usize = 200;
const AUTHORS_CLIP: usize = 100;
const MAX_CARD_KEYWORDS: usize = 6;

/// Keyword suffixes that mark a keyword as a company name when splitting
/// card hashtags into technical terms vs companies.
const COMPANY_HINTS: &[&str] = &["公司", "科技", "汽车", "集团", "机器人", "智能"];

/// Errors raised by webhook delivery.
#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("webhook URL is not configured")]
    NotConfigured,

    #[error("webhook request failed")]
    Request(#[from] reqwest::Error),

    #[error("webhook rejected the message: {detail}")]
    Rejected { detail: String },
}

/// Chat webhook client.
#[derive(Debug, Clone)]
pub struct WebhookNotifier {
    webhook_url: Option<String>,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(webhook_url: Option<String>) -> Self {
        if webhook_url.is_none() {
            warn!("Webhook URL not configured; deliveries will fail");
        }
        Self {
            webhook_url,
            client: reqwest::Client::new(),
        }
    }

    /// Deliver a news digest card.
    #[instrument(level = "info", skip_all, fields(count = news.len()))]
    pub async fn send_news_batch(&self, news: &[NewsItem]) -> Result<(), NotifyError> {
        if news.is_empty() {
            warn!("No news to send");
            return Ok(());
        }
        self.post(json!({
            "msg_type": "interactive",
            "card": news_card(news),
        }))
        .await
    }

    /// Deliver papers and patents in a single card.
    #[instrument(level = "info", skip_all, fields(papers = papers.len(), patents = patents.len()))]
    pub async fn send_papers_and_patents(
        &self,
        papers: &[PaperItem],
        patents: &[PatentItem],
    ) -> Result<(), NotifyError> {
        if papers.is_empty() && patents.is_empty() {
            warn!("No papers or patents to send");
            return Ok(());
        }
        self.post(json!({
            "msg_type": "interactive",
            "card": papers_patents_card(papers, patents),
        }))
        .await
    }

    /// Deliver a plain text message.
    pub async fn send_text(&self, text: &str) -> Result<(), NotifyError> {
        self.post(json!({
            "msg_type": "text",
            "content": { "text": text },
        }))
        .await
    }

    /// Best-effort run-failure notification. Never raises.
    pub async fn send_error(&self, error_message: &str, context: &str) {
        let text = format!(
            "⚠️ 采集系统错误通知\n\n错误信息: {error_message}\n上下文: {context}\n时间: {}",
            Utc::now().format("%Y-%m-%d %H:%M:%S"),
        );
        if let Err(e) = self.send_text(&text).await {
            error!(error = %e, "Failed to deliver error notification");
        }
    }

    async fn post(&self, message: Value) -> Result<(), NotifyError> {
        let Some(url) = self.webhook_url.as_deref() else {
            error!("Webhook URL not configured");
            return Err(NotifyError::NotConfigured);
        };

        let response = self
            .client
            .post(url)
            .json(&message)
            .send()
            .await?
            .error_for_status()?;
        let body: Value = response.json().await?;

        let accepted = body.get("code").and_then(Value::as_i64) == Some(0)
            || body.get("StatusCode").and_then(Value::as_i64) == Some(0);
        if accepted {
            info!("Webhook message delivered");
            Ok(())
        } else {
            Err(NotifyError::Rejected {
                detail: body.to_string(),
            })
        }
    }
}

/// Split keywords into technical terms and company names. A keyword is
/// treated as a company when it carries a business-entity suffix, or looks
/// like a single capitalized proper noun.
fn split_keywords(keywords: impl IntoIterator<Item = String>) -> (Vec<String>, Vec<String>) {
    let mut tech = Vec::new();
    let mut companies = Vec::new();
    for keyword in keywords {
        let capitalized_name = keyword.chars().count() > 1
            && keyword.chars().next().is_some_and(char::is_uppercase)
            && !keyword.contains(' ');
        let is_company =
            COMPANY_HINTS.iter().any(|hint| keyword.contains(hint)) || capitalized_name;
        if is_company {
            companies.push(keyword);
        } else {
            tech.push(keyword);
        }
    }
    (tech, companies)
}

fn clip(text: &str, max_chars: usize) -> String {
    if text.chars().count() > max_chars {
        let mut clipped: String = text.chars().take(max_chars).collect();
        clipped.push_str("...");
        clipped
    } else {
        text.to_string()
    }
}

/// Build the news digest card.
fn news_card(news: &[NewsItem]) -> Value {
    let mut elements = Vec::new();

    for (i, item) in news.iter().enumerate() {
        let (tech, companies) = split_keywords(item.keywords.iter().cloned());

        let mut content = format!("**📄 {}**\n\n", item.title);
        content.push_str(&format!("**来源**: {}", item.source));
        if let Some(date) = &item.publish_date {
            content.push_str(&format!(" | **发布**: {date}"));
        }
        content.push_str("\n\n");

        if !tech.is_empty() {
            let tags: Vec<String> = tech.iter().map(|k| format!("#{k}")).collect();
            content.push_str(&format!("**技术关键词**: {}\n", tags.join(" ")));
        }
        if !companies.is_empty() {
            let tags: Vec<String> = companies.iter().map(|c| format!("🏢{c}")).collect();
            content.push_str(&format!("**相关企业**: {}\n", tags.join(" ")));
        }
        if !item.summary.is_empty() {
            content.push_str(&format!("\n**内容简介**:\n{}\n", clip(&item.summary, SUMMARY_CLIP)));
        }
        content.push_str(&format!("\n[🔗 查看详情]({})", item.url));

        elements.push(json!({ "tag": "markdown", "content": content }));
        if i + 1 < news.len() {
            elements.push(json!({ "tag": "hr" }));
        }
    }

    json!({
        "header": {
            "title": {
                "tag": "plain_text",
                "content": format!("📰 制造业新闻资讯 ({}条)", news.len()),
            },
            "template": "blue",
        },
        "elements": elements,
    })
}

/// Build the combined papers + patents card.
fn papers_patents_card(papers: &[PaperItem], patents: &[PatentItem]) -> Value {
    let mut elements = Vec::new();

    if !papers.is_empty() {
        elements.push(json!({
            "tag": "markdown",
            "content": format!("### 📚 学术论文 ({}篇)", papers.len()),
        }));
        for (i, paper) in papers.iter().enumerate() {
            let mut content = format!("**{}**\n\n", paper.title);
            content.push_str(&format!("**作者**: {}\n", clip(&paper.authors, AUTHORS_CLIP)));
            if !paper.pdf_url.is_empty() {
                content.push_str(&format!("**链接**: [📄 PDF]({})\n", paper.pdf_url));
            }
            if !paper.keywords.is_empty() {
                let tags: Vec<String> = paper
                    .keywords
                    .iter()
                    .take(MAX_CARD_KEYWORDS)
                    .map(|k| format!("#{k}"))
                    .collect();
                content.push_str(&format!("**关键词**: {}\n", tags.join(" ")));
            }
            if !paper.abstract_text.is_empty() {
                content.push_str(&format!("\n**摘要**:\n{}", clip(&paper.abstract_text, ABSTRACT_CLIP)));
            }
            elements.push(json!({ "tag": "markdown", "content": content }));
            if i + 1 < papers.len() {
                elements.push(json!({ "tag": "hr" }));
            }
        }
    }

    if !papers.is_empty() && !patents.is_empty() {
        elements.push(json!({
            "tag": "div",
            "text": { "tag": "plain_text", "content": "\n" },
        }));
    }

    if !patents.is_empty() {
        elements.push(json!({
            "tag": "markdown",
            "content": format!("### 🔬 专利信息 ({}项)", patents.len()),
        }));
        for (i, patent) in patents.iter().enumerate() {
            let mut content = format!("**{}**\n\n", patent.title);
            if !patent.applicant.is_empty() {
                content.push_str(&format!("**权利人**: {}\n", patent.applicant));
            }
            content.push_str(&format!("**申请号**: {}\n", patent.application_no));
            if !patent.keywords.is_empty() {
                let tags: Vec<String> = patent
                    .keywords
                    .iter()
                    .take(MAX_CARD_KEYWORDS)
                    .map(|k| format!("#{k}"))
                    .collect();
                content.push_str(&format!("**关键词**: {}\n", tags.join(" ")));
            }
            if !patent.abstract_text.is_empty() {
                content.push_str(&format!("\n**摘要**:\n{}", clip(&patent.abstract_text, ABSTRACT_CLIP)));
            }
            elements.push(json!({ "tag": "markdown", "content": content }));
            if i + 1 < patents.len() {
                elements.push(json!({ "tag": "hr" }));
            }
        }
    }

    json!({
        "header": {
            "title": { "tag": "plain_text", "content": "📑 每周文献与专利汇总" },
            "template": "green",
        },
        "elements": elements,
    })
}
