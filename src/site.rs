//! Static site generation from persisted records.
//!
//! Reads the most recent records of each kind from the store and writes a
//! small browsable site: an index with counts, top keywords, and the latest
//! items, one listing page per record kind, and a `README.md` summary
//! index. Pages are plain formatted strings; there is no template engine.

use std::error::Error;
use std::path::{Path, PathBuf};

use chrono::Utc;
use tokio::fs;
use tracing::{info, instrument};

use crate::filters::keyword::keyword_statistics;
use crate::models::{NewsItem, PaperItem, PatentItem};
use crate::store::Database;
use crate::utils::{ensure_writable_dir, slugify_title};

const SITE_TITLE: &str = "制造业信息资讯";
const SITE_DESCRIPTION: &str = "智能制造、机器人、AI技术相关新闻、专利、论文汇总";
const PAGE_RECORD_LIMIT: i64 = 200;
const LATEST_PER_KIND: usize = 5;
const TOP_KEYWORDS: usize = 12;

/// Generates the static site into an output directory.
pub struct SiteGenerator<'a> {
    db: &'a Database,
    output_dir: PathBuf,
}

impl<'a> SiteGenerator<'a> {
    pub fn new(db: &'a Database, output_dir: &Path) -> Self {
        Self {
            db,
            output_dir: output_dir.to_path_buf(),
        }
    }

    /// Generate every page plus the README index.
    #[instrument(level = "info", skip_all, fields(output_dir = %self.output_dir.display()))]
    pub async fn generate_all(&self) -> Result<(), Box<dyn Error>> {
        ensure_writable_dir(&self.output_dir).await?;

        let news = self.db.all_news(PAGE_RECORD_LIMIT).await?;
        let patents = self.db.all_patents(PAGE_RECORD_LIMIT).await?;
        let papers = self.db.all_papers(PAGE_RECORD_LIMIT).await?;
        let generated_at = Utc::now().format("%Y-%m-%d %H:%M:%S UTC").to_string();

        let pages = [
            ("index.html", render_index(&news, &patents, &papers, &generated_at)),
            ("news.html", render_news_page(&news, &generated_at)),
            ("patents.html", render_patents_page(&patents, &generated_at)),
            ("papers.html", render_papers_page(&papers, &generated_at)),
            ("README.md", render_readme(&news, &patents, &papers, &generated_at)),
        ];
        for (name, html) in pages {
            let path = self.output_dir.join(name);
            fs::write(&path, html).await?;
            info!(path = %path.display(), "Generated");
        }

        info!(
            news = news.len(),
            patents = patents.len(),
            papers = papers.len(),
            "Site generated"
        );
        Ok(())
    }
}

fn escape(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn page_shell(active: &str, body: &str, generated_at: &str) -> String {
    let nav = [
        ("index.html", "首页"),
        ("news.html", "新闻"),
        ("patents.html", "专利"),
        ("papers.html", "论文"),
    ]
    .iter()
    .map(|(href, label)| {
        let class = if *href == format!("{active}.html") {
            " class=\"active\""
        } else {
            ""
        };
        format!("<a href=\"{href}\"{class}>{label}</a>")
    })
    .collect::<Vec<_>>()
    .join("\n      ");

    format!(
        r#"<!DOCTYPE html>
<html lang="zh-CN">
<head>
  <meta charset="utf-8">
  <meta name="viewport" content="width=device-width, initial-scale=1">
  <title>{SITE_TITLE}</title>
  <style>
    body {{ font-family: system-ui, sans-serif; max-width: 960px; margin: 0 auto; padding: 1rem; color: #222; }}
    nav a {{ margin-right: 1rem; text-decoration: none; color: #06c; }}
    nav a.active {{ font-weight: bold; color: #036; }}
    .item {{ border-bottom: 1px solid #eee; padding: 0.8rem 0; }}
    .meta {{ color: #888; font-size: 0.85rem; }}
    .keyword {{ background: #eef; border-radius: 3px; padding: 0 0.3rem; margin-right: 0.3rem; font-size: 0.85rem; }}
    footer {{ color: #888; font-size: 0.8rem; margin-top: 2rem; }}
  </style>
</head>
<body>
  <header>
    <h1>{SITE_TITLE}</h1>
    <p>{SITE_DESCRIPTION}</p>
    <nav>
      {nav}
    </nav>
  </header>
  <main>
{body}
  </main>
  <footer>最后更新: {generated_at}</footer>
</body>
</html>
"#
    )
}

fn keyword_tags(item_keywords: &std::collections::BTreeSet<String>) -> String {
    item_keywords
        .iter()
        .map(|k| format!("<span class=\"keyword\">{}</span>", escape(k)))
        .collect::<Vec<_>>()
        .join("")
}

fn render_index(
    news: &[NewsItem],
    patents: &[PatentItem],
    papers: &[PaperItem],
    generated_at: &str,
) -> String {
    let keyword_sets = news
        .iter()
        .map(|n| &n.keywords)
        .chain(patents.iter().map(|p| &p.keywords))
        .chain(papers.iter().map(|p| &p.keywords));
    let top_keywords = keyword_statistics(keyword_sets)
        .into_iter()
        .take(TOP_KEYWORDS)
        .map(|(keyword, count)| {
            format!("<span class=\"keyword\">{} ({count})</span>", escape(&keyword))
        })
        .collect::<Vec<_>>()
        .join(" ");

    let mut body = format!(
        "    <h2>概览</h2>\n    <p>新闻 {} 条 · 专利 {} 项 · 论文 {} 篇</p>\n    <p>{top_keywords}</p>\n",
        news.len(),
        patents.len(),
        papers.len(),
    );

    body.push_str("    <h2>最新新闻</h2>\n");
    for item in news.iter().take(LATEST_PER_KIND) {
        body.push_str(&format!(
            "    <div class=\"item\"><a href=\"{}\">{}</a> <span class=\"meta\">{}</span></div>\n",
            escape(&item.url),
            escape(&item.title),
            escape(&item.source),
        ));
    }
    body.push_str("    <h2>最新专利</h2>\n");
    for item in patents.iter().take(LATEST_PER_KIND) {
        body.push_str(&format!(
            "    <div class=\"item\">{} <span class=\"meta\">{}</span></div>\n",
            escape(&item.title),
            escape(&item.application_no),
        ));
    }
    body.push_str("    <h2>最新论文</h2>\n");
    for item in papers.iter().take(LATEST_PER_KIND) {
        body.push_str(&format!(
            "    <div class=\"item\"><a href=\"{}\">{}</a></div>\n",
            escape(&item.pdf_url),
            escape(&item.title),
        ));
    }

    page_shell("index", &body, generated_at)
}

fn render_news_page(news: &[NewsItem], generated_at: &str) -> String {
    let mut body = format!("    <h2>新闻 ({})</h2>\n", news.len());
    for item in news {
        body.push_str(&format!(
            "    <div class=\"item\" id=\"{}\">\n      <h3><a href=\"{}\">{}</a></h3>\n      <p class=\"meta\">{}{}</p>\n      <p>{}</p>\n      <p>{}</p>\n    </div>\n",
            slugify_title(&item.title),
            escape(&item.url),
            escape(&item.title),
            escape(&item.source),
            item.publish_date
                .as_deref()
                .map(|d| format!(" · {}", escape(d)))
                .unwrap_or_default(),
            escape(&item.summary),
            keyword_tags(&item.keywords),
        ));
    }
    page_shell("news", &body, generated_at)
}

fn render_patents_page(patents: &[PatentItem], generated_at: &str) -> String {
    let mut body = format!("    <h2>专利 ({})</h2>\n", patents.len());
    for item in patents {
        body.push_str(&format!(
            "    <div class=\"item\" id=\"{}\">\n      <h3>{}</h3>\n      <p class=\"meta\">申请号 {}{}{}</p>\n      <p>{}</p>\n      <p>{}</p>\n    </div>\n",
            slugify_title(&item.title),
            escape(&item.title),
            escape(&item.application_no),
            if item.applicant.is_empty() {
                String::new()
            } else {
                format!(" · 申请人 {}", escape(&item.applicant))
            },
            item.application_date
                .as_deref()
                .map(|d| format!(" · {}", escape(d)))
                .unwrap_or_default(),
            escape(&item.abstract_text),
            keyword_tags(&item.keywords),
        ));
    }
    page_shell("patents", &body, generated_at)
}

fn render_papers_page(papers: &[PaperItem], generated_at: &str) -> String {
    let mut body = format!("    <h2>论文 ({})</h2>\n", papers.len());
    for item in papers {
        body.push_str(&format!(
            "    <div class=\"item\" id=\"{}\">\n      <h3><a href=\"{}\">{}</a></h3>\n      <p class=\"meta\">{}{}</p>\n      <p>{}</p>\n      <p>{}</p>\n    </div>\n",
            slugify_title(&item.title),
            escape(&item.pdf_url),
            escape(&item.title),
            escape(&item.authors),
            item.publish_date
                .as_deref()
                .map(|d| format!(" · {}", escape(d)))
                .unwrap_or_default(),
            escape(&item.abstract_text),
            keyword_tags(&item.keywords),
        ));
    }
    page_shell("papers", &body, generated_at)
}

/// Markdown summary index alongside the HTML pages.
fn render_readme(
    news: &[NewsItem],
    patents: &[PatentItem],
    papers: &[PaperItem],
    generated_at: &str,
) -> String {
    let mut md = format!(
        "# {SITE_TITLE}\n\n{SITE_DESCRIPTION}\n\n最后更新: {generated_at}\n\n| 类别 | 数量 | 页面 |\n| --- | --- | --- |\n| 新闻 | {} | [news.html](./news.html) |\n| 专利 | {} | [patents.html](./patents.html) |\n| 论文 | {} | [papers.html](./papers.html) |\n",
        news.len(),
        patents.len(),
        papers.len(),
    );

    md.push_str("\n## 最新新闻\n\n");
    for item in news.iter().take(LATEST_PER_KIND) {
        md.push_str(&format!(
            "- [{}](./news.html#{})\n",
            item.title,
            slugify_title(&item.title)
        ));
    }
    md.push_str("\n## 最新专利\n\n");
    for item in patents.iter().take(LATEST_PER_KIND) {
        md.push_str(&format!(
            "- [{}](./patents.html#{})\n",
            item.title,
            slugify_title(&item.title)
        ));
    }
    md.push_str("\n## 最新论文\n\n");
    for item in papers.iter().take(LATEST_PER_KIND) {
        md.push_str(&format!(
            "- [{}](./papers.html#{})\n",
            item.title,
            slugify_title(&item.title)
        ));
    }
    md
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_news() -> NewsItem {
        let mut news = NewsItem::new("Robot <arm> ships", "https://example.com/a?x=1&y=2", "Wire");
        news.summary = "summary".to_string();
        news.keywords = ["robot".to_string()].into_iter().collect();
        news
    }

    #[test]
    fn test_index_shows_counts_and_keywords() {
        let news = vec![sample_news()];
        let html = render_index(&news, &[], &[], "2025-08-06 10:00:00 UTC");
        assert!(html.contains("新闻 1 条"));
        assert!(html.contains("robot (1)"));
        assert!(html.contains("2025-08-06 10:00:00 UTC"));
    }

    #[test]
    fn test_news_page_escapes_html() {
        let html = render_news_page(&[sample_news()], "now");
        assert!(html.contains("Robot &lt;arm&gt; ships"));
        assert!(html.contains("https://example.com/a?x=1&amp;y=2"));
        assert!(!html.contains("<arm>"));
    }

    #[test]
    fn test_patents_page_lists_application_no() {
        let mut patent = PatentItem::new("一种上料机构", "CN202310000001A");
        patent.applicant = "某科技".to_string();
        let html = render_patents_page(&[patent], "now");
        assert!(html.contains("申请号 CN202310000001A"));
        assert!(html.contains("申请人 某科技"));
    }

    #[test]
    fn test_readme_links_to_anchors() {
        let md = render_readme(&[sample_news()], &[], &[], "now");
        assert!(md.contains("# 制造业信息资讯"));
        assert!(md.contains("| 新闻 | 1 |"));
        assert!(md.contains("(./news.html#robot-arm-ships)"));
    }
}
