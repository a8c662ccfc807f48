//! Source crawlers for news, patents, and papers.
//!
//! Each crawler takes its source configs plus the relevant keyword list and
//! returns whatever records it could collect. Failures are isolated at the
//! smallest scope that makes sense — a request, a result block, a source —
//! logged, and skipped: a bad source never aborts a run, and a crawler that
//! gets nothing returns an empty list rather than an error.
//!
//! Requests go through a shared [`reqwest::Client`] with a rotated
//! User-Agent and a fixed timeout. There is deliberately no retry logic
//! here; a missed source is picked up again on the next scheduled run.

use std::time::Duration;

use rand::Rng;
use tracing::{debug, error};

pub mod news;
pub mod papers;
pub mod patents;

const USER_AGENTS: &[&str] = &[
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/119.0.0.0 Safari/537.36",
    "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
    "Mozilla/5.0 (X11; Linux x86_64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
];

const REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// Build an HTTP client with a randomly chosen User-Agent.
pub(crate) fn http_client() -> reqwest::Client {
    let ua = USER_AGENTS[rand::rng().random_range(0..USER_AGENTS.len())];
    match reqwest::Client::builder()
        .user_agent(ua)
        .timeout(REQUEST_TIMEOUT)
        .build()
    {
        Ok(client) => client,
        Err(e) => {
            error!(error = %e, "Failed to build HTTP client, falling back to defaults");
            reqwest::Client::new()
        }
    }
}

/// Fetch a URL's body as text. Any failure is logged and yields `None`.
pub(crate) async fn fetch_text(client: &reqwest::Client, url: &str) -> Option<String> {
    debug!(%url, "Fetching");
    let response = match client.get(url).send().await {
        Ok(r) => r,
        Err(e) => {
            error!(error = %e, %url, "Request failed");
            return None;
        }
    };
    let response = match response.error_for_status() {
        Ok(r) => r,
        Err(e) => {
            error!(error = %e, %url, "Request returned error status");
            return None;
        }
    };
    match response.text().await {
        Ok(text) => Some(text),
        Err(e) => {
            error!(error = %e, %url, "Failed to read response body");
            None
        }
    }
}
