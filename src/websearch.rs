//! Live web search fallback.
//!
//! Used when session retrieval comes up empty or the grader judges it
//! irrelevant. The built-in provider posts to DuckDuckGo's HTML endpoint —
//! no API key — and flattens result titles and snippets into a block of
//! context text for the synthesizer.

use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use scraper::{Html, Selector};

use crate::traits::WebSearch;

const DDG_HTML_URL: &str = "https://html.duckduckgo.com/html/";
const MAX_RESULTS: usize = 5;

pub struct DuckDuckGo {
    client: reqwest::Client,
}

impl DuckDuckGo {
    pub fn new() -> Result<Self> {
        // A browser-like User-Agent avoids being served the bot wall.
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .user_agent(
                "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/120.0.0.0 Safari/537.36",
            )
            .build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl WebSearch for DuckDuckGo {
    async fn search(&self, query: &str) -> Result<String> {
        let response = self
            .client
            .post(DDG_HTML_URL)
            .form(&[("q", query)])
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            bail!("search request failed with status {}", status);
        }

        let html = response.text().await?;
        let text = parse_results(&html, MAX_RESULTS);
        if text.is_empty() {
            bail!("no web results for query");
        }
        Ok(text)
    }
}

/// Pull result titles and snippets out of the DuckDuckGo HTML page.
fn parse_results(html: &str, max_results: usize) -> String {
    let document = Html::parse_document(html);
    // Selectors are static; parse failures here would be programmer error.
    let Ok(title_sel) = Selector::parse("a.result__a") else {
        return String::new();
    };
    let Ok(snippet_sel) = Selector::parse(".result__snippet") else {
        return String::new();
    };

    let titles: Vec<String> = document
        .select(&title_sel)
        .take(max_results)
        .map(|el| el.text().collect::<String>().trim().to_string())
        .collect();
    let snippets: Vec<String> = document
        .select(&snippet_sel)
        .take(max_results)
        .map(|el| el.text().collect::<String>().trim().to_string())
        .collect();

    let mut blocks = Vec::new();
    for (i, snippet) in snippets.iter().enumerate() {
        if snippet.is_empty() {
            continue;
        }
        match titles.get(i).filter(|t| !t.is_empty()) {
            Some(title) => blocks.push(format!("{}: {}", title, snippet)),
            None => blocks.push(snippet.clone()),
        }
    }
    blocks.join("\n")
}
