//! browser_use: a lightweight HTTP browser
//!
//! Keeps the last fetched page between calls so the model can navigate once and
//! then read text or links from it.

use async_trait::async_trait;
use regex::Regex;
use reqwest::Url;
use scraper::{Html, Selector};
use serde::Deserialize;
use serde_json::{json, Value};
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::debug;

use super::ToolTrait;

const USER_AGENT: &str = "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/537.36";
const MAX_LINKS: usize = 50;

#[derive(Debug, Clone)]
struct Page {
    url: String,
    html: String,
}

pub struct BrowserUseTool {
    client: reqwest::Client,
    max_chars: usize,
    page: Mutex<Option<Page>>,
}

impl BrowserUseTool {
    pub fn new(max_chars: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            max_chars,
            page: Mutex::new(None),
        }
    }

    fn current_page(&self) -> Option<Page> {
        self.page
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn require_page(&self) -> Result<Page, Box<dyn std::error::Error + Send + Sync>> {
        self.current_page()
            .ok_or_else(|| "No page loaded. Use the 'navigate' action first.".into())
    }

    async fn navigate(&self, url: &str) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        debug!("Browser navigating to {}", url);
        let response = self
            .client
            .get(url)
            .header("User-Agent", USER_AGENT)
            .timeout(Duration::from_secs(30))
            .send()
            .await?;

        let status = response.status();
        let final_url = response.url().to_string();
        let html = response.text().await?;
        let title = page_title(&html);

        *self.page.lock().unwrap_or_else(PoisonError::into_inner) = Some(Page {
            url: final_url.clone(),
            html,
        });

        let mut summary = format!("Navigated to {} (status {})", final_url, status.as_u16());
        if let Some(title) = title {
            summary.push_str(&format!("\nTitle: {}", title));
        }
        Ok(summary)
    }
}

impl Default for BrowserUseTool {
    fn default() -> Self {
        Self::new(20_000)
    }
}

#[derive(Deserialize)]
struct BrowserArgs {
    action: String,
    url: Option<String>,
}

#[async_trait]
impl ToolTrait for BrowserUseTool {
    fn name(&self) -> &str {
        "browser_use"
    }

    fn description(&self) -> &str {
        "Browse the web: navigate to a URL, then read the page text or its links."
    }

    fn parameters(&self) -> Value {
        json!({
            "type": "object",
            "properties": {
                "action": {
                    "type": "string",
                    "enum": ["navigate", "get_text", "get_links", "current_url"],
                    "description": "Browser action to perform"
                },
                "url": { "type": "string", "description": "URL for 'navigate'" }
            },
            "required": ["action"]
        })
    }

    async fn execute(
        &self,
        args: Value,
    ) -> Result<String, Box<dyn std::error::Error + Send + Sync>> {
        let args: BrowserArgs = serde_json::from_value(args)?;

        match args.action.as_str() {
            "navigate" => {
                let url = args
                    .url
                    .ok_or("URL is required for 'navigate' action")?;
                self.navigate(&url).await
            }
            "get_text" => {
                let page = self.require_page()?;
                let text = strip_tags(&page.html)?;
                Ok(truncate_chars(&text, self.max_chars))
            }
            "get_links" => {
                let page = self.require_page()?;
                let links = extract_links(&page.html, &page.url)?;
                if links.is_empty() {
                    return Ok(format!("No links found on {}", page.url));
                }
                Ok(links
                    .iter()
                    .take(MAX_LINKS)
                    .enumerate()
                    .map(|(i, (text, href))| format!("{}. {} -> {}", i + 1, text, href))
                    .collect::<Vec<_>>()
                    .join("\n"))
            }
            "current_url" => Ok(self
                .current_page()
                .map(|p| p.url)
                .unwrap_or_else(|| "No page loaded".to_string())),
            other => Err(format!("Unknown browser action: {}", other).into()),
        }
    }
}

fn truncate_chars(text: &str, max_chars: usize) -> String {
    match text.char_indices().nth(max_chars) {
        Some((cut, _)) => format!("{}... (truncated)", &text[..cut]),
        None => text.to_string(),
    }
}

fn page_title(html: &str) -> Option<String> {
    let selector = Selector::parse("title").ok()?;
    let document = Html::parse_document(html);
    document
        .select(&selector)
        .next()
        .map(|t| t.text().collect::<String>().trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Visible text of an HTML document
fn strip_tags(html: &str) -> Result<String, regex::Error> {
    let hidden = Regex::new(r"(?is)<script[\s\S]*?</script>|<style[\s\S]*?</style>|<head[\s\S]*?</head>")?;
    let text = hidden.replace_all(html, " ");
    let tags = Regex::new(r"<[^>]+>")?;
    let text = tags.replace_all(&text, " ");
    let text = decode_html_entities(&text);
    let spaces = Regex::new(r"[ \t\r\f]+")?;
    let text = spaces.replace_all(&text, " ");
    let blank_lines = Regex::new(r"\s*\n\s*")?;
    Ok(blank_lines.replace_all(&text, "\n").trim().to_string())
}

/// Anchor text and absolute href of every link
fn extract_links(html: &str, base: &str) -> Result<Vec<(String, String)>, String> {
    let selector = Selector::parse("a[href]").map_err(|e| e.to_string())?;
    let base = Url::parse(base).ok();
    let document = Html::parse_document(html);

    Ok(document
        .select(&selector)
        .filter_map(|anchor| {
            let href = anchor.value().attr("href")?;
            if href.starts_with('#') || href.starts_with("javascript:") {
                return None;
            }
            let absolute = match &base {
                Some(base) => base.join(href).map(|u| u.to_string()).ok()?,
                None => href.to_string(),
            };
            let text = anchor.text().collect::<String>().trim().to_string();
            let text = if text.is_empty() { absolute.clone() } else { text };
            Some((text, absolute))
        })
        .collect())
}

fn decode_html_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
