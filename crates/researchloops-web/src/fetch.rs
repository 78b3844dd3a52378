use async_trait::async_trait;
use reqwest::Client;
use std::time::Duration;
use tracing::debug;

use crate::{FetchedPage, PageFetch, WebError};

/// Maximum body length kept per page
const MAX_BODY_CHARS: usize = 20_000;

/// Page fetcher over plain HTTP(S)
pub struct HttpPageFetcher {
    http: Client,
}

impl HttpPageFetcher {
    pub fn new(http: Client) -> Self {
        Self { http }
    }
}

#[async_trait]
impl PageFetch for HttpPageFetcher {
    async fn fetch(&self, url: &str, timeout: Duration) -> Result<FetchedPage, WebError> {
        debug!(url, timeout_ms = timeout.as_millis(), "Fetching page");

        let request = async {
            let resp = self
                .http
                .get(url)
                .timeout(timeout)
                .send()
                .await?
                .error_for_status()?;
            Ok::<String, reqwest::Error>(resp.text().await?)
        };

        let html = tokio::time::timeout(timeout, request)
            .await
            .map_err(|_| WebError::Timeout(timeout))?
            .map_err(|e| {
                if e.is_timeout() {
                    WebError::Timeout(timeout)
                } else {
                    WebError::Fetch {
                        url: url.to_string(),
                        reason: e.to_string(),
                    }
                }
            })?;

        let (title, body) = html_to_text(&html);
        Ok(FetchedPage {
            url: url.to_string(),
            title: if title.is_empty() { url.to_string() } else { title },
            body: body.chars().take(MAX_BODY_CHARS).collect(),
        })
    }
}

/// Reduce an HTML document to `(title, text)`.
///
/// Drops `script`, `style` and `noscript` contents, turns block-level tags
/// into line breaks and decodes the common entities.
pub fn html_to_text(html: &str) -> (String, String) {
    let title = between_tags(html, "title")
        .map(|t| decode_entities(t.trim()))
        .unwrap_or_default();

    let mut text = String::with_capacity(html.len() / 2);
    let lower = html.to_ascii_lowercase();
    let mut pos = 0;
    let bytes = html.as_bytes();

    while pos < bytes.len() {
        if bytes[pos] == b'<' {
            let Some(end_rel) = html[pos..].find('>') else {
                break;
            };
            let tag = lower[pos + 1..pos + end_rel].trim_start_matches('/');
            let tag_name: String = tag
                .chars()
                .take_while(|c| c.is_ascii_alphanumeric())
                .collect();

            if matches!(tag_name.as_str(), "script" | "style" | "noscript")
                && !lower[pos + 1..].starts_with('/')
            {
                let closing = format!("</{}", tag_name);
                pos = match lower[pos..].find(&closing) {
                    Some(close) => {
                        let after = pos + close;
                        html[after..].find('>').map(|e| after + e + 1).unwrap_or(bytes.len())
                    }
                    None => bytes.len(),
                };
                continue;
            }

            if matches!(
                tag_name.as_str(),
                "p" | "br" | "div" | "li" | "tr" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" | "section" | "article"
            ) {
                text.push('\n');
            }
            pos += end_rel + 1;
        } else {
            let next = html[pos..].find('<').map(|n| pos + n).unwrap_or(bytes.len());
            text.push_str(&html[pos..next]);
            pos = next;
        }
    }

    let decoded = decode_entities(&text);
    let body = decoded
        .lines()
        .map(|l| l.split_whitespace().collect::<Vec<_>>().join(" "))
        .filter(|l| !l.is_empty())
        .collect::<Vec<_>>()
        .join("\n");

    (title, body)
}

fn between_tags<'a>(html: &'a str, tag: &str) -> Option<&'a str> {
    let lower = html.to_ascii_lowercase();
    let open = lower.find(&format!("<{}", tag))?;
    let start = open + lower[open..].find('>')? + 1;
    let end = start + lower[start..].find(&format!("</{}", tag))?;
    Some(&html[start..end])
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
        .replace("&amp;", "&")
}
