//! HTTP web fetcher.
//!
//! Fetches a URL and returns plain text, stripping HTML. Blocks SSRF
//! targets (localhost, link-local metadata IPs) and truncates oversized
//! bodies.

use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use reqwest::Client;
use tracing::debug;

use keel_core::WebFetcher;

const DEFAULT_MAX_BYTES: usize = 100_000;
const SSRF_BLOCKED_HOSTS: &[&str] =
    &["localhost", "127.0.0.1", "0.0.0.0", "::1", "169.254.169.254"];

pub struct HttpFetcher {
    client: Client,
    max_bytes: usize,
}

impl HttpFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent("Keel/0.1 (+https://keel.run)")
            .build()?;
        Ok(Self { client, max_bytes: DEFAULT_MAX_BYTES })
    }

    pub fn with_max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }
}

#[async_trait]
impl WebFetcher for HttpFetcher {
    async fn fetch(&self, url: &str) -> Result<String> {
        let parsed = url::Url::parse(url)?;
        let host = parsed.host_str().unwrap_or("").to_lowercase();
        if SSRF_BLOCKED_HOSTS.iter().any(|b| host.contains(b)) {
            anyhow::bail!("SSRF: blocked host {}", host);
        }

        let resp = self.client.get(url).send().await?.error_for_status()?;
        let content_type = resp
            .headers()
            .get("content-type")
            .and_then(|v| v.to_str().ok())
            .unwrap_or("text/html")
            .to_string();

        let bytes = resp.bytes().await?;
        let slice = &bytes[..bytes.len().min(self.max_bytes)];
        let raw = String::from_utf8_lossy(slice).to_string();

        let body = if content_type.contains("html") { strip_html(&raw) } else { raw };
        debug!(url, bytes = body.len(), "Fetched page");
        Ok(body)
    }
}

fn strip_html(html: &str) -> String {
    let mut out = String::with_capacity(html.len());
    let mut in_tag = false;
    for ch in html.chars() {
        match ch {
            '<' => in_tag = true,
            '>' => in_tag = false,
            _ if !in_tag => out.push(ch),
            _ => {}
        }
    }
    out.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_tags_and_collapses_whitespace() {
        let html = "<html><body><h1>Title</h1>\n<p>Some   text</p></body></html>";
        assert_eq!(strip_html(html), "Title Some text");
    }

    #[tokio::test]
    async fn blocks_ssrf_hosts() {
        let fetcher = HttpFetcher::new(Duration::from_secs(1)).unwrap();
        for url in ["http://localhost/admin", "http://169.254.169.254/latest/meta-data"] {
            let err = fetcher.fetch(url).await.unwrap_err();
            assert!(err.to_string().contains("SSRF"), "expected SSRF block for {url}");
        }
    }
}
