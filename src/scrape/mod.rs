//! Website scraping
//!
//! The pipeline only sees the [`ScrapeService`] trait. [`FirecrawlClient`]
//! implements it against a Firecrawl-compatible `/v1/scrape` endpoint that
//! returns page content as markdown.

use crate::config::ScrapeConfig;
use crate::error::{Error, Result};
use async_trait::async_trait;
use reqwest::{Client, StatusCode};
use serde::Serialize;
use serde_json::Value;
use std::time::Duration;
use tracing::debug;
use url::Url;

/// Text scraped from one website
#[derive(Debug, Clone, PartialEq)]
pub struct ScrapedPage {
    /// The normalized URL that was requested
    pub url: String,
    /// Page content; may be empty
    pub text: String,
}

/// External scraper
#[async_trait]
pub trait ScrapeService: Send + Sync {
    async fn scrape(&self, url: &str) -> Result<ScrapedPage>;
}

/// Trim a website and add `https://` when it has no http(s) scheme
pub fn normalize_url(website: &str) -> String {
    let trimmed = website.trim();
    let lower = trimmed.to_ascii_lowercase();
    if lower.starts_with("http://") || lower.starts_with("https://") {
        trimmed.to_string()
    } else {
        format!("https://{}", trimmed)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ScrapeRequest<'a> {
    url: &'a str,
    formats: [&'a str; 1],
    only_main_content: bool,
}

/// Firecrawl-compatible HTTP scraper
pub struct FirecrawlClient {
    client: Client,
    base_url: Url,
    api_key: String,
    only_main_content: bool,
}

impl FirecrawlClient {
    pub fn new(config: &ScrapeConfig, api_key: String) -> Result<Self> {
        let base_url = Url::parse(&config.base_url)?;
        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .user_agent(&config.user_agent)
            .gzip(true)
            .brotli(true)
            .build()?;

        Ok(Self {
            client,
            base_url,
            api_key,
            only_main_content: config.only_main_content,
        })
    }

    fn endpoint(&self) -> Result<Url> {
        self.base_url
            .join("/v1/scrape")
            .map_err(|e| Error::Config(format!("Invalid scrape URL: {}", e)))
    }
}

#[async_trait]
impl ScrapeService for FirecrawlClient {
    async fn scrape(&self, website: &str) -> Result<ScrapedPage> {
        let url = normalize_url(website);
        debug!("Scraping {}", url);

        let body = ScrapeRequest {
            url: &url,
            formats: ["markdown"],
            only_main_content: self.only_main_content,
        };

        let response = self
            .client
            .post(self.endpoint()?)
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Scrape(e.to_string()))?;

        let status = response.status();
        // Error bodies are not guaranteed to be JSON
        let data: Value = response.json().await.unwrap_or(Value::Null);
        let message = data
            .get("error")
            .and_then(Value::as_str)
            .map(str::to_string);

        match status {
            StatusCode::TOO_MANY_REQUESTS => {
                return Err(Error::RateLimited(
                    message.unwrap_or_else(|| "scrape rate limit exceeded".to_string()),
                ))
            }
            StatusCode::PAYMENT_REQUIRED => {
                return Err(Error::PaymentRequired(
                    message.unwrap_or_else(|| "scrape credits exhausted".to_string()),
                ))
            }
            s if !s.is_success() => {
                return Err(Error::Scrape(message.unwrap_or_else(|| {
                    format!("Scrape failed with status {}", s.as_u16())
                })))
            }
            _ => {}
        }

        if data.get("success").and_then(Value::as_bool) == Some(false) {
            return Err(Error::Scrape(
                message.unwrap_or_else(|| "Scrape reported failure".to_string()),
            ));
        }

        let text = data
            .pointer("/data/markdown")
            .or_else(|| data.get("markdown"))
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();

        debug!(chars = text.len(), "Scraped {}", url);
        Ok(ScrapedPage { url, text })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client_for(server: &MockServer) -> FirecrawlClient {
        let config = ScrapeConfig {
            base_url: server.uri(),
            timeout_secs: 5,
            ..Default::default()
        };
        FirecrawlClient::new(&config, "fc-test".to_string()).unwrap()
    }

    #[test]
    fn test_normalize_url() {
        assert_eq!(normalize_url("example.com"), "https://example.com");
        assert_eq!(normalize_url("  example.com/about "), "https://example.com/about");
        assert_eq!(normalize_url("http://example.com"), "http://example.com");
        assert_eq!(normalize_url("HTTPS://Example.com"), "HTTPS://Example.com");
    }

    #[tokio::test]
    async fn test_scrape_nested_markdown() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/scrape"))
            .and(header("authorization", "Bearer fc-test"))
            .and(body_partial_json(json!({
                "url": "https://smile.example",
                "formats": ["markdown"],
                "onlyMainContent": true
            })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": true,
                "data": { "markdown": "# Smile Dental\nWe care." }
            })))
            .expect(1)
            .mount(&server)
            .await;

        let page = client_for(&server).scrape("smile.example").await.unwrap();
        assert_eq!(page.url, "https://smile.example");
        assert_eq!(page.text, "# Smile Dental\nWe care.");
    }

    #[tokio::test]
    async fn test_scrape_top_level_markdown_and_empty() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "url": "https://flat.example" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "markdown": "Flat body." })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "url": "https://empty.example" })))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "success": true, "data": {} })))
            .mount(&server)
            .await;

        let client = client_for(&server);
        assert_eq!(client.scrape("flat.example").await.unwrap().text, "Flat body.");
        assert_eq!(client.scrape("https://empty.example").await.unwrap().text, "");
    }

    #[tokio::test]
    async fn test_scrape_error_kinds() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "url": "https://busy.example" })))
            .respond_with(ResponseTemplate::new(429).set_body_json(json!({ "error": "slow down" })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "url": "https://broke.example" })))
            .respond_with(ResponseTemplate::new(402))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(body_partial_json(json!({ "url": "https://down.example" })))
            .respond_with(ResponseTemplate::new(500).set_body_string("upstream exploded"))
            .mount(&server)
            .await;

        let client = client_for(&server);

        match client.scrape("busy.example").await {
            Err(Error::RateLimited(msg)) => assert_eq!(msg, "slow down"),
            other => panic!("expected rate limit, got {:?}", other),
        }
        assert!(matches!(
            client.scrape("broke.example").await,
            Err(Error::PaymentRequired(_))
        ));
        match client.scrape("down.example").await {
            Err(Error::Scrape(msg)) => assert!(msg.contains("500")),
            other => panic!("expected scrape error, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_scrape_reported_failure() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "success": false,
                "error": "blocked by robots"
            })))
            .mount(&server)
            .await;

        let err = client_for(&server).scrape("blocked.example").await.unwrap_err();
        assert!(err.is_service_error());
        assert_eq!(err.to_string(), "Scrape error: blocked by robots");
    }
}
