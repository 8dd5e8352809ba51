//! Web search through the Firecrawl search API, with pages scraped to markdown.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use dr_core::Error;

use crate::{SearchProvider, SourceHit};

pub const DEFAULT_BASE_URL: &str = "https://api.firecrawl.dev";

/// Configuration for the Firecrawl search backend
#[derive(Clone, Debug)]
pub struct FirecrawlConfig {
    /// API key; an empty key still issues requests, which the API rejects
    pub api_key: String,
    /// Base URL of the API (self-hosted instances override this)
    pub base_url: String,
    /// Per-search timeout, forwarded to the API and applied to the HTTP call
    pub timeout: Duration,
}

impl FirecrawlConfig {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
            base_url: DEFAULT_BASE_URL.to_string(),
            timeout: Duration::from_secs(15),
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

pub struct FirecrawlProvider {
    client: Client,
    config: FirecrawlConfig,
}

impl FirecrawlProvider {
    pub fn new(config: FirecrawlConfig) -> Self {
        Self {
            client: Client::builder()
                .user_agent("deep-research/0.1.0")
                // Leave headroom over the server-side timeout for scraping
                .timeout(config.timeout + Duration::from_secs(15))
                .build()
                .unwrap_or_default(),
            config,
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct SearchRequest<'a> {
    query: &'a str,
    limit: usize,
    timeout: u64,
    scrape_options: ScrapeOptions,
}

#[derive(Serialize)]
struct ScrapeOptions {
    formats: Vec<&'static str>,
}

#[derive(Deserialize)]
struct SearchResponse {
    #[serde(default)]
    success: bool,
    #[serde(default)]
    data: Vec<SearchDocument>,
    #[serde(default)]
    error: Option<String>,
}

#[derive(Deserialize)]
struct SearchDocument {
    #[serde(default)]
    url: Option<String>,
    #[serde(default)]
    markdown: Option<String>,
}

fn into_hits(documents: Vec<SearchDocument>, limit: usize) -> Vec<SourceHit> {
    documents
        .into_iter()
        .take(limit)
        .filter(|doc| doc.url.is_some() || doc.markdown.is_some())
        .map(|doc| SourceHit::new(doc.markdown.unwrap_or_default(), doc.url.unwrap_or_default()))
        .collect()
}

#[async_trait]
impl SearchProvider for FirecrawlProvider {
    fn name(&self) -> &str {
        "firecrawl"
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SourceHit>, Error> {
        let request = SearchRequest {
            query,
            limit,
            timeout: self.config.timeout.as_millis() as u64,
            scrape_options: ScrapeOptions {
                formats: vec!["markdown"],
            },
        };

        let url = format!("{}/v1/search", self.config.base_url);
        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.config.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::source("firecrawl", format!("Search request failed: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::source(
                "firecrawl",
                format!("Search API error {}: {}", status, body),
            ));
        }

        let result: SearchResponse = response.json().await.map_err(|e| {
            Error::source("firecrawl", format!("Failed to parse search response: {}", e))
        })?;

        if !result.success {
            return Err(Error::source(
                "firecrawl",
                result.error.unwrap_or_else(|| "search reported failure".to_string()),
            ));
        }

        let hits = into_hits(result.data, limit);
        debug!(query, hits = hits.len(), "Firecrawl search complete");
        Ok(hits)
    }
}
