//! dr-sources: Content sources for deep-research
//!
//! This crate provides the retrieval side of a research run:
//! - Firecrawl: web search with scraped markdown
//! - Retriever: a local document retriever run as a subprocess
//! - Hybrid: both of the above behind one fault-tolerant `ContentSource`

use async_trait::async_trait;

use dr_core::Error;

pub mod firecrawl;
pub mod hybrid;
pub mod retriever;

pub use firecrawl::{FirecrawlConfig, FirecrawlProvider};
pub use hybrid::HybridSource;
pub use retriever::{RetrieverConfig, SubprocessRetriever};

/// One piece of retrieved content and where it came from (URL or file path).
///
/// Either side may be empty when a backend returns a partial record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceHit {
    pub content: String,
    pub source_id: String,
}

impl SourceHit {
    pub fn new(content: impl Into<String>, source_id: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            source_id: source_id.into(),
        }
    }
}

/// Per-backend hit limits for a single fetch. A zero quota disables that backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Quota {
    pub web: usize,
    pub internal: usize,
}

impl Quota {
    pub fn new(web: usize, internal: usize) -> Self {
        Self { web, internal }
    }
}

/// Combined output of a fetch: content texts and source ids, in backend order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FetchResult {
    pub contents: Vec<String>,
    pub source_ids: Vec<String>,
}

impl FetchResult {
    pub fn push(&mut self, hit: SourceHit) {
        if !hit.content.is_empty() {
            self.contents.push(hit.content);
        }
        if !hit.source_id.is_empty() {
            self.source_ids.push(hit.source_id);
        }
    }

    pub fn is_empty(&self) -> bool {
        self.contents.is_empty() && self.source_ids.is_empty()
    }
}

/// A single retrieval backend.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    fn name(&self) -> &str;

    /// Return at most `limit` hits for `query`.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SourceHit>, Error>;
}

/// What the research engine fetches content from.
///
/// Implementations never fail: backend errors degrade to fewer hits.
#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn fetch(&self, query: &str, quota: Quota) -> FetchResult;
}
