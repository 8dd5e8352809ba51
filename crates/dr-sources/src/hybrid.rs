//! Web search and local retrieval combined into one content source.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};

use crate::{ContentSource, FetchResult, Quota, SearchProvider};

/// Queries the web backend, then the internal backend, each within its own quota.
///
/// A failing backend is logged and contributes nothing; it never cancels the
/// other backend or fails the fetch. A zero quota skips that backend entirely.
pub struct HybridSource {
    web: Arc<dyn SearchProvider>,
    internal: Arc<dyn SearchProvider>,
}

impl HybridSource {
    pub fn new(web: Arc<dyn SearchProvider>, internal: Arc<dyn SearchProvider>) -> Self {
        Self { web, internal }
    }

    async fn collect(
        provider: &dyn SearchProvider,
        query: &str,
        limit: usize,
        result: &mut FetchResult,
    ) {
        if limit == 0 {
            return;
        }

        match provider.search(query, limit).await {
            Ok(hits) => {
                debug!(provider = provider.name(), query, hits = hits.len(), "Fetched hits");
                for hit in hits.into_iter().take(limit) {
                    result.push(hit);
                }
            }
            Err(e) => {
                warn!(provider = provider.name(), query, error = %e, "Source fetch failed");
            }
        }
    }
}

#[async_trait]
impl ContentSource for HybridSource {
    async fn fetch(&self, query: &str, quota: Quota) -> FetchResult {
        let mut result = FetchResult::default();
        Self::collect(self.web.as_ref(), query, quota.web, &mut result).await;
        Self::collect(self.internal.as_ref(), query, quota.internal, &mut result).await;
        result
    }
}
