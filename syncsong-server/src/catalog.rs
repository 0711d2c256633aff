//! Media catalog search
//!
//! The authority proxies search to an upstream catalog so participants need
//! no catalog credentials of their own. Ranking is the upstream's business.

use std::time::Duration;

use async_trait::async_trait;
use syncsong_common::api::SearchResult;
use tracing::debug;

use crate::error::{Error, Result};

/// Results returned per query
pub const RESULT_LIMIT: usize = 5;

#[async_trait]
pub trait Catalog: Send + Sync {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>>;
}

/// Upstream catalog reached over HTTP
///
/// Sends `GET {endpoint}?q=<query>&limit=5` and expects a JSON array of
/// search results.
#[derive(Debug, Clone)]
pub struct HttpCatalog {
    client: reqwest::Client,
    endpoint: String,
}

impl HttpCatalog {
    pub fn new(endpoint: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(8))
            .build()
            .map_err(|e| Error::Catalog(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            client,
            endpoint: endpoint.into(),
        })
    }
}

#[async_trait]
impl Catalog for HttpCatalog {
    async fn search(&self, query: &str) -> Result<Vec<SearchResult>> {
        debug!("Catalog search {:?}", query);
        let limit = RESULT_LIMIT.to_string();
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[("q", query), ("limit", limit.as_str())])
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| Error::Catalog(e.to_string()))?;

        let mut results: Vec<SearchResult> = response
            .json()
            .await
            .map_err(|e| Error::Catalog(format!("Unexpected catalog response: {}", e)))?;
        results.retain(|result| !result.url.trim().is_empty());
        results.truncate(RESULT_LIMIT);
        Ok(results)
    }
}

/// No upstream configured: every search is empty
#[derive(Debug, Clone, Copy, Default)]
pub struct NullCatalog;

#[async_trait]
impl Catalog for NullCatalog {
    async fn search(&self, _query: &str) -> Result<Vec<SearchResult>> {
        Ok(Vec::new())
    }
}
