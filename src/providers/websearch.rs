//! Web search with a provider fallback chain.
//!
//! Providers are tried in the configured priority order with one retry
//! each; only when the whole chain fails does the caller see
//! [`ProviderError::WebSearchUnavailable`], which the gather step converts
//! into a sentinel warning instead of failing the workflow.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use crate::config::Config;
use crate::error::{ProviderError, Result};
use crate::state::SearchHit;

/// Default number of hits requested per query.
const DEFAULT_LIMIT: usize = 5;

/// HTTP timeout for a single provider call.
const HTTP_TIMEOUT: Duration = Duration::from_secs(20);

/// One concrete web-search backend.
#[async_trait]
pub trait SearchProvider: Send + Sync {
    /// Provider name, as referenced by `SEARCH_PROVIDER_PRIORITY`.
    fn name(&self) -> &'static str;

    /// Runs one search query.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::WebSearch`] on any transport or decode
    /// failure.
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>>;
}

/// The web-search seam consumed by steps: one query in, ordered hits out.
#[async_trait]
pub trait WebSearcher: Send + Sync {
    /// Searches the web for `query`.
    ///
    /// # Errors
    ///
    /// Returns [`ProviderError::WebSearchUnavailable`] when every
    /// configured provider has failed.
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>>;
}

/// Chains providers in priority order with one retry per provider.
pub struct SearchChain {
    providers: Vec<Arc<dyn SearchProvider>>,
    limit: usize,
}

impl SearchChain {
    /// Builds a chain from an ordered provider list.
    #[must_use]
    pub fn new(providers: Vec<Arc<dyn SearchProvider>>) -> Self {
        Self {
            providers,
            limit: DEFAULT_LIMIT,
        }
    }

    /// Builds the chain described by configuration: providers named in
    /// `search_provider_priority` that have credentials available.
    #[must_use]
    pub fn from_config(config: &Config) -> Self {
        let mut providers: Vec<Arc<dyn SearchProvider>> = Vec::new();
        for name in &config.search_provider_priority {
            match name.as_str() {
                "tavily" => {
                    if let Some(key) = config.web_search_key("tavily") {
                        providers.push(Arc::new(TavilyProvider::new(key)));
                    }
                }
                "brave" => {
                    if let Some(key) = config.web_search_key("brave") {
                        providers.push(Arc::new(BraveProvider::new(key)));
                    }
                }
                other => {
                    tracing::warn!(provider = other, "unknown search provider in priority list");
                }
            }
        }
        Self::new(providers)
    }
}

#[async_trait]
impl WebSearcher for SearchChain {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        if self.providers.is_empty() {
            return Err(ProviderError::WebSearchUnavailable {
                error_class: "no providers configured".to_string(),
            }
            .into());
        }

        let mut last_error = String::new();
        for provider in &self.providers {
            // One retry per provider before advancing down the chain.
            for attempt in 0..2 {
                match provider.search(query, self.limit).await {
                    Ok(hits) => return Ok(hits),
                    Err(e) => {
                        tracing::warn!(
                            provider = provider.name(),
                            attempt,
                            error = %e,
                            "web search attempt failed"
                        );
                        last_error = format!("{}: {e}", provider.name());
                    }
                }
            }
        }

        Err(ProviderError::WebSearchUnavailable {
            error_class: last_error,
        }
        .into())
    }
}

/// Tavily search API provider.
pub struct TavilyProvider {
    client: reqwest::Client,
    api_key: String,
}

impl TavilyProvider {
    /// Creates a provider with the given API key.
    #[must_use]
    pub fn new(api_key: &str) -> Self {
        Self {
            client: http_client(),
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait]
impl SearchProvider for TavilyProvider {
    fn name(&self) -> &'static str {
        "tavily"
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let body = serde_json::json!({
            "api_key": self.api_key,
            "query": query,
            "max_results": limit,
        });
        let response = self
            .client
            .post("https://api.tavily.com/search")
            .json(&body)
            .send()
            .await
            .map_err(|e| provider_error("tavily", &e.to_string()))?
            .error_for_status()
            .map_err(|e| provider_error("tavily", &e.to_string()))?;

        let payload: Value = response
            .json()
            .await
            .map_err(|e| provider_error("tavily", &e.to_string()))?;

        let results = payload["results"]
            .as_array()
            .ok_or_else(|| provider_error("tavily", "missing results array"))?;

        Ok(results
            .iter()
            .map(|result| SearchHit {
                title: text_field(result, "title"),
                snippet: text_field(result, "content"),
                url: text_field(result, "url"),
                score: result["score"].as_f64().unwrap_or(0.0) as f32,
            })
            .collect())
    }
}

/// Brave search API provider.
pub struct BraveProvider {
    client: reqwest::Client,
    api_key: String,
}

impl BraveProvider {
    /// Creates a provider with the given subscription token.
    #[must_use]
    pub fn new(api_key: &str) -> Self {
        Self {
            client: http_client(),
            api_key: api_key.to_string(),
        }
    }
}

#[async_trait]
impl SearchProvider for BraveProvider {
    fn name(&self) -> &'static str {
        "brave"
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<SearchHit>> {
        let count = limit.to_string();
        let response = self
            .client
            .get("https://api.search.brave.com/res/v1/web/search")
            .header("X-Subscription-Token", &self.api_key)
            .query(&[("q", query), ("count", count.as_str())])
            .send()
            .await
            .map_err(|e| provider_error("brave", &e.to_string()))?
            .error_for_status()
            .map_err(|e| provider_error("brave", &e.to_string()))?;

        let payload: Value = response
            .json()
            .await
            .map_err(|e| provider_error("brave", &e.to_string()))?;

        let results = payload["web"]["results"]
            .as_array()
            .ok_or_else(|| provider_error("brave", "missing web.results array"))?;

        Ok(results
            .iter()
            .enumerate()
            .map(|(rank, result)| SearchHit {
                title: text_field(result, "title"),
                snippet: text_field(result, "description"),
                url: text_field(result, "url"),
                // Brave returns rank order, not scores.
                score: 1.0 / (rank as f32 + 1.0),
            })
            .collect())
    }
}

fn http_client() -> reqwest::Client {
    reqwest::Client::builder()
        .timeout(HTTP_TIMEOUT)
        .build()
        .unwrap_or_default()
}

fn provider_error(provider: &str, reason: &str) -> ProviderError {
    ProviderError::WebSearch {
        provider: provider.to_string(),
        reason: reason.to_string(),
    }
}

fn text_field(value: &Value, field: &str) -> String {
    value[field].as_str().unwrap_or_default().to_string()
}

/// Searcher returning fixed hits for any query. Used by tests.
#[doc(hidden)]
#[derive(Default)]
pub struct StaticSearcher {
    hits: Vec<SearchHit>,
}

impl StaticSearcher {
    /// Creates a searcher that always returns `hits`.
    #[must_use]
    pub fn new(hits: Vec<SearchHit>) -> Self {
        Self { hits }
    }
}

#[async_trait]
impl WebSearcher for StaticSearcher {
    async fn search(&self, _query: &str) -> Result<Vec<SearchHit>> {
        Ok(self.hits.clone())
    }
}

/// Searcher that always fails. Used by tests of the sentinel path.
#[doc(hidden)]
#[derive(Default)]
pub struct FailingSearcher;

#[async_trait]
impl WebSearcher for FailingSearcher {
    async fn search(&self, _query: &str) -> Result<Vec<SearchHit>> {
        Err(ProviderError::WebSearchUnavailable {
            error_class: "connection refused".to_string(),
        }
        .into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FlakyProvider {
        calls: AtomicUsize,
        fail_first: usize,
    }

    #[async_trait]
    impl SearchProvider for FlakyProvider {
        fn name(&self) -> &'static str {
            "flaky"
        }

        async fn search(&self, _query: &str, _limit: usize) -> Result<Vec<SearchHit>> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.fail_first {
                return Err(provider_error("flaky", "boom").into());
            }
            Ok(vec![SearchHit {
                title: "ok".to_string(),
                snippet: "recovered".to_string(),
                url: "https://example.com".to_string(),
                score: 1.0,
            }])
        }
    }

    #[tokio::test]
    async fn test_chain_retries_provider_once() {
        let provider = Arc::new(FlakyProvider {
            calls: AtomicUsize::new(0),
            fail_first: 1,
        });
        let chain = SearchChain::new(vec![provider.clone()]);
        let hits = chain.search("anything").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert_eq!(provider.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_chain_falls_through_to_next_provider() {
        let broken = Arc::new(FlakyProvider {
            calls: AtomicUsize::new(0),
            fail_first: usize::MAX,
        });
        let healthy = Arc::new(FlakyProvider {
            calls: AtomicUsize::new(0),
            fail_first: 0,
        });
        let chain = SearchChain::new(vec![broken.clone(), healthy]);
        let hits = chain.search("anything").await.unwrap();
        assert_eq!(hits[0].snippet, "recovered");
        // Broken provider was tried exactly twice before falling through.
        assert_eq!(broken.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_chain_all_failing_is_unavailable() {
        let broken = Arc::new(FlakyProvider {
            calls: AtomicUsize::new(0),
            fail_first: usize::MAX,
        });
        let chain = SearchChain::new(vec![broken]);
        let err = chain.search("anything").await.unwrap_err();
        assert!(err.to_string().contains("web search unavailable"));
    }

    #[tokio::test]
    async fn test_empty_chain_is_unavailable() {
        let chain = SearchChain::new(vec![]);
        let err = chain.search("anything").await.unwrap_err();
        assert!(err.to_string().contains("no providers configured"));
    }

    #[test]
    fn test_from_config_skips_missing_keys() {
        let config = Config::default();
        let chain = SearchChain::from_config(&config);
        assert!(chain.providers.is_empty());

        let config = Config {
            web_search_api_keys: vec![("brave".to_string(), "key".to_string())],
            ..Config::default()
        };
        let chain = SearchChain::from_config(&config);
        assert_eq!(chain.providers.len(), 1);
        assert_eq!(chain.providers[0].name(), "brave");
    }

    #[tokio::test]
    async fn test_static_searcher() {
        let searcher = StaticSearcher::new(vec![SearchHit {
            title: "Paris".to_string(),
            snippet: "Paris is the capital of France".to_string(),
            url: "https://en.wikipedia.org/wiki/Paris".to_string(),
            score: 0.98,
        }]);
        let hits = searcher.search("capital of France").await.unwrap();
        assert_eq!(hits.len(), 1);
        assert!(hits[0].snippet.contains("Paris"));
    }
}
