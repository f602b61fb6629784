//! Evidence gathering: the retriever step and the web-search step.
//!
//! Both are fan-out branches: order-independent, targeting disjoint
//! accumulating fields, and no-ops (with an explicit empty update) when
//! their query list is empty so fan-in always proceeds.

use async_trait::async_trait;

use super::{Step, StepContext};
use crate::error::{Error, ProviderError, Result};
use crate::state::{AllocationPlan, SearchHit, SourceDocument, StateUpdate, WorkflowState, keys};

/// Runs the allocation's knowledge-base queries. Zero external calls when
/// the list is empty.
pub(crate) async fn retrieve(
    allocation: &AllocationPlan,
    ctx: &StepContext,
) -> Result<Vec<SourceDocument>> {
    let mut results = Vec::new();
    for query in &allocation.rag_queries {
        let embedding = ctx.providers.embedder.embed(query).await?;
        let hits = ctx
            .providers
            .retriever
            .top_k(&ctx.config.collection, &embedding, ctx.config.top_k)
            .await?;
        results.extend(hits);
    }
    Ok(results)
}

/// Runs the allocation's web queries through the provider chain. A fully
/// failed chain yields the hits gathered so far plus a sentinel warning
/// instead of an error.
pub(crate) async fn web_search(
    allocation: &AllocationPlan,
    ctx: &StepContext,
) -> Result<(Vec<SearchHit>, Option<String>)> {
    let mut hits = Vec::new();
    for query in &allocation.web_queries {
        match ctx.providers.web.search(query).await {
            Ok(batch) => hits.extend(batch),
            Err(Error::Provider(ProviderError::WebSearchUnavailable { error_class })) => {
                tracing::warn!(%error_class, "web search unavailable, continuing without it");
                return Ok((hits, Some(format!("web_search_unavailable: {error_class}"))));
            }
            Err(other) => return Err(other),
        }
    }
    Ok((hits, None))
}

/// The retriever step: appends top-k hits for each allocated KB query.
pub struct RetrieveStep;

#[async_trait]
impl Step for RetrieveStep {
    fn name(&self) -> &'static str {
        "retrieve"
    }

    async fn run(&self, state: &WorkflowState, ctx: &StepContext) -> Result<StateUpdate> {
        let allocation: AllocationPlan = state.get_as(keys::ALLOCATION)?;
        let results = retrieve(&allocation, ctx).await?;
        tracing::debug!(count = results.len(), "retrieval complete");
        StateUpdate::new().with_json(keys::RAG_RESULTS, &results)
    }
}

/// The web-search step: appends hits for each allocated web query,
/// degrading to a sentinel warning when every provider fails.
pub struct WebSearchStep;

#[async_trait]
impl Step for WebSearchStep {
    fn name(&self) -> &'static str {
        "web_search"
    }

    async fn run(&self, state: &WorkflowState, ctx: &StepContext) -> Result<StateUpdate> {
        let allocation: AllocationPlan = state.get_as(keys::ALLOCATION)?;
        let (hits, warning) = web_search(&allocation, ctx).await?;
        tracing::debug!(count = hits.len(), degraded = warning.is_some(), "web search complete");
        let mut update = StateUpdate::new().with_json(keys::SEARCH_RESULTS, &hits)?;
        if let Some(warning) = warning {
            update = update.with(keys::GATHER_WARNINGS, serde_json::json!([warning]));
        }
        Ok(update)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{
        FALLBACK_DIMENSIONS, FailingSearcher, FallbackEmbedder, ProviderSet, ScriptedGenerator,
        StaticRetriever,
    };
    use crate::steps::testing::{kb_doc, scripted_context};
    use crate::steps::{CancelFlag, StepContext};
    use std::sync::Arc;

    fn allocation(rag: &[&str], web: &[&str]) -> AllocationPlan {
        AllocationPlan {
            rag_queries: rag.iter().map(ToString::to_string).collect(),
            web_queries: web.iter().map(ToString::to_string).collect(),
            strategy: String::new(),
        }
    }

    fn failing_web_context() -> StepContext {
        let config = Arc::new(crate::config::Config::default());
        let providers = ProviderSet {
            generator: Arc::new(ScriptedGenerator::new(vec![])),
            embedder: Arc::new(FallbackEmbedder::new(FALLBACK_DIMENSIONS)),
            retriever: Arc::new(StaticRetriever::new()),
            web: Arc::new(FailingSearcher),
        };
        StepContext::new(config, providers, "t".to_string(), CancelFlag::new())
    }

    #[tokio::test]
    async fn test_retrieve_empty_queries_is_noop() {
        let ctx = scripted_context(vec![], vec![], vec![]);
        let results = retrieve(&allocation(&[], &[]), &ctx).await.unwrap();
        assert!(results.is_empty());
    }

    #[tokio::test]
    async fn test_retrieve_concatenates_per_query_hits() {
        let docs = vec![
            kb_doc("kb:1", "postgres replication details").await,
            kb_doc("kb:2", "mysql replication details").await,
        ];
        let ctx = scripted_context(vec![], docs, vec![]);
        let results = retrieve(&allocation(&["postgres", "mysql"], &[]), &ctx)
            .await
            .unwrap();
        // Two queries, top-k over two documents each.
        assert_eq!(results.len(), 4);
    }

    #[tokio::test]
    async fn test_retrieve_step_empty_update_still_touches_field() {
        let ctx = scripted_context(vec![], vec![], vec![]);
        let mut state = WorkflowState::new();
        state
            .set_json(keys::ALLOCATION, &allocation(&[], &["web only"]))
            .unwrap();
        let update = RetrieveStep.run(&state, &ctx).await.unwrap();
        // An empty result update is still produced so fan-in proceeds.
        let fields: Vec<&str> = update.field_names().collect();
        assert_eq!(fields, vec![keys::RAG_RESULTS]);
    }

    #[tokio::test]
    async fn test_web_search_collects_hits() {
        let hits = vec![SearchHit {
            title: "Paris".to_string(),
            snippet: "Paris is the capital of France".to_string(),
            url: "https://example.com/paris".to_string(),
            score: 0.9,
        }];
        let ctx = scripted_context(vec![], vec![], hits);
        let (found, warning) = web_search(&allocation(&[], &["capital of France"]), &ctx)
            .await
            .unwrap();
        assert_eq!(found.len(), 1);
        assert!(warning.is_none());
    }

    #[tokio::test]
    async fn test_web_search_degrades_to_sentinel() {
        let ctx = failing_web_context();
        let (found, warning) = web_search(&allocation(&[], &["anything"]), &ctx)
            .await
            .unwrap();
        assert!(found.is_empty());
        let warning = warning.unwrap();
        assert!(warning.starts_with("web_search_unavailable"));
        assert!(warning.contains("connection refused"));
    }

    #[tokio::test]
    async fn test_web_search_step_writes_sentinel_warning() {
        let ctx = failing_web_context();
        let mut state = WorkflowState::new();
        state
            .set_json(keys::ALLOCATION, &allocation(&[], &["anything"]))
            .unwrap();
        let update = WebSearchStep.run(&state, &ctx).await.unwrap();
        let fields: Vec<&str> = update.field_names().collect();
        assert_eq!(fields, vec![keys::GATHER_WARNINGS, keys::SEARCH_RESULTS]);
    }

    #[tokio::test]
    async fn test_web_search_empty_queries_zero_calls() {
        // A failing searcher proves no call happens for an empty list.
        let ctx = failing_web_context();
        let (found, warning) = web_search(&allocation(&[], &[]), &ctx).await.unwrap();
        assert!(found.is_empty());
        assert!(warning.is_none());
    }
}
