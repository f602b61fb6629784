//! External provider seams.
//!
//! The core consumes four abstractions: a text generator, an embedder, a
//! retriever, and a web searcher. Concrete implementations live here too
//! (OpenAI-compatible endpoints, the `SQLite` retriever, the provider
//! fallback chain), but steps only ever see the traits via
//! [`ProviderSet`].

pub mod embedder;
pub mod generator;
pub mod retriever;
pub mod websearch;

use std::sync::Arc;

pub use embedder::{ApiEmbedder, Embedder, FALLBACK_DIMENSIONS, FallbackEmbedder, cosine_similarity};
pub use generator::{
    ApiGenerator, FieldKind, FieldSpec, OutputSchema, Prompt, ScriptedGenerator, TextGenerator,
};
pub use retriever::{Retriever, SqliteRetriever, StaticRetriever};
pub use websearch::{
    BraveProvider, FailingSearcher, SearchChain, SearchProvider, StaticSearcher, TavilyProvider,
    WebSearcher,
};

use crate::config::{Config, ModelProvider};
use crate::storage::Database;

/// The bundle of provider trait objects handed to steps.
#[derive(Clone)]
pub struct ProviderSet {
    /// Text generator.
    pub generator: Arc<dyn TextGenerator>,
    /// Embedding generator.
    pub embedder: Arc<dyn Embedder>,
    /// Knowledge-base retriever.
    pub retriever: Arc<dyn Retriever>,
    /// Web searcher.
    pub web: Arc<dyn WebSearcher>,
}

impl std::fmt::Debug for ProviderSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderSet").finish_non_exhaustive()
    }
}

impl ProviderSet {
    /// Builds the production provider set described by configuration.
    ///
    /// # Errors
    ///
    /// Returns [`crate::Error::Config`] when the selected model provider
    /// is missing its credential.
    pub fn from_config(config: &Config, db: Database) -> crate::Result<Self> {
        let (generator, embedder): (Arc<dyn TextGenerator>, Arc<dyn Embedder>) =
            match config.model_provider {
                ModelProvider::Primary => {
                    let key = config.primary_api_key.as_deref().ok_or_else(|| {
                        crate::Error::Config {
                            message: "PRIMARY_API_KEY is required for MODEL_PROVIDER=primary"
                                .to_string(),
                        }
                    })?;
                    (
                        Arc::new(ApiGenerator::new(Some(key), None, &config.model_name)),
                        Arc::new(ApiEmbedder::new(Some(key), None, &config.embedding_model)),
                    )
                }
                ModelProvider::Local => (
                    Arc::new(ApiGenerator::new(
                        None,
                        Some(&config.local_base_url),
                        &config.model_name,
                    )),
                    Arc::new(FallbackEmbedder::new(FALLBACK_DIMENSIONS)),
                ),
            };

        Ok(Self {
            generator,
            embedder,
            retriever: Arc::new(SqliteRetriever::new(db)),
            web: Arc::new(SearchChain::from_config(config)),
        })
    }
}
