//! Knowledge-base retrieval.
//!
//! The retriever seam serves top-k nearest-neighbor lookups against a
//! named collection. The default implementation scores cosine similarity
//! over the `SQLite`-installed embeddings; at installed-corpus scale a
//! linear scan beats index maintenance.

use async_trait::async_trait;

use super::embedder::cosine_similarity;
use crate::error::{ProviderError, Result, StorageError};
use crate::state::{KbStatus, SourceDocument, sort_retrieval_results};
use crate::storage::{Database, InstallDocument};

/// Number of sample titles included in a knowledge-base status report.
const STATUS_SAMPLE_SIZE: usize = 10;

/// Trait for vector-indexed document stores.
#[async_trait]
pub trait Retriever: Send + Sync {
    /// Reports collection status (existence, chunk count, sample titles).
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    async fn status(&self, collection: &str) -> Result<KbStatus>;

    /// Returns the `k` documents nearest to `query` within `collection`,
    /// ordered descending by score then by source id.
    ///
    /// # Errors
    ///
    /// Returns an error for unknown collections or read failures.
    async fn top_k(&self, collection: &str, query: &[f32], k: usize)
    -> Result<Vec<SourceDocument>>;

    /// Replaces the contents of `collection` with `documents` atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if installation fails; the previous contents
    /// survive in that case.
    async fn install(&self, collection: &str, documents: Vec<InstallDocument>) -> Result<()>;
}

/// Retriever over the `SQLite` collections store.
#[derive(Clone)]
pub struct SqliteRetriever {
    db: Database,
}

impl SqliteRetriever {
    /// Wraps a database handle.
    #[must_use]
    pub const fn new(db: Database) -> Self {
        Self { db }
    }
}

#[async_trait]
impl Retriever for SqliteRetriever {
    async fn status(&self, collection: &str) -> Result<KbStatus> {
        self.db.kb_status(collection, STATUS_SAMPLE_SIZE)
    }

    async fn top_k(
        &self,
        collection: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<SourceDocument>> {
        let documents = match self.db.embedded_documents(collection) {
            Ok(documents) => documents,
            // An absent collection retrieves nothing rather than failing
            // the workflow; the planner already saw its status.
            Err(crate::error::Error::Storage(StorageError::CollectionNotFound { .. })) => {
                return Ok(Vec::new());
            }
            Err(e) => return Err(ProviderError::Retriever(e.to_string()).into()),
        };

        let mut scored: Vec<SourceDocument> = documents
            .into_iter()
            .map(|doc| SourceDocument {
                score: cosine_similarity(query, &doc.embedding),
                text: doc.content,
                source_id: doc.source_id,
                metadata: doc.metadata,
            })
            .collect();
        sort_retrieval_results(&mut scored);
        scored.truncate(k);
        Ok(scored)
    }

    async fn install(&self, collection: &str, documents: Vec<InstallDocument>) -> Result<()> {
        self.db.install(collection, &documents)
    }
}

/// In-memory retriever with fixed contents. Used by tests.
#[doc(hidden)]
#[derive(Default)]
pub struct StaticRetriever {
    collections: std::sync::Mutex<std::collections::BTreeMap<String, Vec<InstallDocument>>>,
}

impl StaticRetriever {
    /// Creates an empty retriever (an empty knowledge base).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a retriever with one pre-populated collection.
    #[must_use]
    pub fn with_collection(collection: &str, documents: Vec<InstallDocument>) -> Self {
        let retriever = Self::new();
        if let Ok(mut collections) = retriever.collections.lock() {
            collections.insert(collection.to_string(), documents);
        }
        retriever
    }
}

#[async_trait]
impl Retriever for StaticRetriever {
    async fn status(&self, collection: &str) -> Result<KbStatus> {
        let collections = self
            .collections
            .lock()
            .map_err(|_| ProviderError::Retriever("lock poisoned".to_string()))?;
        let documents = collections.get(collection);
        Ok(KbStatus {
            collection: collection.to_string(),
            exists: documents.is_some(),
            chunk_count: documents.map_or(0, |d| d.len() as u64),
            sample_titles: documents
                .map(|d| {
                    d.iter()
                        .take(STATUS_SAMPLE_SIZE)
                        .map(|doc| doc.title.clone().unwrap_or_else(|| doc.source_id.clone()))
                        .collect()
                })
                .unwrap_or_default(),
        })
    }

    async fn top_k(
        &self,
        collection: &str,
        query: &[f32],
        k: usize,
    ) -> Result<Vec<SourceDocument>> {
        let collections = self
            .collections
            .lock()
            .map_err(|_| ProviderError::Retriever("lock poisoned".to_string()))?;
        let Some(documents) = collections.get(collection) else {
            return Ok(Vec::new());
        };
        let mut scored: Vec<SourceDocument> = documents
            .iter()
            .map(|doc| SourceDocument {
                score: cosine_similarity(query, &doc.embedding),
                text: doc.content.clone(),
                source_id: doc.source_id.clone(),
                metadata: doc.metadata.clone(),
            })
            .collect();
        sort_retrieval_results(&mut scored);
        scored.truncate(k);
        Ok(scored)
    }

    async fn install(&self, collection: &str, documents: Vec<InstallDocument>) -> Result<()> {
        let mut collections = self
            .collections
            .lock()
            .map_err(|_| ProviderError::Retriever("lock poisoned".to_string()))?;
        collections.insert(collection.to_string(), documents);
        Ok(())
    }
}
