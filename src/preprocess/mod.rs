//! The document preprocessing pipeline.
//!
//! Transforms a directory of source files into clean chunks ready for the
//! retriever: per-document quality analysis, strategy selection,
//! chunking, exact and near-duplicate removal, boilerplate stripping, and
//! a quality report. Installation embeds the survivors in batches and
//! writes them to a staging collection that is swapped in atomically.

pub mod analyzer;
pub mod boilerplate;
pub mod dedup;
pub mod metrics;
pub mod strategy;

use std::collections::BTreeMap;
use std::path::Path;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

pub use analyzer::{DocStructure, DocumentAnalysis, analyze_document};
pub use dedup::{NEAR_DUPLICATE_THRESHOLD, content_hash};
pub use metrics::{CorpusReport, QualityLabel, SizeBuckets};

use crate::chunking::{ChunkStrategy, splitter_for};
use crate::error::{PreprocessError, Result};
use crate::io::{read_file, walk_directory};
use crate::providers::{Embedder, Retriever};
use crate::storage::InstallDocument;

/// Chunks larger than this multiple of the target size violate the
/// pipeline's length bound.
const MAX_CHUNK_FACTOR: usize = 3;

/// A cleaned chunk ready for installation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CleanChunk {
    /// Chunk text.
    pub content: String,
    /// Source file path, relative to the scanned directory.
    pub source_path: String,
    /// Strategy that produced the chunk.
    pub strategy_used: ChunkStrategy,
    /// Quality score inherited from the source document.
    pub quality_score: f64,
    /// Strong hash over normalized content.
    pub content_hash: String,
    /// Index within the source document.
    pub index: usize,
}

/// Pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineOptions {
    /// Documents below this quality score are skipped when
    /// `skip_low_quality` is set.
    pub min_quality_score: f64,
    /// Whether to skip low-quality documents.
    pub skip_low_quality: bool,
    /// Chunks shorter than this are dropped.
    pub min_content_length: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            min_quality_score: 0.5,
            skip_low_quality: true,
            min_content_length: 100,
        }
    }
}

/// Everything the pipeline produced for one directory.
#[derive(Debug, Clone)]
pub struct PipelineOutput {
    /// Clean chunks in deterministic order.
    pub chunks: Vec<CleanChunk>,
    /// Per-document analyses (including skipped documents).
    pub analyses: Vec<DocumentAnalysis>,
    /// The corpus quality report.
    pub report: CorpusReport,
}

/// The preprocessing pipeline.
pub struct Pipeline {
    options: PipelineOptions,
}

impl Pipeline {
    /// Creates a pipeline with the given options.
    #[must_use]
    pub const fn new(options: PipelineOptions) -> Self {
        Self { options }
    }

    /// Runs the full pipeline over a directory.
    ///
    /// Deterministic per source: re-running on the same directory yields
    /// an identical chunk set.
    ///
    /// # Errors
    ///
    /// Returns [`PreprocessError::EmptySource`] for directories without
    /// processable files and [`PreprocessError::DataIntegrity`] when the
    /// final verification finds duplicate hashes or an oversized chunk.
    pub fn run(&self, dir: &Path) -> Result<PipelineOutput> {
        let files = walk_directory(dir)?;
        if files.is_empty() {
            return Err(PreprocessError::EmptySource {
                path: dir.display().to_string(),
            }
            .into());
        }

        let sources = files
            .par_iter()
            .map(|path| read_file(dir, path))
            .collect::<Result<Vec<_>>>()?;

        // Phase 1: per-document analysis.
        let analyses: Vec<DocumentAnalysis> = sources
            .par_iter()
            .map(|source| {
                analyze_document(&source.relative_path, &source.content, source.size_bytes)
            })
            .collect();

        let mut documents_skipped = 0usize;
        let processable: Vec<(&crate::io::SourceFile, &DocumentAnalysis)> = sources
            .iter()
            .zip(&analyses)
            .filter(|(_, analysis)| {
                let keep = !self.options.skip_low_quality
                    || analysis.quality_score >= self.options.min_quality_score;
                if !keep {
                    documents_skipped += 1;
                    tracing::debug!(
                        path = %analysis.source_path,
                        score = analysis.quality_score,
                        "skipping low-quality document"
                    );
                }
                keep
            })
            .collect();

        // Phases 2-3: strategy selection and chunking.
        let min_len = self.options.min_content_length;
        let per_document = processable
            .par_iter()
            .map(|(source, analysis)| {
                let options = strategy::split_options(&source.content);
                let splitter = splitter_for(
                    analysis.recommended_strategy,
                    analysis.structure == DocStructure::Code,
                );
                let segments = splitter.split(&source.content, &options)?;

                let mut chunks = Vec::new();
                let mut dropped = 0usize;
                for (index, segment) in segments.into_iter().enumerate() {
                    let length = segment.chars().count();
                    if length < min_len {
                        dropped += 1;
                        continue;
                    }
                    if length > options.chunk_size * MAX_CHUNK_FACTOR {
                        return Err(PreprocessError::DataIntegrity {
                            reason: format!(
                                "chunk {index} of {} exceeds length bound ({length} chars)",
                                analysis.source_path
                            ),
                        }
                        .into());
                    }
                    chunks.push(CleanChunk {
                        content_hash: content_hash(&segment),
                        content: segment,
                        source_path: analysis.source_path.clone(),
                        strategy_used: analysis.recommended_strategy,
                        quality_score: analysis.quality_score,
                        index,
                    });
                }
                Ok((chunks, dropped))
            })
            .collect::<Result<Vec<_>>>()?;

        let mut chunks = Vec::new();
        let mut dropped_short = 0usize;
        for (document_chunks, dropped) in per_document {
            chunks.extend(document_chunks);
            dropped_short += dropped;
        }

        // Phase 4: exact deduplication.
        let (chunks, exact_removed) = dedup::dedup_exact(chunks);

        // Phase 5: near-duplicate removal.
        let (chunks, near_removed) = dedup::dedup_near(chunks);

        // Phase 6: boilerplate stripping, then re-hash and re-verify.
        let (mut chunks, boilerplate_stripped) = boilerplate::strip_boilerplate(chunks);
        if boilerplate_stripped > 0 {
            for chunk in &mut chunks {
                chunk.content_hash = content_hash(&chunk.content);
            }
            let before = chunks.len();
            chunks.retain(|chunk| chunk.content.chars().count() >= min_len);
            dropped_short += before - chunks.len();
        }
        verify_integrity(&chunks)?;

        // Phase 7: quality metrics.
        let report = metrics::compute_report(
            &chunks,
            analyses.len(),
            documents_skipped,
            dropped_short,
            exact_removed,
            near_removed,
            boilerplate_stripped,
        );
        tracing::info!(
            chunks = chunks.len(),
            exact_removed,
            near_removed,
            "preprocessing complete"
        );

        Ok(PipelineOutput {
            chunks,
            analyses,
            report,
        })
    }
}

/// Final integrity verification: unique hashes across the corpus.
fn verify_integrity(chunks: &[CleanChunk]) -> Result<()> {
    let mut seen = std::collections::BTreeSet::new();
    for chunk in chunks {
        if !seen.insert(chunk.content_hash.as_str()) {
            return Err(PreprocessError::DataIntegrity {
                reason: format!(
                    "duplicate content hash after deduplication: {}",
                    chunk.content_hash
                ),
            }
            .into());
        }
    }
    Ok(())
}

/// Embeds texts in batches, halving and retrying once on failure.
///
/// # Errors
///
/// Returns [`crate::error::ProviderError::EmbeddingBatchFailure`] when a
/// halved batch fails again.
pub async fn embed_batched(
    embedder: &dyn Embedder,
    texts: &[String],
    batch_size: usize,
) -> Result<Vec<Vec<f32>>> {
    let mut embeddings = Vec::with_capacity(texts.len());
    for batch in texts.chunks(batch_size.max(1)) {
        match embedder.embed_batch(batch).await {
            Ok(batch_embeddings) => embeddings.extend(batch_embeddings),
            Err(first_err) => {
                tracing::warn!(
                    batch_size = batch.len(),
                    error = %first_err,
                    "embedding batch failed, retrying halved"
                );
                let half = (batch.len() / 2).max(1);
                for sub in batch.chunks(half) {
                    match embedder.embed_batch(sub).await {
                        Ok(sub_embeddings) => embeddings.extend(sub_embeddings),
                        Err(second_err) => {
                            return Err(crate::error::ProviderError::EmbeddingBatchFailure {
                                reason: second_err.to_string(),
                                batch_size: sub.len(),
                            }
                            .into());
                        }
                    }
                }
            }
        }
    }
    Ok(embeddings)
}

/// Embeds and installs pipeline output into a retriever collection.
///
/// The write goes through a staging collection that replaces the target
/// atomically; a failed install leaves the previous contents untouched.
///
/// # Errors
///
/// Returns an error on embedding or storage failure.
pub async fn install(
    output: &PipelineOutput,
    embedder: &dyn Embedder,
    retriever: &dyn Retriever,
    collection: &str,
    batch_size: usize,
) -> Result<usize> {
    let texts: Vec<String> = output.chunks.iter().map(|c| c.content.clone()).collect();
    let embeddings = embed_batched(embedder, &texts, batch_size).await?;

    let documents: Vec<InstallDocument> = output
        .chunks
        .iter()
        .zip(embeddings)
        .map(|(chunk, embedding)| {
            let mut metadata = BTreeMap::new();
            metadata.insert("path".to_string(), chunk.source_path.clone());
            metadata.insert(
                "strategy".to_string(),
                chunk.strategy_used.as_str().to_string(),
            );
            metadata.insert("quality".to_string(), format!("{:.2}", chunk.quality_score));
            InstallDocument {
                source_id: format!("{}#{}", chunk.source_path, chunk.index),
                title: Some(chunk.source_path.clone()),
                content: chunk.content.clone(),
                content_hash: chunk.content_hash.clone(),
                metadata,
                embedding,
            }
        })
        .collect();

    let installed = documents.len();
    retriever.install(collection, documents).await?;
    tracing::info!(collection, installed, "chunks installed");
    Ok(installed)
}
