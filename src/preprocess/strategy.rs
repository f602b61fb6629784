//! Per-document chunking-strategy selection.
//!
//! Markdown structure takes the header splitter; code takes the recursive
//! splitter with code-aware separators; mixed documents and long prose
//! take the hybrid splitter. Chunk sizes target 500-1000 characters with
//! 10-20% overlap, scaled 1.2x for CJK-dense documents.

use super::analyzer::{DocStructure, DocumentAnalysis};
use crate::chunking::{ChunkStrategy, DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP, SplitOptions};
use crate::io::is_cjk_heavy;

/// Prose length above which plain documents switch to the hybrid
/// splitter.
const LONG_PROSE_CHARS: usize = 4000;

/// Chunk-size multiplier for character-dense (CJK) documents.
const CJK_SIZE_MULTIPLIER: f64 = 1.2;

/// Selects the chunking strategy for an analyzed document.
#[must_use]
pub fn select_strategy(analysis: &DocumentAnalysis, content: &str) -> ChunkStrategy {
    match analysis.structure {
        DocStructure::Markdown => {
            // Markdown with very long sections benefits from the hybrid
            // splitter's merging; plain markdown takes the header splitter.
            if has_oversized_sections(content) {
                ChunkStrategy::Hybrid
            } else {
                ChunkStrategy::MarkdownHeader
            }
        }
        DocStructure::Code => ChunkStrategy::RecursiveCharacter,
        DocStructure::Pdf => ChunkStrategy::RecursiveCharacter,
        DocStructure::Plain => {
            if content.chars().count() > LONG_PROSE_CHARS {
                ChunkStrategy::Hybrid
            } else {
                ChunkStrategy::RecursiveCharacter
            }
        }
    }
}

fn has_oversized_sections(content: &str) -> bool {
    crate::chunking::markdown::MarkdownSplitter::sections(content)
        .iter()
        .any(|section| section.chars().count() > DEFAULT_CHUNK_SIZE * 2)
}

/// Computes split options for an analyzed document, applying the CJK
/// multiplier where warranted.
#[must_use]
pub fn split_options(content: &str) -> SplitOptions {
    if is_cjk_heavy(content) {
        let size = (DEFAULT_CHUNK_SIZE as f64 * CJK_SIZE_MULTIPLIER) as usize;
        let overlap = (DEFAULT_OVERLAP as f64 * CJK_SIZE_MULTIPLIER) as usize;
        SplitOptions::new(size, overlap)
    } else {
        SplitOptions::new(DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP)
    }
}
