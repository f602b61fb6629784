//! Boilerplate removal.
//!
//! Detects blocks repeated across distinct sources (three or more
//! occurrences, at least forty characters) and strips them from every
//! chunk. Stripping runs after deduplication, so hashes are recomputed by
//! the pipeline afterwards.

use std::collections::{BTreeMap, BTreeSet};

use super::CleanChunk;
use crate::io::normalize_for_hash;

/// Minimum occurrences across the corpus for a block to count as
/// boilerplate.
pub const MIN_OCCURRENCES: usize = 3;
/// Minimum sources a boilerplate block must appear in.
pub const MIN_SOURCES: usize = 2;
/// Minimum block length in characters.
pub const MIN_BLOCK_LEN: usize = 40;

/// Splits chunk content into candidate blocks (paragraphs and lines).
fn blocks(content: &str) -> Vec<&str> {
    content
        .split("\n\n")
        .flat_map(|paragraph| {
            if paragraph.contains('\n') && paragraph.chars().count() > 200 {
                paragraph.lines().collect::<Vec<_>>()
            } else {
                vec![paragraph]
            }
        })
        .map(str::trim)
        .filter(|block| !block.is_empty())
        .collect()
}

/// Finds boilerplate blocks: normalized text repeated across the corpus.
#[must_use]
pub fn detect_boilerplate(chunks: &[CleanChunk]) -> BTreeSet<String> {
    let mut occurrences: BTreeMap<String, (usize, BTreeSet<&str>)> = BTreeMap::new();
    for chunk in chunks {
        for block in blocks(&chunk.content) {
            if block.chars().count() < MIN_BLOCK_LEN {
                continue;
            }
            let normalized = normalize_for_hash(block);
            let entry = occurrences.entry(normalized).or_default();
            entry.0 += 1;
            entry.1.insert(chunk.source_path.as_str());
        }
    }
    occurrences
        .into_iter()
        .filter(|(_, (count, sources))| *count >= MIN_OCCURRENCES && sources.len() >= MIN_SOURCES)
        .map(|(block, _)| block)
        .collect()
}

/// Strips boilerplate blocks from every chunk. Returns the cleaned chunks
/// and how many blocks were stripped in total.
#[must_use]
pub fn strip_boilerplate(chunks: Vec<CleanChunk>) -> (Vec<CleanChunk>, usize) {
    let boilerplate = detect_boilerplate(&chunks);
    if boilerplate.is_empty() {
        return (chunks, 0);
    }

    let mut stripped_total = 0usize;
    let cleaned = chunks
        .into_iter()
        .map(|mut chunk| {
            let kept: Vec<&str> = blocks(&chunk.content)
                .into_iter()
                .filter(|block| {
                    let is_boilerplate = boilerplate.contains(&normalize_for_hash(block));
                    if is_boilerplate {
                        stripped_total += 1;
                    }
                    !is_boilerplate
                })
                .collect();
            chunk.content = kept.join("\n\n");
            chunk
        })
        .collect();
    (cleaned, stripped_total)
}
