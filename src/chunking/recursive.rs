//! Recursive character splitting.
//!
//! Splits on a cascade of separators, recursing into finer separators for
//! oversized pieces and merging small pieces back up to the target size
//! with overlap carried between consecutive chunks. The hard fallback
//! splits on grapheme boundaries, never inside one.

use unicode_segmentation::UnicodeSegmentation;

use super::traits::{SplitOptions, Splitter};
use crate::error::Result;

/// Separator cascade for prose: paragraphs, lines, sentences, words.
const PROSE_SEPARATORS: &[&str] = &["\n\n", "\n", ". ", " "];

/// Separator cascade for code: blank lines, function-ish boundaries,
/// lines, statements.
const CODE_SEPARATORS: &[&str] = &["\n\n", "\nfn ", "\ndef ", "\nclass ", "\nfunction ", "\n", "; ", " "];

/// Recursive character splitter.
pub struct RecursiveSplitter {
    separators: &'static [&'static str],
    name: &'static str,
}

impl RecursiveSplitter {
    /// Splitter with prose separators.
    #[must_use]
    pub const fn prose() -> Self {
        Self {
            separators: PROSE_SEPARATORS,
            name: "recursive-character",
        }
    }

    /// Splitter with code-aware separators.
    #[must_use]
    pub const fn code() -> Self {
        Self {
            separators: CODE_SEPARATORS,
            name: "recursive-character",
        }
    }

    /// Splits `text` into pieces no larger than `size`, recursing through
    /// the separator cascade.
    fn split_recursive(text: &str, separators: &[&str], size: usize) -> Vec<String> {
        if text.chars().count() <= size {
            return vec![text.to_string()];
        }
        let Some((separator, rest)) = separators.split_first() else {
            return hard_split(text, size);
        };
        if !text.contains(separator) {
            return Self::split_recursive(text, rest, size);
        }

        let mut pieces = Vec::new();
        for piece in text.split_inclusive(separator) {
            if piece.chars().count() > size {
                pieces.extend(Self::split_recursive(piece, rest, size));
            } else {
                pieces.push(piece.to_string());
            }
        }
        pieces
    }

    /// Merges pieces into chunks close to the target size, carrying the
    /// configured overlap from the tail of each chunk into the next.
    fn merge(pieces: Vec<String>, options: &SplitOptions) -> Vec<String> {
        let mut chunks: Vec<String> = Vec::new();
        let mut current = String::new();
        let mut current_len = 0usize;

        for piece in pieces {
            let piece_len = piece.chars().count();
            if current_len + piece_len > options.chunk_size && current_len > 0 {
                let tail = overlap_tail(&current, options.overlap);
                chunks.push(std::mem::take(&mut current));
                current = tail;
                current_len = current.chars().count();
            }
            current.push_str(&piece);
            current_len += piece_len;
        }
        if !current.trim().is_empty() {
            chunks.push(current);
        }
        chunks
    }
}

impl Splitter for RecursiveSplitter {
    fn name(&self) -> &'static str {
        self.name
    }

    fn split(&self, text: &str, options: &SplitOptions) -> Result<Vec<String>> {
        self.validate(options)?;
        if text.trim().is_empty() {
            return Ok(Vec::new());
        }
        let pieces = Self::split_recursive(text, self.separators, options.chunk_size);
        Ok(Self::merge(pieces, options))
    }
}

/// Grapheme-boundary hard split for text with no usable separators.
fn hard_split(text: &str, size: usize) -> Vec<String> {
    let graphemes: Vec<&str> = text.graphemes(true).collect();
    graphemes
        .chunks(size.max(1))
        .map(|chunk| chunk.concat())
        .collect()
}

/// The last `overlap` characters of a chunk, on grapheme boundaries.
fn overlap_tail(chunk: &str, overlap: usize) -> String {
    if overlap == 0 {
        return String::new();
    }
    let graphemes: Vec<&str> = chunk.graphemes(true).collect();
    let start = graphemes.len().saturating_sub(overlap);
    graphemes[start..].concat()
}
