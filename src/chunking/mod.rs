//! Chunking strategies for the preprocessing pipeline.
//!
//! This module provides a trait-based system for splitting document text
//! into retrievable segments. Three strategies are available:
//!
//! - **Recursive-character**: separator-cascade splitting with overlap
//!   (code-aware separator set for source files)
//! - **Markdown-header**: header-delimited sections, recursing for
//!   oversized ones
//! - **Hybrid**: markdown structure with small-section merging, for mixed
//!   documents and long prose

pub mod hybrid;
pub mod markdown;
pub mod recursive;
pub mod traits;

use serde::{Deserialize, Serialize};

pub use hybrid::HybridSplitter;
pub use markdown::MarkdownSplitter;
pub use recursive::RecursiveSplitter;
pub use traits::{SplitOptions, Splitter};

/// Default chunk size in characters (spec target range 500-1000).
pub const DEFAULT_CHUNK_SIZE: usize = 800;

/// Default overlap size in characters (15% of the default chunk size).
pub const DEFAULT_OVERLAP: usize = 120;

/// The available chunking strategies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChunkStrategy {
    /// Separator-cascade splitting.
    RecursiveCharacter,
    /// Header-delimited sections.
    MarkdownHeader,
    /// Structure-first with small-section merging.
    Hybrid,
}

impl ChunkStrategy {
    /// Strategy name as recorded on chunks.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RecursiveCharacter => "recursive-character",
            Self::MarkdownHeader => "markdown-header",
            Self::Hybrid => "hybrid",
        }
    }
}

/// Creates the splitter for a strategy. `code_aware` switches the
/// recursive splitter to code separators.
#[must_use]
pub fn splitter_for(strategy: ChunkStrategy, code_aware: bool) -> Box<dyn Splitter> {
    match strategy {
        ChunkStrategy::RecursiveCharacter => {
            if code_aware {
                Box::new(RecursiveSplitter::code())
            } else {
                Box::new(RecursiveSplitter::prose())
            }
        }
        ChunkStrategy::MarkdownHeader => Box::new(MarkdownSplitter::new()),
        ChunkStrategy::Hybrid => Box::new(HybridSplitter::new()),
    }
}
