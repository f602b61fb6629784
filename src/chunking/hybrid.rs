//! Hybrid splitting.
//!
//! Structure-first, size-second: markdown sections give the outer shape,
//! small adjacent sections merge up toward the target size, and oversized
//! sections fall through to the recursive prose splitter. The strategy of
//! choice for mixed documents and long prose.

use super::markdown::MarkdownSplitter;
use super::recursive::RecursiveSplitter;
use super::traits::{SplitOptions, Splitter};
use crate::error::Result;

/// Hybrid structure/size splitter.
pub struct HybridSplitter;

impl HybridSplitter {
    /// Creates the splitter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Default for HybridSplitter {
    fn default() -> Self {
        Self::new()
    }
}

impl Splitter for HybridSplitter {
    fn name(&self) -> &'static str {
        "hybrid"
    }

    fn split(&self, text: &str, options: &SplitOptions) -> Result<Vec<String>> {
        self.validate(options)?;
        let prose = RecursiveSplitter::prose();

        let mut chunks: Vec<String> = Vec::new();
        let mut pending = String::new();
        for section in MarkdownSplitter::sections(text) {
            let section_len = section.chars().count();
            let pending_len = pending.chars().count();

            if section_len > options.chunk_size {
                if !pending.trim().is_empty() {
                    chunks.push(std::mem::take(&mut pending));
                }
                chunks.extend(prose.split(&section, options)?);
            } else if pending_len + section_len > options.chunk_size {
                if !pending.trim().is_empty() {
                    chunks.push(std::mem::take(&mut pending));
                }
                pending = section;
            } else {
                pending.push_str(&section);
            }
        }
        if !pending.trim().is_empty() {
            chunks.push(pending);
        }
        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_small_sections_merge() {
        let text = "# A\none\n\n# B\ntwo\n\n# C\nthree\n";
        let splitter = HybridSplitter::new();
        let chunks = splitter.split(text, &SplitOptions::new(500, 50)).unwrap();
        assert_eq!(chunks.len(), 1);
        assert!(chunks[0].contains("# A"));
        assert!(chunks[0].contains("# C"));
    }

    #[test]
    fn test_merge_respects_size() {
        let a = format!("# A\n{}\n", "x".repeat(300));
        let b = format!("# B\n{}\n", "y".repeat(300));
        let text = format!("{a}{b}");
        let splitter = HybridSplitter::new();
        let chunks = splitter.split(&text, &SplitOptions::new(500, 50)).unwrap();
        assert_eq!(chunks.len(), 2);
    }

    #[test]
    fn test_oversized_section_recurses() {
        let text = format!("# Big\n{}", "sentence here. ".repeat(100));
        let splitter = HybridSplitter::new();
        let chunks = splitter.split(&text, &SplitOptions::new(300, 30)).unwrap();
        assert!(chunks.len() > 1);
    }

    #[test]
    fn test_plain_prose_without_headers() {
        let text = "paragraph one.\n\nparagraph two.\n\nparagraph three.\n";
        let splitter = HybridSplitter::new();
        let chunks = splitter.split(text, &SplitOptions::new(500, 50)).unwrap();
        assert_eq!(chunks.len(), 1);
    }

    #[test]
    fn test_name() {
        assert_eq!(HybridSplitter::new().name(), "hybrid");
    }
}
