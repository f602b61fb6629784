//! Markdown header splitting.
//!
//! Splits a document at its headers so each chunk stays within one
//! section, recursing into the prose splitter for sections larger than
//! the target size. Header lines stay attached to their section's first
//! chunk.

use super::recursive::RecursiveSplitter;
use super::traits::{SplitOptions, Splitter};
use crate::error::Result;

/// Markdown header-based splitter.
pub struct MarkdownSplitter;

impl MarkdownSplitter {
    /// Creates the splitter.
    #[must_use]
    pub const fn new() -> Self {
        Self
    }

    /// Splits text into header-delimited sections, header included.
    pub(crate) fn sections(text: &str) -> Vec<String> {
        let mut sections: Vec<String> = Vec::new();
        let mut current = String::new();
        for line in text.split_inclusive('\n') {
            if is_header(line) && !current.trim().is_empty() {
                sections.push(std::mem::take(&mut current));
            }
            current.push_str(line);
        }
        if !current.trim().is_empty() {
            sections.push(current);
        }
        sections
    }
}

impl Default for MarkdownSplitter {
    fn default() -> Self {
        Self::new()
    }
}

fn is_header(line: &str) -> bool {
    let trimmed = line.trim_start();
    let hashes = trimmed.chars().take_while(|&c| c == '#').count();
    (1..=6).contains(&hashes) && trimmed.chars().nth(hashes).is_some_and(char::is_whitespace)
}

impl Splitter for MarkdownSplitter {
    fn name(&self) -> &'static str {
        "markdown-header"
    }

    fn split(&self, text: &str, options: &SplitOptions) -> Result<Vec<String>> {
        self.validate(options)?;
        let prose = RecursiveSplitter::prose();
        let mut chunks = Vec::new();
        for section in Self::sections(text) {
            if section.chars().count() <= options.chunk_size {
                chunks.push(section);
            } else {
                chunks.extend(prose.split(&section, options)?);
            }
        }
        Ok(chunks)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sections_split_at_headers() {
        let text = "# One\nalpha\n\n## Two\nbeta\n\n# Three\ngamma\n";
        let sections = MarkdownSplitter::sections(text);
        assert_eq!(sections.len(), 3);
        assert!(sections[0].starts_with("# One"));
        assert!(sections[1].starts_with("## Two"));
        assert!(sections[2].starts_with("# Three"));
    }

    #[test]
    fn test_preamble_kept_before_first_header() {
        let text = "intro text\n\n# First\nbody\n";
        let sections = MarkdownSplitter::sections(text);
        assert_eq!(sections.len(), 2);
        assert!(sections[0].starts_with("intro"));
    }

    #[test]
    fn test_is_header_rules() {
        assert!(is_header("# Title\n"));
        assert!(is_header("###### Deep\n"));
        assert!(!is_header("####### Too deep\n"));
        assert!(!is_header("#hashtag\n"));
        assert!(!is_header("plain line\n"));
    }

    #[test]
    fn test_small_sections_stay_whole() {
        let text = "# One\nshort\n\n# Two\nalso short\n";
        let splitter = MarkdownSplitter::new();
        let chunks = splitter.split(text, &SplitOptions::new(500, 50)).unwrap();
        assert_eq!(chunks.len(), 2);
        assert!(chunks[0].contains("# One"));
    }

    #[test]
    fn test_oversized_section_recurses() {
        let text = format!("# Big\n{}", "paragraph text. ".repeat(100));
        let splitter = MarkdownSplitter::new();
        let chunks = splitter.split(&text, &SplitOptions::new(200, 20)).unwrap();
        assert!(chunks.len() > 1);
        assert!(chunks[0].contains("# Big"));
    }

    #[test]
    fn test_name() {
        assert_eq!(MarkdownSplitter::new().name(), "markdown-header");
    }
}
