//! Document analysis.
//!
//! Per-file structure and language detection plus a quality score built
//! from structural presence, paragraph lengths, alphabetic density, and
//! repeated-block absence. Low-quality files can be skipped before
//! chunking.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

use crate::io::{cjk_ratio, looks_binary};

/// Paragraph length range rewarded by the quality score.
const GOOD_PARAGRAPH_RANGE: std::ops::RangeInclusive<usize> = 80..=400;

/// Detected document structure.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocStructure {
    /// Markdown (headers, lists, links).
    Markdown,
    /// PDF container (not text-extractable here).
    Pdf,
    /// Plain prose.
    Plain,
    /// Source code.
    Code,
}

/// Analysis record for one source document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentAnalysis {
    /// Path relative to the scanned directory.
    pub source_path: String,
    /// Dominant language tag ("en", "zh", "unknown").
    pub language: String,
    /// Detected structure.
    pub structure: DocStructure,
    /// File size in bytes.
    pub size_bytes: u64,
    /// Quality score in [0, 1].
    pub quality_score: f64,
    /// Issues observed during analysis.
    pub detected_issues: Vec<String>,
    /// Strategy recommended for chunking.
    pub recommended_strategy: crate::chunking::ChunkStrategy,
}

const CODE_EXTENSIONS: &[&str] = &[
    "rs", "py", "js", "ts", "go", "java", "c", "cpp", "h", "rb",
];

fn structure_from_extension(path: &str) -> Option<DocStructure> {
    let extension = path.rsplit('.').next().unwrap_or_default().to_lowercase();
    match extension.as_str() {
        "md" | "markdown" => Some(DocStructure::Markdown),
        "pdf" => Some(DocStructure::Pdf),
        ext if CODE_EXTENSIONS.contains(&ext) => Some(DocStructure::Code),
        _ => None,
    }
}

fn structure_from_content(content: &str) -> DocStructure {
    let lines: Vec<&str> = content.lines().take(200).collect();
    if lines.is_empty() {
        return DocStructure::Plain;
    }
    let headers = lines
        .iter()
        .filter(|l| l.trim_start().starts_with('#'))
        .count();
    if headers >= 2 || content.contains("](") {
        return DocStructure::Markdown;
    }
    let code_markers = lines
        .iter()
        .filter(|l| {
            let t = l.trim();
            t.ends_with(';') || t.ends_with('{') || t.starts_with("fn ") || t.starts_with("def ")
        })
        .count();
    if code_markers * 100 / lines.len().max(1) > 30 {
        return DocStructure::Code;
    }
    DocStructure::Plain
}

fn detect_language(content: &str) -> String {
    if content.trim().is_empty() {
        return "unknown".to_string();
    }
    if cjk_ratio(content) >= 0.3 {
        return "zh".to_string();
    }
    let cyrillic = content
        .chars()
        .filter(|c| ('\u{0400}'..='\u{04FF}').contains(c))
        .count();
    let letters = content.chars().filter(|c| c.is_alphabetic()).count();
    if letters > 0 && cyrillic * 100 / letters > 30 {
        return "ru".to_string();
    }
    "en".to_string()
}

fn paragraphs(content: &str) -> Vec<&str> {
    content
        .split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .collect()
}

fn median_paragraph_length(content: &str) -> usize {
    let mut lengths: Vec<usize> = paragraphs(content)
        .iter()
        .map(|p| p.chars().count())
        .collect();
    if lengths.is_empty() {
        return 0;
    }
    lengths.sort_unstable();
    lengths[lengths.len() / 2]
}

fn alphabetic_ratio(content: &str) -> f64 {
    let total = content.chars().count();
    if total == 0 {
        return 0.0;
    }
    let alpha = content.chars().filter(|c| c.is_alphanumeric()).count();
    alpha as f64 / total as f64
}

/// Fraction of paragraphs that repeat within the document.
fn repeated_block_ratio(content: &str) -> f64 {
    let blocks = paragraphs(content);
    if blocks.is_empty() {
        return 0.0;
    }
    let mut counts: HashMap<&str, usize> = HashMap::new();
    for block in &blocks {
        *counts.entry(block).or_default() += 1;
    }
    let repeated: usize = counts
        .values()
        .filter(|&&count| count > 1)
        .map(|&count| count)
        .sum();
    repeated as f64 / blocks.len() as f64
}

/// Analyzes one document.
#[must_use]
pub fn analyze_document(source_path: &str, content: &str, size_bytes: u64) -> DocumentAnalysis {
    let mut issues = Vec::new();

    let structure = structure_from_extension(source_path)
        .unwrap_or_else(|| structure_from_content(content));

    let binary = structure == DocStructure::Pdf || looks_binary(content);
    if binary {
        issues.push("binary content not text-extractable".to_string());
    }

    let language = detect_language(content);

    let paragraph_count = paragraphs(content).len();
    let has_structure = structure == DocStructure::Markdown
        || structure == DocStructure::Code
        || paragraph_count >= 3;
    if !has_structure {
        issues.push("little document structure".to_string());
    }

    let median_len = median_paragraph_length(content);
    let paragraph_component = if GOOD_PARAGRAPH_RANGE.contains(&median_len) {
        1.0
    } else if median_len == 0 {
        0.0
    } else if median_len < *GOOD_PARAGRAPH_RANGE.start() {
        median_len as f64 / *GOOD_PARAGRAPH_RANGE.start() as f64
    } else {
        (*GOOD_PARAGRAPH_RANGE.end() as f64 / median_len as f64).max(0.3)
    };
    if median_len > 0 && median_len < 40 {
        issues.push("very short paragraphs".to_string());
    }

    let alpha = alphabetic_ratio(content);
    if alpha < 0.4 && !content.trim().is_empty() {
        issues.push("low alphabetic density".to_string());
    }

    let repeated = repeated_block_ratio(content);
    if repeated > 0.2 {
        issues.push("repeated blocks".to_string());
    }

    let quality_score = if binary {
        0.0
    } else {
        let structure_component = if has_structure { 1.0 } else { 0.0 };
        (0.25 * structure_component
            + 0.25 * paragraph_component
            + 0.3 * (alpha / 0.8).min(1.0)
            + 0.2 * (1.0 - repeated))
            .clamp(0.0, 1.0)
    };

    let analysis = DocumentAnalysis {
        source_path: source_path.to_string(),
        language,
        structure,
        size_bytes,
        quality_score,
        detected_issues: issues,
        recommended_strategy: crate::chunking::ChunkStrategy::RecursiveCharacter,
    };
    let recommended_strategy = super::strategy::select_strategy(&analysis, content);
    DocumentAnalysis {
        recommended_strategy,
        ..analysis
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chunking::ChunkStrategy;

    fn prose(paragraph: &str, count: usize) -> String {
        vec![paragraph; count].join("\n\n")
    }

    #[test]
    fn test_structure_by_extension() {
        assert_eq!(
            structure_from_extension("doc.md"),
            Some(DocStructure::Markdown)
        );
        assert_eq!(structure_from_extension("paper.pdf"), Some(DocStructure::Pdf));
        assert_eq!(structure_from_extension("main.rs"), Some(DocStructure::Code));
        assert_eq!(structure_from_extension("notes.txt"), None);
    }

    #[test]
    fn test_structure_by_content() {
        assert_eq!(
            structure_from_content("# One\ntext\n# Two\nmore"),
            DocStructure::Markdown
        );
        assert_eq!(
            structure_from_content("let x = 1;\nlet y = 2;\nlet z = 3;"),
            DocStructure::Code
        );
        assert_eq!(
            structure_from_content("just a plain paragraph of text"),
            DocStructure::Plain
        );
    }

    #[test]
    fn test_language_detection() {
        assert_eq!(detect_language("hello world text"), "en");
        assert_eq!(detect_language("这是一段中文文本内容测试"), "zh");
        assert_eq!(detect_language(""), "unknown");
    }

    #[test]
    fn test_good_prose_scores_high() {
        let paragraph = "This paragraph carries enough substance to land in the rewarded \
                         length range, with varied vocabulary and normal punctuation density \
                         throughout its sentences.";
        let content = prose(paragraph, 6);
        let analysis = analyze_document("notes.txt", &content, content.len() as u64);
        assert!(
            analysis.quality_score >= 0.5,
            "score {}",
            analysis.quality_score
        );
        assert!(analysis.detected_issues.is_empty());
    }

    #[test]
    fn test_repeated_blocks_penalized() {
        let content = prose("same short block repeated again and again across the doc", 20);
        let analysis = analyze_document("notes.txt", &content, content.len() as u64);
        assert!(analysis.detected_issues.iter().any(|i| i.contains("repeated")));
    }

    #[test]
    fn test_pdf_scores_zero() {
        let analysis = analyze_document("paper.pdf", "%PDF-1.4 binary...", 1000);
        assert_eq!(analysis.quality_score, 0.0);
        assert!(
            analysis
                .detected_issues
                .iter()
                .any(|i| i.contains("binary"))
        );
    }

    #[test]
    fn test_markdown_recommends_header_strategy() {
        let content = "# Title\n\nIntro paragraph with a sensible amount of text in it.\n\n\
                       ## Section\n\nMore body text follows here with detail.\n";
        let analysis = analyze_document("guide.md", content, content.len() as u64);
        assert_eq!(analysis.structure, DocStructure::Markdown);
        assert_eq!(analysis.recommended_strategy, ChunkStrategy::MarkdownHeader);
    }

    #[test]
    fn test_code_recommends_recursive() {
        let content = "fn main() {\n    println!(\"hi\");\n}\n";
        let analysis = analyze_document("main.rs", content, content.len() as u64);
        assert_eq!(analysis.structure, DocStructure::Code);
        assert_eq!(
            analysis.recommended_strategy,
            ChunkStrategy::RecursiveCharacter
        );
    }

    #[test]
    fn test_analysis_round_trips() {
        let analysis = analyze_document("doc.md", "# t\n\nbody\n", 12);
        let json = serde_json::to_string(&analysis).unwrap();
        let back: DocumentAnalysis = serde_json::from_str(&json).unwrap();
        assert_eq!(back, analysis);
    }
}
