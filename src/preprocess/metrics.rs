//! Corpus quality metrics.
//!
//! Computes the post-pipeline quality report: size statistics,
//! duplication rate, vocabulary diversity, size-bucket distribution, and
//! an overall label from their weighted combination. Emitted both
//! machine-readable (serde) and human-readable.

use std::collections::BTreeSet;
use std::fmt::Write;

use serde::{Deserialize, Serialize};

use super::CleanChunk;

/// Size-bucket distribution of chunk lengths in characters.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SizeBuckets {
    /// Under 200 characters.
    pub very_small: usize,
    /// 200 to 499.
    pub small: usize,
    /// 500 to 999.
    pub medium: usize,
    /// 1000 to 1999.
    pub large: usize,
    /// 2000 and above.
    pub very_large: usize,
}

impl SizeBuckets {
    fn add(&mut self, size: usize) {
        match size {
            0..=199 => self.very_small += 1,
            200..=499 => self.small += 1,
            500..=999 => self.medium += 1,
            1000..=1999 => self.large += 1,
            _ => self.very_large += 1,
        }
    }
}

/// Overall corpus quality label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QualityLabel {
    /// Combined score below 0.4.
    Poor,
    /// Combined score in [0.4, 0.6).
    Fair,
    /// Combined score in [0.6, 0.8).
    Good,
    /// Combined score of 0.8 and above.
    Excellent,
}

impl QualityLabel {
    fn from_score(score: f64) -> Self {
        if score >= 0.8 {
            Self::Excellent
        } else if score >= 0.6 {
            Self::Good
        } else if score >= 0.4 {
            Self::Fair
        } else {
            Self::Poor
        }
    }

    const fn as_str(self) -> &'static str {
        match self {
            Self::Poor => "poor",
            Self::Fair => "fair",
            Self::Good => "good",
            Self::Excellent => "excellent",
        }
    }
}

/// The machine-readable corpus report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorpusReport {
    /// Chunks surviving the full pipeline.
    pub chunk_count: usize,
    /// Documents analyzed.
    pub document_count: usize,
    /// Documents skipped for low quality.
    pub documents_skipped: usize,
    /// Chunks dropped for being under the length floor.
    pub dropped_short: usize,
    /// Exact duplicates removed.
    pub exact_duplicates_removed: usize,
    /// Near-duplicates removed.
    pub near_duplicates_removed: usize,
    /// Boilerplate blocks stripped.
    pub boilerplate_blocks_stripped: usize,
    /// Median chunk size in characters.
    pub median_chunk_size: usize,
    /// Mean chunk size in characters.
    pub mean_chunk_size: usize,
    /// Fraction of pre-dedup chunks that were duplicates.
    pub duplication_rate: f64,
    /// Unique tokens over total tokens.
    pub vocabulary_diversity: f64,
    /// Size-bucket distribution.
    pub size_buckets: SizeBuckets,
    /// Mean document quality score carried onto chunks.
    pub mean_quality_score: f64,
    /// Overall label from the weighted combination.
    pub quality_label: QualityLabel,
}

/// Computes the corpus report for the surviving chunks.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn compute_report(
    chunks: &[CleanChunk],
    document_count: usize,
    documents_skipped: usize,
    dropped_short: usize,
    exact_duplicates_removed: usize,
    near_duplicates_removed: usize,
    boilerplate_blocks_stripped: usize,
) -> CorpusReport {
    let mut sizes: Vec<usize> = chunks.iter().map(|c| c.content.chars().count()).collect();
    sizes.sort_unstable();

    let median_chunk_size = if sizes.is_empty() {
        0
    } else {
        sizes[sizes.len() / 2]
    };
    let mean_chunk_size = if sizes.is_empty() {
        0
    } else {
        sizes.iter().sum::<usize>() / sizes.len()
    };

    let mut buckets = SizeBuckets::default();
    for &size in &sizes {
        buckets.add(size);
    }

    let pre_dedup = chunks.len() + exact_duplicates_removed + near_duplicates_removed;
    let duplication_rate = if pre_dedup == 0 {
        0.0
    } else {
        (exact_duplicates_removed + near_duplicates_removed) as f64 / pre_dedup as f64
    };

    let mut unique_tokens: BTreeSet<String> = BTreeSet::new();
    let mut total_tokens = 0usize;
    for chunk in chunks {
        for token in chunk.content.split_whitespace() {
            total_tokens += 1;
            unique_tokens.insert(token.to_lowercase());
        }
    }
    let vocabulary_diversity = if total_tokens == 0 {
        0.0
    } else {
        unique_tokens.len() as f64 / total_tokens as f64
    };

    let mean_quality_score = if chunks.is_empty() {
        0.0
    } else {
        chunks.iter().map(|c| c.quality_score).sum::<f64>() / chunks.len() as f64
    };

    // Weighted combination: target-sized chunks, low duplication, varied
    // vocabulary, and good source documents.
    let sized_fraction = if sizes.is_empty() {
        0.0
    } else {
        sizes
            .iter()
            .filter(|&&size| (200..=2000).contains(&size))
            .count() as f64
            / sizes.len() as f64
    };
    let score = 0.3 * sized_fraction
        + 0.25 * (1.0 - duplication_rate)
        + 0.2 * (vocabulary_diversity * 4.0).min(1.0)
        + 0.25 * mean_quality_score;

    CorpusReport {
        chunk_count: chunks.len(),
        document_count,
        documents_skipped,
        dropped_short,
        exact_duplicates_removed,
        near_duplicates_removed,
        boilerplate_blocks_stripped,
        median_chunk_size,
        mean_chunk_size,
        duplication_rate,
        vocabulary_diversity,
        size_buckets: buckets,
        mean_quality_score,
        quality_label: QualityLabel::from_score(score),
    }
}

impl CorpusReport {
    /// Renders the human-readable report.
    #[must_use]
    pub fn render(&self) -> String {
        let mut out = String::from("Preprocessing quality report\n");
        let _ = writeln!(out, "{}", "=".repeat(28));
        let _ = writeln!(
            out,
            "Documents: {} analyzed, {} skipped",
            self.document_count, self.documents_skipped
        );
        let _ = writeln!(out, "Chunks installed: {}", self.chunk_count);
        let _ = writeln!(
            out,
            "Removed: {} exact duplicates, {} near-duplicates, {} short chunks",
            self.exact_duplicates_removed, self.near_duplicates_removed, self.dropped_short
        );
        let _ = writeln!(
            out,
            "Boilerplate blocks stripped: {}",
            self.boilerplate_blocks_stripped
        );
        let _ = writeln!(
            out,
            "Chunk size: median {}, mean {}",
            self.median_chunk_size, self.mean_chunk_size
        );
        let _ = writeln!(
            out,
            "Size buckets: very_small {} | small {} | medium {} | large {} | very_large {}",
            self.size_buckets.very_small,
            self.size_buckets.small,
            self.size_buckets.medium,
            self.size_buckets.large,
            self.size_buckets.very_large
        );
        let _ = writeln!(out, "Duplication rate: {:.1}%", self.duplication_rate * 100.0);
        let _ = writeln!(
            out,
            "Vocabulary diversity: {:.3}",
            self.vocabulary_diversity
        );
        let _ = writeln!(out, "Overall quality: {}", self.quality_label.as_str());
        out
    }
}
