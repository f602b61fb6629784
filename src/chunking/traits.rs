//! Splitter trait definition.
//!
//! Defines the interface for all chunking strategies, enabling pluggable
//! text segmentation in the preprocessing pipeline.

use crate::error::{PreprocessError, Result};

/// Options controlling a split.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SplitOptions {
    /// Target chunk size in characters.
    pub chunk_size: usize,
    /// Overlap between consecutive chunks in characters.
    pub overlap: usize,
}

impl SplitOptions {
    /// Creates options with the given size and overlap.
    #[must_use]
    pub const fn new(chunk_size: usize, overlap: usize) -> Self {
        Self {
            chunk_size,
            overlap,
        }
    }
}

impl Default for SplitOptions {
    fn default() -> Self {
        Self {
            chunk_size: super::DEFAULT_CHUNK_SIZE,
            overlap: super::DEFAULT_OVERLAP,
        }
    }
}

/// Trait for splitting text into processable segments.
///
/// Implementations must be `Send + Sync` to support parallel processing
/// across documents, and must produce deterministic output for the same
/// input.
pub trait Splitter: Send + Sync {
    /// Returns the name of the chunking strategy.
    fn name(&self) -> &'static str;

    /// Splits the input text into segments.
    ///
    /// # Errors
    ///
    /// Returns an error for invalid options.
    fn split(&self, text: &str, options: &SplitOptions) -> Result<Vec<String>>;

    /// Validates options before splitting.
    ///
    /// # Errors
    ///
    /// Returns an error if chunk size is zero or overlap reaches chunk
    /// size.
    fn validate(&self, options: &SplitOptions) -> Result<()> {
        if options.chunk_size == 0 {
            return Err(PreprocessError::InvalidConfig {
                reason: "chunk_size must be > 0".to_string(),
            }
            .into());
        }
        if options.overlap >= options.chunk_size {
            return Err(PreprocessError::OverlapTooLarge {
                overlap: options.overlap,
                size: options.chunk_size,
            }
            .into());
        }
        Ok(())
    }
}
