//! File I/O for the preprocessing pipeline.
//!
//! Directory walking, size-aware document reading, and unicode helpers.

pub mod reader;
pub mod unicode;

pub use reader::{SourceFile, looks_binary, read_file, walk_directory};
pub use unicode::{cjk_ratio, grapheme_truncate, is_cjk, is_cjk_heavy, normalize_for_hash};
