//! Persistent storage for Test-Smith.
//!
//! `SQLite`-backed persistence for workflow checkpoints and the
//! retriever's named collections. The [`CheckpointStore`] trait is the
//! seam the engine writes through; [`Database`] is the default
//! implementation of both concerns.

pub mod schema;
pub mod sqlite;
pub mod traits;

pub use sqlite::{Database, EmbeddedDocument, decode_embedding, encode_embedding};
pub use traits::{Checkpoint, CheckpointStore, InstallDocument, RunStatus};
