//! Storage trait definitions.
//!
//! Defines the checkpoint-store seam consumed by the workflow engine and
//! the records it persists. The retriever seam lives in
//! [`crate::providers::retriever`]; both are served by the same `SQLite`
//! database in the default wiring.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::state::WorkflowState;

/// Terminal status recorded with a checkpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// The run is still progressing; `step` is the last completed step.
    Running,
    /// The run finished and `state` holds the final state.
    Completed,
    /// The run was cancelled; resume re-executes from `step`'s next edge.
    Cancelled,
}

/// A persisted snapshot of workflow state, written after each step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Checkpoint {
    /// Thread this checkpoint belongs to.
    pub thread_id: String,
    /// Workflow being executed.
    pub workflow: String,
    /// Name of the last completed step (or the start/end markers).
    pub step: String,
    /// Run status at write time.
    pub status: RunStatus,
    /// Full state snapshot.
    pub state: WorkflowState,
    /// Write timestamp.
    pub timestamp: DateTime<Utc>,
}

impl Checkpoint {
    /// Builds a running checkpoint for `step`.
    #[must_use]
    pub fn running(thread_id: &str, workflow: &str, step: &str, state: WorkflowState) -> Self {
        Self {
            thread_id: thread_id.to_string(),
            workflow: workflow.to_string(),
            step: step.to_string(),
            status: RunStatus::Running,
            state,
            timestamp: Utc::now(),
        }
    }
}

/// Persistent store of per-thread checkpoints.
///
/// Implementations must be safe for concurrent readers and guarantee a
/// single writer per `thread_id`. A write must be durable before the
/// engine schedules the next step.
pub trait CheckpointStore: Send + Sync {
    /// Appends a checkpoint for its thread.
    ///
    /// # Errors
    ///
    /// Returns an error if the write cannot be committed.
    fn save(&self, checkpoint: &Checkpoint) -> Result<()>;

    /// Loads the latest checkpoint for a thread, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn latest(&self, thread_id: &str) -> Result<Option<Checkpoint>>;

    /// Lists all checkpoints for a thread, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the read fails.
    fn list(&self, thread_id: &str) -> Result<Vec<Checkpoint>>;

    /// Prunes a terminated thread's history down to its latest checkpoint.
    ///
    /// # Errors
    ///
    /// Returns an error if deletion fails.
    fn prune(&self, thread_id: &str) -> Result<()>;

    /// Deletes every checkpoint for a thread.
    ///
    /// # Errors
    ///
    /// Returns an error if deletion fails.
    fn delete_thread(&self, thread_id: &str) -> Result<()>;
}

/// A chunk ready for installation into a retriever collection.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InstallDocument {
    /// Stable source identifier (used for citations).
    pub source_id: String,
    /// Display title, where one exists.
    pub title: Option<String>,
    /// Chunk text.
    pub content: String,
    /// Strong hash over normalized content.
    pub content_hash: String,
    /// Extensible metadata.
    pub metadata: std::collections::BTreeMap<String, String>,
    /// Embedding vector.
    pub embedding: Vec<f32>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_checkpoint_running_constructor() {
        let cp = Checkpoint::running("t1", "quick-research", "plan", WorkflowState::new());
        assert_eq!(cp.thread_id, "t1");
        assert_eq!(cp.workflow, "quick-research");
        assert_eq!(cp.step, "plan");
        assert_eq!(cp.status, RunStatus::Running);
    }

    #[test]
    fn test_checkpoint_round_trips() {
        let mut state = WorkflowState::new();
        state.set("query", serde_json::json!("q"));
        let cp = Checkpoint {
            thread_id: "t1".to_string(),
            workflow: "deep-research".to_string(),
            step: "analyze".to_string(),
            status: RunStatus::Completed,
            state,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&cp).unwrap();
        let back: Checkpoint = serde_json::from_str(&json).unwrap();
        assert_eq!(back, cp);
    }

    #[test]
    fn test_run_status_serialization() {
        assert_eq!(
            serde_json::to_string(&RunStatus::Cancelled).unwrap(),
            "\"cancelled\""
        );
    }
}
