//! The workflow state record.
//!
//! A [`WorkflowState`] is an ordered map of named fields over JSON values,
//! governed by a [`StateSchema`](super::StateSchema). Steps never mutate
//! state directly; they return a [`StateUpdate`] that the engine merges
//! according to each field's declared rule.

use std::collections::BTreeMap;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::merge::{StateSchema, merge_value};
use crate::error::{EngineError, Error, Result};

/// Well-known state field names shared by the workflow library.
pub mod keys {
    /// The original user query. Immutable for the thread's lifetime.
    pub const QUERY: &str = "query";
    /// Evaluator feedback threaded back into the planner.
    pub const FEEDBACK: &str = "feedback";
    /// The planner's current allocation plan.
    pub const ALLOCATION: &str = "allocation";
    /// Accumulated knowledge-base retrieval results.
    pub const RAG_RESULTS: &str = "rag_results";
    /// Accumulated web search results.
    pub const SEARCH_RESULTS: &str = "search_results";
    /// Accumulated analyzed notes.
    pub const NOTES: &str = "notes";
    /// Non-fatal gathering warnings (e.g. the web-search sentinel).
    pub const GATHER_WARNINGS: &str = "gather_warnings";
    /// The evaluator's latest verdict.
    pub const VERDICT: &str = "verdict";
    /// Planner/evaluator loop counter.
    pub const LOOP_COUNT: &str = "loop_count";
    /// Final report text.
    pub const REPORT: &str = "report";
    /// Investigation mode: "simple" or "hierarchical".
    pub const MODE: &str = "mode";
    /// The hierarchical master plan.
    pub const PLAN: &str = "plan";
    /// Pending subtask ids in execution order.
    pub const PENDING: &str = "pending";
    /// Id of the subtask currently in progress.
    pub const CURRENT_SUBTASK: &str = "current_subtask_id";
    /// Notes gathered for the current subtask (staging before save).
    pub const SUBTASK_NOTES: &str = "subtask_notes";
    /// Completed subtask results keyed by subtask id.
    pub const SUBTASK_RESULTS: &str = "subtask_results";
    /// The depth evaluator's latest assessment.
    pub const DEPTH_ASSESSMENT: &str = "depth_assessment";
    /// Plan revision counter.
    pub const REVISION_COUNT: &str = "revision_count";
    /// Total subtasks created so far (original + revisions + drill-down).
    pub const TOTAL_SUBTASKS: &str = "total_subtasks";
    /// Per-note evidence labels (fact-check).
    pub const EVIDENCE_LABELS: &str = "evidence_labels";
    /// Extracted comparison frame (comparative).
    pub const COMPARISON: &str = "comparison";
    /// Item-by-criterion matrix (comparative).
    pub const MATRIX: &str = "matrix";
    /// Structured issue description (causal-inference).
    pub const ISSUE: &str = "issue";
    /// Accumulated causal hypotheses.
    pub const HYPOTHESES: &str = "hypotheses";
    /// The built causal graph.
    pub const CAUSAL_GRAPH: &str = "causal_graph";
    /// Classified query intent (code-investigation).
    pub const INTENT: &str = "intent";
    /// Structured code findings.
    pub const CODE_FINDINGS: &str = "code_findings";
}

/// A typed, schema-governed record of named fields.
///
/// Field order is stable (sorted by name) so serialization is
/// deterministic and serialize/deserialize is the identity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkflowState {
    fields: BTreeMap<String, Value>,
}

impl WorkflowState {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Raw field access.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.fields.get(name)
    }

    /// Deserializes a field into a typed value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if the field is absent or does not
    /// deserialize into `T`.
    pub fn get_as<T: DeserializeOwned>(&self, name: &str) -> Result<T> {
        let value = self.fields.get(name).ok_or_else(|| Error::InvalidState {
            message: format!("missing state field: {name}"),
        })?;
        serde_json::from_value(value.clone()).map_err(|e| Error::InvalidState {
            message: format!("state field {name} has unexpected shape: {e}"),
        })
    }

    /// Deserializes a field, returning `None` when absent or null.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidState`] if a present field does not
    /// deserialize into `T`.
    pub fn get_opt<T: DeserializeOwned>(&self, name: &str) -> Result<Option<T>> {
        match self.fields.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => serde_json::from_value(value.clone())
                .map(Some)
                .map_err(|e| Error::InvalidState {
                    message: format!("state field {name} has unexpected shape: {e}"),
                }),
        }
    }

    /// Reads a counter field, treating absence as zero.
    #[must_use]
    pub fn counter(&self, name: &str) -> u64 {
        self.fields
            .get(name)
            .and_then(Value::as_u64)
            .unwrap_or_default()
    }

    /// Reads a string field, treating absence as empty.
    #[must_use]
    pub fn text(&self, name: &str) -> &str {
        self.fields
            .get(name)
            .and_then(Value::as_str)
            .unwrap_or_default()
    }

    /// Sets a field directly. Used for initial-state construction; steps
    /// communicate through [`StateUpdate`] instead.
    pub fn set(&mut self, name: &str, value: Value) {
        self.fields.insert(name.to_string(), value);
    }

    /// Serializes `value` into a field.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if `value` cannot be encoded.
    pub fn set_json<T: Serialize>(&mut self, name: &str, value: &T) -> Result<()> {
        self.fields
            .insert(name.to_string(), serde_json::to_value(value)?);
        Ok(())
    }

    /// Applies a step's update under the schema's merge rules.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::UndeclaredField`] if the update touches a
    /// field the schema does not declare.
    pub fn apply(&mut self, schema: &StateSchema, step: &str, update: StateUpdate) -> Result<()> {
        for (name, value) in update.entries {
            let Some(rule) = schema.rule(&name) else {
                return Err(EngineError::UndeclaredField {
                    step: step.to_string(),
                    field: name,
                }
                .into());
            };
            let existing = self.fields.remove(&name);
            self.fields.insert(name, merge_value(rule, existing, value));
        }
        Ok(())
    }

    /// Number of populated fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether no fields are populated.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A partial state update produced by one step activation.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StateUpdate {
    entries: BTreeMap<String, Value>,
}

impl StateUpdate {
    /// Creates an empty update (a valid no-op contribution to fan-in).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets a raw field value. Builder-style.
    #[must_use]
    pub fn with(mut self, name: &str, value: Value) -> Self {
        self.entries.insert(name.to_string(), value);
        self
    }

    /// Serializes `value` into a field. Builder-style.
    ///
    /// # Errors
    ///
    /// Returns a serialization error if `value` cannot be encoded.
    pub fn with_json<T: Serialize>(mut self, name: &str, value: &T) -> Result<Self> {
        self.entries
            .insert(name.to_string(), serde_json::to_value(value)?);
        Ok(self)
    }

    /// Whether the update carries no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Field names touched by this update, in sorted order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.entries.keys().map(String::as_str)
    }
}
