//! Per-field merge rules for workflow state.
//!
//! Each state field declares how step updates combine with the existing
//! value. Scalars overwrite; accumulating sequences append; union appends
//! while dropping exact duplicates. Deep merging is deliberately not
//! offered.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// How a step update combines with the existing field value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MergeRule {
    /// Replace the existing value.
    Overwrite,
    /// Concatenate onto the existing array; duplicates permitted.
    Append,
    /// Concatenate onto the existing array, dropping exact duplicates.
    Union,
}

/// Declares the fields of a workflow state and their merge rules.
///
/// Updates touching undeclared fields are rejected by the engine, so a
/// schema doubles as the state's write contract.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StateSchema {
    fields: BTreeMap<String, MergeRule>,
}

impl StateSchema {
    /// Creates an empty schema.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Declares a field with its merge rule. Builder-style.
    #[must_use]
    pub fn field(mut self, name: &str, rule: MergeRule) -> Self {
        self.fields.insert(name.to_string(), rule);
        self
    }

    /// Looks up the merge rule for a field.
    #[must_use]
    pub fn rule(&self, name: &str) -> Option<MergeRule> {
        self.fields.get(name).copied()
    }

    /// Whether the schema declares the field.
    #[must_use]
    pub fn declares(&self, name: &str) -> bool {
        self.fields.contains_key(name)
    }

    /// Iterates declared field names in sorted order.
    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().map(String::as_str)
    }

    /// Number of declared fields.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// Whether the schema declares no fields.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// Merges `update` into `existing` under the given rule.
///
/// For [`MergeRule::Append`] and [`MergeRule::Union`], a non-array update
/// value is treated as a single element; a missing existing value is
/// treated as an empty array. Append preserves insertion order, which keeps
/// concurrent-branch merges commutative up to the engine's deterministic
/// predecessor ordering.
#[must_use]
pub fn merge_value(rule: MergeRule, existing: Option<Value>, update: Value) -> Value {
    match rule {
        MergeRule::Overwrite => update,
        MergeRule::Append => {
            let mut items = as_array(existing);
            items.extend(as_array(Some(update)));
            Value::Array(items)
        }
        MergeRule::Union => {
            let mut items = as_array(existing);
            for candidate in as_array(Some(update)) {
                if !items.contains(&candidate) {
                    items.push(candidate);
                }
            }
            Value::Array(items)
        }
    }
}

fn as_array(value: Option<Value>) -> Vec<Value> {
    match value {
        None | Some(Value::Null) => Vec::new(),
        Some(Value::Array(items)) => items,
        Some(other) => vec![other],
    }
}
