//! Workflow registry.
//!
//! Maintains the catalogue of named workflows. Registration happens
//! explicitly in the entry runner's startup path; nothing registers
//! itself at module load.

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use super::definition::WorkflowDefinition;
use crate::error::{EngineError, Result};

/// Listing entry for one registered workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkflowSummary {
    /// Workflow name.
    pub name: String,
    /// Human-readable description.
    pub description: String,
    /// Entry step name.
    pub entry: String,
    /// Number of steps in the graph.
    pub step_count: usize,
    /// Step names in sorted order.
    pub steps: Vec<String>,
}

/// Catalogue of named workflows.
#[derive(Default)]
pub struct WorkflowRegistry {
    workflows: RwLock<BTreeMap<String, Arc<WorkflowDefinition>>>,
}

impl WorkflowRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a validated workflow definition.
    ///
    /// Re-registering an identical definition is a no-op; a structurally
    /// different definition under the same name is a conflict.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::WorkflowConflict`] on a mismatched
    /// re-registration.
    pub fn register(&self, definition: WorkflowDefinition) -> Result<()> {
        let mut workflows = self
            .workflows
            .write()
            .map_err(|_| poisoned())?;
        if let Some(existing) = workflows.get(definition.name()) {
            if existing.fingerprint() == definition.fingerprint() {
                return Ok(());
            }
            return Err(EngineError::WorkflowConflict {
                name: definition.name().to_string(),
            }
            .into());
        }
        workflows.insert(definition.name().to_string(), Arc::new(definition));
        Ok(())
    }

    /// Looks up a workflow by name.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::WorkflowNotFound`] for unknown names.
    pub fn get(&self, name: &str) -> Result<Arc<WorkflowDefinition>> {
        let workflows = self.workflows.read().map_err(|_| poisoned())?;
        workflows.get(name).cloned().ok_or_else(|| {
            EngineError::WorkflowNotFound {
                name: name.to_string(),
            }
            .into()
        })
    }

    /// Lists registered workflows in name order.
    #[must_use]
    pub fn list(&self) -> Vec<WorkflowSummary> {
        let Ok(workflows) = self.workflows.read() else {
            return Vec::new();
        };
        workflows
            .values()
            .map(|def| WorkflowSummary {
                name: def.name().to_string(),
                description: def.description().to_string(),
                entry: def.entry().to_string(),
                step_count: def.step_count(),
                steps: def.step_names().map(ToString::to_string).collect(),
            })
            .collect()
    }

    /// Whether a workflow name is registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.workflows
            .read()
            .map(|workflows| workflows.contains_key(name))
            .unwrap_or(false)
    }
}

fn poisoned() -> crate::error::Error {
    crate::error::Error::InvalidState {
        message: "workflow registry lock poisoned".to_string(),
    }
}
