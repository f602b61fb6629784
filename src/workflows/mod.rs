//! The registered workflows.
//!
//! Each module builds one named workflow graph from the shared step
//! library plus its domain-specific steps. Registration is explicit:
//! [`register_all`] is called from the entry runner's startup path, and
//! nothing registers itself at module load.

pub mod causal;
pub mod code_investigation;
pub mod comparative;
pub mod deep_research;
pub mod fact_check;
pub mod quick_research;

use crate::config::Config;
use crate::engine::WorkflowRegistry;
use crate::error::Result;
use crate::state::{MergeRule, StateSchema, keys};

/// The state schema shared by the research workflows.
///
/// Accumulating evidence fields append; everything else overwrites.
#[must_use]
pub fn research_schema() -> StateSchema {
    StateSchema::new()
        .field(keys::QUERY, MergeRule::Overwrite)
        .field(keys::FEEDBACK, MergeRule::Overwrite)
        .field(keys::ALLOCATION, MergeRule::Overwrite)
        .field(keys::RAG_RESULTS, MergeRule::Append)
        .field(keys::SEARCH_RESULTS, MergeRule::Append)
        .field(keys::NOTES, MergeRule::Append)
        .field(keys::GATHER_WARNINGS, MergeRule::Append)
        .field(keys::VERDICT, MergeRule::Overwrite)
        .field(keys::LOOP_COUNT, MergeRule::Overwrite)
        .field(keys::REPORT, MergeRule::Overwrite)
        .field(keys::MODE, MergeRule::Overwrite)
        .field(keys::PLAN, MergeRule::Overwrite)
        .field(keys::PENDING, MergeRule::Overwrite)
        .field(keys::CURRENT_SUBTASK, MergeRule::Overwrite)
        .field(keys::SUBTASK_NOTES, MergeRule::Overwrite)
        .field(keys::SUBTASK_RESULTS, MergeRule::Overwrite)
        .field(keys::DEPTH_ASSESSMENT, MergeRule::Overwrite)
        .field(keys::REVISION_COUNT, MergeRule::Overwrite)
        .field(keys::TOTAL_SUBTASKS, MergeRule::Overwrite)
}

/// Registers every built-in workflow.
///
/// # Errors
///
/// Returns an error if any definition fails validation or conflicts with
/// an existing registration.
pub fn register_all(registry: &WorkflowRegistry, config: &Config) -> Result<()> {
    registry.register(deep_research::definition(config)?)?;
    registry.register(quick_research::definition(config)?)?;
    registry.register(fact_check::definition(config)?)?;
    registry.register(comparative::definition(config)?)?;
    registry.register(causal::definition(config)?)?;
    registry.register(code_investigation::definition(config)?)?;
    Ok(())
}
