//! Workflow state model.
//!
//! State is a schema-governed record of named fields: scalars overwrite,
//! accumulating sequences append, and the engine applies every step update
//! through the declared merge rules. Domain types and the hierarchical plan
//! model live alongside.

pub mod merge;
pub mod plan;
pub mod record;
pub mod types;

pub use merge::{MergeRule, StateSchema, merge_value};
pub use plan::{
    MasterPlan, PlanRevision, RevisionTrigger, Subtask, SubtaskStatus, top_level_subtask,
};
pub use record::{StateUpdate, WorkflowState, keys};
pub use types::{
    AllocationPlan, AnalyzedNote, CausalEdge, CausalGraph, CausalNode, CausalNodeKind,
    CausalRelation, CodeFinding, CodeIntent, ComparisonFrame, ConfidenceLabel, EvaluationVerdict,
    EvidenceLabel, EvidenceStance, Hypothesis, KbStatus, MatrixCell, SearchHit, SourceDocument,
    sort_retrieval_results,
};
