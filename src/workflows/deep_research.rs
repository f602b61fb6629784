//! The deep-research workflow.
//!
//! Entry is the master planner. Simple queries take the single-pass path
//! (planner, parallel gathering, analyzer, evaluator, synthesizer);
//! complex queries enter the hierarchical subtask loop with depth-aware
//! drill-down and dynamic replanning. Both paths end at the synthesizer.

use std::sync::Arc;

use super::research_schema;
use crate::config::Config;
use crate::engine::WorkflowDefinition;
use crate::error::Result;
use crate::state::keys;
use crate::steps::{
    AnalyzeStep, DepthEvalStep, DrillDownStep, EvaluateStep, MasterPlanStep, PlanStep,
    RetrieveStep, ReviseStep, SaveSubtaskStep, SelectSubtaskStep, SubtaskExecuteStep,
    SynthesizeStep, WebSearchStep, depth_router, mode_router, next_subtask_router,
    sufficiency_router,
};

/// Builds the deep-research workflow definition.
///
/// # Errors
///
/// Returns an error if graph validation fails.
pub fn definition(config: &Config) -> Result<WorkflowDefinition> {
    WorkflowDefinition::builder("deep-research")
        .description(
            "Hierarchical research: master decomposition, depth-aware drill-down, \
             dynamic replanning, cited synthesis",
        )
        .schema(research_schema())
        .step(Arc::new(MasterPlanStep))
        .step(Arc::new(PlanStep))
        .step(Arc::new(RetrieveStep))
        .step(Arc::new(WebSearchStep))
        .step(Arc::new(AnalyzeStep))
        .step(Arc::new(EvaluateStep))
        .step(Arc::new(SynthesizeStep))
        .step(Arc::new(SelectSubtaskStep))
        .step(Arc::new(SubtaskExecuteStep))
        .step(Arc::new(DepthEvalStep))
        .step(Arc::new(DrillDownStep))
        .step(Arc::new(ReviseStep))
        .step(Arc::new(SaveSubtaskStep))
        .entry("master_plan")
        .conditional(
            "master_plan",
            &["plan", "select_subtask"],
            false,
            mode_router("select_subtask", "plan"),
        )
        .fan_out("plan", &["retrieve", "web_search"], "analyze")
        .edge("analyze", "evaluate")
        .conditional(
            "evaluate",
            &["synthesize", "plan"],
            false,
            sufficiency_router(config.max_loops, "synthesize", "plan"),
        )
        .edge("select_subtask", "execute_subtask")
        .edge("execute_subtask", "evaluate_depth")
        .conditional(
            "evaluate_depth",
            &["drill_down", "revise_plan"],
            false,
            depth_router("drill_down", "revise_plan"),
        )
        .edge("drill_down", "revise_plan")
        .edge("revise_plan", "save_subtask")
        .conditional(
            "save_subtask",
            &["select_subtask", "synthesize"],
            false,
            next_subtask_router("select_subtask", "synthesize"),
        )
        .terminal("synthesize")
        .budget(keys::LOOP_COUNT, config.max_loops)
        .budget(keys::REVISION_COUNT, config.max_revisions)
        .budget(keys::TOTAL_SUBTASKS, config.max_total_subtasks)
        .build()
}
