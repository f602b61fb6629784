//! The quick-research workflow.
//!
//! A single pass through the shared pipeline: planner, parallel gathering,
//! analyzer, evaluator, synthesizer, with the evaluator loop capped at the
//! configured maximum.

use std::sync::Arc;

use super::research_schema;
use crate::config::Config;
use crate::engine::WorkflowDefinition;
use crate::error::Result;
use crate::state::keys;
use crate::steps::{
    AnalyzeStep, EvaluateStep, PlanStep, RetrieveStep, SynthesizeStep, WebSearchStep,
    sufficiency_router,
};

/// Builds the quick-research workflow definition.
///
/// # Errors
///
/// Returns an error if graph validation fails.
pub fn definition(config: &Config) -> Result<WorkflowDefinition> {
    WorkflowDefinition::builder("quick-research")
        .description("Single-pass research: plan, gather in parallel, analyze, synthesize")
        .schema(research_schema())
        .step(Arc::new(PlanStep))
        .step(Arc::new(RetrieveStep))
        .step(Arc::new(WebSearchStep))
        .step(Arc::new(AnalyzeStep))
        .step(Arc::new(EvaluateStep))
        .step(Arc::new(SynthesizeStep))
        .entry("plan")
        .fan_out("plan", &["retrieve", "web_search"], "analyze")
        .edge("analyze", "evaluate")
        .conditional(
            "evaluate",
            &["synthesize", "plan"],
            false,
            sufficiency_router(config.max_loops, "synthesize", "plan"),
        )
        .terminal("synthesize")
        .budget(keys::LOOP_COUNT, config.max_loops)
        .build()
}
