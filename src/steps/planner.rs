//! The strategic planner step.
//!
//! Splits the active question between the knowledge base and the web,
//! producing an [`AllocationPlan`]. Knowledge-base status is read from the
//! retriever once per run; an empty store forces an empty `rag_queries`
//! list so the retriever step performs zero external calls.

use async_trait::async_trait;
use serde_json::Value;

use super::{Step, StepContext, prompts};
use crate::error::Result;
use crate::providers::{FieldKind, OutputSchema, Prompt};
use crate::state::{AllocationPlan, StateUpdate, WorkflowState, keys};

/// Maximum sub-queries per evidence source.
const MAX_QUERIES_PER_SOURCE: usize = 5;

fn allocation_schema() -> OutputSchema {
    OutputSchema::new("allocation_plan")
        .required("rag_queries", FieldKind::Array)
        .required("web_queries", FieldKind::Array)
        .required("strategy", FieldKind::String)
}

/// Produces an allocation plan for `question`, honoring the KB status.
pub(crate) async fn allocate(
    question: &str,
    feedback: Option<&str>,
    ctx: &StepContext,
) -> Result<AllocationPlan> {
    let kb = ctx.kb_status().await?;
    let prompt = Prompt::new(
        prompts::PLANNER_SYSTEM_PROMPT,
        prompts::planner_user(question, feedback, &kb),
    );
    let value = ctx
        .providers
        .generator
        .generate_structured(&prompt, &allocation_schema())
        .await?;

    let mut plan: AllocationPlan = serde_json::from_value(value).map_err(|e| {
        crate::Error::InvalidState {
            message: format!("allocation plan has unexpected shape: {e}"),
        }
    })?;
    plan.rag_queries.truncate(MAX_QUERIES_PER_SOURCE);
    plan.web_queries.truncate(MAX_QUERIES_PER_SOURCE);
    if !kb.is_usable() {
        plan.rag_queries.clear();
    }
    Ok(plan)
}

/// The planner step: reads the query and evaluator feedback, writes the
/// allocation plan.
pub struct PlanStep;

#[async_trait]
impl Step for PlanStep {
    fn name(&self) -> &'static str {
        "plan"
    }

    async fn run(&self, state: &WorkflowState, ctx: &StepContext) -> Result<StateUpdate> {
        let query = state.text(keys::QUERY).to_string();
        let feedback: Option<String> = state.get_opt(keys::FEEDBACK)?;
        let plan = allocate(&query, feedback.as_deref(), ctx).await?;
        tracing::info!(
            rag = plan.rag_queries.len(),
            web = plan.web_queries.len(),
            "allocation planned"
        );
        StateUpdate::new()
            .with(keys::FEEDBACK, Value::Null)
            .with_json(keys::ALLOCATION, &plan)
    }
}
