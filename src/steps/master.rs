//! The master planner.
//!
//! Classifies query complexity with a deterministic heuristic and, for
//! complex queries, decomposes them into 2-6 top-level subtasks. The mode
//! decision is auditable by construction; only the decomposition itself is
//! generator-driven.

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::{Step, StepContext, prompts};
use crate::engine::{Next, Selector};
use crate::error::Result;
use crate::providers::{FieldKind, OutputSchema, Prompt};
use crate::state::{MasterPlan, StateUpdate, WorkflowState, keys, top_level_subtask};

/// Minimum top-level subtasks in a decomposition.
const MIN_SUBTASKS: usize = 2;
/// Maximum top-level subtasks in a decomposition.
const MAX_SUBTASKS: usize = 6;
/// Complexity score at which a query is treated as hierarchical.
const COMPLEXITY_THRESHOLD: u32 = 2;

/// Conjunction and task cues that suggest a multi-part investigation.
const COMPLEXITY_CUES: &[&str] = &[
    "analyze",
    "analysis",
    "compare",
    "comparison",
    " versus ",
    " vs ",
    "why",
    "end-to-end",
    "comprehensive",
    "in depth",
    "trade-off",
    "tradeoff",
    " and ",
];

/// Scores query complexity: long queries, conjunction cues, and multiple
/// named entities each contribute one point.
#[must_use]
pub fn complexity_score(query: &str) -> u32 {
    let lowered = query.to_lowercase();
    let mut score = 0;

    if query.split_whitespace().count() > 12 {
        score += 1;
    }
    for cue in COMPLEXITY_CUES {
        if lowered.contains(cue) {
            score += 1;
        }
    }
    if named_entities(query) >= 2 {
        score += 1;
    }
    score
}

/// Counts capitalized tokens past the first word as a proxy for named
/// entities.
fn named_entities(query: &str) -> usize {
    query
        .split_whitespace()
        .skip(1)
        .filter(|word| word.chars().next().is_some_and(char::is_uppercase))
        .count()
}

/// Whether the query warrants hierarchical decomposition.
#[must_use]
pub fn is_complex(query: &str) -> bool {
    complexity_score(query) >= COMPLEXITY_THRESHOLD
}

fn decomposition_schema() -> OutputSchema {
    OutputSchema::new("master_plan").required("subtasks", FieldKind::Array)
}

#[derive(Deserialize)]
struct RawSubtask {
    title: String,
    question: String,
}

/// The master planner step: sets the mode and, in hierarchical mode, the
/// plan and pending queue.
pub struct MasterPlanStep;

#[async_trait]
impl Step for MasterPlanStep {
    fn name(&self) -> &'static str {
        "master_plan"
    }

    async fn run(&self, state: &WorkflowState, ctx: &StepContext) -> Result<StateUpdate> {
        let query = state.text(keys::QUERY).to_string();
        if !is_complex(&query) {
            tracing::info!(score = complexity_score(&query), "simple mode selected");
            return Ok(StateUpdate::new().with(keys::MODE, json!("simple")));
        }

        let prompt = Prompt::new(prompts::MASTER_PLANNER_SYSTEM_PROMPT, format!("## Query\n{query}\n"));
        let value = ctx
            .providers
            .generator
            .generate_structured(&prompt, &decomposition_schema())
            .await?;
        let mut raw: Vec<RawSubtask> =
            serde_json::from_value(value["subtasks"].clone()).map_err(|e| {
                crate::Error::InvalidState {
                    message: format!("decomposition has unexpected shape: {e}"),
                }
            })?;
        if raw.len() < MIN_SUBTASKS {
            return Err(crate::Error::InvalidState {
                message: format!("decomposition produced {} subtasks, need >= 2", raw.len()),
            });
        }
        raw.truncate(MAX_SUBTASKS);

        let subtasks: Vec<_> = raw
            .iter()
            .enumerate()
            .map(|(index, s)| top_level_subtask(&format!("s{}", index + 1), &s.title, &s.question))
            .collect();
        let pending: Vec<String> = subtasks.iter().map(|s| s.id.clone()).collect();
        let plan = MasterPlan::new(
            subtasks,
            ctx.config.max_depth,
            ctx.config.max_total_subtasks,
        );
        tracing::info!(subtasks = plan.total_created, "hierarchical mode selected");

        StateUpdate::new()
            .with(keys::MODE, json!("hierarchical"))
            .with(keys::TOTAL_SUBTASKS, json!(plan.total_created))
            .with(keys::PENDING, json!(pending))
            .with_json(keys::PLAN, &plan)
    }
}

/// Router after the master planner: hierarchical runs enter the subtask
/// loop, simple runs fall through to the single-pass planner.
#[must_use]
pub fn mode_router(select_subtask: &str, plan: &str) -> Selector {
    let select_subtask = select_subtask.to_string();
    let plan = plan.to_string();
    std::sync::Arc::new(move |state: &WorkflowState| {
        if state.text(keys::MODE) == "hierarchical" {
            Ok(Next::Step(select_subtask.clone()))
        } else {
            Ok(Next::Step(plan.clone()))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::testing::scripted_context;
    use test_case::test_case;

    #[test_case("What is the capital of France?", false; "simple factual")]
    #[test_case("Analyze multi-agent AI systems end-to-end", true; "analysis task")]
    #[test_case("Compare PostgreSQL and MySQL for web backends", true; "comparison")]
    #[test_case("Who wrote Hamlet?", false; "short lookup")]
    fn test_complexity_classifier(query: &str, complex: bool) {
        assert_eq!(is_complex(query), complex, "query: {query}");
    }

    #[test]
    fn test_entity_counting() {
        assert_eq!(named_entities("Compare PostgreSQL and MySQL"), 2);
        assert_eq!(named_entities("what is rust"), 0);
    }

    #[tokio::test]
    async fn test_simple_query_sets_simple_mode_without_generator() {
        // Empty script: a generator call would fail the step.
        let ctx = scripted_context(vec![], vec![], vec![]);
        let mut state = WorkflowState::new();
        state.set(keys::QUERY, json!("What is the capital of France?"));

        let update = MasterPlanStep.run(&state, &ctx).await.unwrap();
        let fields: Vec<&str> = update.field_names().collect();
        assert_eq!(fields, vec![keys::MODE]);
    }

    #[tokio::test]
    async fn test_complex_query_decomposes() {
        let response = json!({
            "subtasks": [
                {"title": "Architectures", "question": "What architectures exist?"},
                {"title": "Coordination", "question": "How do agents coordinate?"},
                {"title": "Evaluation", "question": "How are systems evaluated?"},
            ]
        })
        .to_string();
        let ctx = scripted_context(vec![response], vec![], vec![]);
        let mut state = WorkflowState::new();
        state.set(keys::QUERY, json!("Analyze multi-agent AI systems end-to-end"));

        let update = MasterPlanStep.run(&state, &ctx).await.unwrap();
        let mut merged = WorkflowState::new();
        merged
            .apply(
                &crate::workflows::research_schema(),
                "master_plan",
                update,
            )
            .unwrap();
        assert_eq!(merged.text(keys::MODE), "hierarchical");
        let plan: MasterPlan = merged.get_as(keys::PLAN).unwrap();
        assert_eq!(plan.total_created, 3);
        assert_eq!(plan.subtasks[0].id, "s1");
        assert_eq!(plan.subtasks[0].depth, 0);
        let pending: Vec<String> = merged.get_as(keys::PENDING).unwrap();
        assert_eq!(pending, vec!["s1", "s2", "s3"]);
    }

    #[tokio::test]
    async fn test_single_subtask_decomposition_rejected() {
        let response = json!({"subtasks": [{"title": "only", "question": "q"}]}).to_string();
        let ctx = scripted_context(vec![response], vec![], vec![]);
        let mut state = WorkflowState::new();
        state.set(keys::QUERY, json!("Analyze multi-agent AI systems end-to-end"));
        assert!(MasterPlanStep.run(&state, &ctx).await.is_err());
    }

    #[test]
    fn test_mode_router() {
        let router = mode_router("select_subtask", "plan");
        let mut state = WorkflowState::new();
        state.set(keys::MODE, json!("hierarchical"));
        assert_eq!(
            router(&state).unwrap(),
            Next::Step("select_subtask".to_string())
        );
        state.set(keys::MODE, json!("simple"));
        assert_eq!(router(&state).unwrap(), Next::Step("plan".to_string()));
    }
}
