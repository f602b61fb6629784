//! The sufficiency evaluator and its router.
//!
//! The evaluator produces a typed verdict and increments the loop counter;
//! the router sends sufficient (or loop-capped) runs to the synthesizer
//! and everything else back to the planner with the verdict's reason as
//! feedback. The loop cap guarantees termination regardless of verdict.

use async_trait::async_trait;
use serde_json::Value;

use super::{Step, StepContext, prompts};
use crate::engine::{Next, Selector};
use crate::error::Result;
use crate::providers::{FieldKind, OutputSchema, Prompt};
use crate::state::{AnalyzedNote, EvaluationVerdict, StateUpdate, WorkflowState, keys};

fn verdict_schema() -> OutputSchema {
    OutputSchema::new("evaluation_verdict")
        .required("sufficient", FieldKind::Boolean)
        .required("reason", FieldKind::String)
        .optional("recommended_follow_ups", FieldKind::Array)
}

/// Evaluates sufficiency of the analyzed notes for `question`.
pub(crate) async fn evaluate(
    question: &str,
    notes: &[AnalyzedNote],
    loop_count: u64,
    ctx: &StepContext,
) -> Result<EvaluationVerdict> {
    let prompt = Prompt::new(
        prompts::EVALUATOR_SYSTEM_PROMPT,
        prompts::evaluator_user(question, notes, loop_count),
    );
    let value = ctx
        .providers
        .generator
        .generate_structured(&prompt, &verdict_schema())
        .await?;
    serde_json::from_value(value).map_err(|e| crate::Error::InvalidState {
        message: format!("evaluation verdict has unexpected shape: {e}"),
    })
}

/// The evaluator step: writes the verdict, increments `loop_count`, and
/// threads the reason back as planner feedback when insufficient.
pub struct EvaluateStep;

#[async_trait]
impl Step for EvaluateStep {
    fn name(&self) -> &'static str {
        "evaluate"
    }

    async fn run(&self, state: &WorkflowState, ctx: &StepContext) -> Result<StateUpdate> {
        let query = state.text(keys::QUERY).to_string();
        let notes: Vec<AnalyzedNote> = state.get_opt(keys::NOTES)?.unwrap_or_default();
        let loop_count = state.counter(keys::LOOP_COUNT);

        let verdict = evaluate(&query, &notes, loop_count, ctx).await?;
        tracing::info!(
            sufficient = verdict.sufficient,
            loop_count = loop_count + 1,
            "evaluation complete"
        );

        let feedback = if verdict.sufficient {
            Value::Null
        } else {
            Value::String(verdict.reason.clone())
        };
        StateUpdate::new()
            .with(keys::LOOP_COUNT, Value::from(loop_count + 1))
            .with(keys::FEEDBACK, feedback)
            .with_json(keys::VERDICT, &verdict)
    }
}

/// Router after the evaluator: to the synthesizer when the verdict is
/// sufficient or the loop cap is reached, otherwise back to the planner.
#[must_use]
pub fn sufficiency_router(max_loops: u64, synthesize: &str, plan: &str) -> Selector {
    let synthesize = synthesize.to_string();
    let plan = plan.to_string();
    std::sync::Arc::new(move |state: &WorkflowState| {
        let verdict: EvaluationVerdict = state.get_opt(keys::VERDICT)?.unwrap_or_default();
        let loop_count = state.counter(keys::LOOP_COUNT);
        if verdict.sufficient || loop_count >= max_loops {
            Ok(Next::Step(synthesize.clone()))
        } else {
            Ok(Next::Step(plan.clone()))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::testing::scripted_context;

    fn verdict_response(sufficient: bool, reason: &str) -> String {
        serde_json::json!({"sufficient": sufficient, "reason": reason}).to_string()
    }

    #[tokio::test]
    async fn test_step_increments_loop_count() {
        let ctx = scripted_context(vec![verdict_response(true, "covered")], vec![], vec![]);
        let mut state = WorkflowState::new();
        state.set(keys::QUERY, serde_json::json!("q"));
        state.set(keys::LOOP_COUNT, serde_json::json!(0));

        let update = EvaluateStep.run(&state, &ctx).await.unwrap();
        let mut merged = state.clone();
        merged
            .apply(
                &crate::state::StateSchema::new()
                    .field(keys::LOOP_COUNT, crate::state::MergeRule::Overwrite)
                    .field(keys::FEEDBACK, crate::state::MergeRule::Overwrite)
                    .field(keys::VERDICT, crate::state::MergeRule::Overwrite),
                "evaluate",
                update,
            )
            .unwrap();
        assert_eq!(merged.counter(keys::LOOP_COUNT), 1);
        let verdict: EvaluationVerdict = merged.get_as(keys::VERDICT).unwrap();
        assert!(verdict.sufficient);
    }

    #[tokio::test]
    async fn test_insufficient_sets_feedback() {
        let ctx = scripted_context(
            vec![verdict_response(false, "no pricing data")],
            vec![],
            vec![],
        );
        let mut state = WorkflowState::new();
        state.set(keys::QUERY, serde_json::json!("q"));

        let update = EvaluateStep.run(&state, &ctx).await.unwrap();
        let fields: Vec<&str> = update.field_names().collect();
        assert_eq!(fields, vec![keys::FEEDBACK, keys::LOOP_COUNT, keys::VERDICT]);
    }

    #[test]
    fn test_router_sufficient_goes_to_synthesize() {
        let router = sufficiency_router(2, "synthesize", "plan");
        let mut state = WorkflowState::new();
        state
            .set_json(
                keys::VERDICT,
                &EvaluationVerdict {
                    sufficient: true,
                    reason: "ok".to_string(),
                    recommended_follow_ups: vec![],
                },
            )
            .unwrap();
        state.set(keys::LOOP_COUNT, serde_json::json!(1));
        assert_eq!(router(&state).unwrap(), Next::Step("synthesize".to_string()));
    }

    #[test]
    fn test_router_insufficient_loops_back() {
        let router = sufficiency_router(2, "synthesize", "plan");
        let mut state = WorkflowState::new();
        state
            .set_json(
                keys::VERDICT,
                &EvaluationVerdict {
                    sufficient: false,
                    reason: "thin".to_string(),
                    recommended_follow_ups: vec![],
                },
            )
            .unwrap();
        state.set(keys::LOOP_COUNT, serde_json::json!(1));
        assert_eq!(router(&state).unwrap(), Next::Step("plan".to_string()));
    }

    #[test]
    fn test_router_loop_cap_forces_synthesis() {
        // Hard cap guarantees termination regardless of verdict.
        let router = sufficiency_router(2, "synthesize", "plan");
        let mut state = WorkflowState::new();
        state
            .set_json(
                keys::VERDICT,
                &EvaluationVerdict {
                    sufficient: false,
                    reason: "still thin".to_string(),
                    recommended_follow_ups: vec![],
                },
            )
            .unwrap();
        state.set(keys::LOOP_COUNT, serde_json::json!(2));
        assert_eq!(router(&state).unwrap(), Next::Step("synthesize".to_string()));
    }

    #[test]
    fn test_router_missing_verdict_defaults_insufficient() {
        let router = sufficiency_router(2, "synthesize", "plan");
        let state = WorkflowState::new();
        assert_eq!(router(&state).unwrap(), Next::Step("plan".to_string()));
    }
}
