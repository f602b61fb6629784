//! The subtask executor loop.
//!
//! Hierarchical mode walks the pending queue depth-first: select the next
//! subtask, execute the single-pass pipeline for its question, judge result
//! depth, drill down into children when shallow, let the plan revisor react
//! to the findings, then save and move on. Drill-down children are enqueued
//! at the head of the pending order so depth-first completion occurs.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::{Step, StepContext, analyze, evaluate, gather, planner, prompts};
use crate::engine::{Next, Selector};
use crate::error::Result;
use crate::providers::{FieldKind, OutputSchema, Prompt};
use crate::state::{
    AnalyzedNote, MasterPlan, RevisionTrigger, SearchHit, SourceDocument, StateUpdate,
    SubtaskStatus, WorkflowState, keys,
};

/// Maximum children emitted by one drill-down.
const MAX_CHILDREN: usize = 3;
/// Maximum subtasks added by one plan revision.
const MAX_REVISION_ADDITIONS: usize = 2;

/// Depth classification of a subtask's results.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DepthClass {
    /// Surface mentions only.
    Shallow,
    /// The question is answered.
    Adequate,
    /// Beyond the question, well-sourced.
    Deep,
}

/// The depth evaluator's assessment, kept in state for the router.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DepthAssessment {
    /// Classified depth.
    pub depth: DepthClass,
    /// Free-text reason.
    pub reason: String,
}

/// Selecting: pops the next pending subtask and marks it in progress.
pub struct SelectSubtaskStep;

#[async_trait]
impl Step for SelectSubtaskStep {
    fn name(&self) -> &'static str {
        "select_subtask"
    }

    async fn run(&self, state: &WorkflowState, _ctx: &StepContext) -> Result<StateUpdate> {
        let mut pending: Vec<String> = state.get_as(keys::PENDING)?;
        let mut plan: MasterPlan = state.get_as(keys::PLAN)?;
        if pending.is_empty() {
            return Err(crate::Error::InvalidState {
                message: "select_subtask reached with empty pending queue".to_string(),
            });
        }
        let current = pending.remove(0);
        plan.transition(&current, SubtaskStatus::InProgress)?;
        tracing::info!(subtask = %current, remaining = pending.len(), "subtask selected");

        StateUpdate::new()
            .with(keys::CURRENT_SUBTASK, json!(current))
            .with(keys::PENDING, json!(pending))
            .with(keys::SUBTASK_NOTES, json!([]))
            .with_json(keys::PLAN, &plan)
    }
}

/// Executing: runs the single-pass pipeline (planner, parallel gathering,
/// analyzer, evaluator) for the current subtask's question, with the
/// subtask's own loop counter.
pub struct SubtaskExecuteStep;

#[async_trait]
impl Step for SubtaskExecuteStep {
    fn name(&self) -> &'static str {
        "execute_subtask"
    }

    async fn run(&self, state: &WorkflowState, ctx: &StepContext) -> Result<StateUpdate> {
        let plan: MasterPlan = state.get_as(keys::PLAN)?;
        let current = state.text(keys::CURRENT_SUBTASK).to_string();
        let subtask = plan.subtask(&current).ok_or_else(|| crate::Error::InvalidState {
            message: format!("unknown current subtask: {current}"),
        })?;
        let question = subtask.question.clone();

        let mut notes: Vec<AnalyzedNote> = Vec::new();
        let mut all_rag: Vec<SourceDocument> = Vec::new();
        let mut all_web: Vec<SearchHit> = Vec::new();
        let mut warnings: Vec<String> = Vec::new();
        let mut feedback: Option<String> = None;

        // The subtask's own sufficiency loop, bounded like the top-level one.
        for iteration in 0..ctx.config.max_loops {
            let allocation = planner::allocate(&question, feedback.as_deref(), ctx).await?;
            let (rag, web) = tokio::join!(
                gather::retrieve(&allocation, ctx),
                gather::web_search(&allocation, ctx)
            );
            let rag = rag?;
            let (web, warning) = web?;
            if let Some(warning) = warning {
                warnings.push(warning);
            }

            let fresh = analyze::analyze(&question, &rag, &web, ctx).await?;
            all_rag.extend(rag);
            all_web.extend(web);
            notes.extend(fresh);

            let verdict = evaluate::evaluate(&question, &notes, iteration, ctx).await?;
            if verdict.sufficient {
                break;
            }
            feedback = Some(verdict.reason);
        }
        tracing::info!(subtask = %current, notes = notes.len(), "subtask executed");

        let mut update = StateUpdate::new()
            .with_json(keys::SUBTASK_NOTES, &notes)?
            .with_json(keys::NOTES, &notes)?
            .with_json(keys::RAG_RESULTS, &all_rag)?
            .with_json(keys::SEARCH_RESULTS, &all_web)?;
        if !warnings.is_empty() {
            update = update.with(keys::GATHER_WARNINGS, json!(warnings));
        }
        Ok(update)
    }
}

fn depth_schema() -> OutputSchema {
    OutputSchema::new("depth_assessment")
        .required("depth", FieldKind::String)
        .required("reason", FieldKind::String)
}

/// Evaluating depth: classifies the current subtask's notes.
pub struct DepthEvalStep;

#[async_trait]
impl Step for DepthEvalStep {
    fn name(&self) -> &'static str {
        "evaluate_depth"
    }

    async fn run(&self, state: &WorkflowState, ctx: &StepContext) -> Result<StateUpdate> {
        let plan: MasterPlan = state.get_as(keys::PLAN)?;
        let current = state.text(keys::CURRENT_SUBTASK).to_string();
        let subtask = plan.subtask(&current).ok_or_else(|| crate::Error::InvalidState {
            message: format!("unknown current subtask: {current}"),
        })?;
        let notes: Vec<AnalyzedNote> = state.get_opt(keys::SUBTASK_NOTES)?.unwrap_or_default();

        let prompt = Prompt::new(
            prompts::DEPTH_EVALUATOR_SYSTEM_PROMPT,
            format!(
                "## Subtask question\n{}\n\n## Notes\n{}",
                subtask.question,
                prompts::notes_block(&notes)
            ),
        );
        let value = ctx
            .providers
            .generator
            .generate_structured(&prompt, &depth_schema())
            .await?;
        let assessment: DepthAssessment =
            serde_json::from_value(value).map_err(|e| crate::Error::InvalidState {
                message: format!("depth assessment has unexpected shape: {e}"),
            })?;
        tracing::info!(subtask = %current, depth = ?assessment.depth, "depth assessed");
        StateUpdate::new().with_json(keys::DEPTH_ASSESSMENT, &assessment)
    }
}

/// Router after depth evaluation: drill down when the result is shallow
/// and both the depth bound and the subtask budget leave room.
#[must_use]
pub fn depth_router(drill_down: &str, revise: &str) -> Selector {
    let drill_down = drill_down.to_string();
    let revise = revise.to_string();
    std::sync::Arc::new(move |state: &WorkflowState| {
        let assessment: Option<DepthAssessment> = state.get_opt(keys::DEPTH_ASSESSMENT)?;
        let plan: MasterPlan = state.get_as(keys::PLAN)?;
        let current = state.text(keys::CURRENT_SUBTASK);
        let subtask_depth = plan.subtask(current).map_or(0, |s| s.depth);

        let shallow = assessment.is_some_and(|a| a.depth == DepthClass::Shallow);
        if shallow && subtask_depth < plan.max_depth && plan.remaining_budget() > 0 {
            Ok(Next::Step(drill_down.clone()))
        } else {
            Ok(Next::Step(revise.clone()))
        }
    })
}

fn children_schema() -> OutputSchema {
    OutputSchema::new("drill_down_children").required("children", FieldKind::Array)
}

#[derive(Deserialize)]
struct RawChild {
    title: String,
    question: String,
}

/// Drill-down: emits 1-3 children under the current subtask and enqueues
/// them at the head of the pending order.
pub struct DrillDownStep;

#[async_trait]
impl Step for DrillDownStep {
    fn name(&self) -> &'static str {
        "drill_down"
    }

    async fn run(&self, state: &WorkflowState, ctx: &StepContext) -> Result<StateUpdate> {
        let mut plan: MasterPlan = state.get_as(keys::PLAN)?;
        let mut pending: Vec<String> = state.get_as(keys::PENDING)?;
        let current = state.text(keys::CURRENT_SUBTASK).to_string();
        let assessment: Option<DepthAssessment> = state.get_opt(keys::DEPTH_ASSESSMENT)?;
        let notes: Vec<AnalyzedNote> = state.get_opt(keys::SUBTASK_NOTES)?.unwrap_or_default();

        let subtask = plan.subtask(&current).ok_or_else(|| crate::Error::InvalidState {
            message: format!("unknown current subtask: {current}"),
        })?;
        let prompt = Prompt::new(
            prompts::DRILL_DOWN_SYSTEM_PROMPT,
            format!(
                "## Parent question\n{}\n\n## Depth assessment\n{}\n\n## Parent notes\n{}",
                subtask.question,
                assessment.map(|a| a.reason).unwrap_or_default(),
                prompts::notes_block(&notes)
            ),
        );
        let value = ctx
            .providers
            .generator
            .generate_structured(&prompt, &children_schema())
            .await?;
        let mut raw: Vec<RawChild> =
            serde_json::from_value(value["children"].clone()).map_err(|e| {
                crate::Error::InvalidState {
                    message: format!("drill-down children have unexpected shape: {e}"),
                }
            })?;

        let budget = usize::try_from(plan.remaining_budget()).unwrap_or(usize::MAX);
        raw.truncate(MAX_CHILDREN.min(budget));
        if raw.is_empty() {
            return Ok(StateUpdate::new());
        }

        let children: Vec<(String, String)> =
            raw.into_iter().map(|c| (c.title, c.question)).collect();
        let ids = plan.add_children(&current, children)?;
        tracing::info!(parent = %current, children = ids.len(), "drill-down created");

        // Children go to the head of the queue: depth-first completion.
        let mut new_pending = ids;
        new_pending.extend(pending.drain(..));

        StateUpdate::new()
            .with(keys::PENDING, json!(new_pending))
            .with(keys::TOTAL_SUBTASKS, json!(plan.total_created))
            .with_json(keys::PLAN, &plan)
    }
}

fn revision_schema() -> OutputSchema {
    OutputSchema::new("plan_revision")
        .required("trigger", FieldKind::String)
        .required("additions", FieldKind::Array)
        .required("rationale", FieldKind::String)
}

fn parse_trigger(raw: &str) -> Option<RevisionTrigger> {
    match raw {
        "new_topic" => Some(RevisionTrigger::NewTopic),
        "contradiction" => Some(RevisionTrigger::Contradiction),
        "gap" => Some(RevisionTrigger::Gap),
        _ => None,
    }
}

/// Replanning: examines the just-completed subtask's findings against the
/// remaining plan. Budget exhaustion makes this a silent no-op so the loop
/// progresses toward synthesis.
pub struct ReviseStep;

#[async_trait]
impl Step for ReviseStep {
    fn name(&self) -> &'static str {
        "revise_plan"
    }

    async fn run(&self, state: &WorkflowState, ctx: &StepContext) -> Result<StateUpdate> {
        let revision_count = state.counter(keys::REVISION_COUNT);
        let mut plan: MasterPlan = state.get_as(keys::PLAN)?;
        if revision_count >= ctx.config.max_revisions || plan.remaining_budget() == 0 {
            tracing::debug!(revision_count, "revision budget exhausted, no-op");
            return Ok(StateUpdate::new());
        }

        let mut pending: Vec<String> = state.get_as(keys::PENDING)?;
        let notes: Vec<AnalyzedNote> = state.get_opt(keys::SUBTASK_NOTES)?.unwrap_or_default();
        let pending_questions: Vec<String> = pending
            .iter()
            .filter_map(|id| plan.subtask(id))
            .map(|s| format!("- {} — {}", s.title, s.question))
            .collect();

        let prompt = Prompt::new(
            prompts::PLAN_REVISOR_SYSTEM_PROMPT,
            format!(
                "## Just-completed findings\n{}\n## Remaining plan\n{}\n",
                prompts::notes_block(&notes),
                if pending_questions.is_empty() {
                    "(nothing pending)".to_string()
                } else {
                    pending_questions.join("\n")
                }
            ),
        );
        let value = ctx
            .providers
            .generator
            .generate_structured(&prompt, &revision_schema())
            .await?;

        let Some(trigger) = value["trigger"].as_str().and_then(parse_trigger) else {
            return Ok(StateUpdate::new());
        };

        #[derive(Deserialize)]
        struct RawAddition {
            title: String,
            question: String,
        }
        let mut raw: Vec<RawAddition> =
            serde_json::from_value(value["additions"].clone()).unwrap_or_default();
        let budget = usize::try_from(plan.remaining_budget()).unwrap_or(usize::MAX);
        raw.truncate(MAX_REVISION_ADDITIONS.min(budget));

        let additions: Vec<(String, String)> =
            raw.into_iter().map(|a| (a.title, a.question)).collect();
        let rationale = value["rationale"].as_str().unwrap_or_default().to_string();
        let ids = plan.apply_revision(trigger, additions, rationale)?;
        tracing::info!(?trigger, added = ids.len(), "plan revised");

        // Revision additions join the tail of the pending order.
        pending.extend(ids);

        StateUpdate::new()
            .with(keys::REVISION_COUNT, json!(revision_count + 1))
            .with(keys::PENDING, json!(pending))
            .with(keys::TOTAL_SUBTASKS, json!(plan.total_created))
            .with_json(keys::PLAN, &plan)
    }
}

/// Saving: marks the current subtask completed and stores its notes under
/// its id.
pub struct SaveSubtaskStep;

#[async_trait]
impl Step for SaveSubtaskStep {
    fn name(&self) -> &'static str {
        "save_subtask"
    }

    async fn run(&self, state: &WorkflowState, _ctx: &StepContext) -> Result<StateUpdate> {
        let mut plan: MasterPlan = state.get_as(keys::PLAN)?;
        let current = state.text(keys::CURRENT_SUBTASK).to_string();
        let notes: Vec<AnalyzedNote> = state.get_opt(keys::SUBTASK_NOTES)?.unwrap_or_default();
        let mut results: std::collections::BTreeMap<String, Vec<AnalyzedNote>> =
            state.get_opt(keys::SUBTASK_RESULTS)?.unwrap_or_default();

        let status = if notes.is_empty() {
            SubtaskStatus::Failed
        } else {
            SubtaskStatus::Completed
        };
        plan.transition(&current, status)?;
        results.insert(current.clone(), notes);
        tracing::info!(subtask = %current, ?status, "subtask saved");

        StateUpdate::new()
            .with(keys::CURRENT_SUBTASK, json!(""))
            .with(keys::SUBTASK_NOTES, json!([]))
            .with_json(keys::SUBTASK_RESULTS, &results)?
            .with_json(keys::PLAN, &plan)
    }
}

/// Router after saving: the next pending subtask, or synthesis when none
/// remain.
#[must_use]
pub fn next_subtask_router(select: &str, synthesize: &str) -> Selector {
    let select = select.to_string();
    let synthesize = synthesize.to_string();
    std::sync::Arc::new(move |state: &WorkflowState| {
        let pending: Vec<String> = state.get_opt(keys::PENDING)?.unwrap_or_default();
        if pending.is_empty() {
            Ok(Next::Step(synthesize.clone()))
        } else {
            Ok(Next::Step(select.clone()))
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::top_level_subtask;
    use crate::steps::testing::scripted_context;
    use crate::workflows::research_schema;

    fn hierarchical_state(pending: &[&str]) -> WorkflowState {
        let subtasks = pending
            .iter()
            .enumerate()
            .map(|(i, id)| {
                assert_eq!(*id, format!("s{}", i + 1));
                top_level_subtask(id, &format!("title {id}"), &format!("question {id}"))
            })
            .collect();
        let plan = MasterPlan::new(subtasks, 2, 20);
        let mut state = WorkflowState::new();
        state.set(keys::QUERY, json!("big question"));
        state.set(keys::MODE, json!("hierarchical"));
        state.set(keys::TOTAL_SUBTASKS, json!(plan.total_created));
        state.set(keys::PENDING, json!(pending));
        state.set_json(keys::PLAN, &plan).unwrap();
        state
    }

    fn apply(state: &mut WorkflowState, step: &str, update: StateUpdate) {
        state.apply(&research_schema(), step, update).unwrap();
    }

    fn note(summary: &str) -> AnalyzedNote {
        AnalyzedNote {
            summary: summary.to_string(),
            content: "c".to_string(),
            source_ids: vec!["kb:1".to_string()],
            conflicts: vec![],
        }
    }

    #[tokio::test]
    async fn test_select_pops_head_and_marks_in_progress() {
        let ctx = scripted_context(vec![], vec![], vec![]);
        let mut state = hierarchical_state(&["s1", "s2"]);
        let update = SelectSubtaskStep.run(&state, &ctx).await.unwrap();
        apply(&mut state, "select_subtask", update);

        assert_eq!(state.text(keys::CURRENT_SUBTASK), "s1");
        let pending: Vec<String> = state.get_as(keys::PENDING).unwrap();
        assert_eq!(pending, vec!["s2"]);
        let plan: MasterPlan = state.get_as(keys::PLAN).unwrap();
        assert_eq!(plan.subtask("s1").unwrap().status, SubtaskStatus::InProgress);
    }

    #[tokio::test]
    async fn test_select_on_empty_queue_fails() {
        let ctx = scripted_context(vec![], vec![], vec![]);
        let mut state = hierarchical_state(&["s1"]);
        state.set(keys::PENDING, json!([]));
        assert!(SelectSubtaskStep.run(&state, &ctx).await.is_err());
    }

    #[tokio::test]
    async fn test_execute_runs_inner_pipeline_once_when_sufficient() {
        // Script: allocation, notes, verdict(sufficient).
        let responses = vec![
            json!({"rag_queries": [], "web_queries": ["question s1 details"], "strategy": "web"})
                .to_string(),
            json!({"notes": [{"summary": "found", "content": "c", "source_ids": ["https://w"]}]})
                .to_string(),
            json!({"sufficient": true, "reason": "answered"}).to_string(),
        ];
        let hits = vec![SearchHit {
            title: "t".to_string(),
            snippet: "s".to_string(),
            url: "https://w".to_string(),
            score: 1.0,
        }];
        let ctx = scripted_context(responses, vec![], hits);
        let mut state = hierarchical_state(&["s1"]);
        let select = SelectSubtaskStep.run(&state, &ctx).await.unwrap();
        apply(&mut state, "select_subtask", select);

        let update = SubtaskExecuteStep.run(&state, &ctx).await.unwrap();
        apply(&mut state, "execute_subtask", update);

        let notes: Vec<AnalyzedNote> = state.get_as(keys::SUBTASK_NOTES).unwrap();
        assert_eq!(notes.len(), 1);
        // Notes are mirrored into the global accumulating field.
        let global: Vec<AnalyzedNote> = state.get_as(keys::NOTES).unwrap();
        assert_eq!(global.len(), 1);
    }

    #[tokio::test]
    async fn test_execute_loops_on_insufficient_verdict() {
        // Two iterations: insufficient then sufficient.
        let responses = vec![
            json!({"rag_queries": [], "web_queries": ["q1"], "strategy": "a"}).to_string(),
            json!({"notes": []}).to_string(),
            json!({"sufficient": false, "reason": "nothing found"}).to_string(),
            json!({"rag_queries": [], "web_queries": ["q2"], "strategy": "b"}).to_string(),
            json!({"notes": [{"summary": "late find", "content": "c", "source_ids": ["https://w"]}]})
                .to_string(),
            json!({"sufficient": true, "reason": "answered"}).to_string(),
        ];
        let hits = vec![SearchHit {
            title: "t".to_string(),
            snippet: "s".to_string(),
            url: "https://w".to_string(),
            score: 1.0,
        }];
        let ctx = scripted_context(responses, vec![], hits);
        let mut state = hierarchical_state(&["s1"]);
        let select = SelectSubtaskStep.run(&state, &ctx).await.unwrap();
        apply(&mut state, "select_subtask", select);

        let update = SubtaskExecuteStep.run(&state, &ctx).await.unwrap();
        apply(&mut state, "execute_subtask", update);
        let notes: Vec<AnalyzedNote> = state.get_as(keys::SUBTASK_NOTES).unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].summary, "late find");
    }

    #[tokio::test]
    async fn test_depth_router_shallow_with_headroom_drills() {
        let mut state = hierarchical_state(&["s1"]);
        state.set(keys::CURRENT_SUBTASK, json!("s1"));
        state
            .set_json(
                keys::DEPTH_ASSESSMENT,
                &DepthAssessment {
                    depth: DepthClass::Shallow,
                    reason: "thin".to_string(),
                },
            )
            .unwrap();
        let router = depth_router("drill_down", "revise_plan");
        assert_eq!(router(&state).unwrap(), Next::Step("drill_down".to_string()));
    }

    #[tokio::test]
    async fn test_depth_router_adequate_goes_to_revise() {
        let mut state = hierarchical_state(&["s1"]);
        state.set(keys::CURRENT_SUBTASK, json!("s1"));
        state
            .set_json(
                keys::DEPTH_ASSESSMENT,
                &DepthAssessment {
                    depth: DepthClass::Adequate,
                    reason: "fine".to_string(),
                },
            )
            .unwrap();
        let router = depth_router("drill_down", "revise_plan");
        assert_eq!(router(&state).unwrap(), Next::Step("revise_plan".to_string()));
    }

    #[tokio::test]
    async fn test_depth_router_at_max_depth_goes_to_revise() {
        let mut state = hierarchical_state(&["s1"]);
        let mut plan: MasterPlan = state.get_as(keys::PLAN).unwrap();
        let ids = plan
            .add_children("s1", vec![("c".to_string(), "q".to_string())])
            .unwrap();
        let grand = plan
            .add_children(&ids[0], vec![("g".to_string(), "q".to_string())])
            .unwrap();
        state.set_json(keys::PLAN, &plan).unwrap();
        // Current subtask sits at max depth (2).
        state.set(keys::CURRENT_SUBTASK, json!(grand[0]));
        state
            .set_json(
                keys::DEPTH_ASSESSMENT,
                &DepthAssessment {
                    depth: DepthClass::Shallow,
                    reason: "thin".to_string(),
                },
            )
            .unwrap();
        let router = depth_router("drill_down", "revise_plan");
        assert_eq!(router(&state).unwrap(), Next::Step("revise_plan".to_string()));
    }

    #[tokio::test]
    async fn test_drill_down_prepends_children() {
        let response = json!({
            "children": [
                {"title": "deeper a", "question": "qa"},
                {"title": "deeper b", "question": "qb"},
            ]
        })
        .to_string();
        let ctx = scripted_context(vec![response], vec![], vec![]);
        let mut state = hierarchical_state(&["s1", "s2"]);
        let select = SelectSubtaskStep.run(&state, &ctx).await.unwrap();
        apply(&mut state, "select_subtask", select);

        let update = DrillDownStep.run(&state, &ctx).await.unwrap();
        apply(&mut state, "drill_down", update);

        let pending: Vec<String> = state.get_as(keys::PENDING).unwrap();
        // Children first (depth-first), then the remaining top-level task.
        assert_eq!(pending, vec!["s3", "s4", "s2"]);
        let plan: MasterPlan = state.get_as(keys::PLAN).unwrap();
        assert_eq!(plan.subtask("s3").unwrap().depth, 1);
        assert_eq!(plan.subtask("s3").unwrap().parent_id.as_deref(), Some("s1"));
        assert_eq!(state.counter(keys::TOTAL_SUBTASKS), 4);
    }

    #[tokio::test]
    async fn test_revise_no_trigger_is_noop() {
        let response =
            json!({"trigger": "none", "additions": [], "rationale": "plan stands"}).to_string();
        let ctx = scripted_context(vec![response], vec![], vec![]);
        let mut state = hierarchical_state(&["s1", "s2"]);
        state.set(keys::CURRENT_SUBTASK, json!("s1"));

        let update = ReviseStep.run(&state, &ctx).await.unwrap();
        assert!(update.is_empty());
    }

    #[tokio::test]
    async fn test_revise_applies_new_topic() {
        let response = json!({
            "trigger": "new_topic",
            "additions": [{"title": "uncovered entity", "question": "what about it"}],
            "rationale": "entity X surfaced"
        })
        .to_string();
        let ctx = scripted_context(vec![response], vec![], vec![]);
        let mut state = hierarchical_state(&["s1", "s2"]);
        state.set(keys::CURRENT_SUBTASK, json!("s1"));
        state
            .set_json(keys::SUBTASK_NOTES, &vec![note("found entity X")])
            .unwrap();

        let update = ReviseStep.run(&state, &ctx).await.unwrap();
        apply(&mut state, "revise_plan", update);

        assert_eq!(state.counter(keys::REVISION_COUNT), 1);
        let pending: Vec<String> = state.get_as(keys::PENDING).unwrap();
        // Revision additions join the tail.
        assert_eq!(pending, vec!["s1", "s2", "s3"]);
        let plan: MasterPlan = state.get_as(keys::PLAN).unwrap();
        assert_eq!(plan.revisions.len(), 1);
        assert_eq!(plan.revisions[0].trigger, RevisionTrigger::NewTopic);
    }

    #[tokio::test]
    async fn test_revise_exhausted_budget_is_silent_noop() {
        // No generator script: a call would fail, proving the no-op path
        // performs zero external calls.
        let ctx = scripted_context(vec![], vec![], vec![]);
        let mut state = hierarchical_state(&["s1"]);
        state.set(keys::REVISION_COUNT, json!(ctx.config.max_revisions));
        let update = ReviseStep.run(&state, &ctx).await.unwrap();
        assert!(update.is_empty());
    }

    #[tokio::test]
    async fn test_save_marks_completed_and_stores_notes() {
        let ctx = scripted_context(vec![], vec![], vec![]);
        let mut state = hierarchical_state(&["s1"]);
        let select = SelectSubtaskStep.run(&state, &ctx).await.unwrap();
        apply(&mut state, "select_subtask", select);
        state
            .set_json(keys::SUBTASK_NOTES, &vec![note("result")])
            .unwrap();

        let update = SaveSubtaskStep.run(&state, &ctx).await.unwrap();
        apply(&mut state, "save_subtask", update);

        let plan: MasterPlan = state.get_as(keys::PLAN).unwrap();
        assert_eq!(plan.subtask("s1").unwrap().status, SubtaskStatus::Completed);
        let results: std::collections::BTreeMap<String, Vec<AnalyzedNote>> =
            state.get_as(keys::SUBTASK_RESULTS).unwrap();
        assert_eq!(results["s1"].len(), 1);
    }

    #[tokio::test]
    async fn test_save_without_notes_marks_failed() {
        let ctx = scripted_context(vec![], vec![], vec![]);
        let mut state = hierarchical_state(&["s1"]);
        let select = SelectSubtaskStep.run(&state, &ctx).await.unwrap();
        apply(&mut state, "select_subtask", select);

        let update = SaveSubtaskStep.run(&state, &ctx).await.unwrap();
        apply(&mut state, "save_subtask", update);
        let plan: MasterPlan = state.get_as(keys::PLAN).unwrap();
        assert_eq!(plan.subtask("s1").unwrap().status, SubtaskStatus::Failed);
    }

    #[test]
    fn test_next_subtask_router() {
        let router = next_subtask_router("select_subtask", "synthesize");
        let mut state = WorkflowState::new();
        state.set(keys::PENDING, json!(["s2"]));
        assert_eq!(
            router(&state).unwrap(),
            Next::Step("select_subtask".to_string())
        );
        state.set(keys::PENDING, json!([]));
        assert_eq!(router(&state).unwrap(), Next::Step("synthesize".to_string()));
    }
}
