//! The causal-inference workflow.
//!
//! Issue analysis, hypothesis brainstorming, evidence planning, parallel
//! gathering, per-hypothesis causal checking (temporal precedence,
//! covariation, mechanism plausibility), validation and ranking, a bounded
//! evidence loop, causal graph construction, and a cited diagnosis.

use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use super::research_schema;
use crate::config::Config;
use crate::engine::{Next, Selector, WorkflowDefinition};
use crate::error::{Error, Result};
use crate::providers::{FieldKind, OutputSchema, Prompt};
use crate::state::{
    AllocationPlan, CausalEdge, CausalGraph, CausalNode, CausalNodeKind, CausalRelation,
    ConfidenceLabel, Hypothesis, MergeRule, SearchHit, SourceDocument, StateUpdate, WorkflowState,
    keys,
};
use crate::steps::synthesize::sources_appendix;
use crate::steps::{AnalyzeStep, RetrieveStep, Step, StepContext, WebSearchStep, prompts};

/// Minimum hypotheses the brainstormer must produce.
const MIN_HYPOTHESES: usize = 5;
/// Maximum hypotheses kept from the brainstormer.
const MAX_HYPOTHESES: usize = 8;
/// Score below which a hypothesis edge degrades to a correlation.
const CAUSES_THRESHOLD: f64 = 0.33;
/// Score below which the evidence is read as contradicting the link.
const CORRELATES_THRESHOLD: f64 = 0.1;
/// Id of the symptom node in the causal graph.
const SYMPTOM_NODE_ID: &str = "symptom";

/// The analyzed issue: summary plus observable symptoms.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueAnalysis {
    /// One-sentence restatement of the problem.
    pub summary: String,
    /// Observable symptoms as short factual phrases.
    pub symptoms: Vec<String>,
}

fn issue_schema() -> OutputSchema {
    OutputSchema::new("issue_analysis")
        .required("summary", FieldKind::String)
        .required("symptoms", FieldKind::Array)
}

/// Restates the reported problem precisely.
pub struct IssueAnalyzeStep;

#[async_trait]
impl Step for IssueAnalyzeStep {
    fn name(&self) -> &'static str {
        "analyze_issue"
    }

    async fn run(&self, state: &WorkflowState, ctx: &StepContext) -> Result<StateUpdate> {
        let prompt = Prompt::new(
            prompts::ISSUE_ANALYZER_SYSTEM_PROMPT,
            format!("## Reported issue\n{}\n", state.text(keys::QUERY)),
        );
        let value = ctx
            .providers
            .generator
            .generate_structured(&prompt, &issue_schema())
            .await?;
        let issue: IssueAnalysis =
            serde_json::from_value(value).map_err(|e| Error::InvalidState {
                message: format!("issue analysis has unexpected shape: {e}"),
            })?;
        tracing::info!(symptoms = issue.symptoms.len(), "issue analyzed");
        StateUpdate::new().with_json(keys::ISSUE, &issue)
    }
}

fn hypotheses_schema() -> OutputSchema {
    OutputSchema::new("hypotheses").required("hypotheses", FieldKind::Array)
}

/// Brainstorms 5-8 candidate causes.
pub struct BrainstormStep;

#[async_trait]
impl Step for BrainstormStep {
    fn name(&self) -> &'static str {
        "brainstorm"
    }

    async fn run(&self, state: &WorkflowState, ctx: &StepContext) -> Result<StateUpdate> {
        let issue: IssueAnalysis = state.get_as(keys::ISSUE)?;
        let prompt = Prompt::new(
            prompts::BRAINSTORMER_SYSTEM_PROMPT,
            format!(
                "## Issue\n{}\n\n## Symptoms\n{}\n",
                issue.summary,
                issue.symptoms.join("\n")
            ),
        );
        let value = ctx
            .providers
            .generator
            .generate_structured(&prompt, &hypotheses_schema())
            .await?;

        #[derive(Deserialize)]
        struct RawHypothesis {
            statement: String,
        }
        let mut raw: Vec<RawHypothesis> = serde_json::from_value(value["hypotheses"].clone())
            .map_err(|e| Error::InvalidState {
                message: format!("hypotheses have unexpected shape: {e}"),
            })?;
        if raw.len() < MIN_HYPOTHESES {
            return Err(Error::InvalidState {
                message: format!(
                    "brainstormer produced {} hypotheses, need >= {MIN_HYPOTHESES}",
                    raw.len()
                ),
            });
        }
        raw.truncate(MAX_HYPOTHESES);

        let hypotheses: Vec<Hypothesis> = raw
            .into_iter()
            .enumerate()
            .map(|(index, h)| Hypothesis {
                id: format!("h{}", index + 1),
                statement: h.statement,
                temporal_precedence: 0.0,
                covariation: 0.0,
                mechanism_plausibility: 0.0,
                source_ids: vec![],
            })
            .collect();
        tracing::info!(count = hypotheses.len(), "hypotheses brainstormed");
        StateUpdate::new().with_json(keys::HYPOTHESES, &hypotheses)
    }
}

fn allocation_schema() -> OutputSchema {
    OutputSchema::new("evidence_plan")
        .required("rag_queries", FieldKind::Array)
        .required("web_queries", FieldKind::Array)
        .required("strategy", FieldKind::String)
}

/// Plans retrieval and web queries that discriminate between hypotheses.
pub struct EvidencePlanStep;

#[async_trait]
impl Step for EvidencePlanStep {
    fn name(&self) -> &'static str {
        "plan_evidence"
    }

    async fn run(&self, state: &WorkflowState, ctx: &StepContext) -> Result<StateUpdate> {
        let hypotheses: Vec<Hypothesis> = state.get_opt(keys::HYPOTHESES)?.unwrap_or_default();
        let feedback: Option<String> = state.get_opt(keys::FEEDBACK)?;
        let kb = ctx.kb_status().await?;

        let mut user = format!(
            "## Issue\n{}\n\n## Hypotheses\n{}\n",
            state.text(keys::QUERY),
            prompts::hypotheses_block(&hypotheses)
        );
        user.push_str(&prompts::planner_user("", feedback.as_deref(), &kb));

        let prompt = Prompt::new(prompts::EVIDENCE_PLANNER_SYSTEM_PROMPT, user);
        let value = ctx
            .providers
            .generator
            .generate_structured(&prompt, &allocation_schema())
            .await?;
        let mut plan: AllocationPlan =
            serde_json::from_value(value).map_err(|e| Error::InvalidState {
                message: format!("evidence plan has unexpected shape: {e}"),
            })?;
        plan.rag_queries.truncate(5);
        plan.web_queries.truncate(5);
        if !kb.is_usable() {
            plan.rag_queries.clear();
        }
        StateUpdate::new()
            .with(keys::FEEDBACK, serde_json::Value::Null)
            .with_json(keys::ALLOCATION, &plan)
    }
}

fn assessments_schema() -> OutputSchema {
    OutputSchema::new("causal_assessments").required("assessments", FieldKind::Array)
}

/// Scores each hypothesis on the three causal attributes against the
/// gathered evidence.
pub struct CausalCheckStep;

#[async_trait]
impl Step for CausalCheckStep {
    fn name(&self) -> &'static str {
        "check_causality"
    }

    async fn run(&self, state: &WorkflowState, ctx: &StepContext) -> Result<StateUpdate> {
        let mut hypotheses: Vec<Hypothesis> = state.get_as(keys::HYPOTHESES)?;
        let rag: Vec<SourceDocument> = state.get_opt(keys::RAG_RESULTS)?.unwrap_or_default();
        let web: Vec<SearchHit> = state.get_opt(keys::SEARCH_RESULTS)?.unwrap_or_default();

        let valid_ids: std::collections::BTreeSet<&str> = rag
            .iter()
            .map(|d| d.source_id.as_str())
            .chain(web.iter().map(|h| h.url.as_str()))
            .collect();

        let prompt = Prompt::new(
            prompts::CAUSAL_CHECKER_SYSTEM_PROMPT,
            format!(
                "## Hypotheses\n{}\n{}",
                prompts::hypotheses_block(&hypotheses),
                prompts::evidence_block(&rag, &web)
            ),
        );
        let value = ctx
            .providers
            .generator
            .generate_structured(&prompt, &assessments_schema())
            .await?;

        #[derive(Deserialize)]
        struct RawAssessment {
            id: String,
            #[serde(default)]
            temporal_precedence: f64,
            #[serde(default)]
            covariation: f64,
            #[serde(default)]
            mechanism_plausibility: f64,
            #[serde(default)]
            source_ids: Vec<String>,
        }
        let assessments: Vec<RawAssessment> =
            serde_json::from_value(value["assessments"].clone()).map_err(|e| {
                Error::InvalidState {
                    message: format!("causal assessments have unexpected shape: {e}"),
                }
            })?;

        for assessment in assessments {
            if let Some(hypothesis) = hypotheses.iter_mut().find(|h| h.id == assessment.id) {
                hypothesis.temporal_precedence = assessment.temporal_precedence.clamp(0.0, 1.0);
                hypothesis.covariation = assessment.covariation.clamp(0.0, 1.0);
                hypothesis.mechanism_plausibility =
                    assessment.mechanism_plausibility.clamp(0.0, 1.0);
                for id in assessment.source_ids {
                    if valid_ids.contains(id.as_str()) && !hypothesis.source_ids.contains(&id) {
                        hypothesis.source_ids.push(id);
                    }
                }
            }
        }
        tracing::info!("causal attributes assessed");
        StateUpdate::new().with_json(keys::HYPOTHESES, &hypotheses)
    }
}

/// Ranks hypotheses by the product of their attributes and drives the
/// bounded evidence loop.
pub struct ValidateHypothesesStep;

#[async_trait]
impl Step for ValidateHypothesesStep {
    fn name(&self) -> &'static str {
        "validate_hypotheses"
    }

    async fn run(&self, state: &WorkflowState, _ctx: &StepContext) -> Result<StateUpdate> {
        let mut hypotheses: Vec<Hypothesis> = state.get_as(keys::HYPOTHESES)?;
        hypotheses.sort_by(|a, b| {
            b.score()
                .partial_cmp(&a.score())
                .unwrap_or(std::cmp::Ordering::Equal)
                .then_with(|| a.id.cmp(&b.id))
        });

        let under_evidenced: Vec<&str> = hypotheses
            .iter()
            .filter(|h| h.confidence() == ConfidenceLabel::Low)
            .map(|h| h.id.as_str())
            .collect();
        let feedback = if under_evidenced.is_empty() {
            serde_json::Value::Null
        } else {
            json!(format!(
                "under-evidenced hypotheses: {}",
                under_evidenced.join(", ")
            ))
        };

        let loop_count = state.counter(keys::LOOP_COUNT);
        tracing::info!(
            top = hypotheses.first().map(|h| h.id.as_str()).unwrap_or(""),
            loop_count = loop_count + 1,
            "hypotheses validated"
        );
        StateUpdate::new()
            .with(keys::LOOP_COUNT, json!(loop_count + 1))
            .with(keys::FEEDBACK, feedback)
            .with_json(keys::HYPOTHESES, &hypotheses)
    }
}

/// Router after validation: another evidence round while the top
/// hypothesis lacks high confidence and the loop cap allows, else on to
/// graph construction.
#[must_use]
pub fn validation_router(max_loops: u64, plan_evidence: &str, build_graph: &str) -> Selector {
    let plan_evidence = plan_evidence.to_string();
    let build_graph = build_graph.to_string();
    Arc::new(move |state: &WorkflowState| {
        let hypotheses: Vec<Hypothesis> = state.get_opt(keys::HYPOTHESES)?.unwrap_or_default();
        let top_is_high = hypotheses
            .first()
            .is_some_and(|h| h.confidence() == ConfidenceLabel::High);
        if top_is_high || state.counter(keys::LOOP_COUNT) >= max_loops {
            Ok(Next::Step(build_graph.clone()))
        } else {
            Ok(Next::Step(plan_evidence.clone()))
        }
    })
}

/// Builds the causal graph from the validated hypotheses.
pub struct BuildGraphStep;

#[async_trait]
impl Step for BuildGraphStep {
    fn name(&self) -> &'static str {
        "build_graph"
    }

    async fn run(&self, state: &WorkflowState, _ctx: &StepContext) -> Result<StateUpdate> {
        let issue: IssueAnalysis = state.get_as(keys::ISSUE)?;
        let hypotheses: Vec<Hypothesis> = state.get_as(keys::HYPOTHESES)?;

        let mut nodes = vec![CausalNode {
            id: SYMPTOM_NODE_ID.to_string(),
            kind: CausalNodeKind::Symptom,
            label: issue.summary.clone(),
            score: 1.0,
        }];
        let mut edges = Vec::new();
        for hypothesis in &hypotheses {
            let score = hypothesis.score();
            nodes.push(CausalNode {
                id: hypothesis.id.clone(),
                kind: CausalNodeKind::Hypothesis,
                label: hypothesis.statement.clone(),
                score,
            });
            let relation = if score >= CAUSES_THRESHOLD {
                CausalRelation::Causes
            } else if score >= CORRELATES_THRESHOLD {
                CausalRelation::CorrelatesWith
            } else {
                CausalRelation::Contradicts
            };
            edges.push(CausalEdge {
                source_id: hypothesis.id.clone(),
                target_id: SYMPTOM_NODE_ID.to_string(),
                relation,
                strength: score.clamp(0.0, 1.0),
            });
        }

        let graph = CausalGraph { nodes, edges };
        tracing::info!(
            nodes = graph.nodes.len(),
            edges = graph.edges.len(),
            "causal graph built"
        );
        StateUpdate::new().with_json(keys::CAUSAL_GRAPH, &graph)
    }
}

const fn confidence_name(label: ConfidenceLabel) -> &'static str {
    match label {
        ConfidenceLabel::High => "high",
        ConfidenceLabel::Medium => "medium",
        ConfidenceLabel::Low => "low",
    }
}

/// Synthesizes the causal diagnosis report.
pub struct SynthesizeCausalStep;

#[async_trait]
impl Step for SynthesizeCausalStep {
    fn name(&self) -> &'static str {
        "synthesize_causal"
    }

    async fn run(&self, state: &WorkflowState, ctx: &StepContext) -> Result<StateUpdate> {
        let hypotheses: Vec<Hypothesis> = state.get_as(keys::HYPOTHESES)?;
        let graph: CausalGraph = state.get_as(keys::CAUSAL_GRAPH)?;
        let rag: Vec<SourceDocument> = state.get_opt(keys::RAG_RESULTS)?.unwrap_or_default();
        let web: Vec<SearchHit> = state.get_opt(keys::SEARCH_RESULTS)?.unwrap_or_default();

        let prompt = Prompt::new(
            prompts::CAUSAL_SYNTHESIZER_SYSTEM_PROMPT,
            format!(
                "## Issue\n{}\n\n## Ranked hypotheses\n{}\n",
                state.text(keys::QUERY),
                prompts::hypotheses_block(&hypotheses)
            ),
        );
        let body = ctx.providers.generator.generate(&prompt).await?;

        let mut ranking = String::from("\n## Ranked hypotheses\n\n");
        for hypothesis in &hypotheses {
            ranking.push_str(&format!(
                "- [{}] {} — score {:.2} ({} confidence)\n",
                hypothesis.id,
                hypothesis.statement,
                hypothesis.score(),
                confidence_name(hypothesis.confidence())
            ));
        }
        ranking.push_str(&format!(
            "\nCausal graph: {} nodes, {} edges.\n",
            graph.nodes.len(),
            graph.edges.len()
        ));

        let cited: Vec<String> = hypotheses
            .iter()
            .flat_map(|h| h.source_ids.iter().cloned())
            .collect();
        let report = format!("{body}\n{ranking}{}", sources_appendix(&cited, &rag, &web));
        Ok(StateUpdate::new().with(keys::REPORT, json!(report)))
    }
}

/// Builds the causal-inference workflow definition.
///
/// # Errors
///
/// Returns an error if graph validation fails.
pub fn definition(config: &Config) -> Result<WorkflowDefinition> {
    WorkflowDefinition::builder("causal-inference")
        .description(
            "Root-cause analysis: brainstorm hypotheses, assess temporal/covariation/mechanism \
             attributes, rank, build a causal graph",
        )
        .schema(
            research_schema()
                .field(keys::ISSUE, MergeRule::Overwrite)
                .field(keys::HYPOTHESES, MergeRule::Overwrite)
                .field(keys::CAUSAL_GRAPH, MergeRule::Overwrite),
        )
        .step(Arc::new(IssueAnalyzeStep))
        .step(Arc::new(BrainstormStep))
        .step(Arc::new(EvidencePlanStep))
        .step(Arc::new(RetrieveStep))
        .step(Arc::new(WebSearchStep))
        .step(Arc::new(AnalyzeStep))
        .step(Arc::new(CausalCheckStep))
        .step(Arc::new(ValidateHypothesesStep))
        .step(Arc::new(BuildGraphStep))
        .step(Arc::new(SynthesizeCausalStep))
        .entry("analyze_issue")
        .edge("analyze_issue", "brainstorm")
        .edge("brainstorm", "plan_evidence")
        .fan_out("plan_evidence", &["retrieve", "web_search"], "analyze")
        .edge("analyze", "check_causality")
        .edge("check_causality", "validate_hypotheses")
        .conditional(
            "validate_hypotheses",
            &["plan_evidence", "build_graph"],
            false,
            validation_router(config.max_loops, "plan_evidence", "build_graph"),
        )
        .edge("build_graph", "synthesize_causal")
        .terminal("synthesize_causal")
        .budget(keys::LOOP_COUNT, config.max_loops)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::testing::scripted_context;

    fn causal_schema() -> crate::state::StateSchema {
        research_schema()
            .field(keys::ISSUE, MergeRule::Overwrite)
            .field(keys::HYPOTHESES, MergeRule::Overwrite)
            .field(keys::CAUSAL_GRAPH, MergeRule::Overwrite)
    }

    fn hypothesis(id: &str, tp: f64, cov: f64, mech: f64) -> Hypothesis {
        Hypothesis {
            id: id.to_string(),
            statement: format!("cause {id}"),
            temporal_precedence: tp,
            covariation: cov,
            mechanism_plausibility: mech,
            source_ids: vec!["kb:runbook".to_string()],
        }
    }

    #[test]
    fn test_definition_validates() {
        let def = definition(&Config::default()).unwrap();
        assert_eq!(def.name(), "causal-inference");
        assert_eq!(def.step_count(), 10);
    }

    #[tokio::test]
    async fn test_brainstorm_requires_five() {
        let response = json!({
            "hypotheses": [
                {"statement": "a"}, {"statement": "b"}, {"statement": "c"}
            ]
        })
        .to_string();
        let ctx = scripted_context(vec![response], vec![], vec![]);
        let mut state = WorkflowState::new();
        state
            .set_json(
                keys::ISSUE,
                &IssueAnalysis {
                    summary: "500s".to_string(),
                    symptoms: vec!["errors since Tuesday".to_string()],
                },
            )
            .unwrap();
        assert!(BrainstormStep.run(&state, &ctx).await.is_err());
    }

    #[tokio::test]
    async fn test_brainstorm_assigns_ids() {
        let statements: Vec<serde_json::Value> = (0..6)
            .map(|i| json!({"statement": format!("cause {i}")}))
            .collect();
        let response = json!({"hypotheses": statements}).to_string();
        let ctx = scripted_context(vec![response], vec![], vec![]);
        let mut state = WorkflowState::new();
        state
            .set_json(
                keys::ISSUE,
                &IssueAnalysis {
                    summary: "500s".to_string(),
                    symptoms: vec![],
                },
            )
            .unwrap();

        let update = BrainstormStep.run(&state, &ctx).await.unwrap();
        let mut merged = state.clone();
        merged.apply(&causal_schema(), "brainstorm", update).unwrap();
        let hypotheses: Vec<Hypothesis> = merged.get_as(keys::HYPOTHESES).unwrap();
        assert_eq!(hypotheses.len(), 6);
        assert_eq!(hypotheses[0].id, "h1");
        assert_eq!(hypotheses[5].id, "h6");
    }

    #[tokio::test]
    async fn test_validate_ranks_by_product() {
        let ctx = scripted_context(vec![], vec![], vec![]);
        let mut state = WorkflowState::new();
        state
            .set_json(
                keys::HYPOTHESES,
                &vec![
                    hypothesis("h1", 0.5, 0.5, 0.5), // 0.125
                    hypothesis("h2", 0.9, 0.9, 0.9), // 0.729
                    hypothesis("h3", 0.8, 0.7, 0.6), // 0.336
                ],
            )
            .unwrap();

        let update = ValidateHypothesesStep.run(&state, &ctx).await.unwrap();
        let mut merged = state.clone();
        merged
            .apply(&causal_schema(), "validate_hypotheses", update)
            .unwrap();
        let ranked: Vec<Hypothesis> = merged.get_as(keys::HYPOTHESES).unwrap();
        let ids: Vec<&str> = ranked.iter().map(|h| h.id.as_str()).collect();
        assert_eq!(ids, vec!["h2", "h3", "h1"]);
        assert_eq!(ranked[0].confidence(), ConfidenceLabel::High);
        assert_eq!(merged.counter(keys::LOOP_COUNT), 1);
    }

    #[test]
    fn test_validation_router_high_confidence_builds_graph() {
        let router = validation_router(2, "plan_evidence", "build_graph");
        let mut state = WorkflowState::new();
        state
            .set_json(keys::HYPOTHESES, &vec![hypothesis("h1", 0.9, 0.9, 0.9)])
            .unwrap();
        state.set(keys::LOOP_COUNT, json!(1));
        assert_eq!(router(&state).unwrap(), Next::Step("build_graph".to_string()));
    }

    #[test]
    fn test_validation_router_low_confidence_loops() {
        let router = validation_router(2, "plan_evidence", "build_graph");
        let mut state = WorkflowState::new();
        state
            .set_json(keys::HYPOTHESES, &vec![hypothesis("h1", 0.4, 0.4, 0.4)])
            .unwrap();
        state.set(keys::LOOP_COUNT, json!(1));
        assert_eq!(
            router(&state).unwrap(),
            Next::Step("plan_evidence".to_string())
        );
        // Loop cap forces graph construction.
        state.set(keys::LOOP_COUNT, json!(2));
        assert_eq!(router(&state).unwrap(), Next::Step("build_graph".to_string()));
    }

    #[tokio::test]
    async fn test_build_graph_has_symptom_and_edges() {
        let ctx = scripted_context(vec![], vec![], vec![]);
        let mut state = WorkflowState::new();
        state
            .set_json(
                keys::ISSUE,
                &IssueAnalysis {
                    summary: "service returns 500s".to_string(),
                    symptoms: vec!["500s since Tuesday".to_string()],
                },
            )
            .unwrap();
        state
            .set_json(
                keys::HYPOTHESES,
                &vec![
                    hypothesis("h1", 0.9, 0.9, 0.9), // causes
                    hypothesis("h2", 0.5, 0.5, 0.5), // correlates (0.125)
                    hypothesis("h3", 0.1, 0.1, 0.1), // contradicts (0.001)
                ],
            )
            .unwrap();

        let update = BuildGraphStep.run(&state, &ctx).await.unwrap();
        let mut merged = state.clone();
        merged.apply(&causal_schema(), "build_graph", update).unwrap();
        let graph: CausalGraph = merged.get_as(keys::CAUSAL_GRAPH).unwrap();

        assert_eq!(graph.nodes.len(), 4);
        assert!(graph.nodes.iter().any(|n| n.kind == CausalNodeKind::Symptom));
        assert_eq!(graph.edges.len(), 3);
        assert_eq!(graph.edges[0].relation, CausalRelation::Causes);
        assert_eq!(graph.edges[1].relation, CausalRelation::CorrelatesWith);
        assert_eq!(graph.edges[2].relation, CausalRelation::Contradicts);
    }

    #[tokio::test]
    async fn test_synthesize_names_top_hypothesis() {
        let ctx = scripted_context(
            vec!["The most likely cause is cause h2 [kb:runbook].".to_string()],
            vec![],
            vec![],
        );
        let mut state = WorkflowState::new();
        state.set(keys::QUERY, json!("why 500s"));
        state
            .set_json(keys::HYPOTHESES, &vec![hypothesis("h2", 0.9, 0.9, 0.9)])
            .unwrap();
        state
            .set_json(
                keys::CAUSAL_GRAPH,
                &CausalGraph {
                    nodes: vec![],
                    edges: vec![],
                },
            )
            .unwrap();

        let update = SynthesizeCausalStep.run(&state, &ctx).await.unwrap();
        let mut merged = state.clone();
        merged
            .apply(&causal_schema(), "synthesize_causal", update)
            .unwrap();
        let report = merged.text(keys::REPORT);
        assert!(report.contains("cause h2"));
        assert!(report.contains("high confidence"));
        assert!(report.contains("## Sources"));
    }
}
