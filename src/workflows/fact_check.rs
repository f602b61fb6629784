//! The fact-check workflow.
//!
//! Extends the single-pass pipeline with an evidence-categorization step
//! between the analyzer and the synthesizer: each note is labeled
//! supporting, contradicting, or neutral with a confidence, and the
//! verdict synthesizer rules true, false, or unverified with per-claim
//! confidences.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::research_schema;
use crate::config::Config;
use crate::engine::WorkflowDefinition;
use crate::error::Result;
use crate::providers::{FieldKind, OutputSchema, Prompt};
use crate::state::{
    AnalyzedNote, EvidenceLabel, EvidenceStance, MergeRule, SearchHit, SourceDocument,
    StateUpdate, WorkflowState, keys,
};
use crate::steps::synthesize::{cited_ids, sources_appendix};
use crate::steps::{
    AnalyzeStep, EvaluateStep, PlanStep, RetrieveStep, Step, StepContext, WebSearchStep, prompts,
    sufficiency_router,
};

fn labels_schema() -> OutputSchema {
    OutputSchema::new("evidence_labels").required("labels", FieldKind::Array)
}

/// Labels each analyzed note's stance toward the claim.
pub struct CategorizeEvidenceStep;

#[async_trait]
impl Step for CategorizeEvidenceStep {
    fn name(&self) -> &'static str {
        "categorize_evidence"
    }

    async fn run(&self, state: &WorkflowState, ctx: &StepContext) -> Result<StateUpdate> {
        let notes: Vec<AnalyzedNote> = state.get_opt(keys::NOTES)?.unwrap_or_default();
        if notes.is_empty() {
            return StateUpdate::new().with_json(keys::EVIDENCE_LABELS, &Vec::<EvidenceLabel>::new());
        }

        let claim = state.text(keys::QUERY).to_string();
        let prompt = Prompt::new(
            prompts::EVIDENCE_CATEGORIZER_SYSTEM_PROMPT,
            format!(
                "## Claim\n{claim}\n\n## Notes\n{}",
                prompts::notes_block(&notes)
            ),
        );
        let value = ctx
            .providers
            .generator
            .generate_structured(&prompt, &labels_schema())
            .await?;
        let mut labels: Vec<EvidenceLabel> = serde_json::from_value(value["labels"].clone())
            .map_err(|e| crate::Error::InvalidState {
                message: format!("evidence labels have unexpected shape: {e}"),
            })?;
        labels.retain(|label| label.note_index < notes.len());
        for label in &mut labels {
            label.confidence = label.confidence.clamp(0.0, 1.0);
        }
        tracing::info!(labels = labels.len(), "evidence categorized");
        StateUpdate::new().with_json(keys::EVIDENCE_LABELS, &labels)
    }
}

fn verdict_output_schema() -> OutputSchema {
    OutputSchema::new("fact_verdict")
        .required("verdict", FieldKind::String)
        .required("confidence", FieldKind::Number)
        .required("claims", FieldKind::Array)
        .required("explanation", FieldKind::String)
}

#[derive(Deserialize)]
struct RawClaim {
    claim: String,
    confidence: f64,
    #[serde(default)]
    source_ids: Vec<String>,
}

const fn stance_name(stance: EvidenceStance) -> &'static str {
    match stance {
        EvidenceStance::Supporting => "supporting",
        EvidenceStance::Contradicting => "contradicting",
        EvidenceStance::Neutral => "neutral",
    }
}

/// Rules on the claim from the labeled evidence and writes the report.
pub struct FactVerdictStep;

#[async_trait]
impl Step for FactVerdictStep {
    fn name(&self) -> &'static str {
        "synthesize_verdict"
    }

    async fn run(&self, state: &WorkflowState, ctx: &StepContext) -> Result<StateUpdate> {
        let claim = state.text(keys::QUERY).to_string();
        let notes: Vec<AnalyzedNote> = state.get_opt(keys::NOTES)?.unwrap_or_default();
        let labels: Vec<EvidenceLabel> = state.get_opt(keys::EVIDENCE_LABELS)?.unwrap_or_default();
        let rag: Vec<SourceDocument> = state.get_opt(keys::RAG_RESULTS)?.unwrap_or_default();
        let web: Vec<SearchHit> = state.get_opt(keys::SEARCH_RESULTS)?.unwrap_or_default();

        let labeled_block: String = labels
            .iter()
            .map(|label| {
                format!(
                    "[note {}] {} (confidence {:.2})\n",
                    label.note_index,
                    stance_name(label.stance),
                    label.confidence
                )
            })
            .collect();
        let prompt = Prompt::new(
            prompts::FACT_VERDICT_SYSTEM_PROMPT,
            format!(
                "## Claim\n{claim}\n\n## Notes\n{}\n## Stance labels\n{labeled_block}",
                prompts::notes_block(&notes)
            ),
        );
        let value = ctx
            .providers
            .generator
            .generate_structured(&prompt, &verdict_output_schema())
            .await?;

        let verdict = match value["verdict"].as_str().unwrap_or_default() {
            "true" => "true",
            "false" => "false",
            other => {
                if other != "unverified" {
                    tracing::warn!(verdict = other, "unknown verdict, treating as unverified");
                }
                "unverified"
            }
        };
        let confidence = value["confidence"].as_f64().unwrap_or(0.0).clamp(0.0, 1.0);
        let claims: Vec<RawClaim> =
            serde_json::from_value(value["claims"].clone()).unwrap_or_default();
        let explanation = value["explanation"].as_str().unwrap_or_default();

        let supporting = labels
            .iter()
            .filter(|l| l.stance == EvidenceStance::Supporting)
            .count();
        let contradicting = labels
            .iter()
            .filter(|l| l.stance == EvidenceStance::Contradicting)
            .count();

        let mut body = format!(
            "## 1. Verdict\n\n**{verdict}** (confidence {confidence:.2})\n\n\
             Claim: {claim}\n\n\
             Evidence balance: {supporting} supporting, {contradicting} contradicting, \
             {} neutral.\n\n## 2. Claims\n\n",
            labels.len() - supporting - contradicting
        );
        for raw in &claims {
            let sources = if raw.source_ids.is_empty() {
                "(inferred)".to_string()
            } else {
                raw.source_ids
                    .iter()
                    .map(|id| format!("[{id}]"))
                    .collect::<Vec<_>>()
                    .join(" ")
            };
            body.push_str(&format!(
                "- {} — confidence {:.2} {sources}\n",
                raw.claim,
                raw.confidence.clamp(0.0, 1.0)
            ));
        }
        body.push_str(&format!("\n## 3. Explanation\n\n{explanation}\n"));

        let report = format!("{body}{}", sources_appendix(&cited_ids(&notes), &rag, &web));
        tracing::info!(verdict, confidence, "fact-check verdict synthesized");
        Ok(StateUpdate::new().with(keys::REPORT, json!(report)))
    }
}

/// Builds the fact-check workflow definition.
///
/// # Errors
///
/// Returns an error if graph validation fails.
pub fn definition(config: &Config) -> Result<WorkflowDefinition> {
    WorkflowDefinition::builder("fact-check")
        .description(
            "Claim verification: gather evidence, label stances, rule true/false/unverified",
        )
        .schema(research_schema().field(keys::EVIDENCE_LABELS, MergeRule::Overwrite))
        .step(Arc::new(PlanStep))
        .step(Arc::new(RetrieveStep))
        .step(Arc::new(WebSearchStep))
        .step(Arc::new(AnalyzeStep))
        .step(Arc::new(CategorizeEvidenceStep))
        .step(Arc::new(EvaluateStep))
        .step(Arc::new(FactVerdictStep))
        .entry("plan")
        .fan_out("plan", &["retrieve", "web_search"], "analyze")
        .edge("analyze", "categorize_evidence")
        .edge("categorize_evidence", "evaluate")
        .conditional(
            "evaluate",
            &["synthesize_verdict", "plan"],
            false,
            sufficiency_router(config.max_loops, "synthesize_verdict", "plan"),
        )
        .terminal("synthesize_verdict")
        .budget(keys::LOOP_COUNT, config.max_loops)
        .build()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::testing::scripted_context;

    #[test]
    fn test_definition_validates() {
        let def = definition(&Config::default()).unwrap();
        assert_eq!(def.name(), "fact-check");
        assert_eq!(def.step_count(), 7);
    }

    fn note(summary: &str, id: &str) -> AnalyzedNote {
        AnalyzedNote {
            summary: summary.to_string(),
            content: "c".to_string(),
            source_ids: vec![id.to_string()],
            conflicts: vec![],
        }
    }

    #[tokio::test]
    async fn test_categorize_labels_notes() {
        let response = json!({
            "labels": [
                {"note_index": 0, "stance": "supporting", "confidence": 0.9},
                {"note_index": 1, "stance": "contradicting", "confidence": 1.7},
                {"note_index": 9, "stance": "neutral", "confidence": 0.5},
            ]
        })
        .to_string();
        let ctx = scripted_context(vec![response], vec![], vec![]);
        let mut state = WorkflowState::new();
        state.set(keys::QUERY, json!("the claim"));
        state
            .set_json(keys::NOTES, &vec![note("a", "s1"), note("b", "s2")])
            .unwrap();

        let update = CategorizeEvidenceStep.run(&state, &ctx).await.unwrap();
        let mut merged = WorkflowState::new();
        merged
            .apply(
                &research_schema().field(keys::EVIDENCE_LABELS, MergeRule::Overwrite),
                "categorize_evidence",
                update,
            )
            .unwrap();
        let labels: Vec<EvidenceLabel> = merged.get_as(keys::EVIDENCE_LABELS).unwrap();
        // Out-of-range index dropped, confidence clamped.
        assert_eq!(labels.len(), 2);
        assert!((labels[1].confidence - 1.0).abs() < f64::EPSILON);
    }

    #[tokio::test]
    async fn test_categorize_empty_notes_skips_generator() {
        let ctx = scripted_context(vec![], vec![], vec![]);
        let mut state = WorkflowState::new();
        state.set(keys::QUERY, json!("claim"));
        let update = CategorizeEvidenceStep.run(&state, &ctx).await.unwrap();
        assert!(!update.is_empty());
    }

    #[tokio::test]
    async fn test_verdict_report_structure() {
        let response = json!({
            "verdict": "true",
            "confidence": 0.85,
            "claims": [
                {"claim": "the part that holds", "confidence": 0.9, "source_ids": ["s1"]}
            ],
            "explanation": "supported by [s1]"
        })
        .to_string();
        let ctx = scripted_context(vec![response], vec![], vec![]);
        let mut state = WorkflowState::new();
        state.set(keys::QUERY, json!("the claim"));
        state.set_json(keys::NOTES, &vec![note("a", "s1")]).unwrap();
        state
            .set_json(
                keys::EVIDENCE_LABELS,
                &vec![EvidenceLabel {
                    note_index: 0,
                    stance: EvidenceStance::Supporting,
                    confidence: 0.9,
                }],
            )
            .unwrap();

        let update = FactVerdictStep.run(&state, &ctx).await.unwrap();
        let mut merged = WorkflowState::new();
        merged
            .apply(
                &research_schema().field(keys::EVIDENCE_LABELS, MergeRule::Overwrite),
                "synthesize_verdict",
                update,
            )
            .unwrap();
        let report = merged.text(keys::REPORT);
        assert!(report.contains("**true**"));
        assert!(report.contains("1 supporting, 0 contradicting"));
        assert!(report.contains("[s1]"));
        assert!(report.contains("## Sources"));
    }

    #[tokio::test]
    async fn test_unknown_verdict_becomes_unverified() {
        let response = json!({
            "verdict": "probably",
            "confidence": 0.4,
            "claims": [],
            "explanation": "thin evidence"
        })
        .to_string();
        let ctx = scripted_context(vec![response], vec![], vec![]);
        let mut state = WorkflowState::new();
        state.set(keys::QUERY, json!("claim"));

        let update = FactVerdictStep.run(&state, &ctx).await.unwrap();
        let mut merged = WorkflowState::new();
        merged
            .apply(
                &research_schema().field(keys::EVIDENCE_LABELS, MergeRule::Overwrite),
                "synthesize_verdict",
                update,
            )
            .unwrap();
        assert!(merged.text(keys::REPORT).contains("**unverified**"));
    }
}
