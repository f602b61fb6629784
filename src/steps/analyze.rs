//! The analyzer step.
//!
//! Summarizes and reconciles accumulated retrieval and web results into
//! analyzed notes. Provenance is enforced here: note source ids are
//! filtered to ids that actually appeared in the gathered evidence, and a
//! note left without provenance is dropped rather than passed downstream.

use std::collections::BTreeSet;

use async_trait::async_trait;

use super::{Step, StepContext, prompts};
use crate::error::Result;
use crate::providers::{FieldKind, OutputSchema, Prompt};
use crate::state::{AnalyzedNote, SearchHit, SourceDocument, StateUpdate, WorkflowState, keys};

fn notes_schema() -> OutputSchema {
    OutputSchema::new("analyzed_notes").required("notes", FieldKind::Array)
}

/// Analyzes gathered evidence into provenance-carrying notes.
pub(crate) async fn analyze(
    question: &str,
    rag: &[SourceDocument],
    web: &[SearchHit],
    ctx: &StepContext,
) -> Result<Vec<AnalyzedNote>> {
    if rag.is_empty() && web.is_empty() {
        return Ok(Vec::new());
    }

    let valid_ids: BTreeSet<&str> = rag
        .iter()
        .map(|d| d.source_id.as_str())
        .chain(web.iter().map(|h| h.url.as_str()))
        .collect();

    let prompt = Prompt::new(
        prompts::ANALYZER_SYSTEM_PROMPT,
        prompts::analyzer_user(question, rag, web),
    );
    let value = ctx
        .providers
        .generator
        .generate_structured(&prompt, &notes_schema())
        .await?;
    let raw: Vec<AnalyzedNote> = serde_json::from_value(value["notes"].clone()).map_err(|e| {
        crate::Error::InvalidState {
            message: format!("analyzed notes have unexpected shape: {e}"),
        }
    })?;

    let mut notes = Vec::with_capacity(raw.len());
    for mut note in raw {
        note.source_ids.retain(|id| valid_ids.contains(id.as_str()));
        if note.source_ids.is_empty() {
            tracing::warn!(summary = %note.summary, "dropping note without valid provenance");
            continue;
        }
        notes.push(note);
    }
    Ok(notes)
}

/// The analyzer step: reads accumulated evidence, appends analyzed notes.
pub struct AnalyzeStep;

#[async_trait]
impl Step for AnalyzeStep {
    fn name(&self) -> &'static str {
        "analyze"
    }

    async fn run(&self, state: &WorkflowState, ctx: &StepContext) -> Result<StateUpdate> {
        let query = state.text(keys::QUERY).to_string();
        let rag: Vec<SourceDocument> = state.get_opt(keys::RAG_RESULTS)?.unwrap_or_default();
        let web: Vec<SearchHit> = state.get_opt(keys::SEARCH_RESULTS)?.unwrap_or_default();
        let notes = analyze(&query, &rag, &web, ctx).await?;
        tracing::info!(count = notes.len(), "analysis complete");
        StateUpdate::new().with_json(keys::NOTES, &notes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::steps::testing::scripted_context;
    use std::collections::BTreeMap;

    fn rag_doc(id: &str) -> SourceDocument {
        SourceDocument {
            text: format!("evidence from {id}"),
            source_id: id.to_string(),
            score: 0.8,
            metadata: BTreeMap::new(),
        }
    }

    fn web_hit(url: &str) -> SearchHit {
        SearchHit {
            title: "t".to_string(),
            snippet: "s".to_string(),
            url: url.to_string(),
            score: 0.9,
        }
    }

    fn notes_response(notes: serde_json::Value) -> String {
        serde_json::json!({ "notes": notes }).to_string()
    }

    #[tokio::test]
    async fn test_empty_evidence_yields_no_notes_and_no_calls() {
        // Scripted generator would fail if called; it is not.
        let ctx = scripted_context(vec![], vec![], vec![]);
        let notes = analyze("q", &[], &[], &ctx).await.unwrap();
        assert!(notes.is_empty());
    }

    #[tokio::test]
    async fn test_notes_keep_valid_provenance() {
        let response = notes_response(serde_json::json!([
            {"summary": "s1", "content": "c1", "source_ids": ["kb:1", "https://w"]},
        ]));
        let ctx = scripted_context(vec![response], vec![], vec![]);
        let notes = analyze("q", &[rag_doc("kb:1")], &[web_hit("https://w")], &ctx)
            .await
            .unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].source_ids, vec!["kb:1", "https://w"]);
    }

    #[tokio::test]
    async fn test_invented_ids_filtered_and_unsourced_notes_dropped() {
        let response = notes_response(serde_json::json!([
            {"summary": "good", "content": "c", "source_ids": ["kb:1", "made-up"]},
            {"summary": "fabricated", "content": "c", "source_ids": ["ghost"]},
        ]));
        let ctx = scripted_context(vec![response], vec![], vec![]);
        let notes = analyze("q", &[rag_doc("kb:1")], &[], &ctx).await.unwrap();
        assert_eq!(notes.len(), 1);
        assert_eq!(notes[0].summary, "good");
        assert_eq!(notes[0].source_ids, vec!["kb:1"]);
    }

    #[tokio::test]
    async fn test_conflicts_recorded_not_resolved() {
        let response = notes_response(serde_json::json!([
            {
                "summary": "disputed",
                "content": "sources disagree",
                "source_ids": ["kb:1"],
                "conflicts": ["kb:1 says X, https://w says Y"]
            },
        ]));
        let ctx = scripted_context(vec![response], vec![], vec![]);
        let notes = analyze("q", &[rag_doc("kb:1")], &[web_hit("https://w")], &ctx)
            .await
            .unwrap();
        assert_eq!(notes[0].conflicts.len(), 1);
    }

    #[tokio::test]
    async fn test_step_reads_accumulated_fields() {
        let response = notes_response(serde_json::json!([
            {"summary": "s", "content": "c", "source_ids": ["kb:1"]},
        ]));
        let ctx = scripted_context(vec![response], vec![], vec![]);
        let mut state = WorkflowState::new();
        state.set(keys::QUERY, serde_json::json!("q"));
        state.set_json(keys::RAG_RESULTS, &vec![rag_doc("kb:1")]).unwrap();

        let update = AnalyzeStep.run(&state, &ctx).await.unwrap();
        let fields: Vec<&str> = update.field_names().collect();
        assert_eq!(fields, vec![keys::NOTES]);
    }
}
