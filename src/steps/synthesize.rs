//! The synthesizer step.
//!
//! Produces the final report body: generator-written numbered sections
//! with inline citations, plus a deterministic Sources appendix assembled
//! from the provenance carried by the notes. Terminal for the local loop.

use std::collections::BTreeMap;

use async_trait::async_trait;

use super::{Step, StepContext, prompts};
use crate::error::Result;
use crate::providers::Prompt;
use crate::state::{
    AnalyzedNote, MasterPlan, SearchHit, SourceDocument, StateUpdate, WorkflowState, keys,
};

/// Maximum characters of source text quoted in the appendix.
const SOURCE_SNIPPET_LEN: usize = 120;

/// Builds the Sources appendix for a set of cited ids, resolving each id
/// against the gathered evidence. Ids appear in first-citation order.
pub(crate) fn sources_appendix(
    cited: &[String],
    rag: &[SourceDocument],
    web: &[SearchHit],
) -> String {
    let mut details: BTreeMap<&str, String> = BTreeMap::new();
    for doc in rag {
        details
            .entry(doc.source_id.as_str())
            .or_insert_with(|| snippet(&doc.text));
    }
    for hit in web {
        details
            .entry(hit.url.as_str())
            .or_insert_with(|| format!("{} — {}", hit.title, snippet(&hit.snippet)));
    }

    let mut out = String::from("\n## Sources\n\n");
    let mut seen = std::collections::BTreeSet::new();
    for id in cited {
        if !seen.insert(id.as_str()) {
            continue;
        }
        let detail = details.get(id.as_str()).cloned().unwrap_or_default();
        if detail.is_empty() {
            out.push_str(&format!("- [{id}]\n"));
        } else {
            out.push_str(&format!("- [{id}] {detail}\n"));
        }
    }
    out
}

fn snippet(text: &str) -> String {
    let trimmed = text.trim().replace('\n', " ");
    let cut = crate::io::grapheme_truncate(&trimmed, SOURCE_SNIPPET_LEN);
    if cut.len() == trimmed.len() {
        trimmed
    } else {
        format!("{cut}…")
    }
}

/// Collects cited ids from notes in order of first appearance.
pub(crate) fn cited_ids(notes: &[AnalyzedNote]) -> Vec<String> {
    let mut seen = std::collections::BTreeSet::new();
    let mut ids = Vec::new();
    for note in notes {
        for id in &note.source_ids {
            if seen.insert(id.clone()) {
                ids.push(id.clone());
            }
        }
    }
    ids
}

/// The synthesizer step: mode-aware (single-pass or hierarchical), writes
/// the final report body with its Sources appendix.
pub struct SynthesizeStep;

#[async_trait]
impl Step for SynthesizeStep {
    fn name(&self) -> &'static str {
        "synthesize"
    }

    async fn run(&self, state: &WorkflowState, ctx: &StepContext) -> Result<StateUpdate> {
        let query = state.text(keys::QUERY).to_string();
        let rag: Vec<SourceDocument> = state.get_opt(keys::RAG_RESULTS)?.unwrap_or_default();
        let web: Vec<SearchHit> = state.get_opt(keys::SEARCH_RESULTS)?.unwrap_or_default();

        let hierarchical = state.text(keys::MODE) == "hierarchical";
        let (prompt, notes) = if hierarchical {
            let plan: MasterPlan = state.get_as(keys::PLAN)?;
            let results: BTreeMap<String, Vec<AnalyzedNote>> =
                state.get_opt(keys::SUBTASK_RESULTS)?.unwrap_or_default();
            let all_notes: Vec<AnalyzedNote> =
                results.values().flat_map(|notes| notes.iter().cloned()).collect();
            (
                Prompt::new(
                    prompts::HIERARCHICAL_SYNTHESIZER_SYSTEM_PROMPT,
                    prompts::hierarchical_synthesizer_user(&query, &plan.subtasks, &results),
                ),
                all_notes,
            )
        } else {
            let notes: Vec<AnalyzedNote> = state.get_opt(keys::NOTES)?.unwrap_or_default();
            (
                Prompt::new(
                    prompts::SYNTHESIZER_SYSTEM_PROMPT,
                    prompts::synthesizer_user(&query, &notes),
                ),
                notes,
            )
        };

        let body = ctx.providers.generator.generate(&prompt).await?;
        let report = format!("{body}\n{}", sources_appendix(&cited_ids(&notes), &rag, &web));
        tracing::info!(hierarchical, chars = report.len(), "report synthesized");
        Ok(StateUpdate::new().with(keys::REPORT, serde_json::Value::String(report)))
    }
}
