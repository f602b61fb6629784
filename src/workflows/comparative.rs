//! The comparative workflow.
//!
//! The planner extracts the comparable items and assessment criteria;
//! gathering fans out one sub-query per (item, criterion) pair; the
//! analyzer fills an item-by-criterion matrix with per-cell provenance;
//! the synthesizer emits the matrix plus a recommendation.

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;

use super::research_schema;
use crate::config::Config;
use crate::engine::WorkflowDefinition;
use crate::error::{Error, ProviderError, Result};
use crate::providers::{FieldKind, OutputSchema, Prompt};
use crate::state::{
    ComparisonFrame, MatrixCell, MergeRule, SearchHit, SourceDocument, StateUpdate, WorkflowState,
    keys,
};
use crate::steps::synthesize::sources_appendix;
use crate::steps::{Step, StepContext, prompts};

fn frame_schema() -> OutputSchema {
    OutputSchema::new("comparison_frame")
        .required("items", FieldKind::Array)
        .required("criteria", FieldKind::Array)
}

/// Extracts the items under comparison and the assessment criteria.
pub struct ExtractFrameStep;

#[async_trait]
impl Step for ExtractFrameStep {
    fn name(&self) -> &'static str {
        "extract_comparison"
    }

    async fn run(&self, state: &WorkflowState, ctx: &StepContext) -> Result<StateUpdate> {
        let query = state.text(keys::QUERY).to_string();
        let prompt = Prompt::new(
            prompts::COMPARISON_EXTRACT_SYSTEM_PROMPT,
            format!("## Query\n{query}\n"),
        );
        let value = ctx
            .providers
            .generator
            .generate_structured(&prompt, &frame_schema())
            .await?;
        let frame: ComparisonFrame =
            serde_json::from_value(value).map_err(|e| Error::InvalidState {
                message: format!("comparison frame has unexpected shape: {e}"),
            })?;
        if frame.items.len() < 2 {
            return Err(Error::InvalidState {
                message: format!(
                    "comparison needs at least two items, got {}",
                    frame.items.len()
                ),
            });
        }
        if frame.criteria.len() < 2 {
            return Err(Error::InvalidState {
                message: format!(
                    "comparison needs at least two criteria, got {}",
                    frame.criteria.len()
                ),
            });
        }
        tracing::info!(
            items = frame.items.len(),
            criteria = frame.criteria.len(),
            "comparison frame extracted"
        );
        StateUpdate::new().with_json(keys::COMPARISON, &frame)
    }
}

/// Gathers evidence per (item, criterion) pair from both sources.
pub struct GatherMatrixStep;

#[async_trait]
impl Step for GatherMatrixStep {
    fn name(&self) -> &'static str {
        "gather_matrix"
    }

    async fn run(&self, state: &WorkflowState, ctx: &StepContext) -> Result<StateUpdate> {
        let frame: ComparisonFrame = state.get_as(keys::COMPARISON)?;
        let kb = ctx.kb_status().await?;

        let mut rag: Vec<SourceDocument> = Vec::new();
        let mut web: Vec<SearchHit> = Vec::new();
        let mut warnings: Vec<String> = Vec::new();
        let mut web_available = true;

        for item in &frame.items {
            for criterion in &frame.criteria {
                let query = format!("{item} {criterion}");
                if kb.is_usable() {
                    let embedding = ctx.providers.embedder.embed(&query).await?;
                    let hits = ctx
                        .providers
                        .retriever
                        .top_k(&ctx.config.collection, &embedding, ctx.config.top_k)
                        .await?;
                    rag.extend(hits);
                }
                if web_available {
                    match ctx.providers.web.search(&query).await {
                        Ok(hits) => web.extend(hits),
                        Err(Error::Provider(ProviderError::WebSearchUnavailable {
                            error_class,
                        })) => {
                            warnings.push(format!("web_search_unavailable: {error_class}"));
                            web_available = false;
                        }
                        Err(other) => return Err(other),
                    }
                }
            }
        }
        tracing::info!(rag = rag.len(), web = web.len(), "matrix evidence gathered");

        let mut update = StateUpdate::new()
            .with_json(keys::RAG_RESULTS, &rag)?
            .with_json(keys::SEARCH_RESULTS, &web)?;
        if !warnings.is_empty() {
            update = update.with(keys::GATHER_WARNINGS, json!(warnings));
        }
        Ok(update)
    }
}

fn cells_schema() -> OutputSchema {
    OutputSchema::new("comparison_matrix").required("cells", FieldKind::Array)
}

/// Builds the item-by-criterion matrix from the gathered evidence.
pub struct BuildMatrixStep;

#[async_trait]
impl Step for BuildMatrixStep {
    fn name(&self) -> &'static str {
        "build_matrix"
    }

    async fn run(&self, state: &WorkflowState, ctx: &StepContext) -> Result<StateUpdate> {
        let frame: ComparisonFrame = state.get_as(keys::COMPARISON)?;
        let rag: Vec<SourceDocument> = state.get_opt(keys::RAG_RESULTS)?.unwrap_or_default();
        let web: Vec<SearchHit> = state.get_opt(keys::SEARCH_RESULTS)?.unwrap_or_default();

        let valid_ids: std::collections::BTreeSet<&str> = rag
            .iter()
            .map(|d| d.source_id.as_str())
            .chain(web.iter().map(|h| h.url.as_str()))
            .collect();

        let prompt = Prompt::new(
            prompts::MATRIX_BUILDER_SYSTEM_PROMPT,
            format!(
                "## Items\n{}\n\n## Criteria\n{}\n\n{}",
                frame.items.join(", "),
                frame.criteria.join(", "),
                prompts::evidence_block(&rag, &web)
            ),
        );
        let value = ctx
            .providers
            .generator
            .generate_structured(&prompt, &cells_schema())
            .await?;
        let raw: Vec<MatrixCell> =
            serde_json::from_value(value["cells"].clone()).map_err(|e| Error::InvalidState {
                message: format!("matrix cells have unexpected shape: {e}"),
            })?;

        let mut cells = Vec::with_capacity(raw.len());
        for mut cell in raw {
            cell.source_ids.retain(|id| valid_ids.contains(id.as_str()));
            if cell.source_ids.is_empty() {
                tracing::warn!(
                    item = %cell.item,
                    criterion = %cell.criterion,
                    "dropping matrix cell without provenance"
                );
                continue;
            }
            cells.push(cell);
        }
        if cells.is_empty() {
            return Err(Error::InvalidState {
                message: "matrix analysis produced no sourced cells".to_string(),
            });
        }
        tracing::info!(cells = cells.len(), "matrix built");
        StateUpdate::new().with_json(keys::MATRIX, &cells)
    }
}

/// Renders the matrix as a markdown table.
fn render_matrix(frame: &ComparisonFrame, cells: &[MatrixCell]) -> String {
    let mut out = String::from("| |");
    for criterion in &frame.criteria {
        out.push_str(&format!(" {criterion} |"));
    }
    out.push_str("\n|---|");
    out.push_str(&"---|".repeat(frame.criteria.len()));
    out.push('\n');
    for item in &frame.items {
        out.push_str(&format!("| **{item}** |"));
        for criterion in &frame.criteria {
            let cell = cells
                .iter()
                .find(|c| &c.item == item && &c.criterion == criterion);
            match cell {
                Some(cell) => {
                    let ids: Vec<String> =
                        cell.source_ids.iter().map(|id| format!("[{id}]")).collect();
                    out.push_str(&format!(" {} {} |", cell.assessment, ids.join(" ")));
                }
                None => out.push_str(" — |"),
            }
        }
        out.push('\n');
    }
    out
}

/// Synthesizes the matrix section plus a recommendation.
pub struct SynthesizeComparisonStep;

#[async_trait]
impl Step for SynthesizeComparisonStep {
    fn name(&self) -> &'static str {
        "synthesize_comparison"
    }

    async fn run(&self, state: &WorkflowState, ctx: &StepContext) -> Result<StateUpdate> {
        let frame: ComparisonFrame = state.get_as(keys::COMPARISON)?;
        let cells: Vec<MatrixCell> = state.get_as(keys::MATRIX)?;
        let rag: Vec<SourceDocument> = state.get_opt(keys::RAG_RESULTS)?.unwrap_or_default();
        let web: Vec<SearchHit> = state.get_opt(keys::SEARCH_RESULTS)?.unwrap_or_default();

        let matrix_table = render_matrix(&frame, &cells);
        let prompt = Prompt::new(
            prompts::COMPARISON_SYNTHESIZER_SYSTEM_PROMPT,
            format!(
                "## Query\n{}\n\n## Completed matrix\n{matrix_table}\n",
                state.text(keys::QUERY)
            ),
        );
        let recommendation = ctx.providers.generator.generate(&prompt).await?;

        let cited: Vec<String> = cells
            .iter()
            .flat_map(|c| c.source_ids.iter().cloned())
            .collect();
        let report = format!(
            "## 1. Comparison matrix\n\n{matrix_table}\n## 2. Recommendation\n\n{recommendation}\n{}",
            sources_appendix(&cited, &rag, &web)
        );
        Ok(StateUpdate::new().with(keys::REPORT, json!(report)))
    }
}

/// Builds the comparative workflow definition.
///
/// # Errors
///
/// Returns an error if graph validation fails.
pub fn definition(_config: &Config) -> Result<WorkflowDefinition> {
    WorkflowDefinition::builder("comparative")
        .description(
            "Item-by-criterion comparison: extract frame, gather per pair, \
             matrix plus recommendation",
        )
        .schema(
            research_schema()
                .field(keys::COMPARISON, MergeRule::Overwrite)
                .field(keys::MATRIX, MergeRule::Overwrite),
        )
        .step(Arc::new(ExtractFrameStep))
        .step(Arc::new(GatherMatrixStep))
        .step(Arc::new(BuildMatrixStep))
        .step(Arc::new(SynthesizeComparisonStep))
        .entry("extract_comparison")
        .edge("extract_comparison", "gather_matrix")
        .edge("gather_matrix", "build_matrix")
        .edge("build_matrix", "synthesize_comparison")
        .terminal("synthesize_comparison")
        .build()
}
