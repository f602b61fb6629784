//! The code-investigation workflow.
//!
//! Classifies the question's intent, retrieves from the code collection,
//! runs the dependency analyzer and flow tracker in parallel over the
//! retrieved chunks, and synthesizes a report of structured, cited
//! findings. The extractors are deterministic regex passes per language;
//! unknown languages fall back to generator-only analysis at synthesis.

use std::sync::Arc;

use async_trait::async_trait;
use regex::Regex;
use serde_json::json;

use super::research_schema;
use crate::config::Config;
use crate::engine::WorkflowDefinition;
use crate::error::{Error, PreprocessError, Result};
use crate::providers::{FieldKind, OutputSchema, Prompt};
use crate::state::{
    CodeFinding, CodeIntent, MergeRule, SourceDocument, StateUpdate, WorkflowState, keys,
};
use crate::steps::synthesize::sources_appendix;
use crate::steps::{Step, StepContext, prompts};

fn intent_schema() -> OutputSchema {
    OutputSchema::new("code_intent")
        .required("intent", FieldKind::String)
        .required("reason", FieldKind::String)
}

fn parse_intent(raw: &str) -> Option<CodeIntent> {
    match raw {
        "dependency" => Some(CodeIntent::Dependency),
        "flow" => Some(CodeIntent::Flow),
        "usage" => Some(CodeIntent::Usage),
        "architecture" => Some(CodeIntent::Architecture),
        "implementation" => Some(CodeIntent::Implementation),
        _ => None,
    }
}

/// Classifies what the question asks of the codebase.
pub struct ClassifyIntentStep;

#[async_trait]
impl Step for ClassifyIntentStep {
    fn name(&self) -> &'static str {
        "classify_intent"
    }

    async fn run(&self, state: &WorkflowState, ctx: &StepContext) -> Result<StateUpdate> {
        let prompt = Prompt::new(
            prompts::CODE_INTENT_SYSTEM_PROMPT,
            format!("## Question\n{}\n", state.text(keys::QUERY)),
        );
        let value = ctx
            .providers
            .generator
            .generate_structured(&prompt, &intent_schema())
            .await?;
        let intent = value["intent"]
            .as_str()
            .and_then(parse_intent)
            .unwrap_or_else(|| {
                tracing::warn!("unknown intent, defaulting to implementation");
                CodeIntent::Implementation
            });
        tracing::info!(?intent, "intent classified");
        StateUpdate::new().with_json(keys::INTENT, &intent)
    }
}

/// Fetches the chunks nearest the question from the code collection.
pub struct CodeRetrieveStep;

#[async_trait]
impl Step for CodeRetrieveStep {
    fn name(&self) -> &'static str {
        "retrieve_code"
    }

    async fn run(&self, state: &WorkflowState, ctx: &StepContext) -> Result<StateUpdate> {
        let query = state.text(keys::QUERY);
        let embedding = ctx.providers.embedder.embed(query).await?;
        let hits = ctx
            .providers
            .retriever
            .top_k(
                &ctx.config.code_collection,
                &embedding,
                ctx.config.top_k * 2,
            )
            .await?;
        tracing::info!(count = hits.len(), "code chunks retrieved");
        StateUpdate::new().with_json(keys::RAG_RESULTS, &hits)
    }
}

/// One compiled language extractor: pattern plus finding template.
struct Extractor {
    pattern: Regex,
    describe: fn(&str) -> String,
}

fn dependency_extractors() -> Result<Vec<Extractor>> {
    let compile = |p: &str| -> Result<Regex> {
        Regex::new(p).map_err(|e| Error::Preprocess(PreprocessError::from(e)))
    };
    Ok(vec![
        Extractor {
            pattern: compile(r"(?m)^\s*(?:pub\s+)?use\s+([A-Za-z_][\w:]*)")?,
            describe: |m| format!("imports `{m}`"),
        },
        Extractor {
            pattern: compile(r"(?m)^\s*(?:pub\s+)?mod\s+([A-Za-z_]\w*)")?,
            describe: |m| format!("declares module `{m}`"),
        },
        Extractor {
            pattern: compile(r"(?m)^\s*(?:from\s+[\w.]+\s+)?import\s+([\w.]+)")?,
            describe: |m| format!("imports `{m}`"),
        },
        Extractor {
            pattern: compile(r#"require\(['"]([^'"]+)['"]\)"#)?,
            describe: |m| format!("requires `{m}`"),
        },
        Extractor {
            pattern: compile(r#"(?m)^\s*import\s+.*from\s+['"]([^'"]+)['"]"#)?,
            describe: |m| format!("imports from `{m}`"),
        },
    ])
}

fn flow_extractors() -> Result<Vec<Extractor>> {
    let compile = |p: &str| -> Result<Regex> {
        Regex::new(p).map_err(|e| Error::Preprocess(PreprocessError::from(e)))
    };
    Ok(vec![
        Extractor {
            pattern: compile(r"(?m)^\s*(?:pub\s+)?(?:async\s+)?fn\s+([A-Za-z_]\w*)")?,
            describe: |m| format!("defines function `{m}`"),
        },
        Extractor {
            pattern: compile(r"(?m)^\s*(?:async\s+)?def\s+([A-Za-z_]\w*)")?,
            describe: |m| format!("defines function `{m}`"),
        },
        Extractor {
            pattern: compile(r"(?m)function\s+([A-Za-z_$][\w$]*)")?,
            describe: |m| format!("defines function `{m}`"),
        },
        Extractor {
            pattern: compile(r"(?m)^\s*(?:pub\s+)?(?:struct|enum|trait|class|interface)\s+([A-Za-z_]\w*)")?,
            describe: |m| format!("defines type `{m}`"),
        },
    ])
}

fn extract_findings(
    kind: &str,
    extractors: &[Extractor],
    documents: &[SourceDocument],
) -> Vec<CodeFinding> {
    let mut findings = Vec::new();
    for doc in documents {
        let region = doc
            .metadata
            .get("path")
            .cloned()
            .unwrap_or_else(|| doc.source_id.clone());
        let mut seen = std::collections::BTreeSet::new();
        for extractor in extractors {
            for capture in extractor.pattern.captures_iter(&doc.text) {
                if let Some(name) = capture.get(1) {
                    let detail = (extractor.describe)(name.as_str());
                    if seen.insert(detail.clone()) {
                        findings.push(CodeFinding {
                            kind: kind.to_string(),
                            detail,
                            region: region.clone(),
                            source_ids: vec![doc.source_id.clone()],
                        });
                    }
                }
            }
        }
    }
    findings
}

/// Extracts dependency relations from the retrieved chunks.
pub struct DependencyAnalyzeStep;

#[async_trait]
impl Step for DependencyAnalyzeStep {
    fn name(&self) -> &'static str {
        "analyze_dependencies"
    }

    async fn run(&self, state: &WorkflowState, _ctx: &StepContext) -> Result<StateUpdate> {
        let documents: Vec<SourceDocument> = state.get_opt(keys::RAG_RESULTS)?.unwrap_or_default();
        let findings = extract_findings("dependency", &dependency_extractors()?, &documents);
        tracing::info!(count = findings.len(), "dependencies extracted");
        StateUpdate::new().with_json(keys::CODE_FINDINGS, &findings)
    }
}

/// Extracts definitions and flow anchors from the retrieved chunks.
pub struct FlowTraceStep;

#[async_trait]
impl Step for FlowTraceStep {
    fn name(&self) -> &'static str {
        "trace_flow"
    }

    async fn run(&self, state: &WorkflowState, _ctx: &StepContext) -> Result<StateUpdate> {
        let documents: Vec<SourceDocument> = state.get_opt(keys::RAG_RESULTS)?.unwrap_or_default();
        let findings = extract_findings("flow", &flow_extractors()?, &documents);
        tracing::info!(count = findings.len(), "flow anchors extracted");
        StateUpdate::new().with_json(keys::CODE_FINDINGS, &findings)
    }
}

/// Synthesizes the findings report for the classified intent.
pub struct SynthesizeCodeStep;

#[async_trait]
impl Step for SynthesizeCodeStep {
    fn name(&self) -> &'static str {
        "synthesize_code"
    }

    async fn run(&self, state: &WorkflowState, ctx: &StepContext) -> Result<StateUpdate> {
        let intent: CodeIntent = state.get_opt(keys::INTENT)?.unwrap_or(CodeIntent::Implementation);
        let findings: Vec<CodeFinding> = state.get_opt(keys::CODE_FINDINGS)?.unwrap_or_default();
        let documents: Vec<SourceDocument> = state.get_opt(keys::RAG_RESULTS)?.unwrap_or_default();

        let mut findings_block = String::new();
        for finding in &findings {
            findings_block.push_str(&format!(
                "- ({}) {} at {} [{}]\n",
                finding.kind,
                finding.detail,
                finding.region,
                finding.source_ids.join(", ")
            ));
        }
        let prompt = Prompt::new(
            prompts::CODE_SYNTHESIZER_SYSTEM_PROMPT,
            format!(
                "## Question\n{}\n\n## Intent\n{intent:?}\n\n## Findings\n{findings_block}\n{}",
                state.text(keys::QUERY),
                prompts::evidence_block(&documents, &[])
            ),
        );
        let body = ctx.providers.generator.generate(&prompt).await?;

        let mut structured = String::from("\n## Findings\n\n");
        if findings.is_empty() {
            structured.push_str("No structured findings extracted from the retrieved code.\n");
        }
        structured.push_str(&findings_block);

        let cited: Vec<String> = findings
            .iter()
            .flat_map(|f| f.source_ids.iter().cloned())
            .collect();
        let report = format!(
            "{body}\n{structured}{}",
            sources_appendix(&cited, &documents, &[])
        );
        Ok(StateUpdate::new().with(keys::REPORT, json!(report)))
    }
}

/// Builds the code-investigation workflow definition.
///
/// # Errors
///
/// Returns an error if graph validation fails.
pub fn definition(_config: &Config) -> Result<WorkflowDefinition> {
    WorkflowDefinition::builder("code-investigation")
        .description(
            "Codebase questions: classify intent, retrieve code chunks, extract \
             dependencies and flow in parallel, cited findings report",
        )
        .schema(
            research_schema()
                .field(keys::INTENT, MergeRule::Overwrite)
                .field(keys::CODE_FINDINGS, MergeRule::Append),
        )
        .step(Arc::new(ClassifyIntentStep))
        .step(Arc::new(CodeRetrieveStep))
        .step(Arc::new(DependencyAnalyzeStep))
        .step(Arc::new(FlowTraceStep))
        .step(Arc::new(SynthesizeCodeStep))
        .entry("classify_intent")
        .edge("classify_intent", "retrieve_code")
        .fan_out(
            "retrieve_code",
            &["analyze_dependencies", "trace_flow"],
            "synthesize_code",
        )
        .terminal("synthesize_code")
        .build()
}
