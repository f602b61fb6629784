//! Domain types carried inside workflow state.
//!
//! These records flow between steps as schema-governed state fields and
//! round-trip losslessly through serde.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// The planner's split of a query into retrieval-targeted and web-targeted
/// sub-queries. Immutable after the planner returns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AllocationPlan {
    /// Queries aimed at the local knowledge base (0-5).
    pub rag_queries: Vec<String>,
    /// Queries aimed at the web searcher (0-5).
    pub web_queries: Vec<String>,
    /// Free-text rationale for the split.
    pub strategy: String,
}

impl AllocationPlan {
    /// Whether the plan issues no queries at all.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rag_queries.is_empty() && self.web_queries.is_empty()
    }
}

/// One knowledge-base retrieval hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDocument {
    /// Chunk text.
    pub text: String,
    /// Stable source identifier (used for citations).
    pub source_id: String,
    /// Similarity score, higher is closer.
    pub score: f32,
    /// Arbitrary metadata carried from installation.
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
}

/// Orders retrieval results descending by score, then by `source_id`, so
/// downstream consumers see a deterministic ordering.
pub fn sort_retrieval_results(results: &mut [SourceDocument]) {
    results.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
            .then_with(|| a.source_id.cmp(&b.source_id))
    });
}

/// One web search hit.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Result title.
    pub title: String,
    /// Snippet of the page content.
    pub snippet: String,
    /// Result URL; doubles as the citation source id.
    pub url: String,
    /// Provider-assigned relevance score.
    pub score: f32,
}

/// A summarized synthesis unit produced from combined retrieval and web
/// results. Carries provenance to every source it consumed.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnalyzedNote {
    /// Short summary of the evidence.
    pub summary: String,
    /// Fuller synthesis text.
    #[serde(default)]
    pub content: String,
    /// Source ids this note drew on. Never empty.
    pub source_ids: Vec<String>,
    /// Unresolved conflicts observed between sources, recorded verbatim.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub conflicts: Vec<String>,
}

/// The evaluator's sufficiency verdict.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct EvaluationVerdict {
    /// Whether the gathered evidence suffices to answer the query.
    pub sufficient: bool,
    /// Free-text reason for the verdict.
    pub reason: String,
    /// Follow-up queries the evaluator recommends.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recommended_follow_ups: Vec<String>,
}

/// How one note bears on the claim under fact-check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EvidenceStance {
    /// Evidence supports the claim.
    Supporting,
    /// Evidence contradicts the claim.
    Contradicting,
    /// Evidence neither supports nor contradicts.
    Neutral,
}

/// A labeled piece of evidence produced by the fact-check categorizer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EvidenceLabel {
    /// Index of the note this label applies to.
    pub note_index: usize,
    /// Stance toward the claim.
    pub stance: EvidenceStance,
    /// Confidence in the stance, in [0, 1].
    pub confidence: f64,
}

/// The comparison frame extracted by the comparative planner.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ComparisonFrame {
    /// Items under comparison (at least two).
    pub items: Vec<String>,
    /// Criteria each item is assessed on (at least two).
    pub criteria: Vec<String>,
}

/// One cell of the comparative matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MatrixCell {
    /// Item this cell describes.
    pub item: String,
    /// Criterion this cell assesses.
    pub criterion: String,
    /// Assessment text.
    pub assessment: String,
    /// Source ids backing the assessment. Never empty.
    pub source_ids: Vec<String>,
}

/// A causal hypothesis with its three assessed attributes.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Hypothesis {
    /// Stable id within the run (h1, h2, ...).
    pub id: String,
    /// Statement of the hypothesized cause.
    pub statement: String,
    /// Whether the cause precedes the effect, in [0, 1].
    #[serde(default)]
    pub temporal_precedence: f64,
    /// Whether cause and effect co-vary in the evidence, in [0, 1].
    #[serde(default)]
    pub covariation: f64,
    /// Plausibility of the causal mechanism, in [0, 1].
    #[serde(default)]
    pub mechanism_plausibility: f64,
    /// Source ids for the supporting evidence.
    #[serde(default)]
    pub source_ids: Vec<String>,
}

impl Hypothesis {
    /// Combined score: product of the three causal attributes.
    #[must_use]
    pub fn score(&self) -> f64 {
        self.temporal_precedence * self.covariation * self.mechanism_plausibility
    }

    /// Confidence label derived from the combined score.
    #[must_use]
    pub fn confidence(&self) -> ConfidenceLabel {
        ConfidenceLabel::from_score(self.score())
    }
}

/// Confidence buckets for ranked hypotheses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfidenceLabel {
    /// Score >= 0.66.
    High,
    /// Score >= 0.33.
    Medium,
    /// Score < 0.33.
    Low,
}

impl ConfidenceLabel {
    /// Buckets a combined score into a label.
    #[must_use]
    pub fn from_score(score: f64) -> Self {
        if score >= 0.66 {
            Self::High
        } else if score >= 0.33 {
            Self::Medium
        } else {
            Self::Low
        }
    }
}

/// Kind of a causal-graph node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CausalNodeKind {
    /// A hypothesized cause.
    Hypothesis,
    /// An observed symptom.
    Symptom,
}

/// Relation carried by a causal-graph edge.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CausalRelation {
    /// Source causes target.
    Causes,
    /// Source correlates with target.
    CorrelatesWith,
    /// Source contradicts target.
    Contradicts,
}

/// A node in the causal graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CausalNode {
    /// Stable node id.
    pub id: String,
    /// Node kind.
    pub kind: CausalNodeKind,
    /// Human-readable label.
    pub label: String,
    /// Combined score for hypothesis nodes, 1.0 for symptoms.
    pub score: f64,
}

/// An edge in the causal graph.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CausalEdge {
    /// Source node id.
    pub source_id: String,
    /// Target node id.
    pub target_id: String,
    /// Relation between the nodes.
    pub relation: CausalRelation,
    /// Edge strength in [0, 1].
    pub strength: f64,
}

/// The causal graph built from validated hypotheses.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CausalGraph {
    /// Graph nodes.
    pub nodes: Vec<CausalNode>,
    /// Graph edges.
    pub edges: Vec<CausalEdge>,
}

/// Classified intent of a code-investigation query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CodeIntent {
    /// What does this depend on.
    Dependency,
    /// How does data or control flow.
    Flow,
    /// Where is this used.
    Usage,
    /// How is the system organized.
    Architecture,
    /// How is this implemented.
    Implementation,
}

/// One structured, cited code finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CodeFinding {
    /// Analysis that produced the finding ("dependency" or "flow").
    pub kind: String,
    /// The finding text.
    pub detail: String,
    /// Cited file region, `path` or `path:line`.
    pub region: String,
    /// Source ids of the chunks the finding came from. Never empty.
    pub source_ids: Vec<String>,
}

/// Knowledge-base status handed to the planner, cached per run.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct KbStatus {
    /// Collection name queried.
    pub collection: String,
    /// Whether the collection exists.
    pub exists: bool,
    /// Total chunks installed.
    pub chunk_count: u64,
    /// A sample of distinct source titles.
    pub sample_titles: Vec<String>,
}

impl KbStatus {
    /// Whether retrieval against this collection can produce anything.
    #[must_use]
    pub const fn is_usable(&self) -> bool {
        self.exists && self.chunk_count > 0
    }
}
