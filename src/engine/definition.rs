//! Workflow definitions.
//!
//! A workflow is a named directed graph of steps over a typed state
//! schema: direct edges, conditional edges with pure selectors, and
//! explicit fan-out groups with a matching fan-in step. Definitions are
//! validated at build time so the executor never discovers a malformed
//! graph mid-run.

use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::Arc;

use crate::error::{EngineError, Result};
use crate::state::{StateSchema, WorkflowState};
use crate::steps::Step;

/// Marker for the pre-entry checkpoint.
pub const START: &str = "__start__";
/// Terminal marker.
pub const END: &str = "__end__";

/// Where a conditional selector routes next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Next {
    /// Continue at the named step.
    Step(String),
    /// End the run.
    End,
}

/// A pure routing function over state.
pub type Selector = Arc<dyn Fn(&WorkflowState) -> Result<Next> + Send + Sync>;

/// Outgoing edge of a step. Every step has exactly one.
#[derive(Clone)]
pub enum Edge {
    /// Unconditional transition.
    Direct {
        /// Target step.
        to: String,
    },
    /// Selector-driven transition.
    Conditional {
        /// The routing function.
        selector: Selector,
        /// Step names the selector may route to.
        targets: Vec<String>,
        /// Whether the selector may end the run.
        may_end: bool,
    },
    /// Concurrent fan-out into branches joining at a fan-in step.
    ///
    /// Branches execute against the pre-fan state snapshot; the fan-in
    /// waits for all of them and merges their updates sorted by branch
    /// name.
    FanOut {
        /// Branch steps, executed concurrently.
        branches: Vec<String>,
        /// The fan-in step all branches feed.
        join: String,
    },
    /// Terminal step: the run ends after it.
    End,
}

impl std::fmt::Debug for Edge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Direct { to } => f.debug_struct("Direct").field("to", to).finish(),
            Self::Conditional {
                targets, may_end, ..
            } => f
                .debug_struct("Conditional")
                .field("targets", targets)
                .field("may_end", may_end)
                .finish_non_exhaustive(),
            Self::FanOut { branches, join } => f
                .debug_struct("FanOut")
                .field("branches", branches)
                .field("join", join)
                .finish(),
            Self::End => write!(f, "End"),
        }
    }
}

/// A budget enforced by the engine before each step activation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Budget {
    /// State field holding the counter.
    pub field: String,
    /// Value above which the run hard-fails.
    pub limit: u64,
}

/// A validated, executable workflow definition.
pub struct WorkflowDefinition {
    name: String,
    description: String,
    schema: StateSchema,
    steps: BTreeMap<String, Arc<dyn Step>>,
    edges: BTreeMap<String, Edge>,
    entry: String,
    budgets: Vec<Budget>,
}

impl WorkflowDefinition {
    /// Starts a builder for `name`.
    #[must_use]
    pub fn builder(name: &str) -> WorkflowBuilder {
        WorkflowBuilder {
            name: name.to_string(),
            description: String::new(),
            schema: StateSchema::new(),
            steps: BTreeMap::new(),
            edges: BTreeMap::new(),
            entry: None,
            budgets: Vec::new(),
        }
    }

    /// Workflow name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Human-readable description for listings.
    #[must_use]
    pub fn description(&self) -> &str {
        &self.description
    }

    /// The state schema governing merges.
    #[must_use]
    pub const fn schema(&self) -> &StateSchema {
        &self.schema
    }

    /// Entry step name.
    #[must_use]
    pub fn entry(&self) -> &str {
        &self.entry
    }

    /// Declared budgets.
    #[must_use]
    pub fn budgets(&self) -> &[Budget] {
        &self.budgets
    }

    /// Step names in sorted order.
    pub fn step_names(&self) -> impl Iterator<Item = &str> {
        self.steps.keys().map(String::as_str)
    }

    /// Number of steps.
    #[must_use]
    pub fn step_count(&self) -> usize {
        self.steps.len()
    }

    /// Looks up a step by name.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidDefinition`] for unknown names (the
    /// validator makes this unreachable for validated graphs).
    pub fn step(&self, name: &str) -> Result<&Arc<dyn Step>> {
        self.steps.get(name).ok_or_else(|| {
            EngineError::InvalidDefinition {
                reason: format!("unknown step: {name}"),
            }
            .into()
        })
    }

    /// Looks up the outgoing edge of a step.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidDefinition`] for unknown names.
    pub fn edge(&self, name: &str) -> Result<&Edge> {
        self.edges.get(name).ok_or_else(|| {
            EngineError::InvalidDefinition {
                reason: format!("no outgoing edge for step: {name}"),
            }
            .into()
        })
    }

    /// Structural fingerprint for conflict detection on re-registration.
    ///
    /// Selector behavior is opaque; conditional edges contribute their
    /// declared target sets instead.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let mut edges = BTreeMap::new();
        for (from, edge) in &self.edges {
            let shape = match edge {
                Edge::Direct { to } => format!("direct:{to}"),
                Edge::Conditional {
                    targets, may_end, ..
                } => {
                    let mut sorted = targets.clone();
                    sorted.sort();
                    format!("conditional:{}:{may_end}", sorted.join("|"))
                }
                Edge::FanOut { branches, join } => {
                    format!("fanout:{}>{join}", branches.join("|"))
                }
                Edge::End => "end".to_string(),
            };
            edges.insert(from.clone(), shape);
        }
        let schema_fields: Vec<String> = self
            .schema
            .field_names()
            .map(|f| format!("{f}:{:?}", self.schema.rule(f)))
            .collect();
        let budgets: Vec<String> = self
            .budgets
            .iter()
            .map(|b| format!("{}<={}", b.field, b.limit))
            .collect();
        format!(
            "{}#{}#{:?}#{:?}#{:?}",
            self.name, self.entry, edges, schema_fields, budgets
        )
    }
}

impl std::fmt::Debug for WorkflowDefinition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkflowDefinition")
            .field("name", &self.name)
            .field("entry", &self.entry)
            .field("steps", &self.steps.keys().collect::<Vec<_>>())
            .field("edges", &self.edges)
            .finish_non_exhaustive()
    }
}

/// Builder for [`WorkflowDefinition`]. `build` validates the graph.
pub struct WorkflowBuilder {
    name: String,
    description: String,
    schema: StateSchema,
    steps: BTreeMap<String, Arc<dyn Step>>,
    edges: BTreeMap<String, Edge>,
    entry: Option<String>,
    budgets: Vec<Budget>,
}

impl WorkflowBuilder {
    /// Sets the description shown in listings.
    #[must_use]
    pub fn description(mut self, description: &str) -> Self {
        self.description = description.to_string();
        self
    }

    /// Sets the state schema.
    #[must_use]
    pub fn schema(mut self, schema: StateSchema) -> Self {
        self.schema = schema;
        self
    }

    /// Adds a step, keyed by its own name.
    #[must_use]
    pub fn step(mut self, step: Arc<dyn Step>) -> Self {
        self.steps.insert(step.name().to_string(), step);
        self
    }

    /// Sets the entry step.
    #[must_use]
    pub fn entry(mut self, name: &str) -> Self {
        self.entry = Some(name.to_string());
        self
    }

    /// Adds a direct edge.
    #[must_use]
    pub fn edge(mut self, from: &str, to: &str) -> Self {
        self.edges
            .insert(from.to_string(), Edge::Direct { to: to.to_string() });
        self
    }

    /// Adds a conditional edge with its declared target set.
    #[must_use]
    pub fn conditional(
        mut self,
        from: &str,
        targets: &[&str],
        may_end: bool,
        selector: Selector,
    ) -> Self {
        self.edges.insert(
            from.to_string(),
            Edge::Conditional {
                selector,
                targets: targets.iter().map(ToString::to_string).collect(),
                may_end,
            },
        );
        self
    }

    /// Adds a fan-out from `from` into `branches`, joining at `join`.
    ///
    /// Each branch implicitly gets a direct edge to the join step.
    #[must_use]
    pub fn fan_out(mut self, from: &str, branches: &[&str], join: &str) -> Self {
        for branch in branches {
            self.edges.insert(
                (*branch).to_string(),
                Edge::Direct {
                    to: join.to_string(),
                },
            );
        }
        self.edges.insert(
            from.to_string(),
            Edge::FanOut {
                branches: branches.iter().map(ToString::to_string).collect(),
                join: join.to_string(),
            },
        );
        self
    }

    /// Marks a step as terminal.
    #[must_use]
    pub fn terminal(mut self, name: &str) -> Self {
        self.edges.insert(name.to_string(), Edge::End);
        self
    }

    /// Declares an engine-enforced budget over a counter field.
    #[must_use]
    pub fn budget(mut self, field: &str, limit: u64) -> Self {
        self.budgets.push(Budget {
            field: field.to_string(),
            limit,
        });
        self
    }

    /// Validates and builds the definition.
    ///
    /// # Errors
    ///
    /// Returns [`EngineError::InvalidDefinition`] for: zero steps, a
    /// missing or unknown entry, edges referring to undeclared steps,
    /// steps without an outgoing edge, fan-out branches not feeding their
    /// join, or steps from which the terminal marker is unreachable.
    pub fn build(self) -> Result<WorkflowDefinition> {
        if self.steps.is_empty() {
            return Err(invalid("workflow has zero steps"));
        }
        let entry = self.entry.ok_or_else(|| invalid("no entry step declared"))?;
        if !self.steps.contains_key(&entry) {
            return Err(invalid(&format!("entry step '{entry}' is not declared")));
        }

        for (from, edge) in &self.edges {
            if !self.steps.contains_key(from) {
                return Err(invalid(&format!("edge from undeclared step '{from}'")));
            }
            for target in edge_targets(edge) {
                if !self.steps.contains_key(target) {
                    return Err(invalid(&format!(
                        "edge from '{from}' refers to undeclared step '{target}'"
                    )));
                }
            }
            if let Edge::FanOut { branches, join } = edge {
                if branches.is_empty() {
                    return Err(invalid(&format!("fan-out from '{from}' has no branches")));
                }
                for branch in branches {
                    match self.edges.get(branch) {
                        Some(Edge::Direct { to }) if to == join => {}
                        _ => {
                            return Err(invalid(&format!(
                                "fan-out branch '{branch}' must feed its join '{join}'"
                            )));
                        }
                    }
                }
            }
        }

        for step in self.steps.keys() {
            if !self.edges.contains_key(step) {
                return Err(invalid(&format!("step '{step}' has no outgoing edge")));
            }
        }

        // Every step must be able to reach the terminal marker.
        let can_end = terminal_reachable(&self.edges);
        for step in self.steps.keys() {
            if !can_end.contains(step.as_str()) {
                return Err(invalid(&format!(
                    "terminal marker unreachable from step '{step}'"
                )));
            }
        }

        Ok(WorkflowDefinition {
            name: self.name,
            description: self.description,
            schema: self.schema,
            steps: self.steps,
            edges: self.edges,
            entry,
            budgets: self.budgets,
        })
    }
}

fn invalid(reason: &str) -> crate::error::Error {
    EngineError::InvalidDefinition {
        reason: reason.to_string(),
    }
    .into()
}

fn edge_targets(edge: &Edge) -> Vec<&str> {
    match edge {
        Edge::Direct { to } => vec![to.as_str()],
        Edge::Conditional { targets, .. } => targets.iter().map(String::as_str).collect(),
        Edge::FanOut { branches, join } => {
            let mut all: Vec<&str> = branches.iter().map(String::as_str).collect();
            all.push(join.as_str());
            all
        }
        Edge::End => Vec::new(),
    }
}

/// Computes the set of steps from which the terminal marker is reachable,
/// walking predecessor edges backwards from every ending step.
fn terminal_reachable(edges: &BTreeMap<String, Edge>) -> BTreeSet<&str> {
    let mut reaches_end: BTreeSet<&str> = BTreeSet::new();
    let mut queue: VecDeque<&str> = VecDeque::new();

    for (from, edge) in edges {
        let ends = match edge {
            Edge::End => true,
            Edge::Conditional { may_end, .. } => *may_end,
            _ => false,
        };
        if ends {
            reaches_end.insert(from.as_str());
            queue.push_back(from.as_str());
        }
    }

    while let Some(current) = queue.pop_front() {
        for (from, edge) in edges {
            if reaches_end.contains(from.as_str()) {
                continue;
            }
            if edge_targets(edge).contains(&current) {
                reaches_end.insert(from.as_str());
                queue.push_back(from.as_str());
            }
        }
    }

    reaches_end
}
