//! # Test-Smith
//!
//! Multi-agent research assistant: given a natural-language query it
//! plans an investigation, gathers evidence from a local vector-backed
//! knowledge base and the web, evaluates sufficiency, and synthesizes a
//! cited report.
//!
//! ## Features
//!
//! - **Workflow engine**: graph-structured step execution with
//!   conditional routing, fan-out/fan-in, schema-governed state merging,
//!   budgets, and per-step checkpointing with resume
//! - **Hierarchical research**: master decomposition, depth-aware
//!   drill-down, and dynamic replanning under strict budgets
//! - **Named workflows**: deep-research, quick-research, fact-check,
//!   comparative, causal-inference, code-investigation
//! - **Preprocessing pipeline**: quality analysis, strategy-selected
//!   chunking, exact and near-duplicate removal, boilerplate stripping,
//!   quality metrics, batched embedding installation

#![deny(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![warn(missing_docs)]
// Note: unsafe is needed for memory-mapped I/O (memmap2)
#![warn(unsafe_code)]

pub mod chunking;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod io;
pub mod logging;
pub mod preprocess;
pub mod providers;
pub mod report;
pub mod runner;
pub mod state;
pub mod steps;
pub mod storage;
pub mod workflows;

// Re-export commonly used types at crate root
pub use error::{Error, Result};

// Re-export configuration
pub use config::{Config, LogLevel, ModelProvider};

// Re-export engine types
pub use engine::{Engine, WorkflowDefinition, WorkflowRegistry, WorkflowSummary};

// Re-export the state model
pub use state::{MergeRule, StateSchema, StateUpdate, WorkflowState};

// Re-export the runner surface
pub use runner::{RunOptions, RunOutcome, Runner};

// Re-export provider seams
pub use providers::{Embedder, ProviderSet, Retriever, TextGenerator, WebSearcher};

// Re-export storage types
pub use storage::{Checkpoint, CheckpointStore, Database};

// Re-export preprocessing
pub use preprocess::{CorpusReport, Pipeline, PipelineOptions, QualityLabel};

// Re-export CLI types
pub use cli::{Cli, Commands, OutputFormat};
