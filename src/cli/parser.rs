//! Command-line argument parsing.
//!
//! Defines the CLI structure using clap derive macros.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Test-Smith: multi-agent research assistant.
///
/// Plans an investigation for a query, gathers evidence from a local
/// knowledge base and the web, evaluates sufficiency, and emits a cited
/// report.
#[derive(Parser, Debug)]
#[command(name = "test-smith")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Path to the Test-Smith database file.
    ///
    /// Defaults to `.test-smith/test-smith.db` in the current directory.
    #[arg(long, env = "TEST_SMITH_DB_PATH")]
    pub db_path: Option<PathBuf>,

    /// Output format (text, json).
    #[arg(long, default_value = "text", global = true)]
    pub format: String,

    /// The subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run a research query through a workflow.
    Run {
        /// The research query.
        query: String,

        /// Workflow to execute.
        #[arg(short, long, default_value = "deep-research")]
        workflow: String,

        /// Thread id for checkpointing (random UUID when omitted).
        #[arg(short, long)]
        thread_id: Option<String>,

        /// Skip writing the report file.
        #[arg(long)]
        no_report: bool,

        /// Skip writing the run-log record.
        #[arg(long)]
        no_log: bool,
    },

    /// Resume an interrupted run from its latest checkpoint.
    Resume {
        /// Thread id to resume.
        thread_id: String,
    },

    /// List registered workflows.
    Workflows {
        /// Include step names and entry points.
        #[arg(short, long)]
        detailed: bool,
    },

    /// List recent outputs.
    List {
        /// What to list.
        #[command(subcommand)]
        target: ListTarget,
    },

    /// Preprocess a directory into the knowledge base.
    Ingest {
        /// Directory of source documents.
        dir: PathBuf,

        /// Target collection name.
        #[arg(short, long)]
        collection: Option<String>,

        /// Minimum document quality score retained.
        #[arg(long)]
        min_quality: Option<f64>,

        /// Analyze and report without installing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Knowledge-base operations.
    Kb {
        /// The operation.
        #[command(subcommand)]
        command: KbCommand,
    },
}

/// Targets of the `list` command.
#[derive(Subcommand, Debug)]
pub enum ListTarget {
    /// Recent reports.
    Reports {
        /// Maximum entries.
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },

    /// Recent run logs.
    Logs {
        /// Maximum entries.
        #[arg(short = 'n', long, default_value = "10")]
        limit: usize,
    },
}

/// Knowledge-base subcommands.
#[derive(Subcommand, Debug)]
pub enum KbCommand {
    /// Show collection status (chunk count, sample titles).
    Status,
}
