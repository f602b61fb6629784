//! CLI output formatting.
//!
//! Text for humans, JSON for pipelines. Errors format through the same
//! switch so scripted callers can parse failures.

use serde_json::json;

use crate::engine::WorkflowSummary;
use crate::error::Error;
use crate::state::KbStatus;

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Human-readable text.
    #[default]
    Text,
    /// Machine-readable JSON.
    Json,
}

impl OutputFormat {
    /// Parses a format name, defaulting to text.
    #[must_use]
    pub fn parse(value: &str) -> Self {
        match value.to_lowercase().as_str() {
            "json" => Self::Json,
            _ => Self::Text,
        }
    }
}

/// Formats an error for the selected output format.
#[must_use]
pub fn format_error(error: &Error, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => error.to_string(),
        OutputFormat::Json => json!({
            "error": error.to_string(),
            "exit_code": error.exit_code(),
        })
        .to_string(),
    }
}

/// Formats the workflow listing.
#[must_use]
pub fn format_workflows(
    workflows: &[WorkflowSummary],
    detailed: bool,
    format: OutputFormat,
) -> String {
    match format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(workflows).unwrap_or_else(|_| "[]".to_string())
        }
        OutputFormat::Text => {
            let mut out = String::new();
            for workflow in workflows {
                out.push_str(&format!("{}  —  {}\n", workflow.name, workflow.description));
                if detailed {
                    out.push_str(&format!(
                        "    entry: {}  steps ({}): {}\n",
                        workflow.entry,
                        workflow.step_count,
                        workflow.steps.join(", ")
                    ));
                }
            }
            out
        }
    }
}

/// Formats a file listing.
#[must_use]
pub fn format_listing(title: &str, names: &[String], format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(names).unwrap_or_else(|_| "[]".to_string())
        }
        OutputFormat::Text => {
            if names.is_empty() {
                return format!("no {title} yet\n");
            }
            let mut out = format!("{title}:\n");
            for name in names {
                out.push_str(&format!("  {name}\n"));
            }
            out
        }
    }
}

/// Formats knowledge-base status.
#[must_use]
pub fn format_kb_status(status: &KbStatus, format: OutputFormat) -> String {
    match format {
        OutputFormat::Json => {
            serde_json::to_string_pretty(status).unwrap_or_else(|_| "{}".to_string())
        }
        OutputFormat::Text => {
            if !status.exists {
                return format!("collection '{}' does not exist\n", status.collection);
            }
            let mut out = format!(
                "collection '{}': {} chunks\n",
                status.collection, status.chunk_count
            );
            if !status.sample_titles.is_empty() {
                out.push_str("sample sources:\n");
                for title in &status.sample_titles {
                    out.push_str(&format!("  {title}\n"));
                }
            }
            out
        }
    }
}
