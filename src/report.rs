//! Report rendering and output listing.
//!
//! Final reports are Markdown files: a header block (query, workflow,
//! timestamp, thread id), then the synthesizer's numbered sections, then
//! its Sources appendix. Run logs are JSON records. Both directories are
//! enumerable newest-first for the `list` command.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{IoError, Result};

/// One run's log record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunLog {
    /// Thread id of the run.
    pub thread_id: String,
    /// Workflow executed.
    pub workflow: String,
    /// The original query.
    pub query: String,
    /// Whether the run completed.
    pub completed: bool,
    /// Planner/evaluator loop iterations used.
    pub loop_count: u64,
    /// Report length in characters (0 when no report was produced).
    pub report_chars: usize,
    /// Completion timestamp.
    pub timestamp: DateTime<Utc>,
}

/// Renders the full report document around the synthesized body.
#[must_use]
pub fn render_report(
    query: &str,
    workflow: &str,
    thread_id: &str,
    timestamp: DateTime<Utc>,
    body: &str,
) -> String {
    format!(
        "---\nquery: {query}\nworkflow: {workflow}\ntimestamp: {}\nthread_id: {thread_id}\n---\n\n{body}\n",
        timestamp.to_rfc3339()
    )
}

fn sanitize_for_filename(thread_id: &str) -> String {
    thread_id
        .chars()
        .map(|c| if c.is_alphanumeric() || c == '-' { c } else { '_' })
        .collect()
}

/// Writes a report file, returning its path.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or the file
/// cannot be written.
pub fn save_report(
    dir: &Path,
    thread_id: &str,
    timestamp: DateTime<Utc>,
    content: &str,
) -> Result<PathBuf> {
    fs::create_dir_all(dir).map_err(|e| IoError::DirectoryFailed {
        path: dir.display().to_string(),
        reason: e.to_string(),
    })?;
    let filename = format!(
        "{}-{}.md",
        timestamp.format("%Y%m%d-%H%M%S"),
        sanitize_for_filename(thread_id)
    );
    let path = dir.join(filename);
    fs::write(&path, content).map_err(|e| IoError::WriteFailed {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    Ok(path)
}

/// Writes a run-log record, returning its path.
///
/// # Errors
///
/// Returns an error if the directory cannot be created or the file
/// cannot be written.
pub fn save_log(dir: &Path, log: &RunLog) -> Result<PathBuf> {
    fs::create_dir_all(dir).map_err(|e| IoError::DirectoryFailed {
        path: dir.display().to_string(),
        reason: e.to_string(),
    })?;
    let filename = format!(
        "{}-{}.json",
        log.timestamp.format("%Y%m%d-%H%M%S"),
        sanitize_for_filename(&log.thread_id)
    );
    let path = dir.join(filename);
    let content = serde_json::to_string_pretty(log)?;
    fs::write(&path, content).map_err(|e| IoError::WriteFailed {
        path: path.display().to_string(),
        reason: e.to_string(),
    })?;
    Ok(path)
}

/// Lists files in an output directory, newest first (by filename, which
/// carries the timestamp prefix).
///
/// # Errors
///
/// Returns an error only for unreadable existing directories; a missing
/// directory lists as empty.
pub fn list_outputs(dir: &Path, extension: &str, limit: usize) -> Result<Vec<String>> {
    if !dir.is_dir() {
        return Ok(Vec::new());
    }
    let entries = fs::read_dir(dir).map_err(|e| IoError::ReadFailed {
        path: dir.display().to_string(),
        reason: e.to_string(),
    })?;
    let mut names: Vec<String> = entries
        .filter_map(std::result::Result::ok)
        .map(|entry| entry.file_name().to_string_lossy().into_owned())
        .filter(|name| name.ends_with(extension))
        .collect();
    names.sort();
    names.reverse();
    names.truncate(limit);
    Ok(names)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_render_report_header_block() {
        let timestamp = Utc::now();
        let report = render_report(
            "What is the capital of France?",
            "quick-research",
            "t-123",
            timestamp,
            "## 1. Answer\n\nParis [w:1].",
        );
        assert!(report.starts_with("---\n"));
        assert!(report.contains("query: What is the capital of France?"));
        assert!(report.contains("workflow: quick-research"));
        assert!(report.contains("thread_id: t-123"));
        assert!(report.contains("## 1. Answer"));
    }

    #[test]
    fn test_save_and_list_reports() {
        let tmp = TempDir::new().unwrap();
        let now = Utc::now();
        save_report(tmp.path(), "thread-a", now, "report a").unwrap();
        save_report(
            tmp.path(),
            "thread-b",
            now + chrono::Duration::seconds(1),
            "report b",
        )
        .unwrap();

        let listed = list_outputs(tmp.path(), ".md", 10).unwrap();
        assert_eq!(listed.len(), 2);
        // Newest first.
        assert!(listed[0].contains("thread-b"));

        let limited = list_outputs(tmp.path(), ".md", 1).unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn test_list_missing_dir_is_empty() {
        let listed = list_outputs(Path::new("/nonexistent/xyz"), ".md", 10).unwrap();
        assert!(listed.is_empty());
    }

    #[test]
    fn test_save_log_round_trips() {
        let tmp = TempDir::new().unwrap();
        let log = RunLog {
            thread_id: "t-1".to_string(),
            workflow: "deep-research".to_string(),
            query: "q".to_string(),
            completed: true,
            loop_count: 1,
            report_chars: 2048,
            timestamp: Utc::now(),
        };
        let path = save_log(tmp.path(), &log).unwrap();
        let content = fs::read_to_string(path).unwrap();
        let back: RunLog = serde_json::from_str(&content).unwrap();
        assert_eq!(back, log);
    }

    #[test]
    fn test_filename_sanitization() {
        assert_eq!(sanitize_for_filename("a/b:c"), "a_b_c");
        assert_eq!(sanitize_for_filename("uuid-1234"), "uuid-1234");
    }
}
