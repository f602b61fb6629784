//! The entry runner.
//!
//! Wires configuration, storage, providers, the registry, and the engine
//! together: registers the built-in workflows explicitly at startup,
//! instantiates initial state for a query, runs (or resumes) the engine
//! with checkpointing, and writes the report and run log.

use std::path::PathBuf;
use std::sync::Arc;

use chrono::Utc;
use serde_json::json;

use crate::config::Config;
use crate::engine::{Engine, WorkflowRegistry, WorkflowSummary};
use crate::error::Result;
use crate::preprocess::{CorpusReport, Pipeline, PipelineOptions};
use crate::providers::ProviderSet;
use crate::report::{RunLog, render_report, save_log, save_report};
use crate::state::{KbStatus, WorkflowState, keys};
use crate::steps::CancelFlag;
use crate::storage::{CheckpointStore, Database};
use crate::workflows::register_all;

/// What a run (or resume) produced.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    /// Thread id of the run.
    pub thread_id: String,
    /// The rendered report document.
    pub report: String,
    /// Where the report was written, when it was.
    pub report_path: Option<PathBuf>,
    /// Final workflow state.
    pub state: WorkflowState,
}

/// Options controlling one `run` invocation.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Workflow name to execute.
    pub workflow: String,
    /// Thread id; a fresh UUID when absent.
    pub thread_id: Option<String>,
    /// Write the report file.
    pub write_report: bool,
    /// Write the run-log record.
    pub write_log: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            workflow: "deep-research".to_string(),
            thread_id: None,
            write_report: true,
            write_log: true,
        }
    }
}

/// The entry runner.
pub struct Runner {
    config: Arc<Config>,
    registry: Arc<WorkflowRegistry>,
    engine: Engine,
    providers: ProviderSet,
    db: Database,
}

impl Runner {
    /// Builds a runner from configuration, with production providers.
    ///
    /// # Errors
    ///
    /// Returns configuration errors (missing credentials) and storage
    /// errors (unopenable database).
    pub fn from_config(config: Config) -> Result<Self> {
        let db = Database::open(&config.db_path)?;
        let providers = ProviderSet::from_config(&config, db.clone())?;
        Self::with_providers(config, db, providers)
    }

    /// Builds a runner over explicit providers. Used by tests and
    /// embedders of the crate.
    ///
    /// # Errors
    ///
    /// Returns an error if workflow registration fails.
    pub fn with_providers(config: Config, db: Database, providers: ProviderSet) -> Result<Self> {
        let config = Arc::new(config);
        let registry = Arc::new(WorkflowRegistry::new());
        register_all(&registry, &config)?;
        let store: Arc<dyn CheckpointStore> = Arc::new(db.clone());
        let engine = Engine::new(Arc::clone(&registry), store, Arc::clone(&config));
        Ok(Self {
            config,
            registry,
            engine,
            providers,
            db,
        })
    }

    /// Registered workflow listing.
    #[must_use]
    pub fn workflows(&self) -> Vec<WorkflowSummary> {
        self.registry.list()
    }

    /// Runs a query through a named workflow.
    ///
    /// # Errors
    ///
    /// Surfaces engine errors (`WorkflowNotFound`, `StepFailure`,
    /// timeouts, budget exhaustion) and report-write failures.
    pub async fn run(&self, query: &str, options: RunOptions) -> Result<RunOutcome> {
        self.run_with_cancel(query, options, CancelFlag::new()).await
    }

    /// Runs a query with an external cancellation flag.
    ///
    /// # Errors
    ///
    /// As [`Runner::run`], plus `Cancelled`.
    pub async fn run_with_cancel(
        &self,
        query: &str,
        options: RunOptions,
        cancel: CancelFlag,
    ) -> Result<RunOutcome> {
        let thread_id = options
            .thread_id
            .clone()
            .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

        let mut initial = WorkflowState::new();
        initial.set(keys::QUERY, json!(query));
        initial.set(keys::LOOP_COUNT, json!(0));
        initial.set(keys::REVISION_COUNT, json!(0));
        initial.set(keys::TOTAL_SUBTASKS, json!(0));

        let state = self
            .engine
            .run_with_cancel(
                &options.workflow,
                initial,
                &thread_id,
                self.providers.clone(),
                cancel,
            )
            .await?;

        self.finish(query, &options.workflow, thread_id, state, &options)
    }

    /// Resumes a thread from its latest checkpoint.
    ///
    /// # Errors
    ///
    /// Surfaces `NoCheckpoint` for unknown threads and the same engine
    /// errors as [`Runner::run`].
    pub async fn resume(&self, thread_id: &str) -> Result<RunOutcome> {
        let state = self.engine.resume(thread_id, self.providers.clone()).await?;
        let query = state.text(keys::QUERY).to_string();
        let workflow = self
            .db
            .latest(thread_id)?
            .map(|checkpoint| checkpoint.workflow)
            .unwrap_or_default();
        let options = RunOptions {
            workflow: workflow.clone(),
            thread_id: Some(thread_id.to_string()),
            ..RunOptions::default()
        };
        self.finish(&query, &workflow, thread_id.to_string(), state, &options)
    }

    fn finish(
        &self,
        query: &str,
        workflow: &str,
        thread_id: String,
        state: WorkflowState,
        options: &RunOptions,
    ) -> Result<RunOutcome> {
        let timestamp = Utc::now();
        let body = state.text(keys::REPORT);
        let report = render_report(query, workflow, &thread_id, timestamp, body);

        let report_path = if options.write_report && !body.is_empty() {
            Some(save_report(
                &self.config.report_dir,
                &thread_id,
                timestamp,
                &report,
            )?)
        } else {
            None
        };

        if options.write_log {
            save_log(
                &self.config.log_dir,
                &RunLog {
                    thread_id: thread_id.clone(),
                    workflow: workflow.to_string(),
                    query: query.to_string(),
                    completed: true,
                    loop_count: state.counter(keys::LOOP_COUNT),
                    report_chars: body.chars().count(),
                    timestamp,
                },
            )?;
        }

        Ok(RunOutcome {
            thread_id,
            report,
            report_path,
            state,
        })
    }

    /// Knowledge-base status for the configured collection.
    ///
    /// # Errors
    ///
    /// Returns an error if the retriever cannot be read.
    pub async fn kb_status(&self) -> Result<KbStatus> {
        self.providers
            .retriever
            .status(&self.config.collection)
            .await
    }

    /// Runs the preprocessing pipeline over a directory and, unless
    /// `dry_run`, installs the result into `collection`.
    ///
    /// # Errors
    ///
    /// Surfaces pipeline, embedding, and storage errors; a failed install
    /// leaves the previous collection contents untouched.
    pub async fn ingest(
        &self,
        dir: &std::path::Path,
        collection: &str,
        options: PipelineOptions,
        dry_run: bool,
    ) -> Result<(CorpusReport, usize)> {
        let output = Pipeline::new(options).run(dir)?;
        let installed = if dry_run {
            0
        } else {
            crate::preprocess::install(
                &output,
                self.providers.embedder.as_ref(),
                self.providers.retriever.as_ref(),
                collection,
                self.config.embed_batch_size,
            )
            .await?
        };
        Ok((output.report, installed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::providers::{
        FALLBACK_DIMENSIONS, FallbackEmbedder, ScriptedGenerator, StaticRetriever, StaticSearcher,
    };
    use crate::state::SearchHit;
    use tempfile::TempDir;

    fn scripted_runner(tmp: &TempDir, responses: Vec<String>, hits: Vec<SearchHit>) -> Runner {
        let config = Config {
            db_path: tmp.path().join("test.db"),
            report_dir: tmp.path().join("reports"),
            log_dir: tmp.path().join("logs"),
            ..Config::default()
        };
        let db = Database::open(&config.db_path).unwrap();
        let providers = ProviderSet {
            generator: Arc::new(ScriptedGenerator::new(responses)),
            embedder: Arc::new(FallbackEmbedder::new(FALLBACK_DIMENSIONS)),
            retriever: Arc::new(StaticRetriever::new()),
            web: Arc::new(StaticSearcher::new(hits)),
        };
        Runner::with_providers(config, db, providers).unwrap()
    }

    fn quick_run_script() -> Vec<String> {
        vec![
            json!({"rag_queries": [], "web_queries": ["capital of France"], "strategy": "web"})
                .to_string(),
            json!({"notes": [{"summary": "Paris is the capital", "content": "Paris is the capital of France", "source_ids": ["https://w/paris"]}]})
                .to_string(),
            json!({"sufficient": true, "reason": "answered"}).to_string(),
            "## 1. Answer\n\nParis is the capital of France [https://w/paris].".to_string(),
        ]
    }

    fn paris_hits() -> Vec<SearchHit> {
        vec![SearchHit {
            title: "Paris".to_string(),
            snippet: "Paris is the capital of France".to_string(),
            url: "https://w/paris".to_string(),
            score: 0.99,
        }]
    }

    #[tokio::test]
    async fn test_run_writes_report_and_log() {
        let tmp = TempDir::new().unwrap();
        let runner = scripted_runner(&tmp, quick_run_script(), paris_hits());

        let outcome = runner
            .run(
                "What is the capital of France?",
                RunOptions {
                    workflow: "quick-research".to_string(),
                    ..RunOptions::default()
                },
            )
            .await
            .unwrap();

        assert!(outcome.report.contains("Paris"));
        assert!(outcome.report.contains("workflow: quick-research"));
        let report_path = outcome.report_path.unwrap();
        assert!(report_path.exists());
        assert_eq!(
            crate::report::list_outputs(&tmp.path().join("logs"), ".json", 10)
                .unwrap()
                .len(),
            1
        );
    }

    #[tokio::test]
    async fn test_run_no_report_flag() {
        let tmp = TempDir::new().unwrap();
        let runner = scripted_runner(&tmp, quick_run_script(), paris_hits());
        let outcome = runner
            .run(
                "What is the capital of France?",
                RunOptions {
                    workflow: "quick-research".to_string(),
                    write_report: false,
                    write_log: false,
                    ..RunOptions::default()
                },
            )
            .await
            .unwrap();
        assert!(outcome.report_path.is_none());
        assert!(
            crate::report::list_outputs(&tmp.path().join("reports"), ".md", 10)
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn test_unknown_workflow_surfaces() {
        let tmp = TempDir::new().unwrap();
        let runner = scripted_runner(&tmp, vec![], vec![]);
        let err = runner
            .run(
                "q",
                RunOptions {
                    workflow: "nope".to_string(),
                    ..RunOptions::default()
                },
            )
            .await
            .unwrap_err();
        assert!(err.to_string().contains("workflow not found"));
    }

    #[test]
    fn test_workflows_listing() {
        let tmp = TempDir::new().unwrap();
        let runner = scripted_runner(&tmp, vec![], vec![]);
        let listing = runner.workflows();
        assert_eq!(listing.len(), 6);
    }

    #[tokio::test]
    async fn test_ingest_dry_run_installs_nothing() {
        let tmp = TempDir::new().unwrap();
        let source_dir = tmp.path().join("docs");
        std::fs::create_dir_all(&source_dir).unwrap();
        let body = "## Section\n\n".to_string()
            + &"A sentence of reasonable length for the chunker to work with. ".repeat(20);
        std::fs::write(source_dir.join("doc.md"), format!("# Doc\n\n{body}")).unwrap();

        let runner = scripted_runner(&tmp, vec![], vec![]);
        let (report, installed) = runner
            .ingest(&source_dir, "knowledge", PipelineOptions::default(), true)
            .await
            .unwrap();
        assert!(report.chunk_count > 0);
        assert_eq!(installed, 0);
        assert!(!runner.kb_status().await.unwrap().is_usable());
    }
}
