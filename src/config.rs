//! Runtime configuration.
//!
//! All environment access happens here, once, at startup. The resulting
//! [`Config`] is immutable and passed by value into the runner, engine, and
//! steps; nothing downstream reads the environment.

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default recursion limit (step activations per run).
pub const DEFAULT_RECURSION_LIMIT: u32 = 100;
/// Default maximum planner/evaluator loop iterations.
pub const DEFAULT_MAX_LOOPS: u64 = 2;
/// Default maximum subtask drill-down depth.
pub const DEFAULT_MAX_DEPTH: u64 = 2;
/// Default maximum plan revisions per run.
pub const DEFAULT_MAX_REVISIONS: u64 = 3;
/// Default maximum total subtasks (original + revised + drilled).
pub const DEFAULT_MAX_TOTAL_SUBTASKS: u64 = 20;
/// Default top-k for retrieval queries.
pub const DEFAULT_TOP_K: usize = 5;
/// Default per-step timeout in seconds.
pub const DEFAULT_STEP_TIMEOUT_SECS: u64 = 120;
/// Default per-run wall-clock cap in seconds.
pub const DEFAULT_RUN_TIMEOUT_SECS: u64 = 600;
/// Default embedding batch size during installation.
pub const DEFAULT_EMBED_BATCH_SIZE: usize = 32;
/// Default knowledge-base collection name.
pub const DEFAULT_COLLECTION: &str = "knowledge";
/// Default code-collection name for code-investigation.
pub const DEFAULT_CODE_COLLECTION: &str = "code";
/// Default database file path, relative to the working directory.
pub const DEFAULT_DB_PATH: &str = ".test-smith/test-smith.db";

/// Which text-generator implementation serves requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelProvider {
    /// Hosted OpenAI-compatible API.
    Primary,
    /// Local OpenAI-compatible endpoint.
    Local,
}

impl ModelProvider {
    fn parse(value: &str) -> Result<Self> {
        match value.to_lowercase().as_str() {
            "primary" => Ok(Self::Primary),
            "local" => Ok(Self::Local),
            other => Err(Error::Config {
                message: format!("unknown MODEL_PROVIDER: {other}"),
            }),
        }
    }
}

/// Log verbosity levels accepted by `LOG_LEVEL`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    /// Everything, including per-step state sizes.
    Debug,
    /// Step boundaries and provider calls.
    Info,
    /// Recoverable provider failures and budget no-ops.
    Warning,
    /// Only failures surfaced to the caller.
    Error,
}

impl LogLevel {
    fn parse(value: &str) -> Result<Self> {
        match value.to_uppercase().as_str() {
            "DEBUG" => Ok(Self::Debug),
            "INFO" => Ok(Self::Info),
            "WARNING" | "WARN" => Ok(Self::Warning),
            "ERROR" => Ok(Self::Error),
            other => Err(Error::Config {
                message: format!("unknown LOG_LEVEL: {other}"),
            }),
        }
    }

    /// The `tracing` filter directive for this level.
    #[must_use]
    pub const fn as_filter(self) -> &'static str {
        match self {
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warning => "warn",
            Self::Error => "error",
        }
    }
}

/// Immutable runtime configuration, read once at startup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Selected text-generator implementation.
    pub model_provider: ModelProvider,
    /// API key for the primary provider, if set.
    pub primary_api_key: Option<String>,
    /// Base URL for the local provider.
    pub local_base_url: String,
    /// Model name passed to the generator.
    pub model_name: String,
    /// Model name passed to the embedder.
    pub embedding_model: String,
    /// Web-search API keys, keyed by provider name.
    pub web_search_api_keys: Vec<(String, String)>,
    /// Ordered web-search provider fallback chain.
    pub search_provider_priority: Vec<String>,
    /// Log verbosity.
    pub log_level: LogLevel,
    /// Emit structured JSON logs instead of human-readable ones.
    pub structured_logs_json: bool,
    /// Maximum step activations per run.
    pub recursion_limit: u32,
    /// Maximum planner/evaluator loop iterations.
    pub max_loops: u64,
    /// Maximum subtask drill-down depth.
    pub max_depth: u64,
    /// Maximum plan revisions per run.
    pub max_revisions: u64,
    /// Maximum total subtasks per run.
    pub max_total_subtasks: u64,
    /// Top-k for retrieval queries.
    pub top_k: usize,
    /// Per-step timeout in seconds.
    pub step_timeout_secs: u64,
    /// Per-run wall-clock cap in seconds.
    pub run_timeout_secs: u64,
    /// Embedding batch size during installation.
    pub embed_batch_size: usize,
    /// Knowledge-base collection name.
    pub collection: String,
    /// Code collection name for code-investigation.
    pub code_collection: String,
    /// SQLite database path.
    pub db_path: PathBuf,
    /// Directory where reports are written.
    pub report_dir: PathBuf,
    /// Directory where run logs are written.
    pub log_dir: PathBuf,
    /// Minimum document quality score retained by preprocessing.
    pub min_quality_score: f64,
    /// Minimum chunk content length retained by preprocessing.
    pub min_content_length: usize,
    /// Prune old checkpoints after a successful run.
    pub gc_checkpoints: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            model_provider: ModelProvider::Primary,
            primary_api_key: None,
            local_base_url: "http://localhost:11434/v1".to_string(),
            model_name: "gpt-4o-mini".to_string(),
            embedding_model: "text-embedding-3-small".to_string(),
            web_search_api_keys: Vec::new(),
            search_provider_priority: vec!["tavily".to_string(), "brave".to_string()],
            log_level: LogLevel::Info,
            structured_logs_json: false,
            recursion_limit: DEFAULT_RECURSION_LIMIT,
            max_loops: DEFAULT_MAX_LOOPS,
            max_depth: DEFAULT_MAX_DEPTH,
            max_revisions: DEFAULT_MAX_REVISIONS,
            max_total_subtasks: DEFAULT_MAX_TOTAL_SUBTASKS,
            top_k: DEFAULT_TOP_K,
            step_timeout_secs: DEFAULT_STEP_TIMEOUT_SECS,
            run_timeout_secs: DEFAULT_RUN_TIMEOUT_SECS,
            embed_batch_size: DEFAULT_EMBED_BATCH_SIZE,
            collection: DEFAULT_COLLECTION.to_string(),
            code_collection: DEFAULT_CODE_COLLECTION.to_string(),
            db_path: PathBuf::from(DEFAULT_DB_PATH),
            report_dir: PathBuf::from(".test-smith/reports"),
            log_dir: PathBuf::from(".test-smith/logs"),
            min_quality_score: 0.5,
            min_content_length: 100,
            gc_checkpoints: true,
        }
    }
}

impl Config {
    /// Reads configuration from the environment.
    ///
    /// Unset variables fall back to defaults. Parse failures on set
    /// variables are configuration errors, not silent fallbacks.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] for malformed variable values.
    pub fn from_env() -> Result<Self> {
        let mut config = Self::default();

        if let Ok(value) = std::env::var("MODEL_PROVIDER") {
            config.model_provider = ModelProvider::parse(&value)?;
        }
        if let Ok(value) = std::env::var("PRIMARY_API_KEY") {
            config.primary_api_key = Some(value);
        }
        if let Ok(value) = std::env::var("LOCAL_BASE_URL") {
            config.local_base_url = value;
        }
        if let Ok(value) = std::env::var("MODEL_NAME") {
            config.model_name = value;
        }
        if let Ok(value) = std::env::var("EMBEDDING_MODEL") {
            config.embedding_model = value;
        }
        if let Ok(value) = std::env::var("WEB_SEARCH_API_KEYS") {
            config.web_search_api_keys = parse_key_map(&value)?;
        }
        if let Ok(value) = std::env::var("SEARCH_PROVIDER_PRIORITY") {
            config.search_provider_priority = value
                .split(',')
                .map(|s| s.trim().to_lowercase())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Ok(value) = std::env::var("LOG_LEVEL") {
            config.log_level = LogLevel::parse(&value)?;
        }
        if let Ok(value) = std::env::var("STRUCTURED_LOGS_JSON") {
            config.structured_logs_json = parse_bool("STRUCTURED_LOGS_JSON", &value)?;
        }
        if let Ok(value) = std::env::var("RECURSION_LIMIT") {
            config.recursion_limit = parse_number("RECURSION_LIMIT", &value)?;
        }
        if let Ok(value) = std::env::var("MAX_LOOPS") {
            config.max_loops = parse_number("MAX_LOOPS", &value)?;
        }
        if let Ok(value) = std::env::var("MAX_DEPTH") {
            config.max_depth = parse_number("MAX_DEPTH", &value)?;
        }
        if let Ok(value) = std::env::var("MAX_REVISIONS") {
            config.max_revisions = parse_number("MAX_REVISIONS", &value)?;
        }
        if let Ok(value) = std::env::var("MAX_TOTAL_SUBTASKS") {
            config.max_total_subtasks = parse_number("MAX_TOTAL_SUBTASKS", &value)?;
        }
        if let Ok(value) = std::env::var("TEST_SMITH_DB_PATH") {
            config.db_path = PathBuf::from(value);
        }
        if let Ok(value) = std::env::var("TEST_SMITH_REPORT_DIR") {
            config.report_dir = PathBuf::from(value);
        }
        if let Ok(value) = std::env::var("TEST_SMITH_LOG_DIR") {
            config.log_dir = PathBuf::from(value);
        }

        Ok(config)
    }

    /// Per-step timeout as a [`Duration`].
    #[must_use]
    pub const fn step_timeout(&self) -> Duration {
        Duration::from_secs(self.step_timeout_secs)
    }

    /// Per-run wall-clock cap as a [`Duration`].
    #[must_use]
    pub const fn run_timeout(&self) -> Duration {
        Duration::from_secs(self.run_timeout_secs)
    }

    /// API key for a named web-search provider, if configured.
    #[must_use]
    pub fn web_search_key(&self, provider: &str) -> Option<&str> {
        self.web_search_api_keys
            .iter()
            .find(|(name, _)| name == provider)
            .map(|(_, key)| key.as_str())
    }
}

/// Parses `provider=key,provider=key` pairs (a bare `key` maps to the first
/// provider in the priority chain at construction time).
fn parse_key_map(value: &str) -> Result<Vec<(String, String)>> {
    let mut pairs = Vec::new();
    for entry in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        match entry.split_once('=') {
            Some((name, key)) => pairs.push((name.trim().to_lowercase(), key.trim().to_string())),
            None => pairs.push(("tavily".to_string(), entry.to_string())),
        }
    }
    Ok(pairs)
}

fn parse_bool(name: &str, value: &str) -> Result<bool> {
    match value.to_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        other => Err(Error::Config {
            message: format!("{name} must be true or false, got: {other}"),
        }),
    }
}

fn parse_number<T: std::str::FromStr>(name: &str, value: &str) -> Result<T> {
    value.parse().map_err(|_| Error::Config {
        message: format!("{name} must be a number, got: {value}"),
    })
}
