//! Error types for Test-Smith operations.
//!
//! This module provides a comprehensive error hierarchy using `thiserror` for
//! all operations including workflow execution, external providers,
//! preprocessing, storage, and CLI commands.

use thiserror::Error;

/// Result type alias for Test-Smith operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Comprehensive error types for Test-Smith operations.
#[derive(Error, Debug)]
pub enum Error {
    /// Workflow engine errors (execution, routing, budgets).
    #[error("engine error: {0}")]
    Engine(#[from] EngineError),

    /// External provider errors (generator, embedder, retriever, search).
    #[error("provider error: {0}")]
    Provider(#[from] ProviderError),

    /// Preprocessing pipeline errors.
    #[error("preprocess error: {0}")]
    Preprocess(#[from] PreprocessError),

    /// Storage-related errors (database operations).
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    /// I/O errors (file operations).
    #[error("I/O error: {0}")]
    Io(#[from] IoError),

    /// Invalid state errors.
    #[error("invalid state: {message}")]
    InvalidState {
        /// Description of the invalid state.
        message: String,
    },

    /// Configuration errors (missing credential, unknown setting).
    #[error("configuration error: {message}")]
    Config {
        /// Description of the configuration error.
        message: String,
    },
}

impl Error {
    /// Process exit code for this error per the command contract.
    ///
    /// 1 for exhausted budgets and timeouts, 2 for configuration errors,
    /// 3 for step failures, 1 otherwise.
    #[must_use]
    pub const fn exit_code(&self) -> u8 {
        match self {
            Self::Config { .. } => 2,
            Self::Engine(EngineError::StepFailure { .. } | EngineError::StepTimeout { .. }) => 3,
            _ => 1,
        }
    }
}

/// Workflow engine errors.
#[derive(Error, Debug)]
pub enum EngineError {
    /// Requested workflow name is not registered.
    #[error("workflow not found: {name}")]
    WorkflowNotFound {
        /// The unknown workflow name.
        name: String,
    },

    /// A workflow was re-registered with a different definition.
    #[error("workflow conflict: {name} already registered with a different definition")]
    WorkflowConflict {
        /// The conflicting workflow name.
        name: String,
    },

    /// A workflow definition failed validation at registration.
    #[error("invalid workflow definition: {reason}")]
    InvalidDefinition {
        /// Why validation failed.
        reason: String,
    },

    /// More step activations occurred than the recursion limit allows.
    #[error("recursion limit exceeded: {limit} step activations")]
    RecursionLimitExceeded {
        /// The configured limit.
        limit: u32,
    },

    /// A declared workflow budget would be exceeded by the next step.
    #[error("budget exceeded: {field} = {value} over limit {limit}")]
    BudgetExceeded {
        /// The budgeted state field.
        field: String,
        /// Observed value.
        value: u64,
        /// Declared limit.
        limit: u64,
    },

    /// A step raised and no recovery edge exists.
    #[error("step failure in '{step}': {cause}")]
    StepFailure {
        /// Name of the failed step.
        step: String,
        /// Underlying cause.
        cause: String,
    },

    /// A step exceeded the per-step timeout.
    #[error("step '{step}' timed out after {seconds}s")]
    StepTimeout {
        /// Name of the step.
        step: String,
        /// Timeout that was exceeded.
        seconds: u64,
    },

    /// The run exceeded the wall-clock cap.
    #[error("run timed out after {seconds}s")]
    RunTimeout {
        /// Timeout that was exceeded.
        seconds: u64,
    },

    /// The run was cancelled by the caller.
    #[error("run cancelled for thread {thread_id}")]
    Cancelled {
        /// Thread whose run was cancelled.
        thread_id: String,
    },

    /// No checkpoint exists for the thread being resumed.
    #[error("no checkpoint for thread {thread_id}")]
    NoCheckpoint {
        /// Thread id with no stored checkpoint.
        thread_id: String,
    },

    /// A conditional selector routed to an undeclared target.
    #[error("selector for '{step}' routed to undeclared target '{target}'")]
    InvalidRoute {
        /// Step whose selector misrouted.
        step: String,
        /// The undeclared target.
        target: String,
    },

    /// A step update touched a field the state schema does not declare.
    #[error("step '{step}' wrote undeclared state field '{field}'")]
    UndeclaredField {
        /// Step that produced the update.
        step: String,
        /// The undeclared field name.
        field: String,
    },
}

/// External provider errors.
#[derive(Error, Debug)]
pub enum ProviderError {
    /// Text generator call failed after retry.
    #[error("text generator error: {0}")]
    Generator(String),

    /// A structured-output call did not match the declared schema.
    #[error("schema validation failed for '{schema}': {reason}")]
    SchemaValidation {
        /// Name of the declared output schema.
        schema: String,
        /// Why validation failed.
        reason: String,
    },

    /// Embedder call failed.
    #[error("embedder error: {0}")]
    Embedder(String),

    /// An embedding batch failed even after halving and retrying.
    #[error("embedding batch failed after retry: {reason} (batch size {batch_size})")]
    EmbeddingBatchFailure {
        /// Why the batch failed.
        reason: String,
        /// Size of the failing batch.
        batch_size: usize,
    },

    /// Retriever call failed.
    #[error("retriever error: {0}")]
    Retriever(String),

    /// A single web-search provider failed.
    #[error("web search provider '{provider}' failed: {reason}")]
    WebSearch {
        /// Provider name.
        provider: String,
        /// Why the call failed.
        reason: String,
    },

    /// Every provider in the web-search chain failed.
    #[error("web search unavailable: {error_class}")]
    WebSearchUnavailable {
        /// Class of the last error observed in the chain.
        error_class: String,
    },
}

/// Preprocessing pipeline errors.
#[derive(Error, Debug)]
pub enum PreprocessError {
    /// Duplicate content hashes survived deduplication, or a chunk exceeds
    /// length bounds after chunking. Fatal; no partial install.
    #[error("data integrity violation: {reason}")]
    DataIntegrity {
        /// Description of the violation.
        reason: String,
    },

    /// Invalid splitter configuration.
    #[error("invalid chunking configuration: {reason}")]
    InvalidConfig {
        /// Reason the configuration is invalid.
        reason: String,
    },

    /// Overlap exceeds chunk size.
    #[error("overlap {overlap} must be less than chunk size {size}")]
    OverlapTooLarge {
        /// Overlap size.
        overlap: usize,
        /// Chunk size.
        size: usize,
    },

    /// Unknown chunking strategy name.
    #[error("unknown chunking strategy: {name}")]
    UnknownStrategy {
        /// Name of the unknown strategy.
        name: String,
    },

    /// The source directory contains no processable documents.
    #[error("no documents found under {path}")]
    EmptySource {
        /// Directory that was scanned.
        path: String,
    },

    /// Regex compilation error.
    #[error("regex error: {0}")]
    Regex(String),
}

/// Storage-specific errors for database operations.
#[derive(Error, Debug)]
pub enum StorageError {
    /// Database connection or query error.
    #[error("database error: {0}")]
    Database(String),

    /// Collection not found in the retriever store.
    #[error("collection not found: {name}")]
    CollectionNotFound {
        /// Collection name that was not found.
        name: String,
    },

    /// Schema migration error.
    #[error("migration error: {0}")]
    Migration(String),

    /// Transaction error.
    #[error("transaction error: {0}")]
    Transaction(String),

    /// Serialization/deserialization error.
    #[error("serialization error: {0}")]
    Serialization(String),
}

/// I/O-specific errors for file operations.
#[derive(Error, Debug)]
pub enum IoError {
    /// File not found.
    #[error("file not found: {path}")]
    FileNotFound {
        /// Path to the file that was not found.
        path: String,
    },

    /// Failed to read file.
    #[error("failed to read file: {path}: {reason}")]
    ReadFailed {
        /// Path to the file.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Failed to write file.
    #[error("failed to write file: {path}: {reason}")]
    WriteFailed {
        /// Path to the file.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Memory mapping error.
    #[error("memory mapping failed: {path}: {reason}")]
    MmapFailed {
        /// Path to the file.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Directory creation error.
    #[error("failed to create directory: {path}: {reason}")]
    DirectoryFailed {
        /// Path to the directory.
        path: String,
        /// Reason for failure.
        reason: String,
    },

    /// Generic I/O error wrapper.
    #[error("I/O error: {0}")]
    Generic(String),
}

// Implement From traits for standard library and dependency errors

impl From<std::io::Error> for Error {
    fn from(err: std::io::Error) -> Self {
        Self::Io(IoError::Generic(err.to_string()))
    }
}

impl From<rusqlite::Error> for Error {
    fn from(err: rusqlite::Error) -> Self {
        Self::Storage(StorageError::Database(err.to_string()))
    }
}

impl From<rusqlite::Error> for StorageError {
    fn from(err: rusqlite::Error) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Self::Storage(StorageError::Serialization(err.to_string()))
    }
}

impl From<regex::Error> for PreprocessError {
    fn from(err: regex::Error) -> Self {
        Self::Regex(err.to_string())
    }
}
