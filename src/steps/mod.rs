//! The shared step library.
//!
//! A step is a pure function from state to a partial state update,
//! possibly invoking external systems through the provider seams. Steps
//! never mutate state; the engine merges their updates under the
//! workflow's state schema.

pub mod analyze;
pub mod evaluate;
pub mod gather;
pub mod master;
pub mod planner;
pub mod prompts;
pub mod subtask;
pub mod synthesize;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use tokio::sync::OnceCell;

use crate::config::Config;
use crate::error::Result;
use crate::providers::ProviderSet;
use crate::state::{KbStatus, StateUpdate, WorkflowState};

pub use analyze::AnalyzeStep;
pub use evaluate::{EvaluateStep, sufficiency_router};
pub use gather::{RetrieveStep, WebSearchStep};
pub use master::{MasterPlanStep, mode_router};
pub use planner::PlanStep;
pub use subtask::{
    DepthEvalStep, DrillDownStep, ReviseStep, SaveSubtaskStep, SelectSubtaskStep,
    SubtaskExecuteStep, depth_router, next_subtask_router,
};
pub use synthesize::SynthesizeStep;

/// Cooperative cancellation flag shared between a run and its caller.
///
/// Cancellation takes effect at the next suspension point; the engine then
/// writes a cancelled checkpoint and returns.
#[derive(Clone, Default)]
pub struct CancelFlag(Arc<AtomicBool>);

impl CancelFlag {
    /// Creates an unset flag.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Signals cancellation.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation has been signalled.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Per-run context handed to every step activation.
pub struct StepContext {
    /// Immutable runtime configuration.
    pub config: Arc<Config>,
    /// Provider seams.
    pub providers: ProviderSet,
    /// Thread id of the run.
    pub thread_id: String,
    cancel: CancelFlag,
    kb_status: OnceCell<KbStatus>,
}

impl StepContext {
    /// Builds a fresh context for one run.
    #[must_use]
    pub fn new(
        config: Arc<Config>,
        providers: ProviderSet,
        thread_id: String,
        cancel: CancelFlag,
    ) -> Self {
        Self {
            config,
            providers,
            thread_id,
            cancel,
            kb_status: OnceCell::new(),
        }
    }

    /// Knowledge-base status, read from the retriever once per run.
    ///
    /// # Errors
    ///
    /// Returns an error if the first read fails.
    pub async fn kb_status(&self) -> Result<KbStatus> {
        let status = self
            .kb_status
            .get_or_try_init(|| async {
                self.providers
                    .retriever
                    .status(&self.config.collection)
                    .await
            })
            .await?;
        Ok(status.clone())
    }

    /// Whether cancellation has been signalled for this run.
    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// A named processing step.
#[async_trait]
pub trait Step: Send + Sync {
    /// Step name, unique within a workflow.
    fn name(&self) -> &'static str;

    /// Executes the step against a state snapshot.
    ///
    /// # Errors
    ///
    /// Step errors surface as `StepFailure` in the engine; steps wrapping
    /// fallible externals implement their own recovery where the contract
    /// defines one.
    async fn run(&self, state: &WorkflowState, ctx: &StepContext) -> Result<StateUpdate>;
}
