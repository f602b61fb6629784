//! The workflow executor.
//!
//! Drives a validated definition over a mutable state: executes steps,
//! merges their updates under the schema, enforces budgets and timeouts,
//! runs fan-out branches concurrently against the pre-fan snapshot, and
//! commits a checkpoint after every merged update so any thread can be
//! resumed from its last completed step.

use std::sync::Arc;
use std::time::Instant;

use tracing::{debug, info, warn};

use super::definition::{Edge, Next, START, WorkflowDefinition};
use super::registry::WorkflowRegistry;
use crate::config::Config;
use crate::error::{EngineError, Result};
use crate::providers::ProviderSet;
use crate::state::{StateUpdate, WorkflowState};
use crate::steps::{CancelFlag, StepContext};
use crate::storage::{Checkpoint, CheckpointStore, RunStatus};

/// Where the drive loop stands between activations.
enum Position {
    /// Execute this step next.
    Step(String),
    /// Execute the fan-out branches of this origin step next.
    Branches(String),
    /// The run is finished.
    Done,
}

/// The workflow engine.
pub struct Engine {
    registry: Arc<WorkflowRegistry>,
    store: Arc<dyn CheckpointStore>,
    config: Arc<Config>,
}

impl Engine {
    /// Creates an engine over a registry and checkpoint store.
    #[must_use]
    pub fn new(
        registry: Arc<WorkflowRegistry>,
        store: Arc<dyn CheckpointStore>,
        config: Arc<Config>,
    ) -> Self {
        Self {
            registry,
            store,
            config,
        }
    }

    /// Runs a named workflow to completion.
    ///
    /// # Errors
    ///
    /// `WorkflowNotFound` for unknown names, `RecursionLimitExceeded`
    /// past the activation budget, `StepFailure`/`StepTimeout` from
    /// failing steps, `RunTimeout` past the wall-clock cap.
    pub async fn run(
        &self,
        workflow: &str,
        initial: WorkflowState,
        thread_id: &str,
        providers: ProviderSet,
    ) -> Result<WorkflowState> {
        self.run_with_cancel(workflow, initial, thread_id, providers, CancelFlag::new())
            .await
    }

    /// Runs a named workflow with an external cancellation flag.
    ///
    /// # Errors
    ///
    /// As [`Engine::run`], plus `Cancelled` when the flag fires.
    pub async fn run_with_cancel(
        &self,
        workflow: &str,
        initial: WorkflowState,
        thread_id: &str,
        providers: ProviderSet,
        cancel: CancelFlag,
    ) -> Result<WorkflowState> {
        let definition = self.registry.get(workflow)?;
        info!(workflow, thread_id, "starting run");

        // The initial checkpoint: a failure at the entry step resumes here.
        self.store.save(&Checkpoint::running(
            thread_id,
            workflow,
            START,
            initial.clone(),
        ))?;

        let ctx = StepContext::new(
            Arc::clone(&self.config),
            providers,
            thread_id.to_string(),
            cancel,
        );
        self.drive(
            &definition,
            initial,
            Position::Step(definition.entry().to_string()),
            START.to_string(),
            thread_id,
            &ctx,
        )
        .await
    }

    /// Resumes a thread from its latest checkpoint.
    ///
    /// Execution continues at the next outgoing edge of the last completed
    /// step; a completed thread returns its final state unchanged.
    ///
    /// # Errors
    ///
    /// `NoCheckpoint` for unknown threads, otherwise as [`Engine::run`].
    pub async fn resume(&self, thread_id: &str, providers: ProviderSet) -> Result<WorkflowState> {
        let checkpoint =
            self.store
                .latest(thread_id)?
                .ok_or_else(|| EngineError::NoCheckpoint {
                    thread_id: thread_id.to_string(),
                })?;
        if checkpoint.status == RunStatus::Completed {
            return Ok(checkpoint.state);
        }

        let definition = self.registry.get(&checkpoint.workflow)?;
        info!(
            workflow = %checkpoint.workflow,
            thread_id,
            step = %checkpoint.step,
            "resuming from checkpoint"
        );

        let position = if checkpoint.step == START {
            Position::Step(definition.entry().to_string())
        } else {
            advance(&definition, &checkpoint.step, &checkpoint.state)?
        };

        let ctx = StepContext::new(
            Arc::clone(&self.config),
            providers,
            thread_id.to_string(),
            CancelFlag::new(),
        );
        self.drive(
            &definition,
            checkpoint.state,
            position,
            checkpoint.step,
            thread_id,
            &ctx,
        )
        .await
    }

    #[allow(clippy::too_many_lines)]
    async fn drive(
        &self,
        definition: &WorkflowDefinition,
        mut state: WorkflowState,
        mut position: Position,
        mut last_completed: String,
        thread_id: &str,
        ctx: &StepContext,
    ) -> Result<WorkflowState> {
        let deadline = Instant::now() + self.config.run_timeout();
        let mut activations: u32 = 0;

        loop {
            if ctx.is_cancelled() {
                warn!(thread_id, step = %last_completed, "run cancelled");
                self.store.save(&Checkpoint {
                    thread_id: thread_id.to_string(),
                    workflow: definition.name().to_string(),
                    step: last_completed,
                    status: RunStatus::Cancelled,
                    state,
                    timestamp: chrono::Utc::now(),
                })?;
                return Err(EngineError::Cancelled {
                    thread_id: thread_id.to_string(),
                }
                .into());
            }
            if Instant::now() >= deadline {
                return Err(EngineError::RunTimeout {
                    seconds: self.config.run_timeout_secs,
                }
                .into());
            }

            match position {
                Position::Done => {
                    return self.finalize(definition, state, thread_id);
                }
                Position::Step(ref step_name) => {
                    let step_name = step_name.clone();
                    self.check_budgets(definition, &state)?;
                    activations = self.count_activation(activations, 1)?;

                    let update = self.run_step(definition, &step_name, &state, ctx).await?;
                    debug!(thread_id, step = %step_name, "step completed");
                    state.apply(definition.schema(), &step_name, update)?;
                    self.commit(definition, &step_name, &state, thread_id)?;
                    last_completed = step_name.clone();
                    position = advance(definition, &step_name, &state)?;
                }
                Position::Branches(ref origin) => {
                    let Edge::FanOut { branches, join } = definition.edge(origin)? else {
                        return Err(EngineError::InvalidDefinition {
                            reason: format!("step '{origin}' is not a fan-out origin"),
                        }
                        .into());
                    };
                    self.check_budgets(definition, &state)?;
                    activations = self.count_activation(activations, branches.len() as u32)?;

                    // Branches run concurrently against the pre-fan
                    // snapshot; their updates target disjoint accumulating
                    // fields and merge in sorted branch order so fan-in is
                    // reproducible.
                    let snapshot = state.clone();
                    let futures = branches.iter().map(|branch| {
                        let snapshot = &snapshot;
                        async move {
                            let update = self.run_step(definition, branch, snapshot, ctx).await?;
                            Ok::<(String, StateUpdate), crate::Error>((branch.clone(), update))
                        }
                    });
                    let mut results = futures_util::future::try_join_all(futures).await?;
                    results.sort_by(|a, b| a.0.cmp(&b.0));

                    let mut last_branch = origin.clone();
                    for (branch, update) in results {
                        state.apply(definition.schema(), &branch, update)?;
                        last_branch = branch;
                    }
                    self.commit(definition, &last_branch, &state, thread_id)?;
                    last_completed = last_branch;
                    position = Position::Step(join.clone());
                }
            }
        }
    }

    async fn run_step(
        &self,
        definition: &WorkflowDefinition,
        name: &str,
        state: &WorkflowState,
        ctx: &StepContext,
    ) -> Result<StateUpdate> {
        let step = definition.step(name)?;
        debug!(thread_id = %ctx.thread_id, step = name, "activating step");
        match tokio::time::timeout(self.config.step_timeout(), step.run(state, ctx)).await {
            Err(_) => Err(EngineError::StepTimeout {
                step: name.to_string(),
                seconds: self.config.step_timeout_secs,
            }
            .into()),
            Ok(Ok(update)) => Ok(update),
            Ok(Err(cause)) => Err(EngineError::StepFailure {
                step: name.to_string(),
                cause: cause.to_string(),
            }
            .into()),
        }
    }

    fn count_activation(&self, activations: u32, count: u32) -> Result<u32> {
        let next = activations + count;
        if next > self.config.recursion_limit {
            return Err(EngineError::RecursionLimitExceeded {
                limit: self.config.recursion_limit,
            }
            .into());
        }
        Ok(next)
    }

    fn check_budgets(&self, definition: &WorkflowDefinition, state: &WorkflowState) -> Result<()> {
        for budget in definition.budgets() {
            let value = state.counter(&budget.field);
            if value > budget.limit {
                return Err(EngineError::BudgetExceeded {
                    field: budget.field.clone(),
                    value,
                    limit: budget.limit,
                }
                .into());
            }
        }
        Ok(())
    }

    /// Commits a checkpoint; the write is durable before the next step is
    /// scheduled.
    fn commit(
        &self,
        definition: &WorkflowDefinition,
        step: &str,
        state: &WorkflowState,
        thread_id: &str,
    ) -> Result<()> {
        self.store.save(&Checkpoint::running(
            thread_id,
            definition.name(),
            step,
            state.clone(),
        ))
    }

    fn finalize(
        &self,
        definition: &WorkflowDefinition,
        state: WorkflowState,
        thread_id: &str,
    ) -> Result<WorkflowState> {
        self.store.save(&Checkpoint {
            thread_id: thread_id.to_string(),
            workflow: definition.name().to_string(),
            step: super::definition::END.to_string(),
            status: RunStatus::Completed,
            state: state.clone(),
            timestamp: chrono::Utc::now(),
        })?;
        if self.config.gc_checkpoints {
            self.store.prune(thread_id)?;
        }
        info!(workflow = definition.name(), thread_id, "run completed");
        Ok(state)
    }
}

/// Computes the next position after `completed`, re-evaluating selectors
/// against the current state (selectors are pure, so resume recomputes the
/// same route the original run took).
fn advance(
    definition: &WorkflowDefinition,
    completed: &str,
    state: &WorkflowState,
) -> Result<Position> {
    match definition.edge(completed)? {
        Edge::Direct { to } => Ok(Position::Step(to.clone())),
        Edge::End => Ok(Position::Done),
        Edge::FanOut { .. } => Ok(Position::Branches(completed.to_string())),
        Edge::Conditional {
            selector,
            targets,
            may_end,
        } => match selector(state)? {
            Next::End if *may_end => Ok(Position::Done),
            Next::End => Err(EngineError::InvalidRoute {
                step: completed.to_string(),
                target: super::definition::END.to_string(),
            }
            .into()),
            Next::Step(target) => {
                if targets.contains(&target) {
                    Ok(Position::Step(target))
                } else {
                    Err(EngineError::InvalidRoute {
                        step: completed.to_string(),
                        target,
                    }
                    .into())
                }
            }
        },
    }
}
