use std::sync::Arc;
use std::time::Duration;

use chrono::{TimeDelta, Utc};
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::runtime::activity::Workflow;
use crate::runtime::context::WorkflowContext;
use crate::runtime::storage::{RunStorage, RunView};
use crate::runtime::types::{RunEvent, RunState, WorkflowError, WorkflowId};

/// Commands sent to the orchestrator's internal event loop.
#[derive(Debug)]
pub enum OrchestratorCommand<I> {
    /// Start a new run of the workflow.
    Submit {
        input: I,
        /// Channel used to return the allocated run id to the caller.
        reply_tx: oneshot::Sender<WorkflowId>,
    },
    /// Request cancellation of a run.
    Cancel { workflow_id: WorkflowId },
}

/// Runs workflows of type `W`.
///
/// Accepts submissions over a bounded queue, drives each run on its own
/// task and records every transition in [`RunStorage`].
///
/// ```rust,ignore
/// let orchestrator = Orchestrator::start(Arc::new(workflow), 64);
/// let workflow_id = orchestrator.submit(input).await?;
/// let view = orchestrator.view(&workflow_id).await?;
/// ```
pub struct Orchestrator<W: Workflow> {
    storage: RunStorage<W::Output>,
    submit_tx: mpsc::Sender<OrchestratorCommand<W::Input>>,
}

impl<W: Workflow> Clone for Orchestrator<W> {
    fn clone(&self) -> Self {
        Self {
            storage: self.storage.clone(),
            submit_tx: self.submit_tx.clone(),
        }
    }
}

impl<W: Workflow> std::fmt::Debug for Orchestrator<W> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("workflow", &W::NAME)
            .field("queue_capacity", &self.submit_tx.max_capacity())
            .finish()
    }
}

impl<W: Workflow> Orchestrator<W> {
    /// Start the orchestrator.
    ///
    /// Spawns the command-dispatch loop; must be called inside a Tokio
    /// runtime.
    ///
    /// * `workflow`       – the workflow definition every run executes.
    /// * `queue_capacity` – maximum number of pending commands.
    pub fn start(workflow: Arc<W>, queue_capacity: usize) -> Self {
        Self::start_with_retention(workflow, queue_capacity, None)
    }

    /// Like [`Orchestrator::start`], but terminal runs older than `retention`
    /// are evicted whenever a new run is submitted.  `None` keeps every run.
    pub fn start_with_retention(
        workflow: Arc<W>,
        queue_capacity: usize,
        retention: Option<Duration>,
    ) -> Self {
        let (submit_tx, submit_rx) = mpsc::channel(queue_capacity.max(1));
        let storage = RunStorage::new();
        let retention = retention.and_then(|r| TimeDelta::from_std(r).ok());

        let loop_storage = storage.clone();
        tokio::spawn(async move {
            Self::run_loop(submit_rx, loop_storage, workflow, retention).await;
        });

        Self { storage, submit_tx }
    }

    async fn run_loop(
        mut rx: mpsc::Receiver<OrchestratorCommand<W::Input>>,
        storage: RunStorage<W::Output>,
        workflow: Arc<W>,
        retention: Option<TimeDelta>,
    ) {
        while let Some(cmd) = rx.recv().await {
            match cmd {
                OrchestratorCommand::Submit { input, reply_tx } => {
                    if let Some(retention) = retention {
                        let evicted = storage.evict_closed_before(Utc::now() - retention).await;
                        if evicted > 0 {
                            debug!(evicted, "evicted closed workflow runs");
                        }
                    }
                    let workflow_id = Uuid::new_v4().to_string();
                    let cancel_tx = storage.create_run(workflow_id.clone(), W::NAME).await;
                    let _ = reply_tx.send(workflow_id.clone());
                    info!(workflow_id = %workflow_id, workflow = W::NAME, "workflow run started");

                    let run_storage = storage.clone();
                    let run_workflow = Arc::clone(&workflow);
                    tokio::spawn(async move {
                        Self::execute_run(workflow_id, run_workflow, input, run_storage, cancel_tx)
                            .await;
                    });
                }

                OrchestratorCommand::Cancel { workflow_id } => {
                    if let Some(tx) = storage.cancel_tx(&workflow_id).await {
                        let _ = tx.send(true);
                        info!(workflow_id = %workflow_id, "cancellation requested");
                    } else {
                        warn!(workflow_id = %workflow_id, "cancel: run not found");
                    }
                }
            }
        }
    }

    /// Drive a single run to a terminal state.
    async fn execute_run(
        workflow_id: WorkflowId,
        workflow: Arc<W>,
        input: W::Input,
        storage: RunStorage<W::Output>,
        cancel_tx: Arc<watch::Sender<bool>>,
    ) {
        let mut ctx = WorkflowContext::new(workflow_id.clone(), storage.clone(), cancel_tx.subscribe());

        match workflow.run(&mut ctx, input).await {
            Ok(output) => {
                storage.set_output(&workflow_id, output).await;
                storage
                    .record_event(&workflow_id, RunEvent::WorkflowCompleted { at: Utc::now() })
                    .await;
                storage.set_state(&workflow_id, RunState::Completed).await;
                info!(workflow_id = %workflow_id, "workflow run completed");
            }
            Err(WorkflowError::Cancelled) => {
                storage
                    .record_event(&workflow_id, RunEvent::WorkflowCancelled { at: Utc::now() })
                    .await;
                storage.set_state(&workflow_id, RunState::Cancelled).await;
                info!(workflow_id = %workflow_id, "workflow run cancelled");
            }
            Err(error) => {
                storage
                    .record_event(
                        &workflow_id,
                        RunEvent::WorkflowFailed {
                            error: error.to_string(),
                            at: Utc::now(),
                        },
                    )
                    .await;
                warn!(workflow_id = %workflow_id, error = %error, "workflow run failed");
                storage.set_state(&workflow_id, RunState::Failed { error }).await;
            }
        }
    }

    // ── Public API ───────────────────────────────────────────────────────────

    /// Submit a new run.
    ///
    /// Returns the run id as soon as the run is registered; execution
    /// happens in the background.
    pub async fn submit(&self, input: W::Input) -> Result<WorkflowId, WorkflowError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.submit_tx
            .try_send(OrchestratorCommand::Submit { input, reply_tx })
            .map_err(|e| match e {
                mpsc::error::TrySendError::Full(_) => WorkflowError::WorkflowDispatch {
                    message: format!(
                        "submission queue full (capacity {})",
                        self.submit_tx.max_capacity()
                    ),
                },
                mpsc::error::TrySendError::Closed(_) => WorkflowError::WorkflowDispatch {
                    message: "orchestrator is shut down".into(),
                },
            })?;

        reply_rx.await.map_err(|_| WorkflowError::WorkflowDispatch {
            message: "orchestrator dropped the submission".into(),
        })
    }

    /// Request cooperative cancellation of a run.
    pub async fn cancel(&self, workflow_id: &str) -> Result<(), WorkflowError> {
        if self.storage.state(workflow_id).await.is_none() {
            return Err(WorkflowError::RunNotFound {
                workflow_id: workflow_id.to_owned(),
            });
        }
        self.submit_tx
            .send(OrchestratorCommand::Cancel {
                workflow_id: workflow_id.to_owned(),
            })
            .await
            .map_err(|_| WorkflowError::WorkflowDispatch {
                message: "orchestrator is shut down".into(),
            })
    }

    pub async fn state(&self, workflow_id: &str) -> Result<RunState, WorkflowError> {
        self.storage
            .state(workflow_id)
            .await
            .ok_or_else(|| WorkflowError::RunNotFound {
                workflow_id: workflow_id.to_owned(),
            })
    }

    /// Return a snapshot of the run's state, steps and history.
    pub async fn view(&self, workflow_id: &str) -> Result<RunView<W::Output>, WorkflowError> {
        self.storage
            .view(workflow_id)
            .await
            .ok_or_else(|| WorkflowError::RunNotFound {
                workflow_id: workflow_id.to_owned(),
            })
    }

    /// Output of a completed run, `None` while it is still in progress.
    pub async fn output(&self, workflow_id: &str) -> Option<W::Output> {
        self.storage.output(workflow_id).await
    }
}
