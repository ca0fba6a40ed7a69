use std::time::Duration;

use chrono::Utc;
use tokio::sync::watch;
use tracing::{info, warn};

use crate::runtime::activity::Activity;
use crate::runtime::retry::ActivityOptions;
use crate::runtime::storage::RunStorage;
use crate::runtime::types::{RunEvent, RunState, StepStatus, WorkflowError, WorkflowId};

/// Handle a running workflow uses to dispatch its activities.
///
/// Every dispatch is recorded in the run's step list and history, so the
/// workflow itself stays free of bookkeeping.
pub struct WorkflowContext<O> {
    workflow_id: WorkflowId,
    storage: RunStorage<O>,
    cancel_rx: watch::Receiver<bool>,
}

impl<O: Clone + Send + Sync + 'static> WorkflowContext<O> {
    pub(crate) fn new(
        workflow_id: WorkflowId,
        storage: RunStorage<O>,
        cancel_rx: watch::Receiver<bool>,
    ) -> Self {
        Self {
            workflow_id,
            storage,
            cancel_rx,
        }
    }

    pub fn workflow_id(&self) -> &str {
        &self.workflow_id
    }

    pub fn is_cancelled(&self) -> bool {
        *self.cancel_rx.borrow()
    }

    /// Run `activity` under `options`, retrying failed attempts.
    ///
    /// Each attempt is bounded by the start-to-close timeout.  Cancellation
    /// is observed before the step starts, during an attempt and while
    /// waiting between attempts.  A cancelled attempt's future is dropped.
    pub async fn execute_activity<A: Activity>(
        &mut self,
        activity: &A,
        input: A::Input,
        options: &ActivityOptions,
    ) -> Result<A::Output, WorkflowError> {
        if self.is_cancelled() {
            return Err(WorkflowError::Cancelled);
        }

        let step_index = self
            .storage
            .push_step(&self.workflow_id, A::NAME)
            .await
            .ok_or_else(|| WorkflowError::RunNotFound {
                workflow_id: self.workflow_id.clone(),
            })?;
        self.storage
            .set_state(
                &self.workflow_id,
                RunState::Running {
                    step_index,
                    activity: A::NAME.to_owned(),
                },
            )
            .await;

        let mut attempt: u32 = 1;
        loop {
            self.storage
                .set_step_status(&self.workflow_id, step_index, StepStatus::Running { attempt })
                .await;
            self.storage
                .record_event(
                    &self.workflow_id,
                    RunEvent::ActivityScheduled {
                        activity: A::NAME.to_owned(),
                        attempt,
                        at: Utc::now(),
                    },
                )
                .await;

            let timeout = options.start_to_close_timeout;
            let outcome = tokio::select! {
                outcome = tokio::time::timeout(timeout, activity.execute(input.clone())) => Some(outcome),
                Ok(_) = self.cancel_rx.wait_for(|cancelled| *cancelled) => None,
            };
            let result = match outcome {
                Some(Ok(result)) => result,
                Some(Err(_)) => Err(WorkflowError::Timeout {
                    activity: A::NAME.to_owned(),
                    after: timeout,
                }),
                None => {
                    self.storage
                        .set_step_status(&self.workflow_id, step_index, StepStatus::Cancelled)
                        .await;
                    info!(workflow_id = %self.workflow_id, activity = A::NAME, attempt, "activity attempt cancelled");
                    return Err(WorkflowError::Cancelled);
                }
            };

            let error = match result {
                Ok(output) => {
                    self.storage
                        .set_step_status(
                            &self.workflow_id,
                            step_index,
                            StepStatus::Completed { attempts: attempt },
                        )
                        .await;
                    self.storage
                        .record_event(
                            &self.workflow_id,
                            RunEvent::ActivityCompleted {
                                activity: A::NAME.to_owned(),
                                attempt,
                                at: Utc::now(),
                            },
                        )
                        .await;
                    info!(workflow_id = %self.workflow_id, activity = A::NAME, attempt, "activity completed");
                    return Ok(output);
                }
                Err(error) => error,
            };

            self.storage
                .record_event(
                    &self.workflow_id,
                    RunEvent::ActivityFailed {
                        activity: A::NAME.to_owned(),
                        attempt,
                        error: error.to_string(),
                        at: Utc::now(),
                    },
                )
                .await;

            if !options.retry_policy.allows_retry(attempt) {
                self.storage
                    .set_step_status(
                        &self.workflow_id,
                        step_index,
                        StepStatus::Failed { attempts: attempt },
                    )
                    .await;
                warn!(
                    workflow_id = %self.workflow_id,
                    activity = A::NAME,
                    attempts = attempt,
                    error = %error,
                    "activity failed; retries exhausted"
                );
                return Err(error);
            }

            let delay = options.retry_policy.delay_after(attempt);
            warn!(
                workflow_id = %self.workflow_id,
                activity = A::NAME,
                attempt,
                error = %error,
                retry_in_ms = delay.as_millis() as u64,
                "activity attempt failed; retrying"
            );

            if self.backoff(delay).await {
                self.storage
                    .set_step_status(&self.workflow_id, step_index, StepStatus::Cancelled)
                    .await;
                return Err(WorkflowError::Cancelled);
            }
            attempt += 1;
        }
    }

    /// Sleep for `delay`; returns `true` if the run was cancelled meanwhile.
    async fn backoff(&mut self, delay: Duration) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(delay) => false,
            Ok(_) = self.cancel_rx.wait_for(|cancelled| *cancelled) => true,
        }
    }
}
