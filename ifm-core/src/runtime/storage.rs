use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{watch, RwLock};

use crate::runtime::types::{RunEvent, RunState, StepRecord, StepStatus, WorkflowId};

/// The complete in-memory record for a single workflow run.
#[derive(Debug)]
pub struct RunRecord<O> {
    pub workflow_id: WorkflowId,
    pub workflow: &'static str,
    pub state: RunState,
    pub steps: Vec<StepRecord>,
    pub history: Vec<RunEvent>,
    pub output: Option<O>,
    pub started_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
    /// Cancellation sender; the run's task holds a receiver.
    pub cancel_tx: Arc<watch::Sender<bool>>,
}

/// Thread-safe in-memory store of the runs the orchestrator has accepted.
///
/// Uses a `tokio::sync::RwLock<HashMap>` so status queries run concurrently
/// while each run's task updates its own record.  Records do not survive a
/// restart; terminal runs are dropped by [`RunStorage::evict_closed_before`].
#[derive(Debug)]
pub struct RunStorage<O> {
    inner: Arc<RwLock<HashMap<WorkflowId, RunRecord<O>>>>,
}

impl<O> Clone for RunStorage<O> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<O> Default for RunStorage<O> {
    fn default() -> Self {
        Self {
            inner: Arc::new(RwLock::new(HashMap::new())),
        }
    }
}

impl<O: Clone> RunStorage<O> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a `Pending` record for a new run and return its cancel sender.
    pub async fn create_run(
        &self,
        workflow_id: WorkflowId,
        workflow: &'static str,
    ) -> Arc<watch::Sender<bool>> {
        let (cancel_tx, _cancel_rx) = watch::channel(false);
        let cancel_tx = Arc::new(cancel_tx);
        let now = Utc::now();

        let record = RunRecord {
            workflow_id: workflow_id.clone(),
            workflow,
            state: RunState::Pending,
            steps: Vec::new(),
            history: vec![RunEvent::WorkflowStarted {
                workflow: workflow.to_owned(),
                at: now,
            }],
            output: None,
            started_at: now,
            closed_at: None,
            cancel_tx: Arc::clone(&cancel_tx),
        };

        self.inner.write().await.insert(workflow_id, record);
        cancel_tx
    }

    pub async fn set_state(&self, workflow_id: &str, state: RunState) {
        if let Some(record) = self.inner.write().await.get_mut(workflow_id) {
            if state.is_terminal() {
                record.closed_at = Some(Utc::now());
            }
            record.state = state;
        }
    }

    /// Append a step record and return its index.
    pub async fn push_step(&self, workflow_id: &str, activity: &str) -> Option<usize> {
        let mut guard = self.inner.write().await;
        let record = guard.get_mut(workflow_id)?;
        record.steps.push(StepRecord {
            activity: activity.to_owned(),
            status: StepStatus::Running { attempt: 1 },
        });
        Some(record.steps.len() - 1)
    }

    pub async fn set_step_status(&self, workflow_id: &str, step_index: usize, status: StepStatus) {
        if let Some(record) = self.inner.write().await.get_mut(workflow_id) {
            if let Some(step) = record.steps.get_mut(step_index) {
                step.status = status;
            }
        }
    }

    pub async fn record_event(&self, workflow_id: &str, event: RunEvent) {
        if let Some(record) = self.inner.write().await.get_mut(workflow_id) {
            record.history.push(event);
        }
    }

    pub async fn set_output(&self, workflow_id: &str, output: O) {
        if let Some(record) = self.inner.write().await.get_mut(workflow_id) {
            record.output = Some(output);
        }
    }

    pub async fn cancel_tx(&self, workflow_id: &str) -> Option<Arc<watch::Sender<bool>>> {
        self.inner
            .read()
            .await
            .get(workflow_id)
            .map(|r| Arc::clone(&r.cancel_tx))
    }

    /// Drop terminal runs that closed before `cutoff` and return how many
    /// were removed.
    pub async fn evict_closed_before(&self, cutoff: DateTime<Utc>) -> usize {
        let mut guard = self.inner.write().await;
        let before = guard.len();
        guard.retain(|_, record| record.closed_at.is_none_or(|closed| closed >= cutoff));
        before - guard.len()
    }

    /// Return a snapshot of a run.
    pub async fn view(&self, workflow_id: &str) -> Option<RunView<O>> {
        let guard = self.inner.read().await;
        let record = guard.get(workflow_id)?;
        Some(RunView {
            workflow_id: record.workflow_id.clone(),
            workflow: record.workflow,
            state: record.state.clone(),
            steps: record.steps.clone(),
            history: record.history.clone(),
            output: record.output.clone(),
            started_at: record.started_at,
            closed_at: record.closed_at,
        })
    }

    pub async fn state(&self, workflow_id: &str) -> Option<RunState> {
        self.inner
            .read()
            .await
            .get(workflow_id)
            .map(|r| r.state.clone())
    }

    /// Output of a completed run.  Unlike a one-shot result slot, the
    /// output stays in place so repeated refreshes observe the same value.
    pub async fn output(&self, workflow_id: &str) -> Option<O> {
        self.inner
            .read()
            .await
            .get(workflow_id)
            .and_then(|r| r.output.clone())
    }
}

/// A read-only snapshot of a run returned to callers.
#[derive(Debug, Clone)]
pub struct RunView<O> {
    pub workflow_id: WorkflowId,
    pub workflow: &'static str,
    pub state: RunState,
    pub steps: Vec<StepRecord>,
    pub history: Vec<RunEvent>,
    pub output: Option<O>,
    pub started_at: DateTime<Utc>,
    pub closed_at: Option<DateTime<Utc>>,
}
