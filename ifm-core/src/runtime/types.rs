use chrono::{DateTime, Utc};
use ifm_types::WorkflowStatusKind;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;

/// Unique identifier of a workflow run.
pub type WorkflowId = String;

/// Errors produced by activities and by the runtime driving them.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum WorkflowError {
    /// The external defect-recognition routine failed.
    #[error("model execution failed: {message}")]
    ModelExecution { message: String },

    /// An expected table or image is absent.
    #[error("missing file: {path}")]
    MissingFile { path: String },

    /// The output table lacks required columns or holds unreadable cells.
    #[error("malformed table {path}: {reason}")]
    MalformedTable { path: String, reason: String },

    /// The user lacks read access to the target upload.
    #[error("user '{user_id}' has no access to upload '{upload_id}'")]
    AccessDenied { upload_id: String, user_id: String },

    /// The target upload does not exist.
    #[error("upload not found: {upload_id}")]
    UploadNotFound { upload_id: String },

    /// A run could not be started or the orchestrator is unreachable.
    #[error("workflow dispatch failed: {message}")]
    WorkflowDispatch { message: String },

    /// A single activity attempt exceeded its start-to-close timeout.
    #[error("activity '{activity}' timed out after {after:?}")]
    Timeout { activity: String, after: Duration },

    /// The run was cancelled before completing.
    #[error("workflow cancelled")]
    Cancelled,

    /// The referenced run does not exist.
    #[error("workflow run not found: {workflow_id}")]
    RunNotFound { workflow_id: WorkflowId },

    /// An activity crashed without producing a result.
    #[error("activity '{activity}' failed: {message}")]
    ActivityFailed { activity: String, message: String },

    /// A filesystem or serialization error.
    #[error("i/o error: {message}")]
    Io { message: String },
}

impl WorkflowError {
    pub fn io(err: impl std::fmt::Display) -> Self {
        WorkflowError::Io {
            message: err.to_string(),
        }
    }
}

/// High-level lifecycle state of a run managed by the [`Orchestrator`].
///
/// [`Orchestrator`]: crate::runtime::orchestrator::Orchestrator
#[derive(Debug, Clone, PartialEq)]
pub enum RunState {
    /// Run has been accepted but no activity was dispatched yet.
    Pending,
    /// Run is executing the named activity.
    Running {
        step_index: usize,
        activity: String,
    },
    /// Every activity completed.
    Completed,
    /// An activity exhausted its retries; holds the last error.
    Failed { error: WorkflowError },
    /// Run was cancelled between steps.
    Cancelled,
}

impl RunState {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RunState::Completed | RunState::Failed { .. } | RunState::Cancelled
        )
    }

    /// Status value mirrored into the records that track this run.
    pub fn status_kind(&self) -> WorkflowStatusKind {
        match self {
            RunState::Pending | RunState::Running { .. } => WorkflowStatusKind::Running,
            RunState::Completed => WorkflowStatusKind::Completed,
            RunState::Failed { .. } => WorkflowStatusKind::Failed,
            RunState::Cancelled => WorkflowStatusKind::Canceled,
        }
    }
}

/// Execution status of a single dispatched activity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StepStatus {
    Running { attempt: u32 },
    Completed { attempts: u32 },
    Failed { attempts: u32 },
    Cancelled,
}

/// One dispatched activity of a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StepRecord {
    pub activity: String,
    pub status: StepStatus,
}

/// Entry in a run's history.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum RunEvent {
    WorkflowStarted {
        workflow: String,
        at: DateTime<Utc>,
    },
    ActivityScheduled {
        activity: String,
        attempt: u32,
        at: DateTime<Utc>,
    },
    ActivityFailed {
        activity: String,
        attempt: u32,
        error: String,
        at: DateTime<Utc>,
    },
    ActivityCompleted {
        activity: String,
        attempt: u32,
        at: DateTime<Utc>,
    },
    WorkflowCompleted {
        at: DateTime<Utc>,
    },
    WorkflowFailed {
        error: String,
        at: DateTime<Utc>,
    },
    WorkflowCancelled {
        at: DateTime<Utc>,
    },
}
