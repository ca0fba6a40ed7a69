use ifm_core::{InferenceOutcome, InferencePhase, RunView};
use ifm_types::WorkflowStatusKind;
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WorkflowStatusResponse {
    pub workflow_id: String,
    /// `RUNNING`, `COMPLETED`, `FAILED`, `CANCELED` or `UNKNOWN`.
    pub status: String,
}

impl WorkflowStatusResponse {
    pub fn new(workflow_id: String, status: WorkflowStatusKind) -> Self {
        Self {
            workflow_id,
            status: status.to_string(),
        }
    }
}

/// Detailed view of one run.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct WorkflowResponse {
    pub workflow_id: String,
    pub workflow: String,
    pub status: String,
    /// Fine-grained progress, e.g. `RUNNING_PARSE`.
    pub phase: String,
    /// Error of a failed run.
    pub error: Option<String>,
    #[schema(value_type = Vec<Object>)]
    pub steps: serde_json::Value,
    #[schema(value_type = Vec<Object>)]
    pub history: serde_json::Value,
    #[schema(value_type = Option<Object>)]
    pub output: Option<serde_json::Value>,
    pub started_at: String,
    pub closed_at: Option<String>,
}

impl WorkflowResponse {
    pub fn from_view(view: RunView<InferenceOutcome>) -> Result<Self, serde_json::Error> {
        let error = match &view.state {
            ifm_core::RunState::Failed { error } => Some(error.to_string()),
            _ => None,
        };
        Ok(Self {
            status: view.state.status_kind().to_string(),
            phase: InferencePhase::from_state(&view.state).to_string(),
            error,
            steps: serde_json::to_value(&view.steps)?,
            history: serde_json::to_value(&view.history)?,
            output: view.output.as_ref().map(serde_json::to_value).transpose()?,
            started_at: view.started_at.to_rfc3339(),
            closed_at: view.closed_at.map(|t| t.to_rfc3339()),
            workflow_id: view.workflow_id,
            workflow: view.workflow.to_owned(),
        })
    }
}
