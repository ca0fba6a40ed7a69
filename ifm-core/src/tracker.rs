//! Explicit refresh of the run statuses stored on analysis entries.
//!
//! Statuses are never pushed; an entry only learns about its runs when a
//! refresh is requested.

use std::future::Future;

use ifm_types::{InferenceStatus, RunCompleted, TwoStepAnalysis, WorkflowStatusKind};
use tracing::{debug, warn};

use crate::runtime::types::WorkflowError;

/// Where run statuses and completed results are looked up.
pub trait StatusSource: Send + Sync {
    fn workflow_status(
        &self,
        workflow_id: &str,
    ) -> impl Future<Output = Result<WorkflowStatusKind, WorkflowError>> + Send;

    /// Result event of a completed run, `None` while the run is unfinished.
    fn completed_run(
        &self,
        workflow_id: &str,
    ) -> impl Future<Output = Option<RunCompleted>> + Send;
}

/// Refresh one status from `source`.
///
/// A failed lookup is logged and leaves `status` untouched.  Returns the
/// completion event when the run has completed and its result has not been
/// linked yet; applying it is up to the caller.
pub async fn refresh_status<S: StatusSource>(
    status: &mut InferenceStatus,
    source: &S,
) -> Option<RunCompleted> {
    match source.workflow_status(&status.workflow_id).await {
        Ok(kind) => {
            debug!(workflow_id = %status.workflow_id, status = %kind, "workflow status refreshed");
            status.status = Some(kind);
        }
        Err(error) => {
            warn!(workflow_id = %status.workflow_id, error = %error, "error refreshing workflow status");
            return None;
        }
    }

    if status.status == Some(WorkflowStatusKind::Completed) && !status.linked {
        source.completed_run(&status.workflow_id).await
    } else {
        None
    }
}

/// Refresh every status of `analysis` and link newly completed results.
///
/// Returns the number of results linked by this call.
pub async fn refresh_analysis<S: StatusSource>(analysis: &mut TwoStepAnalysis, source: &S) -> usize {
    let mut completed = Vec::new();
    for status in &mut analysis.triggered_inferences {
        if let Some(event) = refresh_status(status, source).await {
            completed.push(event);
        }
    }

    let mut linked = 0;
    for event in completed {
        if analysis.apply_run_completed(event) {
            linked += 1;
        }
    }
    linked
}
