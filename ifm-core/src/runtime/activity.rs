use std::future::Future;

use crate::runtime::context::WorkflowContext;
use crate::runtime::types::WorkflowError;

/// A single unit of retryable work dispatched by a workflow.
///
/// Activities are where all side effects live.  The input is cloned for
/// every attempt so a retried activity always sees the original request.
pub trait Activity: Send + Sync + 'static {
    /// Name used in step statuses, history events and tracing.
    const NAME: &'static str;

    type Input: Clone + Send + 'static;
    type Output: Send + 'static;

    fn execute(
        &self,
        input: Self::Input,
    ) -> impl Future<Output = Result<Self::Output, WorkflowError>> + Send;
}

/// Deterministic control logic that sequences activities.
///
/// `run` must not perform I/O itself; every side effect goes through
/// [`WorkflowContext::execute_activity`].
pub trait Workflow: Send + Sync + 'static {
    /// Registered workflow type name.
    const NAME: &'static str;

    type Input: Send + 'static;
    type Output: Clone + Send + Sync + 'static;

    fn run(
        &self,
        ctx: &mut WorkflowContext<Self::Output>,
        input: Self::Input,
    ) -> impl Future<Output = Result<Self::Output, WorkflowError>> + Send;
}
