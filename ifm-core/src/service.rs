//! Facade over the orchestrator running [`InferenceWorkflow`].

use std::sync::Arc;

use ifm_types::{EntryContext, InferenceRequest, RunCompleted, TwoStepAnalysis, WorkflowStatusKind};
use tracing::{info, warn};

use crate::archive::{ArchiveWriter, UploadStore};
use crate::config::Config;
use crate::recognizer::DefectRecognizer;
use crate::runtime::orchestrator::Orchestrator;
use crate::runtime::storage::RunView;
use crate::runtime::types::{WorkflowError, WorkflowId};
use crate::tracker::StatusSource;
use crate::workflow::{InferenceOutcome, InferenceWorkflow, StepOptions};

/// Starts, queries and cancels inference runs.
pub struct InferenceService<R: DefectRecognizer, S: UploadStore> {
    orchestrator: Orchestrator<InferenceWorkflow<R, S>>,
    store: Arc<S>,
}

impl<R: DefectRecognizer, S: UploadStore> Clone for InferenceService<R, S> {
    fn clone(&self) -> Self {
        Self {
            orchestrator: self.orchestrator.clone(),
            store: Arc::clone(&self.store),
        }
    }
}

impl<R: DefectRecognizer, S: UploadStore> InferenceService<R, S> {
    /// Build the workflow from `config` and start its orchestrator.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn new(config: &Config, recognizer: Arc<R>, store: Arc<S>) -> Self {
        let writer = ArchiveWriter::new(Arc::clone(&store), config.work_dir.clone());
        let workflow = InferenceWorkflow::new(recognizer, writer, StepOptions::from(config));
        Self {
            orchestrator: Orchestrator::start_with_retention(
                Arc::new(workflow),
                config.queue_capacity,
                config.run_retention,
            ),
            store,
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Start one run for `request` and return its id.
    pub async fn start(&self, request: InferenceRequest) -> Result<WorkflowId, WorkflowError> {
        let image = request.image_file_name.clone();
        let workflow_id = self.orchestrator.submit(request).await?;
        info!(workflow_id = %workflow_id, image = %image, "inference workflow started");
        Ok(workflow_id)
    }

    /// Consume the entry's run trigger and start one run per image input.
    ///
    /// Each started run is recorded on the entry.  Start failures are logged
    /// and skipped so the entry edit itself never fails.
    pub async fn start_requests(
        &self,
        analysis: &mut TwoStepAnalysis,
        ctx: &EntryContext,
    ) -> Vec<WorkflowId> {
        let mut started = Vec::new();
        for start in analysis.take_start_requests(ctx) {
            match self.start(start.request).await {
                Ok(workflow_id) => {
                    analysis.record_started(workflow_id.clone());
                    started.push(workflow_id);
                }
                Err(error) => {
                    warn!(
                        upload_id = %ctx.upload_id,
                        input_index = start.input_index,
                        error = %error,
                        "error starting inference workflow"
                    );
                }
            }
        }
        started
    }

    /// Status of a run; unknown ids report [`WorkflowStatusKind::Unknown`].
    pub async fn status(&self, workflow_id: &str) -> WorkflowStatusKind {
        match self.orchestrator.state(workflow_id).await {
            Ok(state) => state.status_kind(),
            Err(_) => WorkflowStatusKind::Unknown,
        }
    }

    pub async fn view(&self, workflow_id: &str) -> Result<RunView<InferenceOutcome>, WorkflowError> {
        self.orchestrator.view(workflow_id).await
    }

    pub async fn result(&self, workflow_id: &str) -> Option<InferenceOutcome> {
        self.orchestrator.output(workflow_id).await
    }

    pub async fn cancel(&self, workflow_id: &str) -> Result<(), WorkflowError> {
        self.orchestrator.cancel(workflow_id).await
    }
}

impl<R: DefectRecognizer, S: UploadStore> StatusSource for InferenceService<R, S> {
    async fn workflow_status(&self, workflow_id: &str) -> Result<WorkflowStatusKind, WorkflowError> {
        self.orchestrator
            .state(workflow_id)
            .await
            .map(|state| state.status_kind())
    }

    async fn completed_run(&self, workflow_id: &str) -> Option<RunCompleted> {
        let outcome = self.orchestrator.output(workflow_id).await?;
        Some(RunCompleted {
            workflow_id: workflow_id.to_owned(),
            result: outcome.result,
            figure: Some(outcome.heatmap),
        })
    }
}
