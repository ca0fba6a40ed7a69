//! The inference workflow: model run, table parse, archive write.

use std::sync::Arc;

use ifm_types::{AnalysisResult, InferenceRequest};
use serde::Serialize;
use strum::{AsRefStr, Display};

use crate::activities::{
    ArchiveRequest, ParseResults, RunModel, WriteArchive, PARSE_RESULTS, RUN_MODEL,
    WRITE_ARCHIVE,
};
use crate::archive::{ArchiveReceipt, ArchiveWriter, UploadStore};
use crate::config::Config;
use crate::recognizer::DefectRecognizer;
use crate::runtime::activity::Workflow;
use crate::runtime::context::WorkflowContext;
use crate::runtime::retry::ActivityOptions;
use crate::runtime::types::{RunState, WorkflowError};

/// Registered name of [`InferenceWorkflow`].
pub const INFERENCE_WORKFLOW: &str = "ifm.workflows.InferenceWorkflow";

/// Output of a completed inference run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InferenceOutcome {
    pub result: AnalysisResult,
    /// Plotly heatmap of the classified table.
    pub heatmap: serde_json::Value,
    pub archive: ArchiveReceipt,
}

/// Externally visible progress of an inference run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, AsRefStr, Serialize)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InferencePhase {
    Pending,
    RunningModel,
    RunningParse,
    RunningWrite,
    Completed,
    Failed,
    Canceled,
}

impl InferencePhase {
    pub fn from_state(state: &RunState) -> Self {
        match state {
            RunState::Pending => InferencePhase::Pending,
            RunState::Running { activity, .. } => match activity.as_str() {
                RUN_MODEL => InferencePhase::RunningModel,
                PARSE_RESULTS => InferencePhase::RunningParse,
                WRITE_ARCHIVE => InferencePhase::RunningWrite,
                _ => InferencePhase::Pending,
            },
            RunState::Completed => InferencePhase::Completed,
            RunState::Failed { .. } => InferencePhase::Failed,
            RunState::Cancelled => InferencePhase::Canceled,
        }
    }
}

/// Execution options of each step.
#[derive(Debug, Clone)]
pub struct StepOptions {
    pub run_model: ActivityOptions,
    pub parse_results: ActivityOptions,
    pub write_archive: ActivityOptions,
}

impl From<&Config> for StepOptions {
    fn from(config: &Config) -> Self {
        Self {
            run_model: config.run_model.clone(),
            parse_results: config.parse_results.clone(),
            write_archive: config.write_archive.clone(),
        }
    }
}

/// RunModel → ParseResults → WriteArchive, strictly in order.
///
/// A step that exhausts its retries fails the run; later steps never start.
pub struct InferenceWorkflow<R, S> {
    run_model: RunModel<R>,
    parse_results: ParseResults,
    write_archive: WriteArchive<S>,
    options: StepOptions,
}

impl<R: DefectRecognizer, S: UploadStore> InferenceWorkflow<R, S> {
    pub fn new(recognizer: Arc<R>, writer: ArchiveWriter<S>, options: StepOptions) -> Self {
        Self {
            run_model: RunModel::new(recognizer),
            parse_results: ParseResults,
            write_archive: WriteArchive::new(writer),
            options,
        }
    }
}

impl<R: DefectRecognizer, S: UploadStore> Workflow for InferenceWorkflow<R, S> {
    const NAME: &'static str = INFERENCE_WORKFLOW;

    type Input = InferenceRequest;
    type Output = InferenceOutcome;

    async fn run(
        &self,
        ctx: &mut WorkflowContext<InferenceOutcome>,
        input: InferenceRequest,
    ) -> Result<InferenceOutcome, WorkflowError> {
        let model = ctx
            .execute_activity(&self.run_model, input.clone(), &self.options.run_model)
            .await?;

        let parsed = ctx
            .execute_activity(&self.parse_results, model.csv_path, &self.options.parse_results)
            .await?;

        let request = ArchiveRequest {
            parsed: parsed.clone(),
            user_id: input.user_id,
            upload_id: input.upload_id,
            workflow_id: ctx.workflow_id().to_owned(),
        };
        let archive = ctx
            .execute_activity(&self.write_archive, request, &self.options.write_archive)
            .await?;

        Ok(InferenceOutcome {
            result: parsed.to_analysis_result(),
            heatmap: parsed.heatmap.to_value(),
            archive,
        })
    }
}
