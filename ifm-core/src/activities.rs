//! The three activities of an inference run.
//!
//! Each stage hands a typed payload to the next: [`ModelOutput`] →
//! [`ParsedResult`] → [`ArchiveRequest`].

use std::path::{Path, PathBuf};
use std::sync::Arc;

use ifm_types::{AnalysisResult, DefectPrevalence, InferenceRequest};
use tracing::{info, warn};

use crate::analysis::{parse_defect_table, HeatmapFigure};
use crate::archive::{ArchiveReceipt, ArchiveWriter, UploadStore};
use crate::recognizer::DefectRecognizer;
use crate::runtime::activity::Activity;
use crate::runtime::types::WorkflowError;

pub const RUN_MODEL: &str = "run_model";
pub const PARSE_RESULTS: &str = "parse_results";
pub const WRITE_ARCHIVE: &str = "write_archive";

/// Output of [`RunModel`].
#[derive(Debug, Clone, PartialEq)]
pub struct ModelOutput {
    pub csv_path: String,
}

/// Output of [`ParseResults`].
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedResult {
    pub table_path: String,
    pub prevalence: DefectPrevalence,
    pub heatmap: HeatmapFigure,
}

impl ParsedResult {
    pub fn to_analysis_result(&self) -> AnalysisResult {
        AnalysisResult::new(self.table_path.clone(), self.prevalence)
    }
}

/// Input of [`WriteArchive`].
#[derive(Debug, Clone, PartialEq)]
pub struct ArchiveRequest {
    pub parsed: ParsedResult,
    pub user_id: String,
    pub upload_id: String,
    /// Run that produced the result; keys the archive artifact.
    pub workflow_id: String,
}

// ─── RunModel ────────────────────────────────────────────────────────────────

/// Runs the recognition model unless its output table already exists.
pub struct RunModel<R> {
    recognizer: Arc<R>,
}

impl<R> RunModel<R> {
    pub fn new(recognizer: Arc<R>) -> Self {
        Self { recognizer }
    }
}

impl<R: DefectRecognizer> Activity for RunModel<R> {
    const NAME: &'static str = RUN_MODEL;

    type Input = InferenceRequest;
    type Output = ModelOutput;

    async fn execute(&self, input: InferenceRequest) -> Result<ModelOutput, WorkflowError> {
        let csv_path = PathBuf::from(&input.csv_path);

        if file_exists(&csv_path).await {
            warn!(csv_path = %input.csv_path, "output table already exists; skipping model run");
        } else {
            info!(image = %input.image_file_name, "extracting defects");
            self.recognizer
                .recognize(
                    Path::new(&input.image_file_name),
                    Path::new(&input.model_binary_name),
                    Path::new(&input.model_classification_name),
                    &csv_path,
                )
                .await
                .map_err(|e| match e {
                    WorkflowError::ModelExecution { .. } => e,
                    other => WorkflowError::ModelExecution {
                        message: other.to_string(),
                    },
                })?;

            if !file_exists(&csv_path).await {
                return Err(WorkflowError::ModelExecution {
                    message: format!("model produced no table at {}", input.csv_path),
                });
            }
        }

        Ok(ModelOutput {
            csv_path: input.csv_path,
        })
    }
}

async fn file_exists(path: &Path) -> bool {
    tokio::fs::try_exists(path).await.unwrap_or(false)
}

// ─── ParseResults ────────────────────────────────────────────────────────────

/// Classifies the recognition table and builds its heatmap.
#[derive(Debug, Default, Clone, Copy)]
pub struct ParseResults;

impl Activity for ParseResults {
    const NAME: &'static str = PARSE_RESULTS;

    type Input = String;
    type Output = ParsedResult;

    async fn execute(&self, csv_path: String) -> Result<ParsedResult, WorkflowError> {
        let path = PathBuf::from(&csv_path);
        let table = tokio::task::spawn_blocking(move || parse_defect_table(&path))
            .await
            .map_err(|e| WorkflowError::ActivityFailed {
                activity: Self::NAME.to_owned(),
                message: e.to_string(),
            })??;

        Ok(ParsedResult {
            prevalence: table.prevalence(),
            heatmap: table.heatmap(),
            table_path: csv_path,
        })
    }
}

// ─── WriteArchive ────────────────────────────────────────────────────────────

/// Registers a parsed result with the originating upload.
pub struct WriteArchive<S> {
    writer: ArchiveWriter<S>,
}

impl<S> WriteArchive<S> {
    pub fn new(writer: ArchiveWriter<S>) -> Self {
        Self { writer }
    }
}

impl<S: UploadStore> Activity for WriteArchive<S> {
    const NAME: &'static str = WRITE_ARCHIVE;

    type Input = ArchiveRequest;
    type Output = ArchiveReceipt;

    async fn execute(&self, input: ArchiveRequest) -> Result<ArchiveReceipt, WorkflowError> {
        let result = input.parsed.to_analysis_result();
        self.writer
            .write(&result, &input.upload_id, &input.user_id, &input.workflow_id)
            .await
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};

    use super::*;
    use crate::archive::{AddOutcome, LocalUploadStore};

    const TABLE: &str = "# header\n# header\nx,y,Whiskers,Chipping,Scratch,No Error\n0,0,0.9,0,0,0.1\n1,0,0,0,0,1\n";

    /// Writes a fixed table and counts invocations.
    #[derive(Default)]
    struct FakeRecognizer {
        calls: AtomicUsize,
        write_table: bool,
    }

    impl DefectRecognizer for FakeRecognizer {
        async fn recognize(
            &self,
            _image: &Path,
            _model_binary: &Path,
            _model_classifier: &Path,
            output: &Path,
        ) -> Result<(), WorkflowError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.write_table {
                tokio::fs::write(output, TABLE).await.map_err(WorkflowError::io)?;
            }
            Ok(())
        }
    }

    fn request(dir: &Path) -> InferenceRequest {
        InferenceRequest::new(
            "upload-1",
            "alice",
            dir.join("img.tif").to_string_lossy(),
            "binary.h5",
            "classifier.h5",
        )
    }

    #[tokio::test]
    async fn run_model_skips_existing_table() {
        let dir = tempfile::tempdir().expect("tempdir");
        let request = request(dir.path());
        std::fs::write(&request.csv_path, TABLE).expect("seed table");

        let recognizer = Arc::new(FakeRecognizer::default());
        let output = RunModel::new(Arc::clone(&recognizer))
            .execute(request.clone())
            .await
            .expect("run model");

        assert_eq!(output.csv_path, request.csv_path);
        assert_eq!(recognizer.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn run_model_invokes_recognizer() {
        let dir = tempfile::tempdir().expect("tempdir");
        let recognizer = Arc::new(FakeRecognizer {
            write_table: true,
            ..Default::default()
        });
        RunModel::new(Arc::clone(&recognizer))
            .execute(request(dir.path()))
            .await
            .expect("run model");
        assert_eq!(recognizer.calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn run_model_without_output_fails() {
        let dir = tempfile::tempdir().expect("tempdir");
        let err = RunModel::new(Arc::new(FakeRecognizer::default()))
            .execute(request(dir.path()))
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::ModelExecution { .. }));
    }

    #[tokio::test]
    async fn parse_then_write() {
        let dir = tempfile::tempdir().expect("tempdir");
        let csv_path = dir.path().join("img_prediction.csv");
        std::fs::write(&csv_path, TABLE).expect("seed table");

        let parsed = ParseResults
            .execute(csv_path.to_string_lossy().into_owned())
            .await
            .expect("parse");
        assert_eq!(parsed.prevalence.whiskers, 0.5);
        assert_eq!(parsed.prevalence.no_error, 0.5);

        let store = LocalUploadStore::new(dir.path().join("uploads"));
        store
            .create_upload("upload-1", "alice", Vec::new())
            .await
            .expect("create upload");
        let write = WriteArchive::new(ArchiveWriter::new(Arc::new(store), dir.path().join("work")));
        let receipt = write
            .execute(ArchiveRequest {
                parsed,
                user_id: "alice".into(),
                upload_id: "upload-1".into(),
                workflow_id: "run-1".into(),
            })
            .await
            .expect("write");
        assert_eq!(receipt.outcome, AddOutcome::Added);
    }

    #[tokio::test]
    async fn parse_missing_table() {
        let err = ParseResults
            .execute("/definitely/missing.csv".into())
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::MissingFile { .. }));
    }
}
