use std::path::{Path, PathBuf};
use std::sync::Arc;

use ifm_types::AnalysisResult;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::info;

use crate::archive::store::{AddOutcome, FileOperation, UploadStore};
use crate::runtime::types::WorkflowError;

/// File name of the archive document registered with the upload.
pub const ARCHIVE_FILE_NAME: &str = "inference_result.archive.json";

/// Proof that a result was registered with an upload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ArchiveReceipt {
    pub upload_id: String,
    /// Path of the archive document inside the upload.
    pub path: String,
    pub outcome: AddOutcome,
}

/// Serializes analysis results as archive documents and registers them with
/// an upload.
#[derive(Debug)]
pub struct ArchiveWriter<S> {
    store: Arc<S>,
    work_dir: PathBuf,
}

impl<S> Clone for ArchiveWriter<S> {
    fn clone(&self) -> Self {
        Self {
            store: Arc::clone(&self.store),
            work_dir: self.work_dir.clone(),
        }
    }
}

impl<S: UploadStore> ArchiveWriter<S> {
    /// `work_dir` holds the staging copies of archive documents.
    pub fn new(store: Arc<S>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            store,
            work_dir: work_dir.into(),
        }
    }

    pub fn store(&self) -> &Arc<S> {
        &self.store
    }

    /// Staging path of the archive document for run `token`.
    pub fn staging_path(&self, token: &str) -> PathBuf {
        self.work_dir.join(token).join(ARCHIVE_FILE_NAME)
    }

    /// Write `result` into `upload_id` on behalf of `user_id`.
    ///
    /// Access is checked before anything touches disk.  The document is
    /// stored under a directory named after `token`, so repeating the call
    /// for the same run replaces its own artifact and nothing else.
    pub async fn write(
        &self,
        result: &AnalysisResult,
        upload_id: &str,
        user_id: &str,
        token: &str,
    ) -> Result<ArchiveReceipt, WorkflowError> {
        self.store.check_read_access(upload_id, user_id).await?;

        let staging = self.staging_path(token);
        write_staging(&staging, &render_archive(result)?).await?;

        let processed = self
            .store
            .process_upload(
                upload_id,
                vec![FileOperation::Add {
                    path: staging,
                    target_dir: token.to_owned(),
                    temporary: true,
                }],
                true,
            )
            .await?;
        let file = processed
            .into_iter()
            .next()
            .ok_or_else(|| WorkflowError::io("upload reported no processed file"))?;

        info!(upload_id, token, path = %file.path, outcome = ?file.outcome, "archive written");
        Ok(ArchiveReceipt {
            upload_id: upload_id.to_owned(),
            path: file.path,
            outcome: file.outcome,
        })
    }
}

/// Archive document for `result`, indented with four spaces.
pub fn render_archive(result: &AnalysisResult) -> Result<String, WorkflowError> {
    let document = json!({
        "data": {
            "m_def": AnalysisResult::SECTION_DEF,
            "file": result.file,
            "defect_prevalence": result.defect_prevalence,
        }
    });

    let mut buf = Vec::new();
    let formatter = serde_json::ser::PrettyFormatter::with_indent(b"    ");
    let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
    document.serialize(&mut ser).map_err(WorkflowError::io)?;
    String::from_utf8(buf).map_err(WorkflowError::io)
}

async fn write_staging(path: &Path, contents: &str) -> Result<(), WorkflowError> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(WorkflowError::io)?;
    }
    tokio::fs::write(path, contents)
        .await
        .map_err(WorkflowError::io)
}

#[cfg(test)]
mod tests {
    use ifm_types::DefectPrevalence;

    use super::*;
    use crate::archive::store::LocalUploadStore;

    fn result() -> AnalysisResult {
        AnalysisResult::new(
            "raw/img_prediction.csv",
            DefectPrevalence::from_counts([1, 0, 0, 1]),
        )
    }

    async fn writer() -> (tempfile::TempDir, ArchiveWriter<LocalUploadStore>) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = LocalUploadStore::new(dir.path().join("uploads"));
        store
            .create_upload("upload-1", "alice", Vec::new())
            .await
            .expect("create upload");
        let writer = ArchiveWriter::new(Arc::new(store), dir.path().join("work"));
        (dir, writer)
    }

    #[test]
    fn archive_document_shape() {
        let text = render_archive(&result()).expect("render");
        assert!(text.contains("\n    \"data\": {"));

        let value: serde_json::Value = serde_json::from_str(&text).expect("valid json");
        assert_eq!(value["data"]["m_def"], AnalysisResult::SECTION_DEF);
        assert_eq!(value["data"]["defect_prevalence"]["whiskers"], 0.5);
        assert_eq!(value["data"]["defect_prevalence"]["no_error"], 0.5);
    }

    #[tokio::test]
    async fn writes_under_run_directory() {
        let (dir, writer) = writer().await;
        let receipt = writer
            .write(&result(), "upload-1", "alice", "run-1")
            .await
            .expect("write");

        assert_eq!(receipt.path, format!("run-1/{ARCHIVE_FILE_NAME}"));
        assert_eq!(receipt.outcome, AddOutcome::Added);
        assert!(
            dir.path()
                .join("uploads/upload-1/raw/run-1")
                .join(ARCHIVE_FILE_NAME)
                .exists()
        );
        assert!(!writer.staging_path("run-1").exists());
    }

    #[tokio::test]
    async fn repeated_write_is_unchanged() {
        let (_dir, writer) = writer().await;
        writer
            .write(&result(), "upload-1", "alice", "run-1")
            .await
            .expect("first write");
        let again = writer
            .write(&result(), "upload-1", "alice", "run-1")
            .await
            .expect("second write");
        assert_eq!(again.outcome, AddOutcome::Unchanged);
    }

    #[tokio::test]
    async fn unknown_upload_writes_nothing() {
        let (_dir, writer) = writer().await;
        let err = writer
            .write(&result(), "nope", "alice", "run-1")
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::UploadNotFound { .. }));
        assert!(!writer.staging_path("run-1").exists());
    }

    #[tokio::test]
    async fn foreign_user_is_denied() {
        let (_dir, writer) = writer().await;
        let err = writer
            .write(&result(), "upload-1", "mallory", "run-1")
            .await
            .unwrap_err();
        assert!(matches!(err, WorkflowError::AccessDenied { .. }));
    }
}
