use std::path::Path;

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use strum::{AsRefStr, Display, EnumString};

/// Suffix appended to the image stem to name the recognition output table.
pub const PREDICTION_SUFFIX: &str = "_prediction.csv";

/// Input of one inference workflow run.
///
/// Immutable once submitted; fully determines the run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct InferenceRequest {
    pub upload_id: String,
    pub user_id: String,
    pub image_file_name: String,
    pub model_binary_name: String,
    pub model_classification_name: String,
    /// Target output table written by the recognition model.
    pub csv_path: String,
}

impl InferenceRequest {
    /// Build a request, deriving `csv_path` from the image file name.
    pub fn new(
        upload_id: impl Into<String>,
        user_id: impl Into<String>,
        image_file_name: impl Into<String>,
        model_binary_name: impl Into<String>,
        model_classification_name: impl Into<String>,
    ) -> Self {
        let image_file_name = image_file_name.into();
        let csv_path = Self::csv_path_for(&image_file_name);
        Self {
            upload_id: upload_id.into(),
            user_id: user_id.into(),
            image_file_name,
            model_binary_name: model_binary_name.into(),
            model_classification_name: model_classification_name.into(),
            csv_path,
        }
    }

    /// `dir/image.tif` → `dir/image_prediction.csv`.
    pub fn csv_path_for(image_file_name: &str) -> String {
        let image = Path::new(image_file_name);
        let stem = image
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let file_name = format!("{stem}{PREDICTION_SUFFIX}");
        match image.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => {
                dir.join(file_name).to_string_lossy().into_owned()
            }
            _ => file_name,
        }
    }
}

/// Event emitted by a triggering record asking for a new workflow run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartInferenceRequest {
    /// Index of the image input that produced this request.
    pub input_index: usize,
    pub request: InferenceRequest,
}

/// Run status mirrored from the orchestrator.
#[derive(
    Debug,
    Clone,
    Copy,
    PartialEq,
    Eq,
    Hash,
    Serialize,
    Deserialize,
    JsonSchema,
    Display,
    EnumString,
    AsRefStr,
)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum WorkflowStatusKind {
    Running,
    Completed,
    Failed,
    Canceled,
    TimedOut,
    Unknown,
}

impl WorkflowStatusKind {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            WorkflowStatusKind::Completed
                | WorkflowStatusKind::Failed
                | WorkflowStatusKind::Canceled
                | WorkflowStatusKind::TimedOut
        )
    }
}

/// Section to fetch the status of an inference workflow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct InferenceStatus {
    /// ID of the workflow run.
    pub workflow_id: String,
    /// Status of the inference workflow.
    #[serde(default)]
    pub status: Option<WorkflowStatusKind>,
    /// Set once the completed result was attached to the owning record.
    #[serde(default)]
    pub linked: bool,
}

impl InferenceStatus {
    pub fn new(workflow_id: impl Into<String>) -> Self {
        Self {
            workflow_id: workflow_id.into(),
            status: Some(WorkflowStatusKind::Running),
            linked: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    #[test]
    fn csv_path_keeps_directory_and_strips_extension() {
        assert_eq!(
            InferenceRequest::csv_path_for("/data/raw/wafer_01.tif"),
            "/data/raw/wafer_01_prediction.csv"
        );
        assert_eq!(
            InferenceRequest::csv_path_for("wafer.png"),
            "wafer_prediction.csv"
        );
    }

    #[test]
    fn new_derives_csv_path() {
        let req = InferenceRequest::new("u1", "user", "img/a.tif", "bin.h5", "cls.h5");
        assert_eq!(req.csv_path, "img/a_prediction.csv");
    }

    #[test]
    fn status_kind_round_trips_through_strings() {
        assert_eq!(WorkflowStatusKind::TimedOut.to_string(), "TIMED_OUT");
        assert_eq!(
            WorkflowStatusKind::from_str("COMPLETED").ok(),
            Some(WorkflowStatusKind::Completed)
        );
        let json = serde_json::to_string(&WorkflowStatusKind::Running).unwrap_or_default();
        assert_eq!(json, "\"RUNNING\"");
    }
}
