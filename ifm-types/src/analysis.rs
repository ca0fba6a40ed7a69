//! The two-step analysis entry: the record that triggers inference runs and
//! owns their statuses and outputs.
//!
//! The entry never reaches into the workflow. Triggering produces
//! [`StartInferenceRequest`] events for an orchestrator client, and finished
//! runs come back as [`RunCompleted`] events applied through
//! [`TwoStepAnalysis::apply_run_completed`].

use std::path::{Component, Path, PathBuf};

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

use crate::defect::AnalysisResult;
use crate::error::SchemaError;
use crate::inference::{InferenceRequest, InferenceStatus, StartInferenceRequest, WorkflowStatusKind};
use crate::measurement::{ImageReference, ModelReference};

pub const BINARY_MODEL_LINK: &str = "Binary Model";
pub const CLASSIFICATION_MODEL_LINK: &str = "Classification Model";
pub const EXTRACTED_FEATURES_LINK: &str = "Extracted Features";
pub const HEATMAP_FIGURE_LABEL: &str = "Defect Distribution Heatmap";

/// Where an entry lives: its upload, acting user and raw-file directory.
#[derive(Debug, Clone)]
pub struct EntryContext {
    pub upload_id: String,
    pub user_id: String,
    /// Directory that raw file names of the upload resolve against.
    pub raw_dir: PathBuf,
}

impl EntryContext {
    /// `name` resolved against the raw directory, or `None` when it would
    /// leave it.
    fn raw_file(&self, name: &str) -> Option<String> {
        is_contained(name).then(|| self.raw_dir.join(name).to_string_lossy().into_owned())
    }
}

/// A non-empty relative path made only of normal components.
fn is_contained(name: &str) -> bool {
    let mut normal = 0;
    for component in Path::new(name).components() {
        match component {
            Component::Normal(_) => normal += 1,
            Component::CurDir => {}
            _ => return false,
        }
    }
    normal > 0
}

/// A named edge in the entry's provenance graph.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct ProvenanceLink {
    pub name: String,
    /// Path or reference of the linked section.
    pub section: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct Provenance {
    #[serde(default)]
    pub inputs: Vec<ProvenanceLink>,
    #[serde(default)]
    pub outputs: Vec<ProvenanceLink>,
}

/// A plotly figure attached to an entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct PlotlyFigure {
    pub label: String,
    pub index: u32,
    pub figure: serde_json::Value,
}

/// Event carrying the result of a completed run back to its entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunCompleted {
    pub workflow_id: String,
    pub result: AnalysisResult,
    pub figure: Option<serde_json::Value>,
}

/// Automated two-step image analysis entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct TwoStepAnalysis {
    pub name: Option<String>,
    pub method: Option<String>,
    pub description: Option<String>,
    /// Input data for the automated image analysis.
    #[serde(default)]
    pub inputs: Vec<ImageReference>,
    /// Output data from the automated image analysis.
    #[serde(default)]
    pub outputs: Vec<AnalysisResult>,
    pub model_binary: Option<ModelReference>,
    pub model_classification: Option<ModelReference>,
    /// Starts an asynchronous workflow for running the inference.
    #[serde(default)]
    pub trigger_run_workflow: bool,
    /// Status of every triggered inference workflow, most recent last.
    #[serde(default)]
    pub triggered_inferences: Vec<InferenceStatus>,
    #[serde(default)]
    pub figures: Vec<PlotlyFigure>,
    #[serde(default)]
    pub provenance: Provenance,
}

impl TwoStepAnalysis {
    pub const METHOD: &'static str = "IFM Two Step Analysis";

    /// Set the method and rebuild the model links of the provenance graph.
    pub fn normalize(&mut self) {
        self.method = Some(Self::METHOD.to_owned());

        for input in &mut self.inputs {
            input.normalize();
        }

        self.provenance.inputs.clear();
        let models = [
            (BINARY_MODEL_LINK, &mut self.model_binary),
            (CLASSIFICATION_MODEL_LINK, &mut self.model_classification),
        ];
        for (link_name, model) in models {
            if let Some(model) = model.as_mut() {
                model.normalize();
                if let Some(file) = model.model_file() {
                    self.provenance.inputs.push(ProvenanceLink {
                        name: link_name.to_owned(),
                        section: file.to_owned(),
                    });
                }
            }
        }
    }

    /// Both models and at least one image input are assigned.
    pub fn is_ready(&self) -> bool {
        !self.inputs.is_empty()
            && self
                .model_binary
                .as_ref()
                .and_then(|m| m.model_file())
                .is_some()
            && self
                .model_classification
                .as_ref()
                .and_then(|m| m.model_file())
                .is_some()
    }

    /// Reject image and model file names that would resolve outside the
    /// upload's raw directory.
    pub fn check_file_names(&self) -> Result<(), SchemaError> {
        let images = self
            .inputs
            .iter()
            .filter_map(|i| i.image_file())
            .map(|name| ("image_file", name));
        let models = [&self.model_binary, &self.model_classification]
            .into_iter()
            .filter_map(|m| m.as_ref().and_then(|m| m.model_file()))
            .map(|name| ("model file", name));

        for (field, name) in images.chain(models) {
            if !is_contained(name) {
                return Err(SchemaError::UnsafeFileName {
                    field,
                    name: name.to_owned(),
                });
            }
        }
        Ok(())
    }

    /// Consume the run trigger and emit one start request per image input.
    ///
    /// Returns an empty list when the trigger is not set, the entry is not
    /// ready, or a model file name leaves the raw directory.  The trigger is
    /// reset in every case.  Inputs without a usable image file are skipped.
    pub fn take_start_requests(&mut self, ctx: &EntryContext) -> Vec<StartInferenceRequest> {
        if !std::mem::take(&mut self.trigger_run_workflow) || !self.is_ready() {
            return Vec::new();
        }

        let (Some(binary), Some(classification)) = (
            self.model_binary.as_ref().and_then(|m| m.model_file()),
            self.model_classification.as_ref().and_then(|m| m.model_file()),
        ) else {
            return Vec::new();
        };
        let (Some(binary), Some(classification)) =
            (ctx.raw_file(binary), ctx.raw_file(classification))
        else {
            return Vec::new();
        };

        self.inputs
            .iter()
            .enumerate()
            .filter_map(|(input_index, input)| {
                let image = ctx.raw_file(input.image_file()?)?;
                Some(StartInferenceRequest {
                    input_index,
                    request: InferenceRequest::new(
                        ctx.upload_id.clone(),
                        ctx.user_id.clone(),
                        image,
                        binary.clone(),
                        classification.clone(),
                    ),
                })
            })
            .collect()
    }

    /// Record a freshly started run.
    pub fn record_started(&mut self, workflow_id: impl Into<String>) {
        self.triggered_inferences
            .push(InferenceStatus::new(workflow_id));
    }

    pub fn status_mut(&mut self, workflow_id: &str) -> Option<&mut InferenceStatus> {
        self.triggered_inferences
            .iter_mut()
            .find(|s| s.workflow_id == workflow_id)
    }

    /// Attach a completed run's result to this entry.
    ///
    /// Appends the output, its provenance link and the heatmap figure once
    /// per run.  Returns `false` when the run is unknown to this entry or was
    /// already linked.
    pub fn apply_run_completed(&mut self, event: RunCompleted) -> bool {
        let Some(status) = self.status_mut(&event.workflow_id) else {
            return false;
        };
        if status.linked {
            return false;
        }
        status.linked = true;
        status.status = Some(WorkflowStatusKind::Completed);

        let output_index = self.outputs.len();
        self.outputs.push(event.result);
        self.provenance.outputs.push(ProvenanceLink {
            name: EXTRACTED_FEATURES_LINK.to_owned(),
            section: format!("#/data/outputs/{output_index}"),
        });

        if let Some(figure) = event.figure {
            self.figures.push(PlotlyFigure {
                label: HEATMAP_FIGURE_LABEL.to_owned(),
                index: self.figures.len() as u32,
                figure,
            });
        }
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::defect::DefectPrevalence;
    use crate::measurement::{IfmMeasurement, IfmModel};

    fn model(file: &str) -> ModelReference {
        ModelReference {
            name: None,
            reference: Some(IfmModel {
                name: Some(file.to_owned()),
                file: Some(file.to_owned()),
                ..Default::default()
            }),
        }
    }

    fn image(file: &str) -> ImageReference {
        ImageReference {
            name: None,
            reference: Some(IfmMeasurement {
                image_file: Some(file.to_owned()),
                ..Default::default()
            }),
        }
    }

    fn ready_entry() -> TwoStepAnalysis {
        TwoStepAnalysis {
            inputs: vec![image("a.tif"), image("b.tif")],
            model_binary: Some(model("binary.h5")),
            model_classification: Some(model("classifier.h5")),
            ..Default::default()
        }
    }

    fn ctx() -> EntryContext {
        EntryContext {
            upload_id: "upload-1".into(),
            user_id: "user-1".into(),
            raw_dir: PathBuf::from("/uploads/upload-1/raw"),
        }
    }

    #[test]
    fn normalize_links_both_models_once() {
        let mut entry = ready_entry();
        entry.normalize();
        entry.normalize();
        let names: Vec<&str> = entry.provenance.inputs.iter().map(|l| l.name.as_str()).collect();
        assert_eq!(names, vec![BINARY_MODEL_LINK, CLASSIFICATION_MODEL_LINK]);
        assert_eq!(entry.method.as_deref(), Some(TwoStepAnalysis::METHOD));
    }

    #[test]
    fn trigger_emits_one_request_per_image() {
        let mut entry = ready_entry();
        entry.trigger_run_workflow = true;
        let requests = entry.take_start_requests(&ctx());
        assert_eq!(requests.len(), 2);
        assert!(!entry.trigger_run_workflow);
        assert_eq!(
            requests[1].request.csv_path,
            "/uploads/upload-1/raw/b_prediction.csv"
        );
        assert_eq!(
            requests[0].request.model_binary_name,
            "/uploads/upload-1/raw/binary.h5"
        );
    }

    #[test]
    fn trigger_without_models_emits_nothing() {
        let mut entry = ready_entry();
        entry.model_classification = None;
        entry.trigger_run_workflow = true;
        assert!(entry.take_start_requests(&ctx()).is_empty());
        assert!(!entry.trigger_run_workflow);
    }

    #[test]
    fn untriggered_entry_emits_nothing() {
        let mut entry = ready_entry();
        assert!(entry.take_start_requests(&ctx()).is_empty());
    }

    #[test]
    fn escaping_file_names_never_reach_requests() {
        let mut entry = ready_entry();
        entry.inputs.push(image("../../../../tmp/evil.tif"));
        entry.inputs.push(image("/etc/shadow"));
        entry.trigger_run_workflow = true;
        let requests = entry.take_start_requests(&ctx());
        let indices: Vec<usize> = requests.iter().map(|r| r.input_index).collect();
        assert_eq!(indices, vec![0, 1]);
        for r in &requests {
            assert!(r.request.csv_path.starts_with("/uploads/upload-1/raw/"));
        }

        let mut entry = ready_entry();
        entry.model_binary = Some(model("/etc/passwd"));
        entry.trigger_run_workflow = true;
        assert!(entry.take_start_requests(&ctx()).is_empty());
    }

    #[test]
    fn check_file_names_rejects_escapes() {
        let mut entry = ready_entry();
        entry.inputs.push(image("scans/./c.tif"));
        assert!(entry.check_file_names().is_ok());

        entry.inputs.push(image("../x.tif"));
        assert!(matches!(
            entry.check_file_names(),
            Err(SchemaError::UnsafeFileName { field: "image_file", .. })
        ));

        let mut entry = ready_entry();
        entry.model_classification = Some(model("/abs/classifier.h5"));
        assert!(matches!(
            entry.check_file_names(),
            Err(SchemaError::UnsafeFileName { field: "model file", .. })
        ));
        assert!(!is_contained(""));
        assert!(!is_contained("."));
    }

    #[test]
    fn run_completed_is_linked_once() {
        let mut entry = ready_entry();
        entry.record_started("wf-1");
        let event = RunCompleted {
            workflow_id: "wf-1".into(),
            result: AnalysisResult::new("a_prediction.csv", DefectPrevalence::from_counts([1, 0, 0, 1])),
            figure: Some(serde_json::json!({"data": []})),
        };

        assert!(entry.apply_run_completed(event.clone()));
        assert!(!entry.apply_run_completed(event));
        assert_eq!(entry.outputs.len(), 1);
        assert_eq!(entry.figures.len(), 1);
        assert_eq!(entry.provenance.outputs[0].section, "#/data/outputs/0");
        assert_eq!(
            entry.triggered_inferences[0].status,
            Some(WorkflowStatusKind::Completed)
        );
    }

    #[test]
    fn run_completed_for_foreign_run_is_ignored() {
        let mut entry = ready_entry();
        let event = RunCompleted {
            workflow_id: "other".into(),
            result: AnalysisResult::new("x.csv", DefectPrevalence::default()),
            figure: None,
        };
        assert!(!entry.apply_run_completed(event));
        assert!(entry.outputs.is_empty());
    }
}
