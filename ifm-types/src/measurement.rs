use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Reference to a sample by its lab id.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
pub struct SampleReference {
    pub name: Option<String>,
    pub lab_id: Option<String>,
}

impl SampleReference {
    pub fn from_lab_id(lab_id: impl Into<String>) -> Self {
        let lab_id = lab_id.into();
        Self {
            name: Some(lab_id.clone()),
            lab_id: Some(lab_id),
        }
    }
}

/// IFM measurement entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct IfmMeasurement {
    pub name: Option<String>,
    pub method: Option<String>,
    /// File containing the microscopy image.
    pub image_file: Option<String>,
    /// File containing the measurement metadata.
    pub metadata_file: Option<String>,
    /// All samples measured during the measurement.
    #[serde(default)]
    pub samples: Vec<SampleReference>,
    /// ID of the sample measured.
    pub sample_id: Option<String>,
    pub start_time: Option<DateTime<Utc>>,
    pub end_time: Option<DateTime<Utc>>,
    /// Exposure time in seconds.
    pub exposure_time: Option<f64>,
    /// Device used for the measurement.
    pub device: Option<String>,
    pub magnification: Option<f64>,
}

impl IfmMeasurement {
    pub const METHOD: &'static str = "IFM Measurement";

    /// Sync `sample_id` with `samples` and derive the display name.
    pub fn normalize(&mut self) {
        self.method = Some(Self::METHOD.to_owned());

        match (&self.sample_id, self.samples.is_empty()) {
            (Some(id), true) => self.samples = vec![SampleReference::from_lab_id(id.clone())],
            (None, false) => self.sample_id = self.samples[0].lab_id.clone(),
            _ => {}
        }

        if let Some(sample_name) = self.samples.first().and_then(|s| s.name.as_deref()) {
            self.name = Some(format!("IFM Measurement of {sample_name}"));
        }
    }
}

/// Kind of model artifact used by the two-step analysis.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ModelKind {
    Binary,
    Classification,
}

/// Model for the automated image analysis.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct IfmModel {
    pub name: Option<String>,
    pub method: Option<String>,
    /// File containing the model weights.
    pub file: Option<String>,
    #[serde(rename = "type")]
    pub kind: Option<ModelKind>,
    pub number_of_layers: Option<u32>,
    pub number_of_parameters: Option<u64>,
}

impl IfmModel {
    pub const METHOD: &'static str = "IFM Model";

    pub fn normalize(&mut self) {
        self.method = Some(Self::METHOD.to_owned());
    }
}

/// Reference to an IFM measurement used as analysis input.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ImageReference {
    pub name: Option<String>,
    pub reference: Option<IfmMeasurement>,
}

impl ImageReference {
    pub fn normalize(&mut self) {
        if self.name.is_none() {
            self.name = self.reference.as_ref().and_then(|m| m.name.clone());
        }
    }

    pub fn image_file(&self) -> Option<&str> {
        self.reference.as_ref()?.image_file.as_deref()
    }
}

/// Reference to an IFM model.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct ModelReference {
    pub name: Option<String>,
    pub reference: Option<IfmModel>,
}

impl ModelReference {
    pub fn normalize(&mut self) {
        if self.name.is_none() {
            self.name = self.reference.as_ref().and_then(|m| m.name.clone());
        }
    }

    pub fn model_file(&self) -> Option<&str> {
        self.reference.as_ref()?.file.as_deref()
    }
}
