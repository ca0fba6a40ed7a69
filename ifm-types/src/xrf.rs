use chrono::{DateTime, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// X-ray fluorescence measurement of a sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct XrfMeasurement {
    pub name: Option<String>,
    pub method: Option<String>,
    pub sample_id: Option<String>,
    /// Instrument export holding the spectra.
    pub data_file: Option<String>,
    pub instrument: Option<String>,
    pub measured_at: Option<DateTime<Utc>>,
}

impl XrfMeasurement {
    pub const METHOD: &'static str = "XRF Measurement";

    pub fn normalize(&mut self) {
        self.method = Some(Self::METHOD.to_owned());
        if self.name.is_none() {
            if let Some(sample_id) = &self.sample_id {
                self.name = Some(format!("XRF Measurement of {sample_id}"));
            }
        }
    }
}
