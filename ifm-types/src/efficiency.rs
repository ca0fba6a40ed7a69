use schemars::JsonSchema;
use serde::{Deserialize, Serialize};

/// Measured cell efficiency of a sample.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize, JsonSchema)]
pub struct EfficiencyRecord {
    /// ID of the sample.
    pub sample_id: Option<String>,
    /// Measured efficiency.
    pub efficiency: Option<f64>,
}
