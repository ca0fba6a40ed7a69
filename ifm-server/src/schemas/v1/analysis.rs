use ifm_types::TwoStepAnalysis;
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::db::AnalysisRecord;

#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
pub struct CreateAnalysisRequest {
    #[validate(length(min = 1, max = 128))]
    pub upload_id: String,
    #[validate(length(min = 1, max = 128))]
    pub user_id: String,
    #[schema(value_type = Object)]
    #[serde(default)]
    pub analysis: TwoStepAnalysis,
}

#[derive(Debug, Clone, Deserialize, ToSchema)]
pub struct UpdateAnalysisRequest {
    #[schema(value_type = Object)]
    pub analysis: TwoStepAnalysis,
}

#[derive(Debug, Deserialize, ToSchema, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct AnalysisListQuery {
    /// Restrict the listing to one upload.
    pub upload_id: Option<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct AnalysisResponse {
    pub id: String,
    pub upload_id: String,
    pub user_id: String,
    #[schema(value_type = Object)]
    pub analysis: TwoStepAnalysis,
    pub created_at: String,
    pub updated_at: String,
}

/// Entry after a save that may have started inference runs.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct TriggerResponse {
    /// Ids of the runs started by this save.
    pub started: Vec<String>,
    pub record: AnalysisResponse,
}

/// Entry after an explicit status refresh.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RefreshResponse {
    /// Number of completed results attached by this refresh.
    pub linked: usize,
    pub record: AnalysisResponse,
}

impl AnalysisRecord {
    pub fn to_response(&self) -> AnalysisResponse {
        AnalysisResponse {
            id: self.id.to_string(),
            upload_id: self.upload_id.clone(),
            user_id: self.user_id.clone(),
            analysis: self.analysis.clone(),
            created_at: self.created_at.to_rfc3339(),
            updated_at: self.updated_at.to_rfc3339(),
        }
    }
}
