use ifm_core::archive::UploadManifest;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

#[derive(Debug, Clone, Deserialize, ToSchema, Validate)]
pub struct CreateUploadRequest {
    /// Upload id; generated when omitted.
    #[validate(length(min = 1, max = 128))]
    pub upload_id: Option<String>,
    #[validate(length(min = 1, max = 128))]
    pub main_author: String,
    #[serde(default)]
    pub coauthors: Vec<String>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UploadResponse {
    pub upload_id: String,
    pub main_author: String,
    pub coauthors: Vec<String>,
    /// Files registered with the upload, relative to its raw directory.
    pub files: Vec<String>,
    pub created_at: String,
}

impl From<UploadManifest> for UploadResponse {
    fn from(manifest: UploadManifest) -> Self {
        Self {
            files: manifest.files.iter().map(|f| f.path.clone()).collect(),
            upload_id: manifest.upload_id,
            main_author: manifest.main_author,
            coauthors: manifest.coauthors,
            created_at: manifest.created_at.to_rfc3339(),
        }
    }
}
