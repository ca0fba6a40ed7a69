//! Managed uploads that analysis entries and archive documents live in.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::info;
use utoipa::OpenApi;
use uuid::Uuid;
use validator::Validate;

use crate::error::ServerError;
use crate::schemas::v1::upload::{CreateUploadRequest, UploadResponse};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(create_upload, get_upload),
    components(schemas(CreateUploadRequest, UploadResponse))
)]
pub struct UploadsApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/uploads", post(create_upload))
        .route("/uploads/{id}", get(get_upload))
}

#[utoipa::path(
    post,
    path = "/v1/uploads",
    tag = "uploads",
    request_body = CreateUploadRequest,
    responses(
        (status = 201, description = "Upload created", body = UploadResponse),
        (status = 400, description = "Invalid upload id"),
        (status = 422, description = "Validation failed"),
    )
)]
pub async fn create_upload(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateUploadRequest>,
) -> Result<(StatusCode, Json<UploadResponse>), ServerError> {
    req.validate()?;
    let upload_id = req.upload_id.unwrap_or_else(|| Uuid::new_v4().to_string());
    let manifest = state
        .uploads
        .create_upload(&upload_id, &req.main_author, req.coauthors)
        .await
        .map_err(|e| ServerError::BadRequest(e.to_string()))?;
    info!(upload_id = %manifest.upload_id, "upload provisioned");
    Ok((StatusCode::CREATED, Json(manifest.into())))
}

#[utoipa::path(
    get,
    path = "/v1/uploads/{id}",
    tag = "uploads",
    params(("id" = String, Path, description = "Upload id")),
    responses(
        (status = 200, description = "Upload retrieved", body = UploadResponse),
        (status = 404, description = "Upload not found"),
    )
)]
pub async fn get_upload(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<UploadResponse>, ServerError> {
    let manifest = state.uploads.manifest(&id).await?;
    Ok(Json(manifest.into()))
}
