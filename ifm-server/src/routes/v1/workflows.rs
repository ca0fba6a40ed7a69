//! Inference run status, details and cancellation.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::routing::{get, post};
use axum::{Json, Router};
use tracing::info;
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::schemas::v1::workflow::{WorkflowResponse, WorkflowStatusResponse};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(get_workflow_status, get_workflow, cancel_workflow),
    components(schemas(WorkflowStatusResponse, WorkflowResponse))
)]
pub struct WorkflowsApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/workflows/{id}", get(get_workflow))
        .route("/workflows/{id}/status", get(get_workflow_status))
        .route("/workflows/{id}/cancel", post(cancel_workflow))
}

/// Status of a run; unknown ids report `UNKNOWN` rather than 404.
#[utoipa::path(
    get,
    path = "/v1/workflows/{id}/status",
    tag = "workflows",
    params(("id" = String, Path, description = "Workflow run id")),
    responses((status = 200, description = "Run status", body = WorkflowStatusResponse))
)]
pub async fn get_workflow_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Json<WorkflowStatusResponse> {
    let status = state.inference.status(&id).await;
    Json(WorkflowStatusResponse::new(id, status))
}

#[utoipa::path(
    get,
    path = "/v1/workflows/{id}",
    tag = "workflows",
    params(("id" = String, Path, description = "Workflow run id")),
    responses(
        (status = 200, description = "Run details", body = WorkflowResponse),
        (status = 404, description = "Run not found"),
    )
)]
pub async fn get_workflow(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<WorkflowResponse>, ServerError> {
    let view = state.inference.view(&id).await?;
    Ok(Json(WorkflowResponse::from_view(view)?))
}

#[utoipa::path(
    post,
    path = "/v1/workflows/{id}/cancel",
    tag = "workflows",
    params(("id" = String, Path, description = "Workflow run id")),
    responses(
        (status = 200, description = "Cancellation requested", body = WorkflowStatusResponse),
        (status = 404, description = "Run not found"),
    )
)]
pub async fn cancel_workflow(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<WorkflowStatusResponse>, ServerError> {
    state.inference.cancel(&id).await?;
    info!(workflow_id = %id, "workflow cancellation requested");
    let status = state.inference.status(&id).await;
    Ok(Json(WorkflowStatusResponse::new(id, status)))
}
