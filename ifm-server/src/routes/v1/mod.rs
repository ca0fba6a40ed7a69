pub mod analyses;
pub mod schemas;
pub mod uploads;
pub mod workflows;

use std::sync::Arc;

use axum::Router;
use utoipa::OpenApi;

use crate::state::AppState;

/// Routes nested under `/v1`.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .merge(uploads::router())
        .merge(analyses::router())
        .merge(workflows::router())
        .merge(schemas::router())
}

#[derive(OpenApi)]
#[openapi()]
pub struct V1Api;

pub fn api_docs() -> utoipa::openapi::OpenApi {
    let mut spec = V1Api::openapi();
    spec.merge(uploads::UploadsApi::openapi());
    spec.merge(analyses::AnalysesApi::openapi());
    spec.merge(workflows::WorkflowsApi::openapi());
    spec.merge(schemas::SchemasApi::openapi());
    spec
}
