//! Schema package registry endpoints.

use std::sync::Arc;

use axum::extract::Path;
use axum::routing::get;
use axum::{Json, Router};
use ifm_types::{find_package, schema_packages};
use utoipa::OpenApi;

use crate::error::ServerError;
use crate::schemas::v1::package::{PackageResponse, PackageSummary};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(list_packages, get_package),
    components(schemas(PackageSummary, PackageResponse))
)]
pub struct SchemasApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/schemas", get(list_packages))
        .route("/schemas/{name}", get(get_package))
}

#[utoipa::path(
    get,
    path = "/v1/schemas",
    tag = "schemas",
    responses((status = 200, description = "Registered schema packages", body = [PackageSummary]))
)]
pub async fn list_packages() -> Json<Vec<PackageSummary>> {
    Json(schema_packages().iter().map(PackageSummary::from).collect())
}

#[utoipa::path(
    get,
    path = "/v1/schemas/{name}",
    tag = "schemas",
    params(("name" = String, Path, description = "Package name, e.g. `IFMSchema`")),
    responses(
        (status = 200, description = "Package with section schemas", body = PackageResponse),
        (status = 404, description = "Unknown package"),
    )
)]
pub async fn get_package(Path(name): Path<String>) -> Result<Json<PackageResponse>, ServerError> {
    let package = find_package(&name).map_err(|e| ServerError::NotFound(e.to_string()))?;
    Ok(Json(PackageResponse::from_package(package)?))
}
