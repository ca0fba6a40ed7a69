//! Two-step analysis entries: CRUD, the run trigger and status refresh.
//!
//! Every save normalizes the entry and consumes its run trigger, so setting
//! `trigger_run_workflow` through `PUT` starts runs the same way the
//! dedicated `POST .../inference` action does.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use ifm_core::tracker::refresh_analysis;
use ifm_types::EntryContext;
use tokio::sync::OwnedMutexGuard;
use tracing::{info, warn};
use utoipa::OpenApi;
use uuid::Uuid;
use validator::Validate;

use crate::db::{AnalysisRecord, AnalysisStore};
use crate::error::ServerError;
use crate::schemas::v1::analysis::{
    AnalysisListQuery, AnalysisResponse, CreateAnalysisRequest, RefreshResponse, TriggerResponse,
    UpdateAnalysisRequest,
};
use crate::state::AppState;

#[derive(OpenApi)]
#[openapi(
    paths(
        create_analysis,
        list_analyses,
        get_analysis,
        update_analysis,
        trigger_inference,
        refresh_statuses
    ),
    components(schemas(
        CreateAnalysisRequest,
        UpdateAnalysisRequest,
        AnalysisListQuery,
        AnalysisResponse,
        TriggerResponse,
        RefreshResponse
    ))
)]
pub struct AnalysesApi;

pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/analyses", post(create_analysis).get(list_analyses))
        .route("/analyses/{id}", get(get_analysis).put(update_analysis))
        .route("/analyses/{id}/inference", post(trigger_inference))
        .route("/analyses/{id}/statuses/refresh", post(refresh_statuses))
}

// ── helpers ──────────────────────────────────────────────────────────────────

fn parse_id(id: &str) -> Result<Uuid, ServerError> {
    Uuid::parse_str(id).map_err(|_| ServerError::BadRequest(format!("invalid analysis id: {id}")))
}

async fn load(state: &AppState, id: &str) -> Result<AnalysisRecord, ServerError> {
    state
        .store
        .get(parse_id(id)?)
        .await?
        .ok_or_else(|| ServerError::NotFound(format!("analysis {id} not found")))
}

/// Load an entry for modification.  The guard must be held until the entry
/// is saved, so concurrent saves never drop each other's run statuses.
async fn load_locked(
    state: &AppState,
    id: &str,
) -> Result<(OwnedMutexGuard<()>, AnalysisRecord), ServerError> {
    let guard = state.lock_entry(parse_id(id)?).await;
    let record = load(state, id).await?;
    Ok((guard, record))
}

/// Normalize the entry and start the runs its trigger asks for.
///
/// Start failures are logged by the service; the save itself never fails on
/// them.
async fn normalize_and_trigger(state: &AppState, record: &mut AnalysisRecord) -> Vec<String> {
    record.analysis.normalize();
    if !record.analysis.trigger_run_workflow {
        return Vec::new();
    }
    if !record.analysis.is_ready() {
        warn!(
            analysis_id = %record.id,
            "inference trigger ignored: entry needs image inputs and both models"
        );
    }
    let ctx = EntryContext {
        upload_id: record.upload_id.clone(),
        user_id: record.user_id.clone(),
        raw_dir: state.uploads.raw_dir(&record.upload_id),
    };
    let started = state.inference.start_requests(&mut record.analysis, &ctx).await;
    if !started.is_empty() {
        info!(analysis_id = %record.id, runs = started.len(), "inference runs triggered");
    }
    started
}

async fn save(state: &AppState, record: &mut AnalysisRecord) -> Result<(), ServerError> {
    if state.store.update(record).await? {
        Ok(())
    } else {
        Err(ServerError::NotFound(format!("analysis {} not found", record.id)))
    }
}

// ── handlers ─────────────────────────────────────────────────────────────────

#[utoipa::path(
    post,
    path = "/v1/analyses",
    tag = "analyses",
    request_body = CreateAnalysisRequest,
    responses(
        (status = 201, description = "Analysis entry created", body = TriggerResponse),
        (status = 403, description = "User may not read the upload"),
        (status = 404, description = "Upload not found"),
        (status = 422, description = "Validation failed"),
    )
)]
pub async fn create_analysis(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateAnalysisRequest>,
) -> Result<(StatusCode, Json<TriggerResponse>), ServerError> {
    req.validate()?;
    req.analysis.check_file_names()?;
    let manifest = state.uploads.manifest(&req.upload_id).await?;
    if !manifest.can_read(&req.user_id) {
        return Err(ifm_core::WorkflowError::AccessDenied {
            upload_id: req.upload_id,
            user_id: req.user_id,
        }
        .into());
    }

    let mut record = AnalysisRecord::new(req.upload_id, req.user_id, req.analysis);
    let started = normalize_and_trigger(&state, &mut record).await;
    state.store.insert(&record).await?;
    info!(analysis_id = %record.id, upload_id = %record.upload_id, "analysis entry created");

    Ok((
        StatusCode::CREATED,
        Json(TriggerResponse {
            started,
            record: record.to_response(),
        }),
    ))
}

#[utoipa::path(
    get,
    path = "/v1/analyses",
    tag = "analyses",
    params(AnalysisListQuery),
    responses((status = 200, description = "Analysis entries", body = [AnalysisResponse]))
)]
pub async fn list_analyses(
    State(state): State<Arc<AppState>>,
    Query(q): Query<AnalysisListQuery>,
) -> Result<Json<Vec<AnalysisResponse>>, ServerError> {
    let records = state.store.list(q.upload_id.as_deref()).await?;
    Ok(Json(records.iter().map(AnalysisRecord::to_response).collect()))
}

#[utoipa::path(
    get,
    path = "/v1/analyses/{id}",
    tag = "analyses",
    params(("id" = String, Path, description = "Analysis entry id")),
    responses(
        (status = 200, description = "Analysis entry", body = AnalysisResponse),
        (status = 404, description = "Analysis not found"),
    )
)]
pub async fn get_analysis(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<AnalysisResponse>, ServerError> {
    Ok(Json(load(&state, &id).await?.to_response()))
}

/// Replace the entry document and save it.
///
/// Run statuses and linked outputs are owned by the server and survive the
/// replacement.
#[utoipa::path(
    put,
    path = "/v1/analyses/{id}",
    tag = "analyses",
    params(("id" = String, Path, description = "Analysis entry id")),
    request_body = UpdateAnalysisRequest,
    responses(
        (status = 200, description = "Analysis entry saved", body = TriggerResponse),
        (status = 404, description = "Analysis not found"),
        (status = 422, description = "File name leaves the upload"),
    )
)]
pub async fn update_analysis(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
    Json(req): Json<UpdateAnalysisRequest>,
) -> Result<Json<TriggerResponse>, ServerError> {
    req.analysis.check_file_names()?;
    let (_guard, mut record) = load_locked(&state, &id).await?;
    let mut analysis = req.analysis;
    analysis.triggered_inferences = std::mem::take(&mut record.analysis.triggered_inferences);
    analysis.outputs = std::mem::take(&mut record.analysis.outputs);
    analysis.figures = std::mem::take(&mut record.analysis.figures);
    analysis.provenance.outputs = std::mem::take(&mut record.analysis.provenance.outputs);
    record.analysis = analysis;

    let started = normalize_and_trigger(&state, &mut record).await;
    save(&state, &mut record).await?;
    Ok(Json(TriggerResponse {
        started,
        record: record.to_response(),
    }))
}

/// Run-workflow action.
///
/// Always answers 200 with the saved entry; runs that failed to start are
/// logged and simply missing from `started`.
#[utoipa::path(
    post,
    path = "/v1/analyses/{id}/inference",
    tag = "analyses",
    params(("id" = String, Path, description = "Analysis entry id")),
    responses(
        (status = 200, description = "Entry saved; runs started", body = TriggerResponse),
        (status = 404, description = "Analysis not found"),
    )
)]
pub async fn trigger_inference(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<TriggerResponse>, ServerError> {
    let (_guard, mut record) = load_locked(&state, &id).await?;
    record.analysis.trigger_run_workflow = true;
    let started = normalize_and_trigger(&state, &mut record).await;
    save(&state, &mut record).await?;
    Ok(Json(TriggerResponse {
        started,
        record: record.to_response(),
    }))
}

/// Refresh every run status of the entry and attach completed results.
#[utoipa::path(
    post,
    path = "/v1/analyses/{id}/statuses/refresh",
    tag = "analyses",
    params(("id" = String, Path, description = "Analysis entry id")),
    responses(
        (status = 200, description = "Statuses refreshed", body = RefreshResponse),
        (status = 404, description = "Analysis not found"),
    )
)]
pub async fn refresh_statuses(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Result<Json<RefreshResponse>, ServerError> {
    let (_guard, mut record) = load_locked(&state, &id).await?;
    let linked = refresh_analysis(&mut record.analysis, &state.inference).await;
    save(&state, &mut record).await?;
    if linked > 0 {
        info!(analysis_id = %record.id, linked, "inference results linked");
    }
    Ok(Json(RefreshResponse {
        linked,
        record: record.to_response(),
    }))
}
