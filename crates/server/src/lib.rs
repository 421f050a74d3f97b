//! HTTP surface of the hiring API: routes, error mapping and settings.

use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    routing::{get, patch, post},
    Json, Router,
};
use server_api::ApiContext;
use shared::{
    domain::{
        Assessment, AssessmentResponse, Candidate, CandidateId, Job, JobId, Note, TimelineEvent,
    },
    error::{ApiError, ErrorCode},
    protocol::{
        CandidateUpdate, CandidatesQuery, JobUpdate, JobsQuery, NewCandidate, NewJob, NewNote,
        Page, ReorderRequest, SaveAssessmentRequest, SubmitResponseRequest,
    },
};
use tower_http::limit::RequestBodyLimitLayer;
use tracing::{error, warn};

pub mod config;

#[derive(Clone)]
pub struct AppState {
    pub api: ApiContext,
}

type HttpResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

pub fn build_router(state: Arc<AppState>, body_limit_bytes: usize) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/jobs", get(http_list_jobs).post(http_create_job))
        .route(
            "/jobs/:job_id",
            get(http_get_job).patch(http_update_job).delete(http_delete_job),
        )
        .route("/jobs/:job_id/reorder", patch(http_reorder_job))
        .route("/candidates", get(http_list_candidates).post(http_create_candidate))
        .route(
            "/candidates/:candidate_id",
            get(http_get_candidate).patch(http_update_candidate),
        )
        .route("/candidates/:candidate_id/timeline", get(http_candidate_timeline))
        .route("/candidates/:candidate_id/notes", post(http_add_note))
        .route(
            "/assessments/:job_id",
            get(http_get_assessment).put(http_save_assessment),
        )
        .route("/assessments/:job_id/submit", post(http_submit_response))
        .route(
            "/assessments/:job_id/responses/:candidate_id",
            get(http_get_response),
        )
        .layer(RequestBodyLimitLayer::new(body_limit_bytes))
        .with_state(state)
}

fn status_for(code: ErrorCode) -> StatusCode {
    match code {
        ErrorCode::NotFound => StatusCode::NOT_FOUND,
        ErrorCode::Validation => StatusCode::BAD_REQUEST,
        ErrorCode::Conflict => StatusCode::CONFLICT,
        ErrorCode::Internal => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn reject(err: ApiError) -> (StatusCode, Json<ApiError>) {
    let status = status_for(err.code);
    if status.is_server_error() {
        error!(message = %err.message, "request failed");
    } else {
        warn!(code = ?err.code, message = %err.message, "request rejected");
    }
    (status, Json(err))
}

async fn healthz(State(state): State<Arc<AppState>>) -> Result<&'static str, StatusCode> {
    state.api.storage.health_check().await.map_err(|error| {
        error!(%error, "health check failed");
        StatusCode::SERVICE_UNAVAILABLE
    })?;
    Ok("ok")
}

async fn http_list_jobs(
    State(state): State<Arc<AppState>>,
    Query(query): Query<JobsQuery>,
) -> HttpResult<Json<Page<Job>>> {
    let page = server_api::list_jobs(&state.api, &query).await.map_err(reject)?;
    Ok(Json(page))
}

async fn http_create_job(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewJob>,
) -> HttpResult<(StatusCode, Json<Job>)> {
    let job = server_api::create_job(&state.api, req).await.map_err(reject)?;
    Ok((StatusCode::CREATED, Json(job)))
}

async fn http_get_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> HttpResult<Json<Job>> {
    let job = server_api::get_job(&state.api, &JobId(job_id))
        .await
        .map_err(reject)?;
    Ok(Json(job))
}

async fn http_update_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
    Json(req): Json<JobUpdate>,
) -> HttpResult<Json<Job>> {
    let job = server_api::update_job(&state.api, &JobId(job_id), req)
        .await
        .map_err(reject)?;
    Ok(Json(job))
}

async fn http_delete_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> HttpResult<StatusCode> {
    server_api::delete_job(&state.api, &JobId(job_id))
        .await
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn http_reorder_job(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
    Json(req): Json<ReorderRequest>,
) -> HttpResult<StatusCode> {
    server_api::reorder_job(&state.api, &JobId(job_id), req)
        .await
        .map_err(reject)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn http_list_candidates(
    State(state): State<Arc<AppState>>,
    Query(query): Query<CandidatesQuery>,
) -> HttpResult<Json<Page<Candidate>>> {
    let page = server_api::list_candidates(&state.api, &query)
        .await
        .map_err(reject)?;
    Ok(Json(page))
}

async fn http_create_candidate(
    State(state): State<Arc<AppState>>,
    Json(req): Json<NewCandidate>,
) -> HttpResult<(StatusCode, Json<Candidate>)> {
    let candidate = server_api::create_candidate(&state.api, req)
        .await
        .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(candidate)))
}

async fn http_get_candidate(
    State(state): State<Arc<AppState>>,
    Path(candidate_id): Path<String>,
) -> HttpResult<Json<Candidate>> {
    let candidate = server_api::get_candidate(&state.api, &CandidateId(candidate_id))
        .await
        .map_err(reject)?;
    Ok(Json(candidate))
}

async fn http_update_candidate(
    State(state): State<Arc<AppState>>,
    Path(candidate_id): Path<String>,
    Json(req): Json<CandidateUpdate>,
) -> HttpResult<Json<Candidate>> {
    let candidate = server_api::update_candidate(&state.api, &CandidateId(candidate_id), req)
        .await
        .map_err(reject)?;
    Ok(Json(candidate))
}

async fn http_candidate_timeline(
    State(state): State<Arc<AppState>>,
    Path(candidate_id): Path<String>,
) -> HttpResult<Json<Vec<TimelineEvent>>> {
    let events = server_api::candidate_timeline(&state.api, &CandidateId(candidate_id))
        .await
        .map_err(reject)?;
    Ok(Json(events))
}

async fn http_add_note(
    State(state): State<Arc<AppState>>,
    Path(candidate_id): Path<String>,
    Json(req): Json<NewNote>,
) -> HttpResult<(StatusCode, Json<Note>)> {
    let note = server_api::add_note(&state.api, &CandidateId(candidate_id), req)
        .await
        .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(note)))
}

async fn http_get_assessment(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> HttpResult<Json<Assessment>> {
    let assessment = server_api::get_assessment(&state.api, &JobId(job_id))
        .await
        .map_err(reject)?;
    Ok(Json(assessment))
}

async fn http_save_assessment(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
    Json(req): Json<SaveAssessmentRequest>,
) -> HttpResult<Json<Assessment>> {
    let assessment = server_api::save_assessment(&state.api, &JobId(job_id), req)
        .await
        .map_err(reject)?;
    Ok(Json(assessment))
}

async fn http_submit_response(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
    Json(req): Json<SubmitResponseRequest>,
) -> HttpResult<(StatusCode, Json<AssessmentResponse>)> {
    let response = server_api::submit_response(&state.api, &JobId(job_id), req)
        .await
        .map_err(reject)?;
    Ok((StatusCode::CREATED, Json(response)))
}

async fn http_get_response(
    State(state): State<Arc<AppState>>,
    Path((job_id, candidate_id)): Path<(String, String)>,
) -> HttpResult<Json<AssessmentResponse>> {
    let response = server_api::get_response(&state.api, &JobId(job_id), &CandidateId(candidate_id))
        .await
        .map_err(reject)?;
    Ok(Json(response))
}

#[cfg(test)]
#[path = "tests/lib_tests.rs"]
mod tests;
