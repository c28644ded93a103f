//! Handlers for the `/jobs` resource.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use validator::Validate;

use cascade_core::error::CoreError;
use cascade_core::tags::validate_tag_set;
use cascade_core::types::DbId;
use cascade_db::models::job::{CreateJob, Job, JobListQuery, UpdateJob};
use cascade_db::models::job_tag::SetJobTags;
use cascade_db::models::order::LaunchJob;
use cascade_db::repositories::{JobRepo, JobTagRepo};

use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Fetch a live job or fail with `NotFound`.
pub(crate) async fn find_job(pool: &sqlx::PgPool, job_id: DbId) -> AppResult<Job> {
    JobRepo::find_by_id(pool, job_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Job",
            id: job_id,
        }))
}

// ---------------------------------------------------------------------------
// CRUD
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs
///
/// Create a job definition. A `parent_id` attaches it under an existing
/// job; it cannot be changed later. Returns 201 with the created job.
pub async fn create_job(
    State(state): State<AppState>,
    Json(input): Json<CreateJob>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;

    if let Some(parent_id) = input.parent_id {
        if JobRepo::find_by_id(&state.pool, parent_id).await?.is_none() {
            return Err(AppError::Core(CoreError::Validation(format!(
                "Parent job {parent_id} does not exist"
            ))));
        }
    }

    let job = JobRepo::create(&state.pool, &input).await?;
    tracing::info!(job_id = job.id, name = %job.name, parent_id = ?job.parent_id, "Job created");

    Ok((StatusCode::CREATED, Json(DataResponse { data: job })))
}

/// GET /api/v1/jobs
///
/// Supports optional `parent_id`, `roots_only`, `limit` and `offset`.
pub async fn list_jobs(
    State(state): State<AppState>,
    Query(params): Query<JobListQuery>,
) -> AppResult<impl IntoResponse> {
    let jobs = JobRepo::list(&state.pool, &params).await?;
    Ok(Json(DataResponse { data: jobs }))
}

/// GET /api/v1/jobs/{id}
pub async fn get_job(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    let job = find_job(&state.pool, job_id).await?;
    Ok(Json(DataResponse { data: job }))
}

/// PUT /api/v1/jobs/{id}
pub async fn update_job(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
    Json(input): Json<UpdateJob>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;

    let job = JobRepo::update(&state.pool, job_id, &input)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Job",
            id: job_id,
        }))?;
    Ok(Json(DataResponse { data: job }))
}

/// DELETE /api/v1/jobs/{id}
///
/// Soft delete. Orders that ran the job keep their history. Returns 204.
pub async fn delete_job(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<StatusCode> {
    if JobRepo::soft_delete(&state.pool, job_id).await? {
        tracing::info!(job_id, "Job deleted");
        Ok(StatusCode::NO_CONTENT)
    } else {
        Err(AppError::Core(CoreError::NotFound {
            entity: "Job",
            id: job_id,
        }))
    }
}

/// GET /api/v1/jobs/{id}/children
///
/// Direct children in dispatch order.
pub async fn list_children(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    find_job(&state.pool, job_id).await?;
    let children = JobRepo::list_children(&state.pool, job_id).await?;
    Ok(Json(DataResponse { data: children }))
}

// ---------------------------------------------------------------------------
// Tags
// ---------------------------------------------------------------------------

/// GET /api/v1/jobs/{id}/tags
pub async fn get_tags(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    find_job(&state.pool, job_id).await?;
    let tags = JobTagRepo::list_for_job(&state.pool, job_id).await?;
    Ok(Json(DataResponse { data: tags }))
}

/// PUT /api/v1/jobs/{id}/tags
///
/// Replace the job's tag set. Duplicate names in the request are a 409.
pub async fn set_tags(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
    Json(input): Json<SetJobTags>,
) -> AppResult<impl IntoResponse> {
    find_job(&state.pool, job_id).await?;
    validate_tag_set(input.pairs())?;

    let tags = JobTagRepo::replace_all(&state.pool, job_id, &input.tags).await?;
    tracing::info!(job_id, count = tags.len(), "Job tags replaced");
    Ok(Json(DataResponse { data: tags }))
}

// ---------------------------------------------------------------------------
// Launch
// ---------------------------------------------------------------------------

/// POST /api/v1/jobs/{id}/launch
///
/// Create a root order for the job and submit it. Returns 201 with the
/// order and its run handle, or 502 if the backend refused the run.
pub async fn launch_job(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
    Json(input): Json<LaunchJob>,
) -> AppResult<impl IntoResponse> {
    input.validate()?;
    let launched = state.engine.launch(job_id, &input).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: launched })))
}
