//! Handlers for execution templates under `/jobs/{id}/templates`.

use axum::extract::{Multipart, Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use serde::Serialize;

use cascade_core::error::CoreError;
use cascade_core::types::DbId;
use cascade_db::models::execution_template::ExecutionTemplate;

use super::jobs::find_job;
use crate::error::{AppError, AppResult};
use crate::response::DataResponse;
use crate::state::AppState;

/// Multipart field carrying the template file.
const FILE_FIELD: &str = "file";

/// The active template with its content and referenced parameters.
#[derive(Debug, Serialize)]
pub struct ActiveTemplate {
    pub template: ExecutionTemplate,
    pub content: String,
    pub parameters: Vec<String>,
}

/// GET /api/v1/jobs/{id}/templates
///
/// Upload history, newest first.
pub async fn list_templates(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    find_job(&state.pool, job_id).await?;
    let templates = state.templates.list(job_id).await?;
    Ok(Json(DataResponse { data: templates }))
}

/// POST /api/v1/jobs/{id}/templates
///
/// Upload a YAML or JSON template as multipart field `file`. It becomes
/// the active template; the previous one is deactivated. Returns 201.
pub async fn upload_template(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
    mut multipart: Multipart,
) -> AppResult<impl IntoResponse> {
    let mut upload: Option<(String, Vec<u8>)> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| AppError::BadRequest(e.to_string()))?
    {
        if field.name() != Some(FILE_FIELD) {
            continue;
        }
        let file_name = field.file_name().unwrap_or("template.yaml").to_string();
        let data = field
            .bytes()
            .await
            .map_err(|e| AppError::BadRequest(e.to_string()))?;
        upload = Some((file_name, data.to_vec()));
    }

    let Some((file_name, data)) = upload else {
        return Err(AppError::BadRequest(format!(
            "Multipart field '{FILE_FIELD}' is required"
        )));
    };

    let template = state.templates.upload(job_id, &file_name, &data).await?;
    Ok((StatusCode::CREATED, Json(DataResponse { data: template })))
}

/// GET /api/v1/jobs/{id}/templates/active
pub async fn get_active_template(
    State(state): State<AppState>,
    Path(job_id): Path<DbId>,
) -> AppResult<impl IntoResponse> {
    find_job(&state.pool, job_id).await?;
    let resolved = state
        .templates
        .resolve_active(job_id)
        .await?
        .ok_or(AppError::Core(CoreError::NotFound {
            entity: "Active execution template of job",
            id: job_id,
        }))?;

    Ok(Json(DataResponse {
        data: ActiveTemplate {
            parameters: resolved.manifest.parameters().into_iter().collect(),
            template: resolved.template,
            content: resolved.content,
        },
    }))
}
