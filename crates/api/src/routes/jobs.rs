//! Route definitions for the `/jobs` resource.

use axum::routing::{get, post};
use axum::Router;

use crate::handlers::{jobs, templates};
use crate::state::AppState;

/// Routes mounted at `/jobs`.
///
/// ```text
/// GET    /                          -> list_jobs
/// POST   /                          -> create_job
/// GET    /{id}                      -> get_job
/// PUT    /{id}                      -> update_job
/// DELETE /{id}                      -> delete_job
/// GET    /{id}/children             -> list_children
/// GET    /{id}/tags                 -> get_tags
/// PUT    /{id}/tags                 -> set_tags
/// GET    /{id}/templates            -> list_templates
/// POST   /{id}/templates            -> upload_template (multipart `file`)
/// GET    /{id}/templates/active     -> get_active_template
/// POST   /{id}/launch               -> launch_job
/// ```
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(jobs::list_jobs).post(jobs::create_job))
        .route(
            "/{id}",
            get(jobs::get_job).put(jobs::update_job).delete(jobs::delete_job),
        )
        .route("/{id}/children", get(jobs::list_children))
        .route("/{id}/tags", get(jobs::get_tags).put(jobs::set_tags))
        .route(
            "/{id}/templates",
            get(templates::list_templates).post(templates::upload_template),
        )
        .route("/{id}/templates/active", get(templates::get_active_template))
        .route("/{id}/launch", post(jobs::launch_job))
}
