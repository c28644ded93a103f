//! Job definition models and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use validator::Validate;

use cascade_core::types::{DbId, Timestamp};

/// A row from the `jobs` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct Job {
    pub id: DbId,
    pub name: String,
    pub description: Option<String>,
    /// Execution target this job runs on; selects the backend.
    pub run_env: String,
    pub run_type: String,
    /// Default input for root launches.
    pub input_params: Option<String>,
    /// Ordering among siblings.
    pub seq: i32,
    pub is_enabled: bool,
    pub parent_id: Option<DbId>,
    pub deleted_at: Option<Timestamp>,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// DTO for `POST /api/v1/jobs`.
///
/// `parent_id` can only be set here; jobs are never reparented.
#[derive(Debug, Deserialize, Validate)]
pub struct CreateJob {
    #[validate(length(min = 1, max = 200))]
    pub name: String,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub run_env: String,
    #[validate(length(min = 1, max = 50))]
    pub run_type: Option<String>,
    pub input_params: Option<String>,
    pub seq: Option<i32>,
    pub is_enabled: Option<bool>,
    pub parent_id: Option<DbId>,
}

/// DTO for `PUT /api/v1/jobs/{id}`. All fields optional.
#[derive(Debug, Default, Deserialize, Validate)]
pub struct UpdateJob {
    #[validate(length(min = 1, max = 200))]
    pub name: Option<String>,
    #[validate(length(max = 2000))]
    pub description: Option<String>,
    #[validate(length(min = 1, max = 100))]
    pub run_env: Option<String>,
    #[validate(length(min = 1, max = 50))]
    pub run_type: Option<String>,
    pub input_params: Option<String>,
    pub seq: Option<i32>,
    pub is_enabled: Option<bool>,
}

/// Query parameters for `GET /api/v1/jobs`.
#[derive(Debug, Default, Deserialize)]
pub struct JobListQuery {
    /// Only jobs attached to this parent.
    pub parent_id: Option<DbId>,
    /// Only root jobs (no parent).
    pub roots_only: Option<bool>,
    /// Maximum number of results. Defaults to 50, capped at 100.
    pub limit: Option<i64>,
    /// Number of results to skip. Defaults to 0.
    pub offset: Option<i64>,
}
