//! Execution template metadata rows.

use serde::Serialize;
use sqlx::FromRow;

use cascade_core::types::{DbId, Timestamp};

/// A row from the `execution_templates` table.
///
/// The template body lives in the blob store under `storage_ref`.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct ExecutionTemplate {
    pub id: DbId,
    pub job_id: DbId,
    pub file_name: String,
    pub storage_ref: String,
    pub content_sha256: String,
    pub size_bytes: i64,
    pub is_active: bool,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// Insert payload for a freshly stored template.
#[derive(Debug, Clone)]
pub struct NewExecutionTemplate {
    pub job_id: DbId,
    pub file_name: String,
    pub storage_ref: String,
    pub content_sha256: String,
    pub size_bytes: i64,
}
