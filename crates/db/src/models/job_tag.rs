//! Job tag models and DTOs.

use serde::{Deserialize, Serialize};
use sqlx::FromRow;

use cascade_core::types::{DbId, Timestamp};

/// A row from the `job_tags` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct JobTag {
    pub id: DbId,
    pub job_id: DbId,
    pub name: String,
    pub value: String,
    pub created_at: Timestamp,
    pub updated_at: Timestamp,
}

/// One name/value pair in a tag update.
#[derive(Debug, Clone, Deserialize)]
pub struct JobTagInput {
    pub name: String,
    pub value: String,
}

/// DTO for `PUT /api/v1/jobs/{id}/tags`. Replaces the whole tag set.
#[derive(Debug, Deserialize)]
pub struct SetJobTags {
    pub tags: Vec<JobTagInput>,
}

impl SetJobTags {
    /// Borrow the tags as `(name, value)` pairs.
    pub fn pairs(&self) -> impl Iterator<Item = (&str, &str)> {
        self.tags.iter().map(|t| (t.name.as_str(), t.value.as_str()))
    }
}
