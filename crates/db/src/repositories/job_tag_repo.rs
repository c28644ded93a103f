//! Repository for the `job_tags` table.

use sqlx::PgPool;

use cascade_core::types::DbId;

use crate::models::job_tag::{JobTag, JobTagInput};

/// Column list for `job_tags` queries.
const COLUMNS: &str = "id, job_id, name, value, created_at, updated_at";

/// Reads and replaces a job's launch parameters.
pub struct JobTagRepo;

impl JobTagRepo {
    /// All tags of a job, sorted by name.
    pub async fn list_for_job(pool: &PgPool, job_id: DbId) -> Result<Vec<JobTag>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM job_tags WHERE job_id = $1 ORDER BY name");
        sqlx::query_as::<_, JobTag>(&query)
            .bind(job_id)
            .fetch_all(pool)
            .await
    }

    /// Replace the job's full tag set atomically and return the new set.
    ///
    /// Callers validate the set first; a duplicate name still surfaces as a
    /// unique violation on `uq_job_tags_job_name`.
    pub async fn replace_all(
        pool: &PgPool,
        job_id: DbId,
        tags: &[JobTagInput],
    ) -> Result<Vec<JobTag>, sqlx::Error> {
        let mut tx = pool.begin().await?;
        Self::replace_all_inner(&mut tx, job_id, tags).await?;
        tx.commit().await?;
        Self::list_for_job(pool, job_id).await
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    async fn replace_all_inner(
        tx: &mut sqlx::Transaction<'_, sqlx::Postgres>,
        job_id: DbId,
        tags: &[JobTagInput],
    ) -> Result<(), sqlx::Error> {
        sqlx::query("DELETE FROM job_tags WHERE job_id = $1")
            .bind(job_id)
            .execute(&mut **tx)
            .await?;

        for tag in tags {
            sqlx::query("INSERT INTO job_tags (job_id, name, value) VALUES ($1, $2, $3)")
                .bind(job_id)
                .bind(&tag.name)
                .bind(&tag.value)
                .execute(&mut **tx)
                .await?;
        }

        Ok(())
    }
}
