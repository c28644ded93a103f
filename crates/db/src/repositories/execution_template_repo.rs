//! Repository for the `execution_templates` table.

use sqlx::PgPool;

use cascade_core::types::DbId;

use crate::models::execution_template::{ExecutionTemplate, NewExecutionTemplate};

/// Column list for `execution_templates` queries.
const COLUMNS: &str = "\
    id, job_id, file_name, storage_ref, content_sha256, size_bytes, \
    is_active, created_at, updated_at";

/// Template metadata; the bodies live in the blob store.
pub struct ExecutionTemplateRepo;

impl ExecutionTemplateRepo {
    /// Insert a template as the job's active one, deactivating the previous
    /// active template in the same transaction.
    ///
    /// The job row is locked so concurrent uploads for one job serialize.
    pub async fn create_active(
        pool: &PgPool,
        input: &NewExecutionTemplate,
    ) -> Result<ExecutionTemplate, sqlx::Error> {
        let mut tx = pool.begin().await?;

        sqlx::query("SELECT id FROM jobs WHERE id = $1 FOR UPDATE")
            .bind(input.job_id)
            .execute(&mut *tx)
            .await?;

        sqlx::query(
            "UPDATE execution_templates SET is_active = false \
             WHERE job_id = $1 AND is_active",
        )
        .bind(input.job_id)
        .execute(&mut *tx)
        .await?;

        let query = format!(
            "INSERT INTO execution_templates \
                (job_id, file_name, storage_ref, content_sha256, size_bytes, is_active) \
             VALUES ($1, $2, $3, $4, $5, true) \
             RETURNING {COLUMNS}"
        );
        let template = sqlx::query_as::<_, ExecutionTemplate>(&query)
            .bind(input.job_id)
            .bind(&input.file_name)
            .bind(&input.storage_ref)
            .bind(&input.content_sha256)
            .bind(input.size_bytes)
            .fetch_one(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(template)
    }

    /// Every active template of a job. More than one row means the data is
    /// corrupt; the caller decides how to fail.
    pub async fn list_active(
        pool: &PgPool,
        job_id: DbId,
    ) -> Result<Vec<ExecutionTemplate>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM execution_templates \
             WHERE job_id = $1 AND is_active \
             ORDER BY id"
        );
        sqlx::query_as::<_, ExecutionTemplate>(&query)
            .bind(job_id)
            .fetch_all(pool)
            .await
    }

    /// Full upload history of a job, newest first.
    pub async fn list_for_job(
        pool: &PgPool,
        job_id: DbId,
    ) -> Result<Vec<ExecutionTemplate>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM execution_templates \
             WHERE job_id = $1 \
             ORDER BY created_at DESC, id DESC"
        );
        sqlx::query_as::<_, ExecutionTemplate>(&query)
            .bind(job_id)
            .fetch_all(pool)
            .await
    }
}
