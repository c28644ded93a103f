//! Repository for the `jobs` table.

use sqlx::{PgPool, Postgres};

use cascade_core::types::DbId;

use super::page;
use crate::models::job::{CreateJob, Job, JobListQuery, UpdateJob};

/// Column list for `jobs` queries.
const COLUMNS: &str = "\
    id, name, description, run_env, run_type, input_params, seq, \
    is_enabled, parent_id, deleted_at, created_at, updated_at";

/// Provides CRUD operations and structural queries for job definitions.
pub struct JobRepo;

impl JobRepo {
    /// Insert a new job, returning the created row.
    ///
    /// The caller verifies that `parent_id` names a live job.
    pub async fn create(pool: &PgPool, input: &CreateJob) -> Result<Job, sqlx::Error> {
        let query = format!(
            "INSERT INTO jobs (name, description, run_env, run_type, input_params, seq, is_enabled, parent_id) \
             VALUES ($1, $2, $3, COALESCE($4, 'job'), $5, COALESCE($6, 0), COALESCE($7, true), $8) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(&input.name)
            .bind(&input.description)
            .bind(&input.run_env)
            .bind(&input.run_type)
            .bind(&input.input_params)
            .bind(input.seq)
            .bind(input.is_enabled)
            .bind(input.parent_id)
            .fetch_one(pool)
            .await
    }

    /// Find a live job by id.
    ///
    /// Accepts the pool or an open transaction, so the report path can read
    /// on the connection that already holds its row locks.
    pub async fn find_by_id<'e, E>(executor: E, id: DbId) -> Result<Option<Job>, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = Postgres>,
    {
        let query = format!("SELECT {COLUMNS} FROM jobs WHERE id = $1 AND deleted_at IS NULL");
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .fetch_optional(executor)
            .await
    }

    /// List live jobs, optionally filtered by parent.
    pub async fn list(pool: &PgPool, params: &JobListQuery) -> Result<Vec<Job>, sqlx::Error> {
        let (limit, offset) = page(params.limit, params.offset);
        let query = format!(
            "SELECT {COLUMNS} FROM jobs \
             WHERE deleted_at IS NULL \
               AND ($1::BIGINT IS NULL OR parent_id = $1) \
               AND (NOT $2 OR parent_id IS NULL) \
             ORDER BY id \
             LIMIT $3 OFFSET $4"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(params.parent_id)
            .bind(params.roots_only.unwrap_or(false))
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Direct children of a job in dispatch order: `seq`, then creation.
    pub async fn list_children<'e, E>(executor: E, parent_id: DbId) -> Result<Vec<Job>, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = Postgres>,
    {
        let query = format!(
            "SELECT {COLUMNS} FROM jobs \
             WHERE parent_id = $1 AND deleted_at IS NULL \
             ORDER BY seq, id"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(parent_id)
            .fetch_all(executor)
            .await
    }

    /// Patch a live job. Returns `None` if it does not exist.
    pub async fn update(
        pool: &PgPool,
        id: DbId,
        input: &UpdateJob,
    ) -> Result<Option<Job>, sqlx::Error> {
        let query = format!(
            "UPDATE jobs SET \
                name = COALESCE($2, name), \
                description = COALESCE($3, description), \
                run_env = COALESCE($4, run_env), \
                run_type = COALESCE($5, run_type), \
                input_params = COALESCE($6, input_params), \
                seq = COALESCE($7, seq), \
                is_enabled = COALESCE($8, is_enabled) \
             WHERE id = $1 AND deleted_at IS NULL \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Job>(&query)
            .bind(id)
            .bind(&input.name)
            .bind(&input.description)
            .bind(&input.run_env)
            .bind(&input.run_type)
            .bind(&input.input_params)
            .bind(input.seq)
            .bind(input.is_enabled)
            .fetch_optional(pool)
            .await
    }

    /// Soft-delete a job. Returns `true` if a live row was marked.
    ///
    /// Orders referencing the job keep their history.
    pub async fn soft_delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE jobs SET deleted_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
