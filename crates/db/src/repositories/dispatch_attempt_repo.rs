//! Repository for the `dispatch_attempts` table.
//!
//! An attempt is reserved as `Pending` before the backend is called and is
//! finalized exactly once. Reservation and finalization are transaction
//! bound so they commit together with the order row they belong to.

use sqlx::{PgPool, Postgres};

use cascade_core::types::DbId;

use super::order_repo::Tx;
use crate::models::dispatch_attempt::DispatchAttempt;
use crate::models::status::AttemptOutcome;

/// Column list for `dispatch_attempts` queries.
const COLUMNS: &str = "\
    id, order_id, attempt, run_name, outcome_id, run_handle, error_message, created_at";

/// Log of backend submissions, one row per attempt.
pub struct DispatchAttemptRepo;

impl DispatchAttemptRepo {
    /// The attempt number the next submission of `order_id` will use.
    pub async fn next_attempt<'e, E>(executor: E, order_id: DbId) -> Result<i32, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = Postgres>,
    {
        let (next,): (i32,) = sqlx::query_as(
            "SELECT COALESCE(MAX(attempt), 0) + 1 FROM dispatch_attempts WHERE order_id = $1",
        )
        .bind(order_id)
        .fetch_one(executor)
        .await?;
        Ok(next)
    }

    /// The open (pending) attempt of an order, if any.
    pub async fn find_pending<'e, E>(
        executor: E,
        order_id: DbId,
    ) -> Result<Option<DispatchAttempt>, sqlx::Error>
    where
        E: sqlx::Executor<'e, Database = Postgres>,
    {
        let query = format!(
            "SELECT {COLUMNS} FROM dispatch_attempts WHERE order_id = $1 AND outcome_id = $2"
        );
        sqlx::query_as::<_, DispatchAttempt>(&query)
            .bind(order_id)
            .bind(AttemptOutcome::Pending.id())
            .fetch_optional(executor)
            .await
    }

    /// Reserve attempt number `attempt` for an order as `Pending`.
    ///
    /// The caller holds the order row lock. A second open attempt violates
    /// `uq_dispatch_attempts_one_pending`.
    pub async fn reserve(
        tx: &mut Tx<'_>,
        order_id: DbId,
        attempt: i32,
        run_name: &str,
    ) -> Result<DispatchAttempt, sqlx::Error> {
        let query = format!(
            "INSERT INTO dispatch_attempts (order_id, attempt, run_name, outcome_id) \
             VALUES ($1, $2, $3, $4) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, DispatchAttempt>(&query)
            .bind(order_id)
            .bind(attempt)
            .bind(run_name)
            .bind(AttemptOutcome::Pending.id())
            .fetch_one(&mut **tx)
            .await
    }

    /// Close a pending attempt as accepted under `run_handle`.
    ///
    /// Returns `false` if the attempt was no longer pending.
    pub async fn mark_submitted(
        tx: &mut Tx<'_>,
        id: DbId,
        run_handle: &str,
    ) -> Result<bool, sqlx::Error> {
        Self::close(tx, id, AttemptOutcome::Submitted, Some(run_handle), None).await
    }

    /// Close a pending attempt as failed before or at the backend.
    ///
    /// Returns `false` if the attempt was no longer pending.
    pub async fn mark_rejected(
        tx: &mut Tx<'_>,
        id: DbId,
        error_message: &str,
    ) -> Result<bool, sqlx::Error> {
        Self::close(tx, id, AttemptOutcome::Rejected, None, Some(error_message)).await
    }

    /// Every attempt of an order, oldest first.
    pub async fn list_for_order(
        pool: &PgPool,
        order_id: DbId,
    ) -> Result<Vec<DispatchAttempt>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM dispatch_attempts WHERE order_id = $1 ORDER BY attempt"
        );
        sqlx::query_as::<_, DispatchAttempt>(&query)
            .bind(order_id)
            .fetch_all(pool)
            .await
    }

    async fn close(
        tx: &mut Tx<'_>,
        id: DbId,
        outcome: AttemptOutcome,
        run_handle: Option<&str>,
        error_message: Option<&str>,
    ) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE dispatch_attempts \
             SET outcome_id = $2, run_handle = $3, error_message = $4 \
             WHERE id = $1 AND outcome_id = $5",
        )
        .bind(id)
        .bind(outcome.id())
        .bind(run_handle)
        .bind(error_message)
        .bind(AttemptOutcome::Pending.id())
        .execute(&mut **tx)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
