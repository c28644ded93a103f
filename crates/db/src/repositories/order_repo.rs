//! Repository for the `orders` table (the order ledger).
//!
//! Methods taking a transaction are the pieces that must commit together:
//! the upsert, the dispatch claim and the child rows of a report, and the
//! order half of a submission outcome.

use std::time::Duration;

use sqlx::PgPool;

use cascade_core::types::DbId;

use super::page;
use crate::models::order::{NewChildOrder, Order, OrderListQuery, ReportOrder};
use crate::models::status::{AttemptOutcome, OrderStatus, StatusId};

/// Column list for `orders` queries.
const COLUMNS: &str = "\
    id, name, description, job_id, upstream_order_id, status_id, run_times, \
    generation, input, output, run_handle, error_message, deleted_at, \
    created_at, updated_at";

/// Postgres transaction alias used by the ledger methods.
pub type Tx<'c> = sqlx::Transaction<'c, sqlx::Postgres>;

/// Ledger reads and writes.
pub struct OrderRepo;

impl OrderRepo {
    // -----------------------------------------------------------------------
    // Report path (transaction-bound)
    // -----------------------------------------------------------------------

    /// Insert the reported order unless one with the same name exists.
    ///
    /// Returns `true` if this call created the row. A concurrent creator
    /// makes this a no-op rather than an error.
    pub async fn insert_if_absent(tx: &mut Tx<'_>, input: &ReportOrder) -> Result<bool, sqlx::Error> {
        let inserted: Option<(DbId,)> = sqlx::query_as(
            "INSERT INTO orders (name, description, job_id, status_id, output) \
             VALUES ($1, $2, $3, $4, $5) \
             ON CONFLICT (name) DO NOTHING \
             RETURNING id",
        )
        .bind(&input.name)
        .bind(&input.description)
        .bind(input.job_id)
        .bind(input.status)
        .bind(&input.output)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(inserted.is_some())
    }

    /// Load a live order by name and lock it for the rest of the transaction.
    pub async fn find_by_name_for_update(
        tx: &mut Tx<'_>,
        name: &str,
    ) -> Result<Option<Order>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM orders \
             WHERE name = $1 AND deleted_at IS NULL \
             FOR UPDATE"
        );
        sqlx::query_as::<_, Order>(&query)
            .bind(name)
            .fetch_optional(&mut **tx)
            .await
    }

    /// Load a live order by id and lock it.
    pub async fn find_by_id_for_update(
        tx: &mut Tx<'_>,
        id: DbId,
    ) -> Result<Option<Order>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM orders \
             WHERE id = $1 AND deleted_at IS NULL \
             FOR UPDATE"
        );
        sqlx::query_as::<_, Order>(&query)
            .bind(id)
            .fetch_optional(&mut **tx)
            .await
    }

    /// Apply a status report to an existing order.
    ///
    /// `description` is replaced when given. `output` is replaced when
    /// `replace_output` is set and otherwise only fills an empty value.
    pub async fn update_reported(
        tx: &mut Tx<'_>,
        id: DbId,
        description: Option<&str>,
        status_id: StatusId,
        output: Option<&str>,
        replace_output: bool,
    ) -> Result<Order, sqlx::Error> {
        let query = format!(
            "UPDATE orders SET \
                description = COALESCE($2, description), \
                status_id = $3, \
                output = CASE WHEN $5 THEN COALESCE($4, output) ELSE COALESCE(output, $4) END \
             WHERE id = $1 \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Order>(&query)
            .bind(id)
            .bind(description)
            .bind(status_id)
            .bind(output)
            .bind(replace_output)
            .fetch_one(&mut **tx)
            .await
    }

    /// Claim the right to fan out: increments `run_times` only if the order
    /// has never fanned out, or unconditionally when `force` is set.
    ///
    /// Returns the new `run_times` (which is the fan-out generation), or
    /// `None` if another report already claimed it.
    pub async fn claim_dispatch(
        tx: &mut Tx<'_>,
        id: DbId,
        force: bool,
    ) -> Result<Option<i32>, sqlx::Error> {
        let claimed: Option<(i32,)> = sqlx::query_as(
            "UPDATE orders SET run_times = run_times + 1 \
             WHERE id = $1 AND ($2 OR run_times = 0) \
             RETURNING run_times",
        )
        .bind(id)
        .bind(force)
        .fetch_optional(&mut **tx)
        .await?;
        Ok(claimed.map(|(n,)| n))
    }

    /// Create the child order for one fan-out generation.
    ///
    /// Returns `None` when the name or the lineage
    /// `(upstream_order_id, job_id, generation)` is already taken.
    pub async fn create_child(
        tx: &mut Tx<'_>,
        input: &NewChildOrder<'_>,
    ) -> Result<Option<Order>, sqlx::Error> {
        let query = format!(
            "INSERT INTO orders (name, job_id, upstream_order_id, generation, status_id, input) \
             VALUES ($1, $2, $3, $4, $5, $6) \
             ON CONFLICT DO NOTHING \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Order>(&query)
            .bind(input.name)
            .bind(input.job_id)
            .bind(input.upstream_order_id)
            .bind(input.generation)
            .bind(OrderStatus::Running.id())
            .bind(input.input)
            .fetch_optional(&mut **tx)
            .await
    }

    /// The child order of `upstream_order_id` for `job_id` in `generation`.
    pub async fn find_child(
        tx: &mut Tx<'_>,
        upstream_order_id: DbId,
        job_id: DbId,
        generation: i32,
    ) -> Result<Option<Order>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM orders \
             WHERE upstream_order_id = $1 AND job_id = $2 AND generation = $3"
        );
        sqlx::query_as::<_, Order>(&query)
            .bind(upstream_order_id)
            .bind(job_id)
            .bind(generation)
            .fetch_optional(&mut **tx)
            .await
    }

    // -----------------------------------------------------------------------
    // Submission outcomes
    // -----------------------------------------------------------------------

    /// Insert a root order (no upstream) for a manual launch.
    pub async fn create_root(
        tx: &mut Tx<'_>,
        name: &str,
        job_id: DbId,
        description: Option<&str>,
        input: Option<&str>,
    ) -> Result<Order, sqlx::Error> {
        let query = format!(
            "INSERT INTO orders (name, description, job_id, status_id, input) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {COLUMNS}"
        );
        sqlx::query_as::<_, Order>(&query)
            .bind(name)
            .bind(description)
            .bind(job_id)
            .bind(OrderStatus::Running.id())
            .bind(input)
            .fetch_one(&mut **tx)
            .await
    }

    /// Record an accepted submission: the order is running under `run_handle`.
    ///
    /// An order reported complete in the meantime keeps its status.
    pub async fn record_submission(
        tx: &mut Tx<'_>,
        id: DbId,
        run_handle: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE orders SET status_id = $2, run_handle = $3, error_message = NULL \
             WHERE id = $1 AND status_id <> $4",
        )
        .bind(id)
        .bind(OrderStatus::Running.id())
        .bind(run_handle)
        .bind(OrderStatus::Complete.id())
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Record a failed submission: the order is failed with `error_message`.
    ///
    /// An order reported complete in the meantime keeps its status.
    pub async fn record_rejection(
        tx: &mut Tx<'_>,
        id: DbId,
        error_message: &str,
    ) -> Result<(), sqlx::Error> {
        sqlx::query(
            "UPDATE orders SET status_id = $2, error_message = $3 \
             WHERE id = $1 AND status_id <> $4",
        )
        .bind(id)
        .bind(OrderStatus::Failed.id())
        .bind(error_message)
        .bind(OrderStatus::Complete.id())
        .execute(&mut **tx)
        .await?;
        Ok(())
    }

    /// Running orders without a handle whose pending attempt is older than
    /// `stale_after`: their submission was interrupted.
    pub async fn list_stalled_submissions(
        pool: &PgPool,
        stale_after: Duration,
        limit: i64,
    ) -> Result<Vec<Order>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM orders \
             WHERE status_id = $1 AND run_handle IS NULL AND deleted_at IS NULL \
               AND EXISTS ( \
                   SELECT 1 FROM dispatch_attempts a \
                   WHERE a.order_id = orders.id AND a.outcome_id = 0 \
                     AND a.created_at <= NOW() - $2 * INTERVAL '1 millisecond') \
             ORDER BY id \
             LIMIT $3"
        );
        sqlx::query_as::<_, Order>(&query)
            .bind(OrderStatus::Running.id())
            .bind(stale_after.as_secs_f64())
            .bind(limit)
            .bind(AttemptOutcome::Pending.id())
            .fetch_all(pool)
            .await
    }

    // -----------------------------------------------------------------------
    // Reads
    // -----------------------------------------------------------------------

    /// Find a live order by id.
    pub async fn find_by_id(pool: &PgPool, id: DbId) -> Result<Option<Order>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM orders WHERE id = $1 AND deleted_at IS NULL");
        sqlx::query_as::<_, Order>(&query)
            .bind(id)
            .fetch_optional(pool)
            .await
    }

    /// Find a live order by name.
    pub async fn find_by_name(pool: &PgPool, name: &str) -> Result<Option<Order>, sqlx::Error> {
        let query = format!("SELECT {COLUMNS} FROM orders WHERE name = $1 AND deleted_at IS NULL");
        sqlx::query_as::<_, Order>(&query)
            .bind(name)
            .fetch_optional(pool)
            .await
    }

    /// List live orders, newest first.
    pub async fn list(pool: &PgPool, params: &OrderListQuery) -> Result<Vec<Order>, sqlx::Error> {
        let (limit, offset) = page(params.limit, params.offset);
        let query = format!(
            "SELECT {COLUMNS} FROM orders \
             WHERE deleted_at IS NULL \
               AND ($1::BIGINT IS NULL OR job_id = $1) \
               AND ($2::SMALLINT IS NULL OR status_id = $2) \
               AND ($3::BIGINT IS NULL OR upstream_order_id = $3) \
             ORDER BY id DESC \
             LIMIT $4 OFFSET $5"
        );
        sqlx::query_as::<_, Order>(&query)
            .bind(params.job_id)
            .bind(params.status_id)
            .bind(params.upstream_order_id)
            .bind(limit)
            .bind(offset)
            .fetch_all(pool)
            .await
    }

    /// Orders created by fan-outs of `upstream_order_id`, by generation.
    pub async fn list_children(
        pool: &PgPool,
        upstream_order_id: DbId,
    ) -> Result<Vec<Order>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM orders \
             WHERE upstream_order_id = $1 AND deleted_at IS NULL \
             ORDER BY generation, id"
        );
        sqlx::query_as::<_, Order>(&query)
            .bind(upstream_order_id)
            .fetch_all(pool)
            .await
    }

    /// Running orders with a backend handle, oldest first.
    pub async fn list_running_with_handles(
        pool: &PgPool,
        limit: i64,
    ) -> Result<Vec<Order>, sqlx::Error> {
        let query = format!(
            "SELECT {COLUMNS} FROM orders \
             WHERE status_id = $1 AND run_handle IS NOT NULL AND deleted_at IS NULL \
             ORDER BY id \
             LIMIT $2"
        );
        sqlx::query_as::<_, Order>(&query)
            .bind(OrderStatus::Running.id())
            .bind(limit)
            .fetch_all(pool)
            .await
    }

    /// Soft-delete an order. Returns `true` if a live row was marked.
    pub async fn soft_delete(pool: &PgPool, id: DbId) -> Result<bool, sqlx::Error> {
        let result = sqlx::query(
            "UPDATE orders SET deleted_at = NOW() WHERE id = $1 AND deleted_at IS NULL",
        )
        .bind(id)
        .execute(pool)
        .await?;
        Ok(result.rows_affected() > 0)
    }
}
