//! Order ledger: status reports and the cascade trigger.

use std::sync::Arc;

use serde::Serialize;
use sqlx::PgPool;

use cascade_core::dispatch::CascadeOutcome;
use cascade_core::error::CoreError;
use cascade_core::order_lifecycle::{self, state_machine, STATUS_COMPLETE};
use cascade_db::models::order::{Order, ReportOrder};
use cascade_db::repositories::{JobRepo, OrderRepo};

use crate::dispatch::DispatchEngine;
use crate::error::EngineError;

/// Ledger entry after a report, plus what the report did to the cascade.
#[derive(Debug, Clone, Serialize)]
pub struct ReportOutcome {
    pub order: Order,
    pub created: bool,
    pub cascade: CascadeOutcome,
}

/// Records order status reports and triggers fan-outs.
#[derive(Clone)]
pub struct OrderLedger {
    pool: PgPool,
    engine: Arc<DispatchEngine>,
}

impl OrderLedger {
    pub fn new(pool: PgPool, engine: Arc<DispatchEngine>) -> Self {
        Self { pool, engine }
    }

    pub fn engine(&self) -> &Arc<DispatchEngine> {
        &self.engine
    }

    /// Create or update the order named `input.name` and, if it is now
    /// complete, fan out to the children of its job.
    ///
    /// The upsert, the dispatch claim and the child orders commit together.
    /// A fan-out happens only when the order has never fanned out, or when
    /// `force` is set, in which case a new generation of children is created.
    /// Repeated reports for the same name are idempotent updates.
    ///
    /// Every read inside the transaction uses its connection, so a report
    /// never waits on the pool while holding the order lock. Children are
    /// submitted by a spawned task that runs to completion even if the
    /// caller goes away; children it never reached are picked up by the
    /// completion watcher.
    pub async fn report(&self, input: &ReportOrder) -> Result<ReportOutcome, EngineError> {
        order_lifecycle::validate_status(input.status)?;

        let mut tx = self.pool.begin().await?;

        let mut created = false;
        let mut existing = OrderRepo::find_by_name_for_update(&mut tx, &input.name).await?;
        if existing.is_none() {
            JobRepo::find_by_id(&mut *tx, input.job_id)
                .await?
                .ok_or_else(|| {
                    CoreError::Validation(format!("Job {} does not exist", input.job_id))
                })?;
            created = OrderRepo::insert_if_absent(&mut tx, input).await?;
            existing = OrderRepo::find_by_name_for_update(&mut tx, &input.name).await?;
        }
        let Some(order) = existing else {
            return Err(CoreError::Conflict(format!(
                "Order name '{}' belongs to a deleted order",
                input.name
            ))
            .into());
        };

        let order = if created {
            order
        } else {
            state_machine::validate_transition(order.status_id, input.status, input.force)?;
            if order.job_id != input.job_id {
                tracing::debug!(
                    order_id = order.id,
                    job_id = order.job_id,
                    reported_job_id = input.job_id,
                    "Ignoring job_id change on existing order",
                );
            }
            OrderRepo::update_reported(
                &mut tx,
                order.id,
                input.description.as_deref(),
                input.status,
                input.output.as_deref(),
                input.force,
            )
            .await?
        };

        if !order_lifecycle::should_cascade(order.status_id, order.run_times, input.force) {
            tx.commit().await?;
            return Ok(Self::without_fan_out(order, created));
        }

        // The row lock makes this claim authoritative; a concurrent report
        // that got here first has already bumped `run_times`.
        let Some(generation) = OrderRepo::claim_dispatch(&mut tx, order.id, input.force).await? else {
            tx.commit().await?;
            return Ok(Self::without_fan_out(order, created));
        };

        let (report, planned) = self.engine.plan_fan_out(&mut tx, &order, generation).await?;
        tx.commit().await?;
        tracing::info!(
            order_id = order.id,
            job_id = order.job_id,
            generation,
            children = planned.len(),
            force = input.force,
            "Order complete; fanning out",
        );

        let engine = Arc::clone(&self.engine);
        let report = tokio::spawn(async move { engine.submit_planned(report, planned).await })
            .await
            .map_err(|e| CoreError::Internal(format!("Fan-out submission task failed: {e}")))?;

        let order = Order {
            run_times: generation,
            ..order
        };
        Ok(ReportOutcome {
            order,
            created,
            cascade: CascadeOutcome::Dispatched(report),
        })
    }

    fn without_fan_out(order: Order, created: bool) -> ReportOutcome {
        let cascade = if order.status_id == STATUS_COMPLETE {
            tracing::info!(order_id = order.id, "Order already dispatched; cascade skipped");
            CascadeOutcome::AlreadyDispatched
        } else {
            tracing::info!(
                order_id = order.id,
                status = order_lifecycle::status_name(order.status_id),
                created,
                "Order status recorded",
            );
            CascadeOutcome::NotComplete
        };
        ReportOutcome {
            order,
            created,
            cascade,
        }
    }
}
