//! Dispatch engine: fan-out to child jobs and single-order submission.
//!
//! A fan-out happens in two phases. [`DispatchEngine::plan_fan_out`] runs
//! inside the reporting transaction and creates one child order per enabled
//! child job, each with a pending attempt. After that transaction commits,
//! [`DispatchEngine::submit_planned`] submits each new child on its own, so
//! a backend failure for one child never affects its siblings.
//!
//! Every submission follows the same attempt lifecycle: reserve a pending
//! attempt under the order lock, call the backend, then close the attempt
//! and update the order in one transaction.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use sqlx::PgPool;

use cascade_backend::registry::BackendRegistry;
use cascade_core::backend::{ExecutionBackend, RunHandle};
use cascade_core::dispatch::{
    ChildFailure, ChildOutcome, DispatchReport, DispatchedChild, SkipReason, SkippedChild,
};
use cascade_core::error::CoreError;
use cascade_core::naming;
use cascade_core::order_lifecycle::{STATUS_COMPLETE, STATUS_RUNNING};
use cascade_core::template::{RenderedTemplate, TemplateParams};
use cascade_core::types::DbId;
use cascade_db::models::dispatch_attempt::DispatchAttempt;
use cascade_db::models::job::Job;
use cascade_db::models::order::{LaunchJob, NewChildOrder, Order};
use cascade_db::repositories::order_repo::Tx;
use cascade_db::repositories::{DispatchAttemptRepo, JobRepo, JobTagRepo, OrderRepo};

use crate::error::EngineError;
use crate::templates::TemplateService;

/// Attempt number of the first submission of an order.
const FIRST_ATTEMPT: i32 = 1;

/// How long a pending attempt may stay open before it counts as abandoned.
/// Comfortably longer than a backend call can take.
const DEFAULT_STALE_SUBMISSION_AFTER: Duration = Duration::from_secs(300);

/// Error recorded on a pending attempt superseded by a later one.
const ABANDONED_MESSAGE: &str = "Submission abandoned before the backend answered";

/// A child order created inside the reporting transaction, awaiting
/// submission.
#[derive(Debug)]
pub struct PlannedChild {
    job: Job,
    order: Order,
    attempt: DispatchAttempt,
}

/// An order accepted by its execution backend.
#[derive(Debug, Clone, Serialize)]
pub struct LaunchedOrder {
    pub order: Order,
    pub attempt: i32,
    pub run_name: String,
    pub run_handle: RunHandle,
}

/// A rendered template and the backend it goes to.
struct Prepared {
    backend: Arc<dyn ExecutionBackend>,
    rendered: RenderedTemplate,
}

/// Result of one submission attempt.
enum Attempt {
    Accepted(RunHandle),
    Rejected(String),
}

/// Launches orders on their execution backends.
#[derive(Clone)]
pub struct DispatchEngine {
    pool: PgPool,
    backends: BackendRegistry,
    templates: TemplateService,
    stale_submission_after: Duration,
}

impl DispatchEngine {
    pub fn new(pool: PgPool, backends: BackendRegistry, templates: TemplateService) -> Self {
        Self {
            pool,
            backends,
            templates,
            stale_submission_after: DEFAULT_STALE_SUBMISSION_AFTER,
        }
    }

    /// Override how long a pending attempt may stay open before a
    /// resubmission may supersede it.
    pub fn with_stale_submission_after(mut self, after: Duration) -> Self {
        self.stale_submission_after = after;
        self
    }

    pub fn stale_submission_after(&self) -> Duration {
        self.stale_submission_after
    }

    pub fn backends(&self) -> &BackendRegistry {
        &self.backends
    }

    pub fn templates(&self) -> &TemplateService {
        &self.templates
    }

    // -----------------------------------------------------------------------
    // Fan-out
    // -----------------------------------------------------------------------

    /// Create the child orders for one fan-out of `upstream`.
    ///
    /// Runs inside the reporting transaction and reads on its connection;
    /// nothing is submitted here. Children are considered in `seq` order,
    /// then creation order. Disabled children are skipped, as are children
    /// that already have an order for this generation. Each new child gets
    /// a pending first attempt.
    pub async fn plan_fan_out(
        &self,
        tx: &mut Tx<'_>,
        upstream: &Order,
        generation: i32,
    ) -> Result<(DispatchReport, Vec<PlannedChild>), EngineError> {
        JobRepo::find_by_id(&mut **tx, upstream.job_id)
            .await?
            .ok_or(CoreError::NotFound { entity: "Job", id: upstream.job_id })?;

        let children = JobRepo::list_children(&mut **tx, upstream.job_id).await?;
        let mut report = DispatchReport::new(upstream.id, generation);
        let mut planned = Vec::with_capacity(children.len());

        for job in children {
            if !job.is_enabled {
                report.record(ChildOutcome::Skipped(SkippedChild {
                    job_id: job.id,
                    job_name: job.name.clone(),
                    order_id: None,
                    reason: SkipReason::JobDisabled,
                }));
                continue;
            }

            let name = naming::child_order_name(&job.name, upstream.id, generation);
            let child = NewChildOrder {
                name: &name,
                job_id: job.id,
                upstream_order_id: upstream.id,
                generation,
                input: upstream.output.as_deref(),
            };

            if let Some(order) = OrderRepo::create_child(tx, &child).await? {
                let run_name = naming::run_name(&order.name, FIRST_ATTEMPT);
                let attempt = DispatchAttemptRepo::reserve(tx, order.id, FIRST_ATTEMPT, &run_name).await?;
                planned.push(PlannedChild { job, order, attempt });
                continue;
            }

            match OrderRepo::find_child(tx, upstream.id, job.id, generation).await? {
                Some(existing) => report.record(ChildOutcome::Skipped(SkippedChild {
                    job_id: job.id,
                    job_name: job.name,
                    order_id: Some(existing.id),
                    reason: SkipReason::AlreadyDispatched,
                })),
                None => report.record(ChildOutcome::Failed(ChildFailure {
                    job_id: job.id,
                    job_name: job.name,
                    order_id: None,
                    message: format!("Order name '{name}' is already taken"),
                })),
            }
        }

        Ok((report, planned))
    }

    /// Submit every planned child and fold the outcomes into `report`.
    ///
    /// Called after the reporting transaction committed. Every failure,
    /// including a failure to record the outcome, stays with its child.
    pub async fn submit_planned(
        &self,
        mut report: DispatchReport,
        planned: Vec<PlannedChild>,
    ) -> DispatchReport {
        for PlannedChild { job, order, attempt } in planned {
            let outcome = match self.submit_reserved(&job, &order, &attempt).await {
                Ok(Attempt::Accepted(run_handle)) => ChildOutcome::Dispatched(DispatchedChild {
                    job_id: job.id,
                    job_name: job.name,
                    order_id: order.id,
                    order_name: order.name,
                    run_handle,
                }),
                Ok(Attempt::Rejected(message)) => ChildOutcome::Failed(ChildFailure {
                    job_id: job.id,
                    job_name: job.name,
                    order_id: Some(order.id),
                    message,
                }),
                Err(e) => {
                    tracing::error!(order_id = order.id, error = %e, "Failed to record child submission");
                    ChildOutcome::Failed(ChildFailure {
                        job_id: job.id,
                        job_name: job.name,
                        order_id: Some(order.id),
                        message: e.to_string(),
                    })
                }
            };
            report.record(outcome);
        }

        tracing::info!(
            upstream_order_id = report.upstream_order_id,
            generation = report.generation,
            dispatched = report.dispatched.len(),
            skipped = report.skipped.len(),
            failed = report.failures.len(),
            "Fan-out finished",
        );
        report
    }

    // -----------------------------------------------------------------------
    // Single-order submission
    // -----------------------------------------------------------------------

    /// Create a root order for `job_id` and submit it.
    ///
    /// The template is rendered before the order is created, so a job that
    /// cannot be launched leaves no ledger row behind.
    pub async fn launch(&self, job_id: DbId, input: &LaunchJob) -> Result<LaunchedOrder, EngineError> {
        let job = JobRepo::find_by_id(&self.pool, job_id)
            .await?
            .ok_or(CoreError::NotFound { entity: "Job", id: job_id })?;
        ensure_enabled(&job)?;

        let launch_input = input.input.as_deref().or(job.input_params.as_deref());
        let run_name = naming::run_name(&input.order_name, FIRST_ATTEMPT);
        let prepared = self
            .prepare(&job, &input.order_name, launch_input, &run_name)
            .await?;

        let mut tx = self.pool.begin().await?;
        let order = OrderRepo::create_root(
            &mut tx,
            &input.order_name,
            job.id,
            input.description.as_deref(),
            launch_input,
        )
        .await?;
        let attempt = DispatchAttemptRepo::reserve(&mut tx, order.id, FIRST_ATTEMPT, &run_name).await?;
        tx.commit().await?;
        tracing::info!(order_id = order.id, job_id, "Root order created");

        let result = self.submit_prepared(&order, &attempt, prepared).await?;
        self.finish_single(order.id, attempt, result).await
    }

    /// Render and submit an existing order again under a new attempt.
    ///
    /// Only orders with no live run can be resubmitted: failed orders, and
    /// running orders without a run handle whose last attempt is closed or
    /// stale. Complete orders re-dispatch their children through a forced
    /// report instead.
    pub async fn resubmit(&self, order_id: DbId) -> Result<LaunchedOrder, EngineError> {
        let order = OrderRepo::find_by_id(&self.pool, order_id)
            .await?
            .ok_or(CoreError::NotFound { entity: "Order", id: order_id })?;
        let pending = DispatchAttemptRepo::find_pending(&self.pool, order.id).await?;
        self.ensure_submittable(&order, pending.as_ref())?;

        let job = JobRepo::find_by_id(&self.pool, order.job_id)
            .await?
            .ok_or(CoreError::NotFound { entity: "Job", id: order.job_id })?;
        ensure_enabled(&job)?;

        let next = DispatchAttemptRepo::next_attempt(&self.pool, order.id).await?;
        let run_name = naming::run_name(&order.name, next);
        let prepared = self
            .prepare(&job, &order.name, order.input.as_deref(), &run_name)
            .await?;

        let attempt = self.reserve_attempt(order.id, next, &run_name).await?;
        let result = self.submit_prepared(&order, &attempt, prepared).await?;
        self.finish_single(order.id, attempt, result).await
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    /// Reserve attempt `next` under the order lock.
    ///
    /// Re-checks eligibility on the locked row and closes a stale pending
    /// attempt. A concurrent resubmission that reserved first turns this
    /// one into a conflict before anything reaches the backend.
    async fn reserve_attempt(
        &self,
        order_id: DbId,
        next: i32,
        run_name: &str,
    ) -> Result<DispatchAttempt, EngineError> {
        let mut tx = self.pool.begin().await?;
        let order = OrderRepo::find_by_id_for_update(&mut tx, order_id)
            .await?
            .ok_or(CoreError::NotFound { entity: "Order", id: order_id })?;
        let pending = DispatchAttemptRepo::find_pending(&mut *tx, order_id).await?;
        self.ensure_submittable(&order, pending.as_ref())?;

        if DispatchAttemptRepo::next_attempt(&mut *tx, order_id).await? != next {
            return Err(CoreError::Conflict(format!(
                "Order {order_id} was resubmitted concurrently"
            ))
            .into());
        }
        if let Some(stale) = pending {
            DispatchAttemptRepo::mark_rejected(&mut tx, stale.id, ABANDONED_MESSAGE).await?;
            tracing::warn!(order_id, attempt = stale.attempt, "Superseding abandoned submission");
        }
        let attempt = DispatchAttemptRepo::reserve(&mut tx, order_id, next, run_name).await?;
        tx.commit().await?;
        Ok(attempt)
    }

    /// An order can be submitted when it is not complete, has no live run,
    /// and has no pending attempt younger than the stale threshold.
    fn ensure_submittable(
        &self,
        order: &Order,
        pending: Option<&DispatchAttempt>,
    ) -> Result<(), CoreError> {
        if order.status_id == STATUS_COMPLETE {
            return Err(CoreError::Conflict(format!(
                "Order {} is complete; report it with force to re-dispatch its children",
                order.id
            )));
        }
        if order.status_id == STATUS_RUNNING {
            if let Some(handle) = &order.run_handle {
                return Err(CoreError::Conflict(format!(
                    "Order {} is already running as {handle}",
                    order.id
                )));
            }
        }
        if let Some(attempt) = pending {
            if !self.is_stale(attempt) {
                return Err(CoreError::Conflict(format!(
                    "Order {} has a submission in progress (attempt {})",
                    order.id, attempt.attempt
                )));
            }
        }
        Ok(())
    }

    fn is_stale(&self, attempt: &DispatchAttempt) -> bool {
        let threshold = chrono::Duration::milliseconds(self.stale_submission_after.as_millis() as i64);
        attempt.created_at <= Utc::now() - threshold
    }

    /// Submit a fan-out child under its reserved attempt. Preparation
    /// failures close the attempt like backend rejections.
    async fn submit_reserved(
        &self,
        job: &Job,
        order: &Order,
        attempt: &DispatchAttempt,
    ) -> Result<Attempt, EngineError> {
        match self
            .prepare(job, &order.name, order.input.as_deref(), &attempt.run_name)
            .await
        {
            Ok(prepared) => self.submit_prepared(order, attempt, prepared).await,
            Err(EngineError::Database(e)) => Err(EngineError::Database(e)),
            Err(e) => self.finalize(order.id, attempt, Attempt::Rejected(e.to_string())).await,
        }
    }

    /// Resolve the backend and render the job's template for one run.
    async fn prepare(
        &self,
        job: &Job,
        order_name: &str,
        input: Option<&str>,
        run_name: &str,
    ) -> Result<Prepared, EngineError> {
        let backend = self.backends.get(&job.run_env).ok_or_else(|| {
            CoreError::Validation(format!(
                "No execution target is configured for run_env '{}'",
                job.run_env
            ))
        })?;

        let resolved = self.templates.resolve_active(job.id).await?.ok_or_else(|| {
            CoreError::Validation(format!("Job '{}' has no active execution template", job.name))
        })?;

        let tags = JobTagRepo::list_for_job(&self.pool, job.id).await?;
        let params = TemplateParams::from_tags(tags.into_iter().map(|t| (t.name, t.value)))
            .with_builtins(order_name, run_name, input.unwrap_or_default());
        let rendered = resolved.manifest.render(&params, run_name)?;

        Ok(Prepared { backend, rendered })
    }

    async fn submit_prepared(
        &self,
        order: &Order,
        attempt: &DispatchAttempt,
        prepared: Prepared,
    ) -> Result<Attempt, EngineError> {
        let result = match prepared.backend.submit(&prepared.rendered).await {
            Ok(handle) => {
                tracing::info!(
                    order_id = order.id,
                    attempt = attempt.attempt,
                    backend = prepared.backend.kind(),
                    run_handle = %handle,
                    "Order submitted",
                );
                Attempt::Accepted(handle)
            }
            Err(e) => Attempt::Rejected(e.to_string()),
        };
        self.finalize(order.id, attempt, result).await
    }

    /// Close `attempt` and apply its outcome to the order in one
    /// transaction. An attempt that was superseded meanwhile leaves the
    /// order to its newer attempt.
    async fn finalize(
        &self,
        order_id: DbId,
        attempt: &DispatchAttempt,
        result: Attempt,
    ) -> Result<Attempt, EngineError> {
        let mut tx = self.pool.begin().await?;
        let current = match &result {
            Attempt::Accepted(handle) => {
                let current = DispatchAttemptRepo::mark_submitted(&mut tx, attempt.id, handle.as_str()).await?;
                if current {
                    OrderRepo::record_submission(&mut tx, order_id, handle.as_str()).await?;
                }
                current
            }
            Attempt::Rejected(message) => {
                let current = DispatchAttemptRepo::mark_rejected(&mut tx, attempt.id, message).await?;
                if current {
                    OrderRepo::record_rejection(&mut tx, order_id, message).await?;
                }
                current
            }
        };
        tx.commit().await?;

        if !current {
            tracing::warn!(order_id, attempt = attempt.attempt, "Attempt was superseded before it finished");
        }
        if let Attempt::Rejected(message) = &result {
            tracing::warn!(order_id, attempt = attempt.attempt, error = %message, "Order submission failed");
        }
        Ok(result)
    }

    async fn finish_single(
        &self,
        order_id: DbId,
        attempt: DispatchAttempt,
        result: Attempt,
    ) -> Result<LaunchedOrder, EngineError> {
        match result {
            Attempt::Accepted(run_handle) => {
                let order = OrderRepo::find_by_id(&self.pool, order_id)
                    .await?
                    .ok_or(CoreError::NotFound { entity: "Order", id: order_id })?;
                Ok(LaunchedOrder {
                    order,
                    attempt: attempt.attempt,
                    run_name: attempt.run_name,
                    run_handle,
                })
            }
            Attempt::Rejected(message) => Err(EngineError::Submission { order_id, message }),
        }
    }
}

fn ensure_enabled(job: &Job) -> Result<(), CoreError> {
    if job.is_enabled {
        Ok(())
    } else {
        Err(CoreError::Conflict(format!("Job '{}' is paused", job.name)))
    }
}
