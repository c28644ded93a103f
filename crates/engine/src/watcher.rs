//! Completion watcher.
//!
//! Polls the execution backend for every running order that has a run
//! handle and reports finished runs back into the [`OrderLedger`], which
//! advances the cascade by one generation. Each cycle also resubmits
//! orders whose submission was interrupted before it was recorded.

use std::time::Duration;

use sqlx::PgPool;
use tokio_util::sync::CancellationToken;

use cascade_core::backend::{BackendError, RunHandle};
use cascade_core::order_lifecycle::{STATUS_COMPLETE, STATUS_FAILED};
use cascade_db::models::order::{Order, ReportOrder};
use cascade_db::repositories::{JobRepo, OrderRepo};

use crate::error::EngineError;
use crate::ledger::OrderLedger;

/// Default polling interval for the watcher loop.
const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(15);

/// Maximum number of orders polled per cycle.
const BATCH_SIZE: i64 = 200;

/// Background task reporting backend completions into the ledger.
pub struct CompletionWatcher {
    pool: PgPool,
    ledger: OrderLedger,
    poll_interval: Duration,
}

impl CompletionWatcher {
    /// Create a watcher with the default 15-second poll interval.
    pub fn new(pool: PgPool, ledger: OrderLedger) -> Self {
        Self {
            pool,
            ledger,
            poll_interval: DEFAULT_POLL_INTERVAL,
        }
    }

    pub fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Run the watcher loop until the cancellation token is triggered.
    pub async fn run(&self, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(self.poll_interval);
        tracing::info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "Completion watcher started",
        );

        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    tracing::info!("Completion watcher shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.poll_once().await {
                        tracing::error!(error = %e, "Watch cycle failed");
                    }
                    if let Err(e) = self.resubmit_stalled().await {
                        tracing::error!(error = %e, "Stalled submission sweep failed");
                    }
                }
            }
        }
    }

    /// One cycle: poll every watched order once. Returns how many orders
    /// were reported as finished.
    pub async fn poll_once(&self) -> Result<usize, EngineError> {
        let orders = OrderRepo::list_running_with_handles(&self.pool, BATCH_SIZE).await?;
        let mut finished = 0;

        for order in orders {
            match self.check(&order).await {
                Ok(true) => finished += 1,
                Ok(false) => {}
                Err(e) => {
                    tracing::warn!(order_id = order.id, error = %e, "Failed to check order run");
                }
            }
        }

        Ok(finished)
    }

    /// Resubmit running orders whose pending attempt went stale without an
    /// outcome. Returns how many were accepted by their backend.
    pub async fn resubmit_stalled(&self) -> Result<usize, EngineError> {
        let engine = self.ledger.engine();
        let orders = OrderRepo::list_stalled_submissions(
            &self.pool,
            engine.stale_submission_after(),
            BATCH_SIZE,
        )
        .await?;
        let mut resubmitted = 0;

        for order in orders {
            match engine.resubmit(order.id).await {
                Ok(launched) => {
                    tracing::info!(
                        order_id = order.id,
                        attempt = launched.attempt,
                        run_handle = %launched.run_handle,
                        "Stalled submission resubmitted",
                    );
                    resubmitted += 1;
                }
                Err(e) => {
                    tracing::warn!(order_id = order.id, error = %e, "Stalled submission not resubmitted");
                }
            }
        }

        Ok(resubmitted)
    }

    /// Poll one order's run and report it if it finished.
    async fn check(&self, order: &Order) -> Result<bool, EngineError> {
        let Some(handle) = order.run_handle.clone().map(RunHandle) else {
            return Ok(false);
        };
        let Some(job) = JobRepo::find_by_id(&self.pool, order.job_id).await? else {
            return Ok(false);
        };
        let Some(backend) = self.ledger.engine().backends().get(&job.run_env) else {
            return Ok(false);
        };

        let status = match backend.poll(&handle).await {
            Ok(status) if status.is_terminal() => {
                if status.is_success() {
                    STATUS_COMPLETE
                } else {
                    STATUS_FAILED
                }
            }
            Ok(_) => return Ok(false),
            Err(BackendError::UnknownRun(_)) => {
                tracing::warn!(order_id = order.id, run_handle = %handle, "Run vanished from backend");
                STATUS_FAILED
            }
            Err(BackendError::Unsupported(_)) => return Ok(false),
            Err(e) => {
                tracing::warn!(order_id = order.id, error = %e, "Run status poll failed");
                return Ok(false);
            }
        };

        let outcome = self
            .ledger
            .report(&ReportOrder {
                name: order.name.clone(),
                job_id: order.job_id,
                description: None,
                status,
                output: None,
                force: false,
            })
            .await?;
        tracing::info!(
            order_id = order.id,
            status,
            cascade = ?outcome.cascade,
            "Run finished; reported to ledger",
        );
        Ok(true)
    }
}
