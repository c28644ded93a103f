//! Fan-out report types.
//!
//! A fan-out launches every direct child of a completed order's job. Each
//! child is dispatched independently, so the result is an aggregate of
//! per-child outcomes rather than a single success/failure.

use serde::Serialize;

use crate::backend::RunHandle;
use crate::types::DbId;

/// A child whose order was created and accepted by the execution backend.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchedChild {
    pub job_id: DbId,
    pub job_name: String,
    pub order_id: DbId,
    pub order_name: String,
    pub run_handle: RunHandle,
}

/// Why a child was not dispatched although nothing went wrong.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SkipReason {
    /// An order for this child and generation already exists.
    AlreadyDispatched,
    /// The child job is paused.
    JobDisabled,
}

/// A child that was intentionally left alone.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SkippedChild {
    pub job_id: DbId,
    pub job_name: String,
    pub order_id: Option<DbId>,
    pub reason: SkipReason,
}

/// A child whose dispatch failed; retryable on its own.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChildFailure {
    pub job_id: DbId,
    pub job_name: String,
    pub order_id: Option<DbId>,
    pub message: String,
}

/// Outcome of dispatching one child.
#[derive(Debug, Clone, PartialEq)]
pub enum ChildOutcome {
    Dispatched(DispatchedChild),
    Skipped(SkippedChild),
    Failed(ChildFailure),
}

/// Aggregated result of one fan-out.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DispatchReport {
    pub upstream_order_id: DbId,
    /// Fan-out generation of the upstream order (1 for the first).
    pub generation: i32,
    pub dispatched: Vec<DispatchedChild>,
    pub skipped: Vec<SkippedChild>,
    pub failures: Vec<ChildFailure>,
}

impl DispatchReport {
    pub fn new(upstream_order_id: DbId, generation: i32) -> Self {
        Self {
            upstream_order_id,
            generation,
            dispatched: Vec::new(),
            skipped: Vec::new(),
            failures: Vec::new(),
        }
    }

    /// Fold one child's outcome into the report, preserving child order.
    pub fn record(&mut self, outcome: ChildOutcome) {
        match outcome {
            ChildOutcome::Dispatched(c) => self.dispatched.push(c),
            ChildOutcome::Skipped(c) => self.skipped.push(c),
            ChildOutcome::Failed(c) => self.failures.push(c),
        }
    }

    /// The job had no children to consider.
    pub fn is_empty(&self) -> bool {
        self.dispatched.is_empty() && self.skipped.is_empty() && self.failures.is_empty()
    }

    /// Some children were dispatched and some failed.
    pub fn is_partial_failure(&self) -> bool {
        !self.dispatched.is_empty() && !self.failures.is_empty()
    }

    /// Run handles of every dispatched child, in dispatch order.
    pub fn run_handles(&self) -> Vec<&RunHandle> {
        self.dispatched.iter().map(|c| &c.run_handle).collect()
    }

    /// Failure messages of every failed child, in dispatch order.
    pub fn failure_messages(&self) -> Vec<&str> {
        self.failures.iter().map(|c| c.message.as_str()).collect()
    }
}

/// What a status report did to the cascade.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CascadeOutcome {
    /// The order was recorded but is not complete; nothing was launched.
    NotComplete,
    /// The order already fanned out and the report was not forced.
    AlreadyDispatched,
    /// The order fanned out to its children.
    Dispatched(DispatchReport),
}
