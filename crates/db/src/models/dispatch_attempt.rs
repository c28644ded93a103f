//! Dispatch attempt rows: one per submission of an order.

use serde::Serialize;
use sqlx::FromRow;

use cascade_core::types::{DbId, Timestamp};

use super::status::StatusId;

/// A row from the `dispatch_attempts` table.
#[derive(Debug, Clone, FromRow, Serialize)]
pub struct DispatchAttempt {
    pub id: DbId,
    pub order_id: DbId,
    pub attempt: i32,
    pub run_name: String,
    /// See [`super::status::AttemptOutcome`].
    pub outcome_id: StatusId,
    pub run_handle: Option<String>,
    pub error_message: Option<String>,
    pub created_at: Timestamp,
}
