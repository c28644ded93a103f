//! Order status constants and state machine.
//!
//! This module lives in `core` (zero internal deps) so the ledger, the API
//! validation layer and the completion watcher share one definition of
//! which status reports are legal.
//!
//! Status values are part of the wire format: `0` = failed, `1` = running,
//! `2` = complete.

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Status constants
// ---------------------------------------------------------------------------

/// The run ended unsuccessfully. Terminal.
pub const STATUS_FAILED: i16 = 0;

/// The run is in progress. Initial state of every order.
pub const STATUS_RUNNING: i16 = 1;

/// The run ended successfully. Terminal; the only state that cascades.
pub const STATUS_COMPLETE: i16 = 2;

/// Every status value accepted on the wire.
pub const VALID_STATUSES: &[i16] = &[STATUS_FAILED, STATUS_RUNNING, STATUS_COMPLETE];

/// Validate that `status` is one of the known order statuses.
pub fn validate_status(status: i16) -> Result<(), CoreError> {
    if VALID_STATUSES.contains(&status) {
        Ok(())
    } else {
        Err(CoreError::Validation(format!(
            "Invalid order status {status}. Must be one of: {VALID_STATUSES:?}"
        )))
    }
}

/// Whether no further transition is defined out of `status`.
pub fn is_terminal(status: i16) -> bool {
    status == STATUS_FAILED || status == STATUS_COMPLETE
}

/// Human-readable name for a status value (for logs and error messages).
pub fn status_name(status: i16) -> &'static str {
    match status {
        STATUS_FAILED => "Failed",
        STATUS_RUNNING => "Running",
        STATUS_COMPLETE => "Complete",
        _ => "Unknown",
    }
}

// ---------------------------------------------------------------------------
// State machine
// ---------------------------------------------------------------------------

pub mod state_machine {
    use super::{is_terminal, status_name, STATUS_RUNNING};
    use crate::error::CoreError;

    /// Check whether reporting `to` on an order currently in `from` is legal.
    ///
    /// Re-reporting the current status is always allowed (retried
    /// notifications). A running order may move anywhere. A terminal order
    /// may only change status when `force` is set.
    pub fn can_transition(from: i16, to: i16, force: bool) -> bool {
        if from == to || from == STATUS_RUNNING {
            return true;
        }
        !is_terminal(from) || force
    }

    /// Validate a reported transition, returning `Conflict` for illegal ones.
    pub fn validate_transition(from: i16, to: i16, force: bool) -> Result<(), CoreError> {
        if can_transition(from, to, force) {
            Ok(())
        } else {
            Err(CoreError::Conflict(format!(
                "Order is already {} ({from}) and cannot move to {} ({to}) without force",
                status_name(from),
                status_name(to),
            )))
        }
    }
}

/// Decide whether a report should fan out to the order's children.
///
/// Fan-out happens only for a `Complete` report, and then only when the
/// order has never fanned out before or the caller forces it.
pub fn should_cascade(reported_status: i16, run_times: i32, force: bool) -> bool {
    reported_status == STATUS_COMPLETE && (force || run_times == 0)
}
