use cascade_core::blob::BlobError;
use cascade_core::error::CoreError;
use cascade_core::types::DbId;

/// Errors from ledger and dispatch operations.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// A domain rule rejected the request (not found, conflict, validation).
    #[error(transparent)]
    Core(#[from] CoreError),

    /// A database error from sqlx.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// The blob store failed to return template content.
    #[error(transparent)]
    Blob(#[from] BlobError),

    /// A single-order submission (launch or resubmit) was refused by the
    /// execution backend. The attempt has been recorded.
    #[error("Submission of order {order_id} failed: {message}")]
    Submission { order_id: DbId, message: String },
}

impl EngineError {
    /// Whether the error comes from the database rather than the request.
    pub fn is_persistence(&self) -> bool {
        matches!(self, Self::Database(_))
    }
}
