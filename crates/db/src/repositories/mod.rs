//! Repository layer.
//!
//! Each repository is a zero-sized struct providing async methods that
//! accept `&PgPool` as the first argument. Ledger writes that must commit
//! together take an open transaction instead.

pub mod dispatch_attempt_repo;
pub mod execution_template_repo;
pub mod job_repo;
pub mod job_tag_repo;
pub mod order_repo;

pub use dispatch_attempt_repo::DispatchAttemptRepo;
pub use execution_template_repo::ExecutionTemplateRepo;
pub use job_repo::JobRepo;
pub use job_tag_repo::JobTagRepo;
pub use order_repo::OrderRepo;

/// Maximum page size for listings.
pub(crate) const MAX_LIMIT: i64 = 100;

/// Default page size for listings.
pub(crate) const DEFAULT_LIMIT: i64 = 50;

/// Clamp caller-supplied paging parameters.
pub(crate) fn page(limit: Option<i64>, offset: Option<i64>) -> (i64, i64) {
    (
        limit.unwrap_or(DEFAULT_LIMIT).clamp(1, MAX_LIMIT),
        offset.unwrap_or(0).max(0),
    )
}
