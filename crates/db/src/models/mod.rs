//! Domain model structs and DTOs.
//!
//! Each submodule contains:
//! - A `FromRow` + `Serialize` entity struct matching the database row
//! - `Deserialize` request DTOs for inserts and patches

pub mod dispatch_attempt;
pub mod execution_template;
pub mod job;
pub mod job_tag;
pub mod order;
pub mod status;
