//! Domain rules for the job cascade engine.
//!
//! This crate has no internal dependencies: it holds the order state
//! machine, naming conventions, template rendering and the contracts the
//! execution backend and blob store adapters implement.

pub mod backend;
pub mod blob;
pub mod dispatch;
pub mod error;
pub mod hashing;
pub mod naming;
pub mod order_lifecycle;
pub mod tags;
pub mod template;
pub mod types;
