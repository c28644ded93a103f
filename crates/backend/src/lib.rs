//! Execution backend adapters and the local blob store.
//!
//! - [`kubernetes::KubeJobBackend`] submits rendered templates to the
//!   Kubernetes `batch/v1` Jobs API and polls their status.
//! - [`registry::BackendRegistry`] maps a job's `run_env` to a backend.
//! - [`blob_store::LocalBlobStore`] stores uploaded templates on disk,
//!   addressed by content hash.

pub mod blob_store;
pub mod config;
pub mod kubernetes;
pub mod registry;
