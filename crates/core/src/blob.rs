//! Blob store contract for uploaded execution templates.

/// Errors from a blob store.
#[derive(Debug, thiserror::Error)]
pub enum BlobError {
    /// No object is stored under the reference.
    #[error("Blob not found: {0}")]
    NotFound(String),

    /// The reference is malformed or escapes the store.
    #[error("Invalid blob reference: {0}")]
    InvalidReference(String),

    /// An I/O error occurred while reading or writing an object.
    #[error("Blob store I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Content store holding execution templates and other uploaded artifacts.
///
/// From the dispatch engine's perspective the store is read-only; only the
/// template upload path calls [`BlobStore::put`].
#[async_trait::async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `data` and return the reference it can be fetched by.
    ///
    /// `extension` (without the dot) is kept on the stored object for
    /// operator convenience.
    async fn put(&self, data: &[u8], extension: Option<&str>) -> Result<String, BlobError>;

    /// Fetch the bytes stored under `storage_ref`.
    async fn get(&self, storage_ref: &str) -> Result<Vec<u8>, BlobError>;
}
