//! Content-addressed blob store on the local filesystem.
//!
//! Objects live at `<root>/<first two hex chars>/<sha256>[.ext]`; the
//! relative path is the storage reference. Storing identical bytes twice
//! yields the same reference.

use std::path::{Path, PathBuf};

use cascade_core::blob::{BlobError, BlobStore};
use cascade_core::hashing::sha256_hex;

/// Filesystem-backed [`BlobStore`].
#[derive(Debug, Clone)]
pub struct LocalBlobStore {
    root: PathBuf,
}

impl LocalBlobStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Resolve a storage reference to a path inside the root.
    fn resolve(&self, storage_ref: &str) -> Result<PathBuf, BlobError> {
        let valid = !storage_ref.is_empty()
            && storage_ref.split('/').count() == 2
            && storage_ref.split('/').all(|part| {
                !part.is_empty()
                    && !part.starts_with('.')
                    && part
                        .chars()
                        .all(|c| c.is_ascii_alphanumeric() || c == '.' || c == '-' || c == '_')
            });
        if !valid {
            return Err(BlobError::InvalidReference(storage_ref.to_string()));
        }
        Ok(self.root.join(storage_ref))
    }
}

/// Keep only a short alphanumeric extension.
fn clean_extension(extension: Option<&str>) -> Option<String> {
    extension
        .map(|e| e.trim_start_matches('.').to_ascii_lowercase())
        .filter(|e| !e.is_empty() && e.len() <= 10 && e.chars().all(|c| c.is_ascii_alphanumeric()))
}

#[async_trait::async_trait]
impl BlobStore for LocalBlobStore {
    async fn put(&self, data: &[u8], extension: Option<&str>) -> Result<String, BlobError> {
        let hash = sha256_hex(data);
        let file_name = match clean_extension(extension) {
            Some(ext) => format!("{hash}.{ext}"),
            None => hash.clone(),
        };
        let storage_ref = format!("{}/{file_name}", &hash[..2]);
        let path = self.root.join(&storage_ref);

        if tokio::fs::try_exists(&path).await? {
            return Ok(storage_ref);
        }

        let dir = self.root.join(&hash[..2]);
        tokio::fs::create_dir_all(&dir).await?;

        // Readers must never observe a partial file.
        let tmp = dir.join(format!(".{file_name}.tmp"));
        tokio::fs::write(&tmp, data).await?;
        tokio::fs::rename(&tmp, &path).await?;

        tracing::debug!(storage_ref = %storage_ref, size = data.len(), "Blob stored");
        Ok(storage_ref)
    }

    async fn get(&self, storage_ref: &str) -> Result<Vec<u8>, BlobError> {
        let path = self.resolve(storage_ref)?;
        match tokio::fs::read(&path).await {
            Ok(data) => Ok(data),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(BlobError::NotFound(storage_ref.to_string()))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;

    use super::*;

    #[tokio::test]
    async fn put_then_get_round_trips() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());

        let storage_ref = store.put(b"kind: Job\n", Some("yaml")).await.unwrap();
        assert!(storage_ref.ends_with(".yaml"));
        assert_eq!(&storage_ref[..2], &storage_ref[3..5]);
        assert_eq!(store.get(&storage_ref).await.unwrap(), b"kind: Job\n");
    }

    #[tokio::test]
    async fn identical_content_shares_a_reference() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());

        let a = store.put(b"same", Some("json")).await.unwrap();
        let b = store.put(b"same", Some(".JSON")).await.unwrap();
        assert_eq!(a, b);
    }

    #[tokio::test]
    async fn missing_object_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());
        let missing = format!("ab/{}", "ab".repeat(32));
        assert_matches!(store.get(&missing).await, Err(BlobError::NotFound(_)));
    }

    #[tokio::test]
    async fn rejects_references_escaping_the_root() {
        let dir = tempfile::tempdir().unwrap();
        let store = LocalBlobStore::new(dir.path());
        for bad in ["../etc/passwd", "/etc/passwd", "ab", "ab/../../x", "ab/.hidden", ""] {
            assert_matches!(store.get(bad).await, Err(BlobError::InvalidReference(_)), "{bad}");
        }
    }

    #[test]
    fn extension_is_sanitized() {
        assert_eq!(clean_extension(Some(".YML")).as_deref(), Some("yml"));
        assert_eq!(clean_extension(Some("tar/gz")), None);
        assert_eq!(clean_extension(None), None);
    }
}
