//! Execution template upload and resolution.

use std::sync::Arc;

use sqlx::PgPool;

use cascade_core::blob::BlobStore;
use cascade_core::error::CoreError;
use cascade_core::hashing::sha256_hex;
use cascade_core::template::{ExecutionManifest, MAX_TEMPLATE_BYTES};
use cascade_core::types::DbId;
use cascade_db::models::execution_template::{ExecutionTemplate, NewExecutionTemplate};
use cascade_db::repositories::{ExecutionTemplateRepo, JobRepo};

use crate::error::EngineError;

/// A job's active template, fetched and parsed.
#[derive(Debug, Clone)]
pub struct ResolvedTemplate {
    pub template: ExecutionTemplate,
    pub content: String,
    pub manifest: ExecutionManifest,
}

/// Stores templates in the blob store and tracks which one is active.
#[derive(Clone)]
pub struct TemplateService {
    pool: PgPool,
    blobs: Arc<dyn BlobStore>,
}

impl TemplateService {
    pub fn new(pool: PgPool, blobs: Arc<dyn BlobStore>) -> Self {
        Self { pool, blobs }
    }

    /// Validate and store a template, making it the job's active one.
    ///
    /// The content must be a UTF-8 YAML or JSON mapping. The previous
    /// active template is deactivated, not deleted.
    pub async fn upload(
        &self,
        job_id: DbId,
        file_name: &str,
        data: &[u8],
    ) -> Result<ExecutionTemplate, EngineError> {
        JobRepo::find_by_id(&self.pool, job_id)
            .await?
            .ok_or(CoreError::NotFound { entity: "Job", id: job_id })?;

        if data.len() > MAX_TEMPLATE_BYTES {
            return Err(CoreError::Validation(format!(
                "Execution template exceeds {MAX_TEMPLATE_BYTES} bytes"
            ))
            .into());
        }
        let content = std::str::from_utf8(data).map_err(|_| {
            CoreError::Validation("Execution template must be UTF-8 text".to_string())
        })?;
        ExecutionManifest::parse(content)?;

        let extension = std::path::Path::new(file_name)
            .extension()
            .and_then(|e| e.to_str());
        let storage_ref = self.blobs.put(data, extension).await?;

        let template = ExecutionTemplateRepo::create_active(
            &self.pool,
            &NewExecutionTemplate {
                job_id,
                file_name: file_name.to_string(),
                storage_ref,
                content_sha256: sha256_hex(data),
                size_bytes: data.len() as i64,
            },
        )
        .await?;

        tracing::info!(
            job_id,
            template_id = template.id,
            storage_ref = %template.storage_ref,
            "Execution template activated",
        );
        Ok(template)
    }

    /// The job's active template, or `None` if it has never had one.
    ///
    /// More than one active template, or content that no longer matches its
    /// recorded hash, is a data-integrity failure.
    pub async fn resolve_active(&self, job_id: DbId) -> Result<Option<ResolvedTemplate>, EngineError> {
        let mut active = ExecutionTemplateRepo::list_active(&self.pool, job_id).await?;
        if active.len() > 1 {
            return Err(CoreError::Internal(format!(
                "Job {job_id} has {} active execution templates",
                active.len()
            ))
            .into());
        }
        let Some(template) = active.pop() else {
            return Ok(None);
        };

        let data = self.blobs.get(&template.storage_ref).await?;
        if sha256_hex(&data) != template.content_sha256 {
            return Err(CoreError::Internal(format!(
                "Execution template {} content does not match its checksum",
                template.id
            ))
            .into());
        }
        let content = String::from_utf8(data).map_err(|_| {
            CoreError::Internal(format!("Execution template {} is not UTF-8", template.id))
        })?;
        let manifest = ExecutionManifest::parse(&content)?;

        Ok(Some(ResolvedTemplate {
            template,
            content,
            manifest,
        }))
    }

    /// Upload history of a job, newest first.
    pub async fn list(&self, job_id: DbId) -> Result<Vec<ExecutionTemplate>, EngineError> {
        Ok(ExecutionTemplateRepo::list_for_job(&self.pool, job_id).await?)
    }
}
