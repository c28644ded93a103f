//! Shared fixtures for engine integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use sqlx::PgPool;
use tempfile::TempDir;

use cascade_backend::blob_store::LocalBlobStore;
use cascade_backend::registry::BackendRegistry;
use cascade_core::backend::{BackendError, ExecutionBackend, RunHandle, RunOutcome, RunStatus};
use cascade_core::template::RenderedTemplate;
use cascade_db::models::job::{CreateJob, Job};
use cascade_db::models::job_tag::JobTagInput;
use cascade_db::models::order::ReportOrder;
use cascade_db::repositories::{JobRepo, JobTagRepo};
use cascade_engine::{DispatchEngine, OrderLedger, TemplateService};

/// Run environment every fixture job targets.
pub const RUN_ENV: &str = "k8sm01";

pub const JOB_TEMPLATE: &str = r#"
apiVersion: batch/v1
kind: Job
metadata:
  name: placeholder
spec:
  template:
    spec:
      restartPolicy: Never
      containers:
        - name: main
          image: "${image}"
          args: ["--input", "${upstream_output}", "--order", "${order_name}"]
"#;

/// Backend that accepts every submission unless the run name starts with
/// one of the configured prefixes. The handle is the run name.
#[derive(Default)]
pub struct ScriptedBackend {
    reject: Mutex<Vec<String>>,
    submitted: Mutex<Vec<RenderedTemplate>>,
    statuses: Mutex<HashMap<String, RunStatus>>,
}

impl ScriptedBackend {
    pub fn reject_runs_starting_with(&self, prefix: &str) {
        self.reject.lock().unwrap().push(prefix.to_string());
    }

    pub fn accept_everything(&self) {
        self.reject.lock().unwrap().clear();
    }

    pub fn finish(&self, handle: &str, succeeded: bool) {
        let outcome = if succeeded { RunOutcome::Succeeded } else { RunOutcome::Failed };
        let status = RunStatus::finished(outcome);
        self.statuses.lock().unwrap().insert(handle.to_string(), status);
    }

    pub fn submitted(&self) -> Vec<RenderedTemplate> {
        self.submitted.lock().unwrap().clone()
    }

    pub fn submitted_names(&self) -> Vec<String> {
        self.submitted().into_iter().map(|r| r.run_name).collect()
    }
}

#[async_trait::async_trait]
impl ExecutionBackend for ScriptedBackend {
    fn kind(&self) -> &'static str {
        "scripted"
    }

    async fn submit(&self, rendered: &RenderedTemplate) -> Result<RunHandle, BackendError> {
        let rejected = self
            .reject
            .lock()
            .unwrap()
            .iter()
            .any(|p| rendered.run_name.starts_with(p.as_str()));
        if rejected {
            return Err(BackendError::Rejected {
                status: 403,
                message: "quota exceeded".to_string(),
            });
        }
        self.submitted.lock().unwrap().push(rendered.clone());
        Ok(RunHandle(rendered.run_name.clone()))
    }

    async fn poll(&self, handle: &RunHandle) -> Result<RunStatus, BackendError> {
        Ok(self
            .statuses
            .lock()
            .unwrap()
            .get(handle.as_str())
            .cloned()
            .unwrap_or_else(RunStatus::running))
    }
}

pub struct Harness {
    pub pool: PgPool,
    pub ledger: OrderLedger,
    pub engine: Arc<DispatchEngine>,
    pub templates: TemplateService,
    pub backend: Arc<ScriptedBackend>,
    _blobs: TempDir,
}

impl Harness {
    pub fn new(pool: PgPool) -> Self {
        Self::build(pool, None)
    }

    /// A harness whose engine treats pending attempts as abandoned after
    /// `after`.
    pub fn with_stale_submissions(pool: PgPool, after: Duration) -> Self {
        Self::build(pool, Some(after))
    }

    fn build(pool: PgPool, stale_after: Option<Duration>) -> Self {
        let blobs = tempfile::tempdir().unwrap();
        let templates = TemplateService::new(pool.clone(), Arc::new(LocalBlobStore::new(blobs.path())));

        let backend = Arc::new(ScriptedBackend::default());
        let mut registry = BackendRegistry::new();
        registry.register(RUN_ENV, backend.clone());

        let mut engine = DispatchEngine::new(pool.clone(), registry, templates.clone());
        if let Some(after) = stale_after {
            engine = engine.with_stale_submission_after(after);
        }
        let engine = Arc::new(engine);
        let ledger = OrderLedger::new(pool.clone(), engine.clone());

        Self {
            pool,
            ledger,
            engine,
            templates,
            backend,
            _blobs: blobs,
        }
    }

    /// Create a job with the standard template and an `image` tag.
    pub async fn job(&self, name: &str, parent_id: Option<i64>, seq: i32) -> Job {
        let job = self.bare_job(name, parent_id, seq, RUN_ENV).await;
        self.templates
            .upload(job.id, "job.yaml", JOB_TEMPLATE.as_bytes())
            .await
            .unwrap();
        JobTagRepo::replace_all(
            &self.pool,
            job.id,
            &[JobTagInput {
                name: "image".to_string(),
                value: format!("{name}:1"),
            }],
        )
        .await
        .unwrap();
        job
    }

    /// Create a job without a template or tags.
    pub async fn bare_job(&self, name: &str, parent_id: Option<i64>, seq: i32, run_env: &str) -> Job {
        JobRepo::create(
            &self.pool,
            &CreateJob {
                name: name.to_string(),
                description: None,
                run_env: run_env.to_string(),
                run_type: None,
                input_params: None,
                seq: Some(seq),
                is_enabled: None,
                parent_id,
            },
        )
        .await
        .unwrap()
    }
}

pub fn report(name: &str, job_id: i64, status: i16, force: bool) -> ReportOrder {
    ReportOrder {
        name: name.to_string(),
        job_id,
        description: None,
        status,
        output: Some(format!("s3://out/{name}")),
        force,
    }
}
