//! Kubernetes `batch/v1` Job backend.
//!
//! Submits a rendered manifest with `POST /apis/batch/v1/namespaces/{ns}/jobs`
//! and polls `GET .../jobs/{name}`. The run handle is `{namespace}/{name}` of
//! the created Job, so a poll reaches the namespace the manifest chose.

use chrono::{DateTime, Utc};
use serde_json::Value;

use cascade_core::backend::{BackendError, ExecutionBackend, RunHandle, RunOutcome, RunStatus};
use cascade_core::template::RenderedTemplate;

/// HTTP client for the Jobs API of one cluster.
pub struct KubeJobBackend {
    client: reqwest::Client,
    api_url: String,
    namespace: String,
    token: Option<String>,
}

impl KubeJobBackend {
    /// Create a backend reusing an existing [`reqwest::Client`] so targets
    /// share one connection pool.
    ///
    /// * `api_url` - API server base URL, e.g. `https://10.0.0.1:6443`.
    pub fn with_client(
        client: reqwest::Client,
        api_url: String,
        namespace: String,
        token: Option<String>,
    ) -> Self {
        Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            namespace,
            token,
        }
    }

    fn jobs_url(&self, namespace: &str) -> String {
        format!("{}/apis/batch/v1/namespaces/{namespace}/jobs", self.api_url)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    /// The namespace a manifest targets: its own `metadata.namespace`, or
    /// the configured default.
    fn namespace_of<'a>(&'a self, manifest: &'a Value) -> &'a str {
        manifest["metadata"]["namespace"]
            .as_str()
            .filter(|ns| !ns.is_empty())
            .unwrap_or(self.namespace.as_str())
    }

    /// URL of the Job a run handle points at. Handles without a namespace
    /// resolve against the configured default.
    fn job_url(&self, handle: &RunHandle) -> String {
        let (namespace, name) = handle
            .as_str()
            .split_once('/')
            .unwrap_or((self.namespace.as_str(), handle.as_str()));
        format!("{}/{name}", self.jobs_url(namespace))
    }

    // ---- private helpers ----

    /// Ensure the response has a success status code, turning API errors
    /// into [`BackendError`]s.
    async fn ensure_success(response: reqwest::Response) -> Result<reqwest::Response, BackendError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response
            .text()
            .await
            .unwrap_or_else(|_| "<unreadable body>".to_string());
        Err(BackendError::Rejected {
            status: status.as_u16(),
            message: status_message(&body),
        })
    }

    /// Parse a successful JSON response body.
    async fn parse_response(response: reqwest::Response) -> Result<Value, BackendError> {
        let response = Self::ensure_success(response).await?;
        response
            .json::<Value>()
            .await
            .map_err(|e| BackendError::InvalidResponse(e.to_string()))
    }
}

#[async_trait::async_trait]
impl ExecutionBackend for KubeJobBackend {
    fn kind(&self) -> &'static str {
        "kubernetes"
    }

    async fn submit(&self, rendered: &RenderedTemplate) -> Result<RunHandle, BackendError> {
        let namespace = self.namespace_of(&rendered.manifest);
        let url = self.jobs_url(namespace);
        let response = self
            .authorize(self.client.post(url))
            .json(&rendered.manifest)
            .send()
            .await
            .map_err(unavailable)?;

        let created = Self::parse_response(response).await?;
        let handle = RunHandle(format!("{namespace}/{}", created_job_name(&created)?));
        tracing::debug!(run_name = %rendered.run_name, handle = %handle, "Kubernetes job created");
        Ok(handle)
    }

    async fn poll(&self, handle: &RunHandle) -> Result<RunStatus, BackendError> {
        let url = self.job_url(handle);
        let response = self
            .authorize(self.client.get(url))
            .send()
            .await
            .map_err(unavailable)?;

        if response.status() == reqwest::StatusCode::NOT_FOUND {
            return Err(BackendError::UnknownRun(handle.to_string()));
        }
        let job = Self::parse_response(response).await?;
        job_status(&job)
    }
}

fn unavailable(e: reqwest::Error) -> BackendError {
    BackendError::Unavailable(e.to_string())
}

/// Extract `metadata.name` from a created Job object.
fn created_job_name(job: &Value) -> Result<&str, BackendError> {
    job["metadata"]["name"]
        .as_str()
        .filter(|name| !name.is_empty())
        .ok_or_else(|| BackendError::InvalidResponse("created job has no metadata.name".into()))
}

/// The outcome recorded in a Job's `status.conditions`, if it finished.
///
/// The Job controller sets `Complete` or `Failed` once retries are settled;
/// until then failed pods are only counted.
fn job_outcome(status: &Value) -> Option<RunOutcome> {
    let conditions = status["conditions"].as_array()?;
    conditions
        .iter()
        .filter(|c| c["status"].as_str() == Some("True"))
        .find_map(|c| match c["type"].as_str() {
            Some("Complete") => Some(RunOutcome::Succeeded),
            Some("Failed") => Some(RunOutcome::Failed),
            _ => None,
        })
}

/// Read the `status` block of a Job object.
fn job_status(job: &Value) -> Result<RunStatus, BackendError> {
    if !job.is_object() {
        return Err(BackendError::InvalidResponse("job is not an object".into()));
    }
    let status = &job["status"];
    let count = |field: &str| status[field].as_i64().unwrap_or(0) as i32;

    let completion_time = match status["completionTime"].as_str() {
        Some(raw) => Some(
            DateTime::parse_from_rfc3339(raw)
                .map_err(|e| BackendError::InvalidResponse(format!("bad completionTime: {e}")))?
                .with_timezone(&Utc),
        ),
        None => None,
    };

    Ok(RunStatus {
        active: count("active"),
        succeeded: count("succeeded"),
        failed: count("failed"),
        outcome: job_outcome(status),
        completion_time,
    })
}

/// The human-readable message of a Kubernetes `Status` error body, or the
/// raw body if it is not one.
fn status_message(body: &str) -> String {
    serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["message"].as_str().map(str::to_string))
        .unwrap_or_else(|| body.to_string())
}

#[cfg(test)]
mod tests {
    use assert_matches::assert_matches;
    use serde_json::json;

    use super::*;

    fn backend() -> KubeJobBackend {
        KubeJobBackend::with_client(
            reqwest::Client::new(),
            "https://cluster:6443/".into(),
            "batch".into(),
            None,
        )
    }

    #[test]
    fn builds_jobs_url() {
        assert_eq!(
            backend().jobs_url("batch"),
            "https://cluster:6443/apis/batch/v1/namespaces/batch/jobs"
        );
    }

    #[test]
    fn manifest_namespace_wins() {
        let b = backend();
        let own = json!({"metadata": {"namespace": "etl"}});
        assert_eq!(b.namespace_of(&own), "etl");
        let none = json!({"metadata": {"name": "x"}});
        assert_eq!(b.namespace_of(&none), "batch");
    }

    #[test]
    fn polls_the_namespace_in_the_handle() {
        let b = backend();
        assert_eq!(
            b.job_url(&RunHandle("etl/nightly-1".into())),
            "https://cluster:6443/apis/batch/v1/namespaces/etl/jobs/nightly-1"
        );
        assert_eq!(
            b.job_url(&RunHandle("nightly-1".into())),
            "https://cluster:6443/apis/batch/v1/namespaces/batch/jobs/nightly-1"
        );
    }

    #[test]
    fn reads_created_job_name() {
        let created = json!({"kind": "Job", "metadata": {"name": "nightly-1"}});
        assert_eq!(created_job_name(&created).unwrap(), "nightly-1");
        assert_matches!(
            created_job_name(&json!({"kind": "Job"})),
            Err(BackendError::InvalidResponse(_))
        );
    }

    #[test]
    fn reads_job_status() {
        let running = json!({"status": {"active": 1}});
        let status = job_status(&running).unwrap();
        assert!(!status.is_terminal());

        let done = json!({"status": {
            "succeeded": 1,
            "completionTime": "2026-10-17T08:30:00Z",
            "conditions": [{"type": "Complete", "status": "True"}]
        }});
        let status = job_status(&done).unwrap();
        assert!(status.is_success());
        assert!(status.completion_time.is_some());

        let failed = json!({"status": {
            "failed": 7,
            "conditions": [{"type": "Failed", "status": "True", "reason": "BackoffLimitExceeded"}]
        }});
        let status = job_status(&failed).unwrap();
        assert_eq!(status.outcome, Some(RunOutcome::Failed));
        assert!(!status.is_success());
    }

    #[test]
    fn retried_job_that_completes_is_a_success() {
        let job = json!({"status": {
            "succeeded": 1,
            "failed": 1,
            "conditions": [{"type": "Complete", "status": "True"}]
        }});
        let status = job_status(&job).unwrap();
        assert!(status.is_terminal());
        assert!(status.is_success());
    }

    #[test]
    fn failed_pod_between_retries_is_not_terminal() {
        let job = json!({"spec": {"backoffLimit": 6}, "status": {"failed": 1}});
        assert!(!job_status(&job).unwrap().is_terminal());

        let suspended = json!({"status": {
            "failed": 1,
            "conditions": [{"type": "Suspended", "status": "True"}, {"type": "Failed", "status": "False"}]
        }});
        assert!(!job_status(&suspended).unwrap().is_terminal());
    }

    #[test]
    fn extracts_status_error_message() {
        let body = r#"{"kind":"Status","status":"Failure","message":"jobs.batch \"x\" already exists","code":409}"#;
        assert_eq!(status_message(body), "jobs.batch \"x\" already exists");
        assert_eq!(status_message("gateway timeout"), "gateway timeout");
    }
}
