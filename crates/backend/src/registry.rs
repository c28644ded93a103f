//! Execution targets keyed by `run_env`.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use cascade_core::backend::{BackendError, ExecutionBackend};

use crate::config::BackendConfig;
use crate::kubernetes::KubeJobBackend;

/// The set of execution backends a deployment can dispatch to.
#[derive(Clone, Default)]
pub struct BackendRegistry {
    backends: BTreeMap<String, Arc<dyn ExecutionBackend>>,
}

impl BackendRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build one Kubernetes backend per configured target, sharing a single
    /// HTTP client.
    pub fn from_config(config: &BackendConfig) -> Result<Self, BackendError> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_secs))
            .build()
            .map_err(|e| BackendError::Unavailable(format!("failed to build HTTP client: {e}")))?;

        let mut registry = Self::new();
        for target in &config.targets {
            let backend = KubeJobBackend::with_client(
                client.clone(),
                target.api_url.clone(),
                config.namespace.clone(),
                config.token.clone(),
            );
            registry.register(&target.name, Arc::new(backend));
        }
        Ok(registry)
    }

    /// Register (or replace) the backend for `run_env`.
    pub fn register(&mut self, run_env: &str, backend: Arc<dyn ExecutionBackend>) {
        self.backends.insert(run_env.to_string(), backend);
    }

    /// The backend for `run_env`, if that target is configured.
    pub fn get(&self, run_env: &str) -> Option<Arc<dyn ExecutionBackend>> {
        self.backends.get(run_env).cloned()
    }

    /// Configured target names, sorted.
    pub fn targets(&self) -> Vec<&str> {
        self.backends.keys().map(String::as_str).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.backends.is_empty()
    }
}

impl std::fmt::Debug for BackendRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BackendRegistry")
            .field("targets", &self.targets())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::ExecutionTarget;

    fn config(targets: &[(&str, &str)]) -> BackendConfig {
        BackendConfig {
            targets: targets
                .iter()
                .map(|(name, url)| ExecutionTarget {
                    name: name.to_string(),
                    api_url: url.to_string(),
                })
                .collect(),
            namespace: "default".into(),
            token: None,
            timeout_secs: 5,
            blob_root: "/tmp".into(),
        }
    }

    #[test]
    fn registers_each_target() {
        let registry =
            BackendRegistry::from_config(&config(&[("k8sm02", "https://b"), ("k8sm01", "https://a")]))
                .unwrap();
        assert_eq!(registry.targets(), vec!["k8sm01", "k8sm02"]);
        assert_eq!(registry.get("k8sm01").map(|b| b.kind()), Some("kubernetes"));
        assert!(registry.get("local").is_none());
    }

    #[test]
    fn empty_config_yields_empty_registry() {
        assert!(BackendRegistry::from_config(&config(&[])).unwrap().is_empty());
    }
}
