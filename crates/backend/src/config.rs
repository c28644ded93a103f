use std::path::PathBuf;

/// One execution target: a named cluster API endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExecutionTarget {
    /// Value of `jobs.run_env` that selects this target.
    pub name: String,
    /// Base URL of the cluster API server.
    pub api_url: String,
}

/// Execution backend and blob store configuration.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    pub targets: Vec<ExecutionTarget>,
    /// Namespace runs are created in unless the template names one.
    pub namespace: String,
    /// Bearer token sent to every target, if any.
    pub token: Option<String>,
    /// Per-request HTTP timeout in seconds.
    pub timeout_secs: u64,
    /// Directory holding uploaded templates.
    pub blob_root: PathBuf,
}

impl BackendConfig {
    /// Load configuration from environment variables with defaults.
    ///
    /// | Env Var                  | Default            |
    /// |--------------------------|--------------------|
    /// | `EXECUTION_TARGETS`      | *(none)*           |
    /// | `EXECUTION_NAMESPACE`    | `default`          |
    /// | `EXECUTION_TOKEN`        | *(none)*           |
    /// | `EXECUTION_TIMEOUT_SECS` | `30`               |
    /// | `BLOB_ROOT`              | `./storage/blobs`  |
    ///
    /// `EXECUTION_TARGETS` is a comma-separated list of `name=url` pairs,
    /// e.g. `k8sm01=https://10.0.0.1:6443,k8sm02=https://10.0.0.2:6443`.
    pub fn from_env() -> Self {
        let targets = parse_targets(&std::env::var("EXECUTION_TARGETS").unwrap_or_default())
            .unwrap_or_else(|e| panic!("EXECUTION_TARGETS is invalid: {e}"));

        let namespace = std::env::var("EXECUTION_NAMESPACE").unwrap_or_else(|_| "default".into());

        let token = std::env::var("EXECUTION_TOKEN")
            .ok()
            .filter(|t| !t.trim().is_empty());

        let timeout_secs: u64 = std::env::var("EXECUTION_TIMEOUT_SECS")
            .unwrap_or_else(|_| "30".into())
            .parse()
            .expect("EXECUTION_TIMEOUT_SECS must be a valid u64");

        let blob_root = std::env::var("BLOB_ROOT")
            .unwrap_or_else(|_| "./storage/blobs".into())
            .into();

        Self {
            targets,
            namespace,
            token,
            timeout_secs,
            blob_root,
        }
    }
}

/// Parse a `name=url[,name=url...]` target list. Blank input yields no targets.
pub fn parse_targets(raw: &str) -> Result<Vec<ExecutionTarget>, String> {
    let mut targets: Vec<ExecutionTarget> = Vec::new();
    for entry in raw.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let Some((name, url)) = entry.split_once('=') else {
            return Err(format!("entry '{entry}' is not of the form name=url"));
        };
        let (name, url) = (name.trim(), url.trim().trim_end_matches('/'));
        if name.is_empty() || url.is_empty() {
            return Err(format!("entry '{entry}' has an empty name or url"));
        }
        if targets.iter().any(|t| t.name == name) {
            return Err(format!("target '{name}' is listed twice"));
        }
        targets.push(ExecutionTarget {
            name: name.to_string(),
            api_url: url.to_string(),
        });
    }
    Ok(targets)
}
