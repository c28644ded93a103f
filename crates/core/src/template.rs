//! Execution template parsing and parameter rendering.
//!
//! An execution template is a YAML or JSON mapping (typically a Kubernetes
//! `batch/v1` Job manifest) stored in the blob store. Before submission it is
//! rendered: every `${name}` placeholder inside a string scalar is replaced
//! with a launch parameter, and `metadata.name` is set to the run name.
//! `$${name}` renders as a literal `${name}`.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::LazyLock;

use regex::{Captures, Regex};
use serde::Serialize;
use serde_json::Value;

use crate::error::CoreError;

// ---------------------------------------------------------------------------
// Constants
// ---------------------------------------------------------------------------

/// Built-in parameter carrying the upstream order's output.
pub const PARAM_UPSTREAM_OUTPUT: &str = "upstream_output";

/// Built-in parameter carrying the name of the order being submitted.
pub const PARAM_ORDER_NAME: &str = "order_name";

/// Built-in parameter carrying the backend run name.
pub const PARAM_RUN_NAME: &str = "run_name";

/// Maximum accepted template size in bytes.
pub const MAX_TEMPLATE_BYTES: usize = 1024 * 1024;

/// Regex pattern matching `${name}` placeholders (and `$${name}` escapes).
const PLACEHOLDER_PATTERN: &str = r"\$(\$?)\{([A-Za-z_][A-Za-z0-9_.\-]*)\}";

/// Compiled placeholder regex.
static PLACEHOLDER_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(PLACEHOLDER_PATTERN).expect("valid regex"));

/// Anchored identifier regex shared with tag-name validation.
static PARAMETER_NAME_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_.\-]*$").expect("valid regex"));

/// Whether `name` can be referenced as a `${name}` placeholder.
pub fn is_parameter_name(name: &str) -> bool {
    PARAMETER_NAME_RE.is_match(name)
}

// ---------------------------------------------------------------------------
// Parameters
// ---------------------------------------------------------------------------

/// Launch parameters for one submission.
///
/// Built from the job's tags plus the built-in parameters. Built-ins are
/// inserted last and win over a tag of the same name.
#[derive(Debug, Clone, Default)]
pub struct TemplateParams {
    values: BTreeMap<String, String>,
}

impl TemplateParams {
    /// Start from the job's tag set.
    pub fn from_tags<I, K, V>(tags: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            values: tags
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    /// Add the built-in parameters for a submission.
    pub fn with_builtins(mut self, order_name: &str, run_name: &str, upstream_output: &str) -> Self {
        self.values
            .insert(PARAM_ORDER_NAME.to_string(), order_name.to_string());
        self.values
            .insert(PARAM_RUN_NAME.to_string(), run_name.to_string());
        self.values
            .insert(PARAM_UPSTREAM_OUTPUT.to_string(), upstream_output.to_string());
        self
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.values.get(name).map(String::as_str)
    }
}

// ---------------------------------------------------------------------------
// Manifest
// ---------------------------------------------------------------------------

/// A parsed, validated execution template ready for rendering.
#[derive(Debug, Clone, PartialEq)]
pub struct ExecutionManifest {
    document: Value,
}

/// A manifest after parameter substitution, ready for submission.
#[derive(Debug, Clone, Serialize)]
pub struct RenderedTemplate {
    /// Name the backend run is created under.
    pub run_name: String,
    /// Fully rendered manifest body.
    pub manifest: Value,
}

impl ExecutionManifest {
    /// Parse template content. JSON is accepted as a subset of YAML.
    ///
    /// The document must be a non-empty mapping.
    pub fn parse(content: &str) -> Result<Self, CoreError> {
        if content.len() > MAX_TEMPLATE_BYTES {
            return Err(CoreError::Validation(format!(
                "Execution template exceeds {MAX_TEMPLATE_BYTES} bytes"
            )));
        }
        let document: Value = serde_yaml::from_str(content).map_err(|e| {
            CoreError::Validation(format!("Execution template is not valid YAML/JSON: {e}"))
        })?;
        match &document {
            Value::Object(map) if !map.is_empty() => Ok(Self { document }),
            _ => Err(CoreError::Validation(
                "Execution template must be a non-empty mapping".to_string(),
            )),
        }
    }

    /// The parsed document.
    pub fn document(&self) -> &Value {
        &self.document
    }

    /// Every placeholder name referenced by the template, sorted.
    pub fn parameters(&self) -> BTreeSet<String> {
        let mut names = BTreeSet::new();
        visit_strings(&self.document, &mut |s| {
            for caps in PLACEHOLDER_RE.captures_iter(s) {
                if caps[1].is_empty() {
                    names.insert(caps[2].to_string());
                }
            }
        });
        names
    }

    /// Substitute `params` and stamp `metadata.name = run_name`.
    ///
    /// Fails with `Validation` listing every placeholder that has no value.
    pub fn render(&self, params: &TemplateParams, run_name: &str) -> Result<RenderedTemplate, CoreError> {
        let missing: Vec<String> = self
            .parameters()
            .into_iter()
            .filter(|name| params.get(name).is_none())
            .collect();
        if !missing.is_empty() {
            return Err(CoreError::Validation(format!(
                "Execution template references undefined parameters: {}",
                missing.join(", ")
            )));
        }

        let mut manifest = substitute(&self.document, params);
        let Value::Object(root) = &mut manifest else {
            return Err(CoreError::Internal("rendered manifest is not a mapping".into()));
        };
        let metadata = root
            .entry("metadata")
            .or_insert_with(|| Value::Object(serde_json::Map::new()));
        let Value::Object(metadata) = metadata else {
            return Err(CoreError::Validation(
                "Execution template field 'metadata' must be a mapping".to_string(),
            ));
        };
        metadata.insert("name".to_string(), Value::String(run_name.to_string()));

        Ok(RenderedTemplate {
            run_name: run_name.to_string(),
            manifest,
        })
    }
}

/// Call `f` on every string scalar in `value`.
fn visit_strings(value: &Value, f: &mut impl FnMut(&str)) {
    match value {
        Value::String(s) => f(s),
        Value::Array(items) => items.iter().for_each(|v| visit_strings(v, f)),
        Value::Object(map) => map.values().for_each(|v| visit_strings(v, f)),
        _ => {}
    }
}

fn substitute(value: &Value, params: &TemplateParams) -> Value {
    match value {
        Value::String(s) => Value::String(
            PLACEHOLDER_RE
                .replace_all(s, |caps: &Captures| {
                    if caps[1].is_empty() {
                        params.get(&caps[2]).unwrap_or_default().to_string()
                    } else {
                        format!("${{{}}}", &caps[2])
                    }
                })
                .into_owned(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(|v| substitute(v, params)).collect()),
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), substitute(v, params)))
                .collect(),
        ),
        other => other.clone(),
    }
}
