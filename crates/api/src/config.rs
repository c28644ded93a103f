//! HTTP server settings.
//!
//! Values are parsed and checked once at startup, so the router and the
//! serve loop only ever see typed settings.

use std::fmt::Display;
use std::net::{IpAddr, SocketAddr};
use std::str::FromStr;
use std::time::Duration;

use axum::http::HeaderValue;

const DEFAULT_CORS_ORIGIN: &str = "http://localhost:5173";

/// A setting that is present but unusable.
#[derive(Debug, thiserror::Error)]
#[error("{key} is invalid: {message}")]
pub struct ConfigError {
    pub key: &'static str,
    pub message: String,
}

/// Server settings.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    pub bind_addr: SocketAddr,
    /// Origins allowed by CORS.
    pub cors_origins: Vec<HeaderValue>,
    /// Upper bound on a single request.
    pub request_timeout: Duration,
    /// How long shutdown waits for in-flight requests.
    pub shutdown_timeout: Duration,
}

impl ServerConfig {
    /// Load settings from the process environment.
    ///
    /// | Env Var                 | Default                 |
    /// |-------------------------|-------------------------|
    /// | `HOST`                  | `0.0.0.0`               |
    /// | `PORT`                  | `3000`                  |
    /// | `CORS_ORIGINS`          | `http://localhost:5173` |
    /// | `REQUEST_TIMEOUT_SECS`  | `30`                    |
    /// | `SHUTDOWN_TIMEOUT_SECS` | `30`                    |
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load settings through `lookup`, which returns the raw value of a key.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let host: IpAddr = parsed(&lookup, "HOST", "0.0.0.0")?;
        let port: u16 = parsed(&lookup, "PORT", "3000")?;

        let cors_origins = lookup("CORS_ORIGINS")
            .unwrap_or_else(|| DEFAULT_CORS_ORIGIN.to_string())
            .split(',')
            .map(str::trim)
            .filter(|origin| !origin.is_empty())
            .map(|origin| {
                HeaderValue::from_str(origin)
                    .map_err(|e| invalid("CORS_ORIGINS", format!("'{origin}': {e}")))
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self {
            bind_addr: SocketAddr::new(host, port),
            cors_origins,
            request_timeout: seconds(&lookup, "REQUEST_TIMEOUT_SECS", "30")?,
            shutdown_timeout: seconds(&lookup, "SHUTDOWN_TIMEOUT_SECS", "30")?,
        })
    }
}

fn invalid(key: &'static str, message: impl Into<String>) -> ConfigError {
    ConfigError {
        key,
        message: message.into(),
    }
}

fn parsed<T>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: &str,
) -> Result<T, ConfigError>
where
    T: FromStr,
    T::Err: Display,
{
    let raw = lookup(key).unwrap_or_else(|| default.to_string());
    raw.trim()
        .parse()
        .map_err(|e| invalid(key, format!("'{raw}': {e}")))
}

/// A whole number of seconds; zero would make every request time out.
fn seconds(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: &str,
) -> Result<Duration, ConfigError> {
    match parsed::<u64>(lookup, key, default)? {
        0 => Err(invalid(key, "must be at least 1")),
        secs => Ok(Duration::from_secs(secs)),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn load(pairs: &[(&str, &str)]) -> Result<ServerConfig, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        ServerConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_apply_when_unset() {
        let config = load(&[]).unwrap();
        assert_eq!(config.bind_addr, "0.0.0.0:3000".parse().unwrap());
        assert_eq!(config.cors_origins, vec![HeaderValue::from_static(DEFAULT_CORS_ORIGIN)]);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn origins_are_split_and_trimmed() {
        let config = load(&[("CORS_ORIGINS", " https://a.example , ,https://b.example")]).unwrap();
        assert_eq!(config.cors_origins.len(), 2);
        assert_eq!(config.cors_origins[1], "https://b.example");
    }

    #[test]
    fn bad_values_name_their_key() {
        assert_eq!(load(&[("PORT", "http")]).unwrap_err().key, "PORT");
        assert_eq!(load(&[("HOST", "localhost")]).unwrap_err().key, "HOST");
        assert_eq!(load(&[("REQUEST_TIMEOUT_SECS", "0")]).unwrap_err().key, "REQUEST_TIMEOUT_SECS");
        assert_eq!(load(&[("CORS_ORIGINS", "https://a\nb")]).unwrap_err().key, "CORS_ORIGINS");
    }
}
