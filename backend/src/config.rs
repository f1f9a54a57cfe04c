use std::net::SocketAddr;
use std::time::Duration;

use crate::source::{DEFAULT_API_URL, DEFAULT_MAX_PAGES};

const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";
const DEFAULT_TIMEOUT_SECS: u64 = 30;

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("{key} has invalid value {value:?}")]
    Invalid { key: &'static str, value: String },
}

/// Runtime settings, read from the environment.
#[derive(Debug, Clone)]
pub struct Config {
    pub bind_addr: SocketAddr,
    pub traces_api_url: String,
    pub max_pages: u32,
    pub request_timeout: Duration,
    /// Storage is disabled when unset.
    pub database_url: Option<String>,
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let bind_addr = parse_or(&lookup, "BIND_ADDR", || {
            DEFAULT_BIND_ADDR.parse().map_err(|_| ConfigError::Invalid {
                key: "BIND_ADDR",
                value: DEFAULT_BIND_ADDR.to_string(),
            })
        })?;
        let max_pages = parse_or(&lookup, "TRACES_MAX_PAGES", || Ok(DEFAULT_MAX_PAGES))?;
        let timeout_secs = parse_or(&lookup, "TRACES_TIMEOUT_SECS", || Ok(DEFAULT_TIMEOUT_SECS))?;

        Ok(Self {
            bind_addr,
            traces_api_url: lookup("TRACES_API_URL").unwrap_or_else(|| DEFAULT_API_URL.to_string()),
            max_pages,
            request_timeout: Duration::from_secs(timeout_secs),
            database_url: lookup("DATABASE_URL").filter(|url| !url.trim().is_empty()),
        })
    }
}

fn parse_or<T: std::str::FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    key: &'static str,
    default: impl FnOnce() -> Result<T, ConfigError>,
) -> Result<T, ConfigError> {
    match lookup(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => default(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Result<Config, ConfigError> {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|key| vars.get(key).cloned())
    }

    #[test]
    fn defaults_when_unset() {
        let config = config(&[]).unwrap();
        assert_eq!(config.bind_addr.port(), 8080);
        assert_eq!(config.traces_api_url, DEFAULT_API_URL);
        assert_eq!(config.max_pages, 5);
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.database_url, None);
    }

    #[test]
    fn overrides_from_environment() {
        let config = config(&[
            ("BIND_ADDR", "127.0.0.1:3000"),
            ("TRACES_MAX_PAGES", " 2 "),
            ("DATABASE_URL", "postgres://localhost/traces"),
        ])
        .unwrap();
        assert_eq!(config.bind_addr.to_string(), "127.0.0.1:3000");
        assert_eq!(config.max_pages, 2);
        assert_eq!(
            config.database_url.as_deref(),
            Some("postgres://localhost/traces")
        );
    }

    #[test]
    fn rejects_garbage_numbers() {
        assert_eq!(
            config(&[("TRACES_MAX_PAGES", "many")]).unwrap_err(),
            ConfigError::Invalid {
                key: "TRACES_MAX_PAGES",
                value: "many".into()
            }
        );
    }
}
