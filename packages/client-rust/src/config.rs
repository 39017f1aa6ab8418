//! Client configuration.

use std::time::Duration;

use serde::Deserialize;

/// Errors from reading configuration overrides.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("{key} has invalid value `{value}`: {reason}")]
    InvalidValue {
        key: &'static str,
        value: String,
        reason: String,
    },
}

/// Top-level configuration for the data tier.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// Name of the local repository database.
    pub database_name: String,
    /// Base URL of the entity server.
    pub server_url: String,
    /// Maximum time one server fetch may take.
    #[serde(with = "millis", rename = "request_timeout_ms")]
    pub request_timeout: Duration,
    /// Maximum time to wait for the legacy storage plugin to install.
    #[serde(with = "millis", rename = "install_timeout_ms")]
    pub install_timeout: Duration,
    /// Whether `Data` caches entity lists client-side.
    pub server_sync: bool,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            database_name: "strata".to_string(),
            server_url: "http://localhost:8080".to_string(),
            request_timeout: Duration::from_secs(30),
            install_timeout: Duration::from_secs(10),
            server_sync: true,
        }
    }
}

impl ClientConfig {
    /// Defaults overlaid with `STRATA_*` environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for unparsable values.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Defaults overlaid with values from `lookup`, keyed like the
    /// environment variables read by [`from_env`](Self::from_env).
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::InvalidValue`] for unparsable values.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let mut config = Self::default();
        if let Some(name) = lookup("STRATA_DATABASE") {
            config.database_name = name;
        }
        if let Some(url) = lookup("STRATA_SERVER_URL") {
            config.server_url = url;
        }
        if let Some(raw) = lookup("STRATA_REQUEST_TIMEOUT_MS") {
            config.request_timeout = parse_millis("STRATA_REQUEST_TIMEOUT_MS", &raw)?;
        }
        if let Some(raw) = lookup("STRATA_INSTALL_TIMEOUT_MS") {
            config.install_timeout = parse_millis("STRATA_INSTALL_TIMEOUT_MS", &raw)?;
        }
        if let Some(raw) = lookup("STRATA_SERVER_SYNC") {
            config.server_sync = match raw.trim().to_ascii_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => true,
                "0" | "false" | "no" | "off" => false,
                _ => {
                    return Err(ConfigError::InvalidValue {
                        key: "STRATA_SERVER_SYNC",
                        value: raw,
                        reason: "expected a boolean".to_string(),
                    })
                }
            };
        }
        Ok(config)
    }
}

fn parse_millis(key: &'static str, raw: &str) -> Result<Duration, ConfigError> {
    raw.trim()
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|e| ConfigError::InvalidValue {
            key,
            value: raw.to_string(),
            reason: e.to_string(),
        })
}

mod millis {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    /// Reads a millisecond count into a [`Duration`].
    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        u64::deserialize(deserializer).map(Duration::from_millis)
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn client_config_defaults() {
        let config = ClientConfig::default();
        assert_eq!(config.database_name, "strata");
        assert_eq!(config.server_url, "http://localhost:8080");
        assert_eq!(config.request_timeout, Duration::from_secs(30));
        assert_eq!(config.install_timeout, Duration::from_secs(10));
        assert!(config.server_sync);
    }

    #[test]
    fn lookup_overrides_defaults() {
        let config = ClientConfig::from_lookup(lookup(&[
            ("STRATA_DATABASE", "crm"),
            ("STRATA_REQUEST_TIMEOUT_MS", "1500"),
            ("STRATA_SERVER_SYNC", "off"),
        ]))
        .unwrap();
        assert_eq!(config.database_name, "crm");
        assert_eq!(config.request_timeout, Duration::from_millis(1500));
        assert!(!config.server_sync);
        assert_eq!(config.server_url, "http://localhost:8080");
    }

    #[test]
    fn lookup_rejects_bad_values() {
        let bad_timeout = lookup(&[("STRATA_INSTALL_TIMEOUT_MS", "soon")]);
        let err = ClientConfig::from_lookup(bad_timeout).unwrap_err();
        assert!(err.to_string().starts_with("STRATA_INSTALL_TIMEOUT_MS"));

        let bad_flag = lookup(&[("STRATA_SERVER_SYNC", "maybe")]);
        assert!(ClientConfig::from_lookup(bad_flag).is_err());
    }

    #[test]
    fn deserializes_with_millisecond_timeouts() {
        let config: ClientConfig =
            serde_json::from_str(r#"{"database_name":"crm","request_timeout_ms":250}"#).unwrap();
        assert_eq!(config.database_name, "crm");
        assert_eq!(config.request_timeout, Duration::from_millis(250));
        assert_eq!(config.install_timeout, Duration::from_secs(10));
    }
}
