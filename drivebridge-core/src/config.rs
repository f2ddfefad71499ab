//! Client configuration.
//!
//! [`AuthConfig`] parameterises every strategy call: which application and
//! directory to sign in to, which scopes to ask for, where the backend and
//! the drive API live. It carries no logic of its own.
//!
//! Values come from an optional TOML file and are then overridden by
//! environment variables:
//!
//! | variable | field |
//! |---|---|
//! | `DRIVEBRIDGE_CLIENT_ID` | `client_id` |
//! | `DRIVEBRIDGE_TENANT_ID` | `tenant_id` |
//! | `DRIVEBRIDGE_SCOPES` | `scopes` (space or comma separated) |
//! | `DRIVEBRIDGE_REDIRECT_URI` | `redirect_uri` |
//! | `DRIVEBRIDGE_BACKEND_URL` | `backend_url` |
//! | `DRIVEBRIDGE_GRAPH_URL` | `graph_url` |

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

/// Error type for configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// A required setting is absent.
    #[error("missing configuration value: {field} (set {env_var})")]
    Missing {
        field: &'static str,
        env_var: &'static str,
    },

    /// The configuration file could not be read.
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The configuration file is not valid TOML for this schema.
    #[error("failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    /// A URL setting is not a valid URL.
    #[error("invalid URL for {field}: {value}")]
    InvalidUrl { field: &'static str, value: String },
}

/// Settings for token acquisition and the drive API.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AuthConfig {
    /// Application (client) id registered with the identity provider.
    pub client_id: String,

    /// Directory (tenant) id.
    pub tenant_id: String,

    /// Scopes requested by interactive and silent flows.
    pub scopes: Vec<String>,

    /// Redirect URI registered for the application.
    pub redirect_uri: String,

    /// Base URL of the token exchange backend (`POST {backend_url}/token`).
    pub backend_url: String,

    /// Base URL of the drive API, including the `/me` segment.
    pub graph_url: String,

    /// Identity provider host.
    pub authority_host: String,

    /// Bound on network-bound strategies, in seconds.
    pub network_timeout_secs: u64,

    /// Bound on how long an interactive window may stay open, in seconds.
    pub interaction_timeout_secs: u64,

    /// Age after which an unanswered redirect is considered abandoned, in seconds.
    pub redirect_ttl_secs: i64,

    /// Where the pending redirect record is kept. Platform default when unset.
    pub data_dir: Option<PathBuf>,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            client_id: String::new(),
            tenant_id: String::new(),
            scopes: vec![
                "Files.Read.All".to_string(),
                "User.Read".to_string(),
                "offline_access".to_string(),
            ],
            redirect_uri: "http://localhost:53682/callback".to_string(),
            backend_url: "http://127.0.0.1:8787".to_string(),
            graph_url: "https://graph.microsoft.com/v1.0/me".to_string(),
            authority_host: "https://login.microsoftonline.com".to_string(),
            network_timeout_secs: 10,
            interaction_timeout_secs: 300,
            redirect_ttl_secs: 600,
            data_dir: None,
        }
    }
}

impl AuthConfig {
    /// Create a configuration for the given application and directory.
    pub fn new(client_id: impl Into<String>, tenant_id: impl Into<String>) -> Self {
        Self {
            client_id: client_id.into(),
            tenant_id: tenant_id.into(),
            ..Self::default()
        }
    }

    /// Default location of the configuration file.
    pub fn default_path() -> Option<PathBuf> {
        directories::ProjectDirs::from("com", "drivebridge", "drivebridge")
            .map(|d| d.config_dir().join("client.toml"))
    }

    /// Load from the default file (if present) and the process environment.
    pub fn load() -> Result<Self, ConfigError> {
        let base = match Self::default_path() {
            Some(path) if path.exists() => Self::from_file(&path)?,
            _ => Self::default(),
        };
        let config = base.with_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// Parse a TOML configuration file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Apply environment overrides using `lookup` to read variables.
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = non_empty("DRIVEBRIDGE_CLIENT_ID") {
            self.client_id = v;
        }
        if let Some(v) = non_empty("DRIVEBRIDGE_TENANT_ID") {
            self.tenant_id = v;
        }
        if let Some(v) = non_empty("DRIVEBRIDGE_SCOPES") {
            self.scopes = v
                .split(|c: char| c == ',' || c.is_whitespace())
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect();
        }
        if let Some(v) = non_empty("DRIVEBRIDGE_REDIRECT_URI") {
            self.redirect_uri = v;
        }
        if let Some(v) = non_empty("DRIVEBRIDGE_BACKEND_URL") {
            self.backend_url = v;
        }
        if let Some(v) = non_empty("DRIVEBRIDGE_GRAPH_URL") {
            self.graph_url = v;
        }
        self
    }

    /// Check that required values are present and URLs parse.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.client_id.trim().is_empty() {
            return Err(ConfigError::Missing {
                field: "client_id",
                env_var: "DRIVEBRIDGE_CLIENT_ID",
            });
        }
        if self.tenant_id.trim().is_empty() {
            return Err(ConfigError::Missing {
                field: "tenant_id",
                env_var: "DRIVEBRIDGE_TENANT_ID",
            });
        }
        for (field, value) in [
            ("redirect_uri", &self.redirect_uri),
            ("backend_url", &self.backend_url),
            ("graph_url", &self.graph_url),
            ("authority_host", &self.authority_host),
        ] {
            if url::Url::parse(value).is_err() {
                return Err(ConfigError::InvalidUrl {
                    field,
                    value: value.clone(),
                });
            }
        }
        Ok(())
    }

    /// Authorization endpoint for the configured directory.
    pub fn authorize_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/authorize",
            self.authority_host.trim_end_matches('/'),
            self.tenant_id
        )
    }

    /// Token endpoint for the configured directory.
    pub fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_host.trim_end_matches('/'),
            self.tenant_id
        )
    }

    /// The backend exchange endpoint.
    pub fn exchange_url(&self) -> String {
        format!("{}/token", self.backend_url.trim_end_matches('/'))
    }

    /// Bound applied to network-bound strategies.
    pub fn network_timeout(&self) -> Duration {
        Duration::from_secs(self.network_timeout_secs)
    }

    /// Bound applied to interactive windows.
    pub fn interaction_timeout(&self) -> Duration {
        Duration::from_secs(self.interaction_timeout_secs)
    }

    /// Age after which a pending redirect is abandoned.
    pub fn redirect_ttl(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.redirect_ttl_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_env_overrides() {
        let config = AuthConfig::default().with_env(env(&[
            ("DRIVEBRIDGE_CLIENT_ID", "app-1"),
            ("DRIVEBRIDGE_TENANT_ID", "contoso"),
            ("DRIVEBRIDGE_SCOPES", "Files.Read, User.Read offline_access"),
            ("DRIVEBRIDGE_BACKEND_URL", "https://backend.example.com/api/"),
        ]));

        assert_eq!(config.client_id, "app-1");
        assert_eq!(config.tenant_id, "contoso");
        assert_eq!(config.scopes, vec!["Files.Read", "User.Read", "offline_access"]);
        assert_eq!(config.exchange_url(), "https://backend.example.com/api/token");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_env_values_are_ignored() {
        let config = AuthConfig::new("app", "tenant").with_env(env(&[("DRIVEBRIDGE_CLIENT_ID", "  ")]));
        assert_eq!(config.client_id, "app");
    }

    #[test]
    fn test_missing_client_id() {
        let result = AuthConfig::default().validate();
        assert!(matches!(
            result,
            Err(ConfigError::Missing { field: "client_id", .. })
        ));
    }

    #[test]
    fn test_invalid_url() {
        let mut config = AuthConfig::new("app", "tenant");
        config.graph_url = "not a url".to_string();
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidUrl { field: "graph_url", .. })
        ));
    }

    #[test]
    fn test_authority_endpoints() {
        let config = AuthConfig::new("app", "contoso");
        assert_eq!(
            config.token_url(),
            "https://login.microsoftonline.com/contoso/oauth2/v2.0/token"
        );
        assert_eq!(
            config.authorize_url(),
            "https://login.microsoftonline.com/contoso/oauth2/v2.0/authorize"
        );
    }

    #[test]
    fn test_partial_toml_file_uses_defaults() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("client.toml");
        std::fs::write(&path, "client_id = \"app\"\ntenant_id = \"t\"\nnetwork_timeout_secs = 3\n").unwrap();

        let config = AuthConfig::from_file(&path).unwrap();
        assert_eq!(config.client_id, "app");
        assert_eq!(config.network_timeout(), Duration::from_secs(3));
        assert_eq!(config.graph_url, AuthConfig::default().graph_url);
    }

    #[test]
    fn test_unparsable_toml_file() {
        let temp = tempfile::TempDir::new().unwrap();
        let path = temp.path().join("client.toml");
        std::fs::write(&path, "client_id = [").unwrap();
        assert!(matches!(
            AuthConfig::from_file(&path),
            Err(ConfigError::Parse { .. })
        ));
    }
}
