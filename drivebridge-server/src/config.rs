//! Server configuration handling.
//!
//! Read from `server.toml` in the platform config directory when present,
//! then overridden by `AZURE_CLIENT_ID`, `AZURE_CLIENT_SECRET`,
//! `AZURE_TENANT_ID` and `DRIVEBRIDGE_BIND`.

use anyhow::{Context, Result, bail};
use directories::ProjectDirs;
use drivebridge_core::Secret;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to.
    pub bind_addr: SocketAddr,

    /// Directory (tenant) of the confidential client.
    pub tenant_id: String,

    /// Application (client) id of the confidential client.
    pub client_id: String,

    /// Client secret of the confidential client.
    pub client_secret: Secret,

    /// Scope requested for the downstream resource.
    pub scope: String,

    /// Identity provider host.
    pub authority_host: String,

    /// Timeout for calls to the identity provider, in seconds.
    pub request_timeout_secs: u64,

    /// Path to the configuration file that was loaded.
    #[serde(skip)]
    pub config_path: PathBuf,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([127, 0, 0, 1], 8787)),
            tenant_id: String::new(),
            client_id: String::new(),
            client_secret: Secret::new(""),
            scope: "https://graph.microsoft.com/.default".to_string(),
            authority_host: "https://login.microsoftonline.com".to_string(),
            request_timeout_secs: 10,
            config_path: PathBuf::new(),
        }
    }
}

impl ServerConfig {
    /// Apply environment overrides. Blank values are ignored.
    pub fn with_env(mut self, lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

        if let Some(v) = get("AZURE_CLIENT_ID") {
            self.client_id = v;
        }
        if let Some(v) = get("AZURE_CLIENT_SECRET") {
            self.client_secret = Secret::new(v);
        }
        if let Some(v) = get("AZURE_TENANT_ID") {
            self.tenant_id = v;
        }
        if let Some(v) = get("DRIVEBRIDGE_BIND") {
            self.bind_addr = v
                .parse()
                .with_context(|| format!("Invalid DRIVEBRIDGE_BIND address {:?}", v))?;
        }
        Ok(self)
    }

    /// Check that the confidential client is fully configured.
    pub fn validate(&self) -> Result<()> {
        if self.client_id.is_empty() {
            bail!("client_id is not configured (set AZURE_CLIENT_ID)");
        }
        if self.client_secret.is_empty() {
            bail!("client_secret is not configured (set AZURE_CLIENT_SECRET)");
        }
        if self.tenant_id.is_empty() {
            bail!("tenant_id is not configured (set AZURE_TENANT_ID)");
        }
        Ok(())
    }

    /// Token endpoint of the configured directory.
    pub fn token_url(&self) -> String {
        format!(
            "{}/{}/oauth2/v2.0/token",
            self.authority_host.trim_end_matches('/'),
            self.tenant_id
        )
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }
}

/// Load configuration from the default location and the environment.
pub fn load_config() -> Result<ServerConfig> {
    let config_path = project_dirs()
        .map(|d| d.config_dir().join("server.toml"))
        .unwrap_or_else(|| PathBuf::from("drivebridge-server.toml"));

    load_config_from(&config_path, |key| std::env::var(key).ok())
}

/// Load configuration from `config_path` (if it exists) and `lookup`.
pub fn load_config_from(config_path: &Path, lookup: impl Fn(&str) -> Option<String>) -> Result<ServerConfig> {
    let config = if config_path.exists() {
        let contents = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config from {:?}", config_path))?;
        toml::from_str(&contents).with_context(|| format!("Failed to parse config from {:?}", config_path))?
    } else {
        ServerConfig::default()
    };

    let mut config = config.with_env(lookup)?;
    config.config_path = config_path.to_path_buf();
    config.validate()?;

    Ok(config)
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("com", "drivebridge", "drivebridge")
}
