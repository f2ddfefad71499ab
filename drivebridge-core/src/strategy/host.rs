//! Host bridge backed by process environment variables.
//!
//! A host application that embeds the tool marks the launch with
//! `DRIVEBRIDGE_HOST` and passes the signed-in user's assertion in
//! `DRIVEBRIDGE_HOST_ASSERTION`.

use async_trait::async_trait;
use std::collections::HashMap;

use super::HostBridge;
use crate::secret::Secret;
use crate::token::FailureReason;

/// Variable whose presence marks a host-frame launch. Its value names the host.
pub const HOST_MARKER_VAR: &str = "DRIVEBRIDGE_HOST";

/// Variable carrying the host identity assertion.
pub const HOST_ASSERTION_VAR: &str = "DRIVEBRIDGE_HOST_ASSERTION";

/// Host bridge reading a snapshot of the environment taken at construction.
#[derive(Clone, Default)]
pub struct EnvHostBridge {
    vars: HashMap<String, String>,
}

impl EnvHostBridge {
    /// Snapshot the current process environment.
    pub fn from_env() -> Self {
        Self::from_vars(
            [HOST_MARKER_VAR, HOST_ASSERTION_VAR]
                .into_iter()
                .filter_map(|k| std::env::var(k).ok().map(|v| (k.to_string(), v))),
        )
    }

    /// Build from explicit key/value pairs.
    pub fn from_vars<I, K, V>(vars: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            vars: vars.into_iter().map(|(k, v)| (k.into(), v.into())).collect(),
        }
    }

    fn get(&self, key: &str) -> Option<&str> {
        self.vars
            .get(key)
            .map(String::as_str)
            .filter(|v| !v.trim().is_empty())
    }
}

impl std::fmt::Debug for EnvHostBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EnvHostBridge")
            .field("host", &self.get(HOST_MARKER_VAR))
            .field("has_assertion", &self.get(HOST_ASSERTION_VAR).is_some())
            .finish()
    }
}

#[async_trait]
impl HostBridge for EnvHostBridge {
    async fn initialize(&self) -> Result<(), FailureReason> {
        match self.get(HOST_MARKER_VAR) {
            Some(host) => {
                tracing::debug!(host, "host frame detected");
                Ok(())
            }
            None => Err(FailureReason::EnvironmentDetectionFailed {
                message: format!("{} is not set", HOST_MARKER_VAR),
            }),
        }
    }

    async fn assertion(&self) -> Result<Secret, FailureReason> {
        self.get(HOST_ASSERTION_VAR)
            .map(Secret::new)
            .ok_or_else(|| FailureReason::AssertionUnavailable {
                message: format!("host did not provide {}", HOST_ASSERTION_VAR),
            })
    }
}
