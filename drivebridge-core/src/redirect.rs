//! State for redirect sign-in across a reload.
//!
//! A redirect sign-in leaves the application. Before navigating away the
//! engine persists a [`PendingRedirect`]; on the next start the launcher hands
//! the provider's answer to the session as a [`RedirectResponse`], and the
//! engine pairs the two before trying anything else.
//!
//! # Storage Location
//!
//! [`FileRedirectStore`] keeps the record at
//! `~/.local/share/drivebridge/pending_redirect.json` on Linux and the
//! platform equivalent elsewhere.

use chrono::{DateTime, Duration, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use thiserror::Error;
use url::Url;

use crate::secret::Secret;

/// Error type for redirect store operations.
#[derive(Debug, Error)]
pub enum RedirectStoreError {
    /// I/O error reading or writing the store.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Data directory not available.
    #[error("data directory not available")]
    DataDirUnavailable,
}

/// Error parsing a callback URL.
#[derive(Debug, Error)]
pub enum RedirectParseError {
    #[error("invalid callback URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    #[error("callback URL carries neither a code nor an error")]
    MissingCode,

    #[error("callback URL carries no state parameter")]
    MissingState,
}

/// A redirect sign-in that left the application and has not come back yet.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PendingRedirect {
    /// Anti-forgery state sent with the authorization request.
    pub csrf_state: String,

    /// PKCE verifier needed to redeem the authorization code.
    pub pkce_verifier: Secret,

    /// Where the user was sent.
    pub authorization_url: String,

    /// When the redirect was issued.
    pub started_at: DateTime<Utc>,
}

impl PendingRedirect {
    /// Whether the record is older than `ttl` and should be treated as abandoned.
    pub fn is_stale(&self, ttl: Duration) -> bool {
        self.started_at + ttl < Utc::now()
    }
}

/// The outcome the provider delivered to the redirect URI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RedirectResponse {
    /// The user signed in; redeem `code`.
    Code { code: Secret, state: String },

    /// The provider reported an error (e.g. `access_denied`).
    Error {
        error: String,
        description: Option<String>,
        state: Option<String>,
    },
}

impl RedirectResponse {
    /// Parse the URL the provider redirected to.
    ///
    /// # Examples
    ///
    /// ```
    /// use drivebridge_core::redirect::RedirectResponse;
    ///
    /// let resp = RedirectResponse::from_callback_url(
    ///     "http://localhost:53682/callback?code=abc&state=xyz",
    /// ).unwrap();
    /// assert_eq!(resp.state(), Some("xyz"));
    /// ```
    pub fn from_callback_url(callback: &str) -> Result<Self, RedirectParseError> {
        let url = Url::parse(callback)?;

        let mut code = None;
        let mut state = None;
        let mut error = None;
        let mut description = None;
        for (key, value) in url.query_pairs() {
            match key.as_ref() {
                "code" => code = Some(value.into_owned()),
                "state" => state = Some(value.into_owned()),
                "error" => error = Some(value.into_owned()),
                "error_description" => description = Some(value.into_owned()),
                _ => {}
            }
        }

        if let Some(error) = error {
            return Ok(Self::Error {
                error,
                description,
                state,
            });
        }

        let code = code.ok_or(RedirectParseError::MissingCode)?;
        let state = state.ok_or(RedirectParseError::MissingState)?;
        Ok(Self::Code {
            code: Secret::new(code),
            state,
        })
    }

    /// The state parameter echoed by the provider.
    pub fn state(&self) -> Option<&str> {
        match self {
            Self::Code { state, .. } => Some(state),
            Self::Error { state, .. } => state.as_deref(),
        }
    }
}

/// Persistence for the pending redirect record.
///
/// Must survive a process restart in production; the record is the only
/// state that crosses the reload boundary.
pub trait RedirectStore: Send + Sync {
    /// Load the pending record, if any.
    fn load(&self) -> Result<Option<PendingRedirect>, RedirectStoreError>;

    /// Persist a new pending record, replacing any previous one.
    fn save(&self, pending: &PendingRedirect) -> Result<(), RedirectStoreError>;

    /// Remove the pending record. Succeeds when there is none.
    fn clear(&self) -> Result<(), RedirectStoreError>;
}

/// Disk-backed redirect store.
#[derive(Debug, Clone)]
pub struct FileRedirectStore {
    path: PathBuf,
}

impl FileRedirectStore {
    /// Get the default storage path.
    pub fn default_path() -> Result<PathBuf, RedirectStoreError> {
        let dirs = directories::ProjectDirs::from("com", "drivebridge", "drivebridge")
            .ok_or(RedirectStoreError::DataDirUnavailable)?;
        Ok(dirs.data_dir().join("pending_redirect.json"))
    }

    /// Open the store at the default location.
    pub fn open() -> Result<Self, RedirectStoreError> {
        Ok(Self::at_path(Self::default_path()?))
    }

    /// Open the store at a specific path. Nothing is touched until first use.
    pub fn at_path(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Open the store inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self::at_path(dir.join("pending_redirect.json"))
    }

    /// Where the record lives.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl RedirectStore for FileRedirectStore {
    fn load(&self) -> Result<Option<PendingRedirect>, RedirectStoreError> {
        if !self.path.exists() {
            return Ok(None);
        }
        let contents = fs::read_to_string(&self.path)?;
        Ok(Some(serde_json::from_str(&contents)?))
    }

    fn save(&self, pending: &PendingRedirect) -> Result<(), RedirectStoreError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(pending)?;
        fs::write(&self.path, contents)?;
        Ok(())
    }

    fn clear(&self) -> Result<(), RedirectStoreError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-memory redirect store for tests and embedders that persist elsewhere.
#[derive(Debug, Default)]
pub struct MemoryRedirectStore {
    pending: RwLock<Option<PendingRedirect>>,
}

impl MemoryRedirectStore {
    /// Create an empty store.
    pub fn new() -> Self {
        Self::default()
    }
}

impl RedirectStore for MemoryRedirectStore {
    fn load(&self) -> Result<Option<PendingRedirect>, RedirectStoreError> {
        Ok(self.pending.read().clone())
    }

    fn save(&self, pending: &PendingRedirect) -> Result<(), RedirectStoreError> {
        *self.pending.write() = Some(pending.clone());
        Ok(())
    }

    fn clear(&self) -> Result<(), RedirectStoreError> {
        *self.pending.write() = None;
        Ok(())
    }
}
