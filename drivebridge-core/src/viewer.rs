//! Presentation adapter.
//!
//! [`DriveViewer`] observes the engine and drives the resource client. It
//! holds no acquisition logic of its own: it asks for a token, uses it, and
//! on [`ResourceError::Unauthorized`] asks the engine to re-authenticate
//! exactly once before giving up.

use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use thiserror::Error;
use uuid::Uuid;

use crate::engine::{AcquisitionEngine, Resolution};
#[cfg(feature = "oauth")]
use crate::{
    cache::MemoryTokenCache,
    config::AuthConfig,
    error::DrivebridgeError,
    redirect::{FileRedirectStore, RedirectStore},
    resource::GraphDriveClient,
    session::AuthSession,
    strategy::{BrowserOpener, standard_strategies},
};
use crate::model::AttemptOutcome;
use crate::resource::{ByteStream, DriveEntry, DriveResource, ResourceError, TargetFormat};
use crate::token::{AccessToken, FailureReason};

/// What the user should see after [`DriveViewer::load`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ViewState {
    /// Signed in; the drive listing.
    Ready(Vec<DriveEntry>),

    /// A redirect sign-in is in flight at this URL.
    AwaitingRedirect(String),

    /// Something went wrong; the message is meant for the user.
    Failed(String),
}

/// Error type for viewer operations.
#[derive(Debug, Error)]
pub enum ViewError {
    #[error("sign-in failed: {0}")]
    Auth(FailureReason),

    #[error("sign-in continues in the browser: {url}")]
    AwaitingRedirect { url: String },

    #[error(transparent)]
    Resource(#[from] ResourceError),
}

pub struct DriveViewer {
    engine: Arc<AcquisitionEngine>,
    resource: Arc<dyn DriveResource>,
    log: Mutex<Vec<String>>,
    logged_attempts: Mutex<HashSet<Uuid>>,
}

impl DriveViewer {
    pub fn new(engine: Arc<AcquisitionEngine>, resource: Arc<dyn DriveResource>) -> Self {
        Self {
            engine,
            resource,
            log: Mutex::new(Vec::new()),
            logged_attempts: Mutex::new(HashSet::new()),
        }
    }

    /// Build a viewer over the standard strategies, the Graph drive client,
    /// a session-lifetime token cache and the on-disk redirect store.
    #[cfg(feature = "oauth")]
    pub fn from_config(config: AuthConfig, opener: BrowserOpener) -> Result<Self, DrivebridgeError> {
        let redirects: Arc<dyn RedirectStore> = match &config.data_dir {
            Some(dir) => Arc::new(FileRedirectStore::in_dir(dir)),
            None => Arc::new(FileRedirectStore::open()?),
        };
        let strategies = standard_strategies(&config, redirects.clone(), opener)?;
        let resource = Arc::new(GraphDriveClient::new(&config)?);
        let session = Arc::new(AuthSession::new(config, Arc::new(MemoryTokenCache::new()), redirects));

        Ok(Self::new(Arc::new(AcquisitionEngine::new(session, strategies)), resource))
    }

    pub fn engine(&self) -> &Arc<AcquisitionEngine> {
        &self.engine
    }

    /// Resolve a token and list the drive.
    pub async fn load(&self) -> ViewState {
        match self.entries().await {
            Ok(entries) => {
                self.log(format!("Loaded {} entries", entries.len()));
                ViewState::Ready(entries)
            }
            Err(ViewError::AwaitingRedirect { url }) => ViewState::AwaitingRedirect(url),
            Err(e) => {
                self.log(format!("Error: {}", e));
                ViewState::Failed(e.to_string())
            }
        }
    }

    /// List the drive root.
    pub async fn entries(&self) -> Result<Vec<DriveEntry>, ViewError> {
        let token = self.token(self.engine.resolve_token().await)?;
        self.log("Fetching drive listing");

        match self.resource.list_entries(&token).await {
            Err(ResourceError::Unauthorized) => {
                let token = self.reauthenticate().await?;
                Ok(self.resource.list_entries(&token).await?)
            }
            other => Ok(other?),
        }
    }

    /// Stream item `id` converted to `format`.
    pub async fn convert(&self, id: &str, format: TargetFormat) -> Result<ByteStream, ViewError> {
        let token = self.token(self.engine.resolve_token().await)?;
        self.log(format!("Converting {} to {}", id, format));

        match self.resource.convert(&token, id, format).await {
            Err(ResourceError::Unauthorized) => {
                let token = self.reauthenticate().await?;
                Ok(self.resource.convert(&token, id, format).await?)
            }
            other => Ok(other?),
        }
    }

    /// The debug log, oldest line first.
    pub fn debug_log(&self) -> Vec<String> {
        self.log.lock().clone()
    }

    async fn reauthenticate(&self) -> Result<AccessToken, ViewError> {
        self.log("Token rejected by the drive, signing in again");
        self.token(self.engine.reauthenticate().await)
    }

    fn token(&self, resolution: Resolution) -> Result<AccessToken, ViewError> {
        for attempt in self.engine.attempts() {
            if self.logged_attempts.lock().insert(attempt.id) {
                let outcome = match &attempt.outcome {
                    AttemptOutcome::Success(_) => "success".to_string(),
                    AttemptOutcome::Pending => "pending".to_string(),
                    AttemptOutcome::Failure(reason) => reason.to_string(),
                };
                self.log(format!("{}: {}", attempt.strategy, outcome));
            }
        }
        match resolution {
            Resolution::Token(token) => {
                self.log("Access token ready");
                Ok(token)
            }
            Resolution::Pending(ticket) => {
                self.log(format!("Redirecting to sign-in: {}", ticket.authorization_url));
                Err(ViewError::AwaitingRedirect {
                    url: ticket.authorization_url,
                })
            }
            Resolution::Failed(reason) => Err(ViewError::Auth(reason)),
        }
    }

    fn log(&self, line: impl Into<String>) {
        let line = line.into();
        tracing::debug!(target: "drivebridge::viewer", "{}", line);
        self.log
            .lock()
            .push(format!("[{}] {}", Utc::now().format("%H:%M:%S"), line));
    }
}
