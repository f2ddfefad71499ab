//! The acquisition strategy set.
//!
//! Each strategy is an independently invocable request/response operation
//! against an external identity system. All of them are safe to call again
//! after a failure; ordering and fallback belong to the engine.
//!
//! - [`HostBridge`] - the host application's identity SDK
//! - [`BackendExchange`] - `exchangeViaBackend`
//! - [`SilentAcquirer`] - `silentAcquire`
//! - [`PopupAcquirer`] - `popupAcquire`
//! - [`RedirectAcquirer`] - `redirectAcquire`, split in two phases around the reload

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

#[cfg(feature = "oauth")]
use crate::config::AuthConfig;
use crate::redirect::{PendingRedirect, RedirectResponse};
#[cfg(feature = "oauth")]
use crate::redirect::RedirectStore;
use crate::secret::Secret;
use crate::token::{CachedAccount, FailureReason, TokenGrant};

pub mod backend;
pub mod host;
#[cfg(feature = "oauth")]
pub mod interactive;
#[cfg(feature = "oauth")]
pub mod silent;

pub use backend::HttpBackendExchange;
pub use host::EnvHostBridge;
#[cfg(feature = "oauth")]
pub use interactive::{BrowserRedirect, LoopbackPopup};
#[cfg(feature = "oauth")]
pub use silent::RefreshTokenSilent;

/// Opens a URL for the user: a popup window, a browser tab, or a printed link.
///
/// An `Err` means the window could not be shown.
pub type BrowserOpener = Arc<dyn Fn(&str) -> Result<(), String> + Send + Sync>;

/// The host application's identity SDK.
#[async_trait]
pub trait HostBridge: Send + Sync {
    /// Initialise the SDK. Failing means we are not inside a host frame.
    async fn initialize(&self) -> Result<(), FailureReason>;

    /// Ask the host for a short-lived identity assertion for the signed-in user.
    async fn assertion(&self) -> Result<Secret, FailureReason>;
}

/// `exchangeViaBackend`: trade a host assertion for a resource token.
#[async_trait]
pub trait BackendExchange: Send + Sync {
    async fn exchange(&self, assertion: &Secret) -> Result<TokenGrant, FailureReason>;
}

/// `silentAcquire`: mint a token for a cached account without the user.
#[async_trait]
pub trait SilentAcquirer: Send + Sync {
    async fn acquire(&self, account: &CachedAccount) -> Result<TokenGrant, FailureReason>;
}

/// `popupAcquire`: interactive sign-in while the application keeps running.
#[async_trait]
pub trait PopupAcquirer: Send + Sync {
    async fn acquire(&self) -> Result<TokenGrant, FailureReason>;
}

/// Handle returned once a redirect sign-in has left the application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RedirectTicket {
    /// Where the user was sent.
    pub authorization_url: String,

    /// When the redirect was issued.
    pub started_at: DateTime<Utc>,
}

impl From<&PendingRedirect> for RedirectTicket {
    fn from(pending: &PendingRedirect) -> Self {
        Self {
            authorization_url: pending.authorization_url.clone(),
            started_at: pending.started_at,
        }
    }
}

/// `redirectAcquire`: interactive sign-in that navigates the whole application away.
#[async_trait]
pub trait RedirectAcquirer: Send + Sync {
    /// Phase 1: persist the pending state and navigate away.
    ///
    /// Success does not yield a token; control has left the application and
    /// the result arrives on the next load.
    async fn begin(&self) -> Result<RedirectTicket, FailureReason>;

    /// Phase 2: redeem the response delivered on the next load.
    async fn complete(
        &self,
        pending: &PendingRedirect,
        response: RedirectResponse,
    ) -> Result<TokenGrant, FailureReason>;
}

/// The full set of strategies the engine orchestrates.
#[derive(Clone)]
pub struct StrategySet {
    pub host: Arc<dyn HostBridge>,
    pub backend: Arc<dyn BackendExchange>,
    pub silent: Arc<dyn SilentAcquirer>,
    pub popup: Arc<dyn PopupAcquirer>,
    pub redirect: Arc<dyn RedirectAcquirer>,
}

/// Opener that prints the URL for the user to open by hand.
pub fn print_opener() -> BrowserOpener {
    Arc::new(|url: &str| -> Result<(), String> {
        eprintln!("Open this URL in your browser to sign in:\n\n    {}\n", url);
        Ok(())
    })
}

/// Wire the environment, HTTP and OAuth implementations of every strategy.
#[cfg(feature = "oauth")]
pub fn standard_strategies(
    config: &AuthConfig,
    redirects: Arc<dyn RedirectStore>,
    opener: BrowserOpener,
) -> Result<StrategySet, FailureReason> {
    Ok(StrategySet {
        host: Arc::new(EnvHostBridge::from_env()),
        backend: Arc::new(HttpBackendExchange::new(config)?),
        silent: Arc::new(RefreshTokenSilent::new(config)?),
        popup: Arc::new(LoopbackPopup::new(config, opener.clone())?),
        redirect: Arc::new(BrowserRedirect::new(config, redirects, opener)?),
    })
}
