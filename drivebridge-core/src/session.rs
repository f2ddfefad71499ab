//! The per-process authentication session.
//!
//! An [`AuthSession`] is constructed once at startup and shared by handle
//! with the engine. It owns everything that outlives a single resolution
//! cycle: configuration, the token cache, the redirect store, the detected
//! environment and the redirect response handed over by the launcher.

use parking_lot::Mutex;
use std::sync::Arc;

use crate::cache::TokenCache;
use crate::config::AuthConfig;
use crate::model::Environment;
use crate::redirect::{RedirectResponse, RedirectStore};

pub struct AuthSession {
    config: AuthConfig,
    cache: Arc<dyn TokenCache>,
    redirects: Arc<dyn RedirectStore>,
    environment: Mutex<Option<Environment>>,
    redirect_response: Mutex<Option<RedirectResponse>>,
}

impl AuthSession {
    /// Create a session with no environment detected yet.
    pub fn new(config: AuthConfig, cache: Arc<dyn TokenCache>, redirects: Arc<dyn RedirectStore>) -> Self {
        Self {
            config,
            cache,
            redirects,
            environment: Mutex::new(None),
            redirect_response: Mutex::new(None),
        }
    }

    /// Hand over the response of a redirect sign-in started by a previous run.
    pub fn with_redirect_response(self, response: RedirectResponse) -> Self {
        self.deliver_redirect_response(response);
        self
    }

    /// Deliver a redirect response after construction. Replaces any response
    /// that has not been consumed yet.
    pub fn deliver_redirect_response(&self, response: RedirectResponse) {
        *self.redirect_response.lock() = Some(response);
    }

    /// Take the delivered redirect response. A response is consumed at most once.
    pub fn take_redirect_response(&self) -> Option<RedirectResponse> {
        self.redirect_response.lock().take()
    }

    pub fn config(&self) -> &AuthConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<dyn TokenCache> {
        &self.cache
    }

    pub fn redirects(&self) -> &Arc<dyn RedirectStore> {
        &self.redirects
    }

    /// The detected environment, if detection has run.
    pub fn environment(&self) -> Option<Environment> {
        *self.environment.lock()
    }

    /// Record the detected environment. Detection happens once per session:
    /// if an environment is already recorded it is kept and returned.
    pub fn set_environment(&self, environment: Environment) -> Environment {
        *self.environment.lock().get_or_insert(environment)
    }
}

impl std::fmt::Debug for AuthSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthSession")
            .field("client_id", &self.config.client_id)
            .field("tenant_id", &self.config.tenant_id)
            .field("environment", &self.environment())
            .field("has_redirect_response", &self.redirect_response.lock().is_some())
            .finish()
    }
}
