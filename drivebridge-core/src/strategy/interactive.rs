//! Interactive sign-in: `popupAcquire` and `redirectAcquire`.

use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;

use super::{BrowserOpener, PopupAcquirer, RedirectAcquirer, RedirectTicket};
use crate::config::AuthConfig;
use crate::oauth::pkce::{PkceFlow, accept_callback, bind_callback_listener, verify_response};
use crate::redirect::{PendingRedirect, RedirectResponse, RedirectStore};
use crate::token::{FailureReason, TokenGrant};

/// Popup sign-in: opens the authorization page and waits on a loopback
/// listener while the application keeps running.
pub struct LoopbackPopup {
    flow: PkceFlow,
    redirect_uri: String,
    opener: BrowserOpener,
    interaction_timeout: Duration,
}

impl LoopbackPopup {
    pub fn new(config: &AuthConfig, opener: BrowserOpener) -> Result<Self, FailureReason> {
        Ok(Self {
            flow: PkceFlow::new(config)?,
            redirect_uri: config.redirect_uri.clone(),
            opener,
            interaction_timeout: config.interaction_timeout(),
        })
    }
}

#[async_trait]
impl PopupAcquirer for LoopbackPopup {
    async fn acquire(&self) -> Result<TokenGrant, FailureReason> {
        let listener = bind_callback_listener(&self.redirect_uri).await?;
        let request = self.flow.build_authorization_url();

        (self.opener)(&request.url).map_err(|message| FailureReason::PopupBlocked { message })?;
        tracing::info!("waiting for sign-in to complete in the browser");

        // Closing the window never calls back; the user gave up.
        let response = tokio::time::timeout(self.interaction_timeout, accept_callback(&listener))
            .await
            .map_err(|_| FailureReason::UserCancelled)??;

        let code = verify_response(response, &request.csrf_state)?;
        self.flow.exchange_code(&code, &request.pkce_verifier).await
    }
}

/// Redirect sign-in: persists the pending request, hands the authorization
/// URL to the opener and leaves. The response is redeemed on the next start.
pub struct BrowserRedirect {
    flow: PkceFlow,
    store: Arc<dyn RedirectStore>,
    opener: BrowserOpener,
}

impl BrowserRedirect {
    pub fn new(
        config: &AuthConfig,
        store: Arc<dyn RedirectStore>,
        opener: BrowserOpener,
    ) -> Result<Self, FailureReason> {
        Ok(Self {
            flow: PkceFlow::new(config)?,
            store,
            opener,
        })
    }
}

#[async_trait]
impl RedirectAcquirer for BrowserRedirect {
    async fn begin(&self) -> Result<RedirectTicket, FailureReason> {
        let request = self.flow.build_authorization_url();
        let pending = PendingRedirect {
            csrf_state: request.csrf_state,
            pkce_verifier: request.pkce_verifier,
            authorization_url: request.url,
            started_at: Utc::now(),
        };

        // Persist before leaving; nothing else survives the navigation.
        self.store
            .save(&pending)
            .map_err(|e| FailureReason::InteractionError {
                message: format!("failed to persist pending redirect: {}", e),
            })?;

        if let Err(message) = (self.opener)(&pending.authorization_url) {
            if let Err(e) = self.store.clear() {
                tracing::warn!(error = %e, "failed to clear pending redirect");
            }
            return Err(FailureReason::InteractionError { message });
        }

        Ok(RedirectTicket::from(&pending))
    }

    async fn complete(
        &self,
        pending: &PendingRedirect,
        response: RedirectResponse,
    ) -> Result<TokenGrant, FailureReason> {
        let code = verify_response(response, &pending.csrf_state)?;
        self.flow.exchange_code(&code, &pending.pkce_verifier).await
    }
}
