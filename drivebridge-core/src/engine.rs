//! The acquisition engine.
//!
//! Runs one resolution cycle over a deterministic decision tree:
//!
//! 1. Complete a pending redirect sign-in, if the launcher delivered its response
//! 2. Detect the environment (once per session; failure means standalone)
//! 3. Inside the host frame, exchange the host assertion through the backend
//! 4. With a cached account, acquire silently
//! 5. Sign in interactively: popup inside the host frame, redirect otherwise
//! 6. Give up with [`FailureReason::AllStrategiesExhausted`]
//!
//! Each step runs at most once per cycle and at most one interactive
//! strategy runs per cycle. Every intermediate failure is absorbed; only the
//! terminal one is returned.

use chrono::Utc;
use parking_lot::Mutex;
use std::future::Future;
use std::sync::Arc;

use crate::model::{AcquisitionAttempt, AttemptOutcome, Environment, StrategyKind};
use crate::session::AuthSession;
use crate::strategy::{RedirectTicket, StrategySet};
use crate::token::{AccessToken, FailureReason, TokenGrant};

/// What a resolution cycle produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    /// A token for the resource API.
    Token(AccessToken),

    /// A redirect sign-in left the application; the result arrives on the next start.
    Pending(RedirectTicket),

    /// Terminal failure.
    Failed(FailureReason),
}

impl Resolution {
    /// The token, if the cycle produced one.
    pub fn token(&self) -> Option<&AccessToken> {
        match self {
            Self::Token(token) => Some(token),
            _ => None,
        }
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, Self::Pending(_))
    }
}

#[derive(Debug, Clone)]
enum CycleState {
    Idle,
    Resolved(AccessToken),
    Pending(RedirectTicket),
    Failed(FailureReason),
}

enum RedirectCheck {
    NothingPending,
    Resolved(AccessToken),
    Waiting(RedirectTicket),
    Failed(FailureReason),
}

/// Orchestrates the strategy set for one session.
pub struct AcquisitionEngine {
    session: Arc<AuthSession>,
    strategies: StrategySet,
    state: tokio::sync::Mutex<CycleState>,
    attempts: Mutex<Vec<AcquisitionAttempt>>,
}

impl AcquisitionEngine {
    pub fn new(session: Arc<AuthSession>, strategies: StrategySet) -> Self {
        Self {
            session,
            strategies,
            state: tokio::sync::Mutex::new(CycleState::Idle),
            attempts: Mutex::new(Vec::new()),
        }
    }

    pub fn session(&self) -> &Arc<AuthSession> {
        &self.session
    }

    /// Resolve a token for the resource API.
    ///
    /// Runs a cycle only when needed. A token resolved earlier is returned
    /// as long as it has not expired, and a terminal failure is returned
    /// again until [`retry`](Self::retry). Concurrent callers wait for the
    /// cycle in flight.
    pub async fn resolve_token(&self) -> Resolution {
        let mut state = self.state.lock().await;
        match &*state {
            CycleState::Resolved(token) if !token.is_expired() => {
                tracing::debug!("returning token from the current cycle");
                return Resolution::Token(token.clone());
            }
            CycleState::Resolved(_) => tracing::debug!("current token expired, starting a new cycle"),
            CycleState::Failed(reason) => return Resolution::Failed(reason.clone()),
            CycleState::Pending(_) | CycleState::Idle => {}
        }
        self.run_locked(&mut state).await
    }

    /// Start over after a terminal failure.
    pub async fn retry(&self) -> Resolution {
        let mut state = self.state.lock().await;
        if let CycleState::Resolved(token) = &*state {
            if !token.is_expired() {
                return Resolution::Token(token.clone());
            }
        }
        *state = CycleState::Idle;
        self.run_locked(&mut state).await
    }

    /// Drop the current token and reset the cycle. The next
    /// [`resolve_token`](Self::resolve_token) runs the decision tree from the top.
    pub async fn invalidate(&self) {
        *self.state.lock().await = CycleState::Idle;
        tracing::debug!("token invalidated");
    }

    /// Invalidate and resolve again, for a token the resource API rejected.
    pub async fn reauthenticate(&self) -> Resolution {
        let mut state = self.state.lock().await;
        *state = CycleState::Idle;
        tracing::info!("re-authenticating");
        self.run_locked(&mut state).await
    }

    /// The token of the current cycle, if one was resolved and has not expired.
    pub async fn current_token(&self) -> Option<AccessToken> {
        match &*self.state.lock().await {
            CycleState::Resolved(token) if !token.is_expired() => Some(token.clone()),
            _ => None,
        }
    }

    /// Attempts made by the most recent cycle, in order.
    pub fn attempts(&self) -> Vec<AcquisitionAttempt> {
        self.attempts.lock().clone()
    }

    async fn run_locked(&self, state: &mut CycleState) -> Resolution {
        let mut attempts = Vec::new();
        let resolution = self.run_cycle(&mut attempts).await;

        match &resolution {
            Resolution::Token(_) => tracing::info!(attempts = attempts.len(), "token resolved"),
            Resolution::Pending(ticket) => {
                tracing::info!(started_at = %ticket.started_at, "waiting for redirect sign-in")
            }
            Resolution::Failed(reason) => tracing::error!(error = %reason, "token resolution failed"),
        }

        *state = match &resolution {
            Resolution::Token(token) => CycleState::Resolved(token.clone()),
            Resolution::Pending(ticket) => CycleState::Pending(ticket.clone()),
            Resolution::Failed(reason) => CycleState::Failed(reason.clone()),
        };
        *self.attempts.lock() = attempts;
        resolution
    }

    async fn run_cycle(&self, attempts: &mut Vec<AcquisitionAttempt>) -> Resolution {
        let mut interactive_used = false;
        let mut last_failure = None;

        // 1. pending redirect completion
        match self.check_pending_redirect(attempts).await {
            RedirectCheck::Resolved(token) => return Resolution::Token(token),
            RedirectCheck::Waiting(ticket) => return Resolution::Pending(ticket),
            RedirectCheck::Failed(reason) => {
                interactive_used = true;
                last_failure = Some(reason);
            }
            RedirectCheck::NothingPending => {}
        }

        // 2. environment
        let environment = self.detect_environment().await;

        // 3. backend exchange
        if environment == Environment::HostFrame {
            match self.exchange_via_backend(attempts).await {
                Ok(token) => return Resolution::Token(token),
                Err(reason) => last_failure = Some(reason),
            }
        }

        // 4. silent
        match self.session.cache().account().await {
            Ok(Some(account)) => {
                let started_at = Utc::now();
                let result = self
                    .bounded("silent acquisition", self.strategies.silent.acquire(&account))
                    .await;
                match self.settle(attempts, StrategyKind::Silent, started_at, result).await {
                    Ok(token) => return Resolution::Token(token),
                    // The account stays cached for the next cycle.
                    Err(reason) => last_failure = Some(reason),
                }
            }
            Ok(None) => tracing::debug!("no cached account"),
            Err(e) => tracing::warn!(error = %e, "failed to read token cache"),
        }

        // 5. interactive
        if interactive_used {
            tracing::debug!("interactive sign-in already attempted this cycle");
        } else {
            let started_at = Utc::now();
            match environment {
                Environment::HostFrame => {
                    let result = self.strategies.popup.acquire().await;
                    match self.settle(attempts, StrategyKind::Popup, started_at, result).await {
                        Ok(token) => return Resolution::Token(token),
                        Err(reason) => last_failure = Some(reason),
                    }
                }
                Environment::Standalone => match self.strategies.redirect.begin().await {
                    Ok(ticket) => {
                        attempts.push(AcquisitionAttempt::new(
                            StrategyKind::Redirect,
                            started_at,
                            AttemptOutcome::Pending,
                        ));
                        return Resolution::Pending(ticket);
                    }
                    Err(reason) => {
                        tracing::warn!(strategy = %StrategyKind::Redirect, error = %reason, "strategy failed");
                        attempts.push(AcquisitionAttempt::new(
                            StrategyKind::Redirect,
                            started_at,
                            AttemptOutcome::Failure(reason.clone()),
                        ));
                        last_failure = Some(reason);
                    }
                },
            }
        }

        // 6. terminal
        let last = last_failure.unwrap_or_else(|| FailureReason::InteractionRequired {
            message: "no strategy was applicable".to_string(),
        });
        Resolution::Failed(FailureReason::AllStrategiesExhausted { last: Box::new(last) })
    }

    async fn check_pending_redirect(&self, attempts: &mut Vec<AcquisitionAttempt>) -> RedirectCheck {
        let response = self.session.take_redirect_response();
        let pending = match self.session.redirects().load() {
            Ok(pending) => pending,
            Err(e) => {
                tracing::warn!(error = %e, "failed to load pending redirect");
                None
            }
        };

        match (pending, response) {
            (None, None) => RedirectCheck::NothingPending,
            (None, Some(_)) => {
                tracing::warn!("ignoring redirect response: no sign-in is pending");
                RedirectCheck::NothingPending
            }
            (Some(pending), Some(response)) => {
                // The record is single use whatever the outcome.
                self.clear_pending_redirect();
                let started_at = Utc::now();
                let result = self.strategies.redirect.complete(&pending, response).await;
                match self
                    .settle(attempts, StrategyKind::RedirectCompletion, started_at, result)
                    .await
                {
                    Ok(token) => RedirectCheck::Resolved(token),
                    Err(reason) => RedirectCheck::Failed(reason),
                }
            }
            (Some(pending), None) => {
                if pending.is_stale(self.session.config().redirect_ttl()) {
                    tracing::info!(started_at = %pending.started_at, "discarding abandoned redirect sign-in");
                    self.clear_pending_redirect();
                    RedirectCheck::NothingPending
                } else {
                    attempts.push(AcquisitionAttempt::new(
                        StrategyKind::RedirectCompletion,
                        Utc::now(),
                        AttemptOutcome::Pending,
                    ));
                    RedirectCheck::Waiting(RedirectTicket::from(&pending))
                }
            }
        }
    }

    fn clear_pending_redirect(&self) {
        if let Err(e) = self.session.redirects().clear() {
            tracing::warn!(error = %e, "failed to clear pending redirect");
        }
    }

    async fn detect_environment(&self) -> Environment {
        if let Some(environment) = self.session.environment() {
            return environment;
        }

        let limit = self.session.config().network_timeout();
        let detected = match tokio::time::timeout(limit, self.strategies.host.initialize()).await {
            Ok(Ok(())) => Environment::HostFrame,
            Ok(Err(reason)) => {
                tracing::debug!(error = %reason, "host SDK unavailable, running standalone");
                Environment::Standalone
            }
            Err(_) => {
                tracing::warn!("host SDK initialisation timed out, running standalone");
                Environment::Standalone
            }
        };

        let environment = self.session.set_environment(detected);
        tracing::info!(%environment, "environment detected");
        environment
    }

    async fn exchange_via_backend(&self, attempts: &mut Vec<AcquisitionAttempt>) -> Result<AccessToken, FailureReason> {
        let started_at = Utc::now();
        let result = match self.strategies.host.assertion().await {
            Ok(assertion) => {
                self.bounded("backend exchange", self.strategies.backend.exchange(&assertion))
                    .await
            }
            Err(reason) => Err(reason),
        };
        self.settle(attempts, StrategyKind::BackendExchange, started_at, result)
            .await
    }

    async fn bounded<F>(&self, operation: &str, call: F) -> Result<TokenGrant, FailureReason>
    where
        F: Future<Output = Result<TokenGrant, FailureReason>>,
    {
        let limit = self.session.config().network_timeout();
        match tokio::time::timeout(limit, call).await {
            Ok(result) => result,
            Err(_) => Err(FailureReason::Timeout {
                operation: operation.to_string(),
                seconds: limit.as_secs(),
            }),
        }
    }

    /// Record the attempt; on success write the grant to the cache.
    async fn settle(
        &self,
        attempts: &mut Vec<AcquisitionAttempt>,
        strategy: StrategyKind,
        started_at: chrono::DateTime<Utc>,
        result: Result<TokenGrant, FailureReason>,
    ) -> Result<AccessToken, FailureReason> {
        match result {
            Ok(grant) => {
                tracing::info!(%strategy, "strategy succeeded");
                if let Err(e) = self.session.cache().save(&grant).await {
                    tracing::warn!(error = %e, "failed to update token cache");
                }
                attempts.push(AcquisitionAttempt::new(
                    strategy,
                    started_at,
                    AttemptOutcome::Success(grant.token.clone()),
                ));
                Ok(grant.token)
            }
            Err(reason) => {
                tracing::warn!(%strategy, error = %reason, retryable = reason.is_retryable(), "strategy failed");
                attempts.push(AcquisitionAttempt::new(
                    strategy,
                    started_at,
                    AttemptOutcome::Failure(reason.clone()),
                ));
                Err(reason)
            }
        }
    }
}

impl std::fmt::Debug for AcquisitionEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AcquisitionEngine")
            .field("session", &self.session)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolution_accessors() {
        let token = AccessToken::new("t");
        assert_eq!(Resolution::Token(token.clone()).token(), Some(&token));
        assert!(Resolution::Failed(FailureReason::UserCancelled).token().is_none());

        let pending = Resolution::Pending(RedirectTicket {
            authorization_url: "https://login.example.com".to_string(),
            started_at: Utc::now(),
        });
        assert!(pending.is_pending());
        assert!(pending.token().is_none());
    }
}
