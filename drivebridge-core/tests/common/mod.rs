//! Scripted strategy doubles shared by the integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use drivebridge_core::{
    AccessToken, AcquisitionEngine, AuthConfig, AuthSession, CachedAccount, FailureReason, MemoryRedirectStore,
    MemoryTokenCache, PendingRedirect, RedirectResponse, RedirectStore, RedirectTicket, Secret, StrategySet,
    TokenGrant,
    strategy::{BackendExchange, HostBridge, PopupAcquirer, RedirectAcquirer, SilentAcquirer},
};

pub const PENDING_STATE: &str = "state-1";

pub fn grant(value: &str) -> TokenGrant {
    TokenGrant::new(AccessToken::new(value).expiring_in(3600))
}

pub fn account() -> CachedAccount {
    CachedAccount::new("alice@contoso.com")
        .with_tenant("contoso")
        .with_refresh_token("refresh-1")
}

/// Host SDK double.
pub struct MockHost {
    embedded: bool,
    assertion: Option<String>,
    pub init_calls: AtomicUsize,
    pub assertion_calls: AtomicUsize,
}

impl MockHost {
    pub fn new(embedded: bool, assertion: Option<&str>) -> Self {
        Self {
            embedded,
            assertion: assertion.map(str::to_string),
            init_calls: AtomicUsize::new(0),
            assertion_calls: AtomicUsize::new(0),
        }
    }
}

#[async_trait]
impl HostBridge for MockHost {
    async fn initialize(&self) -> Result<(), FailureReason> {
        self.init_calls.fetch_add(1, Ordering::SeqCst);
        if self.embedded {
            Ok(())
        } else {
            Err(FailureReason::EnvironmentDetectionFailed {
                message: "no host SDK".to_string(),
            })
        }
    }

    async fn assertion(&self) -> Result<Secret, FailureReason> {
        self.assertion_calls.fetch_add(1, Ordering::SeqCst);
        self.assertion
            .as_deref()
            .map(Secret::new)
            .ok_or_else(|| FailureReason::AssertionUnavailable {
                message: "host returned no assertion".to_string(),
            })
    }
}

/// A non-redirect strategy returning a scripted result.
pub struct MockStrategy {
    result: Mutex<Result<TokenGrant, FailureReason>>,
    delay: Mutex<Option<Duration>>,
    calls: AtomicUsize,
}

impl MockStrategy {
    pub fn failing(reason: FailureReason) -> Self {
        Self {
            result: Mutex::new(Err(reason)),
            delay: Mutex::new(None),
            calls: AtomicUsize::new(0),
        }
    }

    pub fn succeed_with(&self, grant: TokenGrant) {
        *self.result.lock() = Ok(grant);
    }

    pub fn fail_with(&self, reason: FailureReason) {
        *self.result.lock() = Err(reason);
    }

    pub fn delay_by(&self, delay: Duration) {
        *self.delay.lock() = Some(delay);
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    async fn invoke(&self) -> Result<TokenGrant, FailureReason> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        self.result.lock().clone()
    }
}

#[async_trait]
impl BackendExchange for MockStrategy {
    async fn exchange(&self, _assertion: &Secret) -> Result<TokenGrant, FailureReason> {
        self.invoke().await
    }
}

#[async_trait]
impl SilentAcquirer for MockStrategy {
    async fn acquire(&self, _account: &CachedAccount) -> Result<TokenGrant, FailureReason> {
        self.invoke().await
    }
}

#[async_trait]
impl PopupAcquirer for MockStrategy {
    async fn acquire(&self) -> Result<TokenGrant, FailureReason> {
        self.invoke().await
    }
}

/// Redirect double that persists a pending record like the real one.
pub struct MockRedirect {
    store: Arc<MemoryRedirectStore>,
    begin_failure: Mutex<Option<FailureReason>>,
    complete_result: Mutex<Result<TokenGrant, FailureReason>>,
    pub begin_calls: AtomicUsize,
    pub complete_calls: AtomicUsize,
}

impl MockRedirect {
    pub fn new(store: Arc<MemoryRedirectStore>) -> Self {
        Self {
            store,
            begin_failure: Mutex::new(None),
            complete_result: Mutex::new(Ok(grant("redirect-token"))),
            begin_calls: AtomicUsize::new(0),
            complete_calls: AtomicUsize::new(0),
        }
    }

    pub fn fail_begin(&self, reason: FailureReason) {
        *self.begin_failure.lock() = Some(reason);
    }

    pub fn complete_with(&self, result: Result<TokenGrant, FailureReason>) {
        *self.complete_result.lock() = result;
    }

    pub fn begins(&self) -> usize {
        self.begin_calls.load(Ordering::SeqCst)
    }

    pub fn completions(&self) -> usize {
        self.complete_calls.load(Ordering::SeqCst)
    }
}

pub fn pending_redirect(started_at: chrono::DateTime<Utc>) -> PendingRedirect {
    PendingRedirect {
        csrf_state: PENDING_STATE.to_string(),
        pkce_verifier: Secret::new("verifier-1"),
        authorization_url: "https://login.example.com/authorize?state=state-1".to_string(),
        started_at,
    }
}

#[async_trait]
impl RedirectAcquirer for MockRedirect {
    async fn begin(&self) -> Result<RedirectTicket, FailureReason> {
        self.begin_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(reason) = self.begin_failure.lock().clone() {
            return Err(reason);
        }
        let pending = pending_redirect(Utc::now());
        self.store
            .save(&pending)
            .map_err(|e| FailureReason::InteractionError { message: e.to_string() })?;
        Ok(RedirectTicket::from(&pending))
    }

    async fn complete(
        &self,
        pending: &PendingRedirect,
        response: RedirectResponse,
    ) -> Result<TokenGrant, FailureReason> {
        self.complete_calls.fetch_add(1, Ordering::SeqCst);
        if response.state() != Some(pending.csrf_state.as_str()) {
            return Err(FailureReason::RedirectStateMismatch);
        }
        self.complete_result.lock().clone()
    }
}

/// Strategy doubles plus the state that survives a simulated reload.
pub struct Harness {
    pub host: Arc<MockHost>,
    pub backend: Arc<MockStrategy>,
    pub silent: Arc<MockStrategy>,
    pub popup: Arc<MockStrategy>,
    pub redirect: Arc<MockRedirect>,
    pub cache: Arc<MemoryTokenCache>,
    pub redirects: Arc<MemoryRedirectStore>,
    pub config: AuthConfig,
}

impl Harness {
    fn build(host: MockHost) -> Self {
        let redirects = Arc::new(MemoryRedirectStore::new());
        Self {
            host: Arc::new(host),
            backend: Arc::new(MockStrategy::failing(FailureReason::ExchangeRejected {
                error: "invalid_grant".to_string(),
                details: None,
            })),
            silent: Arc::new(MockStrategy::failing(FailureReason::InteractionRequired {
                message: "refresh token expired".to_string(),
            })),
            popup: Arc::new(MockStrategy::failing(FailureReason::UserCancelled)),
            redirect: Arc::new(MockRedirect::new(redirects.clone())),
            cache: Arc::new(MemoryTokenCache::new()),
            redirects,
            config: AuthConfig::new("client-id", "contoso"),
        }
    }

    /// Inside the host frame, with an assertion available.
    pub fn host_frame() -> Self {
        Self::build(MockHost::new(true, Some("host-assertion")))
    }

    /// Inside the host frame, but the host hands out no assertion.
    pub fn host_frame_without_assertion() -> Self {
        Self::build(MockHost::new(true, None))
    }

    pub fn standalone() -> Self {
        Self::build(MockHost::new(false, None))
    }

    pub fn with_cached_account(mut self, account: CachedAccount) -> Self {
        self.cache = Arc::new(MemoryTokenCache::with_account(account));
        self
    }

    pub fn strategies(&self) -> StrategySet {
        StrategySet {
            host: self.host.clone(),
            backend: self.backend.clone(),
            silent: self.silent.clone(),
            popup: self.popup.clone(),
            redirect: self.redirect.clone(),
        }
    }

    pub fn session(&self) -> Arc<AuthSession> {
        Arc::new(AuthSession::new(
            self.config.clone(),
            self.cache.clone(),
            self.redirects.clone(),
        ))
    }

    /// A fresh engine, as after an application load.
    pub fn engine(&self) -> AcquisitionEngine {
        AcquisitionEngine::new(self.session(), self.strategies())
    }

    /// A fresh engine whose launcher delivered a redirect response.
    pub fn engine_with_response(&self, response: RedirectResponse) -> AcquisitionEngine {
        let session = self.session();
        session.deliver_redirect_response(response);
        AcquisitionEngine::new(session, self.strategies())
    }

    /// Calls to any interactive strategy.
    pub fn interactive_calls(&self) -> usize {
        self.popup.calls() + self.redirect.begins() + self.redirect.completions()
    }

    /// Calls to any strategy at all.
    pub fn strategy_calls(&self) -> usize {
        self.backend.calls() + self.silent.calls() + self.interactive_calls()
    }
}

pub fn code_response(state: &str) -> RedirectResponse {
    RedirectResponse::Code {
        code: Secret::new("auth-code"),
        state: state.to_string(),
    }
}
