//! Tokens and the acquisition failure taxonomy.
//!
//! This module provides:
//! - [`AccessToken`] - Opaque bearer credential with expiry and scopes
//! - [`CachedAccount`] - The account the token cache remembers between cycles
//! - [`TokenGrant`] - What a successful strategy hands back to the engine
//! - [`FailureReason`] - Typed reasons a strategy (or a whole cycle) failed

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use thiserror::Error;

use crate::model::AccountId;
use crate::secret::Secret;

/// Why an acquisition attempt failed.
///
/// Every variant except [`FailureReason::AllStrategiesExhausted`] is an
/// intermediate signal the engine absorbs before moving to the next strategy.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FailureReason {
    /// The host SDK is absent or failed to initialise.
    #[error("environment detection failed: {message}")]
    EnvironmentDetectionFailed { message: String },

    /// The host did not hand out an identity assertion.
    #[error("identity assertion unavailable: {message}")]
    AssertionUnavailable { message: String },

    /// The backend exchange endpoint could not be reached.
    #[error("backend unreachable: {message}")]
    BackendUnreachable { message: String },

    /// A network-bound strategy did not answer in time.
    #[error("{operation} timed out after {seconds}s")]
    Timeout { operation: String, seconds: u64 },

    /// The identity provider declined the exchange.
    #[error("exchange rejected: {error}{}", .details.as_deref().map(|d| format!(" ({d})")).unwrap_or_default())]
    ExchangeRejected {
        error: String,
        details: Option<String>,
    },

    /// A response could not be understood.
    #[error("malformed response: {message}")]
    MalformedResponse { message: String },

    /// Cached credentials cannot mint a token without the user.
    #[error("interaction required: {message}")]
    InteractionRequired { message: String },

    /// The cached account does not belong to the configured directory.
    #[error("account mismatch: expected tenant {expected}, cached account is from {found}")]
    AccountMismatch { expected: String, found: String },

    /// The user closed or declined the sign-in.
    #[error("sign-in cancelled by the user")]
    UserCancelled,

    /// The sign-in window could not be opened.
    #[error("sign-in window blocked: {message}")]
    PopupBlocked { message: String },

    /// The interactive flow failed for another reason.
    #[error("interactive sign-in failed: {message}")]
    InteractionError { message: String },

    /// The authorization response does not belong to the pending sign-in.
    #[error("authorization response state does not match the pending sign-in")]
    RedirectStateMismatch,

    /// Every applicable strategy was tried and none produced a token.
    #[error("all token acquisition strategies exhausted (last failure: {last})")]
    AllStrategiesExhausted { last: Box<FailureReason> },
}

impl FailureReason {
    /// Whether retrying later may succeed without any change on the user's side.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::BackendUnreachable { .. })
    }

    /// Whether this is the terminal outcome of a cycle.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::AllStrategiesExhausted { .. })
    }
}

/// An opaque bearer credential for the resource API.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessToken {
    /// The token value.
    pub value: Secret,

    /// Token type (usually "Bearer").
    pub token_type: String,

    /// When this token expires (None if unknown).
    pub expires_at: Option<DateTime<Utc>>,

    /// Scopes granted to this token.
    pub scopes: BTreeSet<String>,
}

impl AccessToken {
    /// Create a new bearer token.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: Secret::new(value),
            token_type: "Bearer".to_string(),
            expires_at: None,
            scopes: BTreeSet::new(),
        }
    }

    /// Set the expiration time.
    pub fn with_expiry(mut self, expires_at: DateTime<Utc>) -> Self {
        self.expires_at = Some(expires_at);
        self
    }

    /// Set the expiration from a relative lifetime in seconds.
    ///
    /// A lifetime past the representable range leaves the expiry unknown.
    pub fn expiring_in(mut self, seconds: i64) -> Self {
        self.expires_at = Duration::try_seconds(seconds).and_then(|lifetime| Utc::now().checked_add_signed(lifetime));
        self
    }

    /// Set the granted scopes.
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Check if this token has expired.
    ///
    /// Returns `false` if no expiration is set.
    pub fn is_expired(&self) -> bool {
        self.expires_at.map(|exp| exp < Utc::now()).unwrap_or(false)
    }

    /// Check if this token will expire within the given duration.
    pub fn expires_within(&self, duration: Duration) -> bool {
        self.expires_at
            .map(|exp| exp < Utc::now() + duration)
            .unwrap_or(false)
    }

    /// Get the Authorization header value.
    pub fn authorization_header(&self) -> String {
        format!("{} {}", self.token_type, self.value.expose())
    }
}

/// Account id recorded when a token response does not name the user.
pub const SIGNED_IN_ACCOUNT: &str = "me";

/// The account remembered by the token cache.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CachedAccount {
    /// Provider-side account identifier.
    pub id: AccountId,

    /// Directory (tenant) the account signed in to, when known.
    pub tenant_id: Option<String>,

    /// Display name or user principal name, when known.
    pub username: Option<String>,

    /// Refresh credential used by silent acquisition.
    pub refresh_token: Option<Secret>,
}

impl CachedAccount {
    /// Create an account with no refresh capability.
    pub fn new(id: impl Into<AccountId>) -> Self {
        Self {
            id: id.into(),
            tenant_id: None,
            username: None,
            refresh_token: None,
        }
    }

    /// Attach the directory the account belongs to.
    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = Some(tenant_id.into());
        self
    }

    /// Attach a display name.
    pub fn with_username(mut self, username: impl Into<String>) -> Self {
        self.username = Some(username.into());
        self
    }

    /// Attach a refresh token.
    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(Secret::new(refresh_token));
        self
    }
}

/// Result of a successful strategy: the token plus, when the strategy learns
/// it, the account it was issued to.
#[derive(Debug, Clone)]
pub struct TokenGrant {
    /// The freshly minted access token.
    pub token: AccessToken,

    /// Account metadata to remember for silent acquisition.
    pub account: Option<CachedAccount>,
}

impl TokenGrant {
    /// A grant that carries no account metadata.
    pub fn new(token: AccessToken) -> Self {
        Self {
            token,
            account: None,
        }
    }

    /// Attach the account the token was issued to.
    pub fn with_account(mut self, account: CachedAccount) -> Self {
        self.account = Some(account);
        self
    }
}

/// Split an OAuth `scope` string (space separated) into a set.
pub fn parse_scopes(scope: &str) -> BTreeSet<String> {
    scope
        .split_whitespace()
        .map(str::to_string)
        .collect()
}
