//! Domain model types for drivebridge.
//!
//! This module defines the core types shared by the engine and its strategies:
//! - [`Environment`] - Whether we run inside the trusted host frame
//! - [`AccountId`] - Identifier of the signed-in account held by the cache
//! - [`StrategyKind`] - The acquisition strategies the engine can invoke
//! - [`AcquisitionAttempt`] - Record of one strategy invocation within a cycle

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use crate::token::{AccessToken, FailureReason};

/// Hosting context of the application, detected once per session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    /// Running inside the embedding host application, which can issue
    /// identity assertions.
    HostFrame,

    /// Running on its own (plain browser tab, terminal).
    Standalone,
}

impl Environment {
    /// Whether interactive sign-in must avoid navigating away.
    ///
    /// Inside a host frame a full-page redirect would navigate the host
    /// rather than the application.
    pub fn is_embedded(&self) -> bool {
        matches!(self, Self::HostFrame)
    }
}

impl fmt::Display for Environment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::HostFrame => write!(f, "host-frame"),
            Self::Standalone => write!(f, "standalone"),
        }
    }
}

/// Identifier for an account known to the identity provider.
///
/// Usually the provider's home account id or the user principal name.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AccountId(String);

impl AccountId {
    /// Create a new account ID.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Get the account ID as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AccountId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AccountId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for AccountId {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

/// The acquisition strategies, in the engine's order of preference.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    /// Completion of a redirect sign-in started by a previous load.
    RedirectCompletion,

    /// Host assertion traded for a resource token by the backend.
    BackendExchange,

    /// Token minted from the cached account without user interaction.
    Silent,

    /// Interactive sign-in in a separate window.
    Popup,

    /// Interactive sign-in by navigating the whole application away.
    Redirect,
}

impl StrategyKind {
    /// Get the strategy name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::RedirectCompletion => "redirect_completion",
            Self::BackendExchange => "backend_exchange",
            Self::Silent => "silent",
            Self::Popup => "popup",
            Self::Redirect => "redirect",
        }
    }

    /// Whether this strategy requires the user to be present.
    pub fn is_interactive(&self) -> bool {
        matches!(self, Self::Popup | Self::Redirect | Self::RedirectCompletion)
    }
}

impl fmt::Display for StrategyKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Outcome of a single strategy invocation.
#[derive(Debug, Clone)]
pub enum AttemptOutcome {
    /// The strategy produced a token.
    Success(AccessToken),

    /// The strategy failed; the engine moves on or gives up.
    Failure(FailureReason),

    /// Control left the application (redirect in flight).
    Pending,
}

impl AttemptOutcome {
    /// Whether the attempt produced a token.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }
}

/// Record of one strategy invocation within a resolution cycle.
///
/// Created by the engine per attempt and discarded when the next cycle starts.
#[derive(Debug, Clone)]
pub struct AcquisitionAttempt {
    /// Unique id, useful for correlating log lines.
    pub id: Uuid,

    /// Which strategy was invoked.
    pub strategy: StrategyKind,

    /// When the invocation started.
    pub started_at: DateTime<Utc>,

    /// How it ended.
    pub outcome: AttemptOutcome,
}

impl AcquisitionAttempt {
    /// Create a record for an attempt that started at `started_at`.
    pub fn new(strategy: StrategyKind, started_at: DateTime<Utc>, outcome: AttemptOutcome) -> Self {
        Self {
            id: Uuid::new_v4(),
            strategy,
            started_at,
            outcome,
        }
    }
}
