//! `exchangeViaBackend` over HTTP.
//!
//! Posts `{ "token": <assertion> }` to the backend's `/token` endpoint, which
//! performs the on-behalf-of exchange and passes the identity provider's
//! response through.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use super::BackendExchange;
use crate::config::AuthConfig;
use crate::secret::Secret;
use crate::token::{AccessToken, CachedAccount, FailureReason, SIGNED_IN_ACCOUNT, TokenGrant, parse_scopes};

/// Error message the backend returns when the request carries no assertion.
pub const MISSING_ASSERTION_ERROR: &str = "Missing Teams token";

/// Request body of the exchange endpoint.
#[derive(Debug, Serialize, Deserialize)]
pub struct ExchangeRequest {
    pub token: String,
}

/// The parts of the identity provider's token response we read.
#[derive(Debug, Deserialize)]
struct ExchangeResponse {
    access_token: Option<String>,
    token_type: Option<String>,
    expires_in: Option<Value>,
    scope: Option<String>,
    refresh_token: Option<String>,
}

/// Error body of the exchange endpoint.
#[derive(Debug, Deserialize)]
struct ExchangeErrorBody {
    error: Option<String>,
    details: Option<Value>,
}

/// Backend exchange client.
#[derive(Clone)]
pub struct HttpBackendExchange {
    http: reqwest::Client,
    exchange_url: String,
    tenant_id: String,
    timeout_secs: u64,
}

impl HttpBackendExchange {
    /// Create a client for the configured backend.
    pub fn new(config: &AuthConfig) -> Result<Self, FailureReason> {
        let http = reqwest::Client::builder()
            .timeout(config.network_timeout())
            .build()
            .map_err(|e| FailureReason::BackendUnreachable {
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            http,
            exchange_url: config.exchange_url(),
            tenant_id: config.tenant_id.clone(),
            timeout_secs: config.network_timeout_secs,
        })
    }

    fn classify_error(status: reqwest::StatusCode, text: &str) -> FailureReason {
        let body: Option<ExchangeErrorBody> = serde_json::from_str(text).ok();
        let (error, details) = match body {
            Some(b) => (b.error, b.details),
            None => (None, None),
        };

        if status == reqwest::StatusCode::BAD_REQUEST && error.as_deref() == Some(MISSING_ASSERTION_ERROR) {
            return FailureReason::AssertionUnavailable {
                message: MISSING_ASSERTION_ERROR.to_string(),
            };
        }

        FailureReason::ExchangeRejected {
            error: error.unwrap_or_else(|| format!("HTTP {}", status.as_u16())),
            details: details.map(|d| match d {
                Value::String(s) => s,
                other => other.to_string(),
            }),
        }
    }

    fn grant_from_body(&self, body: ExchangeResponse) -> Result<TokenGrant, FailureReason> {
        let access_token = body
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| FailureReason::MalformedResponse {
                message: "exchange response has no access_token".to_string(),
            })?;

        let mut token = AccessToken::new(access_token);
        if let Some(token_type) = body.token_type {
            token.token_type = token_type;
        }
        if let Some(scope) = body.scope.as_deref() {
            token.scopes = parse_scopes(scope);
        }
        // Some providers send expires_in as a string.
        let lifetime = body.expires_in.and_then(|v| match v {
            Value::Number(n) => n.as_i64(),
            Value::String(s) => s.parse().ok(),
            _ => None,
        });
        if let Some(seconds) = lifetime {
            token = token.expiring_in(seconds);
        }

        let mut grant = TokenGrant::new(token);
        if let Some(refresh_token) = body.refresh_token {
            grant = grant.with_account(
                CachedAccount::new(SIGNED_IN_ACCOUNT)
                    .with_tenant(self.tenant_id.clone())
                    .with_refresh_token(refresh_token),
            );
        }
        Ok(grant)
    }
}

impl std::fmt::Debug for HttpBackendExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HttpBackendExchange")
            .field("exchange_url", &self.exchange_url)
            .finish()
    }
}

#[async_trait]
impl BackendExchange for HttpBackendExchange {
    async fn exchange(&self, assertion: &Secret) -> Result<TokenGrant, FailureReason> {
        tracing::debug!(url = %self.exchange_url, "exchanging host assertion via backend");

        let response = self
            .http
            .post(&self.exchange_url)
            .json(&ExchangeRequest {
                token: assertion.expose().to_string(),
            })
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    FailureReason::Timeout {
                        operation: "backend exchange".to_string(),
                        seconds: self.timeout_secs,
                    }
                } else {
                    FailureReason::BackendUnreachable {
                        message: e.to_string(),
                    }
                }
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| FailureReason::BackendUnreachable {
            message: format!("failed to read exchange response: {}", e),
        })?;

        if !status.is_success() {
            return Err(Self::classify_error(status, &text));
        }

        let body: ExchangeResponse = serde_json::from_str(&text).map_err(|e| FailureReason::MalformedResponse {
            message: format!("invalid exchange response: {}", e),
        })?;
        self.grant_from_body(body)
    }
}
