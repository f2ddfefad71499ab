//! On-behalf-of token exchange.
//!
//! A confidential client trades a user's identity assertion for a token scoped
//! to a downstream resource (JWT bearer grant with
//! `requested_token_use=on_behalf_of`). The backend endpoint runs this; the
//! provider's JSON response is handed back untouched.

use serde_json::Value;
use std::time::Duration;
use thiserror::Error;

use crate::secret::Secret;

/// Grant type for the on-behalf-of exchange.
pub const JWT_BEARER_GRANT: &str = "urn:ietf:params:oauth:grant-type:jwt-bearer";

/// Error type for the on-behalf-of exchange.
#[derive(Debug, Error)]
pub enum OnBehalfOfError {
    /// The provider answered with a non-success status.
    #[error("identity provider rejected the exchange with status {status}")]
    Rejected { status: u16, body: Value },

    /// The provider could not be reached or did not answer in time.
    #[error("identity provider request failed: {message}")]
    Transport { message: String },

    /// The provider answered with something that is not JSON.
    #[error("identity provider returned an unreadable body: {message}")]
    InvalidBody { message: String },
}

impl OnBehalfOfError {
    /// Details suitable for the `details` field of an error response.
    pub fn details(&self) -> Value {
        match self {
            Self::Rejected { body, .. } => body.clone(),
            other => Value::String(other.to_string()),
        }
    }
}

/// Confidential client performing on-behalf-of exchanges.
#[derive(Clone)]
pub struct OnBehalfOfClient {
    http: reqwest::Client,
    token_url: String,
    client_id: String,
    client_secret: Secret,
    scope: String,
}

impl OnBehalfOfClient {
    /// Create a client for the given token endpoint.
    pub fn new(
        token_url: impl Into<String>,
        client_id: impl Into<String>,
        client_secret: Secret,
        scope: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, OnBehalfOfError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| OnBehalfOfError::Transport {
                message: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            http,
            token_url: token_url.into(),
            client_id: client_id.into(),
            client_secret,
            scope: scope.into(),
        })
    }

    /// The token endpoint this client posts to.
    pub fn token_url(&self) -> &str {
        &self.token_url
    }

    /// Exchange `assertion` and return the provider's response body.
    pub async fn exchange(&self, assertion: &Secret) -> Result<Value, OnBehalfOfError> {
        let params = [
            ("client_id", self.client_id.as_str()),
            ("client_secret", self.client_secret.expose()),
            ("grant_type", JWT_BEARER_GRANT),
            ("assertion", assertion.expose()),
            ("scope", self.scope.as_str()),
            ("requested_token_use", "on_behalf_of"),
        ];

        let response = self
            .http
            .post(&self.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| OnBehalfOfError::Transport {
                message: e.to_string(),
            })?;

        let status = response.status();
        let text = response.text().await.map_err(|e| OnBehalfOfError::Transport {
            message: e.to_string(),
        })?;

        if !status.is_success() {
            let body = serde_json::from_str(&text).unwrap_or(Value::String(text));
            return Err(OnBehalfOfError::Rejected {
                status: status.as_u16(),
                body,
            });
        }

        serde_json::from_str(&text).map_err(|e| OnBehalfOfError::InvalidBody {
            message: e.to_string(),
        })
    }
}

impl std::fmt::Debug for OnBehalfOfClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OnBehalfOfClient")
            .field("token_url", &self.token_url)
            .field("client_id", &self.client_id)
            .field("scope", &self.scope)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use wiremock::matchers::{body_string_contains, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(server: &MockServer) -> OnBehalfOfClient {
        OnBehalfOfClient::new(
            format!("{}/tenant/oauth2/v2.0/token", server.uri()),
            "app-id",
            Secret::new("app-secret"),
            "https://graph.microsoft.com/.default",
            Duration::from_secs(5),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn test_exchange_posts_obo_form_and_passes_body_through() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/tenant/oauth2/v2.0/token"))
            .and(body_string_contains("requested_token_use=on_behalf_of"))
            .and(body_string_contains("assertion=host-assertion"))
            .and(body_string_contains("grant-type%3Ajwt-bearer"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "token_type": "Bearer",
                "access_token": "graph-token",
                "expires_in": 3599,
                "scope": "Files.Read.All",
                "ext_expires_in": 3599
            })))
            .expect(1)
            .mount(&server)
            .await;

        let body = client(&server)
            .exchange(&Secret::new("host-assertion"))
            .await
            .unwrap();

        assert_eq!(body["access_token"], "graph-token");
        assert_eq!(body["ext_expires_in"], 3599);
    }

    #[tokio::test]
    async fn test_exchange_rejection_keeps_provider_body() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "error": "invalid_grant",
                "error_description": "AADSTS50013: Assertion failed signature validation."
            })))
            .mount(&server)
            .await;

        let err = client(&server)
            .exchange(&Secret::new("bad"))
            .await
            .unwrap_err();

        match &err {
            OnBehalfOfError::Rejected { status, body } => {
                assert_eq!(*status, 400);
                assert_eq!(body["error"], "invalid_grant");
            }
            other => panic!("unexpected error: {:?}", other),
        }
        assert_eq!(err.details()["error"], "invalid_grant");
    }

    #[test]
    fn test_debug_hides_secret() {
        let client = OnBehalfOfClient::new(
            "https://login.example.com/t/oauth2/v2.0/token",
            "id",
            Secret::new("very-secret"),
            "scope",
            Duration::from_secs(1),
        )
        .unwrap();
        assert!(!format!("{:?}", client).contains("very-secret"));
    }
}
