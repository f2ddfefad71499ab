//! OAuth 2.0 flow implementations against the identity provider.
//!
//! This module provides:
//! - [`pkce`] - Authorization Code flow with PKCE (popup and redirect sign-in)
//! - [`on_behalf_of`] - On-behalf-of exchange used by the backend endpoint
//!
//! # Features
//!
//! This module is only available when the `oauth` feature is enabled.

pub mod on_behalf_of;
pub mod pkce;

use oauth2::basic::{BasicClient, BasicErrorResponse, BasicErrorResponseType, BasicTokenResponse};
use oauth2::{AuthUrl, ClientId, ClientSecret, RedirectUrl, RequestTokenError, TokenResponse, TokenUrl};

use crate::config::AuthConfig;
use crate::secret::Secret;
use crate::token::{AccessToken, CachedAccount, FailureReason, SIGNED_IN_ACCOUNT, TokenGrant};

/// Create an OAuth2 client for the configured application and directory.
///
/// # Arguments
///
/// * `config` - Client configuration (authority, tenant, client id)
/// * `client_secret` - Secret for confidential clients; `None` for public clients
/// * `with_redirect` - Whether to register the configured redirect URI
pub fn create_oauth_client(
    config: &AuthConfig,
    client_secret: Option<&Secret>,
    with_redirect: bool,
) -> Result<BasicClient, FailureReason> {
    let auth_url = AuthUrl::new(config.authorize_url()).map_err(|e| FailureReason::InteractionError {
        message: format!("invalid auth URL: {}", e),
    })?;

    let token_url = TokenUrl::new(config.token_url()).map_err(|e| FailureReason::InteractionError {
        message: format!("invalid token URL: {}", e),
    })?;

    let mut client = BasicClient::new(
        ClientId::new(config.client_id.clone()),
        client_secret.map(|s| ClientSecret::new(s.expose().to_string())),
        auth_url,
        Some(token_url),
    );

    if with_redirect {
        let redirect_url =
            RedirectUrl::new(config.redirect_uri.clone()).map_err(|e| FailureReason::InteractionError {
                message: format!("invalid redirect URL: {}", e),
            })?;
        client = client.set_redirect_uri(redirect_url);
    }

    Ok(client)
}

/// Map a failed token request onto the acquisition taxonomy.
pub fn classify_token_error<RE>(err: RequestTokenError<RE, BasicErrorResponse>) -> FailureReason
where
    RE: std::error::Error + 'static,
{
    match err {
        RequestTokenError::ServerResponse(response) => {
            let description = response.error_description().cloned();
            match response.error() {
                BasicErrorResponseType::InvalidGrant => FailureReason::InteractionRequired {
                    message: description.unwrap_or_else(|| "invalid_grant".to_string()),
                },
                BasicErrorResponseType::Extension(code)
                    if matches!(
                        code.as_str(),
                        "interaction_required" | "login_required" | "consent_required"
                    ) =>
                {
                    FailureReason::InteractionRequired {
                        message: description.unwrap_or_else(|| code.clone()),
                    }
                }
                other => FailureReason::ExchangeRejected {
                    error: other.to_string(),
                    details: description,
                },
            }
        }
        RequestTokenError::Request(e) => FailureReason::BackendUnreachable {
            message: e.to_string(),
        },
        RequestTokenError::Parse(e, _) => FailureReason::MalformedResponse {
            message: e.to_string(),
        },
        RequestTokenError::Other(message) => FailureReason::MalformedResponse { message },
    }
}

/// Build a grant from a token endpoint response.
///
/// When the provider does not rotate the refresh token, `previous_refresh`
/// is carried over.
pub fn grant_from_response(
    response: &BasicTokenResponse,
    tenant_id: &str,
    previous_refresh: Option<&Secret>,
) -> TokenGrant {
    let mut token = AccessToken::new(response.access_token().secret().clone());

    if let Some(scopes) = response.scopes() {
        token = token.with_scopes(scopes.iter().map(|s| s.to_string()));
    }

    if let Some(seconds) = response.expires_in().and_then(|d| i64::try_from(d.as_secs()).ok()) {
        token = token.expiring_in(seconds);
    }

    let mut account = CachedAccount::new(SIGNED_IN_ACCOUNT).with_tenant(tenant_id);
    account.refresh_token = response
        .refresh_token()
        .map(|rt| Secret::new(rt.secret().clone()))
        .or_else(|| previous_refresh.cloned());

    TokenGrant::new(token).with_account(account)
}
