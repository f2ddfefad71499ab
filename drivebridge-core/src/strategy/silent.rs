//! `silentAcquire` through the refresh token grant.

use async_trait::async_trait;
use oauth2::basic::BasicClient;
use oauth2::reqwest::async_http_client;
use oauth2::{RefreshToken, Scope};

use super::SilentAcquirer;
use crate::config::AuthConfig;
use crate::oauth::{classify_token_error, create_oauth_client, grant_from_response};
use crate::token::{CachedAccount, FailureReason, TokenGrant};

/// Silent acquisition using the cached account's refresh token.
pub struct RefreshTokenSilent {
    client: BasicClient,
    scopes: Vec<String>,
    tenant_id: String,
}

impl RefreshTokenSilent {
    /// Create the strategy for the configured public client.
    pub fn new(config: &AuthConfig) -> Result<Self, FailureReason> {
        Ok(Self {
            client: create_oauth_client(config, None, false)?,
            scopes: config.scopes.clone(),
            tenant_id: config.tenant_id.clone(),
        })
    }
}

#[async_trait]
impl SilentAcquirer for RefreshTokenSilent {
    async fn acquire(&self, account: &CachedAccount) -> Result<TokenGrant, FailureReason> {
        if let Some(tenant) = &account.tenant_id {
            if tenant != &self.tenant_id {
                return Err(FailureReason::AccountMismatch {
                    expected: self.tenant_id.clone(),
                    found: tenant.clone(),
                });
            }
        }

        let refresh_token = account
            .refresh_token
            .as_ref()
            .ok_or_else(|| FailureReason::InteractionRequired {
                message: format!("no refresh token cached for {}", account.id),
            })?;

        let refresh = RefreshToken::new(refresh_token.expose().to_string());
        let mut request = self.client.exchange_refresh_token(&refresh);
        for scope in &self.scopes {
            request = request.add_scope(Scope::new(scope.clone()));
        }

        let response = request
            .request_async(async_http_client)
            .await
            .map_err(classify_token_error)?;

        let mut grant = grant_from_response(&response, &self.tenant_id, Some(refresh_token));
        if let Some(new_account) = grant.account.as_mut() {
            new_account.id = account.id.clone();
            new_account.username = account.username.clone();
        }

        tracing::debug!(account = %account.id, "silent acquisition succeeded");
        Ok(grant)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_account_from_other_tenant_is_rejected() {
        let silent = RefreshTokenSilent::new(&AuthConfig::new("app", "contoso")).unwrap();
        let account = CachedAccount::new("a")
            .with_tenant("fabrikam")
            .with_refresh_token("rt");

        let result = silent.acquire(&account).await;
        assert_eq!(
            result.unwrap_err(),
            FailureReason::AccountMismatch {
                expected: "contoso".to_string(),
                found: "fabrikam".to_string(),
            }
        );
    }

    #[tokio::test]
    async fn test_account_without_refresh_token_needs_interaction() {
        let silent = RefreshTokenSilent::new(&AuthConfig::new("app", "contoso")).unwrap();
        let account = CachedAccount::new("a").with_tenant("contoso");

        assert!(matches!(
            silent.acquire(&account).await,
            Err(FailureReason::InteractionRequired { .. })
        ));
    }
}
