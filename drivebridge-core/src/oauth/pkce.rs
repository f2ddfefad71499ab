//! Authorization Code flow with PKCE (Proof Key for Code Exchange).
//!
//! Both interactive strategies sign the user in with this flow. They differ
//! only in how the authorization response comes back:
//!
//! - popup: a loopback listener on the redirect URI's port receives it while
//!   the application waits
//! - redirect: the application is gone; the response is handed over on the
//!   next start and paired with the persisted verifier
//!
//! # Flow Overview
//!
//! 1. Generate PKCE code verifier and challenge
//! 2. Build authorization URL with state and PKCE challenge
//! 3. User authorizes in browser
//! 4. Receive authorization code via redirect
//! 5. Exchange code for tokens using PKCE verifier

use oauth2::basic::BasicClient;
use oauth2::reqwest::async_http_client;
use oauth2::{AuthorizationCode, CsrfToken, PkceCodeChallenge, PkceCodeVerifier, Scope};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use url::Url;

use super::{classify_token_error, create_oauth_client, grant_from_response};
use crate::config::AuthConfig;
use crate::redirect::RedirectResponse;
use crate::secret::Secret;
use crate::token::{FailureReason, TokenGrant};

/// An authorization request ready to be opened in a browser.
#[derive(Debug, Clone)]
pub struct AuthorizationRequest {
    /// URL the user must visit.
    pub url: String,

    /// Anti-forgery state to verify on the way back.
    pub csrf_state: String,

    /// Verifier needed to redeem the code.
    pub pkce_verifier: Secret,
}

/// PKCE flow for the configured public client.
pub struct PkceFlow {
    client: BasicClient,
    scopes: Vec<String>,
    tenant_id: String,
}

impl PkceFlow {
    /// Create a flow from client configuration.
    pub fn new(config: &AuthConfig) -> Result<Self, FailureReason> {
        Ok(Self {
            client: create_oauth_client(config, None, true)?,
            scopes: config.scopes.clone(),
            tenant_id: config.tenant_id.clone(),
        })
    }

    /// Build an authorization URL with a fresh PKCE challenge and CSRF state.
    pub fn build_authorization_url(&self) -> AuthorizationRequest {
        let (pkce_challenge, pkce_verifier) = PkceCodeChallenge::new_random_sha256();

        let mut auth_request = self
            .client
            .authorize_url(CsrfToken::new_random)
            .set_pkce_challenge(pkce_challenge);

        for scope in &self.scopes {
            auth_request = auth_request.add_scope(Scope::new(scope.clone()));
        }

        let (url, csrf_state) = auth_request.url();

        AuthorizationRequest {
            url: url.to_string(),
            csrf_state: csrf_state.secret().clone(),
            pkce_verifier: Secret::new(pkce_verifier.secret().clone()),
        }
    }

    /// Exchange an authorization code for tokens.
    pub async fn exchange_code(&self, code: &Secret, verifier: &Secret) -> Result<TokenGrant, FailureReason> {
        let response = self
            .client
            .exchange_code(AuthorizationCode::new(code.expose().to_string()))
            .set_pkce_verifier(PkceCodeVerifier::new(verifier.expose().to_string()))
            .request_async(async_http_client)
            .await
            .map_err(classify_token_error)?;

        Ok(grant_from_response(&response, &self.tenant_id, None))
    }
}

/// Check an authorization response against the state we sent and extract the code.
pub fn verify_response(response: RedirectResponse, expected_state: &str) -> Result<Secret, FailureReason> {
    match response {
        RedirectResponse::Error { error, description, .. } => {
            if error == "access_denied" {
                Err(FailureReason::UserCancelled)
            } else {
                Err(FailureReason::InteractionError {
                    message: match description {
                        Some(d) => format!("{}: {}", error, d),
                        None => error,
                    },
                })
            }
        }
        RedirectResponse::Code { code, state } => {
            if state != expected_state {
                return Err(FailureReason::RedirectStateMismatch);
            }
            Ok(code)
        }
    }
}

/// Bind the loopback listener for the configured redirect URI.
///
/// Must be called before the browser is opened so the response cannot race
/// the listener.
pub async fn bind_callback_listener(redirect_uri: &str) -> Result<TcpListener, FailureReason> {
    let url = Url::parse(redirect_uri).map_err(|e| FailureReason::InteractionError {
        message: format!("invalid redirect URI: {}", e),
    })?;
    let port = url.port_or_known_default().unwrap_or(80);
    let addr = format!("127.0.0.1:{}", port);

    TcpListener::bind(&addr)
        .await
        .map_err(|e| FailureReason::InteractionError {
            message: format!("failed to bind callback listener on {}: {}", addr, e),
        })
}

/// Wait on `listener` for the authorization response and return it.
///
/// Requests that are not an authorization response (favicon fetches and the
/// like) are answered with 404 and ignored.
pub async fn accept_callback(listener: &TcpListener) -> Result<RedirectResponse, FailureReason> {
    loop {
        let (mut socket, _) = listener
            .accept()
            .await
            .map_err(|e| FailureReason::InteractionError {
                message: format!("failed to accept connection: {}", e),
            })?;

        let head = read_request_head(&mut socket)
            .await
            .map_err(|e| FailureReason::InteractionError {
                message: format!("failed to read request: {}", e),
            })?;

        let request = String::from_utf8_lossy(&head);
        let parsed = request
            .lines()
            .next()
            .and_then(|line| line.split_whitespace().nth(1))
            .and_then(|path| RedirectResponse::from_callback_url(&format!("http://localhost{}", path)).ok());

        match parsed {
            Some(response) => {
                let body: &[u8] = match &response {
                    RedirectResponse::Code { .. } => {
                        b"HTTP/1.1 200 OK\r\nContent-Type: text/html\r\n\r\n\
                        <html><body><h1>Signed in</h1>\
                        <p>You can close this window and return to the application.</p></body></html>"
                    }
                    RedirectResponse::Error { .. } => {
                        b"HTTP/1.1 200 OK\r\nContent-Type: text/html\r\n\r\n\
                        <html><body><h1>Sign-in failed</h1>\
                        <p>The identity provider returned an error.</p></body></html>"
                    }
                };
                let _ = socket.write_all(body).await;
                return Ok(response);
            }
            None => {
                let _ = socket.write_all(b"HTTP/1.1 404 Not Found\r\n\r\n").await;
            }
        }
    }
}

/// Largest request head the callback listener buffers.
const MAX_REQUEST_HEAD: usize = 4096;

/// Read from `socket` until the end of the request head, EOF, or
/// [`MAX_REQUEST_HEAD`] bytes.
async fn read_request_head<R>(socket: &mut R) -> std::io::Result<Vec<u8>>
where
    R: AsyncRead + Unpin,
{
    let mut head = Vec::with_capacity(1024);
    let mut chunk = [0u8; 1024];

    while head.len() < MAX_REQUEST_HEAD && !head.windows(4).any(|w| w == b"\r\n\r\n") {
        let n = socket.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        let room = MAX_REQUEST_HEAD - head.len();
        head.extend_from_slice(&chunk[..n.min(room)]);
    }

    Ok(head)
}
