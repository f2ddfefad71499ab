//! Request handlers for the exchange endpoint.

use anyhow::{Context, Result};
use axum::{
    Json,
    body::Bytes,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use drivebridge_core::{
    Secret,
    oauth::on_behalf_of::{OnBehalfOfClient, OnBehalfOfError},
};
use serde_json::Value;
use std::sync::Arc;
use thiserror::Error;
use tracing::{error, info};

use super::types::{ErrorBody, HealthResponse, TokenRequest};
use crate::config::ServerConfig;

/// Error returned when the request carries no assertion.
pub const MISSING_TOKEN: &str = "Missing Teams token";

/// State shared across handlers.
#[derive(Clone)]
pub struct ApiState {
    /// Confidential client for the on-behalf-of exchange.
    pub exchange: Arc<OnBehalfOfClient>,
}

impl ApiState {
    /// Create the state from server configuration.
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        let client = OnBehalfOfClient::new(
            config.token_url(),
            config.client_id.clone(),
            config.client_secret.clone(),
            config.scope.clone(),
            config.request_timeout(),
        )
        .context("Failed to create on-behalf-of client")?;

        Ok(Self {
            exchange: Arc::new(client),
        })
    }
}

/// Errors a handler can answer with.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Missing Teams token")]
    MissingToken,

    #[error("token exchange failed: {0}")]
    ExchangeFailed(#[from] OnBehalfOfError),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, body) = match self {
            ApiError::MissingToken => (
                StatusCode::BAD_REQUEST,
                ErrorBody {
                    error: MISSING_TOKEN.to_string(),
                    details: None,
                },
            ),
            ApiError::ExchangeFailed(e) => (
                StatusCode::INTERNAL_SERVER_ERROR,
                ErrorBody {
                    error: "Token exchange failed".to_string(),
                    details: Some(e.details()),
                },
            ),
        };
        (status, Json(body)).into_response()
    }
}

/// `POST /token`: exchange the assertion and pass the provider's answer through.
///
/// The body is parsed by hand so that a missing or malformed body is
/// answered like a missing token.
pub async fn exchange_token(State(state): State<ApiState>, body: Bytes) -> Result<Json<Value>, ApiError> {
    let assertion = serde_json::from_slice::<TokenRequest>(&body)
        .ok()
        .and_then(|request| request.token)
        .filter(|token| !token.trim().is_empty())
        .map(Secret::new)
        .ok_or(ApiError::MissingToken)?;

    match state.exchange.exchange(&assertion).await {
        Ok(response) => {
            info!("Token exchange succeeded");
            Ok(Json(response))
        }
        Err(e) => {
            error!("Token exchange failed: {} ({})", e, e.details());
            Err(e.into())
        }
    }
}

/// `GET /health`.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
    })
}

/// Any other method on `/token`.
pub async fn method_not_allowed() -> (StatusCode, &'static str) {
    (StatusCode::METHOD_NOT_ALLOWED, "Method Not Allowed")
}
