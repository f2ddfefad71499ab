//! Integration tests for the exchange endpoint.
//!
//! These tests verify that:
//! - Only POST is accepted on `/token`
//! - A missing assertion is answered with 400 before the provider is called
//! - The provider's answer is passed through on success and wrapped on failure
//! - The server starts on a free port and stops gracefully

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode},
};
use drivebridge_server::{ApiState, ServerConfig, router, start_server};
use serde_json::{Value, json};
use tower::ServiceExt;
use wiremock::{
    Mock, MockServer, ResponseTemplate,
    matchers::{body_string_contains, method, path},
};

fn config_for(provider: &MockServer) -> ServerConfig {
    ServerConfig {
        tenant_id: "contoso".to_string(),
        client_id: "app-id".to_string(),
        client_secret: "app-secret".into(),
        authority_host: provider.uri(),
        ..ServerConfig::default()
    }
}

fn app(provider: &MockServer) -> Router {
    router(ApiState::from_config(&config_for(provider)).unwrap())
}

fn post_token(body: impl Into<Body>) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri("/token")
        .header("content-type", "application/json")
        .body(body.into())
        .unwrap()
}

async fn read_json(response: axum::response::Response) -> Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn test_exchange_passes_provider_response_through() {
    let provider = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/contoso/oauth2/v2.0/token"))
        .and(body_string_contains("assertion=host-assertion"))
        .and(body_string_contains("client_secret=app-secret"))
        .and(body_string_contains("requested_token_use=on_behalf_of"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "token_type": "Bearer",
            "scope": "https://graph.microsoft.com/Files.Read.All",
            "expires_in": 4478,
            "ext_expires_in": 4478,
            "access_token": "graph-token",
        })))
        .expect(1)
        .mount(&provider)
        .await;

    let response = app(&provider)
        .oneshot(post_token(json!({ "token": "host-assertion" }).to_string()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = read_json(response).await;
    assert_eq!(body["access_token"], "graph-token");
    assert_eq!(body["ext_expires_in"], 4478);
}

#[tokio::test]
async fn test_missing_token_is_bad_request() {
    let provider = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&provider)
        .await;

    for body in [json!({}).to_string(), json!({ "token": "" }).to_string(), "not json".to_string()] {
        let response = app(&provider).oneshot(post_token(body)).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
        assert_eq!(read_json(response).await, json!({ "error": "Missing Teams token" }));
    }
}

#[tokio::test]
async fn test_provider_rejection_is_wrapped() {
    let provider = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/contoso/oauth2/v2.0/token"))
        .respond_with(ResponseTemplate::new(400).set_body_json(json!({
            "error": "invalid_grant",
            "error_description": "AADSTS500133: Assertion is not within its valid time range.",
        })))
        .mount(&provider)
        .await;

    let response = app(&provider)
        .oneshot(post_token(json!({ "token": "expired" }).to_string()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = read_json(response).await;
    assert_eq!(body["error"], "Token exchange failed");
    assert_eq!(body["details"]["error"], "invalid_grant");
}

#[tokio::test]
async fn test_unreachable_provider_is_wrapped() {
    let mut config = ServerConfig {
        tenant_id: "contoso".to_string(),
        client_id: "app-id".to_string(),
        client_secret: "app-secret".into(),
        ..ServerConfig::default()
    };
    config.authority_host = "http://127.0.0.1:9".to_string();

    let response = router(ApiState::from_config(&config).unwrap())
        .oneshot(post_token(json!({ "token": "a" }).to_string()))
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    let body = read_json(response).await;
    assert_eq!(body["error"], "Token exchange failed");
    assert!(body["details"].is_string());
}

#[tokio::test]
async fn test_other_methods_are_not_allowed() {
    let provider = MockServer::start().await;

    for verb in ["GET", "PUT", "DELETE"] {
        let response = app(&provider)
            .oneshot(Request::builder().method(verb).uri("/token").body(Body::empty()).unwrap())
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::METHOD_NOT_ALLOWED);
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        assert_eq!(&bytes[..], b"Method Not Allowed");
    }
}

#[tokio::test]
async fn test_health() {
    let provider = MockServer::start().await;
    let response = app(&provider)
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(read_json(response).await, json!({ "status": "ok" }));
}

#[tokio::test]
async fn test_server_starts_and_stops() {
    let provider = MockServer::start().await;
    let state = ApiState::from_config(&config_for(&provider)).unwrap();

    let handle = start_server("127.0.0.1:0".parse().unwrap(), state).await.unwrap();
    let url = format!("http://{}/health", handle.local_addr());

    let body: Value = reqwest::get(&url).await.unwrap().json().await.unwrap();
    assert_eq!(body["status"], "ok");

    handle.stop().await.unwrap();
    assert!(reqwest::get(&url).await.is_err());
}
