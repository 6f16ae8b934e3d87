//! Token exchange and refresh integration tests using wiremock
//!
//! Verifies the behaviour of `src/auth/exchange.rs` and `src/auth/refresh.rs`
//! against a mock token endpoint:
//!
//! - A valid redirect produces a form POST with the authorization code grant.
//! - State mismatches and provider errors never reach the token endpoint.
//! - Non-2xx token responses surface status and body.
//! - ID token nonces are checked.
//! - Refresh keeps the original refresh token when the provider does not
//!   rotate it.

use std::collections::BTreeMap;
use std::sync::Arc;

use base64::Engine as _;
use chrono::Utc;
use url::Url;
use wiremock::matchers::{body_string_contains, header, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

use appauth::auth::crypto::PkceChallenge;
use appauth::auth::discovery::ServiceConfiguration;
use appauth::auth::exchange::TokenExchange;
use appauth::auth::http::ReqwestHttpClient;
use appauth::auth::refresh::TokenRefresher;
use appauth::auth::request::AuthorizationRequest;
use appauth::AppAuthError;

mod common;

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn http() -> Arc<ReqwestHttpClient> {
    Arc::new(ReqwestHttpClient::new(None).unwrap())
}

fn configuration(base_url: &str) -> ServiceConfiguration {
    ServiceConfiguration::new(
        Url::parse(&format!("{base_url}/auth")).unwrap(),
        Url::parse(&format!("{base_url}/token")).unwrap(),
    )
}

/// Request with state `S1`, redirect `myapp://cb`, and a known verifier.
fn pending_request(base_url: &str, nonce: Option<&str>) -> AuthorizationRequest {
    AuthorizationRequest {
        configuration: Arc::new(configuration(base_url)),
        client_id: "client-1".to_string(),
        client_secret: None,
        redirect_url: Url::parse("myapp://cb").unwrap(),
        scopes: vec!["openid".to_string()],
        additional_parameters: BTreeMap::new(),
        state: "S1".to_string(),
        nonce: nonce.map(str::to_string),
        pkce: Some(PkceChallenge::from_verifier("test-verifier".to_string())),
    }
}

fn id_token_with_nonce(nonce: &str) -> String {
    let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .encode(serde_json::json!({ "sub": "user-1", "nonce": nonce }).to_string());
    format!("eyJhbGciOiJSUzI1NiJ9.{payload}.c2lnbmF0dXJl")
}

fn kind(err: &anyhow::Error) -> Option<&AppAuthError> {
    err.downcast_ref::<AppAuthError>()
}

// ---------------------------------------------------------------------------
// Code exchange
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_exchange_posts_code_and_returns_token() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(header("content-type", "application/x-www-form-urlencoded"))
        .and(body_string_contains("grant_type=authorization_code"))
        .and(body_string_contains("code=abc"))
        .and(body_string_contains("code_verifier=test-verifier"))
        .and(body_string_contains("client_id=client-1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"access_token": "T", "expires_in": 3600})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let request = pending_request(&server.uri(), None);
    let redirect = Url::parse("myapp://cb?code=abc&state=S1").unwrap();

    let before = Utc::now();
    let token = TokenExchange::new(http())
        .exchange(&request, &redirect)
        .await
        .unwrap();

    assert_eq!(token.access_token, "T");
    assert_eq!(token.token_type, "Bearer");
    let remaining = (token.expires_at.unwrap() - before).num_seconds();
    assert!((3595..=3605).contains(&remaining), "expires_at ~ now+3600, got {remaining}");
}

#[tokio::test]
async fn test_exchange_state_mismatch_never_calls_token_endpoint() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"access_token": "T"})),
        )
        .expect(0)
        .mount(&server)
        .await;

    let request = pending_request(&server.uri(), None);
    let redirect = Url::parse("myapp://cb?code=abc&state=S2").unwrap();

    let err = TokenExchange::new(http())
        .exchange(&request, &redirect)
        .await
        .unwrap_err();
    assert!(matches!(kind(&err), Some(AppAuthError::StateMismatch)));
}

#[tokio::test]
async fn test_exchange_access_denied_never_calls_token_endpoint() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200))
        .expect(0)
        .mount(&server)
        .await;

    let request = pending_request(&server.uri(), None);
    let redirect = Url::parse("myapp://cb?error=access_denied&state=S1").unwrap();

    let err = TokenExchange::new(http())
        .exchange(&request, &redirect)
        .await
        .unwrap_err();
    match kind(&err) {
        Some(AppAuthError::AuthorizationError { code, .. }) => assert_eq!(code, "access_denied"),
        other => panic!("expected AuthorizationError, got {other:?}"),
    }
}

#[tokio::test]
async fn test_exchange_surfaces_token_endpoint_failure() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(
            ResponseTemplate::new(400)
                .set_body_json(serde_json::json!({"error": "invalid_grant"})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let request = pending_request(&server.uri(), None);
    let redirect = Url::parse("myapp://cb?code=abc&state=S1").unwrap();

    let err = TokenExchange::new(http())
        .exchange(&request, &redirect)
        .await
        .unwrap_err();
    match kind(&err) {
        Some(AppAuthError::TokenExchangeFailed { status, body }) => {
            assert_eq!(*status, 400);
            assert!(body.contains("invalid_grant"), "{body}");
        }
        other => panic!("expected TokenExchangeFailed, got {other:?}"),
    }
}

#[tokio::test]
async fn test_exchange_rejects_body_without_access_token() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(serde_json::json!({"token_type": "Bearer"})),
        )
        .mount(&server)
        .await;

    let request = pending_request(&server.uri(), None);
    let redirect = Url::parse("myapp://cb?code=abc&state=S1").unwrap();

    let err = TokenExchange::new(http())
        .exchange(&request, &redirect)
        .await
        .unwrap_err();
    assert!(matches!(kind(&err), Some(AppAuthError::InvalidTokenResponse(_))));
}

#[tokio::test]
async fn test_exchange_accepts_matching_nonce() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "T",
            "id_token": id_token_with_nonce("N1")
        })))
        .mount(&server)
        .await;

    let request = pending_request(&server.uri(), Some("N1"));
    let redirect = Url::parse("myapp://cb?code=abc&state=S1").unwrap();

    let token = TokenExchange::new(http())
        .exchange(&request, &redirect)
        .await
        .unwrap();
    assert!(token.id_token.is_some());
}

#[tokio::test]
async fn test_exchange_rejects_mismatched_nonce() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "T",
            "id_token": id_token_with_nonce("REPLAYED")
        })))
        .mount(&server)
        .await;

    let request = pending_request(&server.uri(), Some("N1"));
    let redirect = Url::parse("myapp://cb?code=abc&state=S1").unwrap();

    let err = TokenExchange::new(http())
        .exchange(&request, &redirect)
        .await
        .unwrap_err();
    assert!(matches!(kind(&err), Some(AppAuthError::NonceMismatch)));
}

// ---------------------------------------------------------------------------
// Refresh
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_refresh_keeps_refresh_token_when_not_rotated() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .and(body_string_contains("grant_type=refresh_token"))
        .and(body_string_contains("refresh_token=R1"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({"access_token": "T2", "expires_in": 60})),
        )
        .expect(1)
        .mount(&server)
        .await;

    let token = TokenRefresher::new(http())
        .refresh(&configuration(&server.uri()), "client-1", None, "R1", &[])
        .await
        .unwrap();

    assert_eq!(token.access_token, "T2");
    assert_eq!(token.refresh_token.as_deref(), Some("R1"));
}

#[tokio::test]
async fn test_refresh_adopts_rotated_refresh_token() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "access_token": "T2",
            "refresh_token": "R2"
        })))
        .mount(&server)
        .await;

    let token = TokenRefresher::new(http())
        .refresh(&configuration(&server.uri()), "client-1", None, "R1", &[])
        .await
        .unwrap();

    assert_eq!(token.refresh_token.as_deref(), Some("R2"));
}

#[tokio::test]
async fn test_refresh_failure_maps_to_token_exchange_failed() {
    let server = MockServer::start().await;

    Mock::given(method("POST"))
        .and(path("/token"))
        .respond_with(ResponseTemplate::new(401).set_body_string("expired"))
        .mount(&server)
        .await;

    let err = TokenRefresher::new(http())
        .refresh(&configuration(&server.uri()), "client-1", None, "R1", &[])
        .await
        .unwrap_err();
    assert!(matches!(
        kind(&err),
        Some(AppAuthError::TokenExchangeFailed { status: 401, .. })
    ));
}

// ---------------------------------------------------------------------------
// End session
// ---------------------------------------------------------------------------

#[tokio::test]
async fn test_end_session_unsupported_without_endpoint() {
    let agent = common::RedirectingUserAgent::with_params(&[]);
    let err = TokenRefresher::new(http())
        .end_session(
            &agent,
            &configuration("https://idp.example.com"),
            None,
            &Url::parse("http://127.0.0.1:8400/bye").unwrap(),
        )
        .await
        .unwrap_err();

    assert!(matches!(kind(&err), Some(AppAuthError::EndSessionUnsupported)));
    assert_eq!(agent.launch_count(), 0);
}
