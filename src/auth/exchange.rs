//! Redirect validation and authorization code exchange
//!
//! When the user agent returns, the redirect URL is checked against the
//! pending [`AuthorizationRequest`] before anything is sent to the token
//! endpoint:
//!
//! 1. The redirect must target the registered redirect URI.
//! 2. An `error` parameter is reported as
//!    [`AppAuthError::AuthorizationError`].
//! 3. `state` must equal the request's state; a mismatch is a hard failure.
//! 4. A `code` must be present.
//!
//! Only then is the code posted to the token endpoint.  When the request
//! carried a nonce, the `nonce` claim of the returned ID token must match it.
//! The ID token signature is not verified here; callers that need signature
//! validation must perform it against the provider's JWKS.

use std::collections::HashMap;
use std::sync::Arc;

use base64::Engine as _;
use url::Url;

use crate::auth::http::HttpClient;
use crate::auth::request::AuthorizationRequest;
use crate::auth::token::TokenResponse;
use crate::error::{AppAuthError, Result};

// ---------------------------------------------------------------------------
// AuthorizationResponse
// ---------------------------------------------------------------------------

/// The parameters carried back on a successful redirect.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthorizationResponse {
    /// The authorization code.
    pub code: String,

    /// The echoed state.  Always equal to the request's state once parsed.
    pub state: Option<String>,

    /// Every parameter from the redirect query and fragment.
    pub received_parameters: HashMap<String, String>,
}

impl AuthorizationResponse {
    /// Validates `redirect_url` against `request` and extracts the code.
    ///
    /// # Errors
    ///
    /// - [`AppAuthError::InvalidRedirect`] if the redirect targets another
    ///   URI or carries no code.
    /// - [`AppAuthError::AuthorizationError`] if the provider reported an
    ///   error.
    /// - [`AppAuthError::StateMismatch`] if `state` is missing or differs.
    pub fn from_redirect(request: &AuthorizationRequest, redirect_url: &Url) -> Result<Self> {
        if !same_endpoint(&request.redirect_url, redirect_url) {
            return Err(AppAuthError::InvalidRedirect(format!(
                "redirect does not target {}",
                request.redirect_url
            ))
            .into());
        }

        let params = redirect_parameters(redirect_url);

        if let Some(code) = params.get("error") {
            return Err(AppAuthError::AuthorizationError {
                code: code.clone(),
                description: params.get("error_description").cloned(),
                uri: params.get("error_uri").cloned(),
            }
            .into());
        }

        let state = params.get("state").cloned();
        if state.as_deref() != Some(request.state.as_str()) {
            tracing::warn!("authorization response state does not match the request");
            return Err(AppAuthError::StateMismatch.into());
        }

        let code = params
            .get("code")
            .filter(|c| !c.is_empty())
            .cloned()
            .ok_or_else(|| {
                AppAuthError::InvalidRedirect("authorization response has no code".to_string())
            })?;

        Ok(Self {
            code,
            state,
            received_parameters: params,
        })
    }
}

/// Compares scheme, host, port, and path; query and fragment are ignored.
pub(crate) fn same_endpoint(expected: &Url, actual: &Url) -> bool {
    expected.scheme() == actual.scheme()
        && expected.host_str() == actual.host_str()
        && expected.port_or_known_default() == actual.port_or_known_default()
        && expected.path().trim_end_matches('/') == actual.path().trim_end_matches('/')
}

/// Collects query and fragment parameters.  Fragment values replace query
/// values for the same key.
pub fn redirect_parameters(redirect_url: &Url) -> HashMap<String, String> {
    let mut params: HashMap<String, String> = redirect_url
        .query_pairs()
        .map(|(k, v)| (k.into_owned(), v.into_owned()))
        .collect();

    if let Some(fragment) = redirect_url.fragment() {
        for (k, v) in url::form_urlencoded::parse(fragment.as_bytes()) {
            params.insert(k.into_owned(), v.into_owned());
        }
    }

    params
}

// ---------------------------------------------------------------------------
// ID token nonce check
// ---------------------------------------------------------------------------

/// Checks the `nonce` claim of an unverified JWT against `expected`.
///
/// Only the payload segment is decoded; the signature is not checked.
///
/// # Errors
///
/// Returns [`AppAuthError::InvalidIdToken`] if the token is not a
/// decodable JWT, or [`AppAuthError::NonceMismatch`] if the claim is absent
/// or different.
///
/// # Examples
///
/// ```
/// use base64::Engine as _;
/// use appauth::auth::exchange::verify_id_token_nonce;
///
/// let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(r#"{"nonce":"n-1"}"#);
/// let jwt = format!("eyJhbGciOiJub25lIn0.{payload}.");
///
/// assert!(verify_id_token_nonce(&jwt, "n-1").is_ok());
/// assert!(verify_id_token_nonce(&jwt, "n-2").is_err());
/// ```
pub fn verify_id_token_nonce(id_token: &str, expected: &str) -> Result<()> {
    let segments: Vec<&str> = id_token.split('.').collect();
    let payload = match segments.as_slice() {
        [_header, payload, _signature] if !payload.is_empty() => *payload,
        _ => {
            return Err(AppAuthError::InvalidIdToken("expected a three-part JWT".to_string()).into())
        }
    };

    let bytes = base64::engine::general_purpose::URL_SAFE_NO_PAD
        .decode(payload.trim_end_matches('='))
        .map_err(|e| AppAuthError::InvalidIdToken(format!("payload is not base64url: {e}")))?;
    let claims: serde_json::Value = serde_json::from_slice(&bytes)
        .map_err(|e| AppAuthError::InvalidIdToken(format!("payload is not JSON: {e}")))?;

    match claims.get("nonce").and_then(serde_json::Value::as_str) {
        Some(nonce) if nonce == expected => Ok(()),
        _ => Err(AppAuthError::NonceMismatch.into()),
    }
}

// ---------------------------------------------------------------------------
// Token endpoint
// ---------------------------------------------------------------------------

/// POSTs `fields` to `endpoint` and parses the token response.
///
/// Shared by the code exchange and the refresh grant.
pub(crate) async fn request_tokens(
    http: &dyn HttpClient,
    endpoint: &Url,
    fields: &[(String, String)],
) -> Result<TokenResponse> {
    let resp = http.post_form(endpoint, fields).await?;

    if !resp.is_success() {
        tracing::warn!(status = resp.status, %endpoint, "token endpoint rejected request");
        return Err(AppAuthError::TokenExchangeFailed {
            status: resp.status,
            body: resp.body,
        }
        .into());
    }

    TokenResponse::from_json(&resp.body)
}

/// Exchanges authorization codes for tokens.
pub struct TokenExchange {
    http: Arc<dyn HttpClient>,
}

impl TokenExchange {
    /// Creates an exchange engine over `http`.
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self { http }
    }

    /// Validates the redirect and exchanges its code for tokens.
    ///
    /// # Arguments
    ///
    /// * `request` - The request the redirect answers.
    /// * `redirect_url` - The full URL the user agent was redirected to.
    ///
    /// # Errors
    ///
    /// Any error from [`AuthorizationResponse::from_redirect`] (no token
    /// call is made in that case), plus:
    ///
    /// - [`AppAuthError::TokenExchangeFailed`] for a non-2xx token response.
    /// - [`AppAuthError::InvalidTokenResponse`] for an unusable body.
    /// - [`AppAuthError::NonceMismatch`] / [`AppAuthError::InvalidIdToken`]
    ///   when the ID token fails the nonce check.
    pub async fn exchange(
        &self,
        request: &AuthorizationRequest,
        redirect_url: &Url,
    ) -> Result<TokenResponse> {
        let response = AuthorizationResponse::from_redirect(request, redirect_url)?;

        let mut fields = vec![
            ("grant_type".to_string(), "authorization_code".to_string()),
            ("code".to_string(), response.code),
            ("redirect_uri".to_string(), request.redirect_url.to_string()),
            ("client_id".to_string(), request.client_id.clone()),
        ];
        if let Some(verifier) = request.code_verifier() {
            fields.push(("code_verifier".to_string(), verifier.to_string()));
        }
        if let Some(secret) = &request.client_secret {
            fields.push(("client_secret".to_string(), secret.clone()));
        }

        let endpoint = &request.configuration.token_endpoint;
        tracing::info!(%endpoint, "exchanging authorization code");
        let token = request_tokens(self.http.as_ref(), endpoint, &fields).await?;

        if let (Some(expected), Some(id_token)) = (&request.nonce, &token.id_token) {
            verify_id_token_nonce(id_token, expected)?;
        }

        tracing::info!(
            has_refresh_token = token.refresh_token.is_some(),
            has_id_token = token.id_token.is_some(),
            "authorization code exchanged"
        );
        Ok(token)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeMap;
    use std::sync::Mutex;

    use crate::auth::discovery::ServiceConfiguration;
    use crate::auth::http::HttpResponse;

    /// Records every POST and answers with a canned response.
    struct RecordingHttp {
        response: HttpResponse,
        posts: Mutex<Vec<Vec<(String, String)>>>,
    }

    impl RecordingHttp {
        fn new(status: u16, body: &str) -> Self {
            Self {
                response: HttpResponse {
                    status,
                    body: body.to_string(),
                },
                posts: Mutex::new(Vec::new()),
            }
        }

        fn post_count(&self) -> usize {
            self.posts.lock().unwrap().len()
        }
    }

    #[async_trait::async_trait]
    impl HttpClient for RecordingHttp {
        async fn get(&self, _url: &Url) -> Result<HttpResponse> {
            Ok(self.response.clone())
        }

        async fn post_form(&self, _url: &Url, fields: &[(String, String)]) -> Result<HttpResponse> {
            self.posts.lock().unwrap().push(fields.to_vec());
            Ok(self.response.clone())
        }
    }

    fn jwt_with_claims(claims: &str) -> String {
        let payload = base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(claims);
        format!("eyJhbGciOiJSUzI1NiJ9.{payload}.c2ln")
    }

    fn request(nonce: Option<&str>) -> AuthorizationRequest {
        AuthorizationRequest {
            configuration: Arc::new(ServiceConfiguration::new(
                Url::parse("https://idp.example.com/auth").unwrap(),
                Url::parse("https://idp.example.com/token").unwrap(),
            )),
            client_id: "client-1".to_string(),
            client_secret: None,
            redirect_url: Url::parse("myapp://cb").unwrap(),
            scopes: vec!["openid".to_string()],
            additional_parameters: BTreeMap::new(),
            state: "S1".to_string(),
            nonce: nonce.map(str::to_string),
            pkce: Some(crate::auth::crypto::PkceChallenge::from_verifier(
                "verifier-123".to_string(),
            )),
        }
    }

    fn error_kind(err: &anyhow::Error) -> Option<&AppAuthError> {
        err.downcast_ref::<AppAuthError>()
    }

    // -----------------------------------------------------------------------
    // AuthorizationResponse
    // -----------------------------------------------------------------------

    #[test]
    fn test_from_redirect_extracts_code() {
        let url = Url::parse("myapp://cb?code=abc&state=S1&session_state=x").unwrap();
        let response = AuthorizationResponse::from_redirect(&request(None), &url).unwrap();
        assert_eq!(response.code, "abc");
        assert_eq!(response.state.as_deref(), Some("S1"));
        assert_eq!(response.received_parameters["session_state"], "x");
    }

    #[test]
    fn test_from_redirect_reads_fragment() {
        let url = Url::parse("myapp://cb#code=abc&state=S1").unwrap();
        let response = AuthorizationResponse::from_redirect(&request(None), &url).unwrap();
        assert_eq!(response.code, "abc");
    }

    #[test]
    fn test_fragment_overrides_query() {
        let url = Url::parse("myapp://cb?code=from-query&state=S1#code=from-fragment").unwrap();
        let params = redirect_parameters(&url);
        assert_eq!(params["code"], "from-fragment");
        assert_eq!(params["state"], "S1");
    }

    #[test]
    fn test_from_redirect_state_mismatch() {
        let url = Url::parse("myapp://cb?code=abc&state=OTHER").unwrap();
        let err = AuthorizationResponse::from_redirect(&request(None), &url).unwrap_err();
        assert!(matches!(error_kind(&err), Some(AppAuthError::StateMismatch)));
    }

    #[test]
    fn test_from_redirect_missing_state_is_mismatch() {
        let url = Url::parse("myapp://cb?code=abc").unwrap();
        let err = AuthorizationResponse::from_redirect(&request(None), &url).unwrap_err();
        assert!(matches!(error_kind(&err), Some(AppAuthError::StateMismatch)));
    }

    #[test]
    fn test_from_redirect_error_takes_precedence() {
        let url = Url::parse(
            "myapp://cb?error=access_denied&error_description=User%20denied&state=OTHER",
        )
        .unwrap();
        let err = AuthorizationResponse::from_redirect(&request(None), &url).unwrap_err();
        match error_kind(&err) {
            Some(AppAuthError::AuthorizationError {
                code,
                description,
                uri,
            }) => {
                assert_eq!(code, "access_denied");
                assert_eq!(description.as_deref(), Some("User denied"));
                assert!(uri.is_none());
            }
            other => panic!("expected AuthorizationError, got {other:?}"),
        }
    }

    #[test]
    fn test_from_redirect_missing_code() {
        let url = Url::parse("myapp://cb?state=S1").unwrap();
        let err = AuthorizationResponse::from_redirect(&request(None), &url).unwrap_err();
        assert!(matches!(error_kind(&err), Some(AppAuthError::InvalidRedirect(_))));
    }

    #[test]
    fn test_from_redirect_wrong_target() {
        let url = Url::parse("otherapp://cb?code=abc&state=S1").unwrap();
        let err = AuthorizationResponse::from_redirect(&request(None), &url).unwrap_err();
        assert!(matches!(error_kind(&err), Some(AppAuthError::InvalidRedirect(_))));
    }

    // -----------------------------------------------------------------------
    // verify_id_token_nonce()
    // -----------------------------------------------------------------------

    #[test]
    fn test_nonce_match() {
        let jwt = jwt_with_claims(r#"{"sub":"u","nonce":"N1"}"#);
        assert!(verify_id_token_nonce(&jwt, "N1").is_ok());
    }

    #[test]
    fn test_nonce_mismatch() {
        let jwt = jwt_with_claims(r#"{"nonce":"N2"}"#);
        let err = verify_id_token_nonce(&jwt, "N1").unwrap_err();
        assert!(matches!(error_kind(&err), Some(AppAuthError::NonceMismatch)));
    }

    #[test]
    fn test_nonce_absent_is_mismatch() {
        let jwt = jwt_with_claims(r#"{"sub":"u"}"#);
        let err = verify_id_token_nonce(&jwt, "N1").unwrap_err();
        assert!(matches!(error_kind(&err), Some(AppAuthError::NonceMismatch)));
    }

    #[test]
    fn test_nonce_malformed_token() {
        for jwt in ["not-a-jwt", "a.!!!.c", "a.bm90IGpzb24.c"] {
            let err = verify_id_token_nonce(jwt, "N1").unwrap_err();
            assert!(
                matches!(error_kind(&err), Some(AppAuthError::InvalidIdToken(_))),
                "{jwt}: {err}"
            );
        }
    }

    #[test]
    fn test_nonce_requires_exactly_three_segments() {
        let jwt = jwt_with_claims(r#"{"nonce":"N1"}"#);
        let payload = jwt.split('.').nth(1).unwrap();
        for malformed in [format!("h.{payload}"), format!("h.{payload}.s.extra")] {
            let err = verify_id_token_nonce(&malformed, "N1").unwrap_err();
            assert!(
                matches!(error_kind(&err), Some(AppAuthError::InvalidIdToken(_))),
                "{malformed}: {err}"
            );
        }
    }

    // -----------------------------------------------------------------------
    // TokenExchange
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn test_exchange_posts_expected_fields() {
        let http = Arc::new(RecordingHttp::new(200, r#"{"access_token":"T"}"#));
        let exchange = TokenExchange::new(http.clone());
        let url = Url::parse("myapp://cb?code=abc&state=S1").unwrap();

        let token = exchange.exchange(&request(None), &url).await.unwrap();
        assert_eq!(token.access_token, "T");

        let posts = http.posts.lock().unwrap();
        let fields: HashMap<_, _> = posts[0].iter().cloned().collect();
        assert_eq!(fields["grant_type"], "authorization_code");
        assert_eq!(fields["code"], "abc");
        assert_eq!(fields["redirect_uri"], "myapp://cb");
        assert_eq!(fields["client_id"], "client-1");
        assert_eq!(fields["code_verifier"], "verifier-123");
        assert!(!fields.contains_key("client_secret"));
    }

    #[tokio::test]
    async fn test_exchange_sends_client_secret() {
        let http = Arc::new(RecordingHttp::new(200, r#"{"access_token":"T"}"#));
        let exchange = TokenExchange::new(http.clone());
        let mut req = request(None);
        req.client_secret = Some("shh".to_string());
        let url = Url::parse("myapp://cb?code=abc&state=S1").unwrap();

        exchange.exchange(&req, &url).await.unwrap();
        let posts = http.posts.lock().unwrap();
        assert!(posts[0].contains(&("client_secret".to_string(), "shh".to_string())));
    }

    #[tokio::test]
    async fn test_exchange_state_mismatch_skips_token_call() {
        let http = Arc::new(RecordingHttp::new(200, r#"{"access_token":"T"}"#));
        let exchange = TokenExchange::new(http.clone());
        let url = Url::parse("myapp://cb?code=abc&state=WRONG").unwrap();

        assert!(exchange.exchange(&request(None), &url).await.is_err());
        assert_eq!(http.post_count(), 0);
    }

    #[tokio::test]
    async fn test_exchange_non_success_status() {
        let http = Arc::new(RecordingHttp::new(400, r#"{"error":"invalid_grant"}"#));
        let exchange = TokenExchange::new(http);
        let url = Url::parse("myapp://cb?code=abc&state=S1").unwrap();

        let err = exchange.exchange(&request(None), &url).await.unwrap_err();
        match error_kind(&err) {
            Some(AppAuthError::TokenExchangeFailed { status, body }) => {
                assert_eq!(*status, 400);
                assert!(body.contains("invalid_grant"));
            }
            other => panic!("expected TokenExchangeFailed, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_exchange_checks_nonce() {
        let body = format!(
            r#"{{"access_token":"T","id_token":"{}"}}"#,
            jwt_with_claims(r#"{"nonce":"EVIL"}"#)
        );
        let http = Arc::new(RecordingHttp::new(200, &body));
        let exchange = TokenExchange::new(http);
        let url = Url::parse("myapp://cb?code=abc&state=S1").unwrap();

        let err = exchange.exchange(&request(Some("N1")), &url).await.unwrap_err();
        assert!(matches!(error_kind(&err), Some(AppAuthError::NonceMismatch)));
    }

    #[tokio::test]
    async fn test_exchange_without_id_token_skips_nonce_check() {
        let http = Arc::new(RecordingHttp::new(200, r#"{"access_token":"T"}"#));
        let exchange = TokenExchange::new(http);
        let url = Url::parse("myapp://cb?code=abc&state=S1").unwrap();

        assert!(exchange.exchange(&request(Some("N1")), &url).await.is_ok());
    }
}
