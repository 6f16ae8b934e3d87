//! Refresh grant and RP-initiated logout
//!
//! [`TokenRefresher::refresh`] trades a refresh token for a new token set.
//! Providers that do not rotate refresh tokens omit `refresh_token` from the
//! response; the original token is then carried forward so callers always
//! hold a usable one.
//!
//! [`TokenRefresher::end_session`] sends the user agent to the provider's
//! `end_session_endpoint` as described in OpenID Connect RP-Initiated Logout.

use std::sync::Arc;

use url::Url;

use crate::auth::crypto::{generate_random_string, EntropySource, OsEntropy, STATE_BYTES};
use crate::auth::discovery::ServiceConfiguration;
use crate::auth::exchange::{redirect_parameters, request_tokens, same_endpoint};
use crate::auth::flow::FlowOutcome;
use crate::auth::http::HttpClient;
use crate::auth::token::TokenResponse;
use crate::auth::user_agent::{UserAgent, UserAgentOutcome};
use crate::error::{AppAuthError, Result};

/// Builds the RP-initiated logout URL.
///
/// Parameters are appended after any query already on the endpoint, in the
/// order `id_token_hint`, `post_logout_redirect_uri`, `state`.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use appauth::auth::refresh::end_session_url;
///
/// let url = end_session_url(
///     &Url::parse("https://idp.example.com/logout").unwrap(),
///     Some("ID"),
///     &Url::parse("http://127.0.0.1:8400/logged-out").unwrap(),
///     "S1",
/// );
/// assert_eq!(
///     url.as_str(),
///     "https://idp.example.com/logout?id_token_hint=ID&post_logout_redirect_uri=http%3A%2F%2F127.0.0.1%3A8400%2Flogged-out&state=S1"
/// );
/// ```
pub fn end_session_url(
    endpoint: &Url,
    id_token_hint: Option<&str>,
    post_logout_redirect_url: &Url,
    state: &str,
) -> Url {
    let mut url = endpoint.clone();
    {
        let mut query = url.query_pairs_mut();
        if let Some(hint) = id_token_hint {
            query.append_pair("id_token_hint", hint);
        }
        query
            .append_pair("post_logout_redirect_uri", post_logout_redirect_url.as_str())
            .append_pair("state", state);
    }
    url
}

/// Runs the refresh grant and end-session requests.
pub struct TokenRefresher {
    http: Arc<dyn HttpClient>,
    entropy: Arc<dyn EntropySource>,
}

impl TokenRefresher {
    /// Creates a refresher using the OS entropy source.
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self {
            http,
            entropy: Arc::new(OsEntropy),
        }
    }

    /// Replaces the entropy source used for the end-session `state`.
    pub fn with_entropy(mut self, entropy: Arc<dyn EntropySource>) -> Self {
        self.entropy = entropy;
        self
    }

    /// Exchanges `refresh_token` for a new token set.
    ///
    /// # Arguments
    ///
    /// * `configuration` - Provider endpoints.
    /// * `client_id` - OAuth client identifier.
    /// * `client_secret` - Secret for confidential clients.
    /// * `refresh_token` - The refresh token to redeem.
    /// * `scopes` - Scopes to request; empty keeps the original grant.
    ///
    /// # Errors
    ///
    /// Returns [`AppAuthError::TokenExchangeFailed`] for a non-2xx response
    /// and [`AppAuthError::InvalidTokenResponse`] for an unusable body.
    pub async fn refresh(
        &self,
        configuration: &ServiceConfiguration,
        client_id: &str,
        client_secret: Option<&str>,
        refresh_token: &str,
        scopes: &[String],
    ) -> Result<TokenResponse> {
        let mut fields = vec![
            ("grant_type".to_string(), "refresh_token".to_string()),
            ("refresh_token".to_string(), refresh_token.to_string()),
            ("client_id".to_string(), client_id.to_string()),
        ];
        if let Some(secret) = client_secret {
            fields.push(("client_secret".to_string(), secret.to_string()));
        }
        if !scopes.is_empty() {
            fields.push(("scope".to_string(), scopes.join(" ")));
        }

        tracing::info!(endpoint = %configuration.token_endpoint, "refreshing access token");
        let mut token =
            request_tokens(self.http.as_ref(), &configuration.token_endpoint, &fields).await?;

        if token.refresh_token.is_none() {
            tracing::debug!("provider did not rotate the refresh token; keeping the original");
            token.refresh_token = Some(refresh_token.to_string());
        }
        Ok(token)
    }

    /// Ends the provider session through the user agent.
    ///
    /// # Errors
    ///
    /// - [`AppAuthError::EndSessionUnsupported`] when the configuration has
    ///   no end-session endpoint; the user agent is not launched.
    /// - [`AppAuthError::StateMismatch`] when the redirect echoes a
    ///   different state.
    /// - [`AppAuthError::InvalidRedirect`] when the redirect targets another
    ///   URI.
    /// - [`AppAuthError::UserAgentFailed`] when the agent fails.
    pub async fn end_session(
        &self,
        user_agent: &dyn UserAgent,
        configuration: &ServiceConfiguration,
        id_token_hint: Option<&str>,
        post_logout_redirect_url: &Url,
    ) -> Result<FlowOutcome<()>> {
        let endpoint = configuration
            .end_session_endpoint
            .as_ref()
            .ok_or(AppAuthError::EndSessionUnsupported)?;

        let state = generate_random_string(self.entropy.as_ref(), STATE_BYTES)?;
        let url = end_session_url(endpoint, id_token_hint, post_logout_redirect_url, &state);

        tracing::info!(%endpoint, "ending provider session");
        match user_agent.launch(&url, post_logout_redirect_url).await {
            UserAgentOutcome::Cancelled => Ok(FlowOutcome::Cancelled),
            UserAgentOutcome::Failed(reason) => Err(AppAuthError::UserAgentFailed(reason).into()),
            UserAgentOutcome::Redirected(redirect) => {
                if !same_endpoint(post_logout_redirect_url, &redirect) {
                    return Err(AppAuthError::InvalidRedirect(format!(
                        "logout redirect does not target {post_logout_redirect_url}"
                    ))
                    .into());
                }
                match redirect_parameters(&redirect).get("state") {
                    Some(echoed) if echoed != &state => Err(AppAuthError::StateMismatch.into()),
                    Some(_) => Ok(FlowOutcome::Completed(())),
                    None => {
                        tracing::debug!("logout redirect carried no state");
                        Ok(FlowOutcome::Completed(()))
                    }
                }
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    use crate::auth::http::HttpResponse;

    struct CannedHttp {
        body: String,
        posts: Mutex<Vec<Vec<(String, String)>>>,
    }

    #[async_trait::async_trait]
    impl HttpClient for CannedHttp {
        async fn get(&self, _url: &Url) -> Result<HttpResponse> {
            unreachable!("refresh never issues GET")
        }

        async fn post_form(&self, _url: &Url, fields: &[(String, String)]) -> Result<HttpResponse> {
            self.posts.lock().unwrap().push(fields.to_vec());
            Ok(HttpResponse {
                status: 200,
                body: self.body.clone(),
            })
        }
    }

    fn canned(body: &str) -> Arc<CannedHttp> {
        Arc::new(CannedHttp {
            body: body.to_string(),
            posts: Mutex::new(Vec::new()),
        })
    }

    /// Echoes back the request's state, or a fixed one.
    struct EchoAgent {
        state_override: Option<String>,
        launches: Mutex<Vec<Url>>,
    }

    #[async_trait::async_trait]
    impl UserAgent for EchoAgent {
        async fn launch(&self, request_url: &Url, redirect_url: &Url) -> UserAgentOutcome {
            self.launches.lock().unwrap().push(request_url.clone());
            let state = self.state_override.clone().unwrap_or_else(|| {
                request_url
                    .query_pairs()
                    .find(|(k, _)| k == "state")
                    .map(|(_, v)| v.into_owned())
                    .unwrap_or_default()
            });
            let mut url = redirect_url.clone();
            url.query_pairs_mut().append_pair("state", &state);
            UserAgentOutcome::Redirected(url)
        }
    }

    fn echo_agent(state_override: Option<&str>) -> EchoAgent {
        EchoAgent {
            state_override: state_override.map(str::to_string),
            launches: Mutex::new(Vec::new()),
        }
    }

    fn configuration(with_logout: bool) -> ServiceConfiguration {
        let config = ServiceConfiguration::new(
            Url::parse("https://idp.example.com/auth").unwrap(),
            Url::parse("https://idp.example.com/token").unwrap(),
        );
        if with_logout {
            config.with_end_session_endpoint(Url::parse("https://idp.example.com/logout").unwrap())
        } else {
            config
        }
    }

    fn logout_redirect() -> Url {
        Url::parse("http://127.0.0.1:8400/logged-out").unwrap()
    }

    #[tokio::test]
    async fn test_refresh_posts_grant_fields() {
        let http = canned(r#"{"access_token":"NEW","refresh_token":"R2"}"#);
        let refresher = TokenRefresher::new(http.clone());

        let token = refresher
            .refresh(&configuration(false), "client-1", Some("shh"), "R1", &["openid".to_string()])
            .await
            .unwrap();
        assert_eq!(token.access_token, "NEW");
        assert_eq!(token.refresh_token.as_deref(), Some("R2"));

        let posts = http.posts.lock().unwrap();
        let fields = &posts[0];
        assert!(fields.contains(&("grant_type".to_string(), "refresh_token".to_string())));
        assert!(fields.contains(&("refresh_token".to_string(), "R1".to_string())));
        assert!(fields.contains(&("client_secret".to_string(), "shh".to_string())));
        assert!(fields.contains(&("scope".to_string(), "openid".to_string())));
    }

    #[tokio::test]
    async fn test_refresh_keeps_original_refresh_token() {
        let http = canned(r#"{"access_token":"NEW"}"#);
        let refresher = TokenRefresher::new(http);

        let token = refresher
            .refresh(&configuration(false), "client-1", None, "R1", &[])
            .await
            .unwrap();
        assert_eq!(token.refresh_token.as_deref(), Some("R1"));
    }

    #[tokio::test]
    async fn test_end_session_unsupported_does_not_launch() {
        let refresher = TokenRefresher::new(canned("{}"));
        let agent = echo_agent(None);

        let err = refresher
            .end_session(&agent, &configuration(false), Some("ID"), &logout_redirect())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AppAuthError>(),
            Some(AppAuthError::EndSessionUnsupported)
        ));
        assert!(agent.launches.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_end_session_completes_on_matching_state() {
        let refresher = TokenRefresher::new(canned("{}"));
        let agent = echo_agent(None);

        let outcome = refresher
            .end_session(&agent, &configuration(true), Some("ID"), &logout_redirect())
            .await
            .unwrap();
        assert_eq!(outcome, FlowOutcome::Completed(()));

        let launched = agent.launches.lock().unwrap()[0].clone();
        assert!(launched.as_str().starts_with("https://idp.example.com/logout?id_token_hint=ID"));
    }

    #[tokio::test]
    async fn test_end_session_rejects_foreign_state() {
        let refresher = TokenRefresher::new(canned("{}"));
        let agent = echo_agent(Some("FORGED"));

        let err = refresher
            .end_session(&agent, &configuration(true), None, &logout_redirect())
            .await
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<AppAuthError>(),
            Some(AppAuthError::StateMismatch)
        ));
    }

    #[test]
    fn test_end_session_url_without_hint() {
        let url = end_session_url(
            &Url::parse("https://idp.example.com/logout?ui=1").unwrap(),
            None,
            &logout_redirect(),
            "S",
        );
        let keys: Vec<_> = url.query_pairs().map(|(k, _)| k.into_owned()).collect();
        assert_eq!(keys, vec!["ui", "post_logout_redirect_uri", "state"]);
    }
}
