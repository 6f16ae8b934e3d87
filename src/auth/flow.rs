//! Authorization flow orchestration
//!
//! [`AuthorizationFlow`] ties the pieces together for one `authorize()` call:
//!
//! 1. Validate [`AuthorizeOptions`].
//! 2. Resolve the [`ServiceConfiguration`] (explicit, cached, or discovered).
//! 3. Build the [`AuthorizationRequest`] with fresh state, nonce, and PKCE.
//! 4. Launch the [`UserAgent`] and wait for the redirect.
//! 5. Exchange the code for tokens.
//!
//! A user who abandons the browser step produces
//! [`FlowOutcome::Cancelled`], never an error, and no token request is sent.
//!
//! # Examples
//!
//! ```no_run
//! use std::sync::Arc;
//! use url::Url;
//! use appauth::auth::flow::{AuthorizationFlow, FlowOutcome};
//! use appauth::auth::http::ReqwestHttpClient;
//! use appauth::auth::request::AuthorizeOptions;
//! use appauth::auth::user_agent::LoopbackUserAgent;
//!
//! # async fn example() -> appauth::error::Result<()> {
//! let flow = AuthorizationFlow::new(
//!     Arc::new(ReqwestHttpClient::new(None)?),
//!     Arc::new(LoopbackUserAgent::new()),
//! );
//!
//! let options = AuthorizeOptions::new("my-client", Url::parse("http://127.0.0.1:8400/callback")?)
//!     .with_issuer(Url::parse("https://accounts.example.com")?)
//!     .with_scopes(["openid", "email"]);
//!
//! match flow.authorize(options).await? {
//!     FlowOutcome::Completed(token) => println!("expires at {:?}", token.expires_at),
//!     FlowOutcome::Cancelled => println!("cancelled"),
//! }
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use url::Url;

use crate::auth::crypto::{EntropySource, OsEntropy};
use crate::auth::discovery::{DiscoveryCache, DiscoveryResolver, ServiceConfiguration};
use crate::auth::exchange::TokenExchange;
use crate::auth::http::HttpClient;
use crate::auth::refresh::TokenRefresher;
use crate::auth::request::{AuthorizationRequest, AuthorizeOptions};
use crate::auth::token::TokenResponse;
use crate::auth::user_agent::{UserAgent, UserAgentOutcome};
use crate::error::{AppAuthError, Result};

/// Result of a flow that involves the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlowOutcome<T> {
    /// The flow finished and produced a value.
    Completed(T),

    /// The user cancelled before the provider redirected back.
    Cancelled,
}

impl<T> FlowOutcome<T> {
    /// Returns the completed value, if any.
    pub fn completed(self) -> Option<T> {
        match self {
            Self::Completed(value) => Some(value),
            Self::Cancelled => None,
        }
    }

    /// Returns `true` for [`FlowOutcome::Cancelled`].
    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }
}

/// Drives authorization, refresh, and end-session against one provider
/// configuration source.
pub struct AuthorizationFlow {
    http: Arc<dyn HttpClient>,
    user_agent: Arc<dyn UserAgent>,
    cache: Option<Arc<DiscoveryCache>>,
    entropy: Arc<dyn EntropySource>,
}

impl AuthorizationFlow {
    /// Creates a flow with OS entropy and no discovery cache.
    pub fn new(http: Arc<dyn HttpClient>, user_agent: Arc<dyn UserAgent>) -> Self {
        Self {
            http,
            user_agent,
            cache: None,
            entropy: Arc::new(OsEntropy),
        }
    }

    /// Shares a discovery cache with other flows.
    pub fn with_cache(mut self, cache: Arc<DiscoveryCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Replaces the entropy source.
    pub fn with_entropy(mut self, entropy: Arc<dyn EntropySource>) -> Self {
        self.entropy = entropy;
        self
    }

    fn resolver(&self) -> DiscoveryResolver {
        let resolver = DiscoveryResolver::new(Arc::clone(&self.http));
        match &self.cache {
            Some(cache) => resolver.with_cache(Arc::clone(cache)),
            None => resolver,
        }
    }

    fn refresher(&self) -> TokenRefresher {
        TokenRefresher::new(Arc::clone(&self.http)).with_entropy(Arc::clone(&self.entropy))
    }

    /// Resolves the configuration for `issuer` or returns `explicit`.
    ///
    /// # Errors
    ///
    /// Returns [`AppAuthError::DiscoveryFailed`] when discovery fails.
    pub async fn resolve_configuration(
        &self,
        issuer: Option<&Url>,
        explicit: Option<ServiceConfiguration>,
    ) -> Result<Arc<ServiceConfiguration>> {
        self.resolver().resolve(issuer, explicit).await
    }

    /// Runs the full authorization code flow.
    ///
    /// # Errors
    ///
    /// Any [`AppAuthError`] from validation, discovery, request building, the
    /// user agent ([`AppAuthError::UserAgentFailed`]), or the token exchange.
    pub async fn authorize(&self, options: AuthorizeOptions) -> Result<FlowOutcome<TokenResponse>> {
        options.validate()?;

        let configuration = self
            .resolve_configuration(options.issuer.as_ref(), options.service_configuration.clone())
            .await?;

        if options.use_pkce {
            let advertised = configuration
                .discovery_document
                .as_ref()
                .and_then(|doc| doc.advertises_s256());
            if advertised == Some(false) {
                tracing::warn!("provider does not advertise PKCE S256; sending it anyway");
            }
        }

        let (request, url) =
            AuthorizationRequest::build(configuration, &options, self.entropy.as_ref())?;

        tracing::info!(client_id = %request.client_id, "launching user agent");
        let redirect = match self.user_agent.launch(&url, &request.redirect_url).await {
            UserAgentOutcome::Redirected(redirect) => redirect,
            UserAgentOutcome::Cancelled => {
                tracing::info!("authorization cancelled by user");
                return Ok(FlowOutcome::Cancelled);
            }
            UserAgentOutcome::Failed(reason) => {
                return Err(AppAuthError::UserAgentFailed(reason).into())
            }
        };

        let token = TokenExchange::new(Arc::clone(&self.http))
            .exchange(&request, &redirect)
            .await?;
        Ok(FlowOutcome::Completed(token))
    }

    /// Refreshes tokens using the configuration for `issuer` (or `explicit`).
    ///
    /// # Errors
    ///
    /// Discovery errors, plus those of [`TokenRefresher::refresh`].
    pub async fn refresh(
        &self,
        issuer: Option<&Url>,
        explicit: Option<ServiceConfiguration>,
        client_id: &str,
        client_secret: Option<&str>,
        refresh_token: &str,
        scopes: &[String],
    ) -> Result<TokenResponse> {
        let configuration = self.resolve_configuration(issuer, explicit).await?;
        self.refresher()
            .refresh(&configuration, client_id, client_secret, refresh_token, scopes)
            .await
    }

    /// Ends the provider session using the flow's user agent.
    ///
    /// # Errors
    ///
    /// Discovery errors, plus those of [`TokenRefresher::end_session`].
    pub async fn end_session(
        &self,
        issuer: Option<&Url>,
        explicit: Option<ServiceConfiguration>,
        id_token_hint: Option<&str>,
        post_logout_redirect_url: &Url,
    ) -> Result<FlowOutcome<()>> {
        let configuration = self.resolve_configuration(issuer, explicit).await?;
        self.refresher()
            .end_session(
                self.user_agent.as_ref(),
                &configuration,
                id_token_hint,
                post_logout_redirect_url,
            )
            .await
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
