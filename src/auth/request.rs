//! Authorization request construction
//!
//! An [`AuthorizationRequest`] holds everything generated for a single
//! `authorize()` call: the client parameters supplied by the caller plus the
//! fresh `state`, optional `nonce`, and optional PKCE pair.  It is kept in
//! memory until the redirect comes back, then consumed by the token exchange.
//!
//! The URL sent to the user agent is rendered by
//! [`AuthorizationRequest::authorization_url`], which is a pure function of
//! the request.  Parameter order is fixed:
//!
//! `response_type`, `client_id`, `redirect_uri`, `scope`, `state`, `nonce`,
//! `code_challenge`, `code_challenge_method`, then additional parameters in
//! key order.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use url::Url;

use crate::auth::crypto::{
    generate_random_string, EntropySource, PkceChallenge, NONCE_BYTES, STATE_BYTES,
};
use crate::auth::discovery::ServiceConfiguration;
use crate::error::{AppAuthError, Result};

/// Query keys set by the client itself.  Additional parameters may not use
/// them.
pub const RESERVED_PARAMETERS: [&str; 8] = [
    "response_type",
    "client_id",
    "redirect_uri",
    "scope",
    "state",
    "nonce",
    "code_challenge",
    "code_challenge_method",
];

// ---------------------------------------------------------------------------
// AuthorizeOptions
// ---------------------------------------------------------------------------

/// Caller input for one authorization flow.
///
/// Either `issuer` or `service_configuration` must be set; when both are,
/// the explicit configuration wins and no discovery call is made.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use appauth::auth::request::AuthorizeOptions;
///
/// let options = AuthorizeOptions::new(
///     "my-client",
///     Url::parse("http://127.0.0.1:8400/callback").unwrap(),
/// )
/// .with_issuer(Url::parse("https://idp.example.com").unwrap())
/// .with_scopes(["openid", "profile"]);
///
/// assert!(options.use_pkce);
/// assert!(options.use_nonce);
/// assert!(options.validate().is_ok());
/// ```
#[derive(Clone)]
pub struct AuthorizeOptions {
    /// Issuer used for discovery.
    pub issuer: Option<Url>,

    /// Redirect URI registered with the provider.
    ///
    /// Sent as `redirect_uri` in its parsed, normalised form: an empty path
    /// becomes `/` and the scheme and host are lowercased, so
    /// `http://127.0.0.1:8400` goes on the wire as `http://127.0.0.1:8400/`.
    /// Register that form with providers that compare redirect URIs
    /// byte for byte.
    pub redirect_url: Url,

    /// OAuth client identifier.
    pub client_id: String,

    /// Client secret for confidential clients.
    pub client_secret: Option<String>,

    /// Requested scopes, joined with spaces on the wire.
    pub scopes: Vec<String>,

    /// Extra query parameters for the authorization request
    /// (e.g. `prompt`, `login_hint`).
    pub additional_parameters: BTreeMap<String, String>,

    /// Endpoints to use instead of discovery.
    pub service_configuration: Option<ServiceConfiguration>,

    /// Send an OpenID Connect `nonce` and verify it in the ID token.
    pub use_nonce: bool,

    /// Send a PKCE S256 challenge.
    pub use_pkce: bool,
}

impl AuthorizeOptions {
    /// Creates options with PKCE and nonce enabled and nothing else set.
    pub fn new(client_id: impl Into<String>, redirect_url: Url) -> Self {
        Self {
            issuer: None,
            redirect_url,
            client_id: client_id.into(),
            client_secret: None,
            scopes: Vec::new(),
            additional_parameters: BTreeMap::new(),
            service_configuration: None,
            use_nonce: true,
            use_pkce: true,
        }
    }

    /// Sets the issuer used for discovery.
    pub fn with_issuer(mut self, issuer: Url) -> Self {
        self.issuer = Some(issuer);
        self
    }

    /// Supplies endpoints directly, skipping discovery.
    pub fn with_service_configuration(mut self, configuration: ServiceConfiguration) -> Self {
        self.service_configuration = Some(configuration);
        self
    }

    /// Sets the client secret.
    pub fn with_client_secret(mut self, secret: impl Into<String>) -> Self {
        self.client_secret = Some(secret.into());
        self
    }

    /// Replaces the requested scopes.
    pub fn with_scopes<I, S>(mut self, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.scopes = scopes.into_iter().map(Into::into).collect();
        self
    }

    /// Adds one additional query parameter.
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.additional_parameters.insert(key.into(), value.into());
        self
    }

    /// Checks the options before any network activity.
    ///
    /// # Errors
    ///
    /// Returns [`AppAuthError::Config`] when the client id is empty or
    /// neither an issuer nor a service configuration is set, and
    /// [`AppAuthError::ReservedParameter`] for a colliding additional
    /// parameter.
    pub fn validate(&self) -> Result<()> {
        if self.client_id.trim().is_empty() {
            return Err(AppAuthError::Config("client_id must not be empty".to_string()).into());
        }
        if self.issuer.is_none() && self.service_configuration.is_none() {
            return Err(AppAuthError::Config(
                "either an issuer or a service configuration is required".to_string(),
            )
            .into());
        }
        check_reserved(&self.additional_parameters)
    }
}

impl fmt::Debug for AuthorizeOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizeOptions")
            .field("issuer", &self.issuer.as_ref().map(Url::as_str))
            .field("redirect_url", &self.redirect_url.as_str())
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("scopes", &self.scopes)
            .field("additional_parameters", &self.additional_parameters)
            .field("service_configuration", &self.service_configuration.is_some())
            .field("use_nonce", &self.use_nonce)
            .field("use_pkce", &self.use_pkce)
            .finish()
    }
}

/// Rejects additional parameters whose key is in [`RESERVED_PARAMETERS`].
///
/// # Errors
///
/// Returns [`AppAuthError::ReservedParameter`] naming the first offending
/// key.
pub fn check_reserved(parameters: &BTreeMap<String, String>) -> Result<()> {
    match parameters
        .keys()
        .find(|key| RESERVED_PARAMETERS.contains(&key.as_str()))
    {
        Some(key) => Err(AppAuthError::ReservedParameter(key.clone()).into()),
        None => Ok(()),
    }
}

// ---------------------------------------------------------------------------
// AuthorizationRequest
// ---------------------------------------------------------------------------

/// A built authorization request awaiting its redirect.
#[derive(Clone)]
pub struct AuthorizationRequest {
    /// Endpoints the request targets.
    pub configuration: Arc<ServiceConfiguration>,

    /// OAuth client identifier.
    pub client_id: String,

    /// Client secret, sent only to the token endpoint.
    pub client_secret: Option<String>,

    /// The redirect URI the response must come back to.
    pub redirect_url: Url,

    /// Requested scopes.
    pub scopes: Vec<String>,

    /// Extra query parameters.
    pub additional_parameters: BTreeMap<String, String>,

    /// Anti-CSRF value echoed back by the provider.
    pub state: String,

    /// OpenID Connect nonce, when requested.
    pub nonce: Option<String>,

    /// PKCE pair, when requested.
    pub pkce: Option<PkceChallenge>,
}

impl AuthorizationRequest {
    /// Builds a request with freshly generated `state`, `nonce`, and PKCE
    /// values, and renders its URL.
    ///
    /// # Arguments
    ///
    /// * `configuration` - Resolved provider endpoints.
    /// * `options` - Caller input; `issuer` and `service_configuration` are
    ///   ignored here.
    /// * `entropy` - Source for every random value.
    ///
    /// # Errors
    ///
    /// Returns [`AppAuthError::ReservedParameter`] for a colliding
    /// additional parameter, or [`AppAuthError::EntropyUnavailable`] if
    /// random generation fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use std::sync::Arc;
    /// use url::Url;
    /// use appauth::auth::crypto::OsEntropy;
    /// use appauth::auth::discovery::ServiceConfiguration;
    /// use appauth::auth::request::{AuthorizationRequest, AuthorizeOptions};
    ///
    /// let config = Arc::new(ServiceConfiguration::new(
    ///     Url::parse("https://idp.example.com/auth").unwrap(),
    ///     Url::parse("https://idp.example.com/token").unwrap(),
    /// ));
    /// let options = AuthorizeOptions::new("client", Url::parse("myapp://cb").unwrap())
    ///     .with_scopes(["openid"]);
    ///
    /// let (request, url) = AuthorizationRequest::build(config, &options, &OsEntropy).unwrap();
    /// assert!(url.as_str().starts_with("https://idp.example.com/auth?response_type=code"));
    /// assert_eq!(request.state.len(), 43);
    /// ```
    pub fn build(
        configuration: Arc<ServiceConfiguration>,
        options: &AuthorizeOptions,
        entropy: &dyn EntropySource,
    ) -> Result<(Self, Url)> {
        check_reserved(&options.additional_parameters)?;

        let state = generate_random_string(entropy, STATE_BYTES)?;
        let nonce = if options.use_nonce {
            Some(generate_random_string(entropy, NONCE_BYTES)?)
        } else {
            None
        };
        let pkce = if options.use_pkce {
            Some(PkceChallenge::generate(entropy)?)
        } else {
            None
        };

        let request = Self {
            configuration,
            client_id: options.client_id.clone(),
            client_secret: options.client_secret.clone(),
            redirect_url: options.redirect_url.clone(),
            scopes: options.scopes.clone(),
            additional_parameters: options.additional_parameters.clone(),
            state,
            nonce,
            pkce,
        };
        let url = request.authorization_url();

        tracing::debug!(
            endpoint = %request.configuration.authorization_endpoint,
            pkce = request.pkce.is_some(),
            nonce = request.nonce.is_some(),
            "built authorization request"
        );

        Ok((request, url))
    }

    /// Renders the authorization URL.
    ///
    /// Any query already present on the authorization endpoint is kept and
    /// the request parameters are appended after it.
    pub fn authorization_url(&self) -> Url {
        let mut url = self.configuration.authorization_endpoint.clone();
        {
            let mut query = url.query_pairs_mut();
            query
                .append_pair("response_type", "code")
                .append_pair("client_id", &self.client_id)
                .append_pair("redirect_uri", self.redirect_url.as_str());
            if !self.scopes.is_empty() {
                query.append_pair("scope", &self.scopes.join(" "));
            }
            query.append_pair("state", &self.state);
            if let Some(nonce) = &self.nonce {
                query.append_pair("nonce", nonce);
            }
            if let Some(pkce) = &self.pkce {
                query
                    .append_pair("code_challenge", &pkce.challenge)
                    .append_pair("code_challenge_method", &pkce.method);
            }
            for (key, value) in &self.additional_parameters {
                query.append_pair(key, value);
            }
        }
        url
    }

    /// The PKCE verifier to send with the token request, if any.
    pub fn code_verifier(&self) -> Option<&str> {
        self.pkce.as_ref().map(|p| p.verifier.as_str())
    }
}

impl fmt::Debug for AuthorizationRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AuthorizationRequest")
            .field("authorization_endpoint", &self.configuration.authorization_endpoint.as_str())
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("redirect_url", &self.redirect_url.as_str())
            .field("scopes", &self.scopes)
            .field("additional_parameters", &self.additional_parameters)
            .field("state", &self.state)
            .field("nonce", &self.nonce)
            .field("pkce", &self.pkce)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
