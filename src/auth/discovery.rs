//! OpenID Connect discovery and service configuration resolution
//!
//! A flow needs an authorization endpoint and a token endpoint, plus
//! optionally an end-session endpoint and a registration endpoint.  Those
//! come either from a caller-supplied [`ServiceConfiguration`] or from the
//! issuer's discovery document at
//! `{issuer}/.well-known/openid-configuration`.
//!
//! # Resolution
//!
//! 1. An explicit configuration is returned unchanged, without any network
//!    call.
//! 2. Otherwise the [`DiscoveryCache`], when one was supplied, is consulted
//!    by issuer.
//! 3. Otherwise the discovery document is fetched and validated.  Missing
//!    `authorization_endpoint` or `token_endpoint` is fatal; a partial
//!    configuration is never returned.
//!
//! # References
//!
//! - OpenID Connect Discovery 1.0 <https://openid.net/specs/openid-connect-discovery-1_0.html>
//! - RP-Initiated Logout 1.0 <https://openid.net/specs/openid-connect-rpinitiated-1_0.html>

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use url::Url;

use crate::auth::http::HttpClient;
use crate::error::{AppAuthError, Result};

const WELL_KNOWN_PATH: &str = "/.well-known/openid-configuration";

// ---------------------------------------------------------------------------
// DiscoveryDocument
// ---------------------------------------------------------------------------

/// The OpenID provider metadata document.
///
/// Endpoint fields are optional at the serde level so that a document which
/// lacks them is reported as [`AppAuthError::DiscoveryFailed`] with a
/// precise message instead of a generic parse error.
///
/// # Examples
///
/// ```
/// use appauth::auth::discovery::DiscoveryDocument;
///
/// let json = r#"{
///     "issuer": "https://idp.example.com",
///     "authorization_endpoint": "https://idp.example.com/auth",
///     "token_endpoint": "https://idp.example.com/token",
///     "code_challenge_methods_supported": ["S256"]
/// }"#;
///
/// let doc: DiscoveryDocument = serde_json::from_str(json).unwrap();
/// assert_eq!(doc.issuer.as_deref(), Some("https://idp.example.com"));
/// assert_eq!(doc.advertises_s256(), Some(true));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiscoveryDocument {
    /// The issuer identifier URI for this provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub issuer: Option<String>,

    /// The URL of the authorization endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub authorization_endpoint: Option<String>,

    /// The URL of the token endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_endpoint: Option<String>,

    /// The URL of the RP-initiated logout endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub end_session_endpoint: Option<String>,

    /// The URL of the Dynamic Client Registration endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub registration_endpoint: Option<String>,

    /// The URL of the userinfo endpoint.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub userinfo_endpoint: Option<String>,

    /// The URL of the provider's JSON Web Key Set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<String>,

    /// List of OAuth scopes the provider supports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scopes_supported: Option<Vec<String>>,

    /// List of `response_type` values the provider supports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_types_supported: Option<Vec<String>>,

    /// List of `grant_type` values the provider supports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grant_types_supported: Option<Vec<String>>,

    /// PKCE challenge methods the provider supports (e.g. `["S256"]`).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code_challenge_methods_supported: Option<Vec<String>>,

    /// Additional metadata fields not explicitly modelled above.
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl DiscoveryDocument {
    /// Reports whether the provider advertises the PKCE `S256` method.
    ///
    /// Returns `None` when the document omits
    /// `code_challenge_methods_supported`; many providers support PKCE
    /// without advertising it, so absence is not treated as refusal.
    pub fn advertises_s256(&self) -> Option<bool> {
        self.code_challenge_methods_supported
            .as_ref()
            .map(|methods| methods.iter().any(|m| m == "S256"))
    }

    /// Converts the document into a [`ServiceConfiguration`].
    ///
    /// # Errors
    ///
    /// Returns [`AppAuthError::DiscoveryFailed`] when a required endpoint is
    /// missing or any present endpoint is not a valid URL.
    pub fn into_service_configuration(self) -> Result<ServiceConfiguration> {
        let authorization_endpoint =
            required_endpoint("authorization_endpoint", &self.authorization_endpoint)?;
        let token_endpoint = required_endpoint("token_endpoint", &self.token_endpoint)?;
        let end_session_endpoint =
            optional_endpoint("end_session_endpoint", &self.end_session_endpoint)?;
        let registration_endpoint =
            optional_endpoint("registration_endpoint", &self.registration_endpoint)?;

        Ok(ServiceConfiguration {
            authorization_endpoint,
            token_endpoint,
            end_session_endpoint,
            registration_endpoint,
            discovery_document: Some(self),
        })
    }
}

fn required_endpoint(name: &str, value: &Option<String>) -> Result<Url> {
    let raw = value.as_deref().ok_or_else(|| {
        AppAuthError::DiscoveryFailed(format!("discovery document is missing {name}"))
    })?;
    Url::parse(raw).map_err(|e| {
        AppAuthError::DiscoveryFailed(format!("invalid {name} '{raw}': {e}")).into()
    })
}

fn optional_endpoint(name: &str, value: &Option<String>) -> Result<Option<Url>> {
    match value.as_deref() {
        None => Ok(None),
        Some(raw) => Url::parse(raw).map(Some).map_err(|e| {
            AppAuthError::DiscoveryFailed(format!("invalid {name} '{raw}': {e}")).into()
        }),
    }
}

// ---------------------------------------------------------------------------
// ServiceConfiguration
// ---------------------------------------------------------------------------

/// The endpoints an authorization flow talks to.
///
/// Accepts both snake_case and the camelCase keys used by mobile AppAuth
/// bindings, so a configuration written for either can be passed through
/// unchanged.
///
/// # Examples
///
/// ```
/// use appauth::auth::discovery::ServiceConfiguration;
///
/// let json = r#"{
///     "authorizationEndpoint": "https://idp.example.com/auth",
///     "tokenEndpoint": "https://idp.example.com/token"
/// }"#;
///
/// let config: ServiceConfiguration = serde_json::from_str(json).unwrap();
/// assert_eq!(config.token_endpoint.as_str(), "https://idp.example.com/token");
/// assert!(config.end_session_endpoint.is_none());
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceConfiguration {
    /// The authorization endpoint the user agent is sent to.
    #[serde(alias = "authorizationEndpoint")]
    pub authorization_endpoint: Url,

    /// The token endpoint used for code exchange and refresh.
    #[serde(alias = "tokenEndpoint")]
    pub token_endpoint: Url,

    /// The RP-initiated logout endpoint, if the provider has one.
    #[serde(
        default,
        alias = "endSessionEndpoint",
        skip_serializing_if = "Option::is_none"
    )]
    pub end_session_endpoint: Option<Url>,

    /// The Dynamic Client Registration endpoint, if the provider has one.
    #[serde(
        default,
        alias = "registrationEndpoint",
        skip_serializing_if = "Option::is_none"
    )]
    pub registration_endpoint: Option<Url>,

    /// The discovery document this configuration was derived from.  `None`
    /// for caller-supplied configurations.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub discovery_document: Option<DiscoveryDocument>,
}

impl ServiceConfiguration {
    /// Creates a configuration from the two mandatory endpoints.
    pub fn new(authorization_endpoint: Url, token_endpoint: Url) -> Self {
        Self {
            authorization_endpoint,
            token_endpoint,
            end_session_endpoint: None,
            registration_endpoint: None,
            discovery_document: None,
        }
    }

    /// Sets the end-session endpoint.
    pub fn with_end_session_endpoint(mut self, endpoint: Url) -> Self {
        self.end_session_endpoint = Some(endpoint);
        self
    }

    /// Sets the registration endpoint.
    pub fn with_registration_endpoint(mut self, endpoint: Url) -> Self {
        self.registration_endpoint = Some(endpoint);
        self
    }
}

// ---------------------------------------------------------------------------
// DiscoveryCache
// ---------------------------------------------------------------------------

/// Resolved configurations keyed by issuer.
///
/// Shared explicitly between flows via `Arc<DiscoveryCache>`.  Entries are
/// immutable and are only removed by the owner of the cache.
#[derive(Debug, Default)]
pub struct DiscoveryCache {
    entries: RwLock<HashMap<String, Arc<ServiceConfiguration>>>,
}

impl DiscoveryCache {
    /// Creates an empty cache.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the cached configuration for `issuer`, if any.
    pub async fn get(&self, issuer: &Url) -> Option<Arc<ServiceConfiguration>> {
        self.entries.read().await.get(issuer.as_str()).cloned()
    }

    /// Stores the configuration for `issuer`.
    ///
    /// If another flow stored an entry first, that entry is kept and
    /// returned so every caller observes the same value.
    pub async fn insert(
        &self,
        issuer: &Url,
        configuration: Arc<ServiceConfiguration>,
    ) -> Arc<ServiceConfiguration> {
        let mut entries = self.entries.write().await;
        Arc::clone(
            entries
                .entry(issuer.as_str().to_string())
                .or_insert(configuration),
        )
    }

    /// Drops the entry for `issuer`.
    pub async fn remove(&self, issuer: &Url) -> Option<Arc<ServiceConfiguration>> {
        self.entries.write().await.remove(issuer.as_str())
    }

    /// Drops every entry.
    pub async fn clear(&self) {
        self.entries.write().await.clear();
    }

    /// Number of cached issuers.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    /// Returns `true` when nothing is cached.
    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

// ---------------------------------------------------------------------------
// DiscoveryResolver
// ---------------------------------------------------------------------------

/// Produces the [`ServiceConfiguration`] for a flow.
pub struct DiscoveryResolver {
    http: Arc<dyn HttpClient>,
    cache: Option<Arc<DiscoveryCache>>,
}

impl DiscoveryResolver {
    /// Creates a resolver without a cache.
    pub fn new(http: Arc<dyn HttpClient>) -> Self {
        Self { http, cache: None }
    }

    /// Attaches a shared cache.
    pub fn with_cache(mut self, cache: Arc<DiscoveryCache>) -> Self {
        self.cache = Some(cache);
        self
    }

    /// Resolves the configuration for a flow.
    ///
    /// # Arguments
    ///
    /// * `issuer` - The provider's issuer URL; used only when `explicit` is
    ///   `None`.
    /// * `explicit` - A caller-supplied configuration that bypasses
    ///   discovery.
    ///
    /// # Errors
    ///
    /// Returns [`AppAuthError::DiscoveryFailed`] when neither input is
    /// supplied, or when the discovery document cannot be fetched or lacks
    /// a required endpoint.
    pub async fn resolve(
        &self,
        issuer: Option<&Url>,
        explicit: Option<ServiceConfiguration>,
    ) -> Result<Arc<ServiceConfiguration>> {
        if let Some(configuration) = explicit {
            tracing::debug!("using caller-supplied service configuration");
            return Ok(Arc::new(configuration));
        }

        let issuer = issuer.ok_or_else(|| {
            AppAuthError::DiscoveryFailed(
                "neither an issuer nor a service configuration was supplied".to_string(),
            )
        })?;

        if let Some(cache) = &self.cache {
            if let Some(hit) = cache.get(issuer).await {
                tracing::debug!(%issuer, "discovery cache hit");
                return Ok(hit);
            }
        }

        let configuration = Arc::new(self.fetch(issuer).await?);

        match &self.cache {
            Some(cache) => Ok(cache.insert(issuer, configuration).await),
            None => Ok(configuration),
        }
    }

    async fn fetch(&self, issuer: &Url) -> Result<ServiceConfiguration> {
        let url = discovery_url(issuer)?;
        tracing::info!(%url, "fetching discovery document");

        let resp = self.http.get(&url).await.map_err(|e| {
            AppAuthError::DiscoveryFailed(format!("discovery request to {url} failed: {e}"))
        })?;

        if !resp.is_success() {
            return Err(AppAuthError::DiscoveryFailed(format!(
                "discovery endpoint {url} returned {}: {}",
                resp.status, resp.body
            ))
            .into());
        }

        let document: DiscoveryDocument = serde_json::from_str(&resp.body).map_err(|e| {
            AppAuthError::DiscoveryFailed(format!("failed to parse discovery document: {e}"))
        })?;

        document.into_service_configuration()
    }
}

/// Builds `{issuer}/.well-known/openid-configuration`.
///
/// The well-known suffix is appended to the issuer path (trailing `/`
/// trimmed); any query or fragment on the issuer is dropped.
///
/// # Examples
///
/// ```
/// use url::Url;
/// use appauth::auth::discovery::discovery_url;
///
/// let issuer = Url::parse("https://idp.example.com/realms/demo/").unwrap();
/// assert_eq!(
///     discovery_url(&issuer).unwrap().as_str(),
///     "https://idp.example.com/realms/demo/.well-known/openid-configuration"
/// );
/// ```
pub fn discovery_url(issuer: &Url) -> Result<Url> {
    if issuer.cannot_be_a_base() {
        return Err(AppAuthError::DiscoveryFailed(format!(
            "issuer '{issuer}' cannot be used as a base URL"
        ))
        .into());
    }

    let mut url = issuer.clone();
    let path = format!("{}{}", issuer.path().trim_end_matches('/'), WELL_KNOWN_PATH);
    url.set_path(&path);
    url.set_query(None);
    url.set_fragment(None);
    Ok(url)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
