//! HTTP capability used for discovery and token endpoint calls
//!
//! The flow never talks to `reqwest` directly.  It depends on the
//! [`HttpClient`] trait, which exposes exactly the two operations an
//! authorization code client needs: a JSON `GET` and a form-encoded `POST`.
//! Both return the raw status and body so that callers can surface them
//! verbatim in diagnostics.
//!
//! [`ReqwestHttpClient`] is the production implementation.

use std::sync::Arc;
use std::time::Duration;

use url::Url;

use crate::error::{AppAuthError, Result};

/// Status and body of an HTTP response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HttpResponse {
    /// Numeric HTTP status code.
    pub status: u16,

    /// Response body decoded as text.
    pub body: String,
}

impl HttpResponse {
    /// Returns `true` for any 2xx status.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Network capability consumed by discovery, exchange, and refresh.
///
/// Implementations must not retry; retry policy belongs to the caller of the
/// flow.  A transport failure (DNS, TLS, connection reset, timeout) is an
/// `Err`; any HTTP status, including 4xx and 5xx, is an `Ok`.
#[async_trait::async_trait]
pub trait HttpClient: Send + Sync {
    /// Issues a `GET` request expecting a JSON document.
    async fn get(&self, url: &Url) -> Result<HttpResponse>;

    /// Issues a `POST` with an `application/x-www-form-urlencoded` body.
    async fn post_form(&self, url: &Url, fields: &[(String, String)]) -> Result<HttpResponse>;
}

/// [`HttpClient`] backed by a shared [`reqwest::Client`].
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use appauth::auth::http::ReqwestHttpClient;
///
/// // No client-side timeout: the environment decides.
/// let unbounded = ReqwestHttpClient::new(None).unwrap();
///
/// // Explicit 30 second timeout on every request.
/// let bounded = ReqwestHttpClient::new(Some(Duration::from_secs(30))).unwrap();
/// ```
#[derive(Debug, Clone)]
pub struct ReqwestHttpClient {
    inner: Arc<reqwest::Client>,
}

impl ReqwestHttpClient {
    /// Builds a client with an optional per-request timeout.
    ///
    /// # Errors
    ///
    /// Returns [`AppAuthError::Http`] if the TLS backend cannot be
    /// initialized.
    pub fn new(timeout: Option<Duration>) -> Result<Self> {
        let mut builder = reqwest::Client::builder()
            .user_agent(concat!("appauth/", env!("CARGO_PKG_VERSION")));
        if let Some(timeout) = timeout {
            builder = builder.timeout(timeout);
        }
        let client = builder.build().map_err(AppAuthError::Http)?;
        Ok(Self {
            inner: Arc::new(client),
        })
    }

    /// Wraps an existing client.
    pub fn from_client(client: Arc<reqwest::Client>) -> Self {
        Self { inner: client }
    }

    async fn into_response(resp: reqwest::Response) -> Result<HttpResponse> {
        let status = resp.status().as_u16();
        let body = resp.text().await.map_err(AppAuthError::Http)?;
        Ok(HttpResponse { status, body })
    }
}

#[async_trait::async_trait]
impl HttpClient for ReqwestHttpClient {
    async fn get(&self, url: &Url) -> Result<HttpResponse> {
        tracing::debug!(%url, "GET");
        let resp = self
            .inner
            .get(url.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await
            .map_err(AppAuthError::Http)?;
        Self::into_response(resp).await
    }

    async fn post_form(&self, url: &Url, fields: &[(String, String)]) -> Result<HttpResponse> {
        // Field values may carry secrets; only the target is logged.
        tracing::debug!(%url, fields = fields.len(), "POST form");
        let resp = self
            .inner
            .post(url.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .form(fields)
            .send()
            .await
            .map_err(AppAuthError::Http)?;
        Self::into_response(resp).await
    }
}
