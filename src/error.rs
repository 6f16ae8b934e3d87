//! Error types for AppAuth
//!
//! This module defines all error types used throughout the crate, using
//! `thiserror` for ergonomic error handling.
//!
//! Flow functions return [`Result`], an `anyhow` alias.  Callers that need to
//! branch on a specific failure recover the typed error with
//! `err.downcast_ref::<AppAuthError>()`.
//!
//! User cancellation is deliberately absent from this enum: a cancelled flow
//! is reported as [`FlowOutcome::Cancelled`](crate::auth::flow::FlowOutcome)
//! rather than as an error.

use thiserror::Error;

/// Main error type for AppAuth operations
///
/// The first group of variants is the authorization error taxonomy surfaced
/// by the flow; the second group covers configuration, I/O, and the
/// third-party crates the client is built on.
#[derive(Error, Debug)]
pub enum AppAuthError {
    /// The platform secure random source could not produce bytes
    #[error("Secure random source unavailable: {0}")]
    EntropyUnavailable(String),

    /// Discovery document could not be fetched or lacked required endpoints
    #[error("Discovery failed: {0}")]
    DiscoveryFailed(String),

    /// The authorization server rejected the request via the redirect
    #[error("Authorization error: {code}{}", description.as_deref().map(|d| format!(" ({d})")).unwrap_or_default())]
    AuthorizationError {
        /// The `error` parameter from the redirect (e.g. `access_denied`)
        code: String,
        /// The optional `error_description` parameter
        description: Option<String>,
        /// The optional `error_uri` parameter
        uri: Option<String>,
    },

    /// The redirect `state` did not match the request `state`
    #[error("State mismatch in authorization response")]
    StateMismatch,

    /// The ID token `nonce` claim did not match the request `nonce`
    #[error("Nonce mismatch in ID token")]
    NonceMismatch,

    /// The token endpoint returned a non-success status
    #[error("Token exchange failed: status={status}, body={body}")]
    TokenExchangeFailed {
        /// HTTP status code returned by the token endpoint
        status: u16,
        /// Raw response body, kept for diagnostics
        body: String,
    },

    /// The service configuration has no end-session endpoint
    #[error("End session is not supported by this service configuration")]
    EndSessionUnsupported,

    /// An additional authorization parameter collides with a built-in one
    #[error("Additional parameter '{0}' is reserved and cannot be overridden")]
    ReservedParameter(String),

    /// The redirect URL could not be interpreted as an authorization response
    #[error("Invalid redirect: {0}")]
    InvalidRedirect(String),

    /// The token endpoint answered 2xx with an unusable body
    #[error("Invalid token response: {0}")]
    InvalidTokenResponse(String),

    /// The ID token could not be decoded
    #[error("Invalid ID token: {0}")]
    InvalidIdToken(String),

    /// The user agent reported a failure other than cancellation
    #[error("User agent failed: {0}")]
    UserAgentFailed(String),

    /// Configuration-related errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// YAML parsing errors
    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    /// HTTP request errors
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// Keyring/credential storage errors
    #[error("Keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    /// URL parsing errors
    #[error("URL error: {0}")]
    Url(#[from] url::ParseError),
}

impl AppAuthError {
    /// Returns `true` for failures that indicate tampering or a forged
    /// response rather than a transient or configuration problem.
    pub fn is_security_violation(&self) -> bool {
        matches!(self, Self::StateMismatch | Self::NonceMismatch)
    }
}

/// Result type alias for AppAuth operations
///
/// This is a convenience alias that uses `anyhow::Error` as the error type,
/// allowing for rich error context and easy error propagation.
pub type Result<T> = anyhow::Result<T>;
