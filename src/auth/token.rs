//! Token endpoint responses
//!
//! [`TokenResponse`] is the canonical token set handed back to callers after
//! a code exchange or refresh.  The wire shape (with relative `expires_in`)
//! is parsed by [`TokenResponse::from_json`], which converts it once into an
//! absolute `expires_at` timestamp.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{AppAuthError, Result};

const DEFAULT_TOKEN_TYPE: &str = "Bearer";

/// Seconds before `expires_at` at which a token is already treated as
/// expired.
const EXPIRY_BUFFER_SECS: i64 = 60;

// ---------------------------------------------------------------------------
// TokenResponse
// ---------------------------------------------------------------------------

/// Tokens returned by the token endpoint.
///
/// The serialized form stores `expires_at` as Unix seconds so a token set can
/// be persisted and reloaded without losing its expiry.
///
/// # Examples
///
/// ```
/// use appauth::auth::token::TokenResponse;
///
/// let token = TokenResponse::from_json(r#"{"access_token":"T","expires_in":3600}"#).unwrap();
/// assert_eq!(token.access_token, "T");
/// assert_eq!(token.token_type, "Bearer");
/// assert!(!token.is_expired());
/// ```
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenResponse {
    /// The access token issued by the authorization server.
    pub access_token: String,

    /// The token type, `"Bearer"` when the server omits it.
    #[serde(default = "default_token_type")]
    pub token_type: String,

    /// UTC instant at which the access token expires.  `None` when the
    /// server did not send `expires_in`.
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "chrono::serde::ts_seconds_option"
    )]
    pub expires_at: Option<DateTime<Utc>>,

    /// Refresh token, if one was issued.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// OpenID Connect ID token, if one was issued.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,

    /// Space-separated scopes granted by the server.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

fn default_token_type() -> String {
    DEFAULT_TOKEN_TYPE.to_string()
}

/// Raw token endpoint body.
#[derive(Debug, Deserialize)]
struct WireTokenResponse {
    access_token: Option<String>,
    #[serde(default)]
    token_type: Option<String>,
    #[serde(default)]
    expires_in: Option<i64>,
    #[serde(default)]
    refresh_token: Option<String>,
    #[serde(default)]
    id_token: Option<String>,
    #[serde(default)]
    scope: Option<String>,
}

impl TokenResponse {
    /// Parses a successful token endpoint body.
    ///
    /// `expires_in` is converted to an absolute `expires_at` relative to the
    /// time of this call.  Negative or oversized values are clamped.
    ///
    /// # Errors
    ///
    /// Returns [`AppAuthError::InvalidTokenResponse`] when the body is not
    /// JSON or lacks a non-empty `access_token`.
    pub fn from_json(body: &str) -> Result<Self> {
        let wire: WireTokenResponse = serde_json::from_str(body)
            .map_err(|e| AppAuthError::InvalidTokenResponse(format!("malformed JSON: {e}")))?;

        let access_token = wire
            .access_token
            .filter(|t| !t.is_empty())
            .ok_or_else(|| {
                AppAuthError::InvalidTokenResponse("missing access_token".to_string())
            })?;

        let expires_at = wire.expires_in.map(|secs| {
            let secs = secs.clamp(0, i64::from(u32::MAX));
            Utc::now() + chrono::Duration::seconds(secs)
        });

        Ok(Self {
            access_token,
            token_type: wire.token_type.unwrap_or_else(default_token_type),
            expires_at,
            refresh_token: wire.refresh_token,
            id_token: wire.id_token,
            scope: wire.scope,
        })
    }

    /// Returns `true` when the access token is expired or expires within the
    /// next 60 seconds.  Tokens without `expires_at` never expire.
    pub fn is_expired(&self) -> bool {
        match self.expires_at {
            None => false,
            Some(expires_at) => {
                Utc::now() >= expires_at - chrono::Duration::seconds(EXPIRY_BUFFER_SECS)
            }
        }
    }

    /// Seconds until expiry, or `None` when the token has no expiry.
    /// Negative once the token has expired.
    pub fn seconds_remaining(&self) -> Option<i64> {
        self.expires_at
            .map(|expires_at| (expires_at - Utc::now()).num_seconds())
    }
}

impl std::fmt::Debug for TokenResponse {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenResponse")
            .field("access_token", &"<redacted>")
            .field("token_type", &self.token_type)
            .field("expires_at", &self.expires_at)
            .field(
                "refresh_token",
                &self.refresh_token.as_ref().map(|_| "<redacted>"),
            )
            .field("id_token", &self.id_token.as_ref().map(|_| "<redacted>"))
            .field("scope", &self.scope)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
