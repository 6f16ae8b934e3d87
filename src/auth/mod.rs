//! OAuth 2.0 / OpenID Connect authorization code flow
//!
//! This module implements a native-app authorization client: discovery,
//! request construction with state, nonce, and PKCE, redirect validation,
//! code exchange, refresh, and RP-initiated logout.
//!
//! Network access, the browser step, and randomness are supplied by the
//! caller through the [`http::HttpClient`], [`user_agent::UserAgent`], and
//! [`crypto::EntropySource`] traits.
//!
//! # Module Layout
//!
//! - [`crypto`] - Random strings and PKCE S256 derivation
//! - [`discovery`] - Discovery document fetching, validation, and caching
//! - [`request`] - Authorization request options and URL construction
//! - [`user_agent`] - User agent capability and loopback redirect receiver
//! - [`http`] - HTTP capability and its `reqwest` implementation
//! - [`exchange`] - Redirect validation and code-for-token exchange
//! - [`refresh`] - Refresh grant and end-session
//! - [`token`] - Token response model and expiry
//! - [`flow`] - Orchestration of a complete authorization
//! - [`token_store`] - Keyring persistence used by the CLI
//!
//! # References
//!
//! - RFC 6749 OAuth 2.0 <https://www.rfc-editor.org/rfc/rfc6749>
//! - RFC 7636 PKCE <https://www.rfc-editor.org/rfc/rfc7636>
//! - RFC 8252 OAuth 2.0 for Native Apps <https://www.rfc-editor.org/rfc/rfc8252>
//! - OpenID Connect Core 1.0 <https://openid.net/specs/openid-connect-core-1_0.html>

pub mod crypto;
pub mod discovery;
pub mod exchange;
pub mod flow;
pub mod http;
pub mod refresh;
pub mod request;
pub mod token;
pub mod token_store;
pub mod user_agent;
