//! appauth - OAuth 2.0 / OpenID Connect client library
//!
//! This library implements the authorization code flow with PKCE for native
//! and command line applications, plus the configuration and command layer of
//! the `appauth` binary.
//!
//! # Architecture
//!
//! The library is organized into the following modules:
//!
//! - `auth`: Discovery, request building, redirect validation, token
//!   exchange, refresh, end session, and flow orchestration
//! - `config`: Configuration management and validation
//! - `error`: Error types and result aliases
//! - `cli`: Command-line interface definition
//! - `commands`: Handlers behind each CLI subcommand
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use appauth::{AuthorizationFlow, FlowOutcome};
//! use appauth::auth::http::ReqwestHttpClient;
//! use appauth::auth::user_agent::LoopbackUserAgent;
//! use appauth::config::Config;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut config = Config::default();
//!     config.client.issuer = Some("https://accounts.example.com".to_string());
//!     config.client.client_id = "my-cli".to_string();
//!     config.validate()?;
//!
//!     let flow = AuthorizationFlow::new(
//!         Arc::new(ReqwestHttpClient::new(config.http_timeout())?),
//!         Arc::new(LoopbackUserAgent::new()),
//!     );
//!     if let FlowOutcome::Completed(token) = flow.authorize(config.authorize_options()?).await? {
//!         println!("granted scope: {:?}", token.scope);
//!     }
//!     Ok(())
//! }
//! ```

pub mod auth;
pub mod cli;
pub mod commands;
pub mod config;
pub mod error;

// Re-export commonly used types
pub use auth::discovery::{DiscoveryCache, ServiceConfiguration};
pub use auth::flow::{AuthorizationFlow, FlowOutcome};
pub use auth::request::AuthorizeOptions;
pub use auth::token::TokenResponse;
pub use config::Config;
pub use error::{AppAuthError, Result};
