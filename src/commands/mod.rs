/*!
Command handlers for the CLI

This module provides command handlers invoked by the CLI entrypoint.

It exposes five top-level command modules:

- `discover`  - Resolve and print provider endpoints
- `authorize` - Run the authorization code flow and store the token
- `refresh`   - Redeem the stored refresh token
- `logout`    - End the provider session and forget the token
- `status`    - Inspect the stored token

Handlers are thin: they wire the configuration into the `auth` library
components and format the results for the terminal.
*/

use std::sync::Arc;

use colored::Colorize;

use crate::auth::flow::{AuthorizationFlow, FlowOutcome};
use crate::auth::http::ReqwestHttpClient;
use crate::auth::token::TokenResponse;
use crate::auth::token_store::TokenStore;
use crate::auth::user_agent::LoopbackUserAgent;
use crate::config::Config;
use crate::error::{AppAuthError, Result};

/// Builds a flow using the configured HTTP timeout and loopback agent.
fn build_flow(config: &Config) -> Result<AuthorizationFlow> {
    let http = ReqwestHttpClient::new(config.http_timeout())?;
    let user_agent = LoopbackUserAgent::new()
        .with_open_browser(config.user_agent.open_browser)
        .with_timeout(config.user_agent_timeout());
    Ok(AuthorizationFlow::new(Arc::new(http), Arc::new(user_agent)))
}

/// Human-readable lines describing `token`.  Secrets are never included.
pub fn token_summary(token: &TokenResponse) -> Vec<String> {
    let mut lines = vec![format!("Token type:     {}", token.token_type)];

    let expiry = match (token.expires_at, token.seconds_remaining()) {
        (Some(at), Some(remaining)) if remaining > 0 => {
            format!("{} (in {}s)", at.to_rfc3339(), remaining)
        }
        (Some(at), _) => format!("{} (expired)", at.to_rfc3339()),
        _ => "never".to_string(),
    };
    lines.push(format!("Expires:        {}", expiry));
    lines.push(format!(
        "Scope:          {}",
        token.scope.as_deref().unwrap_or("(not reported)")
    ));
    lines.push(format!(
        "Refresh token:  {}",
        if token.refresh_token.is_some() { "yes" } else { "no" }
    ));
    lines.push(format!(
        "ID token:       {}",
        if token.id_token.is_some() { "yes" } else { "no" }
    ));
    lines
}

fn print_token(token: &TokenResponse, print_access_token: bool) {
    for line in token_summary(token) {
        println!("  {}", line);
    }
    if print_access_token {
        println!("{}", token.access_token);
    }
}

fn store_if_enabled(config: &Config, profile: &str, token: &TokenResponse) -> Result<()> {
    if !config.storage.enabled {
        tracing::debug!("Token storage disabled; not saving");
        return Ok(());
    }
    let store = TokenStore::new(profile);
    store.save_token(token)?;
    println!(
        "{}",
        format!("Token stored in keyring service '{}'", store.service_name()).green()
    );
    Ok(())
}

// Discover command handler
pub mod discover {
    use super::*;

    /// Resolve the provider configuration and print it
    ///
    /// # Arguments
    ///
    /// * `config` - Global configuration
    /// * `json` - Print the discovery document (or the explicit endpoints)
    ///   as pretty JSON instead of a summary
    pub async fn run_discover(config: &Config, json: bool) -> Result<()> {
        config.validate_provider()?;
        let issuer = config.issuer()?;

        let flow = build_flow(config)?;
        let resolved = flow
            .resolve_configuration(issuer.as_ref(), config.client.service_configuration.clone())
            .await?;

        if json {
            let rendered = match &resolved.discovery_document {
                Some(doc) => serde_json::to_string_pretty(doc)?,
                None => serde_json::to_string_pretty(resolved.as_ref())?,
            };
            println!("{}", rendered);
            return Ok(());
        }

        println!("{}", "Service configuration".bold());
        println!("  Authorization:  {}", resolved.authorization_endpoint);
        println!("  Token:          {}", resolved.token_endpoint);
        println!(
            "  End session:    {}",
            resolved
                .end_session_endpoint
                .as_ref()
                .map(|u| u.to_string())
                .unwrap_or_else(|| "(none)".to_string())
        );
        println!(
            "  Registration:   {}",
            resolved
                .registration_endpoint
                .as_ref()
                .map(|u| u.to_string())
                .unwrap_or_else(|| "(none)".to_string())
        );
        if let Some(s256) = resolved
            .discovery_document
            .as_ref()
            .and_then(|doc| doc.advertises_s256())
        {
            let label = if s256 { "yes".green() } else { "no".yellow() };
            println!("  PKCE S256:      {}", label);
        }
        Ok(())
    }
}

// Authorize command handler
pub mod authorize {
    use super::*;

    /// Run the authorization code flow
    ///
    /// # Arguments
    ///
    /// * `config` - Global configuration (CLI overrides already applied)
    /// * `profile` - Keyring profile for the resulting token
    /// * `print_access_token` - Also print the raw access token
    pub async fn run_authorize(
        config: Config,
        profile: &str,
        print_access_token: bool,
    ) -> Result<()> {
        config.validate()?;
        let options = config.authorize_options()?;
        let flow = build_flow(&config)?;

        match flow.authorize(options).await? {
            FlowOutcome::Completed(token) => {
                println!("{}", "Authorization successful".green().bold());
                print_token(&token, print_access_token);
                store_if_enabled(&config, profile, &token)?;
            }
            FlowOutcome::Cancelled => {
                println!("{}", "Authorization cancelled".yellow());
            }
        }
        Ok(())
    }
}

// Refresh command handler
pub mod refresh {
    use super::*;

    /// Redeem a refresh token
    ///
    /// Uses `refresh_token` when given, otherwise the one stored for
    /// `profile`.  An ID token from the stored token is kept when the
    /// provider does not return a new one.
    ///
    /// # Errors
    ///
    /// Returns [`AppAuthError::Config`] when no refresh token is available.
    pub async fn run_refresh(
        config: Config,
        profile: &str,
        refresh_token: Option<String>,
        print_access_token: bool,
    ) -> Result<()> {
        config.validate()?;

        let stored = match &refresh_token {
            Some(_) => None,
            None => TokenStore::new(profile).load_token()?,
        };
        let refresh_token = refresh_token
            .or_else(|| stored.as_ref().and_then(|t| t.refresh_token.clone()))
            .ok_or_else(|| {
                AppAuthError::Config(format!(
                    "no refresh token stored for profile '{}'; run `appauth authorize` first",
                    profile
                ))
            })?;

        let flow = build_flow(&config)?;
        let issuer = config.issuer()?;
        let mut token = flow
            .refresh(
                issuer.as_ref(),
                config.client.service_configuration.clone(),
                &config.client.client_id,
                config.client.client_secret.as_deref(),
                &refresh_token,
                &[],
            )
            .await?;

        if token.id_token.is_none() {
            token.id_token = stored.and_then(|t| t.id_token);
        }

        println!("{}", "Token refreshed".green().bold());
        print_token(&token, print_access_token);
        store_if_enabled(&config, profile, &token)
    }
}

// Logout command handler
pub mod logout {
    use super::*;

    /// End the provider session and delete the stored token
    ///
    /// With `local_only`, or when the provider has no end-session endpoint,
    /// only the stored token is removed.
    pub async fn run_logout(config: Config, profile: &str, local_only: bool) -> Result<()> {
        let store = TokenStore::new(profile);

        if !local_only {
            config.validate_provider()?;
            let stored = store.load_token()?;
            let id_token_hint = stored.as_ref().and_then(|t| t.id_token.clone());
            let redirect = config.post_logout_redirect_url()?;
            let issuer = config.issuer()?;
            let flow = build_flow(&config)?;

            let outcome = flow
                .end_session(
                    issuer.as_ref(),
                    config.client.service_configuration.clone(),
                    id_token_hint.as_deref(),
                    &redirect,
                )
                .await;

            match outcome {
                Ok(FlowOutcome::Completed(())) => {
                    println!("{}", "Provider session ended".green());
                }
                Ok(FlowOutcome::Cancelled) => {
                    println!("{}", "Logout cancelled; stored token kept".yellow());
                    return Ok(());
                }
                Err(e) => match e.downcast_ref::<AppAuthError>() {
                    Some(AppAuthError::EndSessionUnsupported) => {
                        println!(
                            "{}",
                            "Provider does not support end session; removing local token only"
                                .yellow()
                        );
                    }
                    _ => return Err(e),
                },
            }
        }

        store.delete_token()?;
        println!(
            "{}",
            format!("Removed token for profile '{}'", profile).green()
        );
        Ok(())
    }
}

// Status command handler
pub mod status {
    use super::*;

    /// Print the state of the stored token
    pub fn show_status(profile: &str) -> Result<()> {
        let store = TokenStore::new(profile);
        match store.load_token()? {
            Some(token) => {
                let state = if token.is_expired() {
                    "expired".red()
                } else {
                    "valid".green()
                };
                println!(
                    "{} {} ({})",
                    "Profile".bold(),
                    profile,
                    state
                );
                print_token(&token, false);
            }
            None => {
                println!(
                    "{} {} {}",
                    "Profile".bold(),
                    profile,
                    "(no stored token)".yellow()
                );
            }
        }
        Ok(())
    }
}
