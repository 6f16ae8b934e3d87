//! Command-line interface definition for appauth
//!
//! This module defines the CLI structure using clap's derive API,
//! providing commands for discovery, authorization, refresh, logout, and
//! inspecting the stored token.

use clap::{Parser, Subcommand};

/// appauth - OAuth 2.0 / OpenID Connect client for the terminal
///
/// Runs the authorization code flow with PKCE against any OpenID provider,
/// receiving the redirect on a loopback address.
#[derive(Parser, Debug, Clone)]
#[command(name = "appauth")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Path to configuration file (defaults to the per-user config directory)
    #[arg(short, long)]
    pub config: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub json_logs: bool,

    /// Keyring profile the token is stored under
    #[arg(short, long, default_value = "default")]
    pub profile: String,

    /// Command to execute
    #[command(subcommand)]
    pub command: Commands,
}

/// Available commands for appauth
#[derive(Subcommand, Debug, Clone)]
pub enum Commands {
    /// Resolve and print the provider's endpoints
    Discover {
        /// Issuer URL (overrides config)
        #[arg(short, long)]
        issuer: Option<String>,

        /// Print the full discovery document as JSON
        #[arg(long)]
        json: bool,
    },

    /// Run the authorization code flow
    Authorize {
        /// Issuer URL (overrides config)
        #[arg(short, long)]
        issuer: Option<String>,

        /// OAuth client identifier (overrides config)
        #[arg(long)]
        client_id: Option<String>,

        /// Scope to request; repeat for several (overrides config)
        #[arg(short, long = "scope")]
        scope: Vec<String>,

        /// Do not store the token in the keyring
        #[arg(long)]
        no_store: bool,

        /// Print the URL only; do not launch a browser
        #[arg(long)]
        no_browser: bool,

        /// Print the access token to stdout
        #[arg(long)]
        print_token: bool,
    },

    /// Refresh the stored access token
    Refresh {
        /// Refresh token to use instead of the stored one
        #[arg(long)]
        refresh_token: Option<String>,

        /// Do not store the refreshed token
        #[arg(long)]
        no_store: bool,

        /// Print the access token to stdout
        #[arg(long)]
        print_token: bool,
    },

    /// End the provider session and forget the stored token
    Logout {
        /// Where the provider should send the browser after logout
        #[arg(long)]
        post_logout_redirect: Option<String>,

        /// Only delete the stored token
        #[arg(long)]
        local_only: bool,
    },

    /// Show the stored token's state
    Status,
}

impl Cli {
    /// Parse command line arguments
    ///
    /// # Returns
    ///
    /// Returns the parsed CLI structure
    pub fn parse_args() -> Self {
        Self::parse()
    }
}
