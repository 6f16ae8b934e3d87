//! Configuration management for appauth
//!
//! This module handles loading and validating configuration from a YAML
//! file, environment variables, and command-line arguments, applied in that
//! order.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::auth::discovery::ServiceConfiguration;
use crate::auth::request::{check_reserved, AuthorizeOptions};
use crate::cli::{Cli, Commands};
use crate::error::{AppAuthError, Result};

/// Main configuration structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// OAuth client settings
    #[serde(default)]
    pub client: ClientConfig,

    /// HTTP client settings
    #[serde(default)]
    pub http: HttpConfig,

    /// Loopback user agent settings
    #[serde(default)]
    pub user_agent: UserAgentConfig,

    /// Token storage settings
    #[serde(default)]
    pub storage: StorageConfig,
}

/// OAuth client configuration
#[derive(Clone, Serialize, Deserialize)]
pub struct ClientConfig {
    /// Issuer URL used for discovery
    #[serde(default)]
    pub issuer: Option<String>,

    /// OAuth client identifier
    #[serde(default)]
    pub client_id: String,

    /// Client secret for confidential clients
    #[serde(default)]
    pub client_secret: Option<String>,

    /// Loopback redirect URI registered with the provider
    #[serde(default = "default_redirect_url")]
    pub redirect_url: String,

    /// Scopes requested on authorization
    #[serde(default = "default_scopes")]
    pub scopes: Vec<String>,

    /// Extra authorization request parameters
    #[serde(default)]
    pub additional_parameters: BTreeMap<String, String>,

    /// Endpoints to use instead of discovery
    #[serde(default)]
    pub service_configuration: Option<ServiceConfiguration>,

    /// Send and verify an OpenID Connect nonce
    #[serde(default = "default_true")]
    pub use_nonce: bool,

    /// Send a PKCE S256 challenge
    #[serde(default = "default_true")]
    pub use_pkce: bool,

    /// Default post-logout redirect URI
    #[serde(default)]
    pub post_logout_redirect_url: Option<String>,
}

fn default_redirect_url() -> String {
    "http://127.0.0.1:8400/callback".to_string()
}

fn default_scopes() -> Vec<String> {
    vec!["openid".to_string()]
}

fn default_true() -> bool {
    true
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            issuer: None,
            client_id: String::new(),
            client_secret: None,
            redirect_url: default_redirect_url(),
            scopes: default_scopes(),
            additional_parameters: BTreeMap::new(),
            service_configuration: None,
            use_nonce: true,
            use_pkce: true,
            post_logout_redirect_url: None,
        }
    }
}

impl std::fmt::Debug for ClientConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ClientConfig")
            .field("issuer", &self.issuer)
            .field("client_id", &self.client_id)
            .field("client_secret", &self.client_secret.as_ref().map(|_| "<redacted>"))
            .field("redirect_url", &self.redirect_url)
            .field("scopes", &self.scopes)
            .field("additional_parameters", &self.additional_parameters)
            .field("service_configuration", &self.service_configuration)
            .field("use_nonce", &self.use_nonce)
            .field("use_pkce", &self.use_pkce)
            .field("post_logout_redirect_url", &self.post_logout_redirect_url)
            .finish()
    }
}

/// HTTP client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpConfig {
    /// Per-request timeout in seconds; `null` disables the client timeout
    #[serde(default = "default_http_timeout")]
    pub timeout_seconds: Option<u64>,
}

fn default_http_timeout() -> Option<u64> {
    Some(30)
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_http_timeout(),
        }
    }
}

/// Loopback user agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserAgentConfig {
    /// Launch the system browser
    #[serde(default = "default_true")]
    pub open_browser: bool,

    /// Seconds to wait for the redirect; `null` waits indefinitely
    #[serde(default = "default_user_agent_timeout")]
    pub timeout_seconds: Option<u64>,
}

fn default_user_agent_timeout() -> Option<u64> {
    Some(300)
}

impl Default for UserAgentConfig {
    fn default() -> Self {
        Self {
            open_browser: true,
            timeout_seconds: default_user_agent_timeout(),
        }
    }
}

/// Token storage configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Persist tokens in the OS keyring
    #[serde(default = "default_true")]
    pub enabled: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self { enabled: true }
    }
}

impl Config {
    /// Load configuration from file, environment, and CLI arguments
    ///
    /// The file is `--config` when given, otherwise `config.yaml` in the
    /// per-user config directory.  A missing file yields defaults.
    ///
    /// # Errors
    ///
    /// Returns [`AppAuthError::Config`] if the file exists but cannot be read
    /// or parsed.
    pub fn load(cli: &Cli) -> Result<Self> {
        let path = cli.config.as_ref().map(PathBuf::from).or_else(default_config_path);

        let mut config = match path {
            Some(path) if path.exists() => Self::from_file(&path)?,
            Some(path) => {
                if cli.config.is_some() {
                    tracing::warn!("Config file not found at {}, using defaults", path.display());
                } else {
                    tracing::debug!("No config file at {}, using defaults", path.display());
                }
                Self::default()
            }
            None => Self::default(),
        };

        config.apply_env_vars();
        config.apply_cli_overrides(cli);

        Ok(config)
    }

    /// Reads a configuration file
    ///
    /// # Errors
    ///
    /// Returns [`AppAuthError::Config`] on read or parse failure.
    pub fn from_file(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| AppAuthError::Config(format!("Failed to read config file: {}", e)))?;
        serde_yaml::from_str(&contents)
            .map_err(|e| AppAuthError::Config(format!("Failed to parse config: {}", e)).into())
    }

    fn apply_env_vars(&mut self) {
        if let Ok(issuer) = std::env::var("APPAUTH_ISSUER") {
            self.client.issuer = Some(issuer);
        }

        if let Ok(client_id) = std::env::var("APPAUTH_CLIENT_ID") {
            self.client.client_id = client_id;
        }

        if let Ok(secret) = std::env::var("APPAUTH_CLIENT_SECRET") {
            self.client.client_secret = Some(secret);
        }

        if let Ok(redirect) = std::env::var("APPAUTH_REDIRECT_URL") {
            self.client.redirect_url = redirect;
        }

        if let Ok(scopes) = std::env::var("APPAUTH_SCOPES") {
            self.client.scopes = scopes.split_whitespace().map(str::to_string).collect();
        }

        if let Ok(timeout) = std::env::var("APPAUTH_HTTP_TIMEOUT_SECONDS") {
            match timeout.parse::<u64>() {
                Ok(secs) => self.http.timeout_seconds = Some(secs),
                Err(_) => tracing::warn!(
                    "Ignoring APPAUTH_HTTP_TIMEOUT_SECONDS={}: not a number",
                    timeout
                ),
            }
        }
    }

    fn apply_cli_overrides(&mut self, cli: &Cli) {
        if cli.verbose {
            tracing::debug!("Verbose mode enabled");
        }

        match &cli.command {
            Commands::Discover {
                issuer: Some(issuer),
                ..
            } => {
                self.client.issuer = Some(issuer.clone());
            }
            Commands::Authorize {
                issuer,
                client_id,
                scope,
                no_browser,
                no_store,
                ..
            } => {
                if let Some(issuer) = issuer {
                    self.client.issuer = Some(issuer.clone());
                }
                if let Some(client_id) = client_id {
                    self.client.client_id = client_id.clone();
                }
                if !scope.is_empty() {
                    self.client.scopes = scope.clone();
                }
                if *no_browser {
                    self.user_agent.open_browser = false;
                }
                if *no_store {
                    self.storage.enabled = false;
                }
            }
            Commands::Refresh { no_store: true, .. } => {
                self.storage.enabled = false;
            }
            Commands::Logout {
                post_logout_redirect: Some(redirect),
                ..
            } => {
                self.client.post_logout_redirect_url = Some(redirect.clone());
            }
            _ => {}
        }
    }

    /// Validate the configuration
    ///
    /// # Errors
    ///
    /// Returns [`AppAuthError::Config`] if the client id is missing, neither
    /// an issuer nor a service configuration is set, a URL does not parse,
    /// or a timeout is zero; [`AppAuthError::ReservedParameter`] if an
    /// additional parameter uses a reserved key.
    pub fn validate(&self) -> Result<()> {
        if self.client.client_id.trim().is_empty() {
            return Err(AppAuthError::Config("client.client_id must be set".to_string()).into());
        }

        self.validate_provider()?;

        parse_url("client.redirect_url", &self.client.redirect_url)?;

        if let Some(redirect) = &self.client.post_logout_redirect_url {
            parse_url("client.post_logout_redirect_url", redirect)?;
        }

        if self.http.timeout_seconds == Some(0) {
            return Err(AppAuthError::Config(
                "http.timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        if self.user_agent.timeout_seconds == Some(0) {
            return Err(AppAuthError::Config(
                "user_agent.timeout_seconds must be greater than 0".to_string(),
            )
            .into());
        }

        check_reserved(&self.client.additional_parameters)
    }

    /// Validate only what discovery needs
    ///
    /// # Errors
    ///
    /// Returns [`AppAuthError::Config`] if neither an issuer nor a service
    /// configuration is set, or the issuer does not parse.
    pub fn validate_provider(&self) -> Result<()> {
        if self.client.issuer.is_none() && self.client.service_configuration.is_none() {
            return Err(AppAuthError::Config(
                "either client.issuer or client.service_configuration must be set".to_string(),
            )
            .into());
        }
        self.issuer().map(|_| ())
    }

    /// The configured issuer, parsed
    ///
    /// # Errors
    ///
    /// Returns [`AppAuthError::Config`] if the issuer is not a valid URL.
    pub fn issuer(&self) -> Result<Option<Url>> {
        self.client
            .issuer
            .as_deref()
            .map(|raw| parse_url("client.issuer", raw))
            .transpose()
    }

    /// The post-logout redirect URI, falling back to the redirect URI
    ///
    /// # Errors
    ///
    /// Returns [`AppAuthError::Config`] if the URL does not parse.
    pub fn post_logout_redirect_url(&self) -> Result<Url> {
        match &self.client.post_logout_redirect_url {
            Some(raw) => parse_url("client.post_logout_redirect_url", raw),
            None => parse_url("client.redirect_url", &self.client.redirect_url),
        }
    }

    /// Builds flow options from the client section
    ///
    /// # Errors
    ///
    /// Returns [`AppAuthError::Config`] if a URL does not parse.
    pub fn authorize_options(&self) -> Result<AuthorizeOptions> {
        let redirect_url = parse_url("client.redirect_url", &self.client.redirect_url)?;
        if redirect_url.as_str() != self.client.redirect_url {
            tracing::warn!(
                configured = %self.client.redirect_url,
                sent = %redirect_url,
                "redirect URL is normalised before it is sent; register the normalised form"
            );
        }
        Ok(AuthorizeOptions {
            issuer: self.issuer()?,
            redirect_url,
            client_id: self.client.client_id.clone(),
            client_secret: self.client.client_secret.clone(),
            scopes: self.client.scopes.clone(),
            additional_parameters: self.client.additional_parameters.clone(),
            service_configuration: self.client.service_configuration.clone(),
            use_nonce: self.client.use_nonce,
            use_pkce: self.client.use_pkce,
        })
    }

    /// HTTP timeout as a [`Duration`]
    pub fn http_timeout(&self) -> Option<Duration> {
        self.http.timeout_seconds.map(Duration::from_secs)
    }

    /// Redirect wait timeout as a [`Duration`]
    pub fn user_agent_timeout(&self) -> Option<Duration> {
        self.user_agent.timeout_seconds.map(Duration::from_secs)
    }
}

/// Returns `config.yaml` inside the per-user appauth config directory
pub fn default_config_path() -> Option<PathBuf> {
    directories::ProjectDirs::from("", "", "appauth")
        .map(|dirs| dirs.config_dir().join("config.yaml"))
}

fn parse_url(field: &str, raw: &str) -> Result<Url> {
    Url::parse(raw).map_err(|e| {
        AppAuthError::Config(format!("{} is not a valid URL ({}): {}", field, raw, e)).into()
    })
}
