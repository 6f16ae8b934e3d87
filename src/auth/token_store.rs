//! Token persistence via OS keyring
//!
//! The library core never stores tokens.  The command line client keeps the
//! last [`TokenResponse`] per profile in the operating system's native
//! credential store (Keychain on macOS, Secret Service on Linux, Windows
//! Credential Manager on Windows).
//!
//! Tokens are serialized to JSON before storage and deserialized on load.

use crate::auth::token::TokenResponse;
use crate::error::{AppAuthError, Result};

/// Keyring accessor scoped to one profile.
///
/// # Examples
///
/// ```no_run
/// use appauth::auth::token::TokenResponse;
/// use appauth::auth::token_store::TokenStore;
///
/// # fn example() -> appauth::error::Result<()> {
/// let store = TokenStore::new("work");
/// assert_eq!(store.service_name(), "appauth-work");
///
/// let token = TokenResponse::from_json(r#"{"access_token":"T"}"#)?;
/// store.save_token(&token)?;
/// assert!(store.load_token()?.is_some());
/// store.delete_token()?;
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct TokenStore {
    profile: String,
}

impl TokenStore {
    /// Creates a store for `profile`.
    pub fn new(profile: impl Into<String>) -> Self {
        Self {
            profile: profile.into(),
        }
    }

    /// The keyring service name, `appauth-<profile>`.
    pub fn service_name(&self) -> String {
        format!("appauth-{}", self.profile)
    }

    fn entry(&self) -> Result<keyring::Entry> {
        keyring::Entry::new(&self.service_name(), &self.profile)
            .map_err(|e| AppAuthError::Keyring(e).into())
    }

    /// Persists `token`, replacing any previous one.
    ///
    /// # Errors
    ///
    /// Returns [`AppAuthError::Serialization`] if JSON serialization fails or
    /// [`AppAuthError::Keyring`] if the credential store rejects the write.
    pub fn save_token(&self, token: &TokenResponse) -> Result<()> {
        let json = serde_json::to_string(token).map_err(AppAuthError::Serialization)?;
        self.entry()?
            .set_password(&json)
            .map_err(AppAuthError::Keyring)?;
        tracing::debug!(service = %self.service_name(), "token saved");
        Ok(())
    }

    /// Loads the stored token.
    ///
    /// # Returns
    ///
    /// `Ok(None)` when nothing has been stored for this profile.
    ///
    /// # Errors
    ///
    /// Returns [`AppAuthError::Keyring`] for credential store failures or
    /// [`AppAuthError::Serialization`] if the stored JSON is malformed.
    pub fn load_token(&self) -> Result<Option<TokenResponse>> {
        match self.entry()?.get_password() {
            Ok(json) => {
                let token = serde_json::from_str(&json).map_err(AppAuthError::Serialization)?;
                Ok(Some(token))
            }
            Err(keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(AppAuthError::Keyring(e).into()),
        }
    }

    /// Deletes the stored token.  Deleting a missing token succeeds.
    ///
    /// # Errors
    ///
    /// Returns [`AppAuthError::Keyring`] for credential store failures.
    pub fn delete_token(&self) -> Result<()> {
        match self.entry()?.delete_password() {
            Ok(()) | Err(keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(AppAuthError::Keyring(e).into()),
        }
    }
}
