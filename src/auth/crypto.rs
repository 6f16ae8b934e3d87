//! Random value generation and PKCE S256 challenge derivation
//!
//! This module produces every random value an authorization flow needs:
//! the anti-CSRF `state`, the OpenID Connect `nonce`, and the Proof Key for
//! Code Exchange (PKCE) `code_verifier` defined in RFC 7636.
//!
//! # How PKCE works
//!
//! 1. The client generates a high-entropy random string called the `code_verifier`.
//! 2. The client computes a SHA-256 hash of the verifier and base64url-encodes
//!    it to produce the `code_challenge`.
//! 3. The authorization request includes `code_challenge` and
//!    `code_challenge_method=S256`.
//! 4. The token exchange request includes the original `code_verifier`.
//! 5. The authorization server recomputes the challenge and compares it to
//!    the value sent in step 3, proving possession of the verifier.
//!
//! Randomness is drawn through the [`EntropySource`] trait so that the
//! operating system generator can be swapped for a fixed source in tests.
//!
//! # References
//!
//! - RFC 7636 <https://www.rfc-editor.org/rfc/rfc7636>

use std::fmt;

use base64::Engine as _;
use sha2::{Digest, Sha256};

use crate::error::{AppAuthError, Result};

/// Random bytes used for the `state` parameter (256 bits).
pub const STATE_BYTES: usize = 32;

/// Random bytes used for the OpenID Connect `nonce` parameter.
pub const NONCE_BYTES: usize = 32;

/// Random bytes used for the PKCE `code_verifier` (43 characters encoded).
pub const CODE_VERIFIER_BYTES: usize = 32;

/// The only PKCE challenge method this client produces.
pub const CODE_CHALLENGE_METHOD_S256: &str = "S256";

// ---------------------------------------------------------------------------
// EntropySource
// ---------------------------------------------------------------------------

/// A source of cryptographically secure random bytes.
///
/// Production code uses [`OsEntropy`].  Tests inject a deterministic
/// implementation to make authorization URLs reproducible.
pub trait EntropySource: Send + Sync {
    /// Fills `buf` entirely with random bytes.
    ///
    /// # Errors
    ///
    /// Returns [`AppAuthError::EntropyUnavailable`] when the underlying
    /// generator cannot produce bytes.
    fn fill(&self, buf: &mut [u8]) -> Result<()>;
}

/// [`EntropySource`] backed by the operating system's secure generator.
#[derive(Debug, Clone, Copy, Default)]
pub struct OsEntropy;

impl EntropySource for OsEntropy {
    fn fill(&self, buf: &mut [u8]) -> Result<()> {
        use rand::TryRngCore as _;

        rand::rngs::OsRng
            .try_fill_bytes(buf)
            .map_err(|e| AppAuthError::EntropyUnavailable(e.to_string()))?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Public functions
// ---------------------------------------------------------------------------

/// Generates `byte_length` secure random bytes and encodes them as base64url
/// without padding.
///
/// Used for `state`, `nonce`, and the PKCE `code_verifier`.
///
/// # Errors
///
/// Returns [`AppAuthError::EntropyUnavailable`] if the entropy source fails,
/// or [`AppAuthError::Config`] if `byte_length` is zero.
///
/// # Examples
///
/// ```
/// use appauth::auth::crypto::{generate_random_string, OsEntropy};
///
/// let state = generate_random_string(&OsEntropy, 32).unwrap();
/// assert_eq!(state.len(), 43);
/// assert!(!state.contains('='));
/// ```
pub fn generate_random_string(entropy: &dyn EntropySource, byte_length: usize) -> Result<String> {
    if byte_length == 0 {
        return Err(
            AppAuthError::Config("random string length must be non-zero".to_string()).into(),
        );
    }

    let mut bytes = vec![0u8; byte_length];
    entropy.fill(&mut bytes)?;
    Ok(base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(&bytes))
}

/// Derives the PKCE `S256` code challenge for a verifier.
///
/// `BASE64URL(SHA256(ASCII(code_verifier)))` without padding, as specified
/// in RFC 7636 section 4.2.  The result is always 43 characters.
///
/// # Examples
///
/// ```
/// use appauth::auth::crypto::derive_code_challenge;
///
/// // RFC 7636 Appendix B
/// let challenge = derive_code_challenge("dBjftJeZ4CVP-mB92K27uhbUJU1p1r_wW1gFWFOEjXk");
/// assert_eq!(challenge, "E9Melhoa2OwvFrEMTJguCHaoeK1t8URWbuGJSstw-cM");
/// ```
pub fn derive_code_challenge(code_verifier: &str) -> String {
    let digest = Sha256::digest(code_verifier.as_bytes());
    base64::engine::general_purpose::URL_SAFE_NO_PAD.encode(digest.as_slice())
}

// ---------------------------------------------------------------------------
// PkceChallenge
// ---------------------------------------------------------------------------

/// A PKCE S256 challenge pair consisting of a verifier and its derived
/// challenge value.
///
/// The verifier is a secret until the token exchange; the [`fmt::Debug`]
/// implementation redacts it.
///
/// # Examples
///
/// ```
/// use appauth::auth::crypto::{OsEntropy, PkceChallenge};
///
/// let pkce = PkceChallenge::generate(&OsEntropy).unwrap();
/// assert_eq!(pkce.method, "S256");
/// assert_eq!(pkce.verifier.len(), 43);
/// assert_eq!(pkce.challenge.len(), 43);
/// ```
#[derive(Clone, PartialEq, Eq)]
pub struct PkceChallenge {
    /// The code verifier, sent to the token endpoint as `code_verifier`.
    pub verifier: String,

    /// The code challenge, sent to the authorization endpoint as
    /// `code_challenge`.
    pub challenge: String,

    /// The challenge method.  Always `"S256"`.
    pub method: String,
}

impl PkceChallenge {
    /// Generates a fresh verifier from `entropy` and derives its challenge.
    ///
    /// # Errors
    ///
    /// Returns [`AppAuthError::EntropyUnavailable`] if the entropy source
    /// fails.
    pub fn generate(entropy: &dyn EntropySource) -> Result<Self> {
        let verifier = generate_random_string(entropy, CODE_VERIFIER_BYTES)?;
        Ok(Self::from_verifier(verifier))
    }

    /// Builds the pair for a known verifier.
    pub fn from_verifier(verifier: String) -> Self {
        let challenge = derive_code_challenge(&verifier);
        Self {
            verifier,
            challenge,
            method: CODE_CHALLENGE_METHOD_S256.to_string(),
        }
    }
}

impl fmt::Debug for PkceChallenge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PkceChallenge")
            .field("verifier", &"<redacted>")
            .field("challenge", &self.challenge)
            .field("method", &self.method)
            .finish()
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
