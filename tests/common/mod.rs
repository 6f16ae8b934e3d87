use std::fs;
use std::path::PathBuf;
use std::sync::Mutex;

use tempfile::TempDir;
use url::Url;

use appauth::auth::crypto::EntropySource;
use appauth::auth::user_agent::{UserAgent, UserAgentOutcome};

/// Discovery document whose endpoints all live on `base_url`.
#[allow(dead_code)]
pub fn discovery_body(base_url: &str) -> serde_json::Value {
    serde_json::json!({
        "issuer": base_url,
        "authorization_endpoint": format!("{}/auth", base_url),
        "token_endpoint": format!("{}/token", base_url),
        "end_session_endpoint": format!("{}/logout", base_url),
        "response_types_supported": ["code"],
        "code_challenge_methods_supported": ["S256"]
    })
}

#[allow(dead_code)]
pub fn temp_config_file(contents: &str) -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("failed to create tempdir");
    let config_path = temp_dir.path().join("config.yaml");
    fs::write(&config_path, contents).expect("failed to write config file");
    (temp_dir, config_path)
}

/// Fills every buffer with one repeated byte.
#[allow(dead_code)]
pub struct FixedEntropy(pub u8);

impl EntropySource for FixedEntropy {
    fn fill(&self, buf: &mut [u8]) -> appauth::Result<()> {
        buf.fill(self.0);
        Ok(())
    }
}

/// User agent that answers every launch by redirecting with the launched
/// URL's `state` (or a forced one) plus the configured extra parameters.
#[allow(dead_code)]
pub struct RedirectingUserAgent {
    extra: Vec<(String, String)>,
    forced_state: Option<String>,
    pub launched: Mutex<Vec<Url>>,
}

#[allow(dead_code)]
impl RedirectingUserAgent {
    pub fn with_code(code: &str) -> Self {
        Self {
            extra: vec![("code".to_string(), code.to_string())],
            forced_state: None,
            launched: Mutex::new(Vec::new()),
        }
    }

    pub fn with_params(params: &[(&str, &str)]) -> Self {
        Self {
            extra: params
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
            forced_state: None,
            launched: Mutex::new(Vec::new()),
        }
    }

    pub fn forcing_state(mut self, state: &str) -> Self {
        self.forced_state = Some(state.to_string());
        self
    }

    pub fn launch_count(&self) -> usize {
        self.launched.lock().unwrap().len()
    }

    pub fn last_launched(&self) -> Url {
        self.launched
            .lock()
            .unwrap()
            .last()
            .cloned()
            .expect("user agent was never launched")
    }
}

#[async_trait::async_trait]
impl UserAgent for RedirectingUserAgent {
    async fn launch(&self, request_url: &Url, redirect_url: &Url) -> UserAgentOutcome {
        self.launched.lock().unwrap().push(request_url.clone());

        let state = self.forced_state.clone().or_else(|| {
            request_url
                .query_pairs()
                .find(|(k, _)| k == "state")
                .map(|(_, v)| v.into_owned())
        });

        let mut redirect = redirect_url.clone();
        {
            let mut query = redirect.query_pairs_mut();
            for (k, v) in &self.extra {
                query.append_pair(k, v);
            }
            if let Some(state) = state {
                query.append_pair("state", &state);
            }
        }
        UserAgentOutcome::Redirected(redirect)
    }
}

/// User agent that always reports cancellation.
#[allow(dead_code)]
pub struct CancellingUserAgent;

#[async_trait::async_trait]
impl UserAgent for CancellingUserAgent {
    async fn launch(&self, _request_url: &Url, _redirect_url: &Url) -> UserAgentOutcome {
        UserAgentOutcome::Cancelled
    }
}
