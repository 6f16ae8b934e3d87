//! User agent capability and the loopback redirect receiver
//!
//! The flow hands the authorization URL to a [`UserAgent`] and waits for one
//! of three outcomes: the provider redirected back, the user cancelled, or
//! the agent failed.  Cancellation is not an error; the flow reports it as
//! [`FlowOutcome::Cancelled`](crate::auth::flow::FlowOutcome::Cancelled).
//!
//! [`LoopbackUserAgent`] is the implementation used by the command line
//! client.  It listens on the loopback address named by the redirect URI,
//! prints the authorization URL (and optionally opens a browser), and waits
//! for the provider to redirect the browser back to it.

use std::time::Duration;

use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinSet;
use url::Url;

// ---------------------------------------------------------------------------
// UserAgent
// ---------------------------------------------------------------------------

/// Result of presenting an authorization URL to the user.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UserAgentOutcome {
    /// The provider redirected to this URL.
    Redirected(Url),

    /// The user abandoned the flow.
    Cancelled,

    /// The agent could not complete; the string is a human-readable reason.
    Failed(String),
}

/// Presents a URL to the user and intercepts the redirect back.
#[async_trait::async_trait]
pub trait UserAgent: Send + Sync {
    /// Opens `request_url` and waits for a navigation to `redirect_url`.
    ///
    /// # Arguments
    ///
    /// * `request_url` - The authorization or end-session URL.
    /// * `redirect_url` - The URI whose navigation ends the interaction.
    async fn launch(&self, request_url: &Url, redirect_url: &Url) -> UserAgentOutcome;
}

// ---------------------------------------------------------------------------
// LoopbackUserAgent
// ---------------------------------------------------------------------------

/// Time one connection gets to send its request line and headers.
const CONNECTION_READ_TIMEOUT: Duration = Duration::from_secs(10);

const SUCCESS_PAGE: &str = "<!DOCTYPE html><html><head><title>appauth</title></head>\
<body><p>Authorization complete. You may close this window.</p></body></html>";

/// Receives the redirect on a local HTTP listener.
///
/// The redirect URI must be `http://127.0.0.1:<port>/...`,
/// `http://localhost:<port>/...`, or `http://[::1]:<port>/...`.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use appauth::auth::user_agent::LoopbackUserAgent;
///
/// let agent = LoopbackUserAgent::new()
///     .with_open_browser(false)
///     .with_timeout(Some(Duration::from_secs(300)));
/// ```
#[derive(Debug, Clone)]
pub struct LoopbackUserAgent {
    open_browser: bool,
    timeout: Option<Duration>,
    handle_ctrl_c: bool,
}

impl Default for LoopbackUserAgent {
    fn default() -> Self {
        Self::new()
    }
}

impl LoopbackUserAgent {
    /// Creates an agent that opens the browser, has no timeout, and treats
    /// Ctrl-C as cancellation.
    pub fn new() -> Self {
        Self {
            open_browser: true,
            timeout: None,
            handle_ctrl_c: true,
        }
    }

    /// Enables or disables launching the system browser.
    pub fn with_open_browser(mut self, open_browser: bool) -> Self {
        self.open_browser = open_browser;
        self
    }

    /// Sets how long to wait for the redirect.  `None` waits indefinitely.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Enables or disables mapping Ctrl-C to [`UserAgentOutcome::Cancelled`].
    pub fn with_ctrl_c(mut self, handle_ctrl_c: bool) -> Self {
        self.handle_ctrl_c = handle_ctrl_c;
        self
    }

    /// Best effort; the URL is always printed as well.
    fn try_open_browser(&self, url: &Url) {
        if !self.open_browser {
            return;
        }
        #[cfg(target_os = "macos")]
        let program = Some("open");
        #[cfg(target_os = "linux")]
        let program = Some("xdg-open");
        #[cfg(not(any(target_os = "macos", target_os = "linux")))]
        let program: Option<&str> = None;

        if let Some(program) = program {
            if let Err(e) = std::process::Command::new(program).arg(url.as_str()).spawn() {
                tracing::debug!(program, error = %e, "could not launch browser");
            }
        }
    }

    async fn wait_for_redirect(
        &self,
        listener: TcpListener,
        redirect_url: &Url,
    ) -> UserAgentOutcome {
        let accept = accept_redirect(listener, redirect_url);
        let timeout = self.timeout;
        let accept = async move {
            match timeout {
                Some(limit) => match tokio::time::timeout(limit, accept).await {
                    Ok(outcome) => outcome,
                    Err(_) => UserAgentOutcome::Failed(format!(
                        "timed out after {}s waiting for the redirect",
                        limit.as_secs()
                    )),
                },
                None => accept.await,
            }
        };

        if !self.handle_ctrl_c {
            return accept.await;
        }

        tokio::select! {
            outcome = accept => outcome,
            _ = tokio::signal::ctrl_c() => {
                tracing::info!("authorization cancelled from the terminal");
                UserAgentOutcome::Cancelled
            }
        }
    }
}

#[async_trait::async_trait]
impl UserAgent for LoopbackUserAgent {
    async fn launch(&self, request_url: &Url, redirect_url: &Url) -> UserAgentOutcome {
        let bind_addr = match loopback_bind_address(redirect_url) {
            Ok(addr) => addr,
            Err(reason) => return UserAgentOutcome::Failed(reason),
        };

        let listener = match TcpListener::bind(&bind_addr).await {
            Ok(listener) => listener,
            Err(e) => {
                return UserAgentOutcome::Failed(format!("failed to listen on {bind_addr}: {e}"))
            }
        };
        tracing::debug!(%bind_addr, "waiting for redirect");

        eprintln!("Open the following URL in your browser to continue:\n{request_url}");
        self.try_open_browser(request_url);

        self.wait_for_redirect(listener, redirect_url).await
    }
}

/// Returns `host:port` to bind for a loopback redirect URI.
///
/// # Errors
///
/// Returns a reason string when the URI is not plain `http` on a loopback
/// host with a port.
pub fn loopback_bind_address(redirect_url: &Url) -> std::result::Result<String, String> {
    if redirect_url.scheme() != "http" {
        return Err(format!(
            "redirect URI {redirect_url} is not an http loopback address"
        ));
    }
    let host = match redirect_url.host() {
        Some(url::Host::Ipv4(ip)) if ip.is_loopback() => ip.to_string(),
        Some(url::Host::Ipv6(ip)) if ip.is_loopback() => format!("[{ip}]"),
        Some(url::Host::Domain("localhost")) => "127.0.0.1".to_string(),
        _ => {
            return Err(format!(
                "redirect URI {redirect_url} does not point at a loopback host"
            ))
        }
    };
    let port = redirect_url
        .port_or_known_default()
        .ok_or_else(|| format!("redirect URI {redirect_url} has no port"))?;
    Ok(format!("{host}:{port}"))
}

/// Accepts connections until one hits the redirect path.
///
/// Each connection is read in its own task so that an idle socket (a
/// browser preconnect, for instance) cannot hold up the real redirect.
/// Pending tasks are aborted when the set is dropped.
async fn accept_redirect(listener: TcpListener, redirect_url: &Url) -> UserAgentOutcome {
    let expected_path = redirect_url.path().trim_end_matches('/').to_string();
    let mut connections = JoinSet::new();
    loop {
        tokio::select! {
            accepted = listener.accept() => {
                let (stream, peer) = match accepted {
                    Ok(conn) => conn,
                    Err(e) => {
                        return UserAgentOutcome::Failed(format!("failed to accept redirect: {e}"))
                    }
                };
                tracing::debug!(%peer, "redirect connection");

                let redirect_url = redirect_url.clone();
                let expected_path = expected_path.clone();
                connections.spawn(async move {
                    tokio::time::timeout(
                        CONNECTION_READ_TIMEOUT,
                        handle_connection(stream, &redirect_url, &expected_path),
                    )
                    .await
                });
            }
            Some(joined) = connections.join_next(), if !connections.is_empty() => {
                match joined {
                    Ok(Ok(Ok(Some(url)))) => return UserAgentOutcome::Redirected(url),
                    Ok(Ok(Ok(None))) => {}
                    Ok(Ok(Err(e))) => {
                        tracing::debug!(error = %e, "ignoring malformed redirect connection")
                    }
                    Ok(Err(_)) => tracing::debug!("dropping idle redirect connection"),
                    Err(e) => tracing::debug!(error = %e, "redirect connection task failed"),
                }
            }
        }
    }
}

/// Reads one HTTP request.  Returns the reconstructed redirect URL when the
/// request targets the redirect path, `None` for anything else.
async fn handle_connection(
    stream: TcpStream,
    redirect_url: &Url,
    expected_path: &str,
) -> std::io::Result<Option<Url>> {
    let (read_half, mut write_half) = stream.into_split();
    let mut reader = BufReader::new(read_half);

    let mut request_line = String::new();
    reader.read_line(&mut request_line).await?;

    // Drain headers up to the blank line.
    loop {
        let mut line = String::new();
        let n = reader.read_line(&mut line).await?;
        if n == 0 || line == "\r\n" || line == "\n" {
            break;
        }
    }

    let target = request_line.split_whitespace().nth(1).unwrap_or("/");
    let (path, query) = match target.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (target, None),
    };

    if path.trim_end_matches('/') != expected_path {
        write_half
            .write_all(b"HTTP/1.1 404 Not Found\r\nContent-Length: 0\r\nConnection: close\r\n\r\n")
            .await?;
        return Ok(None);
    }

    let response = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: text/html; charset=utf-8\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{}",
        SUCCESS_PAGE.len(),
        SUCCESS_PAGE
    );
    write_half.write_all(response.as_bytes()).await?;
    let _ = write_half.shutdown().await;

    let mut url = redirect_url.clone();
    url.set_query(query);
    url.set_fragment(None);
    Ok(Some(url))
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
