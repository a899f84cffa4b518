//! Proxy identities: one upstream session per attempt.
//!
//! The proxy pins every request carrying the same session suffix to the same
//! exit address. Each attempt therefore gets a session id nobody else has used
//! during this process, so a blocked or poisoned exit is never handed out twice.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::config::{ConfigError, ProxyConfig};

/// Routing credential for exactly one attempt.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct ProxyIdentity {
    session_id: String,
    proxy_host: String,
    proxy_port: u16,
    username: String,
    password: String,
}

impl ProxyIdentity {
    pub fn new(
        session_id: impl Into<String>,
        proxy_host: impl Into<String>,
        proxy_port: u16,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            session_id: session_id.into(),
            proxy_host: proxy_host.into(),
            proxy_port,
            username: username.into(),
            password: password.into(),
        }
    }

    /// Session suffix that distinguishes this identity from every other one.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Proxy endpoint as a URL curl understands, e.g. `http://brd.superproxy.io:33335`.
    pub fn proxy_url(&self) -> String {
        format!("http://{}:{}", self.proxy_host, self.proxy_port)
    }

    /// Full proxy username including the session suffix.
    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for ProxyIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProxyIdentity")
            .field("session_id", &self.session_id)
            .field("proxy", &self.proxy_url())
            .field("username", &self.username)
            .field("password", &"***")
            .finish()
    }
}

/// Source of fresh identities. `next` must never fail, never block, and never
/// return an identity it has returned before.
pub trait IdentitySource: Send + Sync {
    fn next(&self) -> ProxyIdentity;

    /// Number of identities handed out so far.
    fn issued(&self) -> u64;
}

/// Builds session-pinned usernames of the form
/// `<base>[-zone-<zone>][-country-<cc>]-session-<run_tag><counter>`.
pub struct SessionIdentityProvider {
    host: String,
    port: u16,
    username_prefix: String,
    password: String,
    run_tag: String,
    counter: AtomicU64,
}

impl SessionIdentityProvider {
    /// Provider with a random run tag, so session ids also differ between runs.
    pub fn from_config(proxy: &ProxyConfig) -> Result<Self, ConfigError> {
        let tag = format!("{:08x}", rand::random::<u32>());
        Self::with_run_tag(proxy, &tag)
    }

    /// Provider with a fixed run tag (deterministic ids, used by tests).
    pub fn with_run_tag(proxy: &ProxyConfig, run_tag: &str) -> Result<Self, ConfigError> {
        let base = proxy
            .username
            .as_deref()
            .filter(|u| !u.is_empty())
            .ok_or(ConfigError::MissingUsername)?;
        let password = proxy
            .password
            .as_deref()
            .filter(|p| !p.is_empty())
            .ok_or(ConfigError::MissingPassword)?;

        let mut prefix = base.to_string();
        if let Some(zone) = proxy.zone.as_deref().filter(|z| !z.is_empty()) {
            prefix.push_str("-zone-");
            prefix.push_str(zone);
        }
        if let Some(cc) = proxy.country.as_deref().filter(|c| !c.is_empty()) {
            prefix.push_str("-country-");
            prefix.push_str(&cc.to_ascii_lowercase());
        }

        Ok(Self {
            host: proxy.host.clone(),
            port: proxy.port,
            username_prefix: prefix,
            password: password.to_string(),
            run_tag: run_tag.to_string(),
            counter: AtomicU64::new(0),
        })
    }
}

impl fmt::Debug for SessionIdentityProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionIdentityProvider")
            .field("proxy", &format_args!("{}:{}", self.host, self.port))
            .field("username_prefix", &self.username_prefix)
            .field("run_tag", &self.run_tag)
            .field("issued", &self.issued())
            .finish_non_exhaustive()
    }
}

impl IdentitySource for SessionIdentityProvider {
    fn next(&self) -> ProxyIdentity {
        let n = self.counter.fetch_add(1, Ordering::Relaxed);
        let session_id = format!("{}{:06}", self.run_tag, n);
        let username = format!("{}-session-{}", self.username_prefix, session_id);
        ProxyIdentity::new(session_id, &self.host, self.port, username, &self.password)
    }

    fn issued(&self) -> u64 {
        self.counter.load(Ordering::Relaxed)
    }
}
