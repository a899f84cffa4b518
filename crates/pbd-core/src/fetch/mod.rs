//! One attempt = one HTTP request chain through one proxy identity.
//!
//! The `Fetcher` trait is the seam between the scheduler and the network: the
//! production implementation drives libcurl on the blocking pool, tests inject
//! scripted fakes. A fetcher never retries internally; every failure is
//! reported as an [`Outcome`] and the retry policy decides what happens next.

mod classify;
mod http;
mod probe;
mod resolve;

use std::future::Future;
use std::time::Duration;

use crate::identity::ProxyIdentity;

pub use http::CurlFetcher;
pub use classify::{classify_curl_error, classify_http_status};
pub use probe::{probe_identity, ProbeResult};
pub use resolve::{extract_embedded_media, EmbeddedMedia};

/// Why an attempt did not succeed.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FailureReason {
    #[error("timed out")]
    Timeout,
    #[error("connection: {0}")]
    Connection(String),
    #[error("proxy session: {0}")]
    ProxySession(String),
    #[error("throttled (HTTP {0})")]
    Throttled(u16),
    #[error("HTTP {0}")]
    Http(u16),
    #[error("gone (HTTP {0})")]
    Gone(u16),
    #[error("payload too small: {received} bytes (minimum {minimum})")]
    PayloadTooSmall { received: u64, minimum: u64 },
    #[error("unexpected content type: {0}")]
    ContentType(String),
    #[error("no media address in page")]
    NoMediaAddress,
    #[error("write failed: {0}")]
    Write(String),
    #[error("invalid URL: {0}")]
    InvalidUrl(String),
    #[error("cancelled before completion")]
    Cancelled,
    #[error("{0}")]
    Other(String),
}

/// Classified result of one attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Success,
    /// Worth another attempt with a fresh identity.
    Retryable(FailureReason),
    /// Retrying cannot help (resource gone, malformed input).
    Fatal(FailureReason),
}

impl Outcome {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }

    pub fn reason(&self) -> Option<&FailureReason> {
        match self {
            Outcome::Success => None,
            Outcome::Retryable(r) | Outcome::Fatal(r) => Some(r),
        }
    }
}

/// Performs exactly one attempt for `url` through `identity`.
///
/// Implementations must finish within `timeout`; the scheduler also enforces it
/// and records an elapsed deadline as `Retryable(Timeout)`.
pub trait Fetcher: Send + Sync + 'static {
    fn fetch(
        &self,
        url: &str,
        identity: &ProxyIdentity,
        timeout: Duration,
    ) -> impl Future<Output = Outcome> + Send;
}
