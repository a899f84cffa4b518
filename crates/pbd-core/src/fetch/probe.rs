//! Preflight connectivity check through a fresh proxy identity.

use anyhow::{Context, Result};
use std::time::Duration;

use super::http::{perform_get, proxied_easy};
use crate::identity::ProxyIdentity;

/// What the geo endpoint reported for the exit address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProbeResult {
    pub status: u32,
    /// `country` field of the JSON response, when present.
    pub country: Option<String>,
}

/// GETs `check_url` through `identity` and requires HTTP 200.
///
/// Runs in the current thread; call from `spawn_blocking` if used from async code.
pub fn probe_identity(
    identity: &ProxyIdentity,
    check_url: &str,
    timeout: Duration,
    insecure_tls: bool,
) -> Result<ProbeResult> {
    let easy = proxied_easy(check_url, identity, timeout, insecure_tls)
        .context("configure probe request")?;
    let resp = perform_get(easy, &["Accept: application/json".to_string()])
        .with_context(|| format!("probe {} via {}", check_url, identity.proxy_url()))?;
    if resp.code != 200 {
        anyhow::bail!("probe {} returned HTTP {}", check_url, resp.code);
    }
    Ok(ProbeResult {
        status: resp.code,
        country: country_from_body(&resp.body),
    })
}

fn country_from_body(body: &[u8]) -> Option<String> {
    let value: serde_json::Value = serde_json::from_slice(body).ok()?;
    value
        .get("country")
        .and_then(serde_json::Value::as_str)
        .map(str::to_string)
}
