//! `pbd check` – preflight probe through one fresh proxy session.

use anyhow::{Context, Result};
use pbd_core::config::PbdConfig;
use pbd_core::fetch::{probe_identity, ProbeResult};
use pbd_core::identity::{IdentitySource, SessionIdentityProvider};

pub async fn run_check(cfg: &PbdConfig) -> Result<()> {
    cfg.validate()?;
    let identities = SessionIdentityProvider::from_config(&cfg.proxy)?;
    let result = preflight(&identities, cfg).await?;
    println!(
        "proxy ok: HTTP {} via {}:{}, exit country {}",
        result.status,
        cfg.proxy.host,
        cfg.proxy.port,
        result.country.as_deref().unwrap_or("unknown")
    );
    Ok(())
}

/// Probes `fetch.check_url` with a fresh identity from `identities`.
pub(super) async fn preflight<I: IdentitySource>(
    identities: &I,
    cfg: &PbdConfig,
) -> Result<ProbeResult> {
    let identity = identities.next();
    let check_url = cfg.fetch.check_url.clone();
    let timeout = cfg.fetch.timeout();
    let insecure = cfg.fetch.insecure_tls;
    tracing::info!(session = identity.session_id(), url = %check_url, "preflight check");
    let result = tokio::task::spawn_blocking(move || {
        probe_identity(&identity, &check_url, timeout, insecure)
    })
    .await
    .context("preflight task")?
    .context("proxy preflight check failed")?;
    tracing::info!(
        status = result.status,
        country = result.country.as_deref().unwrap_or("unknown"),
        "preflight ok"
    );
    Ok(result)
}
