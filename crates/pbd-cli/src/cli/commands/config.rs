//! `pbd config` – print where the config lives and what is in effect.

use anyhow::{Context, Result};
use pbd_core::config::{self, PbdConfig};
use std::path::Path;

pub fn run_show_config(cfg: &PbdConfig, explicit: Option<&Path>) -> Result<()> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => config::config_path()?,
    };
    println!("# config file: {}", path.display());
    let text = toml::to_string_pretty(&cfg.redacted()).context("serialize config")?;
    print!("{}", text);
    if let Err(e) = cfg.validate() {
        println!("# warning: {}", e);
    }
    Ok(())
}
