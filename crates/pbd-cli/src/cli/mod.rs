//! CLI for the PBD batch downloader.

mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};
use pbd_core::config::{self, PbdConfig};
use std::path::PathBuf;

use commands::{run_batch, run_check, run_show_config, RunOptions};

/// Top-level CLI for the PBD batch downloader.
#[derive(Debug, Parser)]
#[command(name = "pbd")]
#[command(about = "PBD: batch downloader with one proxy session per attempt", long_about = None)]
pub struct Cli {
    /// Config file to use instead of ~/.config/pbd/config.toml.
    #[arg(long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: CliCommand,
}

#[derive(Debug, Subcommand)]
pub enum CliCommand {
    /// Download every URL in a list file.
    Run {
        /// File with one URL per line (`#` starts a comment).
        list: PathBuf,

        /// Directory payloads are written to (overrides `output_dir`).
        #[arg(long, value_name = "DIR")]
        output_dir: Option<PathBuf>,

        /// Write the full JSON report to this file.
        #[arg(long, value_name = "FILE")]
        report: Option<PathBuf>,

        /// Attempts per URL, including the first (overrides `retry.max_attempts`).
        #[arg(long, value_name = "N")]
        max_attempts: Option<u32>,

        /// Lower bound for in-flight downloads.
        #[arg(long, value_name = "N")]
        min_concurrency: Option<usize>,

        /// Upper bound for in-flight downloads.
        #[arg(long, value_name = "N")]
        max_concurrency: Option<usize>,

        /// Skip the preflight proxy check.
        #[arg(long)]
        skip_check: bool,

        /// Download and validate, but keep payloads in memory instead of writing files.
        #[arg(long)]
        dry_run: bool,
    },

    /// Check proxy connectivity through one fresh session.
    Check,

    /// Show the config file path and effective settings (password masked).
    Config,
}

/// Parses arguments and runs the command. `Ok(false)` means the run finished
/// below the configured success ratio.
pub async fn run_from_args() -> Result<bool> {
    let cli = Cli::parse();
    let cfg = load_config(cli.config.as_ref())?;
    tracing::debug!("loaded config: {:?}", cfg.redacted());

    match cli.command {
        CliCommand::Run {
            list,
            output_dir,
            report,
            max_attempts,
            min_concurrency,
            max_concurrency,
            skip_check,
            dry_run,
        } => {
            let opts = RunOptions {
                list,
                output_dir,
                report,
                max_attempts,
                min_concurrency,
                max_concurrency,
                skip_check,
                dry_run,
            };
            run_batch(cfg, opts).await
        }
        CliCommand::Check => {
            run_check(&cfg).await?;
            Ok(true)
        }
        CliCommand::Config => {
            run_show_config(&cfg, cli.config.as_deref())?;
            Ok(true)
        }
    }
}

/// Explicit file if given, else the XDG config (created with defaults on first run);
/// credentials from the environment win over the file.
fn load_config(path: Option<&PathBuf>) -> Result<PbdConfig> {
    let mut cfg = match path {
        Some(path) => config::load_from_path(path)?,
        None => config::load_or_init()?,
    };
    cfg.apply_env();
    Ok(cfg)
}

#[cfg(test)]
mod tests;
