//! `pbd run` – download a URL list and report.

use anyhow::Result;
use pbd_core::concurrency::ConcurrencyController;
use pbd_core::config::PbdConfig;
use pbd_core::fetch::CurlFetcher;
use pbd_core::identity::SessionIdentityProvider;
use pbd_core::input::read_url_list;
use pbd_core::retry::RetryPolicy;
use pbd_core::scheduler::{BatchReport, BatchScheduler, ProgressStats};
use pbd_core::sink::{DirectorySink, MemorySink, PayloadSink};
use std::path::PathBuf;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use super::check::preflight;

/// Print a progress line every this many finished items.
const PROGRESS_EVERY: usize = 5;

/// Flags of `pbd run`.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub list: PathBuf,
    pub output_dir: Option<PathBuf>,
    pub report: Option<PathBuf>,
    pub max_attempts: Option<u32>,
    pub min_concurrency: Option<usize>,
    pub max_concurrency: Option<usize>,
    pub skip_check: bool,
    pub dry_run: bool,
}

impl RunOptions {
    /// Flags override the file.
    fn apply(&self, cfg: &mut PbdConfig) {
        if let Some(dir) = &self.output_dir {
            cfg.output_dir = dir.clone();
        }
        if let Some(n) = self.max_attempts {
            cfg.retry.max_attempts = n;
        }
        if let Some(n) = self.min_concurrency {
            cfg.concurrency.min = n;
        }
        if let Some(n) = self.max_concurrency {
            cfg.concurrency.max = n;
        }
    }
}

/// Returns whether the success ratio met `min_success_ratio`.
pub async fn run_batch(mut cfg: PbdConfig, opts: RunOptions) -> Result<bool> {
    opts.apply(&mut cfg);
    cfg.validate()?;
    let urls = read_url_list(&opts.list)?;
    let identities = SessionIdentityProvider::from_config(&cfg.proxy)?;

    if opts.skip_check {
        tracing::info!("preflight check skipped");
    } else {
        preflight(&identities, &cfg).await?;
    }

    let report = if opts.dry_run {
        execute(&cfg, identities, Arc::new(MemorySink::default()), urls).await?
    } else {
        let sink = Arc::new(DirectorySink::create(&cfg.output_dir)?);
        execute(&cfg, identities, sink, urls).await?
    };

    print_summary(&report);
    if let Some(path) = &opts.report {
        report.write_json(path)?;
        println!("report written to {}", path.display());
    }

    let met = report.meets_threshold(cfg.min_success_ratio);
    if !met {
        tracing::warn!(
            ratio = report.success_ratio(),
            required = cfg.min_success_ratio,
            "success ratio below threshold"
        );
    }
    Ok(met)
}

async fn execute<S: PayloadSink>(
    cfg: &PbdConfig,
    identities: SessionIdentityProvider,
    sink: Arc<S>,
    urls: Vec<String>,
) -> Result<BatchReport> {
    let fetcher = Arc::new(CurlFetcher::new(cfg.fetch.clone(), sink));
    let controller = ConcurrencyController::new(&cfg.concurrency);
    let retry = RetryPolicy::from_config(&cfg.retry);

    let cancel = CancellationToken::new();
    let ctrl_c = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("\ninterrupted: finishing in-flight downloads, no new ones will start");
            ctrl_c.cancel();
        }
    });

    let (progress_tx, mut progress_rx) = tokio::sync::mpsc::channel::<ProgressStats>(64);
    let progress_handle = tokio::spawn(async move {
        while let Some(stats) = progress_rx.recv().await {
            if stats.processed % PROGRESS_EVERY == 0 || stats.is_complete() {
                println!(
                    "  {}/{} done  ok {}  failed {}  ({:.0}%)  slots {}  sessions {}  {:.1} items/min",
                    stats.processed,
                    stats.total,
                    stats.succeeded,
                    stats.failed,
                    stats.success_ratio() * 100.0,
                    stats.concurrency,
                    stats.sessions_created,
                    stats.items_per_minute()
                );
            }
        }
    });

    println!("downloading {} URL(s)", urls.len());
    let report = BatchScheduler::new(fetcher, identities, retry, controller, cfg.fetch.timeout())
        .with_progress(progress_tx)
        .with_cancellation(cancel)
        .run(urls)
        .await;
    // The scheduler owned the sender; the printer ends once the channel drains.
    let _ = progress_handle.await;
    report
}

fn print_summary(report: &BatchReport) {
    let stats = &report.stats;
    println!();
    if report.cancelled {
        println!("run cancelled before completion");
    }
    println!(
        "succeeded {}/{} ({:.1}%), failed {}",
        report.succeeded,
        report.total,
        report.success_ratio() * 100.0,
        report.failed
    );
    println!(
        "attempts {}  sessions {}  concurrency adjustments {}  peak concurrency {}  final {}",
        stats.total_attempts,
        stats.sessions_created,
        stats.concurrency_adjustments,
        stats.peak_concurrency,
        stats.final_concurrency
    );
    println!(
        "elapsed {:.1}s  {:.1} items/min",
        stats.elapsed_secs,
        report.items_per_minute()
    );

    let mut failed = report.failed_items().peekable();
    if failed.peek().is_some() {
        println!("failed:");
        for item in failed {
            println!(
                "  {}  ({} attempt(s)): {}",
                item.url,
                item.attempts,
                item.failure.as_deref().unwrap_or("unknown")
            );
        }
    }
}
