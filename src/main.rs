//! hashsync - keep a directory identical to a published hashtable.
//!
//! Usage:
//!   hashsync URL                   Download whatever differs from the hashtable
//!   hashsync --verify URL          List changed or missing files
//!   hashsync --generate FILE       Hash the destination into a new hashtable
//!   hashsync --help                Show help

mod progress;
mod prompt;

use std::path::{Path, PathBuf};

use clap::Parser;
use color_eyre::eyre::{Context, Result, eyre};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use hashsync_core::SyncConfig;
use hashsync_fetch::{
    EVENT_CHANNEL_SIZE, ParallelDownloader, SyncOutcome, SyncSession, source_for,
};
use hashsync_reconcile::ResetReport;
use hashsync_scan::Hasher;

use crate::progress::{render_downloads, render_scan};
use crate::prompt::StdinPrompt;

#[derive(Parser)]
#[command(
    name = "hashsync",
    version,
    about = "Keep a directory in sync with a remote hashtable",
    long_about = "hashsync compares a directory against a hashtable of SHA-256 digests \
                  and downloads only the files that are missing or changed.\n\n\
                  Partial downloads are resumed and every file is verified after download."
)]
struct Cli {
    /// URL or path to hashtable
    hashtable: String,

    /// Generate hashtable of the destination directory (recursive)
    #[arg(short, long)]
    generate: bool,

    /// Exclude top-level directories or files, separated by comma
    #[arg(short, long, value_delimiter = ',')]
    exclude: Vec<String>,

    /// Don't download the files, just verify integrity
    #[arg(long)]
    verify: bool,

    /// Say yes to any prompt
    #[arg(short, long)]
    yes: bool,

    /// URL or directory used as root for downloading
    #[arg(short, long)]
    mirror: Option<String>,

    /// Suppress outputting list of differences
    #[arg(short = 'c', long)]
    no_changed: bool,

    /// Hash all files, not only those present in remote hashtable
    #[arg(short = 'a', long)]
    hash_all: bool,

    /// Destination directory
    #[arg(short, long)]
    destination: Option<PathBuf>,

    /// Verbose output
    #[arg(short, long)]
    verbose: bool,

    /// Reset everything to the remote state, deleting files it does not list
    #[arg(short, long)]
    reset: bool,

    /// Read settings from a TOML file; flags override it
    #[arg(long)]
    config: Option<PathBuf>,

    /// Number of concurrent downloads
    #[arg(short = 'j', long)]
    workers: Option<usize>,

    /// Decline automatically if the prompt is not answered in time (seconds)
    #[arg(long)]
    prompt_timeout: Option<u64>,
}

impl Cli {
    fn into_config(self) -> Result<(SyncConfig, Mode, String)> {
        let mut config = match &self.config {
            Some(path) => SyncConfig::from_toml_file(path)
                .with_context(|| format!("Failed to load config {}", path.display()))?,
            None => SyncConfig::default(),
        };

        if let Some(destination) = self.destination {
            config.root = destination;
        }
        config.exclude.extend(
            self.exclude
                .into_iter()
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty()),
        );
        config.full_rescan |= self.hash_all;
        config.reset_to_remote |= self.reset;
        config.assume_yes |= self.yes;
        if self.mirror.is_some() {
            config.mirror = self.mirror;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if self.prompt_timeout.is_some() {
            config.prompt_timeout_secs = self.prompt_timeout;
        }
        config.check()?;

        let mode = if self.generate {
            Mode::Generate
        } else if self.verify {
            Mode::Verify {
                list_changed: !self.no_changed,
            }
        } else {
            Mode::Sync
        };

        Ok((config, mode, self.hashtable))
    }
}

enum Mode {
    Generate,
    Verify { list_changed: bool },
    Sync,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_logging(cli.verbose);

    let (config, mode, hashtable) = cli.into_config()?;
    tracing::debug!("Parsed exclude: {:?}", config.exclude);

    match mode {
        Mode::Generate => run_generate(config, &hashtable).await,
        Mode::Verify { list_changed } => run_verify(config, &hashtable, list_changed).await,
        Mode::Sync => run_sync(config, &hashtable).await,
    }
}

fn init_logging(verbose: bool) {
    let default = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Hash the destination and write the hashtable.
async fn run_generate(config: SyncConfig, dest: &str) -> Result<()> {
    let session = SyncSession::new(config);
    let render = render_scan(session.reconciler().scanner().subscribe());

    let result = session.generate(Path::new(dest)).await;
    render.abort();
    let (written, manifest) = result.context("Failed to generate hashtable")?;

    println!("{}", written.display());
    info!(
        "Hashtable generated: {} files, {}",
        manifest.len(),
        format_size(manifest.total_size())
    );
    Ok(())
}

/// Print what differs. Differences are not an error.
async fn run_verify(config: SyncConfig, hashtable: &str, list_changed: bool) -> Result<()> {
    let session = SyncSession::new(config);
    let render = render_scan(session.reconciler().scanner().subscribe());

    let result = session.verify(hashtable).await;
    render.abort();
    let reconciliation = result.context("Verification failed")?;

    if list_changed {
        println!("---Changed or missing files---");
        for path in reconciliation.diff.paths() {
            println!("{path}");
        }
    }
    println!("Total size: {}", format_size(reconciliation.diff.total_bytes()));
    Ok(())
}

/// Download missing or changed files, optionally deleting extras first.
async fn run_sync(config: SyncConfig, hashtable: &str) -> Result<()> {
    let mirror = config.resolve_mirror(hashtable)?;
    let source = source_for(&mirror).context("Failed to set up transport")?;

    let cancel = CancellationToken::new();
    spawn_interrupt_handler(cancel.clone());

    let (tx, rx) = mpsc::channel(EVENT_CHANNEL_SIZE);
    let downloader = ParallelDownloader::new(source)
        .with_workers(config.workers)
        .with_hasher(Hasher::with_chunk_size(config.chunk_size))
        .with_cancellation(cancel.clone())
        .with_events(tx);
    let render_dl = render_downloads(rx);

    let session = SyncSession::new(config).with_cancellation(cancel.clone());
    let render = render_scan(session.reconciler().scanner().subscribe());
    let prompt = StdinPrompt::new(cancel);

    let result = session.run(hashtable, &prompt, &downloader).await;
    render.abort();
    drop(downloader);
    let _ = render_dl.await;

    match result.context("Sync failed")? {
        SyncOutcome::UpToDate | SyncOutcome::Declined(_) => Ok(()),
        SyncOutcome::Interrupted => Err(eyre!("Interrupted, no files were changed")),
        SyncOutcome::Synced { reset, download } => {
            let reset_failed = reset.as_ref().is_some_and(|r| !r.is_success());
            if let Some(report) = &reset {
                report_reset(report);
            }

            match download {
                Ok(report) => {
                    if report.attempted() > 0 {
                        info!(
                            "All {} files downloaded and verified ({})",
                            report.completed.len(),
                            format_size(report.bytes_written)
                        );
                    }
                }
                Err(err) => {
                    for failure in &err.report().failures {
                        warn!("{failure}");
                    }
                    return Err(err.into());
                }
            }

            if reset_failed {
                return Err(eyre!(
                    "Some files could not be deleted; run the sync again to retry"
                ));
            }
            Ok(())
        }
    }
}

fn report_reset(report: &ResetReport) {
    for failure in &report.failures {
        warn!("{failure}");
    }
}

/// First Ctrl-C cancels the run; downloads stop at a block boundary.
fn spawn_interrupt_handler(cancel: CancellationToken) {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted, stopping...");
            cancel.cancel();
        }
    });
}

pub(crate) fn format_size(bytes: u64) -> String {
    humansize::format_size(bytes, humansize::BINARY)
}
