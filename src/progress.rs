//! Terminal rendering of scan and download progress.

use indicatif::{ProgressBar, ProgressFinish, ProgressStyle};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

use hashsync_fetch::DownloadEvent;
use hashsync_scan::ScanProgress;

fn style(template: &str) -> ProgressStyle {
    ProgressStyle::default_bar()
        .template(template)
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("#>-")
}

/// Render hashing progress until the scan completes.
///
/// The bar only appears once the first update arrives, so scans of empty
/// trees print nothing.
pub fn render_scan(mut rx: broadcast::Receiver<ScanProgress>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut bar: Option<ProgressBar> = None;
        loop {
            let progress = match rx.recv().await {
                Ok(progress) => progress,
                Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => break,
            };

            let bar = bar.get_or_insert_with(|| {
                // Cleared on drop, since the task is aborted once the scan ends.
                ProgressBar::new(progress.files_total)
                    .with_style(style(
                        "Hashing [{elapsed_precise}] [{wide_bar:.cyan/blue}] {pos}/{len} {msg}",
                    ))
                    .with_finish(ProgressFinish::AndClear)
            });
            bar.set_length(progress.files_total);
            let done = progress.files_hashed + progress.errors_count;
            bar.set_position(done);
            bar.set_message(progress.current_path.display().to_string());

            if done >= progress.files_total {
                bar.finish_and_clear();
                break;
            }
        }
    })
}

/// Render download events until every sender is dropped.
pub fn render_downloads(mut rx: mpsc::Receiver<DownloadEvent>) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut bar: Option<ProgressBar> = None;
        while let Some(event) = rx.recv().await {
            match event {
                DownloadEvent::Queued { files, bytes } => {
                    let b = ProgressBar::new(bytes);
                    b.set_style(style(
                        "{msg}\n[{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({bytes_per_sec}, {eta})",
                    ));
                    b.set_message(format!("Downloading {files} files"));
                    bar = Some(b);
                }
                DownloadEvent::Started {
                    path, resumed_from, ..
                } => {
                    if let Some(bar) = &bar {
                        bar.inc(resumed_from);
                        bar.set_message(path);
                    }
                }
                DownloadEvent::Advanced { bytes, .. } => {
                    if let Some(bar) = &bar {
                        bar.inc(bytes);
                    }
                }
                DownloadEvent::Verifying { path } => {
                    if let Some(bar) = &bar {
                        bar.set_message(format!("Verifying {path}"));
                    }
                }
                DownloadEvent::Restarted { discarded, .. } => {
                    if let Some(bar) = &bar {
                        bar.set_position(bar.position().saturating_sub(discarded));
                    }
                }
                DownloadEvent::Finished { .. } => {}
                DownloadEvent::Failed { path, reason } => {
                    if let Some(bar) = &bar {
                        bar.println(format!("Failed: {path}: {reason}"));
                    }
                }
            }
        }

        if let Some(bar) = bar {
            bar.finish_and_clear();
        }
    })
}
