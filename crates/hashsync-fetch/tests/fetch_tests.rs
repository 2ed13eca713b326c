use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use tempfile::TempDir;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

use hashsync_core::{Manifest, ManifestEntry, SyncConfig};
use hashsync_fetch::{
    AssumeYes, Confirm, Confirmation, DirectorySource, DownloadError, DownloadEvent, Downloader,
    FailureKind, ManifestStore, ParallelDownloader, RemoteBody, RemoteSource, SyncOutcome,
    SyncPlan, SyncSession, TransportError,
};
use hashsync_scan::hash_bytes;

const MIRROR: &str = "mem://mirror/";
const BLOCK: usize = 4096;

/// Mirror held in memory. Can ignore ranges and stall after the first block.
#[derive(Default)]
struct MemorySource {
    files: HashMap<String, Bytes>,
    ignore_range: bool,
    stall: bool,
    opened: Mutex<Vec<(String, u64)>>,
}

impl MemorySource {
    fn with_file(mut self, key: &str, content: &[u8]) -> Self {
        self.files
            .insert(format!("{MIRROR}{key}"), Bytes::copy_from_slice(content));
        self
    }

    fn offsets(&self) -> Vec<u64> {
        self.opened.lock().unwrap().iter().map(|(_, o)| *o).collect()
    }

    fn body(&self, location: &str) -> Result<Bytes, TransportError> {
        self.files
            .get(location)
            .cloned()
            .ok_or_else(|| TransportError::Status {
                url: location.to_string(),
                status: 404,
            })
    }
}

#[async_trait]
impl RemoteSource for MemorySource {
    async fn fetch(&self, location: &str) -> Result<Bytes, TransportError> {
        self.body(location)
    }

    async fn content_length(&self, location: &str) -> Result<Option<u64>, TransportError> {
        Ok(self.files.get(location).map(|b| b.len() as u64))
    }

    async fn open(&self, location: &str, offset: u64) -> Result<RemoteBody, TransportError> {
        let body = self.body(location)?;
        self.opened
            .lock()
            .unwrap()
            .push((location.to_string(), offset));

        let start = if self.ignore_range {
            0
        } else {
            offset.min(body.len() as u64)
        };
        let chunks: Vec<Result<Bytes, TransportError>> = body[start as usize..]
            .chunks(BLOCK)
            .map(|c| Ok(Bytes::copy_from_slice(c)))
            .collect();

        let stream = if self.stall {
            futures::stream::iter(chunks.into_iter().take(1))
                .chain(futures::stream::pending())
                .boxed()
        } else {
            futures::stream::iter(chunks).boxed()
        };
        Ok(RemoteBody { start, stream })
    }
}

fn content(len: usize, seed: u8) -> Vec<u8> {
    (0..len).map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed)).collect()
}

fn entry_for(bytes: &[u8]) -> ManifestEntry {
    ManifestEntry::new(hash_bytes(bytes), bytes.len() as u64)
}

fn manifest(items: &[(&str, &[u8])]) -> Manifest {
    items
        .iter()
        .map(|(k, v)| (k.to_string(), entry_for(v)))
        .collect()
}

#[tokio::test]
async fn test_downloads_into_nested_directories() {
    let a = content(10_000, 1);
    let b = content(10, 2);
    let source = Arc::new(
        MemorySource::default()
            .with_file("a.bin", &a[..])
            .with_file("deep/dir/b.bin", &b[..]),
    );
    let temp = TempDir::new().unwrap();

    let report = ParallelDownloader::new(source)
        .download(
            &manifest(&[("a.bin", &a[..]), ("deep/dir/b.bin", &b[..])]),
            MIRROR,
            temp.path(),
        )
        .await
        .unwrap();

    assert_eq!(report.completed, vec!["a.bin", "deep/dir/b.bin"]);
    assert_eq!(report.bytes_written, 10_010);
    assert_eq!(fs::read(temp.path().join("deep/dir/b.bin")).unwrap(), b);
}

#[tokio::test]
async fn test_resume_appends_missing_tail() {
    let full = content(10_000, 7);
    let source = Arc::new(MemorySource::default().with_file("big.bin", &full[..]));
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("big.bin"), &full[..4_000]).unwrap();

    let (tx, mut rx) = mpsc::channel(256);
    let report = ParallelDownloader::new(source.clone())
        .with_events(tx)
        .download(&manifest(&[("big.bin", &full[..])]), MIRROR, temp.path())
        .await
        .unwrap();

    assert_eq!(source.offsets(), vec![4_000]);
    assert_eq!(report.bytes_written, 6_000);
    assert_eq!(fs::read(temp.path().join("big.bin")).unwrap(), full);

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    assert!(matches!(events.first(), Some(DownloadEvent::Queued { files: 1, .. })));
    assert!(events.contains(&DownloadEvent::Started {
        path: "big.bin".to_string(),
        total: 10_000,
        resumed_from: 4_000,
    }));
    assert_eq!(
        events.last(),
        Some(&DownloadEvent::Finished {
            path: "big.bin".to_string()
        })
    );
}

#[tokio::test]
async fn test_range_ignored_rewrites_from_start() {
    let full = content(9_000, 3);
    let source = Arc::new(MemorySource {
        ignore_range: true,
        ..MemorySource::default().with_file("f.bin", &full[..])
    });
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("f.bin"), &full[..5_000]).unwrap();

    let report = ParallelDownloader::new(source.clone())
        .download(&manifest(&[("f.bin", &full[..])]), MIRROR, temp.path())
        .await
        .unwrap();

    assert_eq!(source.offsets(), vec![5_000]);
    assert_eq!(report.bytes_written, 9_000);
    assert_eq!(fs::read(temp.path().join("f.bin")).unwrap(), full);
}

#[tokio::test]
async fn test_stale_partial_is_downloaded_again_from_zero() {
    let full = content(8_000, 5);
    let source = Arc::new(MemorySource::default().with_file("f.bin", &full[..]));
    let temp = TempDir::new().unwrap();
    // Wrong bytes in the partial file; resuming produces a bad file.
    fs::write(temp.path().join("f.bin"), content(3_000, 99)).unwrap();

    let (tx, mut rx) = mpsc::channel(256);
    ParallelDownloader::new(source.clone())
        .with_events(tx)
        .download(&manifest(&[("f.bin", &full[..])]), MIRROR, temp.path())
        .await
        .unwrap();

    assert_eq!(source.offsets(), vec![3_000, 0]);
    assert_eq!(fs::read(temp.path().join("f.bin")).unwrap(), full);

    let mut events = Vec::new();
    while let Ok(event) = rx.try_recv() {
        events.push(event);
    }
    let started: Vec<usize> = events
        .iter()
        .enumerate()
        .filter(|(_, e)| matches!(e, DownloadEvent::Started { .. }))
        .map(|(i, _)| i)
        .collect();
    let restarted: Vec<usize> = events
        .iter()
        .enumerate()
        .filter(|(_, e)| matches!(e, DownloadEvent::Restarted { .. }))
        .map(|(i, _)| i)
        .collect();
    assert_eq!(started.len(), 2);
    assert_eq!(restarted.len(), 1);
    assert!(started[0] < restarted[0] && restarted[0] < started[1]);
    assert_eq!(
        events[restarted[0]],
        DownloadEvent::Restarted {
            path: "f.bin".to_string(),
            discarded: 8_000,
        }
    );

    // What a progress bar would show: kept bytes plus written bytes, less
    // whatever the restart threw away, ends at exactly the file size.
    let shown = events.iter().fold(0i64, |shown, event| match event {
        DownloadEvent::Started { resumed_from, .. } => shown + *resumed_from as i64,
        DownloadEvent::Advanced { bytes, .. } => shown + *bytes as i64,
        DownloadEvent::Restarted { discarded, .. } => shown - *discarded as i64,
        _ => shown,
    });
    assert_eq!(shown, 8_000);
}

#[tokio::test]
async fn test_larger_local_file_is_overwritten() {
    let full = content(1_000, 1);
    let source = Arc::new(MemorySource::default().with_file("f.bin", &full[..]));
    let temp = TempDir::new().unwrap();
    fs::write(temp.path().join("f.bin"), content(5_000, 2)).unwrap();

    ParallelDownloader::new(source.clone())
        .download(&manifest(&[("f.bin", &full[..])]), MIRROR, temp.path())
        .await
        .unwrap();

    assert_eq!(source.offsets(), vec![0]);
    assert_eq!(fs::read(temp.path().join("f.bin")).unwrap(), full);
}

#[tokio::test]
async fn test_corrupt_and_missing_files_fail_after_all_attempted() {
    let good = content(2_000, 1);
    let expected = content(2_000, 2);
    let served = content(2_000, 3);
    let source = Arc::new(
        MemorySource::default()
            .with_file("good.bin", &good[..])
            .with_file("corrupt.bin", &served[..]),
    );
    let temp = TempDir::new().unwrap();
    let entries = manifest(&[
        ("good.bin", &good[..]),
        ("corrupt.bin", &expected[..]),
        ("missing.bin", &b"gone"[..]),
    ]);

    let err = ParallelDownloader::new(source)
        .with_workers(1)
        .download(&entries, MIRROR, temp.path())
        .await
        .unwrap_err();

    let DownloadError::Incomplete { report } = &err else {
        panic!("expected incomplete download, got {err:?}");
    };
    assert_eq!(report.completed, vec!["good.bin"]);
    assert_eq!(report.failures.len(), 2);
    assert_eq!(report.corrupt_count(), 1);
    assert!(report.cancelled.is_empty());

    let corrupt = &report.failures[0];
    assert_eq!(corrupt.path, "corrupt.bin");
    assert!(matches!(
        corrupt.kind,
        FailureKind::Corrupt { expected: e, actual: a }
            if e == hash_bytes(&expected) && a == hash_bytes(&served)
    ));
    assert!(matches!(report.failures[1].kind, FailureKind::Transport(_)));

    // Corrupt downloads stay on disk for the next run to replace.
    assert!(temp.path().join("corrupt.bin").exists());
    assert!(err.to_string().contains("run the sync again"));
}

#[tokio::test]
async fn test_cancel_before_start_dispatches_nothing() {
    let data = content(100, 1);
    let source = Arc::new(
        MemorySource::default()
            .with_file("a", &data[..])
            .with_file("b", &data[..]),
    );
    let temp = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    cancel.cancel();

    let err = ParallelDownloader::new(source.clone())
        .with_cancellation(cancel)
        .download(
            &manifest(&[("a", &data[..]), ("b", &data[..])]),
            MIRROR,
            temp.path(),
        )
        .await
        .unwrap_err();

    let DownloadError::Cancelled { report } = &err else {
        panic!("expected a cancelled download, got {err:?}");
    };
    assert_eq!(report.cancelled, vec!["a", "b"]);
    assert!(source.offsets().is_empty());
    assert!(!temp.path().join("a").exists());
}

#[tokio::test]
async fn test_cancel_mid_transfer_keeps_whole_blocks() {
    let data = content(3 * BLOCK, 4);
    let source = Arc::new(MemorySource {
        stall: true,
        ..MemorySource::default().with_file("slow.bin", &data[..])
    });
    let temp = TempDir::new().unwrap();
    let cancel = CancellationToken::new();
    let (tx, mut rx) = mpsc::channel(256);

    let downloader = ParallelDownloader::new(source)
        .with_cancellation(cancel.clone())
        .with_events(tx);
    let entries = manifest(&[("slow.bin", &data[..])]);
    let dest = temp.path().to_path_buf();
    let task = tokio::spawn(async move { downloader.download(&entries, MIRROR, &dest).await });

    while let Some(event) = rx.recv().await {
        if matches!(event, DownloadEvent::Advanced { .. }) {
            cancel.cancel();
            break;
        }
    }

    let err = task.await.unwrap().unwrap_err();
    let DownloadError::Cancelled { report } = &err else {
        panic!("expected a cancelled download, got {err:?}");
    };
    assert_eq!(report.cancelled, vec!["slow.bin"]);
    assert_eq!(fs::metadata(temp.path().join("slow.bin")).unwrap().len(), BLOCK as u64);
}

// Session tests run against a mirror directory on disk.

struct Scripted {
    answer: Confirmation,
    asked: AtomicUsize,
    last_stale: Mutex<Vec<String>>,
}

impl Scripted {
    fn new(answer: Confirmation) -> Self {
        Self {
            answer,
            asked: AtomicUsize::new(0),
            last_stale: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl Confirm for Scripted {
    async fn confirm(&self, plan: &SyncPlan) -> Confirmation {
        self.asked.fetch_add(1, Ordering::SeqCst);
        *self.last_stale.lock().unwrap() = plan.stale.clone();
        self.answer
    }
}

struct Never;

#[async_trait]
impl Confirm for Never {
    async fn confirm(&self, _plan: &SyncPlan) -> Confirmation {
        std::future::pending().await
    }
}

fn write(root: &Path, key: &str, data: &[u8]) {
    let path = root.join(key);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, data).unwrap();
}

/// Mirror with a generated manifest; returns the manifest location.
async fn publish(mirror: &Path) -> String {
    write(mirror, "game.exe", &content(5_000, 1));
    write(mirror, "data/level1.pak", &content(12_000, 2));
    write(mirror, "data/level2.pak", &content(700, 3));

    let manifest_path = mirror.join("hashtable.json");
    let publisher = SyncSession::new(SyncConfig::new(mirror));
    publisher.generate(&manifest_path).await.unwrap();
    manifest_path.to_string_lossy().into_owned()
}

fn local_downloader() -> ParallelDownloader {
    ParallelDownloader::new(Arc::new(DirectorySource::new()))
}

#[tokio::test]
async fn test_generate_round_trips_through_store() {
    let mirror = TempDir::new().unwrap();
    write(mirror.path(), "a.txt", b"alpha");
    write(mirror.path(), "sub/b.txt", b"bravo");

    let session = SyncSession::new(SyncConfig::new(mirror.path()));
    let dest = mirror.path().join("out.json");
    let (written, generated) = session.generate(&dest).await.unwrap();

    assert!(written.is_absolute());
    let loaded = ManifestStore::new(Arc::new(DirectorySource::new()))
        .load(&written.to_string_lossy())
        .await
        .unwrap();
    assert_eq!(loaded, generated);
    assert_eq!(loaded.get("sub/b.txt"), Some(&entry_for(b"bravo")));
}

#[tokio::test]
async fn test_verify_reports_differences_without_changing_anything() {
    let mirror = TempDir::new().unwrap();
    let location = publish(mirror.path()).await;
    let dest = TempDir::new().unwrap();
    write(dest.path(), "game.exe", &content(5_000, 1));
    write(dest.path(), "data/level1.pak", b"old level");

    let session = SyncSession::new(SyncConfig::new(dest.path()));
    let reconciliation = session.verify(&location).await.unwrap();

    assert_eq!(
        reconciliation.diff.paths(),
        vec!["data/level1.pak", "data/level2.pak"]
    );
    assert_eq!(reconciliation.diff.total_bytes(), 12_700);
    assert_eq!(fs::read(dest.path().join("data/level1.pak")).unwrap(), b"old level");
}

#[tokio::test]
async fn test_run_syncs_and_resets() {
    let mirror = TempDir::new().unwrap();
    let location = publish(mirror.path()).await;
    let dest = TempDir::new().unwrap();
    write(dest.path(), "data/level1.pak", &content(4_000, 2)[..1_000]);
    write(dest.path(), "mods/extra.pak", b"user mod");
    write(dest.path(), "saves/slot1", b"progress");

    let config = SyncConfig::builder()
        .root(dest.path())
        .reset_to_remote(true)
        .exclude(vec!["saves".to_string()])
        .build()
        .unwrap();
    let session = SyncSession::new(config);
    let confirm = Scripted::new(Confirmation::Proceed);

    let outcome = session
        .run(&location, &confirm, &local_downloader())
        .await
        .unwrap();

    assert!(outcome.is_success());
    assert_eq!(confirm.asked.load(Ordering::SeqCst), 1);
    assert_eq!(*confirm.last_stale.lock().unwrap(), vec!["mods/extra.pak"]);
    let SyncOutcome::Synced { reset, download } = outcome else {
        panic!("expected a sync");
    };
    assert_eq!(reset.unwrap().removed, vec!["mods/extra.pak"]);
    assert_eq!(download.unwrap().completed.len(), 3);

    assert!(!dest.path().join("mods/extra.pak").exists());
    assert!(dest.path().join("saves/slot1").exists());
    assert_eq!(
        fs::read(dest.path().join("data/level1.pak")).unwrap(),
        content(12_000, 2)
    );

    // A second run finds nothing to do.
    let again = session
        .run(&location, &confirm, &local_downloader())
        .await
        .unwrap();
    assert!(matches!(again, SyncOutcome::UpToDate));
    assert_eq!(confirm.asked.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_declined_run_leaves_tree_untouched() {
    let mirror = TempDir::new().unwrap();
    let location = publish(mirror.path()).await;
    let dest = TempDir::new().unwrap();
    write(dest.path(), "stale.txt", b"keep me for now");

    let mut config = SyncConfig::new(dest.path());
    config.reset_to_remote = true;
    let session = SyncSession::new(config);

    let outcome = session
        .run(&location, &Scripted::new(Confirmation::Decline), &local_downloader())
        .await
        .unwrap();

    assert!(matches!(outcome, SyncOutcome::Declined(Confirmation::Decline)));
    assert!(dest.path().join("stale.txt").exists());
    assert!(!dest.path().join("game.exe").exists());
}

#[tokio::test]
async fn test_stale_only_run_still_asks() {
    let mirror = TempDir::new().unwrap();
    let location = publish(mirror.path()).await;
    let dest = TempDir::new().unwrap();
    for key in ["game.exe", "data/level1.pak", "data/level2.pak"] {
        fs::create_dir_all(dest.path().join("data")).unwrap();
        fs::copy(mirror.path().join(key), dest.path().join(key)).unwrap();
    }
    write(dest.path(), "leftover.log", b"old");

    let mut config = SyncConfig::new(dest.path());
    config.reset_to_remote = true;
    let session = SyncSession::new(config);
    let confirm = Scripted::new(Confirmation::Proceed);

    let outcome = session
        .run(&location, &confirm, &local_downloader())
        .await
        .unwrap();

    assert_eq!(confirm.asked.load(Ordering::SeqCst), 1);
    let SyncOutcome::Synced { reset, download } = outcome else {
        panic!("expected a sync");
    };
    assert_eq!(reset.unwrap().removed, vec!["leftover.log"]);
    assert_eq!(download.unwrap().attempted(), 0);
    assert!(!dest.path().join("leftover.log").exists());
}

#[tokio::test]
async fn test_assume_yes_skips_prompt_and_timeout_declines() {
    let mirror = TempDir::new().unwrap();
    let location = publish(mirror.path()).await;

    let dest = TempDir::new().unwrap();
    let mut config = SyncConfig::new(dest.path());
    config.prompt_timeout_secs = Some(0);
    let outcome = SyncSession::new(config)
        .run(&location, &Never, &local_downloader())
        .await
        .unwrap();
    assert!(matches!(outcome, SyncOutcome::Declined(Confirmation::TimedOut)));
    assert!(!dest.path().join("game.exe").exists());

    let mut config = SyncConfig::new(dest.path());
    config.assume_yes = true;
    let outcome = SyncSession::new(config)
        .run(&location, &Never, &local_downloader())
        .await
        .unwrap();
    assert!(outcome.is_success());
    assert!(dest.path().join("game.exe").exists());

    let outcome = SyncSession::new(SyncConfig::new(dest.path()))
        .run(&location, &AssumeYes, &local_downloader())
        .await
        .unwrap();
    assert!(matches!(outcome, SyncOutcome::UpToDate));
}

#[tokio::test]
async fn test_interrupted_run_changes_nothing() {
    let mirror = TempDir::new().unwrap();
    let location = publish(mirror.path()).await;
    let dest = TempDir::new().unwrap();
    write(dest.path(), "stale.txt", b"still here");

    let mut config = SyncConfig::new(dest.path());
    config.reset_to_remote = true;
    config.assume_yes = true;
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = SyncSession::new(config)
        .with_cancellation(cancel.clone())
        .run(
            &location,
            &AssumeYes,
            &local_downloader().with_cancellation(cancel),
        )
        .await
        .unwrap();

    assert!(matches!(outcome, SyncOutcome::Interrupted));
    assert!(!outcome.is_success());
    assert!(dest.path().join("stale.txt").exists());
    assert!(!dest.path().join("game.exe").exists());
}

/// Cancels the run while the prompt is open, then answers no.
struct InterruptedPrompt(CancellationToken);

#[async_trait]
impl Confirm for InterruptedPrompt {
    async fn confirm(&self, _plan: &SyncPlan) -> Confirmation {
        self.0.cancel();
        Confirmation::Decline
    }
}

#[tokio::test]
async fn test_interrupt_at_prompt_is_not_a_decline() {
    let mirror = TempDir::new().unwrap();
    let location = publish(mirror.path()).await;
    let dest = TempDir::new().unwrap();
    write(dest.path(), "stale.txt", b"still here");

    let mut config = SyncConfig::new(dest.path());
    config.reset_to_remote = true;
    let cancel = CancellationToken::new();

    let outcome = SyncSession::new(config)
        .with_cancellation(cancel.clone())
        .run(&location, &InterruptedPrompt(cancel), &local_downloader())
        .await
        .unwrap();

    assert!(matches!(outcome, SyncOutcome::Interrupted));
    assert!(!outcome.is_success());
    assert!(dest.path().join("stale.txt").exists());
}

#[tokio::test]
async fn test_regenerating_in_place_leaves_the_hashtable_out() {
    let mirror = TempDir::new().unwrap();
    let location = publish(mirror.path()).await;
    write(mirror.path(), "data/patch.pak", &content(300, 9));

    let publisher = SyncSession::new(SyncConfig::new(mirror.path()));
    let (_, regenerated) = publisher.generate(Path::new(&location)).await.unwrap();

    assert!(!regenerated.contains("hashtable.json"));
    assert!(regenerated.contains("data/patch.pak"));
    assert_eq!(regenerated.len(), 4);

    let dest = TempDir::new().unwrap();
    let outcome = SyncSession::new(SyncConfig::new(dest.path()))
        .run(&location, &AssumeYes, &local_downloader())
        .await
        .unwrap();

    assert!(outcome.is_success());
    assert!(!dest.path().join("hashtable.json").exists());
    assert_eq!(
        fs::read(dest.path().join("data/patch.pak")).unwrap(),
        content(300, 9)
    );
}

#[cfg(unix)]
#[tokio::test]
async fn test_colon_file_names_survive_generate_load_and_sync() {
    let mirror = TempDir::new().unwrap();
    write(mirror.path(), "logs/12:00.txt", b"noon");
    write(mirror.path(), "db/C:backup", b"not a drive");

    let location = mirror.path().join("hashtable.json");
    let (_, generated) = SyncSession::new(SyncConfig::new(mirror.path()))
        .generate(&location)
        .await
        .unwrap();
    assert_eq!(
        generated.keys().collect::<Vec<_>>(),
        vec!["db/C:backup", "logs/12:00.txt"]
    );

    let location = location.to_string_lossy().into_owned();
    let loaded = ManifestStore::new(Arc::new(DirectorySource::new()))
        .load(&location)
        .await
        .unwrap();
    assert_eq!(loaded, generated);

    let dest = TempDir::new().unwrap();
    let outcome = SyncSession::new(SyncConfig::new(dest.path()))
        .run(&location, &AssumeYes, &local_downloader())
        .await
        .unwrap();
    assert!(outcome.is_success());
    assert_eq!(fs::read(dest.path().join("logs/12:00.txt")).unwrap(), b"noon");
}

#[tokio::test]
async fn test_session_loads_manifest_through_given_source() {
    let a = content(2_000, 1);
    let table = manifest(&[("a.bin", &a[..])]).to_pretty_json().unwrap();
    let source = Arc::new(
        MemorySource::default()
            .with_file("a.bin", &a[..])
            .with_file("hashtable.json", &table),
    );
    let dest = TempDir::new().unwrap();

    let session = SyncSession::new(SyncConfig::new(dest.path())).with_source(source.clone());
    let location = format!("{MIRROR}hashtable.json");
    let reconciliation = session.verify(&location).await.unwrap();
    assert_eq!(reconciliation.diff.paths(), vec!["a.bin"]);

    let outcome = session
        .run(&location, &AssumeYes, &ParallelDownloader::new(source))
        .await
        .unwrap();
    assert!(outcome.is_success());
    assert_eq!(fs::read(dest.path().join("a.bin")).unwrap(), a);
}
