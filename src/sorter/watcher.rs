use crate::sorter::config::SorterConfig;
use crate::sorter::intake::{EventKind, InboxEvent, IntakeFilter, scan_inbox};
use crate::sorter::paths::SorterPaths;
use crate::sorter::pipeline::{FileOutcome, Pipeline};
use crate::sorter::util::{now_utc, rfc3339};
use anyhow::{Context, Result, anyhow};
use fs2::FileExt;
use notify::{RecursiveMode, Watcher};
use serde::Serialize;
use std::collections::HashMap;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::{Mutex, PoisonError};
use std::thread;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Default, Serialize)]
pub struct WatchSummary {
    pub archived: usize,
    pub quarantined: usize,
    pub skipped: usize,
    pub coalesced: usize,
    pub ignored: usize,
}

impl WatchSummary {
    pub fn processed(&self) -> usize {
        self.archived + self.quarantined + self.skipped
    }
}

#[derive(Debug, Default)]
struct Tally {
    archived: AtomicUsize,
    quarantined: AtomicUsize,
    skipped: AtomicUsize,
    coalesced: AtomicUsize,
    ignored: AtomicUsize,
}

impl Tally {
    fn record(&self, outcome: &FileOutcome) {
        let slot = match outcome {
            FileOutcome::Archived(_) => &self.archived,
            FileOutcome::Quarantined { .. } => &self.quarantined,
            FileOutcome::Skipped { .. } => &self.skipped,
        };
        slot.fetch_add(1, Ordering::Relaxed);
    }

    fn summary(&self) -> WatchSummary {
        WatchSummary {
            archived: self.archived.load(Ordering::Relaxed),
            quarantined: self.quarantined.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
            coalesced: self.coalesced.load(Ordering::Relaxed),
            ignored: self.ignored.load(Ordering::Relaxed),
        }
    }
}

/// Paths currently being processed, each with a "run again" flag set when
/// another event for the same path arrives mid-flight.
#[derive(Debug, Default)]
struct InFlight {
    paths: Mutex<HashMap<PathBuf, bool>>,
}

impl InFlight {
    /// True if the caller now owns `path`; false if it was already in flight
    /// (the later event is folded into a single rerun).
    fn begin(&self, path: &Path) -> bool {
        let mut paths = self.paths.lock().unwrap_or_else(PoisonError::into_inner);
        match paths.get_mut(path) {
            Some(rerun) => {
                *rerun = true;
                false
            }
            None => {
                paths.insert(path.to_path_buf(), false);
                true
            }
        }
    }

    /// True if a rerun was requested; ownership is kept in that case.
    fn finish(&self, path: &Path) -> bool {
        let mut paths = self.paths.lock().unwrap_or_else(PoisonError::into_inner);
        match paths.get_mut(path) {
            Some(rerun) if *rerun => {
                *rerun = false;
                true
            }
            _ => {
                paths.remove(path);
                false
            }
        }
    }
}

fn worker_loop(pipeline: &Pipeline, jobs: &Mutex<Receiver<InboxEvent>>, inflight: &InFlight, tally: &Tally) {
    loop {
        let next = jobs.lock().unwrap_or_else(PoisonError::into_inner).recv();
        let Ok(mut event) = next else {
            return;
        };
        loop {
            let outcome = pipeline.handle(&event);
            debug!(
                source = %event.path.display(),
                outcome = outcome.label(),
                "file finished"
            );
            tally.record(&outcome);
            if !inflight.finish(&event.path) {
                break;
            }
            event = InboxEvent::modified(event.path);
        }
    }
}

/// Drain `events` until every sender is gone, fanning qualifying files out to
/// `workers` threads. A single file's failure never ends the loop.
pub fn run_loop(
    pipeline: &Pipeline,
    filter: &IntakeFilter,
    events: Receiver<InboxEvent>,
    workers: usize,
) -> WatchSummary {
    let (job_tx, job_rx) = mpsc::channel::<InboxEvent>();
    let job_rx = Mutex::new(job_rx);
    let inflight = InFlight::default();
    let tally = Tally::default();

    thread::scope(|scope| {
        for _ in 0..workers.max(1) {
            scope.spawn(|| worker_loop(pipeline, &job_rx, &inflight, &tally));
        }

        for event in events {
            if !filter.accepts(&event) {
                tally.ignored.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            if !inflight.begin(&event.path) {
                tally.coalesced.fetch_add(1, Ordering::Relaxed);
                continue;
            }
            if job_tx.send(event).is_err() {
                break;
            }
        }
        drop(job_tx);
    });

    tally.summary()
}

fn ensure_dirs(paths: &SorterPaths) -> Result<()> {
    for dir in [&paths.inbox_dir, &paths.archive_dir, &paths.errors_dir, &paths.logs_dir] {
        fs::create_dir_all(dir).with_context(|| format!("failed to create {}", dir.display()))?;
    }
    Ok(())
}

fn feed_backlog(filter: &IntakeFilter, tx: &Sender<InboxEvent>) -> Result<usize> {
    let backlog = scan_inbox(filter)?;
    let count = backlog.len();
    for path in backlog {
        if tx.send(InboxEvent::created(path)).is_err() {
            break;
        }
    }
    Ok(count)
}

/// Process whatever is in the inbox right now, then return.
pub fn run_once(paths: &SorterPaths, cfg: &SorterConfig) -> Result<WatchSummary> {
    ensure_dirs(paths)?;
    let filter = IntakeFilter::new(&paths.inbox_dir, cfg);
    let pipeline = Pipeline::new(paths.clone(), cfg);

    let (tx, rx) = mpsc::channel();
    let backlog = feed_backlog(&filter, &tx)?;
    drop(tx);
    info!(inbox = %filter.inbox().display(), backlog, "processing inbox backlog");

    Ok(run_loop(&pipeline, &filter, rx, cfg.watcher.workers))
}

#[derive(Debug, Serialize)]
struct DaemonLockPayload {
    pid: u32,
    build_uuid: &'static str,
    start_time: String,
}

/// Exclusive advisory lock proving this process owns the inbox.
#[derive(Debug)]
pub struct DaemonLock {
    file: File,
    path: PathBuf,
}

impl DaemonLock {
    pub fn acquire(paths: &SorterPaths) -> Result<Self> {
        let path = paths.daemon_lock_file();
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let mut file = fs::OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .with_context(|| format!("failed to open {}", path.display()))?;
        file.try_lock_exclusive().map_err(|_| {
            anyhow!(
                "another inbox-sorter watcher already holds {}",
                path.display()
            )
        })?;

        let payload = DaemonLockPayload {
            pid: std::process::id(),
            build_uuid: env!("BUILD_UUID"),
            start_time: rfc3339(&now_utc()),
        };
        file.set_len(0)?;
        file.write_all(serde_json::to_string(&payload)?.as_bytes())?;
        file.flush()?;

        Ok(Self { file, path })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for DaemonLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

fn map_event(event: notify::Event, tx: &Sender<InboxEvent>) {
    let kind = match event.kind {
        notify::EventKind::Create(_) => EventKind::Created,
        notify::EventKind::Modify(_) => EventKind::Modified,
        _ => return,
    };
    for path in event.paths {
        let _ = tx.send(InboxEvent { path, kind });
    }
}

/// Watch the inbox until the process is stopped externally.
pub fn run_daemon(paths: &SorterPaths, cfg: &SorterConfig) -> Result<WatchSummary> {
    let lock = DaemonLock::acquire(paths)?;
    ensure_dirs(paths)?;
    let filter = IntakeFilter::new(&paths.inbox_dir, cfg);
    let pipeline = Pipeline::new(paths.clone(), cfg);

    let (tx, rx) = mpsc::channel();
    let event_tx = tx.clone();
    let mut watcher = notify::recommended_watcher(move |res: notify::Result<notify::Event>| {
        match res {
            Ok(event) => map_event(event, &event_tx),
            Err(err) => warn!(error = %err, "filesystem watch error"),
        }
    })
    .context("failed to start filesystem watcher")?;
    let mode = if cfg.watcher.recursive {
        RecursiveMode::Recursive
    } else {
        RecursiveMode::NonRecursive
    };
    watcher
        .watch(filter.inbox(), mode)
        .with_context(|| format!("failed to watch {}", filter.inbox().display()))?;

    // Subscribe first, then scan, so nothing dropped during the scan is missed.
    let backlog = feed_backlog(&filter, &tx)?;
    drop(tx);
    info!(
        inbox = %filter.inbox().display(),
        lock = %lock.path().display(),
        backlog,
        workers = cfg.watcher.workers,
        "watching inbox"
    );

    let summary = run_loop(&pipeline, &filter, rx, cfg.watcher.workers);
    drop(watcher);
    Ok(summary)
}
