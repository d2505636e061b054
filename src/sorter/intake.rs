use crate::sorter::config::SorterConfig;
use crate::sorter::normalize::InputKind;
use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::thread;
use std::time::Duration;

const MAX_SETTLE_ROUNDS: u32 = 20;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Created,
    Modified,
}

impl EventKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Modified => "modified",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboxEvent {
    pub path: PathBuf,
    pub kind: EventKind,
}

impl InboxEvent {
    pub fn created(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: EventKind::Created,
        }
    }

    pub fn modified(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            kind: EventKind::Modified,
        }
    }
}

/// Decides which inbox paths are worth a trip through the pipeline.
#[derive(Debug, Clone)]
pub struct IntakeFilter {
    inbox: PathBuf,
    recursive: bool,
    ignore_suffixes: Vec<String>,
    exclude_names: Vec<String>,
}

impl IntakeFilter {
    pub fn new(inbox: &Path, cfg: &SorterConfig) -> Self {
        let inbox = fs::canonicalize(inbox).unwrap_or_else(|_| inbox.to_path_buf());
        Self {
            inbox,
            recursive: cfg.watcher.recursive,
            ignore_suffixes: cfg.intake.ignore_suffixes.clone(),
            exclude_names: cfg.intake.exclude_names.clone(),
        }
    }

    pub fn inbox(&self) -> &Path {
        &self.inbox
    }

    pub fn recursive(&self) -> bool {
        self.recursive
    }

    pub fn accepts_path(&self, path: &Path) -> bool {
        let Ok(relative) = path.strip_prefix(&self.inbox) else {
            return false;
        };
        if !self.recursive && relative.components().count() != 1 {
            return false;
        }
        let Some(name) = path.file_name().and_then(|s| s.to_str()) else {
            return false;
        };
        if name.starts_with('.') {
            return false;
        }
        if self.exclude_names.iter().any(|n| n == name) {
            return false;
        }
        if self.ignore_suffixes.iter().any(|s| name.ends_with(s.as_str())) {
            return false;
        }
        InputKind::from_path(path).is_some()
    }

    pub fn accepts(&self, event: &InboxEvent) -> bool {
        self.accepts_path(&event.path)
    }
}

fn collect_files(root: &Path, recursive: bool, out: &mut Vec<PathBuf>) -> Result<()> {
    let entries =
        fs::read_dir(root).with_context(|| format!("failed to read {}", root.display()))?;
    for entry in entries {
        let entry = entry?;
        let path = entry.path();
        if path.is_file() {
            out.push(path);
            continue;
        }
        if recursive && path.is_dir() {
            collect_files(&path, recursive, out)?;
        }
    }
    Ok(())
}

/// Qualifying files already sitting in the inbox, in path order.
pub fn scan_inbox(filter: &IntakeFilter) -> Result<Vec<PathBuf>> {
    let inbox = filter.inbox();
    if !inbox.exists() {
        fs::create_dir_all(inbox)
            .with_context(|| format!("failed to create inbox dir {}", inbox.display()))?;
    }
    let mut files = Vec::new();
    collect_files(inbox, filter.recursive(), &mut files)?;
    files.retain(|p| filter.accepts_path(p));
    files.sort();
    Ok(files)
}

/// Block until the file size holds steady across one `settle` interval.
///
/// Gives up waiting after a bounded number of rounds and lets the read go
/// ahead; a still-growing file then fails parsing and is quarantined.
pub fn wait_until_settled(path: &Path, settle: Duration) -> std::io::Result<()> {
    if settle.is_zero() {
        return Ok(());
    }
    let mut last = fs::metadata(path)?.len();
    for _ in 0..MAX_SETTLE_ROUNDS {
        thread::sleep(settle);
        let now = fs::metadata(path)?.len();
        if now == last {
            return Ok(());
        }
        last = now;
    }
    Ok(())
}
