use crate::error::{IoContext, SortError};
use crate::sorter::normalize::NormalizedBatch;
use crate::sorter::resolve::Destination;
use crate::sorter::util::{now_utc, sha256_hex};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

pub const MANIFEST_FILE: &str = "MANIFEST.jsonl";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub file: String,
    pub records: usize,
    pub moved_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ArchiveOutcome {
    pub entry: ManifestEntry,
    pub archive_path: PathBuf,
    pub manifest_path: PathBuf,
    pub source_removed: bool,
}

pub fn manifest_path(dir: &Path) -> PathBuf {
    dir.join(MANIFEST_FILE)
}

/// Write `content` to a hidden temp file in the destination directory, fsync
/// it, then link it into place. Fails instead of replacing an existing file.
fn write_atomic(dest: &Destination, content: &str) -> Result<PathBuf, SortError> {
    let final_path = dest.path();
    let mut tmp = tempfile::Builder::new()
        .prefix(".")
        .suffix(".tmp")
        .tempfile_in(&dest.dir)
        .io_context(|| format!("failed to stage temp file in {}", dest.dir.display()))?;
    let tmp_path = tmp.path().to_path_buf();
    tmp.as_file_mut()
        .write_all(content.as_bytes())
        .io_context(|| format!("failed to write {}", tmp_path.display()))?;
    tmp.as_file()
        .sync_all()
        .io_context(|| format!("failed to sync {}", tmp_path.display()))?;
    tmp.persist_noclobber(&final_path)
        .map_err(|err| SortError::io(format!("failed to move into {}", final_path.display()), err.error))?;
    Ok(final_path)
}

/// Make new directory entries durable before anything depends on them.
#[cfg(unix)]
fn sync_dir(dir: &Path) -> Result<(), SortError> {
    fs::File::open(dir)
        .and_then(|d| d.sync_all())
        .io_context(|| format!("failed to sync directory {}", dir.display()))
}

#[cfg(not(unix))]
fn sync_dir(_dir: &Path) -> Result<(), SortError> {
    Ok(())
}

/// Append one complete line and fsync before returning.
pub fn append_manifest(dir: &Path, entry: &ManifestEntry) -> Result<PathBuf, SortError> {
    let path = manifest_path(dir);
    let mut line = serde_json::to_string(entry)
        .map_err(|err| SortError::Internal(format!("failed to serialize manifest entry: {err}")))?;
    line.push('\n');

    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)
        .io_context(|| format!("failed to open {}", path.display()))?;
    file.write_all(line.as_bytes())
        .io_context(|| format!("failed to append {}", path.display()))?;
    file.sync_all()
        .io_context(|| format!("failed to sync {}", path.display()))?;
    Ok(path)
}

pub fn read_manifest(dir: &Path) -> Result<Vec<ManifestEntry>, SortError> {
    let path = manifest_path(dir);
    let raw = match fs::read_to_string(&path) {
        Ok(raw) => raw,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(SortError::io(format!("failed to read {}", path.display()), err)),
    };
    let mut out = Vec::new();
    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let entry: ManifestEntry = serde_json::from_str(trimmed).map_err(|err| {
            SortError::Parse(format!("failed to parse manifest line in {}: {err}", path.display()))
        })?;
        out.push(entry);
    }
    Ok(out)
}

/// Remove the inbox file only if it still holds the bytes that were archived.
/// Returns whether it was removed.
fn remove_source_if_unchanged(source: &Path, fingerprint: &str) -> Result<bool, SortError> {
    let current = match fs::read(source) {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == ErrorKind::NotFound => return Ok(false),
        Err(err) => {
            return Err(SortError::io(format!("failed to re-read {}", source.display()), err));
        }
    };
    if sha256_hex(&current) != fingerprint {
        return Ok(false);
    }
    fs::remove_file(source).io_context(|| format!("failed to remove {}", source.display()))?;
    Ok(true)
}

/// Commit a normalized batch to `dest` and record it in the directory manifest.
///
/// Caller holds the destination directory lock.
pub fn archive(
    batch: &NormalizedBatch,
    source: &Path,
    source_fingerprint: &str,
    dest: &Destination,
) -> Result<ArchiveOutcome, SortError> {
    let archive_path = write_atomic(dest, batch.serialized())?;

    let entry = ManifestEntry {
        file: dest.filename.clone(),
        records: batch.len(),
        moved_at: now_utc(),
    };
    let manifest_path = match append_manifest(&dest.dir, &entry) {
        Ok(path) => path,
        Err(err) => {
            // An archive file without a manifest line must not survive.
            if let Err(cleanup) = fs::remove_file(&archive_path) {
                warn!(
                    destination = %archive_path.display(),
                    error = %cleanup,
                    "failed to roll back archive after manifest failure"
                );
            }
            return Err(err);
        }
    };

    if let Err(err) = sync_dir(&dest.dir) {
        warn!(
            dir = %dest.dir.display(),
            error = %err,
            "archived but directory sync failed; source left in place"
        );
        info!(
            source = %source.display(),
            destination = %archive_path.display(),
            records = entry.records,
            "archived"
        );
        return Ok(ArchiveOutcome {
            entry,
            archive_path,
            manifest_path,
            source_removed: false,
        });
    }

    let source_removed = match remove_source_if_unchanged(source, source_fingerprint) {
        Ok(removed) => {
            if !removed {
                warn!(
                    source = %source.display(),
                    "source changed or vanished after snapshot; left in place"
                );
            }
            removed
        }
        Err(err) => {
            warn!(source = %source.display(), error = %err, "archived but could not remove source");
            false
        }
    };

    info!(
        source = %source.display(),
        destination = %archive_path.display(),
        records = entry.records,
        "archived"
    );

    Ok(ArchiveOutcome {
        entry,
        archive_path,
        manifest_path,
        source_removed,
    })
}
