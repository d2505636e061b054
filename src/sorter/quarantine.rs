use crate::error::SortError;
use crate::sorter::error_log::{self, ErrorLogEntry};
use anyhow::{Context, Result};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::{error, warn};

const FAILED_SUFFIX: &str = "failed";
const MAX_CLAIM_ATTEMPTS: u64 = 100_000;

/// `<name>.failed` for the first failure, `<name>.<N>.failed` after that.
pub fn quarantine_name(original: &str, attempt: u64) -> String {
    if attempt <= 1 {
        format!("{original}.{FAILED_SUFFIX}")
    } else {
        format!("{original}.{attempt}.{FAILED_SUFFIX}")
    }
}

/// Claim the first free quarantine name by creating it exclusively.
fn claim_slot(errors_dir: &Path, original: &str) -> Result<PathBuf> {
    for attempt in 1..=MAX_CLAIM_ATTEMPTS {
        let candidate = errors_dir.join(quarantine_name(original, attempt));
        match fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&candidate)
        {
            Ok(_) => return Ok(candidate),
            Err(err) if err.kind() == ErrorKind::AlreadyExists => continue,
            Err(err) => {
                return Err(err)
                    .with_context(|| format!("failed to claim {}", candidate.display()));
            }
        }
    }
    anyhow::bail!("no free quarantine slot for {original} in {}", errors_dir.display())
}

fn move_file(from: &Path, to: &Path) -> Result<()> {
    match fs::rename(from, to) {
        Ok(_) => Ok(()),
        Err(rename_err) => {
            if matches!(
                rename_err.kind(),
                ErrorKind::CrossesDevices | ErrorKind::PermissionDenied
            ) {
                fs::copy(from, to).with_context(|| {
                    format!("failed to copy {} to {}", from.display(), to.display())
                })?;
                fs::remove_file(from)
                    .with_context(|| format!("failed to remove {}", from.display()))?;
                Ok(())
            } else {
                Err(rename_err).with_context(|| {
                    format!("failed to move {} to {}", from.display(), to.display())
                })
            }
        }
    }
}

fn relocate(source: &Path, errors_dir: &Path) -> Result<PathBuf> {
    fs::create_dir_all(errors_dir)
        .with_context(|| format!("failed to create {}", errors_dir.display()))?;
    let original = source
        .file_name()
        .and_then(|s| s.to_str())
        .filter(|s| !s.is_empty())
        .unwrap_or("input");
    let slot = claim_slot(errors_dir, original)?;
    if let Err(err) = move_file(source, &slot) {
        let _ = fs::remove_file(&slot);
        return Err(err);
    }
    Ok(slot)
}

/// Terminal step for a failed file. Never fails: secondary errors are logged
/// and swallowed. Returns where the original ended up, if it was moved.
pub fn quarantine(
    source: &Path,
    err: &SortError,
    errors_dir: &Path,
    error_log_file: &Path,
) -> Option<PathBuf> {
    warn!(
        source = %source.display(),
        kind = err.kind().as_str(),
        detail = %err,
        "quarantining input"
    );

    let moved_to = match relocate(source, errors_dir) {
        Ok(path) => Some(path),
        Err(move_err) => {
            error!(
                source = %source.display(),
                error = %format!("{move_err:#}"),
                "failed to move input into quarantine"
            );
            None
        }
    };

    let entry = ErrorLogEntry::new(source, err, moved_to.as_deref());
    if let Err(log_err) = error_log::append_entry(error_log_file, &entry) {
        error!(
            source = %source.display(),
            error = %format!("{log_err:#}"),
            "failed to write error log entry"
        );
    }

    moved_to
}
