use crate::error::{ErrorKind, SortError};
use crate::sorter::util::now_utc;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorLogEntry {
    pub at: DateTime<Utc>,
    pub source: String,
    pub kind: String,
    pub detail: String,
    pub quarantined_to: Option<String>,
}

impl ErrorLogEntry {
    pub fn new(source: &Path, err: &SortError, quarantined_to: Option<&Path>) -> Self {
        Self {
            at: now_utc(),
            source: source.display().to_string(),
            kind: err.kind().as_str().to_string(),
            detail: err.to_string(),
            quarantined_to: quarantined_to.map(|p| p.display().to_string()),
        }
    }

    pub fn is_kind(&self, kind: ErrorKind) -> bool {
        self.kind == kind.as_str()
    }
}

pub fn append_entry(log_file: &Path, entry: &ErrorLogEntry) -> Result<()> {
    if let Some(parent) = log_file.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    let line = format!("{}\n", serde_json::to_string(entry)?);
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_file)
        .with_context(|| format!("failed to open {}", log_file.display()))?;
    file.write_all(line.as_bytes())?;
    file.flush()?;
    Ok(())
}

pub fn read_entries(log_file: &Path) -> Result<Vec<ErrorLogEntry>> {
    if !log_file.exists() {
        return Ok(Vec::new());
    }
    let raw = fs::read_to_string(log_file)
        .with_context(|| format!("failed to read {}", log_file.display()))?;
    let mut out = Vec::new();
    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let entry: ErrorLogEntry = serde_json::from_str(trimmed)
            .with_context(|| format!("failed to parse error log line in {}", log_file.display()))?;
        out.push(entry);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn entries_append_in_order() {
        let tmp = tempdir().expect("tempdir");
        let log = tmp.path().join("logs/errors.jsonl");

        let parse = SortError::Parse("bad json".to_string());
        append_entry(&log, &ErrorLogEntry::new(Path::new("/in/a.json"), &parse, None))
            .expect("append parse");
        let schema = SortError::Schema("missing important.category".to_string());
        append_entry(
            &log,
            &ErrorLogEntry::new(
                Path::new("/in/b.json"),
                &schema,
                Some(Path::new("/err/b.json.failed")),
            ),
        )
        .expect("append schema");

        let entries = read_entries(&log).expect("read");
        assert_eq!(entries.len(), 2);
        assert!(entries[0].is_kind(ErrorKind::Parse));
        assert_eq!(entries[0].quarantined_to, None);
        assert!(entries[1].is_kind(ErrorKind::Schema));
        assert_eq!(entries[1].source, "/in/b.json");
        assert_eq!(entries[1].quarantined_to.as_deref(), Some("/err/b.json.failed"));
    }
}
