use crate::error::{IoContext, SortError};
use crate::sorter::categorize::ClassificationKey;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Destination {
    pub dir: PathBuf,
    pub filename: String,
    pub version: u64,
}

impl Destination {
    pub fn path(&self) -> PathBuf {
        self.dir.join(&self.filename)
    }
}

pub fn destination_dir(root: &Path, key: &ClassificationKey) -> PathBuf {
    root.join(&key.category).join(&key.sub_category)
}

pub fn versioned_filename(slug: &str, version: u64) -> String {
    format!("{slug}_v{version}.jsonl")
}

/// `Some(N)` when `name` is exactly `<slug>_v<N>.jsonl`.
pub fn parse_version(name: &str, slug: &str) -> Option<u64> {
    let digits = name
        .strip_prefix(slug)?
        .strip_prefix("_v")?
        .strip_suffix(".jsonl")?;
    if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    digits.parse::<u64>().ok()
}

/// Highest existing version for `slug` in `dir`, plus one.
pub fn next_version(dir: &Path, slug: &str) -> Result<u64, SortError> {
    let entries = fs::read_dir(dir).io_context(|| format!("failed to read {}", dir.display()))?;
    let mut max = 0u64;
    for entry in entries {
        let entry = entry.io_context(|| format!("failed to read {}", dir.display()))?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else {
            continue;
        };
        if let Some(n) = parse_version(name, slug) {
            max = max.max(n);
        }
    }
    max.checked_add(1).ok_or_else(|| {
        SortError::io(
            format!("no free version for {slug} in {}", dir.display()),
            std::io::Error::other("version number space exhausted"),
        )
    })
}

/// Create the destination directory if needed and pick the next free
/// versioned filename in it.
///
/// Not atomic on its own: callers hold the directory's lock from here until
/// the archive write lands.
pub fn resolve(root: &Path, key: &ClassificationKey, slug: &str) -> Result<Destination, SortError> {
    let dir = destination_dir(root, key);
    fs::create_dir_all(&dir).io_context(|| format!("failed to create {}", dir.display()))?;
    let version = next_version(&dir, slug)?;
    Ok(Destination {
        filename: versioned_filename(slug, version),
        dir,
        version,
    })
}
