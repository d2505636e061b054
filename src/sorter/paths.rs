use anyhow::Result;
use std::env;
use std::path::PathBuf;

#[derive(Debug, Clone)]
pub struct SorterPaths {
    pub home: PathBuf,
    pub inbox_dir: PathBuf,
    pub archive_dir: PathBuf,
    pub errors_dir: PathBuf,
    pub logs_dir: PathBuf,
}

impl SorterPaths {
    /// Lay out every directory under a single root.
    pub fn under(home: impl Into<PathBuf>) -> Self {
        let home = home.into();
        Self {
            inbox_dir: home.join("inbox"),
            archive_dir: home.join("datasets"),
            errors_dir: home.join("processed").join("errors"),
            logs_dir: home.join("logs"),
            home,
        }
    }

    pub fn error_log_file(&self) -> PathBuf {
        self.logs_dir.join("errors.jsonl")
    }

    pub fn daemon_lock_file(&self) -> PathBuf {
        self.logs_dir.join("inbox-sorter.lock")
    }
}

fn required_home_dir() -> Result<PathBuf> {
    if let Some(home) = dirs::home_dir() {
        return Ok(home);
    }
    Err(anyhow::anyhow!("HOME directory could not be resolved"))
}

fn env_or_default_path(var: &str, fallback: PathBuf) -> PathBuf {
    match env::var(var) {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => fallback,
    }
}

pub fn resolve_paths() -> Result<SorterPaths> {
    let home = match env::var("SORTER_HOME") {
        Ok(v) if !v.trim().is_empty() => PathBuf::from(v.trim()),
        _ => required_home_dir()?.join("inbox-sorter"),
    };
    let defaults = SorterPaths::under(home);

    Ok(SorterPaths {
        inbox_dir: env_or_default_path("SORTER_INBOX_DIR", defaults.inbox_dir),
        archive_dir: env_or_default_path("SORTER_ARCHIVE_DIR", defaults.archive_dir),
        errors_dir: env_or_default_path("SORTER_ERRORS_DIR", defaults.errors_dir),
        logs_dir: env_or_default_path("SORTER_LOGS_DIR", defaults.logs_dir),
        home: defaults.home,
    })
}
