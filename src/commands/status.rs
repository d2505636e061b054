use anyhow::{Context, Result};
use std::env;
use std::fs;
use std::path::Path;

use crate::commands::CommandReport;
use crate::error::ErrorKind;
use crate::sorter::archive::{MANIFEST_FILE, read_manifest};
use crate::sorter::config::{config_path, load_config};
use crate::sorter::error_log::read_entries;
use crate::sorter::paths::resolve_paths;

include!(concat!(env!("OUT_DIR"), "/sorter_env_allowlist.rs"));

fn set_env_keys() -> Vec<&'static str> {
    GENERATED_SORTER_ENV_ALLOWLIST
        .iter()
        .copied()
        .filter(|key| env::var_os(key).is_some())
        .collect()
}

#[derive(Debug, Default, PartialEq, Eq)]
struct ArchiveTotals {
    directories: usize,
    files: usize,
    records: usize,
}

/// Sum every `<category>/<sub_category>/MANIFEST.jsonl` under the archive root.
fn archive_totals(archive_dir: &Path) -> Result<ArchiveTotals> {
    let mut totals = ArchiveTotals::default();
    if !archive_dir.is_dir() {
        return Ok(totals);
    }
    let categories = fs::read_dir(archive_dir)
        .with_context(|| format!("failed to read {}", archive_dir.display()))?;
    for category in categories {
        let category = category?.path();
        if !category.is_dir() {
            continue;
        }
        let subs = fs::read_dir(&category)
            .with_context(|| format!("failed to read {}", category.display()))?;
        for sub in subs {
            let sub = sub?.path();
            if !sub.join(MANIFEST_FILE).is_file() {
                continue;
            }
            let entries = read_manifest(&sub)?;
            totals.directories += 1;
            totals.files += entries.len();
            totals.records += entries.iter().map(|e| e.records).sum::<usize>();
        }
    }
    Ok(totals)
}

pub fn run() -> Result<CommandReport> {
    let mut report = CommandReport::new("status");
    let paths = resolve_paths()?;

    report.detail(format!("home={}", paths.home.display()));
    report.detail(format!("inbox_dir={}", paths.inbox_dir.display()));
    report.detail(format!("archive_dir={}", paths.archive_dir.display()));
    report.detail(format!("errors_dir={}", paths.errors_dir.display()));
    report.detail(format!("logs_dir={}", paths.logs_dir.display()));
    report.detail(format!("error_log={}", paths.error_log_file().display()));

    let cfg_path = config_path(&paths);
    report.detail(format!(
        "config_file={}{}",
        cfg_path.display(),
        if cfg_path.exists() { "" } else { " (absent, using defaults)" }
    ));
    match load_config(&paths) {
        Ok(cfg) => {
            report.detail(format!("watcher.workers={}", cfg.watcher.workers));
            report.detail(format!("watcher.settle_ms={}", cfg.watcher.settle_ms));
            report.detail(format!("watcher.recursive={}", cfg.watcher.recursive));
            report.detail(format!(
                "intake.ignore_suffixes={}",
                cfg.intake.ignore_suffixes.join(",")
            ));
            report.detail(format!(
                "intake.exclude_names={}",
                cfg.intake.exclude_names.join(",")
            ));
        }
        Err(err) => report.issue(format!("invalid config: {err:#}")),
    }

    match archive_totals(&paths.archive_dir) {
        Ok(t) => report.detail(format!(
            "archive: directories={} files={} records={}",
            t.directories, t.files, t.records
        )),
        Err(err) => report.issue(format!("unreadable archive: {err:#}")),
    }

    match read_entries(&paths.error_log_file()) {
        Ok(entries) => {
            let count = |kind: ErrorKind| entries.iter().filter(|e| e.is_kind(kind)).count();
            report.detail(format!(
                "errors: total={} parse={} schema={} io={} internal={}",
                entries.len(),
                count(ErrorKind::Parse),
                count(ErrorKind::Schema),
                count(ErrorKind::Io),
                count(ErrorKind::Internal)
            ));
        }
        Err(err) => report.issue(format!("unreadable error log: {err:#}")),
    }

    let keys = set_env_keys();
    if !keys.is_empty() {
        report.detail(format!("env_overrides={}", keys.join(",")));
    }

    if !paths.inbox_dir.exists() {
        report.issue(format!("missing inbox dir ({})", paths.inbox_dir.display()));
    }
    if !paths.archive_dir.exists() {
        report.issue(format!("missing archive dir ({})", paths.archive_dir.display()));
    }
    if !paths.errors_dir.exists() {
        report.issue(format!("missing errors dir ({})", paths.errors_dir.display()));
    }

    Ok(report)
}
