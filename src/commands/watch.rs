use anyhow::Result;

use crate::commands::CommandReport;
use crate::sorter::config::load_config;
use crate::sorter::paths::resolve_paths;
use crate::sorter::watcher::{self, WatchSummary};

#[derive(Debug, Clone, Default)]
pub struct WatchOptions {
    pub once: bool,
}

fn summarize(report: &mut CommandReport, summary: &WatchSummary) {
    report.detail(format!("processed={}", summary.processed()));
    report.detail(format!("archived={}", summary.archived));
    report.detail(format!("quarantined={}", summary.quarantined));
    report.detail(format!("skipped={}", summary.skipped));
    report.detail(format!("coalesced={}", summary.coalesced));
    report.detail(format!("ignored={}", summary.ignored));
}

pub fn run(opts: &WatchOptions) -> Result<CommandReport> {
    let mut report = CommandReport::new("watch");
    let paths = resolve_paths()?;
    let cfg = load_config(&paths)?;

    report.detail(format!("inbox_dir={}", paths.inbox_dir.display()));
    report.detail(format!("archive_dir={}", paths.archive_dir.display()));
    report.detail(format!("workers={}", cfg.watcher.workers));

    // Quarantined files are handled outcomes, not command failures.
    let summary = if opts.once {
        watcher::run_once(&paths, &cfg)?
    } else {
        watcher::run_daemon(&paths, &cfg)?
    };
    summarize(&mut report, &summary);
    Ok(report)
}
