use anyhow::Result;
use std::fs;
use std::path::Path;

use crate::commands::CommandReport;
use crate::sorter::config::load_config;
use crate::sorter::intake::InboxEvent;
use crate::sorter::paths::resolve_paths;
use crate::sorter::pipeline::{FileOutcome, Pipeline};
use crate::sorter::util::truncate_with_ellipsis;

const MAX_DETAIL_CHARS: usize = 240;

pub fn run(path: &Path) -> Result<CommandReport> {
    let mut report = CommandReport::new("ingest");
    let paths = resolve_paths()?;
    let cfg = load_config(&paths)?;
    let source = fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf());
    report.detail(format!("source={}", source.display()));

    let pipeline = Pipeline::new(paths, &cfg);
    match pipeline.handle(&InboxEvent::created(&source)) {
        FileOutcome::Archived(outcome) => {
            report.detail(format!("archived={}", outcome.archive_path.display()));
            report.detail(format!("records={}", outcome.entry.records));
            report.detail(format!("manifest={}", outcome.manifest_path.display()));
            if !outcome.source_removed {
                report.detail("source left in place (changed after read)");
            }
        }
        FileOutcome::Quarantined {
            kind,
            detail,
            moved_to,
        } => {
            report.issue(format!(
                "{}: {}",
                kind.as_str(),
                truncate_with_ellipsis(&detail, MAX_DETAIL_CHARS)
            ));
            match moved_to {
                Some(dest) => report.detail(format!("quarantined={}", dest.display())),
                None => report.issue("could not move source into the errors directory"),
            }
        }
        FileOutcome::Skipped { reason } => {
            report.issue(format!("skipped: {reason}"));
        }
    }
    Ok(report)
}
