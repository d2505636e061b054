use anyhow::Result;
use std::path::Path;

use crate::commands::CommandReport;
use crate::sorter::handoff;
use crate::sorter::util::truncate_with_ellipsis;

const MAX_TEXT_CHARS: usize = 200;

pub fn run(path: &Path, limit: usize) -> Result<CommandReport> {
    let mut report = CommandReport::new("preview");
    let preview = handoff::preview(path, limit)?;

    report.detail(format!("file={}", path.display()));
    report.detail(format!("records={}", preview.records));
    if preview.skipped_lines > 0 {
        report.detail(format!("skipped_lines={}", preview.skipped_lines));
    }
    if preview.records == 0 {
        report.issue("no records found");
    }
    for (i, sample) in preview.samples.iter().enumerate() {
        let s = &sample.scalars;
        report.detail(format!(
            "sample[{i}] id={} category={} sub_category={} risk={}",
            s.id, s.category, s.sub_category, s.risk
        ));
        report.detail(format!(
            "sample[{i}] text={}",
            truncate_with_ellipsis(&sample.embedding_text, MAX_TEXT_CHARS)
        ));
    }
    Ok(report)
}
