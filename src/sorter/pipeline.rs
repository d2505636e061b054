use crate::error::{ErrorKind, IoContext, SortError};
use crate::sorter::archive::{ArchiveOutcome, archive};
use crate::sorter::categorize::{Classification, categorize};
use crate::sorter::config::SorterConfig;
use crate::sorter::intake::{EventKind, InboxEvent, wait_until_settled};
use crate::sorter::locks::DirLocks;
use crate::sorter::normalize::{InputKind, normalize};
use crate::sorter::paths::SorterPaths;
use crate::sorter::quarantine::quarantine;
use crate::sorter::resolve::{destination_dir, resolve};
use crate::sorter::util::sha256_hex;
use std::any::Any;
use std::fs;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

/// One file's bytes, read once at processing time.
#[derive(Debug, Clone)]
pub struct RawInput {
    pub path: PathBuf,
    pub kind: InputKind,
    pub event: EventKind,
    pub bytes: Vec<u8>,
    pub fingerprint: String,
}

#[derive(Debug, Clone)]
pub enum FileOutcome {
    Archived(ArchiveOutcome),
    Quarantined {
        kind: ErrorKind,
        detail: String,
        moved_to: Option<PathBuf>,
    },
    Skipped {
        reason: &'static str,
    },
}

impl FileOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            Self::Archived(_) => "archived",
            Self::Quarantined { .. } => "quarantined",
            Self::Skipped { .. } => "skipped",
        }
    }
}

/// Shared state for processing inbox files: where things go, and the
/// per-directory locks that keep version numbers unique.
#[derive(Debug)]
pub struct Pipeline {
    paths: SorterPaths,
    settle: Duration,
    locks: DirLocks,
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        return (*s).to_string();
    }
    if let Some(s) = payload.downcast_ref::<String>() {
        return s.clone();
    }
    "panic with non-string payload".to_string()
}

impl Pipeline {
    pub fn new(paths: SorterPaths, cfg: &SorterConfig) -> Self {
        Self {
            paths,
            settle: Duration::from_millis(cfg.watcher.settle_ms),
            locks: DirLocks::new(),
        }
    }

    #[cfg(test)]
    pub fn paths(&self) -> &SorterPaths {
        &self.paths
    }

    pub fn read_input(&self, event: &InboxEvent) -> Result<RawInput, SortError> {
        let path = &event.path;
        let kind = InputKind::from_path(path).ok_or_else(|| {
            SortError::Parse(format!(
                "unrecognized extension for {} (expected .json or .jsonl)",
                path.display()
            ))
        })?;
        wait_until_settled(path, self.settle)
            .io_context(|| format!("failed to stat {}", path.display()))?;
        let bytes = fs::read(path).io_context(|| format!("failed to read {}", path.display()))?;
        Ok(RawInput {
            path: path.clone(),
            kind,
            event: event.kind,
            fingerprint: sha256_hex(&bytes),
            bytes,
        })
    }

    /// normalize → categorize → (locked) resolve → archive.
    pub fn process(&self, input: &RawInput) -> Result<ArchiveOutcome, SortError> {
        let batch = normalize(input.kind, &input.bytes)?;
        let Classification { key, slug } = categorize(&batch)?;
        let dir = destination_dir(&self.paths.archive_dir, &key);

        self.locks.with_dir(&dir, || {
            let dest = resolve(&self.paths.archive_dir, &key, &slug)?;
            debug!(dir = %dest.dir.display(), slug = %slug, version = dest.version, "resolved destination");
            archive(&batch, &input.path, &input.fingerprint, &dest)
        })
    }

    fn fail(&self, source: &Path, err: SortError) -> FileOutcome {
        let moved_to = quarantine(
            source,
            &err,
            &self.paths.errors_dir,
            &self.paths.error_log_file(),
        );
        FileOutcome::Quarantined {
            kind: err.kind(),
            detail: err.to_string(),
            moved_to,
        }
    }

    /// Take one event to a terminal outcome. Nothing escapes this call:
    /// errors and panics alike end in quarantine.
    pub fn handle(&self, event: &InboxEvent) -> FileOutcome {
        let result = catch_unwind(AssertUnwindSafe(|| {
            let input = match self.read_input(event) {
                Ok(input) => input,
                Err(err) if err.is_not_found() => return Ok(None),
                Err(err) => return Err(err),
            };
            debug!(
                source = %input.path.display(),
                event = input.event.as_str(),
                bytes = input.bytes.len(),
                "processing"
            );
            self.process(&input).map(Some)
        }));

        match result {
            Ok(Ok(Some(outcome))) => FileOutcome::Archived(outcome),
            Ok(Ok(None)) => {
                debug!(source = %event.path.display(), "source vanished before read");
                FileOutcome::Skipped {
                    reason: "source-missing",
                }
            }
            Ok(Err(err)) => self.fail(&event.path, err),
            Err(payload) => {
                let err = SortError::Internal(panic_message(payload.as_ref()));
                self.fail(&event.path, err)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sorter::archive::read_manifest;
    use crate::sorter::error_log;
    use tempfile::tempdir;

    const DROP: &str = r#"[{"important":{"category":"SQL Injection","sub_category":"Authentication Bypass","title":"SQL injection login bypass","tags":["database","login","auth","sql"],"targets":{"os":["Any","Windows","Linux"],"system":["Web App","MySQL","MSSQL"]},"risk":"medium"}}]"#;

    fn pipeline(root: &Path) -> Pipeline {
        let paths = SorterPaths::under(root);
        fs::create_dir_all(&paths.inbox_dir).expect("mkdir inbox");
        let mut cfg = SorterConfig::default();
        cfg.watcher.settle_ms = 0;
        Pipeline::new(paths, &cfg)
    }

    #[test]
    fn end_to_end_drop_is_archived() {
        let tmp = tempdir().expect("tempdir");
        let pipeline = pipeline(tmp.path());
        let source = pipeline.paths().inbox_dir.join("drop.json");
        fs::write(&source, DROP).expect("write drop");

        let outcome = pipeline.handle(&InboxEvent::created(&source));
        let archived = match outcome {
            FileOutcome::Archived(archived) => archived,
            other => panic!("expected archive, got {other:?}"),
        };

        let dir = pipeline
            .paths()
            .archive_dir
            .join("SQL Injection")
            .join("Authentication Bypass");
        assert_eq!(archived.archive_path, dir.join("sql_injection_login_bypass_v1.jsonl"));
        assert!(!source.exists());

        let written = fs::read_to_string(&archived.archive_path).expect("read archive");
        let lines = written.lines().collect::<Vec<_>>();
        assert_eq!(lines.len(), 1);
        let line: serde_json::Value = serde_json::from_str(lines[0]).expect("line json");
        let input: serde_json::Value = serde_json::from_str(DROP).expect("drop json");
        assert_eq!(line, input[0]);

        let manifest = read_manifest(&dir).expect("manifest");
        assert_eq!(manifest.len(), 1);
        assert_eq!(manifest[0].records, 1);
        assert_eq!(manifest[0].file, "sql_injection_login_bypass_v1.jsonl");
    }

    #[test]
    fn schema_failure_quarantines_without_creating_archive_dirs() {
        let tmp = tempdir().expect("tempdir");
        let pipeline = pipeline(tmp.path());
        let source = pipeline.paths().inbox_dir.join("nocat.json");
        let body = r#"{"important":{"sub_category":"Stored","title":"x"}}"#;
        fs::write(&source, body).expect("write");

        let outcome = pipeline.handle(&InboxEvent::created(&source));
        let (kind, moved_to) = match outcome {
            FileOutcome::Quarantined { kind, moved_to, .. } => (kind, moved_to),
            other => panic!("expected quarantine, got {other:?}"),
        };
        assert_eq!(kind, ErrorKind::Schema);
        let moved_to = moved_to.expect("moved");
        assert_eq!(moved_to, pipeline.paths().errors_dir.join("nocat.json.failed"));
        assert_eq!(fs::read_to_string(&moved_to).expect("read"), body);
        assert!(!source.exists());
        assert!(!pipeline.paths().archive_dir.exists());

        let entries =
            error_log::read_entries(&pipeline.paths().error_log_file()).expect("error log");
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_kind(ErrorKind::Schema));
    }

    #[test]
    fn manifest_write_failure_quarantines_and_leaves_no_archive() {
        let tmp = tempdir().expect("tempdir");
        let pipeline = pipeline(tmp.path());
        let dir = pipeline.paths().archive_dir.join("XSS").join("Stored");
        fs::create_dir_all(dir.join("MANIFEST.jsonl")).expect("block manifest path");
        let source = pipeline.paths().inbox_dir.join("d.json");
        let body = r#"{"important":{"category":"XSS","sub_category":"Stored","title":"t"}}"#;
        fs::write(&source, body).expect("write");

        let outcome = pipeline.handle(&InboxEvent::created(&source));
        let (kind, moved_to) = match outcome {
            FileOutcome::Quarantined { kind, moved_to, .. } => (kind, moved_to),
            other => panic!("expected quarantine, got {other:?}"),
        };
        assert_eq!(kind, ErrorKind::Io);
        assert!(!dir.join("t_v1.jsonl").exists());
        let leftovers = fs::read_dir(&dir)
            .expect("read dir")
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name() != "MANIFEST.jsonl")
            .count();
        assert_eq!(leftovers, 0);
        assert_eq!(fs::read_to_string(moved_to.expect("moved")).expect("read"), body);

        let entries =
            error_log::read_entries(&pipeline.paths().error_log_file()).expect("error log");
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_kind(ErrorKind::Io));
    }

    #[test]
    fn parse_failure_quarantines_original_bytes() {
        let tmp = tempdir().expect("tempdir");
        let pipeline = pipeline(tmp.path());
        let source = pipeline.paths().inbox_dir.join("bad.jsonl");
        let body = "{\"important\":{}}\nnot json\n";
        fs::write(&source, body).expect("write");

        let outcome = pipeline.handle(&InboxEvent::modified(&source));
        let (kind, moved_to) = match outcome {
            FileOutcome::Quarantined { kind, moved_to, .. } => (kind, moved_to),
            other => panic!("expected quarantine, got {other:?}"),
        };
        assert_eq!(kind, ErrorKind::Parse);
        assert_eq!(fs::read_to_string(moved_to.expect("moved")).expect("read"), body);
    }

    #[test]
    fn missing_source_is_skipped_not_quarantined() {
        let tmp = tempdir().expect("tempdir");
        let pipeline = pipeline(tmp.path());
        let source = pipeline.paths().inbox_dir.join("gone.json");

        let outcome = pipeline.handle(&InboxEvent::created(&source));
        assert_eq!(outcome.label(), "skipped");
        assert!(!pipeline.paths().errors_dir.exists());
    }

    #[test]
    fn repeated_drops_get_increasing_versions() {
        let tmp = tempdir().expect("tempdir");
        let pipeline = pipeline(tmp.path());
        let source = pipeline.paths().inbox_dir.join("drop.json");

        for expected in 1..=3 {
            fs::write(&source, DROP).expect("write drop");
            let outcome = pipeline.handle(&InboxEvent::created(&source));
            let archived = match outcome {
                FileOutcome::Archived(archived) => archived,
                other => panic!("expected archive, got {other:?}"),
            };
            assert_eq!(
                archived.entry.file,
                format!("sql_injection_login_bypass_v{expected}.jsonl")
            );
        }
    }

    #[test]
    fn concurrent_drops_into_one_directory_get_distinct_versions() {
        const N: usize = 16;
        let tmp = tempdir().expect("tempdir");
        let pipeline = pipeline(tmp.path());
        let sources = (0..N)
            .map(|i| {
                let path = pipeline.paths().inbox_dir.join(format!("drop-{i}.json"));
                fs::write(&path, DROP).expect("write drop");
                path
            })
            .collect::<Vec<_>>();

        let outcomes = std::thread::scope(|scope| {
            let handles = sources
                .iter()
                .map(|source| {
                    let pipeline = &pipeline;
                    scope.spawn(move || pipeline.handle(&InboxEvent::created(source)))
                })
                .collect::<Vec<_>>();
            handles
                .into_iter()
                .map(|h| h.join().expect("worker thread"))
                .collect::<Vec<_>>()
        });

        let mut files = outcomes
            .iter()
            .map(|o| match o {
                FileOutcome::Archived(a) => a.entry.file.clone(),
                other => panic!("expected archive, got {other:?}"),
            })
            .collect::<Vec<_>>();
        files.sort();
        let mut expected = (1..=N)
            .map(|n| format!("sql_injection_login_bypass_v{n}.jsonl"))
            .collect::<Vec<_>>();
        expected.sort();
        assert_eq!(files, expected);

        let dir = pipeline
            .paths()
            .archive_dir
            .join("SQL Injection/Authentication Bypass");
        let manifest = read_manifest(&dir).expect("manifest");
        assert_eq!(manifest.len(), N);
        let mut manifest_files = manifest.into_iter().map(|e| e.file).collect::<Vec<_>>();
        manifest_files.sort();
        assert_eq!(manifest_files, expected);
    }

    #[test]
    fn panics_are_caught_and_reported_as_internal() {
        let payload: Box<dyn Any + Send> = Box::new("boom");
        assert_eq!(panic_message(payload.as_ref()), "boom");
        let payload: Box<dyn Any + Send> = Box::new(String::from("owned boom"));
        assert_eq!(panic_message(payload.as_ref()), "owned boom");
        let payload: Box<dyn Any + Send> = Box::new(7u8);
        assert_eq!(panic_message(payload.as_ref()), "panic with non-string payload");
    }
}
