//! Read-side view of archived JSONL for the (future) vector indexing phase.
//!
//! Nothing here generates vectors or talks to a search service; it pins down
//! which fields that phase extracts and how the embedding text is assembled.

use crate::sorter::normalize::Record;
use anyhow::{Context, Result};
use serde::Serialize;
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Paths feeding the embedding text, in order.
const EMBEDDING_FIELDS: &[&[&str]] = &[
    &["important", "title"],
    &["important", "category"],
    &["important", "sub_category"],
    &["important", "tags"],
    &["important", "targets", "os"],
    &["important", "targets", "system"],
    &["important", "risk"],
];

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScalarFields {
    pub id: String,
    pub title: String,
    pub category: String,
    pub sub_category: String,
    pub tags: String,
    pub os: String,
    pub system: String,
    pub risk: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreviewSample {
    pub scalars: ScalarFields,
    pub embedding_text: String,
}

#[derive(Debug, Clone, Serialize)]
pub struct PreviewReport {
    pub records: usize,
    pub skipped_lines: usize,
    pub samples: Vec<PreviewSample>,
}

fn get_in<'a>(record: &'a Record, path: &[&str]) -> Option<&'a Value> {
    let (first, rest) = path.split_first()?;
    let mut cur = record.get(*first)?;
    for key in rest {
        cur = cur.as_object()?.get(*key)?;
    }
    Some(cur)
}

fn scalar_text(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Lists become space-joined items (nulls dropped); absent values are empty.
fn to_text(value: Option<&Value>) -> String {
    match value {
        None => String::new(),
        Some(Value::Array(items)) => items
            .iter()
            .filter(|v| !v.is_null())
            .map(scalar_text)
            .collect::<Vec<_>>()
            .join(" "),
        Some(v) => scalar_text(v),
    }
}

fn field(record: &Record, path: &[&str]) -> String {
    to_text(get_in(record, path))
}

pub fn scalar_fields(record: &Record) -> ScalarFields {
    ScalarFields {
        id: field(record, &["id"]),
        title: field(record, &["important", "title"]),
        category: field(record, &["important", "category"]),
        sub_category: field(record, &["important", "sub_category"]),
        tags: field(record, &["important", "tags"]),
        os: field(record, &["important", "targets", "os"]),
        system: field(record, &["important", "targets", "system"]),
        risk: field(record, &["important", "risk"]),
    }
}

pub fn embedding_text(record: &Record) -> String {
    EMBEDDING_FIELDS
        .iter()
        .map(|path| field(record, path))
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Count records in an archived JSONL file and sample the first `limit`.
/// Unparseable or non-object lines are counted as skipped.
pub fn preview(path: &Path, limit: usize) -> Result<PreviewReport> {
    let raw =
        fs::read_to_string(path).with_context(|| format!("failed to read {}", path.display()))?;
    let mut out = PreviewReport {
        records: 0,
        skipped_lines: 0,
        samples: Vec::new(),
    };
    for line in raw.lines() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let Ok(Value::Object(record)) = serde_json::from_str::<Value>(trimmed) else {
            out.skipped_lines += 1;
            continue;
        };
        out.records += 1;
        if out.samples.len() < limit {
            out.samples.push(PreviewSample {
                scalars: scalar_fields(&record),
                embedding_text: embedding_text(&record),
            });
        }
    }
    Ok(out)
}
