use crate::error::SortError;
use serde_json::{Map, Value};
use std::path::Path;

/// One JSON object from an input file. Fields are kept as authored.
pub type Record = Map<String, Value>;

/// The two recognized on-disk shapes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InputKind {
    /// `.json`: a single object or an array of objects.
    Document,
    /// `.jsonl`: one object per non-blank line.
    Lines,
}

impl InputKind {
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "json" => Some(Self::Document),
            "jsonl" => Some(Self::Lines),
            _ => None,
        }
    }
}

/// Ordered, non-empty records plus their line-delimited serialization.
#[derive(Debug, Clone)]
pub struct NormalizedBatch {
    records: Vec<Record>,
    serialized: String,
}

impl NormalizedBatch {
    fn new(records: Vec<Record>, serialized: String) -> Result<Self, SortError> {
        if records.is_empty() {
            return Err(SortError::Parse("input yielded no records".to_string()));
        }
        Ok(Self {
            records,
            serialized,
        })
    }

    #[cfg(test)]
    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn first(&self) -> &Record {
        // non-empty by construction
        &self.records[0]
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// One JSON object per line, each line terminated by `\n`.
    pub fn serialized(&self) -> &str {
        &self.serialized
    }
}

pub fn normalize(kind: InputKind, bytes: &[u8]) -> Result<NormalizedBatch, SortError> {
    let text = std::str::from_utf8(bytes)
        .map_err(|err| SortError::Parse(format!("input is not valid UTF-8: {err}")))?;
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    match kind {
        InputKind::Document => normalize_document(text),
        InputKind::Lines => normalize_lines(text),
    }
}

fn normalize_document(text: &str) -> Result<NormalizedBatch, SortError> {
    let value: Value = serde_json::from_str(text)
        .map_err(|err| SortError::Parse(format!("invalid JSON: {err}")))?;

    let records = match value {
        Value::Object(obj) => vec![obj],
        Value::Array(items) => {
            let mut out = Vec::with_capacity(items.len());
            for (idx, item) in items.into_iter().enumerate() {
                let Value::Object(obj) = item else {
                    return Err(SortError::Parse(format!(
                        "array element {idx} is not a JSON object"
                    )));
                };
                out.push(obj);
            }
            out
        }
        other => {
            return Err(SortError::Parse(format!(
                "top-level JSON must be an object or array, found {}",
                value_type_name(&other)
            )));
        }
    };

    let mut serialized = String::new();
    for record in &records {
        let line = serde_json::to_string(record)
            .map_err(|err| SortError::Internal(format!("failed to serialize record: {err}")))?;
        serialized.push_str(&line);
        serialized.push('\n');
    }

    NormalizedBatch::new(records, serialized)
}

fn normalize_lines(text: &str) -> Result<NormalizedBatch, SortError> {
    let mut records = Vec::new();
    let mut serialized = String::with_capacity(text.len());

    for (idx, line) in text.lines().enumerate() {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let value: Value = serde_json::from_str(trimmed)
            .map_err(|err| SortError::Parse(format!("invalid JSONL line {}: {err}", idx + 1)))?;
        let Value::Object(obj) = value else {
            return Err(SortError::Parse(format!(
                "JSONL line {} is not a JSON object",
                idx + 1
            )));
        };
        records.push(obj);
        serialized.push_str(trimmed);
        serialized.push('\n');
    }

    NormalizedBatch::new(records, serialized)
}

fn value_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}
