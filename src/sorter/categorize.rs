use crate::error::SortError;
use crate::sorter::normalize::{NormalizedBatch, Record};
use serde_json::Value;

const FALLBACK_SLUG: &str = "record";

/// `{category, sub_category}` as authored; selects the destination directory.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ClassificationKey {
    pub category: String,
    pub sub_category: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Classification {
    pub key: ClassificationKey,
    pub slug: String,
}

/// Lower-case, collapse every run of non `[a-z0-9]` to one `_`, trim `_`.
pub fn sanitize_slug(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    let mut prev_sep = false;
    for ch in input.chars() {
        if ch.is_ascii_alphanumeric() {
            out.push(ch.to_ascii_lowercase());
            prev_sep = false;
        } else if !prev_sep {
            out.push('_');
            prev_sep = true;
        }
    }
    out.trim_matches('_').to_string()
}

fn non_empty_str(value: Option<&Value>) -> Option<&str> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

fn require_segment<'a>(important: Option<&'a Value>, field: &str) -> Result<&'a str, SortError> {
    let value = non_empty_str(important.and_then(|imp| imp.get(field))).ok_or_else(|| {
        SortError::Schema(format!("missing or empty important.{field}"))
    })?;
    if value == "." || value == ".." || value.contains(['/', '\\', '\0']) {
        return Err(SortError::Schema(format!(
            "important.{field} {value:?} is not usable as a directory name"
        )));
    }
    Ok(value)
}

pub fn classify_record(record: &Record) -> Result<Classification, SortError> {
    let important = record.get("important").filter(|v| v.is_object());
    let category = require_segment(important, "category")?;
    let sub_category = require_segment(important, "sub_category")?;

    let title_slug = non_empty_str(important.and_then(|imp| imp.get("title")))
        .map(sanitize_slug)
        .filter(|s| !s.is_empty());
    let slug = title_slug
        .or_else(|| Some(sanitize_slug(&format!("{category}_{sub_category}"))))
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| FALLBACK_SLUG.to_string());

    Ok(Classification {
        key: ClassificationKey {
            category: category.to_string(),
            sub_category: sub_category.to_string(),
        },
        slug,
    })
}

/// Classify a batch by its first record only.
pub fn categorize(batch: &NormalizedBatch) -> Result<Classification, SortError> {
    classify_record(batch.first())
}
