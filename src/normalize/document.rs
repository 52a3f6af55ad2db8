use super::{normalize_line, normalize_value};
use crate::record::CanonicalRecord;
use serde_json::Value;

/// Records normalized between scheduler yields in [`normalize_body`].
pub const YIELD_EVERY: usize = 500;

/// Normalizes a whole document.
///
/// A JSON array maps each element through the single-object path, a single
/// JSON object yields one record, and anything else is treated as
/// newline-delimited records.
pub fn normalize_json_document(text: &str, source: &str) -> Vec<CanonicalRecord> {
    match parse_document(text) {
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| normalize_value(item, "", source))
            .collect(),
        Some(value @ Value::Object(_)) => vec![normalize_value(&value, "", source)],
        _ => normalize_lines(text, source),
    }
}

/// Normalizes newline-delimited text, one record per non-blank line.
pub fn normalize_lines(text: &str, source: &str) -> Vec<CanonicalRecord> {
    split_lines(text)
        .map(|line| normalize_line(line, source))
        .collect()
}

/// Sniffs the body: a `[` or `{` prefix takes the document path, anything
/// else the line-oriented path.
pub fn normalize_text(text: &str, source: &str) -> Vec<CanonicalRecord> {
    if looks_like_document(text) {
        normalize_json_document(text, source)
    } else {
        normalize_lines(text, source)
    }
}

/// Async variant of [`normalize_text`] that yields to the scheduler every
/// [`YIELD_EVERY`] records so large bodies do not monopolize a worker.
pub async fn normalize_body(text: &str, source: &str) -> Vec<CanonicalRecord> {
    let mut records = Vec::new();

    if looks_like_document(text) {
        match parse_document(text) {
            Some(Value::Array(items)) => {
                for chunk in items.chunks(YIELD_EVERY) {
                    records.extend(chunk.iter().map(|item| normalize_value(item, "", source)));
                    tokio::task::yield_now().await;
                }
                return records;
            }
            Some(value @ Value::Object(_)) => return vec![normalize_value(&value, "", source)],
            _ => {}
        }
    }

    let mut lines = split_lines(text).peekable();
    while lines.peek().is_some() {
        records.extend(
            lines
                .by_ref()
                .take(YIELD_EVERY)
                .map(|line| normalize_line(line, source)),
        );
        tokio::task::yield_now().await;
    }
    records
}

fn looks_like_document(text: &str) -> bool {
    let trimmed = text.trim_start();
    trimmed.starts_with('[') || trimmed.starts_with('{')
}

fn parse_document(text: &str) -> Option<Value> {
    serde_json::from_str::<Value>(text.trim()).ok()
}

fn split_lines(text: &str) -> impl Iterator<Item = &str> {
    text.split('\n')
        .map(|line| line.strip_suffix('\r').unwrap_or(line))
        .filter(|line| !line.trim().is_empty())
}
