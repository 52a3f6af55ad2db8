use super::fields::is_recognized_key;
use regex::Regex;
use serde_json::{Map, Value};
use std::sync::OnceLock;

/// Attempts to open at most this many `{` positions when looking for a
/// trailing object, so pathological lines stay linear-ish.
const MAX_OBJECT_STARTS: usize = 16;

/// Minimum recovered pairs for a tolerant scan without recognized keys.
const MIN_TOLERANT_PAIRS: usize = 3;

/// How a text line was decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum LineShape {
    /// The whole trimmed line is a JSON object.
    Json(Map<String, Value>),
    /// The whole trimmed line is valid JSON, but not an object.
    JsonValue(Value),
    /// A JSON object trailing some non-JSON prefix.
    Trailing { prefix: String, object: Map<String, Value> },
    /// Key-value pairs recovered from malformed JSON.
    Tolerant(Map<String, Value>),
    /// Nothing structured could be recovered.
    Plain,
}

fn iso_timestamp_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"\d{4}-\d{2}-\d{2}[T ]\d{2}:\d{2}:\d{2}(?:[.,]\d+)?(?:Z|[+-]\d{2}:?\d{2})?",
        )
        .expect("timestamp pattern is valid")
    })
}

fn key_value_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r#""([A-Za-z0-9_@.\-]+)"\s*:\s*("(?:[^"\\]|\\.)*"|-?\d+(?:\.\d+)?(?:[eE][+-]?\d+)?|true|false|null)"#,
        )
        .expect("key-value pattern is valid")
    })
}

/// Classifies a line, trying strict JSON, a trailing object, then a tolerant
/// key-value scan.
pub fn decode_line(line: &str) -> LineShape {
    let trimmed = line.trim();

    match serde_json::from_str::<Value>(trimmed) {
        Ok(Value::Object(object)) => return LineShape::Json(object),
        Ok(value) => return LineShape::JsonValue(value),
        Err(_) => {}
    }

    if let Some((prefix, object)) = trailing_object(trimmed) {
        return LineShape::Trailing {
            prefix: prefix.to_string(),
            object,
        };
    }

    if let Some(object) = tolerant_scan(trimmed) {
        return LineShape::Tolerant(object);
    }

    LineShape::Plain
}

/// Finds the widest `{...}` span ending the line that parses as an object.
fn trailing_object(trimmed: &str) -> Option<(&str, Map<String, Value>)> {
    if !trimmed.ends_with('}') {
        return None;
    }

    trimmed
        .match_indices('{')
        .take(MAX_OBJECT_STARTS)
        .find_map(|(start, _)| match serde_json::from_str::<Value>(&trimmed[start..]) {
            Ok(Value::Object(object)) => Some((trimmed[..start].trim(), object)),
            _ => None,
        })
}

/// Recovers `"key": value` pairs from malformed or truncated JSON.
///
/// The result is accepted only when it looks like a log event: at least three
/// pairs, or at least one recognized field.
fn tolerant_scan(trimmed: &str) -> Option<Map<String, Value>> {
    let mut object = Map::new();

    for captures in key_value_regex().captures_iter(trimmed) {
        let key = captures[1].to_string();
        let literal = &captures[2];
        let value = serde_json::from_str::<Value>(literal).unwrap_or_else(|_| {
            Value::String(literal.trim_matches('"').to_string())
        });
        object.entry(key).or_insert(value);
    }

    let recognized = object.keys().any(|key| is_recognized_key(key));
    if object.len() >= MIN_TOLERANT_PAIRS || recognized {
        Some(object)
    } else {
        None
    }
}

/// Best-effort ISO-8601-like timestamp anywhere in the text.
pub fn extract_timestamp(text: &str) -> Option<String> {
    iso_timestamp_regex()
        .find(text)
        .map(|m| m.as_str().to_string())
}
