//! Conversion of arbitrary log input into [`CanonicalRecord`]s.
//!
//! Everything here is pure: no I/O, no shared state. Malformed input never
//! fails; it degrades to a plain-text record carrying the original line.

pub mod archive;
pub mod document;
pub mod fields;
pub mod stack;
pub mod text;

pub use archive::{is_log_entry, normalize_archive};
pub use document::{
    normalize_body, normalize_json_document, normalize_lines, normalize_text, YIELD_EVERY,
};
pub use stack::normalize_stack;

use crate::record::CanonicalRecord;
use fields::{
    diagnostic_context, pick, pick_message, LEVEL_ALIASES, LOGGER_ALIASES, THREAD_ALIASES,
    TIMESTAMP_ALIASES, TRACE_ID_ALIASES,
};
use serde_json::{Map, Value};
use text::{decode_line, extract_timestamp, LineShape};

/// Input accepted by [`normalize`].
#[derive(Debug, Clone, Copy)]
pub enum RawInput<'a> {
    /// An already-decoded structure, e.g. a search hit's `_source`.
    Value(&'a Value),
    /// One line of text, without its line terminator.
    Line(&'a str),
}

/// Normalizes one object or line into a canonical record.
///
/// `fallback_message` becomes the message when the input carries none; when
/// empty, the input's own text is used instead.
pub fn normalize(input: RawInput<'_>, fallback_message: &str, source: &str) -> CanonicalRecord {
    match input {
        RawInput::Value(value) => normalize_value(value, fallback_message, source),
        RawInput::Line(line) => line_record(line, fallback_message, source),
    }
}

/// Normalizes one line of text.
pub fn normalize_line(line: &str, source: &str) -> CanonicalRecord {
    line_record(line, "", source)
}

/// Normalizes an already-decoded value.
pub fn normalize_value(value: &Value, fallback_message: &str, source: &str) -> CanonicalRecord {
    match value {
        Value::Object(object) => {
            let fallback = if fallback_message.is_empty() {
                value.to_string()
            } else {
                fallback_message.to_string()
            };
            from_object(object, value.clone(), &fallback, source)
        }
        Value::String(line) => line_record(line, fallback_message, source),
        other => {
            let mut record = CanonicalRecord::bare(other.to_string(), source);
            record.raw = other.clone();
            record
        }
    }
}

fn line_record(line: &str, fallback_message: &str, source: &str) -> CanonicalRecord {
    let trimmed = line.trim();
    let fallback = if fallback_message.is_empty() {
        trimmed
    } else {
        fallback_message
    };

    match decode_line(line) {
        LineShape::Json(object) | LineShape::Tolerant(object) => {
            let raw = Value::Object(object.clone());
            from_object(&object, raw, fallback, source)
        }
        LineShape::Trailing { prefix, object } => {
            let fallback = if prefix.is_empty() { fallback } else { prefix.as_str() };
            let mut record = from_object(&object, Value::Object(object.clone()), fallback, source);
            if record.timestamp.is_none() {
                record.timestamp = extract_timestamp(&prefix);
            }
            record
        }
        LineShape::JsonValue(value) => {
            let mut record = CanonicalRecord::bare(line, source);
            record.timestamp = extract_timestamp(line);
            record.raw = value;
            record
        }
        LineShape::Plain => {
            let mut record = CanonicalRecord::bare(line, source);
            record.timestamp = extract_timestamp(line);
            record.raw = Value::String(line.to_string());
            record
        }
    }
}

fn from_object(
    object: &Map<String, Value>,
    raw: Value,
    fallback_message: &str,
    source: &str,
) -> CanonicalRecord {
    CanonicalRecord {
        timestamp: pick(object, TIMESTAMP_ALIASES),
        level: pick(object, LEVEL_ALIASES),
        logger: pick(object, LOGGER_ALIASES),
        thread: pick(object, THREAD_ALIASES),
        message: pick_message(object).unwrap_or_else(|| fallback_message.to_string()),
        trace_id: pick(object, TRACE_ID_ALIASES),
        stack_trace: normalize_stack(object),
        source: source.to_string(),
        raw,
        truncated: false,
        mdc: diagnostic_context(object),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_line_scenario() {
        let record = normalize_line(
            r#"{"level":"ERROR","message":"boom","@timestamp":"2024-01-01T00:00:00Z"}"#,
            "tcp://127.0.0.1:5000",
        );
        assert_eq!(record.level.as_deref(), Some("ERROR"));
        assert_eq!(record.message, "boom");
        assert_eq!(record.timestamp.as_deref(), Some("2024-01-01T00:00:00Z"));
        assert_eq!(record.source, "tcp://127.0.0.1:5000");
    }

    #[test]
    fn test_plain_line_scenario() {
        let line = "2024-01-01T00:00:00Z something bad happened";
        let record = normalize_line(line, "src");
        assert_eq!(record.timestamp.as_deref(), Some("2024-01-01T00:00:00Z"));
        assert_eq!(record.message, line);
        assert_eq!(record.raw, Value::String(line.to_string()));
    }

    #[test]
    fn test_plain_line_message_is_verbatim() {
        for line in ["  indented text", "tabs\tand spaces ", "no json [here]", "42"] {
            assert_eq!(normalize_line(line, "s").message, line);
        }
    }

    #[test]
    fn test_raw_round_trips_json_line() {
        let line = r#"{"z":1,"a":{"b":[1,2,"x"]},"message":"m","level":"INFO"}"#;
        let record = normalize_line(line, "s");
        let reserialized = serde_json::to_string(&record.raw).unwrap();
        let original: Value = serde_json::from_str(line).unwrap();
        assert_eq!(serde_json::from_str::<Value>(&reserialized).unwrap(), original);
        assert_eq!(reserialized, line);
    }

    #[test]
    fn test_missing_message_uses_fallback() {
        let value = json!({"level": "INFO", "event": "login"});
        let record = normalize(RawInput::Value(&value), "hit logs/1", "logs/1");
        assert_eq!(record.message, "hit logs/1");

        let record = normalize(RawInput::Value(&value), "", "logs/1");
        assert_eq!(record.message, value.to_string());
    }

    #[test]
    fn test_trailing_object_recovers_prefix_fields() {
        let record = normalize_line(
            r#"2024-05-06T07:08:09Z worker-3 {"level":"WARN","thread":"main"}"#,
            "s",
        );
        assert_eq!(record.level.as_deref(), Some("WARN"));
        assert_eq!(record.thread.as_deref(), Some("main"));
        assert_eq!(record.timestamp.as_deref(), Some("2024-05-06T07:08:09Z"));
        assert_eq!(record.message, "2024-05-06T07:08:09Z worker-3");
    }

    #[test]
    fn test_fields_are_always_strings() {
        let value = json!({
            "timestamp": 1704067200000u64,
            "level": 50,
            "logger": true,
            "thread": {"name": "t"},
            "message": ["a", "b"],
            "trace_id": null,
        });
        let record = normalize_value(&value, "", "s");
        assert_eq!(record.timestamp.as_deref(), Some("1704067200000"));
        assert_eq!(record.level.as_deref(), Some("50"));
        assert_eq!(record.logger.as_deref(), Some("true"));
        assert_eq!(record.thread.as_deref(), Some(r#"{"name":"t"}"#));
        assert_eq!(record.message, r#"["a","b"]"#);
        assert_eq!(record.trace_id, None);
    }

    #[test]
    fn test_stack_and_trace_extracted() {
        let value = json!({
            "msg": "failed",
            "traceId": "abc123",
            "error": {"message": "nope", "stack": "Error: nope\n    at main"},
        });
        let record = normalize_value(&value, "", "s");
        assert_eq!(record.message, "failed");
        assert_eq!(record.trace_id.as_deref(), Some("abc123"));
        assert_eq!(record.stack_trace.as_deref(), Some("Error: nope\n    at main"));
    }

    #[test]
    fn test_scalar_value() {
        let record = normalize_value(&json!(12.5), "", "s");
        assert_eq!(record.message, "12.5");
        assert_eq!(record.raw, json!(12.5));
    }

    #[test]
    fn test_deterministic() {
        let line = r#"{"level":"INFO","msg":"x","mdc":{"k":"v"}}"#;
        assert_eq!(normalize_line(line, "s"), normalize_line(line, "s"));
    }
}
