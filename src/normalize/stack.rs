use super::fields::lookup;
use serde_json::{Map, Value};

const DIRECT_KEYS: &[&str] = &["stack_trace", "stackTrace", "stacktrace"];
const ERROR_KEYS: &[&str] = &["error", "err"];
const ERROR_INNER: &[&str] = &["stack", "trace"];
const EXCEPTION_KEYS: &[&str] = &["exception", "cause", "throwable"];
const EXCEPTION_INNER: &[&str] = &["stack", "stackTrace"];
const FLATTENED_KEYS: &[&str] = &["exception.stacktrace", "error.stacktrace", "error.stack_trace"];

/// Finds a stack trace across the shapes loggers commonly emit.
///
/// Candidates are inspected in order: direct fields, `error`/`err` objects,
/// `exception`/`cause`/`throwable` objects, then flattened dotted keys. The
/// first candidate producing non-blank text wins.
pub fn normalize_stack(obj: &Map<String, Value>) -> Option<String> {
    let direct = DIRECT_KEYS.iter().filter_map(|key| obj.get(*key));

    let errors = ERROR_KEYS
        .iter()
        .filter_map(|key| obj.get(*key))
        .flat_map(|value| nested_candidates(value, ERROR_INNER));

    let exceptions = EXCEPTION_KEYS
        .iter()
        .filter_map(|key| obj.get(*key))
        .flat_map(|value| nested_candidates(value, EXCEPTION_INNER));

    let flattened = FLATTENED_KEYS.iter().filter_map(|key| lookup(obj, key));

    direct
        .chain(errors)
        .chain(exceptions)
        .chain(flattened)
        .find_map(stack_text)
}

fn nested_candidates<'a>(value: &'a Value, inner: &'static [&'static str]) -> Vec<&'a Value> {
    match value {
        Value::Object(map) => inner.iter().filter_map(|key| map.get(*key)).collect(),
        Value::String(_) => vec![value],
        _ => Vec::new(),
    }
}

fn stack_text(value: &Value) -> Option<String> {
    let text = match value {
        Value::String(s) => s.clone(),
        Value::Array(frames) => frames
            .iter()
            .map(|frame| match frame {
                Value::String(s) => s.clone(),
                other => other.to_string(),
            })
            .collect::<Vec<_>>()
            .join("\n"),
        _ => return None,
    };

    if text.trim().is_empty() {
        None
    } else {
        Some(text)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn stack_of(value: Value) -> Option<String> {
        normalize_stack(value.as_object().unwrap())
    }

    #[test]
    fn test_direct_field() {
        assert_eq!(
            stack_of(json!({"stack_trace": "at a\nat b"})),
            Some("at a\nat b".to_string())
        );
    }

    #[test]
    fn test_error_object_and_string() {
        assert_eq!(
            stack_of(json!({"err": {"message": "x", "stack": "Error: x\n  at f"}})),
            Some("Error: x\n  at f".to_string())
        );
        assert_eq!(
            stack_of(json!({"error": "plain failure"})),
            Some("plain failure".to_string())
        );
    }

    #[test]
    fn test_exception_array_is_joined() {
        assert_eq!(
            stack_of(json!({"exception": {"stackTrace": ["at a", "at b"]}})),
            Some("at a\nat b".to_string())
        );
    }

    #[test]
    fn test_flattened_keys() {
        assert_eq!(
            stack_of(json!({"exception.stacktrace": "boom"})),
            Some("boom".to_string())
        );
        assert_eq!(
            stack_of(json!({"error": {"stack_trace": "ecs"}})),
            Some("ecs".to_string())
        );
    }

    #[test]
    fn test_blank_candidates_are_skipped() {
        assert_eq!(
            stack_of(json!({"stackTrace": "   ", "error": {"trace": "real"}})),
            Some("real".to_string())
        );
    }

    #[test]
    fn test_absent() {
        assert_eq!(stack_of(json!({"message": "fine"})), None);
    }
}
