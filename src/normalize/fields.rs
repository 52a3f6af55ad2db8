use serde_json::{Map, Value};
use std::collections::BTreeMap;

pub const TIMESTAMP_ALIASES: &[&str] = &["timestamp", "@timestamp", "time", "ts"];
pub const LEVEL_ALIASES: &[&str] = &["level", "severity", "loglevel", "log.level"];
pub const LOGGER_ALIASES: &[&str] = &["logger", "logger_name", "loggerName", "log.logger"];
pub const THREAD_ALIASES: &[&str] = &["thread", "thread_name", "threadName"];
pub const MESSAGE_ALIASES: &[&str] = &["message", "msg", "log"];
pub const TRACE_ID_ALIASES: &[&str] = &["traceId", "trace_id", "traceid", "trace.id"];

const MDC_KEYS: &[&str] = &["mdc", "context", "contextMap"];

/// Keys whose presence marks a tolerant key-value scan as log-shaped.
pub fn is_recognized_key(key: &str) -> bool {
    matches!(
        key,
        "timestamp" | "@timestamp" | "level" | "logger" | "thread" | "message"
    ) || TRACE_ID_ALIASES.contains(&key)
}

/// Resolves a key either as a literal (possibly dotted) key or as a nested path.
pub fn lookup<'a>(obj: &'a Map<String, Value>, key: &str) -> Option<&'a Value> {
    if let Some(value) = obj.get(key) {
        return Some(value);
    }

    if !key.contains('.') {
        return None;
    }

    let mut segments = key.split('.');
    let first = segments.next()?;
    let mut current = obj.get(first)?;
    for segment in segments {
        current = current.as_object()?.get(segment)?;
    }
    Some(current)
}

/// First alias with a non-null value wins, rendered as a string.
pub fn pick(obj: &Map<String, Value>, aliases: &[&str]) -> Option<String> {
    aliases
        .iter()
        .filter_map(|alias| lookup(obj, alias))
        .find(|value| !value.is_null())
        .map(stringify)
}

/// Like [`pick`], but skips object values: `log` is the message in Docker
/// output and a field group (`log.level`, `log.logger`) in ECS output.
pub fn pick_message(obj: &Map<String, Value>) -> Option<String> {
    MESSAGE_ALIASES
        .iter()
        .filter_map(|alias| lookup(obj, alias))
        .find(|value| !value.is_null() && !value.is_object())
        .map(stringify)
}

/// Renders any JSON value as a string so non-string types never leak into
/// record fields.
pub fn stringify(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// Collects diagnostic context from the first context-like object present.
pub fn diagnostic_context(obj: &Map<String, Value>) -> BTreeMap<String, String> {
    MDC_KEYS
        .iter()
        .filter_map(|key| obj.get(*key).and_then(Value::as_object))
        .next()
        .map(|ctx| {
            ctx.iter()
                .filter(|(_, v)| !v.is_null())
                .map(|(k, v)| (k.clone(), stringify(v)))
                .collect()
        })
        .unwrap_or_default()
}
