use chrono::{SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;

/// Identifies which ingestion source produced a batch of records.
///
/// Used by the delivery hub to route records from one source to a single
/// designated consumer instead of broadcasting them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Origin {
    Socket,
    Poll,
    Search,
    File,
}

impl fmt::Display for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Origin::Socket => "socket",
            Origin::Poll => "poll",
            Origin::Search => "search",
            Origin::File => "file",
        };
        f.write_str(name)
    }
}

/// The normalized, source-agnostic log event.
///
/// `message` is always present (possibly empty). Every other textual field is
/// either a string or absent; the original decoded structure lives in `raw`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CanonicalRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub level: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub logger: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub thread: Option<String>,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_trace: Option<String>,
    pub source: String,
    #[serde(default)]
    pub raw: Value,
    #[serde(default, skip_serializing_if = "is_false")]
    pub truncated: bool,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub mdc: BTreeMap<String, String>,
}

fn is_false(value: &bool) -> bool {
    !*value
}

impl CanonicalRecord {
    /// A record carrying only a message, with every optional field absent.
    pub fn bare(message: impl Into<String>, source: impl Into<String>) -> Self {
        Self {
            timestamp: None,
            level: None,
            logger: None,
            thread: None,
            message: message.into(),
            trace_id: None,
            stack_trace: None,
            source: source.into(),
            raw: Value::Null,
            truncated: false,
            mdc: BTreeMap::new(),
        }
    }

    /// Synthetic ERROR-level record used to surface ingestion failures
    /// through the same stream as regular records.
    pub fn synthetic_error(message: impl Into<String>, source: impl Into<String>) -> Self {
        let message = message.into();
        let mut record = Self::bare(message.clone(), source);
        record.timestamp = Some(Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true));
        record.level = Some("ERROR".to_string());
        record.logger = Some("logtide".to_string());
        record.raw = Value::String(message);
        record
    }

    /// Composite dedup key over the displayed fields, in a fixed order.
    pub fn fingerprint(&self) -> String {
        let parts = [
            self.timestamp.as_deref().unwrap_or(""),
            self.level.as_deref().unwrap_or(""),
            self.logger.as_deref().unwrap_or(""),
            self.thread.as_deref().unwrap_or(""),
            self.message.as_str(),
            self.trace_id.as_deref().unwrap_or(""),
            self.source.as_str(),
        ];
        parts.join("\u{1f}")
    }

    /// Rough in-memory footprint, used for queue byte accounting.
    pub fn estimated_bytes(&self) -> usize {
        let optional = [
            &self.timestamp,
            &self.level,
            &self.logger,
            &self.thread,
            &self.trace_id,
            &self.stack_trace,
        ]
        .iter()
        .map(|field| field.as_ref().map_or(0, |s| s.len()))
        .sum::<usize>();

        let mdc = self
            .mdc
            .iter()
            .map(|(k, v)| k.len() + v.len())
            .sum::<usize>();

        std::mem::size_of::<Self>()
            + optional
            + mdc
            + self.message.len()
            + self.source.len()
            + value_bytes(&self.raw)
    }
}

fn value_bytes(value: &Value) -> usize {
    match value {
        Value::Null | Value::Bool(_) | Value::Number(_) => 8,
        Value::String(s) => s.len(),
        Value::Array(items) => items.iter().map(value_bytes).sum(),
        Value::Object(map) => map.iter().map(|(k, v)| k.len() + value_bytes(v)).sum(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_fingerprint_is_order_sensitive() {
        let mut a = CanonicalRecord::bare("x", "src");
        a.level = Some("INFO".to_string());
        let mut b = CanonicalRecord::bare("x", "src");
        b.logger = Some("INFO".to_string());

        assert_ne!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_fingerprint_ignores_raw_and_mdc() {
        let mut a = CanonicalRecord::bare("same", "src");
        a.raw = json!({"a": 1});
        let mut b = CanonicalRecord::bare("same", "src");
        b.mdc.insert("user".to_string(), "bob".to_string());

        assert_eq!(a.fingerprint(), b.fingerprint());
    }

    #[test]
    fn test_synthetic_error_shape() {
        let record = CanonicalRecord::synthetic_error("connection reset", "tcp://1.2.3.4:5");
        assert_eq!(record.level.as_deref(), Some("ERROR"));
        assert_eq!(record.message, "connection reset");
        assert_eq!(record.source, "tcp://1.2.3.4:5");
        assert!(record.timestamp.is_some());
    }

    #[test]
    fn test_serializes_camel_case_and_skips_absent() {
        let mut record = CanonicalRecord::bare("m", "s");
        record.trace_id = Some("abc".to_string());
        let value = serde_json::to_value(&record).unwrap();

        assert_eq!(value["traceId"], "abc");
        assert!(value.get("level").is_none());
        assert!(value.get("truncated").is_none());
    }
}
