use crate::record::CanonicalRecord;
use serde_json::Value;

pub const TRUNCATION_MARKER: &str = "…[truncated]";

/// Cuts `text` so that it fits in `max_bytes` including the marker.
/// Returns true if anything was cut.
fn truncate_string(text: &mut String, max_bytes: usize) -> bool {
    if text.len() <= max_bytes {
        return false;
    }

    let mut cut = max_bytes.saturating_sub(TRUNCATION_MARKER.len());
    while cut > 0 && !text.is_char_boundary(cut) {
        cut -= 1;
    }
    text.truncate(cut);
    text.push_str(TRUNCATION_MARKER);
    true
}

fn truncate_optional(field: &mut Option<String>, max_bytes: usize) -> bool {
    field
        .as_mut()
        .map_or(false, |text| truncate_string(text, max_bytes))
}

fn truncate_value(value: &mut Value, max_bytes: usize) -> bool {
    match value {
        Value::String(text) => truncate_string(text, max_bytes),
        Value::Array(items) => items
            .iter_mut()
            .fold(false, |cut, item| truncate_value(item, max_bytes) | cut),
        Value::Object(map) => map
            .values_mut()
            .fold(false, |cut, item| truncate_value(item, max_bytes) | cut),
        _ => false,
    }
}

/// Truncates every string field of the record (including `mdc` values and
/// string leaves inside `raw`) to `max_bytes`, setting `truncated` when
/// anything was cut.
pub fn truncate_record(record: &mut CanonicalRecord, max_bytes: usize) {
    let mut cut = truncate_string(&mut record.message, max_bytes);
    cut |= truncate_optional(&mut record.timestamp, max_bytes);
    cut |= truncate_optional(&mut record.level, max_bytes);
    cut |= truncate_optional(&mut record.logger, max_bytes);
    cut |= truncate_optional(&mut record.thread, max_bytes);
    cut |= truncate_optional(&mut record.trace_id, max_bytes);
    cut |= truncate_optional(&mut record.stack_trace, max_bytes);
    for value in record.mdc.values_mut() {
        cut |= truncate_string(value, max_bytes);
    }
    cut |= truncate_value(&mut record.raw, max_bytes);

    if cut {
        record.truncated = true;
    }
}

pub fn truncate_batch(batch: &mut [CanonicalRecord], max_bytes: usize) {
    for record in batch.iter_mut() {
        truncate_record(record, max_bytes);
    }
}
