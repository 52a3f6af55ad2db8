use super::document::normalize_text;
use crate::record::CanonicalRecord;
use std::io::{Cursor, Read};
use std::path::Path;
use tracing::{debug, warn};

const LOG_EXTENSIONS: &[&str] = &["log", "json", "jsonl", "txt"];

/// Whether an archive entry looks like log content, judged by extension.
pub fn is_log_entry(name: &str) -> bool {
    Path::new(name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| LOG_EXTENSIONS.iter().any(|known| ext.eq_ignore_ascii_case(known)))
        .unwrap_or(false)
}

/// Expands a zip archive held in memory and normalizes every log-like entry.
///
/// Each record's source is `archive::innerPath`. Entries with other
/// extensions are skipped. An unreadable archive degrades to a single
/// ERROR record rather than failing.
pub fn normalize_archive(bytes: &[u8], archive_name: &str) -> Vec<CanonicalRecord> {
    let mut archive = match zip::ZipArchive::new(Cursor::new(bytes)) {
        Ok(archive) => archive,
        Err(e) => {
            warn!(archive = %archive_name, error = %e, "Failed to open archive");
            return vec![CanonicalRecord::synthetic_error(
                format!("failed to open archive {}: {}", archive_name, e),
                archive_name,
            )];
        }
    };

    let mut records = Vec::new();

    for index in 0..archive.len() {
        let mut entry = match archive.by_index(index) {
            Ok(entry) => entry,
            Err(e) => {
                warn!(archive = %archive_name, index = index, error = %e, "Skipping unreadable archive entry");
                continue;
            }
        };

        if entry.is_dir() || !is_log_entry(entry.name()) {
            continue;
        }

        let inner_path = entry.name().to_string();
        let source = format!("{}::{}", archive_name, inner_path);

        let mut bytes = Vec::new();
        if let Err(e) = entry.read_to_end(&mut bytes) {
            records.push(CanonicalRecord::synthetic_error(
                format!("failed to read {}: {}", inner_path, e),
                source,
            ));
            continue;
        }

        let text = String::from_utf8_lossy(&bytes);
        let entry_records = normalize_text(&text, &source);
        debug!(entry = %inner_path, count = entry_records.len(), "Normalized archive entry");
        records.extend(entry_records);
    }

    records
}
