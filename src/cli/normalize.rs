use super::output::{write_records, OutputFormat};
use crate::config::expand_tilde;
use crate::normalize::{normalize_archive, normalize_body};
use crate::record::CanonicalRecord;
use flate2::read::GzDecoder;
use std::io::Read;
use std::path::Path;
use tracing::info;

/// Normalizes a local file (plain, `.gz` or `.zip`) and prints the records.
pub async fn normalize_file(path: &Path, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    let path = expand_tilde(path);
    let records = read_records(&path).await?;
    info!(path = %path.display(), count = records.len(), "Normalized file");

    let stdout = std::io::stdout();
    write_records(&mut stdout.lock(), &records, OutputFormat::from_json_flag(json))?;
    Ok(())
}

pub async fn read_records(path: &Path) -> Result<Vec<CanonicalRecord>, std::io::Error> {
    let bytes = tokio::fs::read(path).await?;
    let name = path
        .file_name()
        .map(|name| name.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string());
    let extension = path
        .extension()
        .map(|ext| ext.to_string_lossy().to_ascii_lowercase());

    let records = match extension.as_deref() {
        Some("zip") => normalize_archive(&bytes, &name),
        Some("gz") => {
            let mut text = String::new();
            GzDecoder::new(bytes.as_slice()).read_to_string(&mut text)?;
            let inner = name.strip_suffix(".gz").unwrap_or(&name).to_string();
            normalize_body(&text, &inner).await
        }
        _ => normalize_body(&String::from_utf8_lossy(&bytes), &name).await,
    };
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use flate2::write::GzEncoder;
    use flate2::Compression;
    use std::io::Write;

    #[tokio::test]
    async fn test_plain_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log");
        std::fs::write(&path, "{\"level\":\"WARN\",\"msg\":\"disk low\"}\nplain line\n").unwrap();

        let records = read_records(&path).await.unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].level.as_deref(), Some("WARN"));
        assert_eq!(records[0].source, "app.log");
        assert_eq!(records[1].message, "plain line");
    }

    #[tokio::test]
    async fn test_gzip_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("app.log.gz");
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(b"first\nsecond\n").unwrap();
        std::fs::write(&path, encoder.finish().unwrap()).unwrap();

        let records = read_records(&path).await.unwrap();
        let messages: Vec<&str> = records.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(messages, vec!["first", "second"]);
        assert_eq!(records[0].source, "app.log");
    }

    #[tokio::test]
    async fn test_missing_file_is_error() {
        assert!(read_records(Path::new("/nonexistent/logtide.log")).await.is_err());
    }
}
