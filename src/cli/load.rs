use super::output::{write_records, OutputFormat};
use crate::config::Config;
use crate::record::{CanonicalRecord, Origin};
use crate::source::HttpPoller;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::info;

/// Fetches `url` once and prints the normalized records.
pub async fn load(config: &Config, url: &str, json: bool) -> Result<(), Box<dyn std::error::Error>> {
    // One-shot loads never start a poll, so nothing is emitted to this sink.
    let (tx, _rx) = mpsc::unbounded_channel::<(Origin, Vec<CanonicalRecord>)>();
    let poller = HttpPoller::new(config.poll.clone(), Arc::new(tx))?;

    let records = poller.load_once(url).await?;
    info!(url = %url, count = records.len(), "Loaded records");

    let stdout = std::io::stdout();
    write_records(&mut stdout.lock(), &records, OutputFormat::from_json_flag(json))?;
    Ok(())
}
