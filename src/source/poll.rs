use crate::config::types::PollConfig;
use crate::normalize::normalize_body;
use crate::record::{CanonicalRecord, Origin};
use crate::source::IngestSink;
use sha2::{Digest, Sha256};
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

#[derive(Debug, Error)]
pub enum PollError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{url} returned status {status}")]
    Status { url: String, status: u16 },
}

/// Opaque handle for a running poll registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PollHandle(Uuid);

impl fmt::Display for PollHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Fingerprints already forwarded by one poll registration.
///
/// Fingerprints are stored as SHA-256 digests so long messages do not inflate
/// the set. It lives exactly as long as its registration.
#[derive(Debug, Default)]
pub struct DedupSeenSet {
    seen: HashSet<[u8; 32]>,
}

impl DedupSeenSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Keeps only records whose fingerprint has not been seen, remembering them.
    pub fn retain_fresh(&mut self, records: Vec<CanonicalRecord>) -> Vec<CanonicalRecord> {
        records
            .into_iter()
            .filter(|record| {
                let digest: [u8; 32] = Sha256::digest(record.fingerprint().as_bytes()).into();
                self.seen.insert(digest)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

struct Registration {
    url: String,
    cancel: CancellationToken,
}

/// Fetches log content over HTTP, once or on an interval.
pub struct HttpPoller {
    client: reqwest::Client,
    config: PollConfig,
    sink: Arc<dyn IngestSink>,
    registrations: Arc<Mutex<HashMap<PollHandle, Registration>>>,
}

impl HttpPoller {
    pub fn new(config: PollConfig, sink: Arc<dyn IngestSink>) -> Result<Self, PollError> {
        let client = reqwest::Client::builder()
            .timeout(config.timeout)
            .gzip(true)
            .brotli(true)
            .deflate(true)
            .build()?;

        Ok(Self {
            client,
            config,
            sink,
            registrations: Arc::new(Mutex::new(HashMap::new())),
        })
    }

    /// Performs a single fetch and returns the normalized records.
    pub async fn load_once(&self, url: &str) -> Result<Vec<CanonicalRecord>, PollError> {
        fetch_records(&self.client, url).await
    }

    /// Starts polling `url`. The first tick runs immediately; intervals below
    /// the configured floor are raised to it.
    pub fn start_poll(&self, url: &str, interval: Duration) -> PollHandle {
        let handle = PollHandle(Uuid::new_v4());
        let interval = interval.max(self.config.min_interval);
        let cancel = CancellationToken::new();

        if let Ok(mut registrations) = self.registrations.lock() {
            registrations.insert(
                handle,
                Registration {
                    url: url.to_string(),
                    cancel: cancel.clone(),
                },
            );
        }

        info!(handle = %handle, url = %url, interval_ms = interval.as_millis() as u64, "Poll started");

        tokio::spawn(run_poll(
            self.client.clone(),
            url.to_string(),
            interval,
            self.config.forward_chunk.max(1),
            Arc::clone(&self.sink),
            cancel,
        ));

        handle
    }

    /// Stops a poll. Returns false if the handle was unknown.
    ///
    /// A fetch already in flight completes, but its records are discarded.
    pub fn stop_poll(&self, handle: PollHandle) -> bool {
        let removed = self
            .registrations
            .lock()
            .ok()
            .and_then(|mut registrations| registrations.remove(&handle));

        match removed {
            Some(registration) => {
                registration.cancel.cancel();
                info!(handle = %handle, url = %registration.url, "Poll stopped");
                true
            }
            None => false,
        }
    }

    pub fn stop_all(&self) {
        let handles: Vec<PollHandle> = self
            .registrations
            .lock()
            .map(|registrations| registrations.keys().copied().collect())
            .unwrap_or_default();

        for handle in handles {
            self.stop_poll(handle);
        }
    }

    pub fn active_polls(&self) -> usize {
        self.registrations
            .lock()
            .map(|registrations| registrations.len())
            .unwrap_or(0)
    }
}

async fn run_poll(
    client: reqwest::Client,
    url: String,
    interval: Duration,
    forward_chunk: usize,
    sink: Arc<dyn IngestSink>,
    cancel: CancellationToken,
) {
    let mut seen = DedupSeenSet::new();
    let mut ticker = tokio::time::interval(interval);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {}
        }

        let result = fetch_records(&client, &url).await;

        if cancel.is_cancelled() {
            debug!(url = %url, "Discarding fetch that completed after stop");
            break;
        }

        match result {
            Ok(records) => {
                let total = records.len();
                let fresh = seen.retain_fresh(records);
                debug!(url = %url, total = total, fresh = fresh.len(), "Poll tick");

                let mut fresh = fresh.into_iter().peekable();
                while fresh.peek().is_some() {
                    if cancel.is_cancelled() {
                        debug!(url = %url, "Poll stopped mid-tick, discarding remaining records");
                        return;
                    }
                    sink.emit(Origin::Poll, fresh.by_ref().take(forward_chunk).collect());
                    tokio::task::yield_now().await;
                }
            }
            Err(e) => {
                warn!(url = %url, error = %e, "Poll fetch failed");
                sink.emit(
                    Origin::Poll,
                    vec![CanonicalRecord::synthetic_error(
                        format!("poll of {} failed: {}", url, e),
                        url.clone(),
                    )],
                );
            }
        }
    }
}

async fn fetch_records(client: &reqwest::Client, url: &str) -> Result<Vec<CanonicalRecord>, PollError> {
    let response = client.get(url).send().await?;

    if !response.status().is_success() {
        return Err(PollError::Status {
            url: url.to_string(),
            status: response.status().as_u16(),
        });
    }

    let body = response.text().await?;
    Ok(normalize_body(&body, url).await)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(message: &str) -> CanonicalRecord {
        CanonicalRecord::bare(message, "http://example")
    }

    #[test]
    fn test_superset_tick_forwards_only_new_records() {
        let mut seen = DedupSeenSet::new();

        let first = seen.retain_fresh(vec![record("a"), record("b")]);
        assert_eq!(first.len(), 2);

        let second = seen.retain_fresh(vec![record("a"), record("b"), record("c")]);
        let messages: Vec<_> = second.iter().map(|r| r.message.as_str()).collect();
        assert_eq!(messages, vec!["c"]);

        let third = seen.retain_fresh(vec![record("a"), record("b"), record("c")]);
        assert!(third.is_empty());
        assert_eq!(seen.len(), 3);
    }

    #[test]
    fn test_duplicates_within_one_tick_collapse() {
        let mut seen = DedupSeenSet::new();
        let fresh = seen.retain_fresh(vec![record("x"), record("x"), record("y")]);
        assert_eq!(fresh.len(), 2);
    }

    #[test]
    fn test_fingerprint_includes_source() {
        let mut seen = DedupSeenSet::new();
        let other = CanonicalRecord::bare("a", "http://other");
        let fresh = seen.retain_fresh(vec![record("a"), other]);
        assert_eq!(fresh.len(), 2);
    }

    #[tokio::test]
    async fn test_stop_unknown_handle() {
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();
        let poller = HttpPoller::new(PollConfig::default(), Arc::new(tx)).unwrap();
        assert!(!poller.stop_poll(PollHandle(Uuid::new_v4())));
        assert_eq!(poller.active_polls(), 0);
    }
}
