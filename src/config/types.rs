use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::time::Duration;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub socket: SocketConfig,
    /// Poll registrations started by `run`.
    pub polls: Vec<PollTarget>,
    pub poll: PollConfig,
    pub search: SearchConfig,
    pub delivery: DeliveryConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SocketConfig {
    pub enabled: bool,
    pub bind: String,
    pub port: u16,
    pub max_line_bytes: usize,
    /// When non-empty, connections from other addresses are rejected before
    /// any bytes are framed.
    pub allowed_peers: Vec<IpAddr>,
}

impl Default for SocketConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            bind: "0.0.0.0".to_string(),
            port: 4560,
            max_line_bytes: 1024 * 1024,
            allowed_peers: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PollTarget {
    pub url: String,
    #[serde(default = "default_poll_interval", with = "humantime_serde")]
    pub interval: Duration,
}

fn default_poll_interval() -> Duration {
    Duration::from_secs(5)
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PollConfig {
    /// Floor applied to every poll interval.
    #[serde(with = "humantime_serde")]
    pub min_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    /// Fresh records are forwarded in slices of this size, yielding between.
    pub forward_chunk: usize,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            min_interval: Duration::from_millis(500),
            timeout: Duration::from_secs(30),
            forward_chunk: 1000,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub page_size: usize,
    /// Backend lease duration in the backend's own syntax, e.g. `1m`.
    pub keep_alive: String,
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,
    pub max_retries: u32,
    #[serde(with = "humantime_serde")]
    pub backoff_base: Duration,
    /// Sessions idle longer than this are closed locally. `None` disables reaping.
    #[serde(with = "humantime_serde")]
    pub idle_timeout: Option<Duration>,
    pub timestamp_field: String,
    pub tiebreak_field: String,
    pub sort_order: SortOrder,
    pub track_total_hits: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            page_size: 1000,
            keep_alive: "1m".to_string(),
            timeout: Duration::from_secs(30),
            max_retries: 4,
            backoff_base: Duration::from_millis(300),
            idle_timeout: Some(Duration::from_secs(600)),
            timestamp_field: "@timestamp".to_string(),
            tiebreak_field: "_id".to_string(),
            sort_order: SortOrder::Desc,
            track_total_hits: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    Asc,
    Desc,
}

impl SortOrder {
    pub fn as_str(&self) -> &'static str {
        match self {
            SortOrder::Asc => "asc",
            SortOrder::Desc => "desc",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DeliveryConfig {
    pub batch_size: usize,
    /// Ceiling for any single string field before truncation.
    pub max_field_bytes: usize,
    /// Default (and maximum) per-consumer queue capacity.
    pub capacity: usize,
    /// Capacity never shrinks below this under memory pressure.
    pub min_capacity: usize,
    pub pacing: PacingConfig,
    pub memory: MemoryConfig,
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            batch_size: 200,
            max_field_bytes: 10 * 1024,
            capacity: 50_000,
            min_capacity: 1_000,
            pacing: PacingConfig::default(),
            memory: MemoryConfig::default(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PacingConfig {
    #[serde(with = "humantime_serde")]
    pub floor: Duration,
    #[serde(with = "humantime_serde")]
    pub ceiling: Duration,
    #[serde(with = "humantime_serde")]
    pub initial: Duration,
    /// A flush cycle slower than this increases the inter-batch pause.
    #[serde(with = "humantime_serde")]
    pub slow_threshold: Duration,
    /// A flush cycle faster than this decreases the inter-batch pause.
    #[serde(with = "humantime_serde")]
    pub fast_threshold: Duration,
}

impl Default for PacingConfig {
    fn default() -> Self {
        Self {
            floor: Duration::from_millis(4),
            ceiling: Duration::from_millis(100),
            initial: Duration::from_millis(16),
            slow_threshold: Duration::from_millis(50),
            fast_threshold: Duration::from_millis(10),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MemoryConfig {
    pub signal: PressureSignal,
    #[serde(with = "humantime_serde")]
    pub sample_interval: Duration,
    pub high_water: f64,
    pub low_water: f64,
    /// Denominator for the pressure ratio. For `process_memory` this defaults
    /// to total system memory; for `queued_bytes` it defaults to 256 MiB.
    pub budget_bytes: Option<u64>,
    pub shrink_factor: f64,
    pub grow_factor: f64,
}

impl Default for MemoryConfig {
    fn default() -> Self {
        Self {
            signal: PressureSignal::ProcessMemory,
            sample_interval: Duration::from_secs(5),
            high_water: 0.85,
            low_water: 0.60,
            budget_bytes: None,
            shrink_factor: 0.5,
            grow_factor: 1.25,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PressureSignal {
    ProcessMemory,
    QueuedBytes,
}
