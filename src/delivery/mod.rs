//! Decouples producers from slow consumers.
//!
//! Every consumer owns a bounded [`DeliveryQueue`]; a flush task per consumer
//! delivers fixed-size, truncated batches with an adaptive pause between
//! them, and a background monitor shrinks or grows queue capacity with
//! memory pressure.

pub mod consumer;
pub mod hub;
pub mod memory;
pub mod pacer;
pub mod queue;
pub mod truncate;

pub use consumer::{ChannelConsumer, Consumer};
pub use hub::DeliveryHub;
pub use memory::{AdaptiveCapacity, MemoryProbe, ProcessMemoryProbe, QueuedBytesProbe};
pub use pacer::AdaptivePacer;
pub use queue::{DeliveryQueue, QueueStats};
pub use truncate::{truncate_record, TRUNCATION_MARKER};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DeliveryError {
    #[error("consumer '{0}' is not ready")]
    NotReady(String),

    #[error("consumer '{0}' is closed")]
    Closed(String),

    #[error("unknown consumer '{0}'")]
    UnknownConsumer(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Json(#[from] serde_json::Error),
}
