pub mod framing;
pub mod poll;
pub mod socket;

pub use framing::LineFramer;
pub use poll::{DedupSeenSet, HttpPoller, PollError, PollHandle};
pub use socket::{SocketSource, StartOutcome};

use crate::record::{CanonicalRecord, Origin};
use tokio::sync::mpsc;

/// Shared ingestion callback every source forwards normalized records into.
///
/// Implementations must not block: producers call this from their I/O loops.
pub trait IngestSink: Send + Sync {
    fn emit(&self, origin: Origin, records: Vec<CanonicalRecord>);
}

impl IngestSink for mpsc::UnboundedSender<(Origin, Vec<CanonicalRecord>)> {
    fn emit(&self, origin: Origin, records: Vec<CanonicalRecord>) {
        if records.is_empty() {
            return;
        }
        // A closed receiver means nobody is listening anymore.
        let _ = self.send((origin, records));
    }
}
