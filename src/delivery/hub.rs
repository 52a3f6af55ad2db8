use super::consumer::Consumer;
use super::memory::{probe_for, AdaptiveCapacity};
use super::pacer::AdaptivePacer;
use super::queue::{DeliveryQueue, QueueStats};
use super::truncate::truncate_batch;
use super::DeliveryError;
use crate::config::types::{DeliveryConfig, PacingConfig};
use crate::record::{CanonicalRecord, Origin};
use crate::source::IngestSink;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

struct ConsumerSlot {
    consumer: Arc<dyn Consumer>,
    queue: Mutex<DeliveryQueue>,
    ready: AtomicBool,
    notify: Notify,
    /// Held for the duration of each `deliver` call so batches never overlap.
    delivering: tokio::sync::Mutex<()>,
    cancel: CancellationToken,
}

impl ConsumerSlot {
    fn push(&self, records: Vec<CanonicalRecord>) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.push_many(records);
        }
        self.notify.notify_one();
    }

    fn drain(&self, max: usize) -> Vec<CanonicalRecord> {
        self.queue
            .lock()
            .map(|mut queue| queue.drain(max))
            .unwrap_or_default()
    }

    fn prepend(&self, batch: Vec<CanonicalRecord>) {
        if let Ok(mut queue) = self.queue.lock() {
            queue.prepend(batch);
        }
    }

    fn is_empty(&self) -> bool {
        self.queue.lock().map(|queue| queue.is_empty()).unwrap_or(true)
    }
}

/// Fans ingested records out to per-consumer queues and flushes each queue
/// to its consumer with adaptive pacing.
///
/// Producers never block: `emit` only appends to bounded queues. Each
/// registered consumer gets its own flush task that delivers while the
/// consumer is ready.
pub struct DeliveryHub {
    config: DeliveryConfig,
    consumers: RwLock<HashMap<String, Arc<ConsumerSlot>>>,
    routes: RwLock<HashMap<Origin, String>>,
    capacity: Mutex<AdaptiveCapacity>,
}

impl DeliveryHub {
    pub fn new(config: DeliveryConfig) -> Self {
        let capacity = AdaptiveCapacity::new(&config);
        Self {
            config,
            consumers: RwLock::new(HashMap::new()),
            routes: RwLock::new(HashMap::new()),
            capacity: Mutex::new(capacity),
        }
    }

    /// Registers a consumer (initially ready) and spawns its flush task.
    /// Re-registering an id replaces the previous consumer.
    pub fn register(&self, consumer: Arc<dyn Consumer>) -> JoinHandle<()> {
        let id = consumer.id().to_string();
        let capacity = self.current_capacity();
        let slot = Arc::new(ConsumerSlot {
            consumer,
            queue: Mutex::new(DeliveryQueue::new(capacity)),
            ready: AtomicBool::new(true),
            notify: Notify::new(),
            delivering: tokio::sync::Mutex::new(()),
            cancel: CancellationToken::new(),
        });

        if let Ok(mut consumers) = self.consumers.write() {
            if let Some(previous) = consumers.insert(id.clone(), Arc::clone(&slot)) {
                previous.cancel.cancel();
            }
        }
        info!(consumer = %id, capacity = capacity, "Registered consumer");

        tokio::spawn(flush_loop(
            slot,
            self.config.batch_size.max(1),
            self.config.max_field_bytes,
            self.config.pacing.clone(),
        ))
    }

    /// Removes a consumer, stopping its flush task and dropping its backlog.
    pub fn unregister(&self, consumer_id: &str) -> bool {
        let removed = self
            .consumers
            .write()
            .ok()
            .and_then(|mut consumers| consumers.remove(consumer_id));

        if let Ok(mut routes) = self.routes.write() {
            routes.retain(|_, target| target != consumer_id);
        }

        match removed {
            Some(slot) => {
                slot.cancel.cancel();
                info!(consumer = %consumer_id, "Unregistered consumer");
                true
            }
            None => false,
        }
    }

    /// Marks a consumer able (or unable) to receive. Becoming ready flushes
    /// its backlog.
    pub fn set_ready(&self, consumer_id: &str, ready: bool) -> Result<(), DeliveryError> {
        let slot = self
            .slot(consumer_id)
            .ok_or_else(|| DeliveryError::UnknownConsumer(consumer_id.to_string()))?;

        slot.ready.store(ready, Ordering::Release);
        if ready {
            slot.notify.notify_one();
        }
        debug!(consumer = %consumer_id, ready = ready, "Consumer readiness changed");
        Ok(())
    }

    pub fn is_ready(&self, consumer_id: &str) -> Option<bool> {
        self.slot(consumer_id)
            .map(|slot| slot.ready.load(Ordering::Acquire))
    }

    /// Sends every record of `origin` to one consumer instead of all.
    pub fn route(&self, origin: Origin, consumer_id: &str) {
        if let Ok(mut routes) = self.routes.write() {
            routes.insert(origin, consumer_id.to_string());
        }
        debug!(origin = %origin, consumer = %consumer_id, "Routing origin to single consumer");
    }

    pub fn clear_route(&self, origin: Origin) {
        if let Ok(mut routes) = self.routes.write() {
            routes.remove(&origin);
        }
    }

    /// Appends records to the queues of their target consumers.
    pub fn enqueue(&self, origin: Origin, records: Vec<CanonicalRecord>) {
        if records.is_empty() {
            return;
        }

        let route = self
            .routes
            .read()
            .ok()
            .and_then(|routes| routes.get(&origin).cloned());

        let targets: Vec<Arc<ConsumerSlot>> = match &route {
            Some(consumer_id) => self.slot(consumer_id).into_iter().collect(),
            None => self
                .consumers
                .read()
                .map(|consumers| consumers.values().cloned().collect())
                .unwrap_or_default(),
        };

        if targets.is_empty() {
            debug!(
                origin = %origin,
                count = records.len(),
                route = route.as_deref().unwrap_or("*"),
                "No consumer for records, discarding"
            );
            return;
        }

        let last = targets.len() - 1;
        let mut records = Some(records);
        for (i, slot) in targets.iter().enumerate() {
            let batch = if i == last {
                records.take().unwrap_or_default()
            } else {
                records.clone().unwrap_or_default()
            };
            slot.push(batch);
        }
    }

    pub fn stats(&self, consumer_id: &str) -> Option<QueueStats> {
        let slot = self.slot(consumer_id)?;
        let queue = slot.queue.lock().ok()?;
        Some(queue.stats())
    }

    pub fn total_queued_bytes(&self) -> u64 {
        self.consumers
            .read()
            .map(|consumers| {
                consumers
                    .values()
                    .filter_map(|slot| slot.queue.lock().ok().map(|q| q.bytes() as u64))
                    .sum()
            })
            .unwrap_or(0)
    }

    pub fn current_capacity(&self) -> usize {
        self.capacity
            .lock()
            .map(|capacity| capacity.current())
            .unwrap_or(self.config.capacity)
    }

    /// Applies one pressure sample to every queue's capacity.
    /// Returns the new capacity if it changed.
    pub fn apply_pressure(&self, utilization: f64) -> Option<usize> {
        let next = self.capacity.lock().ok()?.adjust(utilization)?;

        let mut dropped = 0;
        if let Ok(consumers) = self.consumers.read() {
            for slot in consumers.values() {
                if let Ok(mut queue) = slot.queue.lock() {
                    dropped += queue.set_capacity(next);
                }
            }
        }

        info!(
            utilization = %format!("{:.2}", utilization),
            capacity = next,
            dropped = dropped,
            "Adjusted delivery queue capacity"
        );
        Some(next)
    }

    /// Spawns the periodic memory sampler that drives queue capacity.
    pub fn spawn_capacity_monitor(self: &Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let hub = Arc::clone(self);
        let mut probe = probe_for(&self.config.memory);
        let period = self.config.memory.sample_interval.max(Duration::from_millis(10));

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(period);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = ticker.tick() => {
                        match probe.utilization(hub.total_queued_bytes()) {
                            Some(utilization) => {
                                hub.apply_pressure(utilization);
                            }
                            None => debug!(signal = probe.name(), "Memory signal unavailable"),
                        }
                    }
                }
            }
        })
    }

    /// Delivers everything still queued for ready consumers, skipping the
    /// pacing delay. Consumers that fail keep their backlog.
    pub async fn flush_all(&self) {
        let slots: Vec<Arc<ConsumerSlot>> = self
            .consumers
            .read()
            .map(|consumers| consumers.values().cloned().collect())
            .unwrap_or_default();

        for slot in slots {
            let mut delivered = 0usize;
            while slot.ready.load(Ordering::Acquire) {
                match deliver_next(&slot, self.config.batch_size.max(1), self.config.max_field_bytes)
                    .await
                {
                    Flushed::Delivered(count) => delivered += count,
                    Flushed::Empty | Flushed::Failed => break,
                }
            }
            if delivered > 0 {
                debug!(consumer = %slot.consumer.id(), delivered = delivered, "Final flush");
            }
        }
    }

    /// Stops every flush task. Call [`DeliveryHub::flush_all`] first to keep
    /// queued records.
    pub fn shutdown(&self) {
        if let Ok(consumers) = self.consumers.read() {
            for slot in consumers.values() {
                slot.cancel.cancel();
            }
        }
    }

    fn slot(&self, consumer_id: &str) -> Option<Arc<ConsumerSlot>> {
        self.consumers
            .read()
            .ok()
            .and_then(|consumers| consumers.get(consumer_id).cloned())
    }
}

impl IngestSink for DeliveryHub {
    fn emit(&self, origin: Origin, records: Vec<CanonicalRecord>) {
        self.enqueue(origin, records);
    }
}

enum Flushed {
    Empty,
    Delivered(usize),
    Failed,
}

/// Drains and delivers one batch. A failed batch goes back to the front of
/// the queue and the consumer is marked not ready.
async fn deliver_next(slot: &ConsumerSlot, batch_size: usize, max_field_bytes: usize) -> Flushed {
    let _delivering = slot.delivering.lock().await;

    let mut batch = slot.drain(batch_size);
    if batch.is_empty() {
        return Flushed::Empty;
    }
    truncate_batch(&mut batch, max_field_bytes);

    match slot.consumer.deliver(&batch).await {
        Ok(()) => Flushed::Delivered(batch.len()),
        Err(e) => {
            let count = batch.len();
            slot.prepend(batch);
            slot.ready.store(false, Ordering::Release);
            warn!(
                consumer = %slot.consumer.id(),
                count = count,
                error = %e,
                "Delivery failed, re-buffered batch"
            );
            Flushed::Failed
        }
    }
}

async fn flush_loop(
    slot: Arc<ConsumerSlot>,
    batch_size: usize,
    max_field_bytes: usize,
    pacing: PacingConfig,
) {
    let mut pacer = AdaptivePacer::new(&pacing);
    let consumer_id = slot.consumer.id().to_string();

    loop {
        tokio::select! {
            _ = slot.cancel.cancelled() => break,
            _ = slot.notify.notified() => {}
        }

        if !slot.ready.load(Ordering::Acquire) {
            continue;
        }

        let mut spent = Duration::ZERO;
        let mut delivered = 0usize;

        loop {
            let started = Instant::now();
            let flushed = deliver_next(&slot, batch_size, max_field_bytes).await;
            spent += started.elapsed();

            match flushed {
                Flushed::Delivered(count) => delivered += count,
                Flushed::Empty | Flushed::Failed => break,
            }

            if slot.is_empty() {
                break;
            }
            tokio::select! {
                _ = slot.cancel.cancelled() => return,
                _ = tokio::time::sleep(pacer.delay()) => {}
            }
        }

        if delivered > 0 {
            pacer.observe(spent);
            debug!(
                consumer = %consumer_id,
                delivered = delivered,
                spent_ms = spent.as_millis() as u64,
                "Flush cycle complete"
            );
        }
    }

    debug!(consumer = %consumer_id, "Flush task stopped");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::delivery::ChannelConsumer;
    use tokio::sync::mpsc;

    fn records(prefix: &str, count: usize) -> Vec<CanonicalRecord> {
        (0..count)
            .map(|i| CanonicalRecord::bare(format!("{} {}", prefix, i), "test"))
            .collect()
    }

    fn config() -> DeliveryConfig {
        DeliveryConfig {
            batch_size: 2,
            capacity: 100,
            min_capacity: 10,
            ..DeliveryConfig::default()
        }
    }

    async fn collect(rx: &mut mpsc::Receiver<Vec<CanonicalRecord>>, count: usize) -> Vec<String> {
        let mut seen = Vec::new();
        while seen.len() < count {
            let batch = tokio::time::timeout(Duration::from_secs(2), rx.recv())
                .await
                .expect("timed out waiting for delivery")
                .expect("channel closed");
            seen.extend(batch.into_iter().map(|r| r.message));
        }
        seen
    }

    #[tokio::test]
    async fn test_broadcast_in_batches() {
        let hub = DeliveryHub::new(config());
        let (a, mut rx_a) = ChannelConsumer::channel("a", 16);
        let (b, mut rx_b) = ChannelConsumer::channel("b", 16);
        hub.register(Arc::new(a));
        hub.register(Arc::new(b));

        hub.emit(Origin::Poll, records("poll", 5));

        let first = rx_a.recv().await.unwrap();
        assert_eq!(first.len(), 2);
        assert_eq!(
            collect(&mut rx_b, 5).await,
            vec!["poll 0", "poll 1", "poll 2", "poll 3", "poll 4"]
        );
        hub.shutdown();
    }

    #[tokio::test]
    async fn test_routed_origin_reaches_only_owner() {
        let hub = DeliveryHub::new(config());
        let (owner, mut rx_owner) = ChannelConsumer::channel("owner", 16);
        let (other, mut rx_other) = ChannelConsumer::channel("other", 16);
        hub.register(Arc::new(owner));
        hub.register(Arc::new(other));
        hub.route(Origin::Socket, "owner");

        hub.emit(Origin::Socket, records("tcp", 1));
        assert_eq!(collect(&mut rx_owner, 1).await, vec!["tcp 0"]);

        hub.emit(Origin::Poll, records("poll", 1));
        assert_eq!(collect(&mut rx_other, 1).await, vec!["poll 0"]);
        assert_eq!(collect(&mut rx_owner, 1).await, vec!["poll 0"]);
        hub.shutdown();
    }

    #[tokio::test]
    async fn test_not_ready_consumer_buffers_until_ready() {
        let hub = DeliveryHub::new(config());
        let (consumer, mut rx) = ChannelConsumer::channel("ui", 16);
        hub.register(Arc::new(consumer));
        hub.set_ready("ui", false).unwrap();

        hub.emit(Origin::Search, records("page", 3));
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(rx.try_recv().is_err());
        assert_eq!(hub.stats("ui").unwrap().len, 3);

        hub.set_ready("ui", true).unwrap();
        assert_eq!(collect(&mut rx, 3).await, vec!["page 0", "page 1", "page 2"]);
        hub.shutdown();
    }

    #[tokio::test]
    async fn test_failed_delivery_rebuffers_at_front() {
        let hub = DeliveryHub::new(config());
        let (consumer, mut rx) = ChannelConsumer::channel("ui", 1);
        hub.register(Arc::new(consumer));

        hub.emit(Origin::Poll, records("r", 4));

        // Channel holds one batch; the second delivery fails and is re-buffered.
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert_eq!(hub.is_ready("ui"), Some(false));
        assert_eq!(hub.stats("ui").unwrap().len, 2);

        assert_eq!(collect(&mut rx, 2).await, vec!["r 0", "r 1"]);
        hub.set_ready("ui", true).unwrap();
        assert_eq!(collect(&mut rx, 2).await, vec!["r 2", "r 3"]);
        hub.shutdown();
    }

    #[tokio::test]
    async fn test_pressure_shrinks_existing_queues() {
        let hub = DeliveryHub::new(config());
        let (consumer, _rx) = ChannelConsumer::channel("ui", 1);
        hub.register(Arc::new(consumer));
        hub.set_ready("ui", false).unwrap();

        hub.emit(Origin::Poll, records("r", 100));
        assert_eq!(hub.apply_pressure(0.99), Some(50));
        let stats = hub.stats("ui").unwrap();
        assert_eq!(stats.len, 50);
        assert_eq!(stats.capacity, 50);
        assert_eq!(stats.dropped_total, 50);
        assert_eq!(hub.apply_pressure(0.7), None);
        hub.shutdown();
    }

    #[tokio::test]
    async fn test_flush_all_delivers_backlog_before_shutdown() {
        let slow = Duration::from_secs(30);
        let hub = DeliveryHub::new(DeliveryConfig {
            batch_size: 1,
            pacing: PacingConfig {
                floor: slow,
                ceiling: slow,
                initial: slow,
                ..PacingConfig::default()
            },
            ..config()
        });
        let (consumer, mut rx) = ChannelConsumer::channel("stdout", 16);
        hub.register(Arc::new(consumer));

        hub.emit(Origin::Poll, records("r", 5));

        // The flush task sends one batch, then sits in its pacing sleep.
        assert_eq!(collect(&mut rx, 1).await, vec!["r 0"]);
        assert_eq!(hub.stats("stdout").unwrap().len, 4);

        hub.flush_all().await;
        hub.shutdown();

        let mut rest = Vec::new();
        while let Ok(batch) = rx.try_recv() {
            rest.extend(batch.into_iter().map(|r| r.message));
        }
        assert_eq!(rest, vec!["r 1", "r 2", "r 3", "r 4"]);
        assert_eq!(hub.stats("stdout").unwrap().len, 0);
    }

    #[tokio::test]
    async fn test_flush_all_skips_consumers_not_ready() {
        let hub = DeliveryHub::new(config());
        let (consumer, mut rx) = ChannelConsumer::channel("ui", 16);
        hub.register(Arc::new(consumer));
        hub.set_ready("ui", false).unwrap();

        hub.emit(Origin::Poll, records("r", 3));
        hub.flush_all().await;

        assert!(rx.try_recv().is_err());
        assert_eq!(hub.stats("ui").unwrap().len, 3);
        hub.shutdown();
    }

    #[tokio::test]
    async fn test_unknown_consumer() {
        let hub = DeliveryHub::new(config());
        assert!(matches!(
            hub.set_ready("ghost", true),
            Err(DeliveryError::UnknownConsumer(_))
        ));
        assert!(!hub.unregister("ghost"));
    }
}
