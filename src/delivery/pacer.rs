use crate::config::types::PacingConfig;
use std::time::Duration;

/// Inter-batch pause that adapts to how long each flush cycle took.
///
/// Slow cycles double the pause, fast cycles shorten it by a quarter; the
/// result is always clamped to `[floor, ceiling]`.
#[derive(Debug, Clone)]
pub struct AdaptivePacer {
    delay: Duration,
    floor: Duration,
    ceiling: Duration,
    slow_threshold: Duration,
    fast_threshold: Duration,
}

impl AdaptivePacer {
    pub fn new(config: &PacingConfig) -> Self {
        let floor = config.floor.min(config.ceiling);
        let ceiling = config.ceiling.max(config.floor);
        Self {
            delay: config.initial.clamp(floor, ceiling),
            floor,
            ceiling,
            slow_threshold: config.slow_threshold,
            fast_threshold: config.fast_threshold,
        }
    }

    pub fn delay(&self) -> Duration {
        self.delay
    }

    /// Feeds the wall-clock time spent in one flush cycle and returns the new
    /// delay.
    pub fn observe(&mut self, elapsed: Duration) -> Duration {
        let next = if elapsed > self.slow_threshold {
            self.delay.saturating_mul(2).max(self.floor.max(Duration::from_millis(1)))
        } else if elapsed < self.fast_threshold {
            self.delay.saturating_sub(self.delay / 4)
        } else {
            self.delay
        };

        let next = next.clamp(self.floor, self.ceiling);
        if next != self.delay {
            tracing::debug!(
                elapsed_ms = elapsed.as_millis() as u64,
                delay_ms = next.as_millis() as u64,
                "Adjusted delivery pacing"
            );
        }
        self.delay = next;
        next
    }
}
