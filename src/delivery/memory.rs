use crate::config::types::{DeliveryConfig, MemoryConfig, PressureSignal};
use sysinfo::{Pid, ProcessesToUpdate, System};

const DEFAULT_QUEUED_BUDGET: u64 = 256 * 1024 * 1024;

/// Source of the memory pressure ratio that drives queue capacity.
pub trait MemoryProbe: Send {
    /// Current utilization in `[0, ∞)`, where 1.0 means the budget is spent.
    /// `queued_bytes` is the estimated size of everything held in delivery
    /// queues. Returns `None` when the signal is unavailable.
    fn utilization(&mut self, queued_bytes: u64) -> Option<f64>;

    fn name(&self) -> &'static str;
}

/// Resident memory of this process against a budget or total system memory.
pub struct ProcessMemoryProbe {
    system: System,
    pid: Pid,
    budget_bytes: Option<u64>,
}

impl ProcessMemoryProbe {
    pub fn new(budget_bytes: Option<u64>) -> Self {
        let mut system = System::new();
        let pid = Pid::from_u32(std::process::id());
        system.refresh_processes(ProcessesToUpdate::Some(&[pid]));
        if budget_bytes.is_none() {
            system.refresh_memory();
        }

        Self {
            system,
            pid,
            budget_bytes,
        }
    }
}

impl MemoryProbe for ProcessMemoryProbe {
    fn utilization(&mut self, _queued_bytes: u64) -> Option<f64> {
        self.system
            .refresh_processes(ProcessesToUpdate::Some(&[self.pid]));
        let resident = self.system.process(self.pid)?.memory();

        let budget = match self.budget_bytes {
            Some(budget) => budget,
            None => self.system.total_memory(),
        };
        if budget == 0 {
            return None;
        }
        Some(resident as f64 / budget as f64)
    }

    fn name(&self) -> &'static str {
        "process_memory"
    }
}

/// Bytes held in delivery queues against a fixed budget.
pub struct QueuedBytesProbe {
    budget_bytes: u64,
}

impl QueuedBytesProbe {
    pub fn new(budget_bytes: Option<u64>) -> Self {
        Self {
            budget_bytes: budget_bytes.unwrap_or(DEFAULT_QUEUED_BUDGET).max(1),
        }
    }
}

impl MemoryProbe for QueuedBytesProbe {
    fn utilization(&mut self, queued_bytes: u64) -> Option<f64> {
        Some(queued_bytes as f64 / self.budget_bytes as f64)
    }

    fn name(&self) -> &'static str {
        "queued_bytes"
    }
}

pub fn probe_for(config: &MemoryConfig) -> Box<dyn MemoryProbe> {
    match config.signal {
        PressureSignal::ProcessMemory => Box::new(ProcessMemoryProbe::new(config.budget_bytes)),
        PressureSignal::QueuedBytes => Box::new(QueuedBytesProbe::new(config.budget_bytes)),
    }
}

/// Queue capacity that shrinks above the high-water mark and grows back
/// toward its ceiling below the low-water mark.
#[derive(Debug, Clone)]
pub struct AdaptiveCapacity {
    current: usize,
    min: usize,
    max: usize,
    high_water: f64,
    low_water: f64,
    shrink_factor: f64,
    grow_factor: f64,
}

impl AdaptiveCapacity {
    pub fn new(config: &DeliveryConfig) -> Self {
        let max = config.capacity.max(1);
        Self {
            current: max,
            min: config.min_capacity.clamp(1, max),
            max,
            high_water: config.memory.high_water,
            low_water: config.memory.low_water,
            shrink_factor: config.memory.shrink_factor,
            grow_factor: config.memory.grow_factor,
        }
    }

    pub fn current(&self) -> usize {
        self.current
    }

    /// Applies one utilization sample. Returns the new capacity if it changed.
    pub fn adjust(&mut self, utilization: f64) -> Option<usize> {
        let next = if utilization > self.high_water {
            (self.current as f64 * self.shrink_factor).floor() as usize
        } else if utilization < self.low_water {
            ((self.current as f64 * self.grow_factor).ceil() as usize).max(self.current + 1)
        } else {
            self.current
        };

        let next = next.clamp(self.min, self.max);
        if next == self.current {
            return None;
        }
        self.current = next;
        Some(next)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(capacity: usize, min_capacity: usize) -> DeliveryConfig {
        DeliveryConfig {
            capacity,
            min_capacity,
            ..DeliveryConfig::default()
        }
    }

    #[test]
    fn test_shrinks_under_pressure_to_minimum() {
        let mut capacity = AdaptiveCapacity::new(&config(50_000, 1_000));
        assert_eq!(capacity.adjust(0.95), Some(25_000));
        assert_eq!(capacity.adjust(0.95), Some(12_500));
        for _ in 0..10 {
            capacity.adjust(0.99);
        }
        assert_eq!(capacity.current(), 1_000);
        assert_eq!(capacity.adjust(0.99), None);
    }

    #[test]
    fn test_grows_back_to_ceiling() {
        let mut capacity = AdaptiveCapacity::new(&config(10_000, 100));
        capacity.adjust(0.9);
        capacity.adjust(0.9);
        assert_eq!(capacity.current(), 2_500);

        for _ in 0..20 {
            capacity.adjust(0.1);
        }
        assert_eq!(capacity.current(), 10_000);
        assert_eq!(capacity.adjust(0.1), None);
    }

    #[test]
    fn test_between_marks_holds() {
        let mut capacity = AdaptiveCapacity::new(&config(1_000, 10));
        capacity.adjust(0.9);
        assert_eq!(capacity.adjust(0.7), None);
        assert_eq!(capacity.current(), 500);
    }

    #[test]
    fn test_queued_bytes_probe() {
        let mut probe = QueuedBytesProbe::new(Some(1_000));
        assert_eq!(probe.utilization(250), Some(0.25));
        assert_eq!(probe.name(), "queued_bytes");
    }

    #[test]
    fn test_process_probe_reports_something() {
        let mut probe = ProcessMemoryProbe::new(Some(u64::MAX));
        let utilization = probe.utilization(0).unwrap_or(0.0);
        assert!((0.0..1.0).contains(&utilization));
    }
}
