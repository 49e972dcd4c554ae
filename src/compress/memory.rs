//! System memory pressure sampling.

use sysinfo::System;

/// Source of memory pressure readings.
pub trait MemoryMonitor: Send {
    /// Fraction of physical memory in use, in `[0, 1]`. `None` if unknown.
    fn pressure(&mut self) -> Option<f64>;
}

/// Reads memory usage of the host through `sysinfo`.
pub struct SystemMemoryMonitor {
    system: System,
}

impl SystemMemoryMonitor {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for SystemMemoryMonitor {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryMonitor for SystemMemoryMonitor {
    fn pressure(&mut self) -> Option<f64> {
        self.system.refresh_memory();
        let total = self.system.total_memory();
        if total == 0 {
            return None;
        }
        let available = self.system.available_memory().min(total);
        Some(1.0 - available as f64 / total as f64)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_pressure_is_a_fraction() {
        let mut monitor = SystemMemoryMonitor::new();
        if let Some(p) = monitor.pressure() {
            assert!((0.0..=1.0).contains(&p));
        }
    }
}
