//! Runtime-tunable capacity configuration. The compile-time constants in
//! `crate::types` fix the upper bounds of the statically sized buffers;
//! `CoreConfig` lets a host collaborator pick a smaller working set within
//! those bounds (e.g. a 1024 vs 4096 pulse ring, spec §5) without
//! recompiling the engines.

use crate::types::{DEVICE_TABLE_CAPACITY, PULSE_RING_CAPACITY};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoreConfig {
    /// Working pulse-ring size, must be `<= PULSE_RING_CAPACITY`.
    pub pulse_capacity: usize,
    /// Working device-table size, must be `<= DEVICE_TABLE_CAPACITY`.
    pub device_capacity: usize,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self { pulse_capacity: PULSE_RING_CAPACITY, device_capacity: DEVICE_TABLE_CAPACITY }
    }
}

impl CoreConfig {
    pub const fn with_pulse_capacity(mut self, cap: usize) -> Self {
        self.pulse_capacity = if cap > PULSE_RING_CAPACITY { PULSE_RING_CAPACITY } else { cap };
        self
    }

    pub const fn with_device_capacity(mut self, cap: usize) -> Self {
        self.device_capacity = if cap > DEVICE_TABLE_CAPACITY { DEVICE_TABLE_CAPACITY } else { cap };
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_spec_capacities() {
        let cfg = CoreConfig::default();
        assert_eq!(cfg.pulse_capacity, PULSE_RING_CAPACITY);
        assert_eq!(cfg.device_capacity, DEVICE_TABLE_CAPACITY);
    }

    #[test]
    fn with_pulse_capacity_clamps_to_max() {
        let cfg = CoreConfig::default().with_pulse_capacity(999_999);
        assert_eq!(cfg.pulse_capacity, PULSE_RING_CAPACITY);
    }
}
