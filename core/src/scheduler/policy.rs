//! Time-slice computation per scheduling algorithm.

use kairos_abi::task::{NUM_PRIORITY_LEVELS, SchedAlgorithm, clamp_priority};
use kairos_lib::klog_warn;

pub struct QuantumPolicy {
    algorithm: SchedAlgorithm,
    base_quantum: u32,
    priority_bonus: u32,
    overrides: [Option<u32>; NUM_PRIORITY_LEVELS],
}

impl QuantumPolicy {
    pub fn new(algorithm: SchedAlgorithm, base_quantum: u32, priority_bonus: u32) -> Self {
        let mut policy = Self {
            algorithm: SchedAlgorithm::Priority,
            base_quantum: base_quantum.max(1),
            priority_bonus,
            overrides: [None; NUM_PRIORITY_LEVELS],
        };
        policy.set_algorithm(algorithm);
        policy
    }

    #[inline]
    pub fn algorithm(&self) -> SchedAlgorithm {
        self.algorithm
    }

    #[inline]
    pub fn base_quantum(&self) -> u32 {
        self.base_quantum
    }

    /// `fair_share` and `edf` are accepted but compute quanta like `priority`.
    pub fn set_algorithm(&mut self, algorithm: SchedAlgorithm) {
        if !algorithm.is_implemented() {
            klog_warn!(
                "SCHED: algorithm '{}' not implemented, using priority quanta",
                algorithm
            );
        }
        self.algorithm = algorithm;
    }

    pub fn set_base_quantum(&mut self, ticks: u32) {
        self.base_quantum = ticks.max(1);
    }

    /// `None` clears the override and falls back to the algorithm.
    pub fn set_priority_quantum(&mut self, priority: u8, ticks: Option<u32>) {
        let level = clamp_priority(priority) as usize;
        self.overrides[level] = ticks.map(|t| t.max(1));
    }

    pub fn quantum_for(&self, priority: u8) -> u32 {
        let level = clamp_priority(priority) as usize;
        if let Some(ticks) = self.overrides[level] {
            return ticks;
        }
        match self.algorithm {
            SchedAlgorithm::RoundRobin => self.base_quantum,
            SchedAlgorithm::Priority | SchedAlgorithm::FairShare | SchedAlgorithm::Edf => {
                let levels_above_lowest = (NUM_PRIORITY_LEVELS - 1 - level) as u32;
                self.base_quantum
                    .saturating_add(levels_above_lowest.saturating_mul(self.priority_bonus))
            }
        }
    }
}
