//! Boot-time scheduler configuration.
//!
//! Values come from the kernel command line (`sched.*` tokens). Anything
//! missing or malformed keeps its default.

use kairos_abi::task::{MAX_CPUS, SchedAlgorithm, TASK_STACK_SIZE};

const DEFAULT_CPU_COUNT: usize = 1;
const DEFAULT_BASE_QUANTUM: u32 = 10;
const DEFAULT_PRIORITY_BONUS: u32 = 2;
const DEFAULT_TICK_HZ: u32 = 100;
const DEFAULT_PREEMPTION: bool = true;
const DEFAULT_BALANCE_INTERVAL: u32 = 16;
const DEFAULT_IMBALANCE_THRESHOLD: u32 = 2;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct SchedConfig {
    pub cpu_count: usize,
    pub algorithm: SchedAlgorithm,
    /// Ticks granted to every task before the priority bonus.
    pub base_quantum: u32,
    /// Extra ticks per priority level above the lowest.
    pub priority_quantum_bonus: u32,
    pub tick_hz: u32,
    pub preemption: bool,
    /// Scheduling decisions between two load-balancer runs.
    pub balance_interval: u32,
    /// Local queue depth difference that triggers a migration.
    pub imbalance_threshold: u32,
    pub stack_size: usize,
}

impl Default for SchedConfig {
    fn default() -> Self {
        Self {
            cpu_count: DEFAULT_CPU_COUNT,
            algorithm: SchedAlgorithm::default(),
            base_quantum: DEFAULT_BASE_QUANTUM,
            priority_quantum_bonus: DEFAULT_PRIORITY_BONUS,
            tick_hz: DEFAULT_TICK_HZ,
            preemption: DEFAULT_PREEMPTION,
            balance_interval: DEFAULT_BALANCE_INTERVAL,
            imbalance_threshold: DEFAULT_IMBALANCE_THRESHOLD,
            stack_size: TASK_STACK_SIZE,
        }
    }
}

impl SchedConfig {
    pub fn with_cpus(cpu_count: usize) -> Self {
        Self {
            cpu_count,
            ..Self::default()
        }
        .sanitized()
    }

    /// Clamp every field into the range the scheduler accepts.
    pub fn sanitized(mut self) -> Self {
        self.cpu_count = self.cpu_count.clamp(1, MAX_CPUS);
        self.base_quantum = self.base_quantum.max(1);
        self.tick_hz = self.tick_hz.max(1);
        self.balance_interval = self.balance_interval.max(1);
        self.stack_size = self.stack_size.max(64);
        self
    }

    pub fn from_cmdline(cmdline: Option<&str>) -> Self {
        let mut cfg = Self::default();
        let Some(cmdline) = cmdline else {
            return cfg;
        };

        for token in cmdline.split_whitespace() {
            if let Some(value) = token.strip_prefix("sched.cpus=") {
                if let Ok(parsed) = value.parse::<usize>() {
                    cfg.cpu_count = parsed;
                }
            } else if let Some(value) = token.strip_prefix("sched.algo=") {
                if let Some(algorithm) = SchedAlgorithm::from_str(value) {
                    cfg.algorithm = algorithm;
                }
            } else if let Some(value) = token.strip_prefix("sched.quantum=") {
                if let Ok(parsed) = value.trim_end_matches("ticks").parse::<u32>() {
                    cfg.base_quantum = parsed;
                }
            } else if let Some(value) = token.strip_prefix("sched.bonus=") {
                if let Ok(parsed) = value.parse::<u32>() {
                    cfg.priority_quantum_bonus = parsed;
                }
            } else if let Some(value) = token.strip_prefix("sched.hz=") {
                if let Ok(parsed) = value.trim_end_matches("hz").parse::<u32>() {
                    cfg.tick_hz = parsed;
                }
            } else if let Some(value) = token.strip_prefix("sched.preempt=") {
                if let Some(enabled) = parse_bool(value) {
                    cfg.preemption = enabled;
                }
            } else if let Some(value) = token.strip_prefix("sched.balance=") {
                if let Ok(parsed) = value.parse::<u32>() {
                    cfg.balance_interval = parsed;
                }
            } else if let Some(value) = token.strip_prefix("sched.imbalance=") {
                if let Ok(parsed) = value.parse::<u32>() {
                    cfg.imbalance_threshold = parsed;
                }
            }
        }
        cfg.sanitized()
    }
}

fn parse_bool(value: &str) -> Option<bool> {
    if value.eq_ignore_ascii_case("on")
        || value.eq_ignore_ascii_case("true")
        || value.eq_ignore_ascii_case("yes")
        || value == "1"
    {
        Some(true)
    } else if value.eq_ignore_ascii_case("off")
        || value.eq_ignore_ascii_case("false")
        || value.eq_ignore_ascii_case("no")
        || value == "0"
    {
        Some(false)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_cmdline_uses_defaults() {
        let cfg = SchedConfig::from_cmdline(None);
        assert_eq!(cfg, SchedConfig::default());
        assert_eq!(cfg.algorithm, SchedAlgorithm::Priority);
        assert!(cfg.preemption);
        assert_eq!(cfg.stack_size, TASK_STACK_SIZE);
    }

    #[test]
    fn test_cmdline_tokens_override_defaults() {
        let cfg = SchedConfig::from_cmdline(Some(
            "console=ttyS0 sched.cpus=4 sched.algo=rr sched.quantum=3 sched.hz=1000hz \
             sched.preempt=off sched.balance=8 sched.imbalance=1 sched.bonus=5",
        ));
        assert_eq!(cfg.cpu_count, 4);
        assert_eq!(cfg.algorithm, SchedAlgorithm::RoundRobin);
        assert_eq!(cfg.base_quantum, 3);
        assert_eq!(cfg.tick_hz, 1000);
        assert!(!cfg.preemption);
        assert_eq!(cfg.balance_interval, 8);
        assert_eq!(cfg.imbalance_threshold, 1);
        assert_eq!(cfg.priority_quantum_bonus, 5);
    }

    #[test]
    fn test_malformed_values_are_clamped_or_ignored() {
        let cfg = SchedConfig::from_cmdline(Some(
            "sched.cpus=0 sched.algo=lottery sched.quantum=abc sched.preempt=maybe sched.hz=0",
        ));
        assert_eq!(cfg.cpu_count, 1);
        assert_eq!(cfg.algorithm, SchedAlgorithm::Priority);
        assert_eq!(cfg.base_quantum, DEFAULT_BASE_QUANTUM);
        assert!(cfg.preemption);
        assert_eq!(cfg.tick_hz, 1);

        assert_eq!(SchedConfig::with_cpus(1000).cpu_count, MAX_CPUS);
    }
}
