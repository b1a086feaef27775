//! Task ABI types shared between kernel subsystems.
//!
//! This module is the single source of truth for task-related types and
//! constants. The scheduler, the blocking primitives, and their consumers
//! import from here rather than defining their own copies.

use bitflags::bitflags;

// --- Task Configuration ---

pub type TaskId = u32;
pub type CpuId = usize;

pub const MAX_CPUS: usize = 64;
pub const TASK_STACK_SIZE: usize = 0x8000; // 32 KiB
pub const TASK_NAME_MAX_LEN: usize = 32;
pub const INVALID_TASK_ID: TaskId = 0xFFFF_FFFF;

/// Identity used by lock primitives before the first task runs on a CPU.
/// Real task ids start at 1, so this never collides with a task.
pub const BOOT_TASK_ID: TaskId = 0;

/// Capacity of one ready queue (one priority level in one scope).
pub const READY_QUEUE_CAPACITY: usize = 64;

// --- TaskStatus ---

/// Type-safe task status with explicit state-machine semantics.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum TaskStatus {
    /// Task slot is not in use (never created, or already reaped).
    #[default]
    Invalid = 0,
    /// Task is ready to run, waiting in a ready queue.
    Ready = 1,
    /// Task is currently executing on a CPU.
    Running = 2,
    /// Task is blocked waiting for some event.
    Blocked = 3,
    /// Task has terminated and waits for its parent to collect the exit code.
    Zombie = 4,
}

impl TaskStatus {
    #[inline]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::Ready,
            2 => Self::Running,
            3 => Self::Blocked,
            4 => Self::Zombie,
            _ => Self::Invalid,
        }
    }

    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }

    #[inline]
    pub const fn can_transition_to(self, target: Self) -> bool {
        match self {
            Self::Invalid => matches!(target, Self::Ready),
            Self::Ready => matches!(target, Self::Running | Self::Zombie),
            Self::Running => matches!(target, Self::Ready | Self::Blocked | Self::Zombie),
            Self::Blocked => matches!(target, Self::Ready | Self::Zombie),
            Self::Zombie => matches!(target, Self::Invalid),
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Invalid => "INVALID",
            Self::Ready => "READY",
            Self::Running => "RUNNING",
            Self::Blocked => "BLOCKED",
            Self::Zombie => "ZOMBIE",
        }
    }
}

// --- BlockReason ---

/// Reason why a task is in the Blocked state.
#[repr(u8)]
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum BlockReason {
    #[default]
    None = 0,
    /// Parent waiting for a specific child to terminate.
    WaitingOnChild = 1,
    Sleep = 2,
    IoWait = 3,
    MutexWait = 4,
    SemaphoreWait = 5,
    ConditionWait = 6,
    Generic = 7,
}

impl BlockReason {
    #[inline]
    pub const fn from_u8(value: u8) -> Self {
        match value {
            1 => Self::WaitingOnChild,
            2 => Self::Sleep,
            3 => Self::IoWait,
            4 => Self::MutexWait,
            5 => Self::SemaphoreWait,
            6 => Self::ConditionWait,
            7 => Self::Generic,
            _ => Self::None,
        }
    }

    #[inline]
    pub const fn as_u8(self) -> u8 {
        self as u8
    }
}

// --- Task Priority ---

/// Priority levels: 0 is the highest, `NUM_PRIORITY_LEVELS - 1` the lowest.
pub const NUM_PRIORITY_LEVELS: usize = 8;

pub const TASK_PRIORITY_HIGHEST: u8 = 0;
pub const TASK_PRIORITY_HIGH: u8 = 2;
pub const TASK_PRIORITY_NORMAL: u8 = 4;
pub const TASK_PRIORITY_LOW: u8 = 6;
pub const TASK_PRIORITY_IDLE: u8 = (NUM_PRIORITY_LEVELS - 1) as u8;

#[inline]
pub const fn clamp_priority(priority: u8) -> u8 {
    if priority as usize >= NUM_PRIORITY_LEVELS {
        TASK_PRIORITY_IDLE
    } else {
        priority
    }
}

// --- Task Flags ---

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct TaskFlags: u16 {
        const KERNEL_MODE = 0x01;
        const USER_MODE = 0x02;
        /// The timer tick never preempts this task; it runs until it yields or blocks.
        const NO_PREEMPT = 0x04;
        const SYSTEM = 0x08;
        /// Per-CPU idle task. Never enqueued, blocked, or terminated.
        const IDLE = 0x10;
    }
}

// --- Wait Options ---

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
    pub struct WaitOptions: u32 {
        /// Return `WouldBlock` instead of parking when the child is still alive.
        const NOHANG = 0x01;
    }
}

// --- Scheduling Algorithm ---

#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SchedAlgorithm {
    /// Fixed quantum for every task.
    RoundRobin,
    /// Base quantum plus a bonus that grows with priority.
    #[default]
    Priority,
    /// Accepted for configuration compatibility; computes quanta like `Priority`.
    FairShare,
    /// Accepted for configuration compatibility; computes quanta like `Priority`.
    Edf,
}

impl SchedAlgorithm {
    pub fn from_str(value: &str) -> Option<Self> {
        if value.eq_ignore_ascii_case("rr") || value.eq_ignore_ascii_case("round_robin") {
            Some(Self::RoundRobin)
        } else if value.eq_ignore_ascii_case("priority") {
            Some(Self::Priority)
        } else if value.eq_ignore_ascii_case("fair_share") {
            Some(Self::FairShare)
        } else if value.eq_ignore_ascii_case("edf") {
            Some(Self::Edf)
        } else {
            None
        }
    }

    pub const fn as_str(self) -> &'static str {
        match self {
            Self::RoundRobin => "round_robin",
            Self::Priority => "priority",
            Self::FairShare => "fair_share",
            Self::Edf => "edf",
        }
    }

    /// Whether the algorithm has its own quantum computation.
    pub const fn is_implemented(self) -> bool {
        matches!(self, Self::RoundRobin | Self::Priority)
    }
}

impl core::fmt::Display for SchedAlgorithm {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_transitions() {
        assert!(TaskStatus::Invalid.can_transition_to(TaskStatus::Ready));
        assert!(TaskStatus::Ready.can_transition_to(TaskStatus::Running));
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::Blocked));
        assert!(TaskStatus::Blocked.can_transition_to(TaskStatus::Ready));
        assert!(TaskStatus::Running.can_transition_to(TaskStatus::Zombie));
        assert!(!TaskStatus::Zombie.can_transition_to(TaskStatus::Ready));
        assert!(!TaskStatus::Blocked.can_transition_to(TaskStatus::Running));
        assert!(!TaskStatus::Ready.can_transition_to(TaskStatus::Blocked));
    }

    #[test]
    fn test_status_round_trips_through_u8() {
        for status in [
            TaskStatus::Invalid,
            TaskStatus::Ready,
            TaskStatus::Running,
            TaskStatus::Blocked,
            TaskStatus::Zombie,
        ] {
            assert_eq!(TaskStatus::from_u8(status.as_u8()), status);
        }
        assert_eq!(TaskStatus::from_u8(200), TaskStatus::Invalid);
    }

    #[test]
    fn test_clamp_priority() {
        assert_eq!(clamp_priority(0), 0);
        assert_eq!(clamp_priority(5), 5);
        assert_eq!(clamp_priority(NUM_PRIORITY_LEVELS as u8), TASK_PRIORITY_IDLE);
        assert_eq!(clamp_priority(u8::MAX), TASK_PRIORITY_IDLE);
    }

    #[test]
    fn test_algorithm_parsing() {
        assert_eq!(SchedAlgorithm::from_str("RR"), Some(SchedAlgorithm::RoundRobin));
        assert_eq!(
            SchedAlgorithm::from_str("round_robin"),
            Some(SchedAlgorithm::RoundRobin)
        );
        assert_eq!(SchedAlgorithm::from_str("edf"), Some(SchedAlgorithm::Edf));
        assert_eq!(SchedAlgorithm::from_str("lottery"), None);
        assert!(!SchedAlgorithm::FairShare.is_implemented());
        assert!(SchedAlgorithm::Priority.is_implemented());
    }
}
