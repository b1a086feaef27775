//! Scheduling error codes.
//!
//! Every fallible scheduler and lock operation returns [`SchedResult`].
//! Kernel consumers that speak C-style result codes use
//! [`SchedError::to_errno`].

pub const ERRNO_ESRCH: i32 = 3;
pub const ERRNO_ECHILD: i32 = 10;
pub const ERRNO_EAGAIN: i32 = 11;
pub const ERRNO_ENOMEM: i32 = 12;
pub const ERRNO_EPERM: i32 = 1;
pub const ERRNO_EBUSY: i32 = 16;
pub const ERRNO_EINVAL: i32 = 22;
pub const ERRNO_ENOSYS: i32 = 38;

/// Result type for scheduling operations.
pub type SchedResult<T> = Result<T, SchedError>;

/// Errors that can occur during scheduling operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SchedError {
    /// Task, stack, or list-node allocation failed (ENOMEM)
    OutOfMemory,
    /// A global ready queue is at capacity (EAGAIN)
    QueueFull,
    /// A per-CPU local ready queue is at capacity (EAGAIN)
    CpuQueueFull,
    /// No task with the given id exists (ESRCH)
    NotFound,
    /// The task is not a child of the caller (ECHILD)
    NotAChild,
    /// Non-blocking request could not complete without blocking (EAGAIN)
    WouldBlock,
    /// The task is not in the BLOCKED state
    NotBlocked,
    /// Caller does not own the lock it tries to release (EPERM)
    NotOwner,
    /// CPU index outside the configured range (EINVAL)
    InvalidCpu,
    /// Operation needs a current task and the CPU has none
    NoCurrentTask,
    /// Operation is not permitted on an idle task (EPERM)
    IdleTask,
    /// The task's state does not allow the requested transition (EBUSY)
    InvalidState,
    /// Operation is not available in the current mode (ENOSYS)
    Unsupported,
}

impl SchedError {
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::OutOfMemory => "out of memory",
            Self::QueueFull => "ready queue full",
            Self::CpuQueueFull => "per-CPU ready queue full",
            Self::NotFound => "no such task",
            Self::NotAChild => "not a child of the caller",
            Self::WouldBlock => "operation would block",
            Self::NotBlocked => "task is not blocked",
            Self::NotOwner => "caller does not own the lock",
            Self::InvalidCpu => "invalid CPU",
            Self::NoCurrentTask => "no current task",
            Self::IdleTask => "operation not permitted on idle task",
            Self::InvalidState => "invalid task state",
            Self::Unsupported => "unsupported operation",
        }
    }

    /// Negative result code for C-style callers.
    pub const fn to_errno(self) -> i32 {
        let errno = match self {
            Self::OutOfMemory => ERRNO_ENOMEM,
            Self::QueueFull | Self::CpuQueueFull | Self::WouldBlock => ERRNO_EAGAIN,
            Self::NotFound | Self::NoCurrentTask => ERRNO_ESRCH,
            Self::NotAChild => ERRNO_ECHILD,
            Self::NotOwner | Self::IdleTask => ERRNO_EPERM,
            Self::InvalidState => ERRNO_EBUSY,
            Self::NotBlocked | Self::InvalidCpu => ERRNO_EINVAL,
            Self::Unsupported => ERRNO_ENOSYS,
        };
        -errno
    }
}

impl core::fmt::Display for SchedError {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_errno_is_negative() {
        assert_eq!(SchedError::OutOfMemory.to_errno(), -ERRNO_ENOMEM);
        assert_eq!(SchedError::NotAChild.to_errno(), -ERRNO_ECHILD);
        assert_eq!(SchedError::WouldBlock.to_errno(), -ERRNO_EAGAIN);
        assert_eq!(SchedError::QueueFull.to_errno(), -ERRNO_EAGAIN);
        assert!(SchedError::Unsupported.to_errno() < 0);
    }
}
