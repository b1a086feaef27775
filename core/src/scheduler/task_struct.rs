//! Kernel-internal task structure.
//!
//! A `Task` lives in the scheduler's task table and is only touched with the
//! global scheduler lock held, so its fields are plain values. The
//! ABI-stable enums and constants remain in `kairos_abi::task`.

use alloc::boxed::Box;
use alloc::vec::Vec;

pub use kairos_abi::task::{
    BlockReason, CpuId, TASK_NAME_MAX_LEN, TaskFlags, TaskId, TaskStatus,
};
use kairos_abi::{SchedError, SchedResult};

/// Fixed-size, truncating copy of a task name.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct TaskName {
    bytes: [u8; TASK_NAME_MAX_LEN],
    len: u8,
}

impl TaskName {
    pub fn new(name: &str) -> Self {
        let mut len = name.len().min(TASK_NAME_MAX_LEN);
        while !name.is_char_boundary(len) {
            len -= 1;
        }
        let mut bytes = [0; TASK_NAME_MAX_LEN];
        bytes[..len].copy_from_slice(&name.as_bytes()[..len]);
        Self {
            bytes,
            len: len as u8,
        }
    }

    pub fn as_str(&self) -> &str {
        core::str::from_utf8(&self.bytes[..self.len as usize]).unwrap_or("")
    }
}

impl core::fmt::Debug for TaskName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        core::fmt::Debug::fmt(self.as_str(), f)
    }
}

impl core::fmt::Display for TaskName {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Where a queued task currently sits.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum QueueScope {
    Global,
    Local(CpuId),
}

pub struct Task<C> {
    pub task_id: TaskId,
    pub parent_id: Option<TaskId>,
    pub name: TaskName,
    status: TaskStatus,
    pub block_reason: BlockReason,
    pub priority: u8,
    pub flags: TaskFlags,
    /// Quantum granted at the last selection, in ticks.
    pub time_slice: u32,
    pub time_slice_remaining: u32,
    pub cpu_time_used: u64,
    pub last_run_time: u64,
    pub exit_code: i32,
    /// Pinned CPU. Pinned tasks use that CPU's local queues.
    pub home_cpu: Option<CpuId>,
    /// CPU whose current task this is right now.
    pub on_cpu: Option<CpuId>,
    pub last_cpu: Option<CpuId>,
    pub queued: Option<QueueScope>,
    pub context_switches: u64,
    pub yield_count: u64,
    pub migration_count: u32,
    pub(crate) context: Box<C>,
    _stack: Box<[u8]>,
}

impl<C> Task<C> {
    pub(crate) fn new(
        task_id: TaskId,
        name: &str,
        priority: u8,
        flags: TaskFlags,
        stack: Box<[u8]>,
        context: Box<C>,
    ) -> Self {
        Self {
            task_id,
            parent_id: None,
            name: TaskName::new(name),
            status: TaskStatus::Invalid,
            block_reason: BlockReason::None,
            priority,
            flags,
            time_slice: 0,
            time_slice_remaining: 0,
            cpu_time_used: 0,
            last_run_time: 0,
            exit_code: 0,
            home_cpu: None,
            on_cpu: None,
            last_cpu: None,
            queued: None,
            context_switches: 0,
            yield_count: 0,
            migration_count: 0,
            context,
            _stack: stack,
        }
    }

    #[inline]
    pub fn status(&self) -> TaskStatus {
        self.status
    }

    /// Apply `target` if the state machine allows it.
    pub fn try_transition_to(&mut self, target: TaskStatus) -> SchedResult<()> {
        if !self.status.can_transition_to(target) {
            return Err(SchedError::InvalidState);
        }
        self.status = target;
        Ok(())
    }

    #[inline]
    pub fn mark_ready(&mut self) -> SchedResult<()> {
        self.try_transition_to(TaskStatus::Ready)?;
        self.block_reason = BlockReason::None;
        Ok(())
    }

    #[inline]
    pub fn mark_running(&mut self) -> SchedResult<()> {
        self.try_transition_to(TaskStatus::Running)
    }

    /// Block the task. A task that was woken while still on its CPU is
    /// `Ready` but never left it, so it may block again directly.
    pub fn block(&mut self, reason: BlockReason) -> SchedResult<()> {
        match self.status {
            TaskStatus::Blocked => {}
            TaskStatus::Ready if self.on_cpu.is_some() => self.status = TaskStatus::Blocked,
            _ => self.try_transition_to(TaskStatus::Blocked)?,
        }
        self.block_reason = reason;
        Ok(())
    }

    pub fn terminate(&mut self, exit_code: i32) -> SchedResult<()> {
        self.try_transition_to(TaskStatus::Zombie)?;
        self.exit_code = exit_code;
        self.block_reason = BlockReason::None;
        Ok(())
    }

    /// Put a `Running` or `Ready` task back to running state after a failed
    /// re-queue.
    pub(crate) fn resume_running(&mut self) {
        if matches!(self.status, TaskStatus::Ready | TaskStatus::Running) {
            self.status = TaskStatus::Running;
        }
    }

    /// Undo a wakeup whose enqueue failed.
    pub(crate) fn restore_blocked(&mut self, reason: BlockReason) {
        self.status = TaskStatus::Blocked;
        self.block_reason = reason;
    }

    /// Back out of a block that was never committed.
    pub(crate) fn cancel_block(&mut self) {
        if self.status == TaskStatus::Blocked {
            self.status = TaskStatus::Running;
            self.block_reason = BlockReason::None;
        }
    }

    /// Idle tasks flip between running and ready without ever being queued.
    pub(crate) fn set_idle_status(&mut self, running: bool) {
        self.status = if running {
            TaskStatus::Running
        } else {
            TaskStatus::Ready
        };
    }

    #[inline]
    pub fn is_blocked(&self) -> bool {
        self.status == TaskStatus::Blocked
    }

    #[inline]
    pub fn is_ready(&self) -> bool {
        self.status == TaskStatus::Ready
    }

    #[inline]
    pub fn is_running(&self) -> bool {
        self.status == TaskStatus::Running
    }

    #[inline]
    pub fn is_zombie(&self) -> bool {
        self.status == TaskStatus::Zombie
    }

    #[inline]
    pub fn is_idle(&self) -> bool {
        self.flags.contains(TaskFlags::IDLE)
    }

    #[inline]
    pub fn is_preemptible(&self) -> bool {
        !self.flags.contains(TaskFlags::NO_PREEMPT)
    }

    pub fn info(&self) -> TaskInfo {
        TaskInfo {
            task_id: self.task_id,
            parent_id: self.parent_id,
            name: self.name,
            status: self.status,
            block_reason: self.block_reason,
            priority: self.priority,
            flags: self.flags,
            time_slice: self.time_slice,
            time_slice_remaining: self.time_slice_remaining,
            cpu_time_used: self.cpu_time_used,
            last_run_time: self.last_run_time,
            exit_code: self.is_zombie().then_some(self.exit_code),
            home_cpu: self.home_cpu,
            last_cpu: self.last_cpu,
            context_switches: self.context_switches,
            yield_count: self.yield_count,
            migration_count: self.migration_count,
        }
    }
}

/// Allocate a zeroed stack without aborting on exhaustion.
pub(crate) fn alloc_stack(size: usize) -> SchedResult<Box<[u8]>> {
    let mut stack = Vec::new();
    stack
        .try_reserve_exact(size)
        .map_err(|_| SchedError::OutOfMemory)?;
    stack.resize(size, 0);
    Ok(stack.into_boxed_slice())
}

/// Snapshot of a task for queries and diagnostics.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct TaskInfo {
    pub task_id: TaskId,
    pub parent_id: Option<TaskId>,
    pub name: TaskName,
    pub status: TaskStatus,
    pub block_reason: BlockReason,
    pub priority: u8,
    pub flags: TaskFlags,
    pub time_slice: u32,
    pub time_slice_remaining: u32,
    pub cpu_time_used: u64,
    pub last_run_time: u64,
    /// Set only once the task is a zombie.
    pub exit_code: Option<i32>,
    pub home_cpu: Option<CpuId>,
    pub last_cpu: Option<CpuId>,
    pub context_switches: u64,
    pub yield_count: u64,
    pub migration_count: u32,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn task() -> Task<()> {
        Task::new(
            1,
            "t",
            4,
            TaskFlags::KERNEL_MODE,
            Vec::new().into_boxed_slice(),
            Box::new(()),
        )
    }

    #[test]
    fn test_name_truncates_on_char_boundary() {
        let long = "ééééééééééééééééééééé";
        let name = TaskName::new(long);
        assert!(name.as_str().len() <= TASK_NAME_MAX_LEN);
        assert!(long.starts_with(name.as_str()));
        assert_eq!(TaskName::new("worker").as_str(), "worker");
    }

    #[test]
    fn test_transitions_follow_state_machine() {
        let mut t = task();
        assert_eq!(t.mark_running(), Err(SchedError::InvalidState));
        t.mark_ready().unwrap();
        t.mark_running().unwrap();
        t.block(BlockReason::Sleep).unwrap();
        assert!(t.is_blocked());
        assert_eq!(t.block_reason, BlockReason::Sleep);
        t.mark_ready().unwrap();
        assert_eq!(t.block_reason, BlockReason::None);
        t.terminate(7).unwrap();
        assert_eq!(t.info().exit_code, Some(7));
        assert_eq!(t.terminate(8), Err(SchedError::InvalidState));
    }

    #[test]
    fn test_ready_task_still_on_cpu_may_block_again() {
        let mut t = task();
        t.mark_ready().unwrap();
        assert_eq!(t.block(BlockReason::MutexWait), Err(SchedError::InvalidState));
        t.on_cpu = Some(0);
        t.block(BlockReason::MutexWait).unwrap();
        assert!(t.is_blocked());
    }
}
