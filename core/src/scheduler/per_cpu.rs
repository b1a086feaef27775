//! Per-CPU scheduler state.
//!
//! Each CPU has its own local run queues, current/idle task ids, and
//! counters.
//!
//! # Safety Model
//!
//! `PerCpuScheduler` uses interior mutability throughout so that all APIs
//! take `&self`.
//!
//! - Atomic fields: direct load/store (lock-free). Only the owning CPU
//!   writes `current`.
//! - `prev_task`: written by the owning CPU when it switches away, cleared
//!   once the next scheduling decision on that CPU has finished the switch.
//! - `queues`: guarded by its own lock, always taken after the global
//!   scheduler lock.
//! - `boot_context`: the save area for the CPU's boot flow, written only by
//!   the owning CPU while it switches to its first task.

use core::cell::UnsafeCell;
use core::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use kairos_abi::task::{CpuId, INVALID_TASK_ID, TaskId};
use spin::{Mutex, MutexGuard};

use super::ready_queue::ReadyQueues;

#[repr(align(64))]
pub struct PerCpuScheduler<C> {
    pub cpu_id: CpuId,
    queues: Mutex<ReadyQueues>,
    current_task: AtomicU32,
    idle_task: AtomicU32,
    /// Task switched away from whose switch is not yet known to be complete.
    prev_task: AtomicU32,
    active: AtomicBool,
    pub context_switches: AtomicU64,
    pub idle_ticks: AtomicU64,
    pub schedule_calls: AtomicU64,
    boot_context: UnsafeCell<C>,
}

// SAFETY: `boot_context` is only accessed by the owning CPU (see module docs);
// everything else is atomic or lock-protected.
unsafe impl<C: Send> Send for PerCpuScheduler<C> {}
unsafe impl<C: Send> Sync for PerCpuScheduler<C> {}

#[inline]
fn decode(raw: u32) -> Option<TaskId> {
    (raw != INVALID_TASK_ID).then_some(raw)
}

impl<C: Default> PerCpuScheduler<C> {
    pub fn new(cpu_id: CpuId) -> Self {
        Self {
            cpu_id,
            queues: Mutex::new(ReadyQueues::new()),
            current_task: AtomicU32::new(INVALID_TASK_ID),
            idle_task: AtomicU32::new(INVALID_TASK_ID),
            prev_task: AtomicU32::new(INVALID_TASK_ID),
            active: AtomicBool::new(false),
            context_switches: AtomicU64::new(0),
            idle_ticks: AtomicU64::new(0),
            schedule_calls: AtomicU64::new(0),
            boot_context: UnsafeCell::new(C::default()),
        }
    }
}

impl<C> PerCpuScheduler<C> {
    #[inline]
    pub fn current_task(&self) -> Option<TaskId> {
        decode(self.current_task.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set_current_task(&self, task: Option<TaskId>) {
        self.current_task
            .store(task.unwrap_or(INVALID_TASK_ID), Ordering::Release);
    }

    #[inline]
    pub fn idle_task(&self) -> Option<TaskId> {
        decode(self.idle_task.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set_idle_task(&self, task: TaskId) {
        self.idle_task.store(task, Ordering::Release);
    }

    #[inline]
    pub fn is_idle_task(&self, task: TaskId) -> bool {
        self.idle_task() == Some(task)
    }

    #[inline]
    pub fn prev_task(&self) -> Option<TaskId> {
        decode(self.prev_task.load(Ordering::Acquire))
    }

    #[inline]
    pub fn set_prev_task(&self, task: Option<TaskId>) {
        self.prev_task
            .store(task.unwrap_or(INVALID_TASK_ID), Ordering::Release);
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    #[inline]
    pub fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::Release);
    }

    #[inline]
    pub fn queues(&self) -> MutexGuard<'_, ReadyQueues> {
        self.queues.lock()
    }

    pub fn ready_count(&self) -> u32 {
        self.queues.lock().len()
    }

    #[inline]
    pub(crate) fn boot_context_ptr(&self) -> *mut C {
        self.boot_context.get()
    }

    pub fn info(&self) -> CpuInfo {
        CpuInfo {
            cpu_id: self.cpu_id,
            active: self.is_active(),
            current_task: self.current_task(),
            idle_task: self.idle_task(),
            ready_local: self.ready_count(),
            context_switches: self.context_switches.load(Ordering::Relaxed),
            idle_ticks: self.idle_ticks.load(Ordering::Relaxed),
            schedule_calls: self.schedule_calls.load(Ordering::Relaxed),
        }
    }
}

/// Snapshot of one CPU's scheduling state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CpuInfo {
    pub cpu_id: CpuId,
    pub active: bool,
    pub current_task: Option<TaskId>,
    pub idle_task: Option<TaskId>,
    pub ready_local: u32,
    pub context_switches: u64,
    pub idle_ticks: u64,
    pub schedule_calls: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fresh_cpu_has_no_tasks() {
        let cpu: PerCpuScheduler<u64> = PerCpuScheduler::new(3);
        let info = cpu.info();
        assert_eq!(info.cpu_id, 3);
        assert!(!info.active);
        assert_eq!(info.current_task, None);
        assert_eq!(info.idle_task, None);
        assert_eq!(info.ready_local, 0);
    }

    #[test]
    fn test_current_and_idle_round_trip() {
        let cpu: PerCpuScheduler<u64> = PerCpuScheduler::new(0);
        cpu.set_idle_task(9);
        cpu.set_current_task(Some(9));
        assert!(cpu.is_idle_task(9));
        assert_eq!(cpu.current_task(), Some(9));
        cpu.set_current_task(None);
        assert_eq!(cpu.current_task(), None);
        cpu.queues().push(2, 4);
        assert_eq!(cpu.ready_count(), 1);
    }
}
