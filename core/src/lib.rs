//! Kairos scheduling core.
//!
//! `scheduler` owns tasks, ready queues, sleeping and waiting lists, and the
//! per-CPU scheduling decision. `sync` holds the blocking primitives the rest
//! of the kernel builds on; they reach the scheduler only through
//! [`sync::TaskControl`].

#![no_std]

#[cfg(test)]
extern crate std;

extern crate alloc;

pub mod scheduler;
pub mod sync;

#[cfg(test)]
pub(crate) mod testing;

pub use scheduler::{
    ContextSwitch, CpuHandle, SchedConfig, ScheduleOutcome, Scheduler, TaskEntry,
};
pub use sync::{CondVar, Mutex, MutexGuard, Semaphore, Spinlock, SpinlockGuard, TaskControl};
