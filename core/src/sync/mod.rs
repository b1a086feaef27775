//! Blocking primitives for kernel tasks.
//!
//! None of these own the tasks they block. A contended primitive records the
//! waiter's id in a small parked set, marks it blocked through
//! [`TaskControl`], and reschedules; a release wakes every parked waiter and
//! they race to re-check. There is no FIFO hand-off and no timeout.

mod condvar;
mod mutex;
mod parked;
mod semaphore;
mod spinlock;

pub use condvar::CondVar;
pub use mutex::{Mutex, MutexGuard};
pub use parked::PARKED_CAPACITY;
pub use semaphore::Semaphore;
pub use spinlock::{Spinlock, SpinlockGuard};

use kairos_abi::SchedResult;
use kairos_abi::task::{BlockReason, TaskId};

/// What a blocking primitive needs from the scheduler, for one CPU.
pub trait TaskControl {
    /// Task running on this CPU, if any.
    fn current_task(&self) -> Option<TaskId>;

    fn yield_now(&self);

    /// Mark the current task blocked without switching away. Called while
    /// the primitive's own lock is held, after the task is recorded as a
    /// waiter.
    fn prepare_block(&self, reason: BlockReason) -> SchedResult<()>;

    /// Switch away from a task marked by `prepare_block`. Returns once the
    /// task runs again.
    fn commit_block(&self);

    /// Make a blocked task ready. Tasks in any other state are left alone.
    fn unblock(&self, task: TaskId) -> SchedResult<()>;
}
