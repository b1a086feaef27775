//! Architecture seam for execution contexts.
//!
//! The scheduler owns every task's context and stack but never looks inside
//! them. Building an initial frame and swapping register state belong to the
//! architecture layer that implements [`ContextSwitch`].

/// Entry point of a task. The `usize` is the opaque argument given at creation.
pub type TaskEntry = fn(usize);

pub trait ContextSwitch: Send + Sync {
    /// Saved register state of one task. `Default` is an empty save area
    /// (used for the boot flow of each CPU before its first task runs).
    type Context: Default + Send;

    /// Build the context a new task starts from: running `entry(arg)` on the
    /// stack whose highest usable address is `stack_top`.
    fn setup_context(&self, entry: TaskEntry, arg: usize, stack_top: usize) -> Self::Context;

    /// Save the running state into `from` and resume `to`.
    ///
    /// Returns once the task that owned `from` is switched back in. A null
    /// `from` means the outgoing task has terminated and is never resumed.
    ///
    /// # Safety
    ///
    /// `to` must point to a context built by `setup_context` or saved by an
    /// earlier switch, and both pointers must stay valid until the switch
    /// completes. The scheduler calls this with no lock held.
    unsafe fn switch(&self, from: *mut Self::Context, to: *const Self::Context);

    /// Park the CPU for good. Reached only if a terminated task is ever
    /// resumed.
    fn halt(&self) -> !;
}
