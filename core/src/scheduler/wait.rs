//! Parent/child exit collection.
//!
//! A parent blocked in `waitpid` owns a slot in the waiting-parent list.
//! `terminate` fills every slot naming the dead child and wakes those
//! parents in the same critical section as the zombie transition.

use alloc::vec::Vec;

use kairos_abi::task::{BlockReason, CpuId, TaskId, WaitOptions};
use kairos_abi::{SchedError, SchedResult};
use kairos_lib::{Arena, ArenaIndex, klog_debug};

use super::context::ContextSwitch;
use super::scheduler::{SchedInner, Scheduler};

struct WaitNode {
    parent: TaskId,
    child: TaskId,
    /// Filled by the child's termination.
    exit_code: Option<i32>,
    next: Option<ArenaIndex>,
}

pub struct WaitList {
    nodes: Arena<WaitNode>,
    head: Option<ArenaIndex>,
}

impl WaitList {
    pub const fn new() -> Self {
        Self {
            nodes: Arena::new(),
            head: None,
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    fn find(&self, parent: TaskId, child: TaskId) -> Option<ArenaIndex> {
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            let node = self.nodes.get(idx)?;
            if node.parent == parent && node.child == child {
                return Some(idx);
            }
            cursor = node.next;
        }
        None
    }

    /// Slot for `parent` waiting on `child`, created if missing.
    pub fn register(&mut self, parent: TaskId, child: TaskId) -> SchedResult<ArenaIndex> {
        if let Some(idx) = self.find(parent, child) {
            return Ok(idx);
        }
        let idx = self
            .nodes
            .try_insert(WaitNode {
                parent,
                child,
                exit_code: None,
                next: self.head,
            })
            .map_err(|_| SchedError::OutOfMemory)?;
        self.head = Some(idx);
        Ok(idx)
    }

    /// Exit code recorded for `parent`'s slot on `child`, once filled.
    pub fn exit_code(&self, parent: TaskId, child: TaskId) -> Option<i32> {
        self.nodes.get(self.find(parent, child)?)?.exit_code
    }

    /// Record the exit of `child` in every slot waiting for it and return
    /// the parents to wake.
    pub fn complete(&mut self, child: TaskId, exit_code: i32) -> Vec<TaskId> {
        let mut parents = Vec::new();
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            let Some(node) = self.nodes.get_mut(idx) else {
                break;
            };
            if node.child == child && node.exit_code.is_none() {
                node.exit_code = Some(exit_code);
                parents.push(node.parent);
            }
            cursor = node.next;
        }
        parents
    }

    /// Keep only the slots for which `keep` holds.
    fn retain(&mut self, mut keep: impl FnMut(&WaitNode) -> bool) {
        let mut prev: Option<ArenaIndex> = None;
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            let Some(node) = self.nodes.get(idx) else {
                break;
            };
            let next = node.next;
            if keep(node) {
                prev = Some(idx);
            } else {
                match prev.and_then(|p| self.nodes.get_mut(p)) {
                    Some(prev_node) => prev_node.next = next,
                    None => self.head = next,
                }
                self.nodes.remove(idx);
            }
            cursor = next;
        }
    }

    pub fn remove(&mut self, parent: TaskId, child: TaskId) {
        self.retain(|n| !(n.parent == parent && n.child == child));
    }

    /// Drop every slot in which `task` is the parent or the child.
    pub fn remove_task(&mut self, task: TaskId) {
        self.retain(|n| n.parent != task && n.child != task);
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.head = None;
    }
}

impl Default for WaitList {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> SchedInner<C> {
    /// Remove a zombie from the task table. Its stack is dropped now if it
    /// never ran, otherwise at the next decision on the CPU it last ran on.
    pub(super) fn reap(&mut self, task: TaskId) {
        let Some(dead) = self.tasks.remove(&task) else {
            return;
        };
        self.waiters.remove_task(task);
        self.stats.tasks_reaped += 1;
        if dead.last_cpu.is_some() {
            self.graveyard.push(dead);
        }
        klog_debug!("SCHED: reaped task {}", task);
    }
}

impl<A: ContextSwitch> Scheduler<A> {
    /// Collect the exit code of `child`, a task created by the current task
    /// of `cpu`, blocking until it terminates unless `NOHANG` is given.
    pub fn waitpid(&self, cpu: CpuId, child: TaskId, options: WaitOptions) -> SchedResult<i32> {
        let pcpu = self.cpu_state(cpu)?;
        loop {
            {
                let mut inner = self.inner.lock();
                let me = pcpu.current_task().ok_or(SchedError::NoCurrentTask)?;
                let Some(c) = inner.tasks.get(&child) else {
                    inner.waiters.remove(me, child);
                    return Err(SchedError::NotFound);
                };
                if c.parent_id != Some(me) {
                    return Err(SchedError::NotAChild);
                }
                if c.is_zombie() {
                    let code = inner.waiters.exit_code(me, child).unwrap_or(c.exit_code);
                    inner.reap(child);
                    return Ok(code);
                }
                if options.contains(WaitOptions::NOHANG) {
                    return Err(SchedError::WouldBlock);
                }

                inner.waiters.register(me, child)?;
                if let Err(err) = self.block_locked(&mut inner, cpu, BlockReason::WaitingOnChild) {
                    inner.waiters.remove(me, child);
                    return Err(err);
                }
            }
            self.commit_block(cpu)?;
        }
    }

    /// Parents currently parked in `waitpid`.
    pub fn waiting_parents(&self) -> usize {
        self.inner.lock().waiters.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_register_is_idempotent_per_pair() {
        let mut list = WaitList::new();
        let a = list.register(1, 2).unwrap();
        list.complete(2, 11);
        let b = list.register(1, 2).unwrap();
        assert_eq!(a, b);
        assert_eq!(list.len(), 1);
        assert_eq!(list.exit_code(1, 2), Some(11));
        list.register(1, 3).unwrap();
        assert_eq!(list.len(), 2);
    }

    #[test]
    fn test_complete_fills_matching_slots_once() {
        let mut list = WaitList::new();
        list.register(1, 5).unwrap();
        list.register(2, 6).unwrap();
        assert_eq!(list.complete(5, 42), [1]);
        assert_eq!(list.exit_code(1, 5), Some(42));
        assert_eq!(list.exit_code(2, 6), None);
        assert!(list.complete(5, 7).is_empty());
        assert_eq!(list.exit_code(1, 5), Some(42));
    }

    #[test]
    fn test_remove_task_drops_both_roles() {
        let mut list = WaitList::new();
        list.register(1, 2).unwrap();
        list.register(2, 3).unwrap();
        list.register(4, 5).unwrap();
        list.remove_task(2);
        assert_eq!(list.len(), 1);
        assert_eq!(list.complete(5, 1), [4]);
        list.remove(4, 5);
        assert!(list.is_empty());
        assert_eq!(list.exit_code(4, 5), None);
    }
}
