//! Fixed-capacity set of tasks parked on one primitive.

use kairos_abi::task::{BlockReason, INVALID_TASK_ID, TaskId};

use super::TaskControl;

/// Waiters a single primitive can park. Beyond this, waiters poll.
pub const PARKED_CAPACITY: usize = 32;

pub(crate) struct ParkedSet {
    slots: [TaskId; PARKED_CAPACITY],
    count: usize,
}

impl ParkedSet {
    pub(crate) const fn new() -> Self {
        Self {
            slots: [INVALID_TASK_ID; PARKED_CAPACITY],
            count: 0,
        }
    }

    #[inline]
    pub(crate) fn len(&self) -> usize {
        self.count
    }

    pub(crate) fn contains(&self, task: TaskId) -> bool {
        task != INVALID_TASK_ID && self.slots.contains(&task)
    }

    /// False when the set is full.
    fn insert(&mut self, task: TaskId) -> bool {
        if self.contains(task) {
            return true;
        }
        match self.slots.iter_mut().find(|slot| **slot == INVALID_TASK_ID) {
            Some(slot) => {
                *slot = task;
                self.count += 1;
                true
            }
            None => false,
        }
    }

    pub(crate) fn remove(&mut self, task: TaskId) -> bool {
        match self.slots.iter_mut().find(|slot| **slot == task) {
            Some(slot) if task != INVALID_TASK_ID => {
                *slot = INVALID_TASK_ID;
                self.count -= 1;
                true
            }
            _ => false,
        }
    }

    /// Record the current task and mark it blocked. Must run with the
    /// owning primitive's lock held. On `false` the caller polls instead.
    pub(crate) fn park(&mut self, ctl: &dyn TaskControl, reason: BlockReason) -> bool {
        let Some(me) = ctl.current_task() else {
            return false;
        };
        if !self.insert(me) {
            return false;
        }
        if ctl.prepare_block(reason).is_err() {
            self.remove(me);
            return false;
        }
        true
    }

    /// Empty the set. Wake the batch after dropping the primitive's lock.
    pub(crate) fn take_all(&mut self) -> WakeBatch {
        let batch = WakeBatch {
            tasks: self.slots,
            len: self.count,
        };
        self.slots = [INVALID_TASK_ID; PARKED_CAPACITY];
        self.count = 0;
        batch
    }
}

pub(crate) struct WakeBatch {
    tasks: [TaskId; PARKED_CAPACITY],
    len: usize,
}

impl WakeBatch {
    #[inline]
    pub(crate) fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub(crate) fn wake(self, ctl: &dyn TaskControl) {
        if self.is_empty() {
            return;
        }
        for &task in self.tasks.iter().filter(|&&t| t != INVALID_TASK_ID) {
            // Gone or already woken: nothing to do.
            let _ = ctl.unblock(task);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeControl;

    #[test]
    fn test_park_blocks_current_once() {
        let ctl = FakeControl::new(Some(3));
        let mut set = ParkedSet::new();
        assert!(set.park(&ctl, BlockReason::MutexWait));
        assert!(set.park(&ctl, BlockReason::MutexWait));
        assert_eq!(set.len(), 1);
        assert!(set.contains(3));
        assert_eq!(ctl.blocked(), [(3, BlockReason::MutexWait); 2]);
    }

    #[test]
    fn test_park_falls_back_when_block_refused_or_full() {
        let ctl = FakeControl::new(Some(9));
        ctl.refuse_blocks(true);
        let mut set = ParkedSet::new();
        assert!(!set.park(&ctl, BlockReason::SemaphoreWait));
        assert_eq!(set.len(), 0);

        for id in 100..100 + PARKED_CAPACITY as TaskId {
            assert!(set.insert(id));
        }
        ctl.refuse_blocks(false);
        assert!(!set.park(&ctl, BlockReason::SemaphoreWait));
        assert!(!set.contains(9));

        let none = FakeControl::new(None);
        assert!(!ParkedSet::new().park(&none, BlockReason::SemaphoreWait));
    }

    #[test]
    fn test_take_all_wakes_everyone_and_empties() {
        let ctl = FakeControl::new(Some(1));
        let mut set = ParkedSet::new();
        set.insert(4);
        set.insert(7);
        set.remove(4);
        set.insert(8);
        set.take_all().wake(&ctl);
        assert_eq!(set.len(), 0);
        let mut woken = ctl.unblocked();
        woken.sort_unstable();
        assert_eq!(woken, [7, 8]);
    }
}
