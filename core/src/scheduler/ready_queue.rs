//! Per-priority FIFO ready queues.
//!
//! One `ReadyQueues` set exists for the global scope and one per CPU. Each
//! level is a bounded ring, so a full level is reported instead of growing.

use kairos_abi::task::{INVALID_TASK_ID, NUM_PRIORITY_LEVELS, READY_QUEUE_CAPACITY, TaskId};
use kairos_lib::RingBuffer;

type LevelQueue = RingBuffer<TaskId, READY_QUEUE_CAPACITY>;

const EMPTY_LEVEL: LevelQueue = RingBuffer::new_with(INVALID_TASK_ID);

pub struct ReadyQueues {
    levels: [LevelQueue; NUM_PRIORITY_LEVELS],
}

impl ReadyQueues {
    pub const fn new() -> Self {
        Self {
            levels: [EMPTY_LEVEL; NUM_PRIORITY_LEVELS],
        }
    }

    #[inline]
    fn level(priority: u8) -> usize {
        (priority as usize).min(NUM_PRIORITY_LEVELS - 1)
    }

    /// Append `task` to its level. False when that level is full.
    pub fn push(&mut self, priority: u8, task: TaskId) -> bool {
        self.levels[Self::level(priority)].try_push(task)
    }

    /// Put `task` back at the head of its level.
    pub fn push_front(&mut self, priority: u8, task: TaskId) -> bool {
        self.levels[Self::level(priority)].try_push_front(task)
    }

    /// Lowest-numbered (highest-priority) non-empty level.
    pub fn highest_level(&self) -> Option<u8> {
        self.levels
            .iter()
            .position(|q| !q.is_empty())
            .map(|level| level as u8)
    }

    /// Pop the head of the highest-priority non-empty level.
    pub fn pop_highest(&mut self) -> Option<(u8, TaskId)> {
        let level = self.highest_level()?;
        self.levels[level as usize]
            .try_pop()
            .map(|task| (level, task))
    }

    /// Remove the first task of `priority` that satisfies `pred`, leaving
    /// skipped tasks in place.
    pub fn take_first(
        &mut self,
        priority: u8,
        mut pred: impl FnMut(TaskId) -> bool,
    ) -> Option<TaskId> {
        self.levels[Self::level(priority)].remove_first(|&queued| pred(queued))
    }

    pub fn remove(&mut self, priority: u8, task: TaskId) -> bool {
        self.levels[Self::level(priority)]
            .remove_first(|&queued| queued == task)
            .is_some()
    }

    pub fn contains(&self, task: TaskId) -> bool {
        self.levels.iter().any(|q| q.contains(&task))
    }

    pub fn len(&self) -> u32 {
        self.levels.iter().map(|q| q.len()).sum()
    }

    pub fn level_len(&self, priority: u8) -> u32 {
        self.levels[Self::level(priority)].len()
    }

    pub fn is_empty(&self) -> bool {
        self.levels.iter().all(|q| q.is_empty())
    }

    pub fn clear(&mut self) {
        for level in self.levels.iter_mut() {
            level.reset();
        }
    }
}

impl Default for ReadyQueues {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_highest_level_wins_and_fifo_within_level() {
        let mut q = ReadyQueues::new();
        assert!(q.push(5, 1));
        assert!(q.push(2, 2));
        assert!(q.push(2, 3));
        assert!(q.push(0, 4));
        assert_eq!(q.len(), 4);
        assert_eq!(q.pop_highest(), Some((0, 4)));
        assert_eq!(q.pop_highest(), Some((2, 2)));
        assert_eq!(q.pop_highest(), Some((2, 3)));
        assert_eq!(q.pop_highest(), Some((5, 1)));
        assert_eq!(q.pop_highest(), None);
        assert!(q.is_empty());
    }

    #[test]
    fn test_full_level_rejects_without_touching_others() {
        let mut q = ReadyQueues::new();
        for id in 0..READY_QUEUE_CAPACITY as TaskId {
            assert!(q.push(3, id + 1));
        }
        assert!(!q.push(3, 999));
        assert!(!q.contains(999));
        assert!(q.push(4, 999));
        assert_eq!(q.level_len(3), READY_QUEUE_CAPACITY as u32);
    }

    #[test]
    fn test_remove_and_push_front() {
        let mut q = ReadyQueues::new();
        q.push(1, 10);
        q.push(1, 11);
        q.push(1, 12);
        assert!(q.remove(1, 11));
        assert!(!q.remove(1, 11));
        let (_, head) = q.pop_highest().unwrap();
        assert!(q.push_front(1, head));
        assert_eq!(q.pop_highest(), Some((1, 10)));
        assert_eq!(q.pop_highest(), Some((1, 12)));
    }

    #[test]
    fn test_take_first_skips_without_reordering() {
        let mut q = ReadyQueues::new();
        for id in [1, 2, 3] {
            q.push(0, id);
        }
        assert_eq!(q.take_first(0, |id| id != 1), Some(2));
        assert_eq!(q.take_first(0, |_| false), None);
        assert_eq!(q.pop_highest(), Some((0, 1)));
        assert_eq!(q.pop_highest(), Some((0, 3)));
    }
}
