//! Timed sleep and early wake.
//!
//! Sleepers sit in a deadline-ordered list linked through arena indices.
//! Each scheduling decision drains the due prefix, so wake time is a lower
//! bound: a sleeper becomes ready at the first decision at or after its
//! deadline tick.

use kairos_abi::task::{BlockReason, CpuId, TaskId};
use kairos_abi::{SchedError, SchedResult};
use kairos_lib::{Arena, ArenaIndex};

use super::context::ContextSwitch;
use super::per_cpu::PerCpuScheduler;
use super::scheduler::{SchedInner, Scheduler};

#[inline]
pub(crate) fn tick_reached(now_tick: u64, deadline_tick: u64) -> bool {
    now_tick.wrapping_sub(deadline_tick) < (1u64 << 63)
}

#[inline]
fn tick_before(a: u64, b: u64) -> bool {
    (a.wrapping_sub(b) as i64) < 0
}

/// Round up to whole ticks. Any non-zero duration sleeps at least one tick.
pub(crate) fn ms_to_ticks(ms: u32, tick_hz: u32) -> u64 {
    if ms == 0 {
        return 0;
    }
    let ticks = (ms as u64)
        .saturating_mul(tick_hz.max(1) as u64)
        .saturating_add(999)
        / 1000;
    ticks.max(1)
}

struct SleepNode {
    task: TaskId,
    wake_tick: u64,
    next: Option<ArenaIndex>,
}

pub struct SleepList {
    nodes: Arena<SleepNode>,
    head: Option<ArenaIndex>,
}

impl SleepList {
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

    /// Insert `task` in deadline order, after any entry with the same
    /// deadline. An existing entry for `task` is replaced.
    pub fn insert(&mut self, task: TaskId, wake_tick: u64) -> SchedResult<()> {
        self.remove(task);

        let mut prev = None;
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            let Some(node) = self.nodes.get(idx) else {
                break;
            };
            if tick_before(wake_tick, node.wake_tick) {
                break;
            }
            prev = Some(idx);
            cursor = node.next;
        }

        let idx = self
            .nodes
            .try_insert(SleepNode {
                task,
                wake_tick,
                next: cursor,
            })
            .map_err(|_| SchedError::OutOfMemory)?;
        match prev.and_then(|p| self.nodes.get_mut(p)) {
            Some(node) => node.next = Some(idx),
            None => self.head = Some(idx),
        }
        Ok(())
    }

    pub fn remove(&mut self, task: TaskId) -> bool {
        let mut prev: Option<ArenaIndex> = None;
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            let Some(node) = self.nodes.get(idx) else {
                return false;
            };
            let next = node.next;
            if node.task == task {
                match prev.and_then(|p| self.nodes.get_mut(p)) {
                    Some(prev_node) => prev_node.next = next,
                    None => self.head = next,
                }
                self.nodes.remove(idx);
                return true;
            }
            prev = Some(idx);
            cursor = next;
        }
        false
    }

    /// Earliest sleeper and its deadline.
    pub fn peek(&self) -> Option<(TaskId, u64)> {
        let node = self.nodes.get(self.head?)?;
        Some((node.task, node.wake_tick))
    }

    pub fn pop_front(&mut self) -> Option<(TaskId, u64)> {
        let idx = self.head?;
        let node = self.nodes.remove(idx)?;
        self.head = node.next;
        Some((node.task, node.wake_tick))
    }

    pub fn deadline_of(&self, task: TaskId) -> Option<u64> {
        self.iter()
            .find(|&(t, _)| t == task)
            .map(|(_, wake_tick)| wake_tick)
    }

    pub fn iter(&self) -> impl Iterator<Item = (TaskId, u64)> + '_ {
        let mut cursor = self.head;
        core::iter::from_fn(move || {
            let node = self.nodes.get(cursor?)?;
            cursor = node.next;
            Some((node.task, node.wake_tick))
        })
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.head = None;
    }
}

impl Default for SleepList {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> SchedInner<C> {
    /// Ready every sleeper whose deadline has passed, earliest first.
    /// Stops at the first one that cannot be queued; it stays listed.
    pub(super) fn wake_due_sleepers(&mut self, cpus: &[PerCpuScheduler<C>], now: u64) {
        while let Some((task, wake_tick)) = self.sleepers.peek() {
            if !tick_reached(now, wake_tick) {
                break;
            }
            let sleeping = self
                .tasks
                .get(&task)
                .is_some_and(|t| t.is_blocked() && t.block_reason == BlockReason::Sleep);
            if sleeping && self.make_ready(cpus, task).is_err() {
                break;
            }
            self.sleepers.pop_front();
        }
    }
}

impl<A: ContextSwitch> Scheduler<A> {
    /// Block the current task of `cpu` for at least `ms` milliseconds.
    /// Zero just yields.
    pub fn sleep_ms(&self, cpu: CpuId, ms: u32) -> SchedResult<()> {
        if ms == 0 {
            self.yield_now(cpu)?;
            return Ok(());
        }
        let wake_tick = self
            .now()
            .wrapping_add(ms_to_ticks(ms, self.config.tick_hz));
        let id = {
            let mut inner = self.inner.lock();
            let id = self.block_locked(&mut inner, cpu, BlockReason::Sleep)?;
            if let Err(err) = inner.sleepers.insert(id, wake_tick) {
                if let Some(task) = inner.tasks.get_mut(&id) {
                    task.cancel_block();
                }
                return Err(err);
            }
            id
        };
        if let Err(err) = self.commit_block(cpu) {
            self.inner.lock().sleepers.remove(id);
            return Err(err);
        }
        Ok(())
    }

    /// Wake a sleeping task before its deadline.
    pub fn wake(&self, task: TaskId) -> SchedResult<()> {
        let mut inner = self.inner.lock();
        let t = inner.tasks.get(&task).ok_or(SchedError::NotFound)?;
        if !(t.is_blocked() && t.block_reason == BlockReason::Sleep) {
            return Err(SchedError::NotBlocked);
        }
        inner.make_ready(&self.cpus, task)?;
        inner.sleepers.remove(task);
        Ok(())
    }

    pub fn sleeping_count(&self) -> usize {
        self.inner.lock().sleepers.len()
    }
}
