use kairos_abi::task::{BlockReason, INVALID_TASK_ID};

use super::TaskControl;
use super::parked::ParkedSet;
use super::spinlock::Spinlock;

struct SemaphoreState {
    count: u32,
    max_count: u32,
    parked: ParkedSet,
}

/// Bounded counting semaphore. Any task may signal.
pub struct Semaphore {
    state: Spinlock<SemaphoreState>,
}

impl Semaphore {
    /// `initial` is clamped to `max_count`.
    pub const fn new(initial: u32, max_count: u32) -> Self {
        let count = if initial > max_count {
            max_count
        } else {
            initial
        };
        Self {
            state: Spinlock::new(SemaphoreState {
                count,
                max_count,
                parked: ParkedSet::new(),
            }),
        }
    }

    /// Take one unit, blocking while none is available.
    pub fn wait(&self, ctl: &dyn TaskControl) {
        let me = ctl.current_task().unwrap_or(INVALID_TASK_ID);
        loop {
            let mut state = self.state.lock_spin();
            state.parked.remove(me);
            if state.count > 0 {
                state.count -= 1;
                return;
            }
            let parked = state.parked.park(ctl, BlockReason::SemaphoreWait);
            drop(state);
            if parked {
                ctl.commit_block();
            } else {
                ctl.yield_now();
            }
        }
    }

    pub fn try_wait(&self) -> bool {
        let mut state = self.state.lock_spin();
        if state.count == 0 {
            return false;
        }
        state.count -= 1;
        true
    }

    /// Return one unit. At capacity the signal is dropped and `false`
    /// returned.
    pub fn signal(&self, ctl: &dyn TaskControl) -> bool {
        let mut state = self.state.lock_spin();
        if state.count >= state.max_count {
            return false;
        }
        state.count += 1;
        let waiters = state.parked.take_all();
        drop(state);
        waiters.wake(ctl);
        true
    }

    pub fn count(&self) -> u32 {
        self.state.lock_spin().count
    }

    pub fn max_count(&self) -> u32 {
        self.state.lock_spin().max_count
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeControl;

    #[test]
    fn test_count_never_exceeds_max() {
        let sem = Semaphore::new(5, 2);
        let ctl = FakeControl::new(Some(1));
        assert_eq!(sem.count(), 2);
        assert!(!sem.signal(&ctl));
        assert!(sem.try_wait());
        assert!(sem.signal(&ctl));
        for _ in 0..10 {
            sem.signal(&ctl);
        }
        assert_eq!(sem.count(), 2);
        assert_eq!(sem.max_count(), 2);
    }

    #[test]
    fn test_try_wait_fails_at_zero() {
        let sem = Semaphore::new(1, 1);
        assert!(sem.try_wait());
        assert!(!sem.try_wait());
        assert_eq!(sem.count(), 0);
    }

    #[test]
    fn test_wait_blocks_until_signalled() {
        let sem = Semaphore::new(0, 4);
        let ctl = FakeControl::new(Some(3));
        ctl.on_block(|ctl| {
            ctl.set_current(Some(8));
            assert!(sem.signal(ctl));
            ctl.set_current(Some(3));
        });
        sem.wait(&ctl);
        assert_eq!(sem.count(), 0);
        assert_eq!(ctl.blocked(), [(3, BlockReason::SemaphoreWait)]);
        assert_eq!(ctl.unblocked(), [3]);
    }

    #[test]
    fn test_wait_polls_when_blocking_is_refused() {
        let sem = Semaphore::new(0, 1);
        let ctl = FakeControl::new(Some(3));
        ctl.refuse_blocks(true);
        ctl.on_yield(|ctl| {
            sem.signal(ctl);
        });
        sem.wait(&ctl);
        assert_eq!(ctl.yields(), 1);
        assert!(ctl.blocked().is_empty());
    }
}
