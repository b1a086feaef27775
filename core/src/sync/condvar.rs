use kairos_abi::SchedResult;
use kairos_abi::task::{BlockReason, INVALID_TASK_ID};

use super::TaskControl;
use super::mutex::Mutex;
use super::parked::ParkedSet;
use super::spinlock::Spinlock;

struct CondState {
    waiters: u32,
    parked: ParkedSet,
}

/// Counting condition variable.
///
/// `signal` lets one logical waiter through by lowering the waiter count;
/// which task that is, is unspecified. Callers re-check their predicate
/// after `wait` returns.
pub struct CondVar {
    state: Spinlock<CondState>,
}

impl CondVar {
    pub const fn new() -> Self {
        Self {
            state: Spinlock::new(CondState {
                waiters: 0,
                parked: ParkedSet::new(),
            }),
        }
    }

    /// Release `mutex`, wait for a signal, then take `mutex` back at the
    /// recursion depth the caller held. Fails with `NotOwner` if the caller
    /// does not hold `mutex`.
    pub fn wait(&self, mutex: &Mutex, ctl: &dyn TaskControl) -> SchedResult<()> {
        let seen = {
            let mut state = self.state.lock_spin();
            state.waiters += 1;
            state.waiters
        };
        let depth = match mutex.release_all(ctl) {
            Ok(depth) => depth,
            Err(err) => {
                let mut state = self.state.lock_spin();
                state.waiters = state.waiters.saturating_sub(1);
                return Err(err);
            }
        };

        let me = ctl.current_task().unwrap_or(INVALID_TASK_ID);
        loop {
            let mut state = self.state.lock_spin();
            state.parked.remove(me);
            if state.waiters < seen {
                break;
            }
            let parked = state.parked.park(ctl, BlockReason::ConditionWait);
            drop(state);
            if parked {
                ctl.commit_block();
            } else {
                ctl.yield_now();
            }
        }

        mutex.lock_with_depth(ctl, depth);
        Ok(())
    }

    pub fn signal(&self, ctl: &dyn TaskControl) {
        let mut state = self.state.lock_spin();
        if state.waiters == 0 {
            return;
        }
        state.waiters -= 1;
        let parked = state.parked.take_all();
        drop(state);
        parked.wake(ctl);
    }

    pub fn broadcast(&self, ctl: &dyn TaskControl) {
        let mut state = self.state.lock_spin();
        state.waiters = 0;
        let parked = state.parked.take_all();
        drop(state);
        parked.wake(ctl);
    }

    pub fn waiters(&self) -> u32 {
        self.state.lock_spin().waiters
    }
}

impl Default for CondVar {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeControl;
    use kairos_abi::SchedError;

    #[test]
    fn test_wait_releases_mutex_and_restores_depth() {
        let cv = CondVar::new();
        let m = Mutex::new();
        let ctl = FakeControl::new(Some(1));
        m.lock(&ctl);
        m.lock(&ctl);

        ctl.on_block(|ctl| {
            ctl.set_current(Some(2));
            assert!(!m.is_locked());
            m.lock(ctl);
            cv.signal(ctl);
            m.unlock(ctl).unwrap();
            ctl.set_current(Some(1));
        });
        cv.wait(&m, &ctl).unwrap();

        assert_eq!(m.owner(), Some(1));
        assert_eq!(m.lock_count(), 2);
        assert_eq!(cv.waiters(), 0);
        assert_eq!(ctl.blocked(), [(1, BlockReason::ConditionWait)]);
    }

    #[test]
    fn test_wait_without_mutex_fails() {
        let cv = CondVar::new();
        let m = Mutex::new();
        let ctl = FakeControl::new(Some(1));
        assert_eq!(cv.wait(&m, &ctl), Err(SchedError::NotOwner));
        assert_eq!(cv.waiters(), 0);
    }

    #[test]
    fn test_signal_without_waiters_is_lost_and_broadcast_resets() {
        let cv = CondVar::new();
        let ctl = FakeControl::new(Some(1));
        cv.signal(&ctl);
        assert_eq!(cv.waiters(), 0);

        cv.state.lock_spin().waiters = 3;
        cv.signal(&ctl);
        assert_eq!(cv.waiters(), 2);
        cv.broadcast(&ctl);
        assert_eq!(cv.waiters(), 0);
    }
}
