use kairos_abi::task::{BOOT_TASK_ID, BlockReason, TaskId};
use kairos_abi::{SchedError, SchedResult};
use kairos_lib::klog_warn;

use super::TaskControl;
use super::parked::ParkedSet;
use super::spinlock::Spinlock;

struct MutexState {
    owner: Option<TaskId>,
    lock_count: u32,
    parked: ParkedSet,
}

/// Recursive sleeping mutex.
///
/// The owning task may lock again without blocking; ownership ends when
/// every `lock` is matched by an `unlock`. Waiters are not served in order.
pub struct Mutex {
    state: Spinlock<MutexState>,
}

/// Lock identity of the caller. Before the first task runs on a CPU the boot
/// flow locks as [`BOOT_TASK_ID`].
#[inline]
fn caller(ctl: &dyn TaskControl) -> TaskId {
    ctl.current_task().unwrap_or(BOOT_TASK_ID)
}

impl Mutex {
    pub const fn new() -> Self {
        Self {
            state: Spinlock::new(MutexState {
                owner: None,
                lock_count: 0,
                parked: ParkedSet::new(),
            }),
        }
    }

    pub fn lock(&self, ctl: &dyn TaskControl) {
        self.lock_with_depth(ctl, 1);
    }

    /// Acquire with a recursion depth of `depth` in one step.
    pub fn lock_with_depth(&self, ctl: &dyn TaskControl, depth: u32) {
        let me = caller(ctl);
        let depth = depth.max(1);
        loop {
            let mut state = self.state.lock_spin();
            match state.owner {
                None => {
                    state.parked.remove(me);
                    state.owner = Some(me);
                    state.lock_count = depth;
                    return;
                }
                Some(owner) if owner == me => {
                    state.lock_count = state.lock_count.saturating_add(depth);
                    return;
                }
                Some(_) => {
                    let parked = state.parked.park(ctl, BlockReason::MutexWait);
                    drop(state);
                    if parked {
                        ctl.commit_block();
                    } else {
                        ctl.yield_now();
                    }
                }
            }
        }
    }

    pub fn try_lock(&self, ctl: &dyn TaskControl) -> bool {
        let me = caller(ctl);
        let mut state = self.state.lock_spin();
        match state.owner {
            None => {
                state.owner = Some(me);
                state.lock_count = 1;
                true
            }
            Some(owner) if owner == me => {
                state.lock_count = state.lock_count.saturating_add(1);
                true
            }
            Some(_) => false,
        }
    }

    /// Drop one level of ownership. Only the owner may unlock.
    pub fn unlock(&self, ctl: &dyn TaskControl) -> SchedResult<()> {
        self.release(ctl, false).map(|_| ())
    }

    /// Drop ownership entirely and return the recursion depth that was held.
    pub fn release_all(&self, ctl: &dyn TaskControl) -> SchedResult<u32> {
        self.release(ctl, true)
    }

    fn release(&self, ctl: &dyn TaskControl, all: bool) -> SchedResult<u32> {
        let me = caller(ctl);
        let mut state = self.state.lock_spin();
        if state.owner != Some(me) {
            let owner = state.owner;
            drop(state);
            klog_warn!(
                "MUTEX: task {} released a mutex owned by {:?}, ignored",
                me,
                owner
            );
            return Err(SchedError::NotOwner);
        }

        let held = state.lock_count;
        state.lock_count = if all { 0 } else { held.saturating_sub(1) };
        if state.lock_count > 0 {
            return Ok(held);
        }
        state.owner = None;
        let waiters = state.parked.take_all();
        drop(state);
        waiters.wake(ctl);
        Ok(held)
    }

    pub fn owner(&self) -> Option<TaskId> {
        self.state.lock_spin().owner
    }

    pub fn lock_count(&self) -> u32 {
        self.state.lock_spin().lock_count
    }

    pub fn is_locked(&self) -> bool {
        self.owner().is_some()
    }

    /// Lock and return a guard that unlocks on drop.
    pub fn guard<'a>(&'a self, ctl: &'a dyn TaskControl) -> MutexGuard<'a> {
        self.lock(ctl);
        MutexGuard { mutex: self, ctl }
    }
}

impl Default for Mutex {
    fn default() -> Self {
        Self::new()
    }
}

pub struct MutexGuard<'a> {
    mutex: &'a Mutex,
    ctl: &'a dyn TaskControl,
}

impl Drop for MutexGuard<'_> {
    fn drop(&mut self) {
        let _ = self.mutex.unlock(self.ctl);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{FakeControl, capture_klog, captured_klog};

    #[test]
    fn test_recursive_lock_needs_matching_unlocks() {
        let m = Mutex::new();
        let owner = FakeControl::new(Some(1));
        let other = FakeControl::new(Some(2));

        m.lock(&owner);
        m.lock(&owner);
        assert_eq!(m.lock_count(), 2);
        m.unlock(&owner).unwrap();
        assert_eq!(m.owner(), Some(1));
        assert!(!m.try_lock(&other));

        m.unlock(&owner).unwrap();
        assert_eq!(m.lock_count(), 0);
        assert!(!m.is_locked());
        assert!(m.try_lock(&other));
        assert_eq!(m.owner(), Some(2));
    }

    #[test]
    fn test_contended_lock_parks_until_owner_unlocks() {
        let m = Mutex::new();
        let ctl = FakeControl::new(Some(1));
        m.lock(&ctl);

        ctl.set_current(Some(2));
        ctl.on_block(|ctl| {
            ctl.set_current(Some(1));
            m.unlock(ctl).unwrap();
            ctl.set_current(Some(2));
        });
        m.lock(&ctl);

        assert_eq!(m.owner(), Some(2));
        assert_eq!(m.lock_count(), 1);
        assert_eq!(ctl.blocked(), [(2, BlockReason::MutexWait)]);
        assert_eq!(ctl.unblocked(), [2]);
    }

    #[test]
    fn test_unlock_by_non_owner_is_logged_and_ignored() {
        capture_klog();
        let m = Mutex::new();
        let owner = FakeControl::new(Some(1));
        let intruder = FakeControl::new(Some(5));
        m.lock(&owner);

        assert_eq!(m.unlock(&intruder), Err(SchedError::NotOwner));
        assert_eq!(m.owner(), Some(1));
        assert!(
            captured_klog()
                .iter()
                .any(|line| line.contains("task 5 released a mutex owned by Some(1)"))
        );
    }

    #[test]
    fn test_release_all_and_restore_depth() {
        let m = Mutex::new();
        let ctl = FakeControl::new(None);
        m.lock(&ctl);
        m.lock(&ctl);
        m.lock(&ctl);
        assert_eq!(m.owner(), Some(BOOT_TASK_ID));
        assert_eq!(m.release_all(&ctl), Ok(3));
        assert!(!m.is_locked());
        m.lock_with_depth(&ctl, 3);
        assert_eq!(m.lock_count(), 3);
    }

    #[test]
    fn test_guard_unlocks_on_drop() {
        let m = Mutex::new();
        let ctl = FakeControl::new(Some(4));
        {
            let _guard = m.guard(&ctl);
            assert_eq!(m.owner(), Some(4));
        }
        assert!(!m.is_locked());
    }
}
