use core::cell::UnsafeCell;
use core::hint::spin_loop;
use core::ops::{Deref, DerefMut};
use core::sync::atomic::{AtomicBool, Ordering};

use super::TaskControl;

/// Test-and-set lock that yields the CPU while contended.
///
/// `Spinlock<()>` doubles as a bare lock word with the explicit
/// `acquire`/`release` pair.
pub struct Spinlock<T: ?Sized = ()> {
    locked: AtomicBool,
    data: UnsafeCell<T>,
}

// SAFETY: access to `data` is serialized by `locked`.
unsafe impl<T: ?Sized + Send> Send for Spinlock<T> {}
unsafe impl<T: ?Sized + Send> Sync for Spinlock<T> {}

pub struct SpinlockGuard<'a, T: ?Sized> {
    lock: &'a Spinlock<T>,
}

impl<T> Spinlock<T> {
    #[inline]
    pub const fn new(data: T) -> Self {
        Self {
            locked: AtomicBool::new(false),
            data: UnsafeCell::new(data),
        }
    }

    pub fn into_inner(self) -> T {
        self.data.into_inner()
    }
}

impl<T: ?Sized> Spinlock<T> {
    #[inline]
    fn try_claim(&self) -> bool {
        !self.locked.swap(true, Ordering::Acquire)
    }

    /// Acquire, yielding to other tasks between attempts.
    pub fn lock(&self, ctl: &dyn TaskControl) -> SpinlockGuard<'_, T> {
        while !self.try_claim() {
            while self.is_held() {
                ctl.yield_now();
            }
        }
        SpinlockGuard { lock: self }
    }

    /// Acquire by busy-waiting. For short sections that must not reschedule,
    /// such as the state word of another primitive.
    pub fn lock_spin(&self) -> SpinlockGuard<'_, T> {
        while !self.try_claim() {
            while self.is_held() {
                spin_loop();
            }
        }
        SpinlockGuard { lock: self }
    }

    #[inline]
    pub fn try_lock(&self) -> Option<SpinlockGuard<'_, T>> {
        self.try_claim().then_some(SpinlockGuard { lock: self })
    }

    /// Racy snapshot, for diagnostics only.
    #[inline]
    pub fn is_held(&self) -> bool {
        self.locked.load(Ordering::Relaxed)
    }

    #[inline]
    pub fn get_mut(&mut self) -> &mut T {
        self.data.get_mut()
    }
}

impl Spinlock<()> {
    /// Acquire without a guard. Pair with [`Spinlock::release`].
    pub fn acquire(&self, ctl: &dyn TaskControl) {
        core::mem::forget(self.lock(ctl));
    }

    #[inline]
    pub fn try_acquire(&self) -> bool {
        self.try_claim()
    }

    #[inline]
    pub fn release(&self) {
        self.locked.store(false, Ordering::Release);
    }
}

impl<T: Default> Default for Spinlock<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: ?Sized> Deref for SpinlockGuard<'_, T> {
    type Target = T;

    #[inline]
    fn deref(&self) -> &T {
        // SAFETY: the guard proves the lock is held.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T: ?Sized> DerefMut for SpinlockGuard<'_, T> {
    #[inline]
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: the guard proves the lock is held exclusively.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T: ?Sized> Drop for SpinlockGuard<'_, T> {
    #[inline]
    fn drop(&mut self) {
        self.lock.locked.store(false, Ordering::Release);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::FakeControl;

    #[test]
    fn test_try_acquire_is_exclusive() {
        let lock = Spinlock::new(());
        assert!(lock.try_acquire());
        assert!(lock.is_held());
        assert!(!lock.try_acquire());
        lock.release();
        assert!(!lock.is_held());
        assert!(lock.try_acquire());
    }

    #[test]
    fn test_contended_lock_yields_until_released() {
        let lock = Spinlock::new(5u32);
        let ctl = FakeControl::new(Some(1));
        let first = lock.try_lock().unwrap();
        core::mem::forget(first);

        ctl.on_yield(|_| {});
        ctl.on_yield(|_| lock.locked.store(false, Ordering::Release));
        {
            let mut guard = lock.lock(&ctl);
            *guard += 1;
        }
        assert_eq!(ctl.yields(), 2);
        assert_eq!(*lock.lock_spin(), 6);
    }

    #[test]
    fn test_guard_releases_on_drop() {
        let lock = Spinlock::new(0u8);
        {
            let _guard = lock.lock_spin();
            assert!(lock.try_lock().is_none());
        }
        assert!(lock.try_lock().is_some());
        assert_eq!(lock.into_inner(), 0);
    }
}
