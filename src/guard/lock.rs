//! Type-stated lock guard
//!
//! A `parking_lot::Mutex` doesn't poison itself, so poisoning here is
//! explicit: a [`LockGuard<'_, T, Locked>`] that observes a failed
//! operation poisons its [`StatefulLock`], and only an explicit `recover()`
//! on the `Unlocked` state clears it. Only the `Locked` state exposes
//! `access`/`access_mut`; this is enforced at compile time via the
//! `Locked`/`Unlocked` marker types, not a runtime check.

use std::marker::PhantomData;
use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{Mutex, MutexGuard};

use crate::error::{KernelError, KernelResult};

pub struct Locked;
pub struct Unlocked;

pub struct StatefulLock<T> {
    inner: Mutex<T>,
    poisoned: AtomicBool,
}

impl<T> StatefulLock<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
            poisoned: AtomicBool::new(false),
        }
    }

    pub fn is_poisoned(&self) -> bool {
        self.poisoned.load(Ordering::Acquire)
    }

    fn mark_poisoned(&self) {
        self.poisoned.store(true, Ordering::Release);
    }

    fn clear_poison(&self) {
        self.poisoned.store(false, Ordering::Release);
    }

    /// Acquire the lock. Fails if the lock is currently poisoned; recover
    /// explicitly through the `Unlocked` guard's `recover()` first.
    pub fn lock(&self) -> KernelResult<LockGuard<'_, T, Locked>> {
        if self.is_poisoned() {
            return Err(KernelError::Internal("lock is poisoned".into()));
        }
        Ok(LockGuard {
            guard: Some(self.inner.lock()),
            lock: self,
            _state: PhantomData,
        })
    }

    /// The `Unlocked` handle, reachable even while poisoned — it holds no
    /// mutex guard, only the right to inspect and recover.
    pub fn unlocked(&self) -> LockGuard<'_, T, Unlocked> {
        LockGuard {
            guard: None,
            lock: self,
            _state: PhantomData,
        }
    }
}

pub struct LockGuard<'a, T, State> {
    guard: Option<MutexGuard<'a, T>>,
    lock: &'a StatefulLock<T>,
    _state: PhantomData<State>,
}

impl<'a, T> LockGuard<'a, T, Locked> {
    pub fn access(&self) -> &T {
        self.guard.as_deref().expect("Locked guard always holds its mutex guard")
    }

    pub fn access_mut(&mut self) -> &mut T {
        self.guard.as_deref_mut().expect("Locked guard always holds its mutex guard")
    }

    /// Run `f`, poisoning the lock if it returns an error.
    pub fn with<R>(&mut self, f: impl FnOnce(&mut T) -> KernelResult<R>) -> KernelResult<R> {
        match f(self.access_mut()) {
            Ok(value) => Ok(value),
            Err(err) => {
                self.lock.mark_poisoned();
                Err(err)
            }
        }
    }

    /// Release without poisoning, transitioning to the `Unlocked` state.
    pub fn release(mut self) -> LockGuard<'a, T, Unlocked> {
        self.guard.take();
        LockGuard {
            guard: None,
            lock: self.lock,
            _state: PhantomData,
        }
    }
}

impl<'a, T> LockGuard<'a, T, Unlocked> {
    pub fn is_poisoned(&self) -> bool {
        self.lock.is_poisoned()
    }

    /// Clear poisoning and reacquire, transitioning back to `Locked`.
    pub fn recover(self) -> KernelResult<LockGuard<'a, T, Locked>> {
        self.lock.clear_poison();
        self.lock.lock()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locked_guard_exposes_access() {
        let lock = StatefulLock::new(5);
        let mut guard = lock.lock().unwrap();
        assert_eq!(*guard.access(), 5);
        *guard.access_mut() = 9;
        assert_eq!(*guard.access(), 9);
    }

    #[test]
    fn failed_operation_poisons_the_lock() {
        let lock = StatefulLock::new(0);
        let mut guard = lock.lock().unwrap();
        let result: KernelResult<()> = guard.with(|_| Err(KernelError::Internal("boom".into())));
        assert!(result.is_err());
        let unlocked = guard.release();
        assert!(unlocked.is_poisoned());
    }

    #[test]
    fn locking_a_poisoned_lock_fails_until_recovered() {
        let lock = StatefulLock::new(0);
        {
            let mut guard = lock.lock().unwrap();
            let _ = guard.with(|_| Err::<(), _>(KernelError::Internal("boom".into())));
        }
        assert!(lock.lock().is_err());
        let relocked = lock.unlocked().recover();
        assert!(relocked.is_ok());
        assert!(!lock.is_poisoned());
    }
}
