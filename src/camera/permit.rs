//! Counting permit guarding camera open/close.

use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};

struct PermitInner {
    available: Mutex<usize>,
    released: Condvar,
}

impl PermitInner {
    fn lock(&self) -> MutexGuard<'_, usize> {
        // The count stays consistent even if a holder panicked.
        self.available.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// Counting semaphore with a bounded-wait acquire.
///
/// Acquisition returns a `PermitGuard`; dropping the guard returns the permit,
/// so every exit path releases it exactly once.
#[derive(Clone)]
pub struct Permit {
    inner: Arc<PermitInner>,
}

impl Permit {
    pub fn new(count: usize) -> Self {
        Self {
            inner: Arc::new(PermitInner {
                available: Mutex::new(count),
                released: Condvar::new(),
            }),
        }
    }

    /// Wait up to `timeout` for a permit.
    pub fn try_acquire_for(&self, timeout: Duration) -> Option<PermitGuard> {
        let deadline = Instant::now() + timeout;
        let mut available = self.inner.lock();
        while *available == 0 {
            let now = Instant::now();
            if now >= deadline {
                return None;
            }
            let (guard, _) = self
                .inner
                .released
                .wait_timeout(available, deadline - now)
                .unwrap_or_else(PoisonError::into_inner);
            available = guard;
        }
        *available -= 1;
        Some(self.guard())
    }

    /// Wait as long as it takes for a permit.
    pub fn acquire(&self) -> PermitGuard {
        let mut available = self.inner.lock();
        while *available == 0 {
            available = self
                .inner
                .released
                .wait(available)
                .unwrap_or_else(PoisonError::into_inner);
        }
        *available -= 1;
        self.guard()
    }

    pub fn available(&self) -> usize {
        *self.inner.lock()
    }

    fn guard(&self) -> PermitGuard {
        PermitGuard {
            inner: self.inner.clone(),
        }
    }
}

/// A held permit. Released on drop.
#[must_use = "dropping the guard releases the permit immediately"]
pub struct PermitGuard {
    inner: Arc<PermitInner>,
}

impl Drop for PermitGuard {
    fn drop(&mut self) {
        let mut available = self.inner.lock();
        *available += 1;
        drop(available);
        self.inner.released.notify_one();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;

    #[test]
    fn guard_drop_releases() {
        let permit = Permit::new(1);
        let guard = permit.try_acquire_for(Duration::from_millis(10));
        assert!(guard.is_some());
        assert_eq!(permit.available(), 0);
        drop(guard);
        assert_eq!(permit.available(), 1);
    }

    #[test]
    fn bounded_wait_times_out() {
        let permit = Permit::new(1);
        let _held = permit.acquire();
        let start = Instant::now();
        assert!(permit.try_acquire_for(Duration::from_millis(50)).is_none());
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn waiter_wakes_on_release() {
        let permit = Permit::new(1);
        let held = permit.acquire();
        let waiter = {
            let permit = permit.clone();
            thread::spawn(move || permit.try_acquire_for(Duration::from_secs(5)).is_some())
        };
        thread::sleep(Duration::from_millis(20));
        drop(held);
        assert!(waiter.join().unwrap());
        assert_eq!(permit.available(), 1);
    }
}
