//! Mutual exclusion for component registries.
//!
//! Each stateful component (rate limiter, load balancer, circuit breaker)
//! guards its registry with its own `Exclusive`. Critical sections are
//! short and never span an `.await`.

use std::sync::{Mutex, MutexGuard, PoisonError};

/// A non-reentrant lock around a single value.
///
/// Locking from the thread that already holds the guard deadlocks.
/// A poisoned lock is recovered: the registry is plain data and stays
/// consistent even if a holder panicked between two statements.
#[derive(Debug, Default)]
pub struct Exclusive<T> {
    inner: Mutex<T>,
}

impl<T> Exclusive<T> {
    pub fn new(value: T) -> Self {
        Self {
            inner: Mutex::new(value),
        }
    }

    /// Block until exclusive access is granted.
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` with the lock held and return its result.
    pub fn with<R>(&self, f: impl FnOnce(&mut T) -> R) -> R {
        let mut guard = self.lock();
        f(&mut guard)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn test_concurrent_increments_are_not_lost() {
        let counter = Arc::new(Exclusive::new(0u64));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let counter = counter.clone();
                thread::spawn(move || {
                    for _ in 0..1000 {
                        counter.with(|n| *n += 1);
                    }
                })
            })
            .collect();

        for h in handles {
            h.join().unwrap();
        }

        assert_eq!(*counter.lock(), 8000);
    }

    #[test]
    fn test_poisoned_lock_is_recovered() {
        let value = Arc::new(Exclusive::new(vec![1]));
        let v = value.clone();
        let _ = thread::spawn(move || {
            let _guard = v.lock();
            panic!("holder panicked");
        })
        .join();

        value.with(|v| v.push(2));
        assert_eq!(*value.lock(), vec![1, 2]);
    }
}
