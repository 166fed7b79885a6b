//! Gate: a mutex + condition variable pair guarding one party's state.
//!
//! Waits are always predicate-based, so a notify that lands before the
//! waiter reaches `wait` is never lost.

use std::sync::{Condvar, Mutex, MutexGuard};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct Gate<T> {
    state: Mutex<T>,
    cv: Condvar,
}

impl<T> Gate<T> {
    pub fn new(state: T) -> Self {
        Self {
            state: Mutex::new(state),
            cv: Condvar::new(),
        }
    }

    /// Lock the gate state, recovering from poison.
    ///
    /// A worker that panics mid-payload never holds a gate lock, and the
    /// guarded values are plain flags and counters, so the inner state is
    /// still meaningful after a poisoning panic.
    #[inline]
    pub fn lock(&self) -> MutexGuard<'_, T> {
        self.state.lock().unwrap_or_else(|poison| poison.into_inner())
    }

    /// Block while `blocked` holds.
    pub fn wait_while<'a, F>(&self, guard: MutexGuard<'a, T>, blocked: F) -> MutexGuard<'a, T>
    where
        F: FnMut(&mut T) -> bool,
    {
        self.cv
            .wait_while(guard, blocked)
            .unwrap_or_else(|poison| poison.into_inner())
    }

    /// Block while `blocked` holds, for at most `timeout`.
    ///
    /// Returns the guard and `true` if the wait timed out with the
    /// predicate still holding.
    pub fn wait_timeout_while<'a, F>(
        &self,
        guard: MutexGuard<'a, T>,
        timeout: Duration,
        blocked: F,
    ) -> (MutexGuard<'a, T>, bool)
    where
        F: FnMut(&mut T) -> bool,
    {
        let (guard, result) = self
            .cv
            .wait_timeout_while(guard, timeout, blocked)
            .unwrap_or_else(|poison| poison.into_inner());
        (guard, result.timed_out())
    }

    #[inline]
    pub fn notify_one(&self) {
        self.cv.notify_one();
    }

    #[inline]
    pub fn notify_all(&self) {
        self.cv.notify_all();
    }
}
