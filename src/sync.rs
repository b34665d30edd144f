//! Poison-tolerant locking.
//!
//! Registry and task bookkeeping never leave a map half-updated while holding
//! a guard, so a poisoned lock is still safe to reuse.

use std::sync::{Mutex, MutexGuard, PoisonError};

#[inline]
pub(crate) fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
