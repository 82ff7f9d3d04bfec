//! Lock helpers
//!
//! A panicking effect or driver must not take the whole server down with a
//! poisoned mutex, so every lock in the crate goes through [`lock`].

use std::sync::{Mutex, MutexGuard, PoisonError};

/// Lock a mutex, recovering the guard if a previous holder panicked
pub(crate) fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
