//! Lock acquisition with poisoned-lock recovery.
//!
//! Cache entries, metric windows, and the alert table stay internally
//! consistent under any single-operation panic, so a poisoned guard is
//! recoverable: log it and continue with the inner value.

use std::sync::{Mutex, MutexGuard, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::warn;

pub(crate) fn rw_read<'a, T>(
    lock: &'a RwLock<T>,
    source: &'static str,
    op: &'static str,
) -> RwLockReadGuard<'a, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!(
                op,
                source,
                lock_kind = "rwlock.read",
                "continuing past poisoned lock; a writer panicked earlier"
            );
            poisoned.into_inner()
        }
    }
}

pub(crate) fn rw_write<'a, T>(
    lock: &'a RwLock<T>,
    source: &'static str,
    op: &'static str,
) -> RwLockWriteGuard<'a, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!(
                op,
                source,
                lock_kind = "rwlock.write",
                "continuing past poisoned lock; a writer panicked earlier"
            );
            poisoned.into_inner()
        }
    }
}

pub(crate) fn mutex_lock<'a, T>(
    lock: &'a Mutex<T>,
    source: &'static str,
    op: &'static str,
) -> MutexGuard<'a, T> {
    match lock.lock() {
        Ok(guard) => guard,
        Err(poisoned) => {
            warn!(
                op,
                source,
                lock_kind = "mutex.lock",
                "continuing past poisoned lock; a holder panicked earlier"
            );
            poisoned.into_inner()
        }
    }
}
