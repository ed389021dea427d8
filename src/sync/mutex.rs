// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{cell::UnsafeCell, future::Future, ops::{Deref, DerefMut}};

use crate::sync::semaphore::{Semaphore, SemaphorePermit};

/// Single-holder, FIFO-queued exclusive lock over `T` (spec.md §4.1).
///
/// A mutex is a semaphore with exactly one permit — both primitives are, in
/// the spec's own words, "single-holder FIFO queue[s] of waiters" /
/// "counting permit pool[s]"; building one atop the other avoids duplicating
/// the waiter-queue bookkeeping. The permit gates exclusive access to the
/// `UnsafeCell`-held `T`, the same construction `parking_lot`/`tokio::sync`
/// mutexes use internally.
pub struct Mutex<T> {
    sem: Semaphore,
    data: UnsafeCell<T>,
}

// SAFETY: `data` is only ever accessed through a `MutexGuard`, which can
// only be constructed by holding the one permit `sem` hands out — so at
// most one `&mut T` (and no concurrent `&T`) exists at a time.
unsafe impl<T: Send> Send for Mutex<T> {}
unsafe impl<T: Send> Sync for Mutex<T> {}

impl<T> Mutex<T> {
    pub fn new(value: T) -> Self {
        Self {
            sem: Semaphore::new(1),
            data: UnsafeCell::new(value),
        }
    }

    /// Acquires the lock, parking in FIFO order if already held.
    pub async fn acquire(&self) -> MutexGuard<'_, T> {
        MutexGuard {
            mutex: self,
            _permit: self.sem.acquire().await,
        }
    }

    /// Runs `f` while holding the lock, releasing it on every exit path
    /// (including a panic unwinding through `f`).
    pub async fn run_with_lock<F, Fut, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut T) -> Fut,
        Fut: Future<Output = R>,
    {
        let mut guard = self.acquire().await;
        f(&mut guard).await
    }

    /// `true` if the lock is currently free. Status-query helper; never
    /// used to gate acquisition (that would race).
    pub fn is_free(&self) -> bool {
        self.sem.available_permits() == 1
    }
}

/// RAII guard returned by [`Mutex::acquire`]; releases the lock on drop.
pub struct MutexGuard<'a, T> {
    mutex: &'a Mutex<T>,
    _permit: SemaphorePermit<'a>,
}

impl<T> Deref for MutexGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: holding `_permit` proves exclusive access to `data`.
        unsafe { &*self.mutex.data.get() }
    }
}

impl<T> DerefMut for MutexGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: holding `_permit` proves exclusive access to `data`.
        unsafe { &mut *self.mutex.data.get() }
    }
}
