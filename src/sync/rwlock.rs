// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    cell::UnsafeCell,
    future::Future,
    ops::{Deref, DerefMut},
    sync::Mutex as StdMutex,
};

use crate::sync::condition::Condition;

struct Counters {
    readers: u32,
    writer_active: bool,
    writers_waiting: u32,
}

/// Writer-preferring readers-writer lock over `T` (spec.md §4.1).
///
/// Invariant: `(writers == 0) ∨ (readers == 0 ∧ writers == 1)`. When a
/// writer is queued, new readers block so the writer cannot starve. On
/// release of the last reader, a queued writer (if any) is admitted; on
/// release of a writer, one queued writer is admitted if present, otherwise
/// every queued reader is admitted together.
pub struct RwLock<T> {
    counters: StdMutex<Counters>,
    cond: Condition,
    data: UnsafeCell<T>,
}

// SAFETY: `data` is only reachable through a read/write guard, and the
// `counters` + `Condition` admission logic below enforces the rwlock
// invariant before any guard is handed out.
unsafe impl<T: Send> Send for RwLock<T> {}
unsafe impl<T: Send + Sync> Sync for RwLock<T> {}

impl<T> RwLock<T> {
    pub fn new(value: T) -> Self {
        Self {
            counters: StdMutex::new(Counters {
                readers: 0,
                writer_active: false,
                writers_waiting: 0,
            }),
            cond: Condition::new(),
            data: UnsafeCell::new(value),
        }
    }

    pub async fn acquire_read(&self) -> RwLockReadGuard<'_, T> {
        self.cond
            .lock_when(&self.counters, |c| {
                if !c.writer_active && c.writers_waiting == 0 {
                    c.readers += 1;
                    Some(())
                } else {
                    None
                }
            })
            .await;
        RwLockReadGuard { lock: self }
    }

    pub async fn acquire_write(&self) -> RwLockWriteGuard<'_, T> {
        {
            let mut c = self.counters.lock().expect("rwlock counters mutex poisoned");
            c.writers_waiting += 1;
        }
        self.cond
            .lock_when(&self.counters, |c| {
                if !c.writer_active && c.readers == 0 {
                    c.writer_active = true;
                    c.writers_waiting -= 1;
                    Some(())
                } else {
                    None
                }
            })
            .await;
        RwLockWriteGuard { lock: self }
    }

    fn release_read(&self) {
        let notify = {
            let mut c = self.counters.lock().expect("rwlock counters mutex poisoned");
            assert!(
                c.readers > 0,
                "release-read on a readers-writer lock with no readers held"
            );
            c.readers -= 1;
            c.readers == 0
        };
        if notify {
            self.cond.notify_all();
        }
    }

    fn release_write(&self) {
        {
            let mut c = self.counters.lock().expect("rwlock counters mutex poisoned");
            assert!(
                c.writer_active,
                "release-write on a readers-writer lock with no writer held"
            );
            c.writer_active = false;
        }
        self.cond.notify_all();
    }

    /// Runs `f` while holding the read lock, releasing it on every exit
    /// path.
    pub async fn run_with_read_lock<F, Fut, R>(&self, f: F) -> R
    where
        F: FnOnce(&T) -> Fut,
        Fut: Future<Output = R>,
    {
        let guard = self.acquire_read().await;
        f(&guard).await
    }

    /// Runs `f` while holding the write lock, releasing it on every exit
    /// path.
    pub async fn run_with_write_lock<F, Fut, R>(&self, f: F) -> R
    where
        F: FnOnce(&mut T) -> Fut,
        Fut: Future<Output = R>,
    {
        let mut guard = self.acquire_write().await;
        f(&mut guard).await
    }
}

pub struct RwLockReadGuard<'a, T> {
    lock: &'a RwLock<T>,
}

impl<T> Deref for RwLockReadGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: holding a read guard proves no writer is active.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> Drop for RwLockReadGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.release_read();
    }
}

pub struct RwLockWriteGuard<'a, T> {
    lock: &'a RwLock<T>,
}

impl<T> Deref for RwLockWriteGuard<'_, T> {
    type Target = T;
    fn deref(&self) -> &T {
        // SAFETY: holding a write guard proves exclusive access.
        unsafe { &*self.lock.data.get() }
    }
}

impl<T> DerefMut for RwLockWriteGuard<'_, T> {
    fn deref_mut(&mut self) -> &mut T {
        // SAFETY: holding a write guard proves exclusive access.
        unsafe { &mut *self.lock.data.get() }
    }
}

impl<T> Drop for RwLockWriteGuard<'_, T> {
    fn drop(&mut self) {
        self.lock.release_write();
    }
}
