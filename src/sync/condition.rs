// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::sync::Mutex as StdMutex;

use tokio::sync::Notify;

/// A condition variable over externally-held state (spec.md §4.1).
///
/// `wait_while` returns immediately once `predicate` holds; otherwise it
/// parks the caller without holding any other lock. `notify_all` wakes every
/// waiter, each of which re-evaluates its own predicate — exactly
/// "`notifyAll` re-evaluates every waiter's predicate and wakes those whose
/// predicate is now true."
///
/// Built on [`tokio::sync::Notify`] using the standard
/// register-before-recheck idiom, so a `notify_all` that races with a
/// waiter's first check is never missed.
pub struct Condition {
    notify: Notify,
}

impl Default for Condition {
    fn default() -> Self {
        Self::new()
    }
}

impl Condition {
    pub fn new() -> Self {
        Self {
            notify: Notify::new(),
        }
    }

    /// Waits until `predicate(state)` holds, re-locking `state` on every
    /// wake to recheck. `state` is a plain [`std::sync::Mutex`] since
    /// critical sections here are short, synchronous state reads.
    pub async fn wait_while<T, F>(&self, state: &StdMutex<T>, mut predicate: F)
    where
        F: FnMut(&T) -> bool,
    {
        loop {
            // Register interest before the check to avoid a missed wakeup
            // between the check and the `.await` below.
            let notified = self.notify.notified();
            {
                let guard = state.lock().expect("condition state mutex poisoned");
                if predicate(&guard) {
                    return;
                }
            }
            notified.await;
        }
    }

    /// Wakes every current waiter so each can re-evaluate its predicate.
    pub fn notify_all(&self) {
        self.notify.notify_waiters();
    }

    /// Monitor-style "wait until I can atomically transition `state`".
    ///
    /// `try_acquire` is called with the locked state; returning `Some(r)`
    /// both mutates `state` and completes the wait with `r`, atomically
    /// with the check. Returning `None` parks the caller until the next
    /// `notify_all`. This is the building block [`crate::sync::RwLock`]
    /// uses to admit readers/writers without a check-then-act race.
    pub async fn lock_when<T, F, R>(&self, state: &StdMutex<T>, mut try_acquire: F) -> R
    where
        F: FnMut(&mut T) -> Option<R>,
    {
        loop {
            let notified = self.notify.notified();
            {
                let mut guard = state.lock().expect("condition state mutex poisoned");
                if let Some(r) = try_acquire(&mut guard) {
                    return r;
                }
            }
            notified.await;
        }
    }
}
