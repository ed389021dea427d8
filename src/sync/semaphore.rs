// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{
    collections::VecDeque,
    future::Future,
    sync::Mutex as StdMutex,
};

use tokio::sync::oneshot;

struct Inner {
    /// Permits currently available to hand out.
    available: usize,
    /// Total capacity this semaphore was constructed with; releasing beyond
    /// this is a fatal programmer error (spec.md §4.1).
    capacity: usize,
    /// FIFO queue of parked acquirers.
    waiters: VecDeque<oneshot::Sender<()>>,
}

/// A counting permit pool with FIFO waiters (spec.md §4.1).
///
/// `acquire` blocks while no permits are available, in FIFO order; permits
/// are released by dropping the returned [`SemaphorePermit`] guard, which is
/// the idiomatic-Rust rendition of the spec's explicit `release` operation —
/// there is no way to call `release` without holding a permit, so the
/// "release on an unheld semaphore fails fatally" contract is enforced by
/// the type system rather than at runtime. The only runtime check retained
/// is the "released beyond initial N" guard, preserved as a defense against
/// a corrupted `capacity`/`available` invariant.
pub struct Semaphore {
    inner: StdMutex<Inner>,
}

impl Semaphore {
    /// Creates a semaphore with `n` permits. Panics if `n == 0`, mirroring
    /// "Initialized with N>0 permits."
    pub fn new(n: usize) -> Self {
        assert!(n > 0, "Semaphore must be initialized with N > 0 permits");
        Self {
            inner: StdMutex::new(Inner {
                available: n,
                capacity: n,
                waiters: VecDeque::new(),
            }),
        }
    }

    /// Acquires one permit, parking in FIFO order if none are available.
    pub async fn acquire(&self) -> SemaphorePermit<'_> {
        let rx = {
            let mut inner = self.inner.lock().expect("semaphore mutex poisoned");
            if inner.available > 0 {
                inner.available -= 1;
                None
            } else {
                let (tx, rx) = oneshot::channel();
                inner.waiters.push_back(tx);
                Some(rx)
            }
        };
        if let Some(rx) = rx {
            rx.await.expect("semaphore dropped while a waiter was parked");
        }
        SemaphorePermit { sem: self }
    }

    /// Hands the permit being released to the head waiter if any, otherwise
    /// returns it to the pool. Fatal if this would exceed the initial
    /// capacity.
    fn release_one(&self) {
        let mut inner = self.inner.lock().expect("semaphore mutex poisoned");
        if let Some(tx) = inner.waiters.pop_front() {
            // Hand the permit directly to the waiter; `available` does not
            // change since the permit never re-enters the pool.
            let _ = tx.send(());
        } else {
            inner.available += 1;
            assert!(
                inner.available <= inner.capacity,
                "semaphore released beyond its initial capacity"
            );
        }
    }

    /// Runs `f` while holding one permit, releasing it on every exit path
    /// (including a panic unwinding through `f`).
    pub async fn run_with_permit<F, Fut, T>(&self, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let _permit = self.acquire().await;
        f().await
    }

    /// Number of permits currently available without blocking. Exposed for
    /// tests and status reporting; not part of the acquire/release protocol.
    pub fn available_permits(&self) -> usize {
        self.inner.lock().expect("semaphore mutex poisoned").available
    }
}

/// RAII guard returned by [`Semaphore::acquire`]; releases the permit on
/// drop.
pub struct SemaphorePermit<'a> {
    sem: &'a Semaphore,
}

impl Drop for SemaphorePermit<'_> {
    fn drop(&mut self) {
        self.sem.release_one();
    }
}
